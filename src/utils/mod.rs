//! Small shared helpers.

pub mod collections;
