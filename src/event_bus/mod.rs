//! Runtime event stream.
//!
//! Nodes and the runner emit [`Event`]s through a flume channel; the
//! [`EventBus`] fans them out to configured sinks (stdout by default, an
//! in-memory sink in tests).

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{Event, NodeEvent};
pub use sink::{EventSink, MemorySink, StdOutSink};
