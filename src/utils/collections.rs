//! Map construction helpers.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Creates an empty map suitable for the extra channel.
///
/// Nodes build their extra updates with this so the map type stays in one
/// place:
///
/// ```
/// use threadloom::utils::collections::new_extra_map;
/// use serde_json::json;
///
/// let mut extra = new_extra_map();
/// extra.insert("next".to_string(), json!("data_collector"));
/// ```
#[must_use]
pub fn new_extra_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}

/// Creates an extra map pre-populated from key/value pairs.
#[must_use]
pub fn extra_map_from<const N: usize>(pairs: [(&str, Value); N]) -> FxHashMap<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
