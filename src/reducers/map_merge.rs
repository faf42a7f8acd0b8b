use super::Reducer;
use crate::{channels::Channel, node::NodePartial, state::VersionedState};

/// Shallow JSON map merge for the extra channel: the most recent node to set
/// a key wins. Used for scalar control fields (`next`, `current_intention`,
/// ...) and the transcription payload fields.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct MapMerge;
impl Reducer for MapMerge {
    fn apply(&self, state: &mut VersionedState, update: &NodePartial) {
        if let Some(extras_update) = &update.extra
            && !extras_update.is_empty()
        {
            let state_map = state.extra.get_mut();
            for (k, v) in extras_update.iter() {
                state_map.insert(k.clone(), v.clone());
            }
        }
    }
}
