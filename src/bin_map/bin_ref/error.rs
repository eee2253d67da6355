use crate::ids::BinId;

/// The bin was removed from its map after this reference was handed out.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("bin {bin_id} is no longer tracked")]
pub struct BinViewInvalid {
    pub bin_id: BinId,
}
