use crate::ids::BinId;

#[derive(Debug, thiserror::Error)]
#[error("bin {bin_id} is already tracked")]
pub struct BinAlreadyPresent {
    pub bin_id: BinId,
}

#[derive(Debug, thiserror::Error)]
#[error("bin {bin_id} is not tracked")]
pub struct BinNotFound {
    pub bin_id: BinId,
}
