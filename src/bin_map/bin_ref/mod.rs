use std::fmt;
use std::sync::Weak;

use self::error::BinViewInvalid;
use crate::ids::BinId;

pub mod error;

/// A weak handle to one entry of a [`BinMap`](super::BinMap).
///
/// Access is scoped to a closure so a consumer cannot keep a removed bin alive.
pub struct BinRef<T> {
    bin_id: BinId,
    entry: Weak<T>,
}

impl<T> BinRef<T> {
    pub(super) fn new(bin_id: BinId, entry: Weak<T>) -> BinRef<T> {
        Self { bin_id, entry }
    }

    /// Run `view_fn` against the entry if the bin is still tracked.
    pub fn view<F: FnOnce(&T) -> R, R>(&self, view_fn: F) -> Result<R, BinViewInvalid> {
        match self.entry.upgrade() {
            Some(entry) => Ok(view_fn(&entry)),
            None => Err(BinViewInvalid {
                bin_id: self.bin_id.clone(),
            }),
        }
    }
}

impl<T> fmt::Debug for BinRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinRef")
            .field("bin_id", &self.bin_id)
            .field("tracked", &(self.entry.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_view_after_owner_dropped() {
        let owner = Arc::new(42_u32);
        let bin_ref = BinRef::new(BinId::from("bin-1"), Arc::downgrade(&owner));

        assert_eq!(bin_ref.view(|v| *v + 1), Ok(43));
        assert_eq!(
            format!("{bin_ref:?}"),
            r#"BinRef { bin_id: BinId("bin-1"), tracked: true }"#
        );

        drop(owner);
        assert_eq!(
            bin_ref.view(|v| *v),
            Err(BinViewInvalid {
                bin_id: BinId::from("bin-1")
            })
        );
    }
}
