//! Identifiers for joints within a skeleton arena.

use serde::{Deserialize, Serialize};

/// Index of a joint inside its owning [`Skeleton`](crate::skeleton::Skeleton).
/// Ids are dense and follow declaration order in the source file.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct JointId(pub u32);

impl JointId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        JointId(index as u32)
    }
}
