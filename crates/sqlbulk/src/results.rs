//! Result types of the sync family of operations.

/// Outcome of a full sync: every key of target ∪ source lands in exactly one
/// bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult<M> {
    pub inserted: Vec<M>,
    pub deleted: Vec<M>,
    /// `(old, new)` pairs.
    pub updated: Vec<(M, M)>,
}

impl<M> Default for SyncResult<M> {
    fn default() -> Self {
        Self {
            inserted: Vec::new(),
            deleted: Vec::new(),
            updated: Vec::new(),
        }
    }
}

impl<M> SyncResult<M> {
    /// True if the sync changed nothing.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty() && self.updated.is_empty()
    }

    /// Number of rows changed.
    pub fn total(&self) -> usize {
        self.inserted.len() + self.deleted.len() + self.updated.len()
    }
}

/// Outcome of a sync that leaves rows present on both sides untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncWithoutUpdateResult<M> {
    pub inserted: Vec<M>,
    pub deleted: Vec<M>,
}

impl<M> Default for SyncWithoutUpdateResult<M> {
    fn default() -> Self {
        Self {
            inserted: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<M> SyncWithoutUpdateResult<M> {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.inserted.len() + self.deleted.len()
    }
}

impl<M> From<SyncResult<M>> for SyncWithoutUpdateResult<M> {
    fn from(result: SyncResult<M>) -> Self {
        Self {
            inserted: result.inserted,
            deleted: result.deleted,
        }
    }
}

/// Outcome of an upsert. Nothing is ever deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertResult<M> {
    pub inserted: Vec<M>,
    /// `(old, new)` pairs.
    pub updated: Vec<(M, M)>,
}

impl<M> Default for UpsertResult<M> {
    fn default() -> Self {
        Self {
            inserted: Vec::new(),
            updated: Vec::new(),
        }
    }
}

impl<M> UpsertResult<M> {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty()
    }

    pub fn total(&self) -> usize {
        self.inserted.len() + self.updated.len()
    }
}

impl<M> From<SyncResult<M>> for UpsertResult<M> {
    fn from(result: SyncResult<M>) -> Self {
        Self {
            inserted: result.inserted,
            updated: result.updated,
        }
    }
}
