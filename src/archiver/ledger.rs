//! Per-session record of claimed downloads.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Identifies one downloadable unit within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// A post's media (thumbnail plus full attachment).
    Post(u64),
    /// A static asset, by endpoint path.
    Asset(String),
    /// A local path relative to the thread root. At most one task writes it.
    Path(String),
}

impl ResourceKey {
    pub fn asset(endpoint: &str) -> Self {
        ResourceKey::Asset(endpoint.trim_start_matches('/').to_string())
    }
}

/// Set of resource keys already claimed for download in one session.
///
/// Claiming is atomic: of any number of concurrent callers claiming the same
/// key, exactly one gets `true`. Callers spawn the download only after a
/// successful claim, so a key is downloaded at most once per session.
#[derive(Debug, Default)]
pub struct DedupLedger {
    claimed: Mutex<HashSet<ResourceKey>>,
}

impl DedupLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns `false` if it was already claimed.
    pub fn claim(&self, key: ResourceKey) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }
}
