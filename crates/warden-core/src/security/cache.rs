//! Compiled command filters cached per policy.
//!
//! Sessions granted by the same policy share one [`CommandFilter`]. Entries
//! are keyed by policy id and carry a fingerprint of the command mode and
//! patterns they were compiled from; a differing fingerprint rebuilds the
//! entry. Policy versions are not trusted for this, since a deleted and
//! recreated policy starts over at version 1.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use super::filter::CommandFilter;
use crate::models::Restrictions;

#[derive(Debug, Clone)]
struct CachedFilter {
    fingerprint: String,
    filter: Arc<CommandFilter>,
}

/// SHA-256 over the mode and each pattern, length-prefixed so that pattern
/// boundaries cannot collide.
fn fingerprint(restrictions: &Restrictions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(restrictions.command_mode.to_string().as_bytes());
    for pattern in &restrictions.command_patterns {
        hasher.update((pattern.len() as u64).to_le_bytes());
        hasher.update(pattern.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug)]
pub struct FilterCache {
    filters: DashMap<String, CachedFilter>,
    default_filter: Arc<CommandFilter>,
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCache {
    pub fn new() -> Self {
        Self {
            filters: DashMap::new(),
            default_filter: Arc::new(CommandFilter::builtin_blacklist()),
        }
    }

    /// Filter for a session granted by `policy_id` with `restrictions`.
    ///
    /// Sessions without a policy (administrative access) get the built-in
    /// blacklist.
    pub fn filter_for(
        &self,
        policy_id: Option<&str>,
        restrictions: Option<&Restrictions>,
    ) -> Arc<CommandFilter> {
        let (Some(policy_id), Some(restrictions)) = (policy_id, restrictions) else {
            return self.default_filter.clone();
        };

        let fingerprint = fingerprint(restrictions);
        if let Some(cached) = self.filters.get(policy_id)
            && cached.fingerprint == fingerprint
        {
            return cached.filter.clone();
        }

        debug!(
            policy_id,
            version = restrictions.policy_version,
            "Compiling command filter"
        );
        let filter = Arc::new(CommandFilter::new(
            restrictions.command_mode,
            &restrictions.command_patterns,
        ));
        self.filters.insert(
            policy_id.to_string(),
            CachedFilter {
                fingerprint,
                filter: filter.clone(),
            },
        );
        filter
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
