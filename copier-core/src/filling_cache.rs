//! Per-symbol filling-mode cache (§4.4). A plain `slave_symbol -> mode`
//! map; entries are written on `DONE` and deleted on `INVALID_FILL`. Not
//! persisted across restarts — discovery is cheap relative to engine
//! uptime.

use crate::model::FillingMode;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct FillingModeCache {
    modes: RwLock<HashMap<String, FillingMode>>,
}

impl FillingModeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, slave_symbol: &str) -> Option<FillingMode> {
        self.modes.read().await.get(slave_symbol).copied()
    }

    pub async fn record_success(&self, slave_symbol: &str, mode: FillingMode) {
        self.modes.write().await.insert(slave_symbol.to_string(), mode);
    }

    /// Invalidates the cache entry after an `INVALID_FILL` rejection, but
    /// only when the rejected mode was the one the cache had suggested —
    /// a rejection of a mode tried during fresh discovery must not clobber
    /// an unrelated cached entry for the same symbol.
    pub async fn invalidate_if_matches(&self, slave_symbol: &str, rejected: FillingMode) {
        let mut modes = self.modes.write().await;
        if modes.get(slave_symbol) == Some(&rejected) {
            modes.remove(slave_symbol);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_reads_back() {
        let cache = FillingModeCache::new();
        assert_eq!(cache.get("EURUSD-STD").await, None);
        cache.record_success("EURUSD-STD", FillingMode::Fok).await;
        assert_eq!(cache.get("EURUSD-STD").await, Some(FillingMode::Fok));
    }

    #[tokio::test]
    async fn invalidates_only_matching_mode() {
        let cache = FillingModeCache::new();
        cache.record_success("EURUSD-STD", FillingMode::Fok).await;
        cache.invalidate_if_matches("EURUSD-STD", FillingMode::Ioc).await;
        assert_eq!(cache.get("EURUSD-STD").await, Some(FillingMode::Fok));

        cache.invalidate_if_matches("EURUSD-STD", FillingMode::Fok).await;
        assert_eq!(cache.get("EURUSD-STD").await, None);
    }
}
