use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::playback::PreparedSong;

/// Prepared timelines keyed by song display name.
///
/// Entries are shared read-only; replacing an entry never affects
/// playbacks already holding the previous one. There is no eviction.
#[derive(Debug, Default)]
pub struct SongCache {
    songs: RwLock<HashMap<String, Arc<PreparedSong>>>,
}

impl SongCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.songs.read().contains_key(name)
    }

    /// Last writer wins; content for a name is deterministic anyway.
    pub fn add_or_update(&self, name: &str, song: Arc<PreparedSong>) {
        debug!("caching '{}' ({} events)", name, song.timeline.len());
        self.songs.write().insert(name.to_string(), song);
    }

    pub fn get(&self, name: &str) -> Option<Arc<PreparedSong>> {
        self.songs.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.songs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.read().is_empty()
    }

    pub fn clear(&self) {
        self.songs.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::TempoMap;

    fn song(name: &str) -> Arc<PreparedSong> {
        Arc::new(PreparedSong {
            name: name.to_string(),
            tempo_map: TempoMap::default(),
            tracks: Vec::new(),
            timeline: Vec::new(),
        })
    }

    #[test]
    fn hit_returns_the_same_timeline() {
        let cache = SongCache::new();
        assert!(!cache.is_cached("intro"));
        let entry = song("intro");
        cache.add_or_update("intro", entry.clone());
        assert!(cache.is_cached("intro"));
        let hit = cache.get("intro").unwrap();
        assert!(Arc::ptr_eq(&hit, &entry));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn update_replaces_without_touching_held_entries() {
        let cache = SongCache::new();
        let first = song("a");
        cache.add_or_update("a", first.clone());
        let held = cache.get("a").unwrap();
        cache.add_or_update("a", song("a"));
        assert!(Arc::ptr_eq(&held, &first));
        assert!(!Arc::ptr_eq(&cache.get("a").unwrap(), &first));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
    }
}
