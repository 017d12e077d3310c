//! Persistence of the last snapshot and the favorites list.
//!
//! The store is a flat key/value surface; the [`SnapshotCache`] adapter owns
//! the two keys and the JSON encoding, and never lets a storage failure
//! escape.

use std::{
    collections::HashMap,
    fmt::Debug,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use anyhow::Context;

use crate::{
    Config,
    error::CacheError,
    model::{FavoritesList, Snapshot},
};

pub const SNAPSHOT_KEY: &str = "snapshot";
pub const FAVORITES_KEY: &str = "favorites";

/// A persistent string store. `set` replaces the whole value atomically.
pub trait KeyValueStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// One file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;

        // Write beside the target and rename over it so readers never see a
        // partial file.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// File-backed cache in the configured cache directory. Needs no provider.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let dir = config.cache_dir().context("Could not determine cache directory")?;
        Ok(Self::new(Arc::new(FileStore::new(dir))))
    }

    /// Replace the cached snapshot. Failures are logged and dropped.
    pub fn save(&self, snapshot: &Snapshot) {
        if let Err(e) = self.try_save(snapshot) {
            warn!(error = %e, "Failed to cache weather snapshot");
        }
    }

    fn try_save(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        let json = serde_json::to_string(snapshot)?;
        self.store.set(SNAPSHOT_KEY, &json)?;
        debug!(place = %snapshot.conditions.place_name, "Snapshot cached");
        Ok(())
    }

    /// The cached snapshot, always marked stale. Missing, unreadable and
    /// corrupt entries all read as `None`.
    pub fn load(&self) -> Option<Snapshot> {
        let raw = match self.store.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read cached snapshot");
                return None;
            }
        };

        match serde_json::from_str::<Snapshot>(&raw) {
            Ok(snapshot) => Some(snapshot.into_stale()),
            Err(e) => {
                warn!(error = %e, "Ignoring corrupt cached snapshot");
                None
            }
        }
    }

    /// Saved favorites; empty when nothing usable is stored.
    pub fn load_favorites(&self) -> FavoritesList {
        let raw = match self.store.get(FAVORITES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return FavoritesList::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read favorites");
                return FavoritesList::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring corrupt favorites");
            FavoritesList::new()
        })
    }

    pub fn save_favorites(&self, favorites: &FavoritesList) {
        let result = serde_json::to_string(favorites)
            .map_err(CacheError::from)
            .and_then(|json| self.store.set(FAVORITES_KEY, &json));
        if let Err(e) = result {
            warn!(error = %e, "Failed to save favorites");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinates, CurrentConditions, ForecastEntry};

    fn snapshot() -> Snapshot {
        Snapshot::fresh(
            CurrentConditions {
                place_name: "Oslo".into(),
                country_code: "NO".into(),
                temperature_celsius: -3.7,
                humidity_percent: 81,
                wind_speed_kph: 12.24,
                condition_code: "13d".into(),
                condition_text: "light snow".into(),
                coordinates: Coordinates::new(59.9127, 10.7461).unwrap(),
            },
            vec![ForecastEntry {
                timestamp_unix_seconds: 1_700_010_800,
                temperature_celsius: -4.1,
                condition_code: "13n".into(),
                condition_text: "snow".into(),
            }],
            1_700_000_000,
        )
    }

    #[derive(Debug)]
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked").into())
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            Err(io::Error::other("disk full").into())
        }
    }

    #[test]
    fn save_twice_then_load_is_stale_copy() {
        let cache = SnapshotCache::in_memory();
        let s = snapshot();

        cache.save(&s);
        cache.save(&s);
        let loaded = cache.load().expect("snapshot cached");

        assert!(loaded.is_stale);
        assert_eq!(loaded.conditions, s.conditions);
        assert_eq!(loaded.forecast, s.forecast);
        assert_eq!(loaded.captured_at_unix_seconds, s.captured_at_unix_seconds);
    }

    #[test]
    fn stored_fresh_flag_is_ignored_on_load() {
        let store = Arc::new(MemoryStore::new());
        let json = serde_json::to_string(&snapshot()).unwrap();
        assert!(json.contains("\"is_stale\":false"));
        store.set(SNAPSHOT_KEY, &json).unwrap();

        let loaded = SnapshotCache::new(store).load().unwrap();
        assert!(loaded.is_stale);
    }

    #[test]
    fn corrupt_snapshot_reads_as_none() {
        let store = Arc::new(MemoryStore::new());
        store.set(SNAPSHOT_KEY, "{\"conditions\": [oops").unwrap();

        assert!(SnapshotCache::new(store).load().is_none());
    }

    #[test]
    fn corrupt_favorites_read_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(FAVORITES_KEY, "[1,").unwrap();

        assert!(SnapshotCache::new(store).load_favorites().is_empty());
    }

    #[test]
    fn broken_store_is_swallowed() {
        let cache = SnapshotCache::new(Arc::new(BrokenStore));
        cache.save(&snapshot());
        assert!(cache.load().is_none());
        assert!(cache.load_favorites().is_empty());
        cache.save_favorites(&FavoritesList::from(vec!["Lima".to_string()]));
    }

    #[test]
    fn favorites_survive_a_round_trip() {
        let cache = SnapshotCache::in_memory();
        let mut favs = cache.load_favorites();
        favs.add("Oslo");
        favs.add("Lima");
        favs.add("Oslo");
        cache.save_favorites(&favs);

        let loaded = cache.load_favorites();
        assert_eq!(loaded.iter().collect::<Vec<_>>(), vec!["Oslo", "Lima"]);
    }

    #[test]
    fn file_store_reads_back_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.get("snapshot").unwrap(), None);

        store.set("snapshot", "first").unwrap();
        store.set("snapshot", "second").unwrap();
        assert_eq!(store.get("snapshot").unwrap().as_deref(), Some("second"));

        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn file_backed_cache_round_trips_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(Arc::new(FileStore::new(dir.path())));
        let s = snapshot();

        cache.save(&s);
        let loaded = cache.load().unwrap();
        assert_eq!(loaded, s.clone().into_stale());
    }

    #[test]
    fn from_config_needs_no_provider() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!("cache_dir = {:?}\n", dir.path().display().to_string());
        let config = Config::from_toml(&toml).unwrap();
        assert!(config.providers.is_empty());

        let cache = SnapshotCache::from_config(&config).unwrap();
        cache.save_favorites(&FavoritesList::from(vec!["Lima".to_string()]));

        assert!(dir.path().join("favorites.json").exists());
        assert_eq!(cache.load_favorites().len(), 1);
    }

    #[test]
    fn concurrent_saves_never_leave_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(Arc::new(FileStore::new(dir.path())));

        std::thread::scope(|scope| {
            for i in 0..8 {
                let cache = cache.clone();
                scope.spawn(move || {
                    let mut s = snapshot();
                    s.captured_at_unix_seconds += i;
                    for _ in 0..10 {
                        cache.save(&s);
                    }
                });
            }
        });

        let loaded = cache.load().expect("a complete snapshot");
        assert!((1_700_000_000..1_700_000_008).contains(&loaded.captured_at_unix_seconds));
    }
}
