//! A thread safe, ttl aware record cache with JSON snapshots

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument, warn};

use crate::{unix_now, DnsError, ResourceRecord};

/// Records are cached per (type, name). Names are compared exactly as
/// received, so `Example.com` and `example.com` are separate keys.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheKey {
    pub type_: u16,
    pub name: String,
}

impl CacheKey {
    pub fn new(type_: u16, name: &str) -> Self {
        Self {
            type_,
            name: name.to_owned(),
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.type_, self.name)
    }
}

impl FromStr for CacheKey {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_, name) = s
            .split_once(':')
            .ok_or_else(|| DnsError::format(format!("cache key {s:?} has no type")))?;
        let type_ = type_
            .parse()
            .map_err(|_| DnsError::format(format!("cache key {s:?} has a bad type")))?;

        Ok(Self::new(type_, name))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub keys_removed: usize,
    pub keys_remaining: usize,
}

type Entries = HashMap<CacheKey, Vec<ResourceRecord>>;

/// The only shared mutable state of the server. Every operation takes the
/// lock for just as long as it touches the map.
#[derive(Debug, Default)]
pub struct Cache {
    entries: Mutex<Entries>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        // A panic elsewhere never leaves the map half updated
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, key: &CacheKey) -> Vec<ResourceRecord> {
        self.lookup_at(key, unix_now())
    }

    /// Returns the records under `key` that are still fresh at `now`.
    /// Expired records are pruned, and the key is dropped once nothing is left.
    pub fn lookup_at(&self, key: &CacheKey, now: f64) -> Vec<ResourceRecord> {
        let mut entries = self.entries();

        let Some(records) = entries.get_mut(key) else {
            return Vec::new();
        };

        records.retain(|r| !r.is_expired(now));

        if records.is_empty() {
            entries.remove(key);
            return Vec::new();
        }

        records.clone()
    }

    pub fn insert(&self, record: ResourceRecord) {
        self.entries()
            .entry(record.key())
            .or_default()
            .push(record);
    }

    /// Inserts a whole reply's worth of records under one lock
    pub fn extend(&self, records: impl IntoIterator<Item = ResourceRecord>) {
        let mut entries = self.entries();
        for record in records {
            entries.entry(record.key()).or_default().push(record);
        }
    }

    pub fn sweep(&self) -> SweepStats {
        self.sweep_at(unix_now())
    }

    pub fn sweep_at(&self, now: f64) -> SweepStats {
        let mut entries = self.entries();
        let stats = prune(&mut entries, now);
        debug!(?stats, "swept cache");
        stats
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.entries().values().map(Vec::len).sum()
    }

    /// Loads a snapshot, dropping records already expired by wall clock age.
    /// A missing or unreadable snapshot yields an empty cache.
    pub fn load(path: &Path) -> Self {
        Self::load_at(path, unix_now())
    }

    #[instrument(level = "debug", skip(now))]
    pub fn load_at(path: &Path, now: f64) -> Self {
        let cache = Self::new();

        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no cache snapshot, starting empty");
                return cache;
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "could not read cache snapshot, starting empty"
                );
                return cache;
            }
        };

        let snapshot: BTreeMap<String, Vec<ResourceRecord>> =
            match serde_json::from_slice(&contents) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    let e = DnsError::SnapshotCorrupt(path.to_owned(), e);
                    warn!(error = %e, "starting with an empty cache");
                    return cache;
                }
            };

        {
            // Records are filed under their own key rather than the stored
            // key text, so every list holds records of a single key
            let mut entries = cache.entries();
            for (stored_key, records) in snapshot {
                if stored_key.parse::<CacheKey>().is_err() {
                    warn!(key = %stored_key, "malformed snapshot key");
                }
                for record in records {
                    entries.entry(record.key()).or_default().push(record);
                }
            }
            prune(&mut entries, now);
        }

        info!(
            keys = cache.len(),
            records = cache.record_count(),
            "loaded cache snapshot"
        );

        cache
    }

    /// Writes every cached record, fresh or not, as a JSON object keyed by
    /// `"<type>:<name>"`. The file is replaced atomically.
    #[instrument(level = "debug", skip(self))]
    pub fn save(&self, path: &Path) -> Result<(), DnsError> {
        let snapshot: BTreeMap<String, Vec<ResourceRecord>> = self
            .entries()
            .iter()
            .map(|(key, records)| (key.to_string(), records.clone()))
            .collect();

        let write_err = |e: std::io::Error| DnsError::SnapshotWrite(path.to_owned(), e);

        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| write_err(std::io::Error::other(e)))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;

        debug!(keys = snapshot.len(), "saved cache snapshot");
        Ok(())
    }
}

fn prune(entries: &mut Entries, now: f64) -> SweepStats {
    let mut stats = SweepStats::default();

    entries.retain(|_, records| {
        let before = records.len();
        records.retain(|r| !r.is_expired(now));
        stats.expired += before - records.len();

        if records.is_empty() {
            stats.keys_removed += 1;
            false
        } else {
            true
        }
    });

    stats.keys_remaining = entries.len();
    stats
}
