//! Advice cache store.
//!
//! An in-memory map of [`CacheRecord`]s keyed by [`CacheKey`], mirrored
//! to a [`BlobStore`] after every mutation. Records hold an append-only
//! list of generated advice entries: new generations append, nothing is
//! ever edited in place, and records only disappear through an explicit
//! per-(user, pet) clear.
//!
//! The entry log is the single source of truth for three consumers:
//! the fresh-hit lookup (reuse within a TTL), the topic selector
//! (themes already used for a pair), and the quota guard (billable
//! generations this month). Entries older than the reuse TTL stay in
//! the log — expiry governs reuse eligibility, not deletion.

pub mod persist;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use persist::{BLOB_KEY, BlobStore, FileBlobStore, MemoryBlobStore};

/// Key fragment used when no user is signed in.
pub const ANON_USER: &str = "anon";

/// Key fragment used when no pet is selected.
pub const NO_PET: &str = "none";

/// Identifier of one logical advice stream: (user, pet, normalized
/// breed). Requests that differ only in raw breed spelling resolve to
/// the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    user: String,
    pet: String,
    breed: String,
}

impl CacheKey {
    /// Build a key from a raw breed name and optional identity.
    ///
    /// The breed is normalized; absent user/pet fall back to the
    /// [`ANON_USER`]/[`NO_PET`] fragments.
    pub fn new(breed: &str, user: Option<&str>, pet: Option<&str>) -> Self {
        Self {
            user: user.unwrap_or(ANON_USER).to_string(),
            pet: pet.unwrap_or(NO_PET).to_string(),
            breed: crate::normalize::normalize(breed),
        }
    }

    /// Parse a persisted `user|pet|breed` key string.
    ///
    /// Returns `None` when the separators are missing. The breed part
    /// may legitimately be empty.
    pub(crate) fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '|');
        let user = parts.next()?;
        let pet = parts.next()?;
        let breed = parts.next()?;
        if user.is_empty() || pet.is_empty() {
            return None;
        }
        Some(Self {
            user: user.to_string(),
            pet: pet.to_string(),
            breed: breed.to_string(),
        })
    }

    /// User fragment (`"anon"` for anonymous callers).
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Pet fragment (`"none"` when no pet is selected).
    pub fn pet(&self) -> &str {
        &self.pet
    }

    /// Normalized breed fragment.
    pub fn breed(&self) -> &str {
        &self.breed
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.user, self.pet, self.breed)
    }
}

/// Origin of a generated advice text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdviceSource {
    /// Primary provider (multi-token, multi-model chain).
    Primary,
    /// Secondary provider fallback.
    Secondary,
    /// Static sentinel: every provider attempt failed. Never billed
    /// against quota.
    Unavailable,
}

impl AdviceSource {
    /// Whether an entry from this source consumes quota.
    pub fn is_billable(&self) -> bool {
        !matches!(self, AdviceSource::Unavailable)
    }

    /// Stable lowercase name, matching the persisted form.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceSource::Primary => "primary",
            AdviceSource::Secondary => "secondary",
            AdviceSource::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for AdviceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generated (or sentinel) advice result. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceEntry {
    /// Advice text as returned by the provider (or the sentinel text).
    pub text: String,
    /// Topic the advice was generated for.
    pub topic: String,
    /// Which provider produced the text.
    pub source: AdviceSource,
    /// Creation timestamp; also the quota-window discriminator.
    pub created_at: DateTime<Utc>,
}

impl AdviceEntry {
    /// Create an entry timestamped now.
    pub fn new(text: impl Into<String>, topic: impl Into<String>, source: AdviceSource) -> Self {
        Self {
            text: text.into(),
            topic: topic.into(),
            source,
            created_at: Utc::now(),
        }
    }
}

/// Per-key record: the append-only entry log plus identity fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    /// Generated entries, ordered by creation time.
    pub entries: Vec<AdviceEntry>,
    /// Fixed at first write.
    pub first_created_at: DateTime<Utc>,
    /// Advances on every append.
    pub last_updated_at: DateTime<Utc>,
    /// User fragment of the key.
    pub user_id: String,
    /// Pet fragment of the key.
    pub pet_id: String,
    /// Normalized breed fragment of the key.
    pub breed: String,
}

/// The advice cache store.
///
/// Interior mutability behind a `Mutex` so the engine can share one
/// store across concurrent requests; every method takes `&self`.
pub struct CacheStore {
    records: Mutex<HashMap<String, CacheRecord>>,
    blob: Arc<dyn BlobStore>,
}

impl CacheStore {
    /// Load the store from the blob adapter, upgrading legacy payloads.
    ///
    /// Corrupt payloads reset to an empty store (logged, counted) —
    /// loading never fails. An upgraded payload is re-persisted
    /// immediately so the migration happens once.
    pub fn load(blob: Arc<dyn BlobStore>) -> Self {
        let decoded = match blob.load(BLOB_KEY) {
            Ok(Some(json)) => persist::decode(&json),
            Ok(None) => persist::Decoded {
                records: HashMap::new(),
                upgraded: false,
            },
            Err(e) => {
                warn!(error = %e, "failed to read persisted advice cache, starting empty");
                metrics::counter!(crate::telemetry::STORE_RESETS_TOTAL).increment(1);
                persist::Decoded {
                    records: HashMap::new(),
                    upgraded: false,
                }
            }
        };

        let store = Self {
            records: Mutex::new(decoded.records),
            blob,
        };
        if decoded.upgraded {
            debug!("re-persisting upgraded advice cache payload");
            store.persist();
        }
        store
    }

    /// Create an empty store over the given adapter without loading.
    pub fn empty(blob: Arc<dyn BlobStore>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            blob,
        }
    }

    /// Most recent entry for the key, if younger than `ttl`.
    ///
    /// Expired entries are not returned but remain in the log for
    /// quota and topic history.
    pub fn fresh(&self, key: &CacheKey, ttl: Duration) -> Option<AdviceEntry> {
        let records = self.records.lock().expect("store lock poisoned");
        let record = records.get(&key.to_string())?;
        let last = record.entries.last()?;
        let age = Utc::now().signed_duration_since(last.created_at);
        match chrono::Duration::from_std(ttl) {
            Ok(limit) if age >= limit => None,
            // Out-of-range TTLs behave as "never expires".
            _ => Some(last.clone()),
        }
    }

    /// Append an entry, creating the record on first write, and persist
    /// the whole store.
    ///
    /// A persistence failure keeps the in-memory append and is logged —
    /// the generation result is never discarded over a storage error.
    pub fn append(&self, key: &CacheKey, entry: AdviceEntry) {
        {
            let mut records = self.records.lock().expect("store lock poisoned");
            let record = records
                .entry(key.to_string())
                .or_insert_with(|| CacheRecord {
                    entries: Vec::new(),
                    first_created_at: entry.created_at,
                    last_updated_at: entry.created_at,
                    user_id: key.user().to_string(),
                    pet_id: key.pet().to_string(),
                    breed: key.breed().to_string(),
                });
            record.last_updated_at = entry.created_at;
            record.entries.push(entry);
        }
        self.persist();
    }

    /// Remove every record for a (user, pet) pair; returns the number
    /// removed. Other users' and pets' records are untouched.
    pub fn clear_for(&self, user: Option<&str>, pet: Option<&str>) -> usize {
        let user = user.unwrap_or(ANON_USER);
        let pet = pet.unwrap_or(NO_PET);
        let removed = {
            let mut records = self.records.lock().expect("store lock poisoned");
            let before = records.len();
            records.retain(|_, r| !(r.user_id == user && r.pet_id == pet));
            before - records.len()
        };
        if removed > 0 {
            self.persist();
        }
        removed
    }

    /// Topics already used for a (user, pet) pair, across all breeds.
    pub fn used_topics(&self, user: Option<&str>, pet: Option<&str>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.entries_for(user, pet)
            .into_iter()
            .map(|e| e.topic)
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    /// Full entry history for a (user, pet) pair, most recent first.
    pub fn history(&self, user: Option<&str>, pet: Option<&str>) -> Vec<AdviceEntry> {
        let mut entries = self.entries_for(user, pet);
        entries.reverse();
        entries
    }

    /// All entries for a (user, pet) pair in chronological order,
    /// flattened across breeds. Feeds the quota guard and topic
    /// selector.
    pub fn entries_for(&self, user: Option<&str>, pet: Option<&str>) -> Vec<AdviceEntry> {
        let user = user.unwrap_or(ANON_USER);
        let pet = pet.unwrap_or(NO_PET);
        let records = self.records.lock().expect("store lock poisoned");
        let mut entries: Vec<AdviceEntry> = records
            .values()
            .filter(|r| r.user_id == user && r.pet_id == pet)
            .flat_map(|r| r.entries.iter().cloned())
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.lock().expect("store lock poisoned").len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mirror the in-memory map to the blob adapter.
    fn persist(&self) {
        let encoded = {
            let records = self.records.lock().expect("store lock poisoned");
            persist::encode(&records)
        };
        match encoded {
            Ok(json) => {
                if let Err(e) = self.blob.save(BLOB_KEY, &json) {
                    warn!(error = %e, "failed to persist advice cache");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode advice cache"),
        }
    }
}
