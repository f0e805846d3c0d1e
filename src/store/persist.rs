//! Persistence adapter and versioned on-disk format.
//!
//! The cache store mirrors its in-memory map to an opaque key-value
//! blob store through the [`BlobStore`] trait, so tests substitute an
//! in-memory fake and the embedding application plugs in whatever
//! storage it has (a file, browser storage, a KV service).
//!
//! # Payload format
//!
//! The current payload is versioned JSON under the `advice_cache` key:
//!
//! ```json
//! { "version": 2, "records": [["u1|p1|labrador", { ... }], ...] }
//! ```
//!
//! Loading also accepts two legacy shapes and upgrades them in place:
//!
//! - the bare array of `[key, record]` pairs written before the payload
//!   was versioned;
//! - single-entry records (`{"text": ..., "topic": ..., "createdAt": ...}`)
//!   written before records grew the `entries` array — each is upgraded
//!   into a one-entry record and the upgraded payload is re-persisted.
//!
//! Anything else — unparseable JSON, an unsupported version, a record
//! double-wrapped under a `data` field — resets the store to empty
//! rather than propagating a parse error to callers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{AdviceEntry, AdviceSource, CacheKey, CacheRecord};
use crate::{ConsejoError, Result};

/// Blob key the whole store is persisted under.
pub const BLOB_KEY: &str = "advice_cache";

/// Current payload format version.
const CURRENT_VERSION: u32 = 2;

/// Synchronous opaque key-value blob storage.
///
/// `load` returns `Ok(None)` for a missing key. Implementations are
/// free to impose size limits; errors surface as
/// [`ConsejoError::Persistence`].
pub trait BlobStore: Send + Sync {
    /// Read the blob stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous blob.
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory blob store for tests and ephemeral use.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with one blob. Handy for migration
    /// tests.
    pub fn with_blob(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .blobs
            .lock()
            .expect("blob lock poisoned")
            .insert(key.into(), value.into());
        store
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .blobs
            .lock()
            .expect("blob lock poisoned")
            .get(key)
            .cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.blobs
            .lock()
            .expect("blob lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed blob store: one file per key under a base directory.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    /// Store blobs under the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default location: `~/.cache/consejo/`.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("consejo")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Default for FileBlobStore {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConsejoError::Persistence(format!(
                "failed to read blob '{key}': {e}"
            ))),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            ConsejoError::Persistence(format!("failed to create blob dir: {e}"))
        })?;
        std::fs::write(self.path_for(key), value).map_err(|e| {
            ConsejoError::Persistence(format!("failed to write blob '{key}': {e}"))
        })
    }
}

// ============================================================================
// Encoding / decoding
// ============================================================================

#[derive(Serialize)]
struct PayloadOut<'a> {
    version: u32,
    records: Vec<(&'a str, &'a CacheRecord)>,
}

/// Encode the record map as the current versioned payload.
///
/// Records are sorted by key so the blob is byte-stable for identical
/// store contents.
pub(crate) fn encode(records: &HashMap<String, CacheRecord>) -> Result<String> {
    let mut pairs: Vec<(&str, &CacheRecord)> = records
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    Ok(serde_json::to_string(&PayloadOut {
        version: CURRENT_VERSION,
        records: pairs,
    })?)
}

/// Result of decoding a persisted payload.
pub(crate) struct Decoded {
    pub records: HashMap<String, CacheRecord>,
    /// Legacy shapes were upgraded; the caller must re-persist.
    pub upgraded: bool,
}

/// Single-entry record shape written by pre-`entries` versions.
///
/// Older versions persisted only successful generations, so a missing
/// `source` decodes as `primary`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEntry {
    #[serde(alias = "advice")]
    text: String,
    topic: String,
    #[serde(default = "legacy_source")]
    source: AdviceSource,
    created_at: chrono::DateTime<chrono::Utc>,
}

fn legacy_source() -> AdviceSource {
    AdviceSource::Primary
}

/// Decode a persisted payload, upgrading legacy shapes.
///
/// Never fails: any corruption resets to an empty store, logged and
/// counted, so the caller's request proceeds as a cache miss.
pub(crate) fn decode(json: &str) -> Decoded {
    match try_decode(json) {
        Ok(decoded) => decoded,
        Err(reason) => {
            warn!(reason, "resetting persisted advice cache");
            metrics::counter!(crate::telemetry::STORE_RESETS_TOTAL).increment(1);
            Decoded {
                records: HashMap::new(),
                upgraded: false,
            }
        }
    }
}

fn try_decode(json: &str) -> std::result::Result<Decoded, &'static str> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|_| "unparseable JSON")?;

    let (version, raw_records) = match &value {
        serde_json::Value::Object(obj) => {
            let version = obj
                .get("version")
                .and_then(|v| v.as_u64())
                .ok_or("missing version field")? as u32;
            let records = obj
                .get("records")
                .and_then(|v| v.as_array())
                .ok_or("missing records array")?;
            (version, records)
        }
        // Legacy payloads are a bare array of [key, record] pairs.
        serde_json::Value::Array(records) => (1, records),
        _ => return Err("unexpected payload shape"),
    };

    if version > CURRENT_VERSION {
        return Err("unsupported payload version");
    }

    let mut records = HashMap::with_capacity(raw_records.len());
    let mut upgraded = version < CURRENT_VERSION;

    for pair in raw_records {
        let [key_value, record_value] = pair
            .as_array()
            .and_then(|p| <&[serde_json::Value; 2]>::try_from(p.as_slice()).ok())
            .ok_or("malformed record pair")?;
        let key_string = key_value.as_str().ok_or("non-string record key")?;
        let key = CacheKey::parse(key_string).ok_or("malformed record key")?;

        if is_double_wrapped(record_value) {
            return Err("double-wrapped record");
        }

        if let Ok(record) = CacheRecord::deserialize(record_value) {
            records.insert(key_string.to_string(), record);
        } else if let Ok(entry) = LegacyEntry::deserialize(record_value) {
            records.insert(key_string.to_string(), upgrade_legacy(&key, entry));
            upgraded = true;
        } else {
            return Err("unrecognised record shape");
        }
    }

    Ok(Decoded { records, upgraded })
}

/// A record that wraps a full cache record under a `data` field — the
/// double-write bug shape. One occurrence poisons the whole payload.
fn is_double_wrapped(value: &serde_json::Value) -> bool {
    value
        .get("data")
        .and_then(|d| d.as_object())
        .is_some_and(|inner| inner.contains_key("entries") || inner.contains_key("text"))
}

/// Upgrade a single-entry record into the current array shape.
fn upgrade_legacy(key: &CacheKey, legacy: LegacyEntry) -> CacheRecord {
    let entry = AdviceEntry {
        text: legacy.text,
        topic: legacy.topic,
        source: legacy.source,
        created_at: legacy.created_at,
    };
    CacheRecord {
        first_created_at: entry.created_at,
        last_updated_at: entry.created_at,
        user_id: key.user().to_string(),
        pet_id: key.pet().to_string(),
        breed: key.breed().to_string(),
        entries: vec![entry],
    }
}
