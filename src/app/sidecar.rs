// AssetLens - app/sidecar.rs
//
// Sidecar store: the per-item description/flags/notes database consulted by
// the Info worker. Only the lookup boundary lives here; the database schema
// and its editing UI belong to the embedding application.
//
// Rows are keyed by proxy path (see core::sequence::proxy_path), so a
// sequence keeps its row as frames are added or removed.

use crate::core::model::ItemFlags;
use crate::util::error::SidecarError;
use parking_lot::RwLock;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// One item's sidecar data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidecarRow {
    pub description: String,
    pub flags: ItemFlags,
    pub notes: u32,
}

/// Lookup interface of a sidecar database.
pub trait SidecarStore: Send + Sync {
    /// Row for `proxy_path`, or `None` if the item has no sidecar data.
    fn row(&self, proxy_path: &str) -> Result<Option<SidecarRow>, SidecarError>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Mutable in-memory store for embedders and tests.
#[derive(Debug, Default)]
pub struct MemorySidecar {
    rows: RwLock<HashMap<String, SidecarRow>>,
}

impl MemorySidecar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, proxy_path: impl Into<String>, row: SidecarRow) {
        self.rows.write().insert(proxy_path.into(), row);
    }

    pub fn remove(&self, proxy_path: &str) -> Option<SidecarRow> {
        self.rows.write().remove(proxy_path)
    }
}

impl SidecarStore for MemorySidecar {
    fn row(&self, proxy_path: &str) -> Result<Option<SidecarRow>, SidecarError> {
        Ok(self.rows.read().get(proxy_path).cloned())
    }
}

// =============================================================================
// JSON file store
// =============================================================================

/// On-disk shape of one JSON sidecar row.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonRow {
    description: String,
    archived: bool,
    favourite: bool,
    active: bool,
    notes: u32,
}

impl From<JsonRow> for SidecarRow {
    fn from(raw: JsonRow) -> Self {
        let mut flags = ItemFlags::empty();
        flags.set(ItemFlags::ARCHIVED, raw.archived);
        flags.set(ItemFlags::FAVOURITE, raw.favourite);
        flags.set(ItemFlags::ACTIVE, raw.active);
        SidecarRow {
            description: raw.description,
            flags,
            notes: raw.notes,
        }
    }
}

/// Read-only store loaded from a JSON object mapping paths to rows:
///
/// ```json
/// { "/jobs/show/a.png": { "description": "hero #wip", "favourite": true } }
/// ```
///
/// Relative keys are resolved against the file's directory.
#[derive(Debug)]
pub struct JsonSidecar {
    path: PathBuf,
    rows: HashMap<String, SidecarRow>,
}

impl JsonSidecar {
    pub fn load(path: &Path) -> Result<Self, SidecarError> {
        let content = std::fs::read_to_string(path).map_err(|source| SidecarError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: HashMap<String, JsonRow> =
            serde_json::from_str(&content).map_err(|source| SidecarError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let rows: HashMap<String, SidecarRow> = raw
            .into_iter()
            .map(|(key, row)| {
                let key_path = Path::new(&key);
                let key = if key_path.is_relative() {
                    base.join(key_path).to_string_lossy().into_owned()
                } else {
                    key
                };
                (key, SidecarRow::from(row))
            })
            .collect();

        tracing::info!(path = %path.display(), rows = rows.len(), "Sidecar loaded");
        Ok(Self {
            path: path.to_path_buf(),
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl SidecarStore for JsonSidecar {
    fn row(&self, proxy_path: &str) -> Result<Option<SidecarRow>, SidecarError> {
        Ok(self.rows.get(proxy_path).cloned())
    }
}

// =============================================================================
// Description normalisation
// =============================================================================

/// Normalise the hashtags of a description.
///
/// Repeated `#` collapse to one, bare `#` tokens are dropped, a `#` inside a
/// word becomes `_`, and hashtags move to the end sorted and deduplicated.
///
/// `"#b hello ##a  world #b"` becomes `"hello world #a #b"`.
pub fn sanitize_hashtags(description: &str) -> String {
    static MULTI_HASH: OnceLock<Regex> = OnceLock::new();
    let multi_hash =
        MULTI_HASH.get_or_init(|| Regex::new("##+").expect("sanitize_hashtags: invalid regex"));

    let mut words: Vec<String> = Vec::new();
    let mut tags: Vec<String> = Vec::new();

    for token in description.split_whitespace() {
        let token = multi_hash.replace_all(token, "#");
        if token == "#" {
            continue;
        }
        if token.starts_with('#') {
            tags.push(join_inner_hashes(&token));
        } else {
            words.push(token.into_owned());
        }
    }

    tags.sort();
    tags.dedup();
    words.extend(tags);
    words.join(" ")
}

/// Replace every `#` that directly follows a word character with `_`.
fn join_inner_hashes(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut prev: Option<char> = None;
    for c in token.chars() {
        let after_word = prev.is_some_and(|p| p.is_alphanumeric() || p == '_');
        if c == '#' && after_word {
            out.push('_');
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}
