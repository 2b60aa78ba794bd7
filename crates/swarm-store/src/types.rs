//! Namespaces and errors shared by every store backend.

use std::fmt;
use std::path::PathBuf;

/// A hierarchical record namespace such as `proofs/by_agent/agent-1`.
///
/// Segments are sanitised on construction so that a namespace (or a record
/// id) can never address anything outside of the store root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    segments: Vec<String>,
}

impl Namespace {
    /// Build a namespace from a `/`-separated path.
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .map(encode_segment)
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Append a child segment, e.g. an agent id or a category.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        let segment = encode_segment(segment);
        if !segment.is_empty() {
            segments.push(segment);
        }
        Self { segments }
    }

    /// Append a segment that is already in stored form, as returned by
    /// `RecordStore::children`.
    pub(crate) fn stored_child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        if !name.is_empty() && !name.chars().all(|c| c == '.') && !name.contains('/') {
            segments.push(name.to_string());
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Relative filesystem path of this namespace.
    pub fn to_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl From<&str> for Namespace {
    fn from(path: &str) -> Self {
        Namespace::new(path)
    }
}

/// Longest name a segment keeps verbatim.
pub const MAX_SEGMENT_LEN: usize = 96;

const READABLE_PREFIX_LEN: usize = 48;
const DIGEST_LEN: usize = 32;

fn is_plain(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '+' | '@')
}

/// Map a raw id or segment to a single safe file name component.
///
/// Plain names up to [`MAX_SEGMENT_LEN`] are kept as they are. Anything else
/// becomes a readable prefix, a `~` and a digest of the raw name. `~` never
/// appears in a plain name, so two different raw names never share a stored
/// name and the result always fits in a file name.
pub fn encode_segment(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let plain = raw.len() <= MAX_SEGMENT_LEN
        && raw.chars().all(is_plain)
        // "." and ".." would walk the tree
        && !raw.chars().all(|c| c == '.');
    if plain {
        return raw.to_string();
    }

    let prefix: String = raw
        .chars()
        .map(|c| if is_plain(c) { c } else { '_' })
        .take(READABLE_PREFIX_LEN)
        .collect();
    let prefix = prefix.trim_start_matches('.');
    let digest = blake3::hash(raw.as_bytes()).to_hex();
    format!("{}~{}", prefix, &digest.as_str()[..DIGEST_LEN])
}

/// Errors produced by record store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record {namespace}/{id}: {reason}")]
    Corrupt {
        namespace: String,
        id: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record id: {0:?}")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
