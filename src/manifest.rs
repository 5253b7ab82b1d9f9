use crate::error::ManifestError;
use crate::fs::FileSystem;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Classification of a source file in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Markdown,
    Hypercode,
}

/// Metadata for one file that contributed to a compilation.
///
/// Fields are declared in the alphabetical key order the manifest format
/// requires; serde_json preserves declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the compilation root, forward slashes.
    pub path: String,
    /// SHA-256 of the normalized (LF) content, lowercase hex.
    pub sha256: String,
    /// Raw byte size before line-ending normalization.
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

/// Accumulator for manifest entries during a single compilation.
/// Deduplicates by canonical path so a file referenced from several
/// branches appears once.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    seen: HashSet<PathBuf>,
    entries: Vec<ManifestEntry>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a source file. Returns false if the canonical path was
    /// already recorded.
    pub fn add(&mut self, canonical: &Path, entry: ManifestEntry) -> bool {
        if !self.seen.insert(canonical.to_path_buf()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ManifestEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Deterministic provenance record for a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub root: String,
    pub sources: Vec<ManifestEntry>,
    pub timestamp: String,
    pub version: String,
}

/// Build a manifest from collected entries.
///
/// Entries are re-sorted by path on every call; determinism never relies
/// on insertion order.
pub fn generate(
    mut entries: Vec<ManifestEntry>,
    version: &str,
    root: &str,
    timestamp: &str,
) -> Manifest {
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Manifest {
        root: root.to_string(),
        sources: entries,
        timestamp: timestamp.to_string(),
        version: version.to_string(),
    }
}

/// Serialize a manifest to pretty-printed JSON with keys in alphabetical
/// order at every level and exactly one trailing line feed.
pub fn serialize(manifest: &Manifest) -> Result<String, ManifestError> {
    let json = serde_json::to_string_pretty(manifest).map_err(|e| ManifestError::EncodingFailed {
        reason: e.to_string(),
    })?;
    Ok(format!("{}\n", json.trim_end()))
}

/// SHA-256 of content, lowercase hex.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Environment variable carrying an explicit build timestamp override.
pub const BUILD_TIMESTAMP_VAR: &str = "HYPERPROMPT_BUILD_TIMESTAMP";

/// Reproducible-builds convention variable, honored after the explicit one.
pub const SOURCE_DATE_EPOCH_VAR: &str = "SOURCE_DATE_EPOCH";

/// Resolves deterministic timestamps for manifest generation.
///
/// Priority: explicit build-timestamp override, then `SOURCE_DATE_EPOCH`,
/// then the input file's modification time, then the Unix epoch start.
#[derive(Debug)]
pub struct TimestampProvider {
    environment: HashMap<String, String>,
}

impl TimestampProvider {
    pub fn new() -> Self {
        TimestampProvider {
            environment: std::env::vars().collect(),
        }
    }

    pub fn with_environment(environment: HashMap<String, String>) -> Self {
        TimestampProvider { environment }
    }

    /// Resolve an ISO-8601 UTC timestamp string for the given input file.
    pub fn resolve(&self, input_path: &Path, fs: &dyn FileSystem) -> String {
        format_timestamp(self.resolve_datetime(input_path, fs))
    }

    fn resolve_datetime(&self, input_path: &Path, fs: &dyn FileSystem) -> DateTime<Utc> {
        if let Some(explicit) = self.explicit_epoch() {
            return explicit;
        }

        if let Ok(stat) = fs.stat(input_path) {
            if let Some(modified) = stat.modified {
                return DateTime::<Utc>::from(modified);
            }
        }

        DateTime::UNIX_EPOCH
    }

    fn explicit_epoch(&self) -> Option<DateTime<Utc>> {
        let value = self
            .environment
            .get(BUILD_TIMESTAMP_VAR)
            .or_else(|| self.environment.get(SOURCE_DATE_EPOCH_VAR))?;
        let seconds: i64 = value.parse().ok()?;
        DateTime::from_timestamp(seconds, 0)
    }
}

impl Default for TimestampProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn format_timestamp(datetime: DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    fn entry(path: &str) -> ManifestEntry {
        ManifestEntry {
            path: path.to_string(),
            sha256: sha256_hex("content"),
            size: 7,
            file_type: FileType::Markdown,
        }
    }

    #[test]
    fn test_entries_sorted_by_path() {
        let manifest = generate(
            vec![entry("z.md"), entry("a.hc")],
            "0.1.0",
            "/ws",
            "1970-01-01T00:00:00Z",
        );
        assert_eq!(manifest.sources[0].path, "a.hc");
        assert_eq!(manifest.sources[1].path, "z.md");
    }

    #[test]
    fn test_serialization_is_byte_stable() {
        let make = || {
            generate(
                vec![entry("b.md"), entry("a.md")],
                "0.1.0",
                "/ws",
                "2025-01-01T00:00:00Z",
            )
        };
        let first = serialize(&make()).unwrap();
        let second = serialize(&make()).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with('\n'));
        assert!(!first.ends_with("\n\n"));
    }

    #[test]
    fn test_key_order_in_json() {
        let manifest = generate(vec![entry("a.md")], "0.1.0", "/ws", "1970-01-01T00:00:00Z");
        let json = serialize(&manifest).unwrap();
        let root_pos = json.find("\"root\"").unwrap();
        let sources_pos = json.find("\"sources\"").unwrap();
        let timestamp_pos = json.find("\"timestamp\"").unwrap();
        let version_pos = json.find("\"version\"").unwrap();
        assert!(root_pos < sources_pos && sources_pos < timestamp_pos && timestamp_pos < version_pos);

        let path_pos = json.find("\"path\"").unwrap();
        let sha_pos = json.find("\"sha256\"").unwrap();
        let size_pos = json.find("\"size\"").unwrap();
        let type_pos = json.find("\"type\"").unwrap();
        assert!(path_pos < sha_pos && sha_pos < size_pos && size_pos < type_pos);
    }

    #[test]
    fn test_file_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&FileType::Hypercode).unwrap(),
            "\"hypercode\""
        );
        assert_eq!(
            serde_json::to_string(&FileType::Markdown).unwrap(),
            "\"markdown\""
        );
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_builder_dedupes_by_canonical_path() {
        let mut builder = ManifestBuilder::new();
        assert!(builder.add(Path::new("/ws/a.md"), entry("a.md")));
        assert!(!builder.add(Path::new("/ws/a.md"), entry("a.md")));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_timestamp_explicit_override_wins() {
        let fs = MemoryFileSystem::new();
        let mut env = HashMap::new();
        env.insert(BUILD_TIMESTAMP_VAR.to_string(), "86400".to_string());
        env.insert(SOURCE_DATE_EPOCH_VAR.to_string(), "0".to_string());
        let provider = TimestampProvider::with_environment(env);
        assert_eq!(
            provider.resolve(Path::new("/ws/main.hc"), &fs),
            "1970-01-02T00:00:00Z"
        );
    }

    #[test]
    fn test_timestamp_source_date_epoch() {
        let fs = MemoryFileSystem::new();
        let mut env = HashMap::new();
        env.insert(SOURCE_DATE_EPOCH_VAR.to_string(), "946684800".to_string());
        let provider = TimestampProvider::with_environment(env);
        assert_eq!(
            provider.resolve(Path::new("/ws/main.hc"), &fs),
            "2000-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_timestamp_falls_back_to_epoch() {
        let fs = MemoryFileSystem::new();
        let provider = TimestampProvider::with_environment(HashMap::new());
        assert_eq!(
            provider.resolve(Path::new("/ws/missing.hc"), &fs),
            "1970-01-01T00:00:00Z"
        );
    }
}
