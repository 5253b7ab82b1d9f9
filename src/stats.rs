use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Snapshot of compilation metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct CompilationStats {
    pub hypercode_files: usize,
    pub markdown_files: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub max_depth: usize,
}

/// Accumulates compilation metrics, deduplicated by canonical file path.
/// Re-reading a file from another branch does not inflate the totals.
#[derive(Debug, Default)]
pub struct StatsCollector {
    hypercode_files: HashSet<PathBuf>,
    markdown_files: HashSet<PathBuf>,
    input_bytes: u64,
    output_bytes: u64,
    max_depth: usize,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hypercode_file(&mut self, canonical: &Path, bytes: u64) {
        if self.hypercode_files.insert(canonical.to_path_buf()) {
            self.input_bytes += bytes;
        }
    }

    pub fn record_markdown_file(&mut self, canonical: &Path, bytes: u64) {
        if self.markdown_files.insert(canonical.to_path_buf()) {
            self.input_bytes += bytes;
        }
    }

    pub fn record_output_bytes(&mut self, bytes: u64) {
        self.output_bytes += bytes;
    }

    pub fn update_max_depth(&mut self, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
    }

    pub fn finish(&self) -> CompilationStats {
        CompilationStats {
            hypercode_files: self.hypercode_files.len(),
            markdown_files: self.markdown_files.len(),
            input_bytes: self.input_bytes,
            output_bytes: self.output_bytes,
            max_depth: self.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_paths_counted_once() {
        let mut collector = StatsCollector::new();
        collector.record_markdown_file(Path::new("/ws/a.md"), 100);
        collector.record_markdown_file(Path::new("/ws/a.md"), 100);
        collector.record_hypercode_file(Path::new("/ws/main.hc"), 10);

        let stats = collector.finish();
        assert_eq!(stats.markdown_files, 1);
        assert_eq!(stats.hypercode_files, 1);
        assert_eq!(stats.input_bytes, 110);
    }

    #[test]
    fn test_max_depth_is_monotonic() {
        let mut collector = StatsCollector::new();
        collector.update_max_depth(3);
        collector.update_max_depth(1);
        assert_eq!(collector.finish().max_depth, 3);
    }
}
