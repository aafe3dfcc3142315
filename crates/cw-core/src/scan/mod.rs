//! Incremental repository scanning: crawl, filter, process.
//!
//! The crawl applies ignore sources in order (`$IGNORE_PATTERNS`,
//! `.gitignore`, `.contextweaverignore`) and then the extension whitelist.
//! Processing runs on a rayon pool sized `clamp(cpus-1, 4, 32)` in batches
//! of 100 files; each file goes through the stat fast path, encoding
//! normalization, content hashing, and semantic chunking.

pub mod encoding;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use cw_db::FileMeta;

use crate::chunk::{chunk_source, Language, ProcessedChunk, SemanticSplitter};
use crate::constants::{
    language_for_path, FILE_BATCH_SIZE, IGNORE_FILENAME, IGNORE_PATTERNS_ENV, MAX_FILE_SIZE_BYTES,
};
use crate::errors::CwResult;

// ============================================================================
// Statuses & stats
// ============================================================================

/// Outcome of processing one crawled file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FileStatus {
    /// Previously unknown file.
    Added,
    /// Known file whose content hash changed.
    Modified,
    /// Known file with identical stat or hash.
    Unchanged,
    /// Too large, binary, or a lock-file JSON; recorded without content.
    Skipped,
}

/// A per-file processing failure. The scan proceeds past these.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileError {
    pub path: String,
    pub message: String,
}

/// Aggregate counts for one scan.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub added: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Counts for the vector indexing phase.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorIndexStats {
    /// Files whose vectors were (re)written, self-heal included.
    pub indexed: usize,
    /// Deleted files purged from the vector store.
    pub removed: usize,
    /// Chunk records written.
    pub chunks: usize,
}

/// Full scan report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub project_id: String,
    pub stats: ScanStats,
    pub vector: Option<VectorIndexStats>,
    pub errors: Vec<FileError>,
}

// ============================================================================
// Crawl
// ============================================================================

/// A file admitted by the ignore chain and the extension whitelist.
#[derive(Debug, Clone)]
pub struct CrawledFile {
    pub abs_path: PathBuf,
    /// Project-relative, `/`-normalized.
    pub rel_path: String,
    pub language: &'static str,
}

/// Result of processing one file.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub path: String,
    pub status: FileStatus,
    pub hash: String,
    pub mtime: i64,
    pub size: i64,
    pub content: Option<String>,
    pub language: String,
    pub chunks: Vec<ProcessedChunk>,
}

/// Scanner for one project root.
pub struct Scanner<'a> {
    root: &'a Path,
    splitter: &'a SemanticSplitter,
}

impl<'a> Scanner<'a> {
    /// Create a scanner.
    pub fn new(root: &'a Path, splitter: &'a SemanticSplitter) -> Self {
        Self { root, splitter }
    }

    /// Walk the project, applying `$IGNORE_PATTERNS`, `.gitignore`,
    /// `.contextweaverignore`, then the extension whitelist.
    pub fn crawl(&self) -> CwResult<Vec<CrawledFile>> {
        let mut builder = WalkBuilder::new(self.root);
        builder
            .hidden(true)
            .parents(false)
            .ignore(false)
            .git_global(false)
            .git_exclude(false)
            .git_ignore(true)
            .require_git(false)
            .follow_links(false);
        builder.add_custom_ignore_filename(IGNORE_FILENAME);

        if let Ok(raw) = std::env::var(IGNORE_PATTERNS_ENV) {
            let mut overrides = OverrideBuilder::new(self.root);
            for pattern in raw.lines().map(str::trim).filter(|p| !p.is_empty()) {
                // Override semantics are inverted: a leading `!` excludes.
                if let Err(e) = overrides.add(&format!("!{pattern}")) {
                    warn!("Ignoring bad pattern {pattern:?} from {IGNORE_PATTERNS_ENV}: {e}");
                }
            }
            if let Ok(built) = overrides.build() {
                builder.overrides(built);
            }
        }

        let mut files = Vec::new();
        // Case-colliding paths: first seen wins.
        let mut seen_fold: HashSet<String> = HashSet::new();

        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Crawl entry error: {e}");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Ok(stripped) = entry.path().strip_prefix(self.root) else {
                continue;
            };
            let rel_path = normalize_rel_path(stripped);
            let Some(language) = language_for_path(&rel_path) else {
                continue;
            };
            if !seen_fold.insert(rel_path.to_lowercase()) {
                continue;
            }
            files.push(CrawledFile {
                abs_path: entry.into_path(),
                rel_path,
                language,
            });
        }

        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(files)
    }

    /// Process crawled files in batches on the worker pool.
    pub fn process(
        &self,
        files: &[CrawledFile],
        known: &HashMap<String, FileMeta>,
        pool: &rayon::ThreadPool,
    ) -> (Vec<ProcessedFile>, Vec<FileError>) {
        let mut processed = Vec::with_capacity(files.len());
        let mut errors = Vec::new();

        for batch in files.chunks(FILE_BATCH_SIZE) {
            let results: Vec<Result<ProcessedFile, FileError>> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|file| self.process_file(file, known.get(&file.rel_path)))
                    .collect()
            });
            for result in results {
                match result {
                    Ok(file) => processed.push(file),
                    Err(error) => errors.push(error),
                }
            }
        }

        (processed, errors)
    }

    fn process_file(
        &self,
        file: &CrawledFile,
        known: Option<&FileMeta>,
    ) -> Result<ProcessedFile, FileError> {
        let fail = |message: String| FileError {
            path: file.rel_path.clone(),
            message,
        };

        let meta = std::fs::metadata(&file.abs_path).map_err(|e| fail(e.to_string()))?;
        let size = meta.len() as i64;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let base = ProcessedFile {
            path: file.rel_path.clone(),
            status: FileStatus::Skipped,
            hash: String::new(),
            mtime,
            size,
            content: None,
            language: file.language.to_string(),
            chunks: Vec::new(),
        };

        if meta.len() > MAX_FILE_SIZE_BYTES {
            return Ok(base);
        }

        // Stat fast path: identical mtime and size means no I/O beyond stat.
        if let Some(known) = known {
            if known.mtime == mtime && known.size == size {
                return Ok(ProcessedFile {
                    status: FileStatus::Unchanged,
                    hash: known.hash.clone(),
                    ..base
                });
            }
        }

        let bytes = std::fs::read(&file.abs_path).map_err(|e| fail(e.to_string()))?;
        let content = encoding::decode_bytes(&bytes);
        if encoding::looks_binary(&content) {
            return Ok(base);
        }

        let hash = sha256_hex(&content);
        if let Some(known) = known {
            if known.hash == hash {
                // Content identical; only the mtime moved.
                return Ok(ProcessedFile {
                    status: FileStatus::Unchanged,
                    hash,
                    ..base
                });
            }
        }

        if file.language == "json" && is_lockfile_json(&file.rel_path) {
            return Ok(base);
        }

        let chunks = match Language::from_path(&file.rel_path) {
            Some(language) => chunk_source(self.splitter, &content, &file.rel_path, language),
            None => Vec::new(),
        };

        let status = if known.is_some() {
            FileStatus::Modified
        } else {
            FileStatus::Added
        };

        Ok(ProcessedFile {
            status,
            hash,
            content: Some(content),
            chunks,
            ..base
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// SHA-256 hex digest of normalized content.
pub fn sha256_hex(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Lock-file JSON: `*-lock.json`, `package-lock.json`, or anything under a
/// `node_modules` segment.
fn is_lockfile_json(path: &str) -> bool {
    path.ends_with("-lock.json")
        || path.ends_with("package-lock.json")
        || path.split('/').any(|segment| segment == "node_modules")
}

/// Forward-slash form of a project-relative path.
fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitterConfig;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn scanner_fixtures() -> (TempDir, SemanticSplitter) {
        (TempDir::new().unwrap(), SemanticSplitter::new(SplitterConfig::default()))
    }

    #[test]
    fn crawl_applies_whitelist_and_gitignore() {
        let (dir, splitter) = scanner_fixtures();
        let root = dir.path();
        write(root, "src/main.rs", "fn main() {}");
        write(root, "src/ignored.rs", "fn gone() {}");
        write(root, "binary.exe", "x");
        write(root, ".gitignore", "src/ignored.rs\n");

        let scanner = Scanner::new(root, &splitter);
        let files = scanner.crawl().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();

        assert!(paths.contains(&"src/main.rs"));
        assert!(!paths.contains(&"src/ignored.rs"));
        assert!(!paths.contains(&"binary.exe"));
        // .gitignore itself has no whitelisted extension.
        assert!(!paths.contains(&".gitignore"));
    }

    #[test]
    fn crawl_applies_contextweaverignore() {
        let (dir, splitter) = scanner_fixtures();
        let root = dir.path();
        write(root, "keep.rs", "fn keep() {}");
        write(root, "drop.rs", "fn drop_me() {}");
        write(root, IGNORE_FILENAME, "drop.rs\n");

        let scanner = Scanner::new(root, &splitter);
        let paths: Vec<String> = scanner
            .crawl()
            .unwrap()
            .into_iter()
            .map(|f| f.rel_path)
            .collect();

        assert!(paths.contains(&"keep.rs".to_string()));
        assert!(!paths.contains(&"drop.rs".to_string()));
    }

    #[test]
    fn process_statuses_added_then_unchanged() {
        let (dir, splitter) = scanner_fixtures();
        let root = dir.path();
        write(root, "a.rs", "fn alpha() { let x = 1; }\n");

        let scanner = Scanner::new(root, &splitter);
        let files = scanner.crawl().unwrap();
        let pool = pool();

        let (first, errors) = scanner.process(&files, &HashMap::new(), &pool);
        assert!(errors.is_empty());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, FileStatus::Added);
        assert!(first[0].content.is_some());
        assert!(!first[0].chunks.is_empty());

        let known: HashMap<String, FileMeta> = first
            .iter()
            .map(|f| {
                (
                    f.path.clone(),
                    FileMeta {
                        path: f.path.clone(),
                        hash: f.hash.clone(),
                        mtime: f.mtime,
                        size: f.size,
                        vector_index_hash: Some(f.hash.clone()),
                    },
                )
            })
            .collect();

        let (second, _) = scanner.process(&files, &known, &pool);
        assert_eq!(second[0].status, FileStatus::Unchanged);
        assert!(second[0].content.is_none(), "fast path must skip reads");
    }

    #[test]
    fn process_detects_modification_by_hash() {
        let (dir, splitter) = scanner_fixtures();
        let root = dir.path();
        write(root, "a.rs", "fn one() {}\n");

        let scanner = Scanner::new(root, &splitter);
        let files = scanner.crawl().unwrap();
        let pool = pool();
        let (first, _) = scanner.process(&files, &HashMap::new(), &pool);

        // Same size and path, different content and mtime.
        std::thread::sleep(std::time::Duration::from_millis(20));
        write(root, "a.rs", "fn two() {}\n");
        let files = scanner.crawl().unwrap();

        let known: HashMap<String, FileMeta> = first
            .iter()
            .map(|f| {
                (
                    f.path.clone(),
                    FileMeta {
                        path: f.path.clone(),
                        hash: f.hash.clone(),
                        mtime: 0, // force the hash comparison path
                        size: f.size,
                        vector_index_hash: None,
                    },
                )
            })
            .collect();

        let (second, _) = scanner.process(&files, &known, &pool);
        assert_eq!(second[0].status, FileStatus::Modified);
    }

    #[test]
    fn oversized_and_binary_files_skip() {
        let (dir, splitter) = scanner_fixtures();
        let root = dir.path();
        write(root, "big.rs", &"x".repeat(101 * 1024));
        std::fs::write(root.join("nul.rs"), b"fn a(\x00) {}").unwrap();

        let scanner = Scanner::new(root, &splitter);
        let files = scanner.crawl().unwrap();
        let pool = pool();
        let (processed, errors) = scanner.process(&files, &HashMap::new(), &pool);

        assert!(errors.is_empty());
        assert!(processed.iter().all(|f| f.status == FileStatus::Skipped));
        assert!(processed.iter().all(|f| f.content.is_none()));
    }

    #[test]
    fn lockfile_json_skips() {
        let (dir, splitter) = scanner_fixtures();
        let root = dir.path();
        write(root, "package-lock.json", "{\"name\": \"x\"}");
        write(root, "data.json", "{\"name\": \"x\"}");

        let scanner = Scanner::new(root, &splitter);
        let files = scanner.crawl().unwrap();
        let pool = pool();
        let (processed, _) = scanner.process(&files, &HashMap::new(), &pool);

        let by_path: HashMap<&str, &ProcessedFile> =
            processed.iter().map(|f| (f.path.as_str(), f)).collect();
        assert_eq!(by_path["package-lock.json"].status, FileStatus::Skipped);
        assert_eq!(by_path["data.json"].status, FileStatus::Added);
    }

    #[test]
    fn is_lockfile_json_variants() {
        assert!(is_lockfile_json("yarn-lock.json"));
        assert!(is_lockfile_json("package-lock.json"));
        assert!(is_lockfile_json("pkg/node_modules/dep/data.json"));
        assert!(!is_lockfile_json("config.json"));
        assert!(!is_lockfile_json("node_modules_backup/config.json"));
    }
}
