//! Common constants used throughout cw-core.
//!
//! Centralizes directory names, size caps, and the extension -> language
//! whitelist so the scanner, splitter, and expander agree on them.

// ============================================================================
// Directory & file names
// ============================================================================

/// Name of the per-user data directory, under the home directory.
///
/// Layout: `~/.contextweaver/<projectId>/{index.db, vectors.lance, index.lock}`
pub const CONTEXTWEAVER_HOME_DIR: &str = ".contextweaver";

/// Row store filename inside the project data directory.
pub const INDEX_DB_FILENAME: &str = "index.db";

/// Vector store directory name inside the project data directory.
pub const VECTORS_DIR_FILENAME: &str = "vectors.lance";

/// Lock filename inside the project data directory.
pub const LOCK_FILENAME: &str = "index.lock";

/// Name of the project-level ignore file, read after `.gitignore`.
pub const IGNORE_FILENAME: &str = ".contextweaverignore";

/// Environment variable holding newline-separated extra ignore patterns,
/// applied before `.gitignore`.
pub const IGNORE_PATTERNS_ENV: &str = "IGNORE_PATTERNS";

// ============================================================================
// Scan limits
// ============================================================================

/// Files larger than this are recorded but not read or chunked.
pub const MAX_FILE_SIZE_BYTES: u64 = 100 * 1024;

/// Files are processed in batches of this many.
pub const FILE_BATCH_SIZE: usize = 100;

/// Worker pool size for file processing: `clamp(cpus - 1, 4, 32)`.
pub fn adaptive_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    cpus.saturating_sub(1).clamp(4, 32)
}

// ============================================================================
// Extension whitelist
// ============================================================================

/// Map a file extension (without the leading dot) to its language tag.
///
/// Anything not in this table is `None` and filtered out of the crawl.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let tag = match ext.to_lowercase().as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "md" => "markdown",
        "py" => "python",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "kt" => "kotlin",
        "swift" => "swift",
        "cpp" | "cc" | "cxx" | "hpp" | "h" => "cpp",
        "c" => "c",
        "sh" | "bash" | "zsh" | "fish" => "shell",
        "ps1" => "powershell",
        "sql" => "sql",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "toml" => "toml",
        "xml" => "xml",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "less" => "less",
        "vue" => "vue",
        "svelte" => "svelte",
        "rb" => "ruby",
        "php" => "php",
        "dart" => "dart",
        "lua" => "lua",
        "r" => "r",
        _ => return None,
    };
    Some(tag)
}

/// Language tag for a project-relative path, if whitelisted.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?;
    if ext.len() == path.len() {
        return None;
    }
    language_for_extension(ext)
}

/// Languages that fall back to plain-text line chunking when AST chunking
/// yields nothing.
pub const PLAIN_TEXT_FALLBACK_LANGUAGES: &[&str] =
    &["python", "go", "rust", "java", "markdown", "json"];

/// Whether a language is in the plain-text fallback set.
pub fn is_fallback_language(language: &str) -> bool {
    PLAIN_TEXT_FALLBACK_LANGUAGES.contains(&language)
}

// ============================================================================
// Tests
// ============================================================================
