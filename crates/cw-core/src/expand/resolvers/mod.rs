//! Language-specific import resolvers for the graph expander.
//!
//! Each resolver extracts import strings with best-effort regex heuristics
//! (no full AST) and resolves them against the project's path set. A
//! resolution failure returns `None` and expansion simply continues.

pub mod go_lang;
pub mod java_lang;
pub mod js_ts;
pub mod python;
pub mod rust_lang;

use std::collections::HashSet;
use std::sync::LazyLock;

/// Capability interface for one language's import handling.
pub trait ImportResolver: Send + Sync {
    /// Whether this resolver handles the given file.
    fn supports(&self, path: &str) -> bool;

    /// Extract raw import strings from file content.
    fn extract(&self, content: &str) -> Vec<String>;

    /// Resolve one import string against the project's full path set.
    fn resolve(
        &self,
        import: &str,
        current_file: &str,
        all_paths: &HashSet<String>,
    ) -> Option<String>;
}

static RESOLVERS: LazyLock<Vec<Box<dyn ImportResolver>>> = LazyLock::new(|| {
    vec![
        Box::new(js_ts::JsTsResolver),
        Box::new(python::PythonResolver),
        Box::new(go_lang::GoResolver),
        Box::new(java_lang::JavaResolver),
        Box::new(rust_lang::RustResolver),
    ]
});

/// Find the resolver for a file, by language priority.
pub fn resolver_for(path: &str) -> Option<&'static dyn ImportResolver> {
    RESOLVERS
        .iter()
        .find(|resolver| resolver.supports(path))
        .map(|boxed| boxed.as_ref())
}

// ============================================================================
// Shared path helpers
// ============================================================================

/// Directory part of a `/`-normalized relative path ("" for root files).
pub(crate) fn dir_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// File extension without the dot, if any.
pub(crate) fn ext_of(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    let idx = name.rfind('.')?;
    if idx == 0 {
        return None;
    }
    Some(&name[idx + 1..])
}

/// Join and normalize `./` and `../` segments; `None` if the path escapes
/// the project root.
pub(crate) fn join_normalize(base_dir: &str, relative: &str) -> Option<String> {
    let mut parts: Vec<&str> = if base_dir.is_empty() {
        Vec::new()
    } else {
        base_dir.split('/').collect()
    };
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Length of the shared directory prefix between two relative paths.
pub(crate) fn common_dir_prefix_len(a: &str, b: &str) -> usize {
    dir_of(a)
        .split('/')
        .zip(dir_of(b).split('/'))
        .take_while(|(x, y)| x == y && !x.is_empty())
        .count()
}
