//! Go import resolver.
//!
//! Parses single imports and import blocks. Standard-library-looking paths
//! (no dot and no slash) are skipped; the rest resolve by package-directory
//! suffix match over the project's `.go` files, preferring non-test files.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{ext_of, ImportResolver};

static SINGLE_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:[A-Za-z_\.]+\s+)?"([^"]+)""#).expect("static regex")
});
static BLOCK_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)import\s*\((.*?)\)").expect("static regex"));
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("static regex"));

/// Go resolver.
pub struct GoResolver;

impl ImportResolver for GoResolver {
    fn supports(&self, path: &str) -> bool {
        ext_of(path) == Some("go")
    }

    fn extract(&self, content: &str) -> Vec<String> {
        let mut imports = Vec::new();
        let mut seen = HashSet::new();

        for cap in SINGLE_IMPORT.captures_iter(content) {
            if let Some(m) = cap.get(1) {
                let import = m.as_str().to_string();
                if seen.insert(import.clone()) {
                    imports.push(import);
                }
            }
        }

        for block in BLOCK_IMPORT.captures_iter(content) {
            let Some(inner) = block.get(1) else { continue };
            for cap in QUOTED.captures_iter(inner.as_str()) {
                if let Some(m) = cap.get(1) {
                    let import = m.as_str().to_string();
                    if seen.insert(import.clone()) {
                        imports.push(import);
                    }
                }
            }
        }

        imports
    }

    fn resolve(
        &self,
        import: &str,
        _current_file: &str,
        all_paths: &HashSet<String>,
    ) -> Option<String> {
        // Standard-library-looking: no dot and no slash.
        if !import.contains('.') && !import.contains('/') {
            return None;
        }

        let package = import.rsplit('/').next()?;
        if package.is_empty() {
            return None;
        }
        let segment = format!("/{package}/");
        let prefix = format!("{package}/");

        let mut matches: Vec<&String> = all_paths
            .iter()
            .filter(|p| p.ends_with(".go") && (p.contains(&segment) || p.starts_with(&prefix)))
            .collect();
        matches.sort_by(|a, b| {
            let a_test = a.ends_with("_test.go");
            let b_test = b.ends_with("_test.go");
            a_test.cmp(&b_test).then_with(|| a.cmp(b))
        });
        matches.first().map(|p| (*p).clone())
    }
}
