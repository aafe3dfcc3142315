//! Java import resolver.
//!
//! Parses `import [static] a.b.C;` declarations. Wildcards map to any
//! `.java` file under the package directory; plain imports suffix-match
//! the class file, with a one-segment retry for static member imports.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{ext_of, ImportResolver};

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+(static\s+)?([\w\.]+(?:\.\*)?)\s*;").expect("static regex")
});

/// Java resolver.
pub struct JavaResolver;

impl ImportResolver for JavaResolver {
    fn supports(&self, path: &str) -> bool {
        ext_of(path) == Some("java")
    }

    fn extract(&self, content: &str) -> Vec<String> {
        let mut imports = Vec::new();
        let mut seen = HashSet::new();
        for cap in IMPORT.captures_iter(content) {
            if let Some(m) = cap.get(2) {
                let import = m.as_str().to_string();
                if seen.insert(import.clone()) {
                    imports.push(import);
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
        if let Some(package) = import.strip_suffix(".*") {
            let dir = package.replace('.', "/");
            let segment = format!("/{dir}/");
            let prefix = format!("{dir}/");
            let mut matches: Vec<&String> = all_paths
                .iter()
                .filter(|p| {
                    p.ends_with(".java") && (p.contains(&segment) || p.starts_with(&prefix))
                })
                .collect();
            matches.sort();
            return matches.first().map(|p| (*p).clone());
        }

        if let Some(found) = suffix_match(import, all_paths) {
            return Some(found);
        }

        // Static member import: `import static a.b.C.CONSTANT;` - the class
        // is one segment up.
        let (class_path, _member) = import.rsplit_once('.')?;
        suffix_match(class_path, all_paths)
    }
}

fn suffix_match(dotted: &str, all_paths: &HashSet<String>) -> Option<String> {
    let rel = dotted.replace('.', "/");
    let suffix = format!("/{rel}.java");
    let exact = format!("{rel}.java");

    let mut matches: Vec<&String> = all_paths
        .iter()
        .filter(|p| p.ends_with(&suffix) || **p == exact)
        .collect();
    matches.sort();
    matches.first().map(|p| (*p).clone())
}
