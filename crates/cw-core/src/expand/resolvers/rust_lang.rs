//! Rust import resolver.
//!
//! Handles `mod x;` declarations (sibling `x.rs`, then `x/mod.rs`) and
//! `use {crate|super|self}::...` paths, re-anchored to the source root,
//! parent directory, or current directory respectively. Module paths try
//! their longest prefix first, so `use crate::a::b::Item` finds `a/b.rs`
//! before falling back to `a.rs`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{dir_of, ext_of, ImportResolver};

static MOD_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([\w\s:]+\))?\s+)?mod\s+([A-Za-z0-9_]+)\s*;").expect("static regex")
});
static USE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([\w\s:]+\))?\s+)?use\s+((?:crate|super|self)(?:::[A-Za-z0-9_]+)*)")
        .expect("static regex")
});

/// Rust resolver.
pub struct RustResolver;

impl ImportResolver for RustResolver {
    fn supports(&self, path: &str) -> bool {
        ext_of(path) == Some("rs")
    }

    fn extract(&self, content: &str) -> Vec<String> {
        let mut imports = Vec::new();
        let mut seen = HashSet::new();

        for cap in MOD_DECL.captures_iter(content) {
            if let Some(m) = cap.get(1) {
                let decl = format!("mod:{}", m.as_str());
                if seen.insert(decl.clone()) {
                    imports.push(decl);
                }
            }
        }
        for cap in USE_DECL.captures_iter(content) {
            if let Some(m) = cap.get(1) {
                let decl = format!("use:{}", m.as_str());
                if seen.insert(decl.clone()) {
                    imports.push(decl);
                }
            }
        }
        imports
    }

    fn resolve(
        &self,
        import: &str,
        current_file: &str,
        all_paths: &HashSet<String>,
    ) -> Option<String> {
        if let Some(name) = import.strip_prefix("mod:") {
            let dir = dir_of(current_file);
            return try_module(dir, &[name], all_paths);
        }

        let use_path = import.strip_prefix("use:")?;
        let mut segments = use_path.split("::");
        let anchor_kind = segments.next()?;
        let segments: Vec<&str> = segments.collect();
        if segments.is_empty() {
            return None;
        }

        let anchor = match anchor_kind {
            "crate" => source_root(current_file),
            "super" => {
                let dir = dir_of(current_file);
                dir_of(dir).to_string()
            }
            "self" => dir_of(current_file).to_string(),
            _ => return None,
        };

        // Longest module prefix first; the final segments may be items.
        for take in (1..=segments.len()).rev() {
            if let Some(found) = try_module(&anchor, &segments[..take], all_paths) {
                if found != current_file {
                    return Some(found);
                }
            }
        }
        None
    }
}

/// `<dir>/<segs>.rs`, then `<dir>/<segs>/mod.rs`.
fn try_module(dir: &str, segments: &[&str], all_paths: &HashSet<String>) -> Option<String> {
    let joined = segments.join("/");
    let stem = if dir.is_empty() {
        joined
    } else {
        format!("{dir}/{joined}")
    };

    let file = format!("{stem}.rs");
    if all_paths.contains(&file) {
        return Some(file);
    }
    let module = format!("{stem}/mod.rs");
    all_paths.contains(&module).then_some(module)
}

/// Crate source root: the path up to the last `src` component, or the
/// current directory when the file lives outside one.
fn source_root(current_file: &str) -> String {
    let parts: Vec<&str> = current_file.split('/').collect();
    match parts.iter().rposition(|p| *p == "src") {
        Some(idx) => parts[..=idx].join("/"),
        None => dir_of(current_file).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_mod_and_use_declarations() {
        let content = r#"
mod scanner;
pub mod chunker;
pub(crate) mod lock;

use crate::scanner::Scanner;
use super::config::Config;
use self::helpers;
use std::collections::HashMap;

mod inline {
    fn f() {}
}
"#;
        let imports = RustResolver.extract(content);
        assert!(imports.contains(&"mod:scanner".to_string()));
        assert!(imports.contains(&"mod:chunker".to_string()));
        assert!(imports.contains(&"mod:lock".to_string()));
        assert!(imports.contains(&"use:crate::scanner".to_string()));
        assert!(imports.contains(&"use:super::config".to_string()));
        assert!(imports.contains(&"use:self::helpers".to_string()));
        // std and inline mod bodies are not project imports.
        assert!(!imports.iter().any(|i| i.contains("std")));
        assert!(!imports.contains(&"mod:inline".to_string()));
    }

    #[test]
    fn mod_declaration_resolves_sibling_file() {
        let set = paths(&["src/scanner.rs", "src/lib.rs"]);
        assert_eq!(
            RustResolver.resolve("mod:scanner", "src/lib.rs", &set),
            Some("src/scanner.rs".to_string())
        );
    }

    #[test]
    fn mod_declaration_resolves_mod_rs() {
        let set = paths(&["src/chunk/mod.rs", "src/lib.rs"]);
        assert_eq!(
            RustResolver.resolve("mod:chunk", "src/lib.rs", &set),
            Some("src/chunk/mod.rs".to_string())
        );
    }

    #[test]
    fn use_crate_anchors_to_src_root() {
        let set = paths(&["src/scanner.rs", "src/search/mod.rs"]);
        assert_eq!(
            RustResolver.resolve("use:crate::scanner::Scanner", "src/search/mod.rs", &set),
            Some("src/scanner.rs".to_string())
        );
    }

    #[test]
    fn use_crate_prefers_longest_module_path() {
        let set = paths(&["src/search/fusion.rs", "src/search/mod.rs", "src/lib.rs"]);
        assert_eq!(
            RustResolver.resolve("use:crate::search::fusion::rrf_fuse", "src/lib.rs", &set),
            Some("src/search/fusion.rs".to_string())
        );
    }

    #[test]
    fn use_super_anchors_to_parent_dir() {
        let set = paths(&["src/scanner.rs", "src/chunk/mod.rs"]);
        assert_eq!(
            RustResolver.resolve("use:super::scanner", "src/chunk/mod.rs", &set),
            Some("src/scanner.rs".to_string())
        );
    }

    #[test]
    fn use_self_anchors_to_current_dir() {
        let set = paths(&["src/expand/resolvers/mod.rs", "src/expand/mod.rs"]);
        assert_eq!(
            RustResolver.resolve("use:self::resolvers", "src/expand/mod.rs", &set),
            Some("src/expand/resolvers/mod.rs".to_string())
        );
    }

    #[test]
    fn unresolvable_use_returns_none() {
        let set = paths(&["src/lib.rs"]);
        assert_eq!(
            RustResolver.resolve("use:crate::missing::Thing", "src/lib.rs", &set),
            None
        );
    }
}
