//! TypeScript / JavaScript import resolver.
//!
//! Handles `import ... from "..."`, dynamic `import("...")`, `require("...")`,
//! and side-effect imports. Only relative specifiers resolve; package
//! imports belong to node_modules and are never indexed.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{dir_of, ext_of, join_normalize, ImportResolver};

const EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mts", "mjs", "cts", "cjs"];

static FROM_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"from\s*['"]([^'"]+)['"]"#).expect("static regex"));
static DYNAMIC_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import\s*\(\s*['"]([^'"]+)['"]"#).expect("static regex"));
static REQUIRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]"#).expect("static regex"));
static SIDE_EFFECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import\s+['"]([^'"]+)['"]"#).expect("static regex"));

/// Extension mapping for compiled-output specifiers (`./x.js` may point at
/// `x.ts` on disk).
fn mapped_extensions(ext: &str) -> &'static [&'static str] {
    match ext {
        "js" => &["ts", "tsx", "js", "jsx"],
        "mjs" => &["mts", "mjs"],
        "cjs" => &["cts", "cjs"],
        "jsx" => &["tsx", "jsx"],
        _ => &[],
    }
}

/// TS/JS resolver.
pub struct JsTsResolver;

impl ImportResolver for JsTsResolver {
    fn supports(&self, path: &str) -> bool {
        ext_of(path).map(|e| EXTENSIONS.contains(&e)).unwrap_or(false)
    }

    fn extract(&self, content: &str) -> Vec<String> {
        let mut imports = Vec::new();
        let mut seen = HashSet::new();
        for regex in [&*FROM_IMPORT, &*DYNAMIC_IMPORT, &*REQUIRE, &*SIDE_EFFECT] {
            for cap in regex.captures_iter(content) {
                if let Some(m) = cap.get(1) {
                    let spec = m.as_str().to_string();
                    if seen.insert(spec.clone()) {
                        imports.push(spec);
                    }
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
        if !import.starts_with("./") && !import.starts_with("../") {
            return None;
        }
        let joined = join_normalize(dir_of(current_file), import)?;

        // Specifier carries its real extension.
        if all_paths.contains(&joined) {
            return Some(joined);
        }

        // Compiled-output extension: try the source-side mapping.
        if let Some(ext) = ext_of(&joined) {
            let stem = &joined[..joined.len() - ext.len() - 1];
            for mapped in mapped_extensions(ext) {
                let candidate = format!("{stem}.{mapped}");
                if all_paths.contains(&candidate) {
                    return Some(candidate);
                }
            }
            if !mapped_extensions(ext).is_empty() {
                return None;
            }
        }

        // Extensionless: append each candidate extension.
        for ext in EXTENSIONS {
            let candidate = format!("{joined}.{ext}");
            if all_paths.contains(&candidate) {
                return Some(candidate);
            }
        }

        // Directory import: index file.
        for ext in EXTENSIONS {
            let candidate = format!("{joined}/index.{ext}");
            if all_paths.contains(&candidate) {
                return Some(candidate);
            }
        }

        None
    }
}
