//! Python import resolver.
//!
//! Extracts `from A import ...` and `import A` forms. Relative imports walk
//! up one directory per leading dot beyond the first; absolute imports map
//! dots to path separators and suffix-match against the project, breaking
//! ties by the longest common directory prefix with the importer.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{common_dir_prefix_len, dir_of, ext_of, ImportResolver};

static FROM_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*from\s+([\w\.]+)\s+import\b").expect("static regex"));
static PLAIN_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*import\s+([^\n#]+)").expect("static regex"));

/// Python resolver.
pub struct PythonResolver;

impl ImportResolver for PythonResolver {
    fn supports(&self, path: &str) -> bool {
        ext_of(path) == Some("py")
    }

    fn extract(&self, content: &str) -> Vec<String> {
        let mut imports = Vec::new();
        let mut seen = HashSet::new();

        for cap in FROM_IMPORT.captures_iter(content) {
            if let Some(m) = cap.get(1) {
                let module = m.as_str().to_string();
                if seen.insert(module.clone()) {
                    imports.push(module);
                }
            }
        }

        for cap in PLAIN_IMPORT.captures_iter(content) {
            let Some(m) = cap.get(1) else { continue };
            // `import a.b, c as alias` - split the list, drop aliases.
            for part in m.as_str().split(',') {
                let module = part.split_whitespace().next().unwrap_or("");
                if module.is_empty() || module == "from" {
                    continue;
                }
                if !module.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
                    continue;
                }
                if seen.insert(module.to_string()) {
                    imports.push(module.to_string());
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
        if let Some(stripped) = import.strip_prefix('.') {
            return resolve_relative(stripped, current_file, all_paths);
        }
        resolve_absolute(import, current_file, all_paths)
    }
}

/// `.mod` stays in the importer's package; each extra leading dot walks up
/// one directory.
fn resolve_relative(
    after_first_dot: &str,
    current_file: &str,
    all_paths: &HashSet<String>,
) -> Option<String> {
    let extra_dots = after_first_dot.chars().take_while(|c| *c == '.').count();
    let rest = &after_first_dot[extra_dots..];

    let mut base = dir_of(current_file).to_string();
    for _ in 0..extra_dots {
        if base.is_empty() {
            return None;
        }
        base = dir_of(&base).to_string();
    }

    let module_path = if rest.is_empty() {
        base.clone()
    } else if base.is_empty() {
        rest.replace('.', "/")
    } else {
        format!("{base}/{}", rest.replace('.', "/"))
    };

    if rest.is_empty() {
        let init = format!("{module_path}/__init__.py");
        return all_paths.contains(&init).then_some(init);
    }

    let file = format!("{module_path}.py");
    if all_paths.contains(&file) {
        return Some(file);
    }
    let package = format!("{module_path}/__init__.py");
    all_paths.contains(&package).then_some(package)
}

fn resolve_absolute(
    import: &str,
    current_file: &str,
    all_paths: &HashSet<String>,
) -> Option<String> {
    let rel = import.replace('.', "/");
    let file_suffix = format!("/{rel}.py");
    let package_suffix = format!("/{rel}/__init__.py");
    let file_exact = format!("{rel}.py");
    let package_exact = format!("{rel}/__init__.py");

    let mut matches: Vec<&String> = all_paths
        .iter()
        .filter(|p| {
            p.ends_with(&file_suffix)
                || p.ends_with(&package_suffix)
                || **p == file_exact
                || **p == package_exact
        })
        .collect();

    // Ties break by proximity to the importer, then lexicographically.
    matches.sort_by(|a, b| {
        common_dir_prefix_len(b, current_file)
            .cmp(&common_dir_prefix_len(a, current_file))
            .then_with(|| a.cmp(b))
    });
    matches.first().map(|p| (*p).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_from_and_plain_imports() {
        let content = r#"
import os
import sys, json
import numpy as np
from pkg.models import User
from . import helpers
from ..lib import tools

def f():
    import functools
"#;
        let imports = PythonResolver.extract(content);
        assert!(imports.contains(&"os".to_string()));
        assert!(imports.contains(&"sys".to_string()));
        assert!(imports.contains(&"json".to_string()));
        assert!(imports.contains(&"numpy".to_string()));
        assert!(imports.contains(&"pkg.models".to_string()));
        assert!(imports.contains(&".".to_string()));
        assert!(imports.contains(&"..lib".to_string()));
        assert!(imports.contains(&"functools".to_string()));
        assert!(!imports.contains(&"np".to_string()));
    }

    #[test]
    fn single_dot_stays_in_package() {
        let set = paths(&["pkg/helpers.py", "pkg/app.py"]);
        assert_eq!(
            PythonResolver.resolve(".helpers", "pkg/app.py", &set),
            Some("pkg/helpers.py".to_string())
        );
    }

    #[test]
    fn double_dot_walks_up() {
        let set = paths(&["lib/tools.py", "pkg/sub/app.py"]);
        assert_eq!(
            PythonResolver.resolve("..lib.tools", "pkg/sub/app.py", &set),
            None,
            "..lib from pkg/sub resolves against pkg/, not the root"
        );

        let set = paths(&["pkg/lib/tools.py", "pkg/sub/app.py"]);
        assert_eq!(
            PythonResolver.resolve("..lib.tools", "pkg/sub/app.py", &set),
            Some("pkg/lib/tools.py".to_string())
        );
    }

    #[test]
    fn bare_dot_resolves_to_package_init() {
        let set = paths(&["pkg/__init__.py", "pkg/app.py"]);
        assert_eq!(
            PythonResolver.resolve(".", "pkg/app.py", &set),
            Some("pkg/__init__.py".to_string())
        );
    }

    #[test]
    fn relative_prefers_module_over_package() {
        let set = paths(&["pkg/x.py", "pkg/x/__init__.py"]);
        assert_eq!(
            PythonResolver.resolve(".x", "pkg/app.py", &set),
            Some("pkg/x.py".to_string())
        );
    }

    #[test]
    fn absolute_suffix_match() {
        let set = paths(&["src/pkg/models.py", "src/main.py"]);
        assert_eq!(
            PythonResolver.resolve("pkg.models", "src/main.py", &set),
            Some("src/pkg/models.py".to_string())
        );
    }

    #[test]
    fn absolute_package_match() {
        let set = paths(&["src/pkg/models/__init__.py"]);
        assert_eq!(
            PythonResolver.resolve("pkg.models", "src/main.py", &set),
            Some("src/pkg/models/__init__.py".to_string())
        );
    }

    #[test]
    fn absolute_tie_prefers_importer_neighborhood() {
        let set = paths(&[
            "a/pkg/models.py",
            "b/pkg/models.py",
            "b/main.py",
        ]);
        assert_eq!(
            PythonResolver.resolve("pkg.models", "b/main.py", &set),
            Some("b/pkg/models.py".to_string())
        );
    }

    #[test]
    fn unresolvable_returns_none() {
        let set = paths(&["src/other.py"]);
        assert_eq!(PythonResolver.resolve("missing.module", "src/a.py", &set), None);
    }
}
