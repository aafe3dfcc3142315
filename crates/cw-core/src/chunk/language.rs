//! Language registry: grammars and the node-kind tables that drive the
//! semantic splitter.

use crate::constants::language_for_path;

/// A whitelisted language, identified by its tag from the extension table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Language(&'static str);

impl Language {
    /// Resolve the language for a project-relative path.
    pub fn from_path(path: &str) -> Option<Self> {
        language_for_path(path).map(Language)
    }

    /// Wrap a known tag (as stored in the row store).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "typescript" => Some(Language("typescript")),
            "javascript" => Some(Language("javascript")),
            "markdown" => Some(Language("markdown")),
            "python" => Some(Language("python")),
            "go" => Some(Language("go")),
            "rust" => Some(Language("rust")),
            "java" => Some(Language("java")),
            "kotlin" => Some(Language("kotlin")),
            "swift" => Some(Language("swift")),
            "cpp" => Some(Language("cpp")),
            "c" => Some(Language("c")),
            "shell" => Some(Language("shell")),
            "powershell" => Some(Language("powershell")),
            "sql" => Some(Language("sql")),
            "yaml" => Some(Language("yaml")),
            "json" => Some(Language("json")),
            "toml" => Some(Language("toml")),
            "xml" => Some(Language("xml")),
            "html" => Some(Language("html")),
            "css" => Some(Language("css")),
            "scss" => Some(Language("scss")),
            "sass" => Some(Language("sass")),
            "less" => Some(Language("less")),
            "vue" => Some(Language("vue")),
            "svelte" => Some(Language("svelte")),
            "ruby" => Some(Language("ruby")),
            "php" => Some(Language("php")),
            "dart" => Some(Language("dart")),
            "lua" => Some(Language("lua")),
            "r" => Some(Language("r")),
            _ => None,
        }
    }

    /// The language tag (e.g. "typescript").
    pub fn id(self) -> &'static str {
        self.0
    }

    /// Whether AST chunking is available for this language.
    pub fn ast_supported(self) -> bool {
        matches!(
            self.0,
            "typescript" | "javascript" | "python" | "go" | "rust" | "java"
        )
    }

    /// Tree-sitter grammar for a concrete file of this language.
    ///
    /// The path matters for TypeScript: `.tsx` files need the TSX grammar.
    pub fn grammar_for_path(self, path: &str) -> Option<tree_sitter::Language> {
        match self.0 {
            "typescript" => {
                if path.ends_with(".tsx") {
                    Some(tree_sitter_typescript::LANGUAGE_TSX.into())
                } else {
                    Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
                }
            }
            "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
            "python" => Some(tree_sitter_python::LANGUAGE.into()),
            "go" => Some(tree_sitter_go::LANGUAGE.into()),
            "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
            "java" => Some(tree_sitter_java::LANGUAGE.into()),
            _ => None,
        }
    }

    /// Node kinds that push a context-path entry for their descendants.
    pub fn hierarchy_node_kinds(self) -> &'static [&'static str] {
        match self.0 {
            "rust" => &[
                "mod_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
                "function_item",
            ],
            "python" => &["class_definition", "function_definition"],
            "typescript" | "javascript" => &[
                "class_declaration",
                "abstract_class_declaration",
                "interface_declaration",
                "enum_declaration",
                "function_declaration",
                "method_definition",
                "internal_module",
            ],
            "go" => &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
            ],
            "java" => &[
                "class_declaration",
                "interface_declaration",
                "enum_declaration",
                "record_declaration",
                "method_declaration",
            ],
            _ => &[],
        }
    }

    /// Node kinds that can carry the name of a hierarchy node.
    pub fn name_node_kinds(self) -> &'static [&'static str] {
        &[
            "identifier",
            "type_identifier",
            "name",
            "field_identifier",
            "property_identifier",
        ]
    }

    /// Comment node kinds, eligible for forward absorption.
    pub fn comment_node_kinds(self) -> &'static [&'static str] {
        match self.0 {
            "rust" => &["line_comment", "block_comment"],
            "java" => &["line_comment", "block_comment"],
            _ => &["comment"],
        }
    }

    /// Human prefix composed into the context path (`"function greet"`).
    pub fn type_prefix(self, kind: &str) -> &'static str {
        match kind {
            "function_item" | "function_declaration" | "function_definition" => "function ",
            "method_definition" | "method_declaration" => "method ",
            "class_declaration" | "abstract_class_declaration" | "class_definition" => "class ",
            "interface_declaration" => "interface ",
            "enum_declaration" | "enum_item" => "enum ",
            "struct_item" => "struct ",
            "trait_item" => "trait ",
            "impl_item" => "impl ",
            "mod_item" | "internal_module" => "mod ",
            "type_declaration" => "type ",
            "record_declaration" => "record ",
            _ => "",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_uses_whitelist() {
        assert_eq!(Language::from_path("src/a.ts").unwrap().id(), "typescript");
        assert_eq!(Language::from_path("x/y.go").unwrap().id(), "go");
        assert!(Language::from_path("binary.exe").is_none());
    }

    #[test]
    fn ast_support_set() {
        for tag in ["typescript", "javascript", "python", "go", "rust", "java"] {
            assert!(Language::from_tag(tag).unwrap().ast_supported(), "{tag}");
        }
        assert!(!Language::from_tag("yaml").unwrap().ast_supported());
        assert!(!Language::from_tag("markdown").unwrap().ast_supported());
    }

    #[test]
    fn grammars_exist_for_ast_languages() {
        let lang = Language::from_tag("rust").unwrap();
        assert!(lang.grammar_for_path("src/lib.rs").is_some());
        let ts = Language::from_tag("typescript").unwrap();
        assert!(ts.grammar_for_path("a.ts").is_some());
        assert!(ts.grammar_for_path("a.tsx").is_some());
        assert!(Language::from_tag("sql").unwrap().grammar_for_path("q.sql").is_none());
    }

    #[test]
    fn type_prefixes() {
        let rust = Language::from_tag("rust").unwrap();
        assert_eq!(rust.type_prefix("function_item"), "function ");
        assert_eq!(rust.type_prefix("impl_item"), "impl ");
        assert_eq!(rust.type_prefix("string_literal"), "");
    }

    #[test]
    fn comment_kinds_by_language() {
        assert!(Language::from_tag("rust")
            .unwrap()
            .comment_node_kinds()
            .contains(&"line_comment"));
        assert!(Language::from_tag("python")
            .unwrap()
            .comment_node_kinds()
            .contains(&"comment"));
    }
}
