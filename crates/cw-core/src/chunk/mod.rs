//! AST-aware semantic chunking.
//!
//! The splitter turns one source file into an ordered list of
//! [`ProcessedChunk`]s with three span families:
//!
//! - `start_index..end_index`: the semantic node span, UTF-16 code units.
//! - `raw_start..raw_end`: non-overlapping byte coverage. Concatenating all
//!   raw spans of a file reproduces it exactly, gaps owned by the following
//!   chunk.
//! - `vec_start..vec_end`: the (possibly backward-overlapping) byte window
//!   the embedding text is sliced from.

pub mod adapter;
pub mod language;
pub mod splitter;

use tracing::debug;

pub use adapter::{IndexDomain, SourceAdapter};
pub use language::Language;
pub use splitter::{SemanticSplitter, SyntaxNode};

use crate::constants::is_fallback_language;

/// One chunk of a processed file, ready for embedding and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedChunk {
    /// Position of the chunk within its file.
    pub chunk_index: u32,
    /// The semantic node text, shown to the user.
    pub display_code: String,
    /// Breadcrumb header plus the (possibly overlapped) code, fed to the
    /// embedding service.
    pub vector_text: String,
    /// `"<path> > <type-prefix><name> > ..."`.
    pub breadcrumb: String,
    /// Breadcrumb components; `context_path[0]` is the file path.
    pub context_path: Vec<String>,
    /// Language tag.
    pub language: String,
    /// Semantic span, UTF-16 code units.
    pub start_index: u32,
    pub end_index: u32,
    /// Raw coverage, bytes.
    pub raw_start: u32,
    pub raw_end: u32,
    /// Embedding window, bytes.
    pub vec_start: u32,
    pub vec_end: u32,
}

/// Chunk one file: AST first where a grammar exists, plain-text lines for
/// the fallback languages when the AST yields nothing.
pub fn chunk_source(
    splitter: &SemanticSplitter,
    source: &str,
    file_path: &str,
    language: Language,
) -> Vec<ProcessedChunk> {
    if language.ast_supported() {
        match parse_and_split(splitter, source, file_path, language) {
            Some(chunks) if !chunks.is_empty() => return chunks,
            Some(_) => {}
            None => debug!("AST parse failed for {file_path}, falling back"),
        }
    }

    if is_fallback_language(language.id()) {
        return splitter.split_plain_text(source, file_path, language.id());
    }
    Vec::new()
}

fn parse_and_split(
    splitter: &SemanticSplitter,
    source: &str,
    file_path: &str,
    language: Language,
) -> Option<Vec<ProcessedChunk>> {
    let grammar = language.grammar_for_path(file_path)?;
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&grammar).ok()?;
    let tree = parser.parse(source, None)?;
    Some(splitter.split_ast(source, file_path, language, &tree.root_node()))
}
