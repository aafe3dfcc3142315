//! Split-then-merge semantic windowing.
//!
//! The splitter walks the AST top-down, emitting windows for nodes that fit
//! the NWS budget and recursing into the ones that don't, then merges
//! sibling windows left to right under gap-aware budgets. Context paths are
//! pushed by hierarchy nodes (class/function/impl/...) and inherited by
//! descendants. Trailing comments migrate forward so a docstring lands in
//! the same chunk as the code it documents.

use crate::config::SplitterConfig;

use super::adapter::{IndexDomain, SourceAdapter};
use super::language::Language;
use super::ProcessedChunk;

/// Abstract view of a parsed syntax node.
///
/// The real implementation is `tree_sitter::Node`; tests drive the splitter
/// with synthetic trees, which also exercises the UTF-16 offset branch that
/// byte-offset parsers never hit.
pub trait SyntaxNode: Sized {
    /// Node kind (e.g. `"function_declaration"`).
    fn kind(&self) -> &str;
    /// Start offset in the parser's index domain.
    fn start_index(&self) -> usize;
    /// End offset in the parser's index domain.
    fn end_index(&self) -> usize;
    /// Named children, in source order.
    fn named_children(&self) -> Vec<Self>;
}

impl<'tree> SyntaxNode for tree_sitter::Node<'tree> {
    fn kind(&self) -> &str {
        tree_sitter::Node::kind(self)
    }

    fn start_index(&self) -> usize {
        self.start_byte()
    }

    fn end_index(&self) -> usize {
        self.end_byte()
    }

    fn named_children(&self) -> Vec<Self> {
        let mut cursor = self.walk();
        let children: Vec<_> = tree_sitter::Node::named_children(self, &mut cursor).collect();
        children
    }
}

/// One span contributed by a single AST node.
#[derive(Debug, Clone)]
struct NodeSpan {
    start: usize,
    end: usize,
    comment: bool,
}

/// A window: one or more adjacent node spans plus the context path.
#[derive(Debug, Clone)]
struct Window {
    spans: Vec<NodeSpan>,
    path: Vec<String>,
}

impl Window {
    fn start(&self) -> usize {
        self.spans[0].start
    }

    fn end(&self) -> usize {
        self.spans[self.spans.len() - 1].end
    }

    fn size(&self, adapter: &SourceAdapter<'_>) -> u32 {
        adapter.nws(self.start(), self.end())
    }
}

/// The semantic splitter. Holds only configuration; per-call state lives on
/// the stack so one splitter serves every file.
#[derive(Debug, Clone)]
pub struct SemanticSplitter {
    config: SplitterConfig,
}

impl SemanticSplitter {
    /// Create a splitter with the given budgets.
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    /// Split a parsed file into chunks.
    ///
    /// Falls back to plain-text line splitting when the root end offset
    /// matches neither the byte nor the UTF-16 length of the source.
    pub fn split_ast<N: SyntaxNode>(
        &self,
        source: &str,
        file_path: &str,
        language: Language,
        root: &N,
    ) -> Vec<ProcessedChunk> {
        let adapter = SourceAdapter::new(source, root.end_index());
        if adapter.domain() == IndexDomain::Unknown {
            return self.split_plain_text(source, file_path, language.id());
        }
        if adapter.total_nws() == 0 {
            return Vec::new();
        }

        let root_path = vec![file_path.to_string()];
        let children = root.named_children();

        let windows = if children.is_empty() {
            vec![Window {
                spans: vec![NodeSpan {
                    start: 0,
                    end: adapter.end_index(),
                    comment: false,
                }],
                path: root_path,
            }]
        } else {
            let mut child_windows = Vec::new();
            for child in &children {
                self.collect_windows(child, &root_path, &adapter, language, &mut child_windows);
            }
            self.merge_siblings(child_windows, &adapter)
        };

        self.emit(windows, &adapter, language.id())
    }

    /// Plain-text fallback: line accumulation under the NWS budget, no
    /// overlap, no context hierarchy.
    pub fn split_plain_text(
        &self,
        source: &str,
        file_path: &str,
        language: &str,
    ) -> Vec<ProcessedChunk> {
        let adapter = SourceAdapter::new(source, source.len());
        if adapter.total_nws() == 0 {
            return Vec::new();
        }

        let max = self.config.max_chunk_size;
        let mut windows: Vec<(usize, usize)> = Vec::new();
        let mut window_start = 0usize;
        let mut window_nws = 0u32;
        let mut offset = 0usize;

        for line in source.split_inclusive('\n') {
            let line_end = offset + line.len();
            let line_nws = adapter.nws_between_bytes(offset, line_end);
            if window_nws > 0 && window_nws + line_nws > max {
                windows.push((window_start, offset));
                window_start = offset;
                window_nws = 0;
            }
            window_nws += line_nws;
            offset = line_end;
        }
        if window_start < source.len() {
            windows.push((window_start, source.len()));
        }

        let count = windows.len();
        windows
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let end = if i + 1 == count { source.len() } else { end };
                let display_code = source[start..end].to_string();
                ProcessedChunk {
                    chunk_index: i as u32,
                    vector_text: format!("// Context: {file_path}\n{display_code}"),
                    breadcrumb: file_path.to_string(),
                    context_path: vec![file_path.to_string()],
                    language: language.to_string(),
                    start_index: adapter.units_at_byte(start) as u32,
                    end_index: adapter.units_at_byte(end) as u32,
                    raw_start: start as u32,
                    raw_end: end as u32,
                    vec_start: start as u32,
                    vec_end: end as u32,
                    display_code,
                }
            })
            .collect()
    }

    /// Recursive visit: emit fitting nodes as one-node windows, descend into
    /// oversized ones, updating the context path at hierarchy nodes.
    fn collect_windows<N: SyntaxNode>(
        &self,
        node: &N,
        ctx_path: &[String],
        adapter: &SourceAdapter<'_>,
        language: Language,
        out: &mut Vec<Window>,
    ) {
        let kind = node.kind().to_string();
        let path = self.node_path(node, &kind, ctx_path, adapter, language);

        let size = adapter.nws(node.start_index(), node.end_index());
        if size <= self.config.max_chunk_size {
            out.push(Window {
                spans: vec![NodeSpan {
                    start: node.start_index(),
                    end: node.end_index(),
                    comment: language.comment_node_kinds().contains(&kind.as_str()),
                }],
                path,
            });
            return;
        }

        let children = node.named_children();
        if children.is_empty() {
            // Atomic oversized node (huge string literal): one over-budget window.
            out.push(Window {
                spans: vec![NodeSpan {
                    start: node.start_index(),
                    end: node.end_index(),
                    comment: false,
                }],
                path,
            });
            return;
        }

        let mut child_windows = Vec::new();
        for child in &children {
            self.collect_windows(child, &path, adapter, language, &mut child_windows);
        }
        out.extend(self.merge_siblings(child_windows, adapter));
    }

    /// Context path for a node: hierarchy nodes with a name push
    /// `"<type-prefix><name>"`, everything else inherits.
    fn node_path<N: SyntaxNode>(
        &self,
        node: &N,
        kind: &str,
        ctx_path: &[String],
        adapter: &SourceAdapter<'_>,
        language: Language,
    ) -> Vec<String> {
        if !language.hierarchy_node_kinds().contains(&kind) {
            return ctx_path.to_vec();
        }
        let name_kinds = language.name_node_kinds();
        let name = node
            .named_children()
            .into_iter()
            .find(|c| name_kinds.contains(&c.kind()))
            .map(|c| adapter.slice(c.start_index(), c.end_index()).to_string());

        match name {
            Some(name) if !name.is_empty() => {
                let mut path = ctx_path.to_vec();
                path.push(format!("{}{}", language.type_prefix(kind), name));
                path
            }
            _ => ctx_path.to_vec(),
        }
    }

    /// Left-to-right sibling merge under gap-aware NWS and raw budgets,
    /// with forward comment absorption before each merge test.
    fn merge_siblings(&self, windows: Vec<Window>, adapter: &SourceAdapter<'_>) -> Vec<Window> {
        let max = self.config.max_chunk_size as f32;
        let max_raw = self.config.max_raw_chars as f32;
        let min = self.config.min_chunk_size;

        let mut result = Vec::new();
        let mut iter = windows.into_iter();
        let Some(mut current) = iter.next() else {
            return result;
        };

        for mut next in iter {
            // Forward comment absorption: trailing comments belong with the
            // code they precede.
            while matches!(current.spans.last(), Some(span) if span.comment) {
                if let Some(span) = current.spans.pop() {
                    next.spans.insert(0, span);
                }
            }
            if current.spans.is_empty() {
                current = next;
                continue;
            }

            let cur_size = current.size(adapter);
            let next_size = next.size(adapter);
            let gap_nws = adapter.nws(current.end(), next.start());
            let combined_nws = cur_size + gap_nws + next_size;
            let combined_raw = next.end().saturating_sub(current.start());

            let same_context = {
                let common = common_prefix_len(&current.path, &next.path);
                common >= current.path.len().min(next.path.len())
            };
            let penalty = if same_context { 1.0 } else { 0.7 };

            let fits_nws = (combined_nws as f32) <= max * penalty
                || (cur_size < min && (combined_nws as f32) < 1.5 * max * penalty);
            let fits_raw = (combined_raw as f32) <= max_raw * penalty;

            if fits_nws && fits_raw {
                current.path = merged_path(&current.path, &next.path);
                current.spans.extend(next.spans);
            } else {
                result.push(current);
                current = next;
            }
        }
        if !current.spans.is_empty() {
            result.push(current);
        }
        result
    }

    /// Emit chunks from the final windows: gap-owning raw spans and the
    /// backward overlap window.
    fn emit(
        &self,
        windows: Vec<Window>,
        adapter: &SourceAdapter<'_>,
        language: &str,
    ) -> Vec<ProcessedChunk> {
        let count = windows.len();
        let mut chunks = Vec::with_capacity(count);
        let mut prev_semantic_end = 0usize;

        for (i, window) in windows.iter().enumerate() {
            let start = window.start();
            let end = window.end();

            let raw_start = prev_semantic_end;
            let raw_end = if i + 1 == count {
                adapter.end_index()
            } else {
                end
            };
            prev_semantic_end = end;

            let vec_start = if i == 0 {
                start
            } else {
                self.overlap_start(adapter, start)
            };

            let display_code = adapter.slice(start, end).to_string();
            let breadcrumb = window.path.join(" > ");
            let vector_text =
                format!("// Context: {breadcrumb}\n{}", adapter.slice(vec_start, end));

            chunks.push(ProcessedChunk {
                chunk_index: i as u32,
                display_code,
                vector_text,
                breadcrumb,
                context_path: window.path.clone(),
                language: language.to_string(),
                start_index: adapter.to_units(start) as u32,
                end_index: adapter.to_units(end) as u32,
                raw_start: adapter.to_bytes(raw_start) as u32,
                raw_end: adapter.to_bytes(raw_end) as u32,
                vec_start: adapter.to_bytes(vec_start) as u32,
                vec_end: adapter.to_bytes(end) as u32,
            });
        }
        chunks
    }

    /// Largest start position whose NWS distance to `start` reaches the
    /// overlap budget; overlap is discarded entirely when the raw extension
    /// would exceed a quarter of `max_raw_chars`.
    fn overlap_start(&self, adapter: &SourceAdapter<'_>, start: usize) -> usize {
        let overlap = self.config.chunk_overlap;
        if overlap == 0 {
            return start;
        }

        let candidate = if adapter.nws(0, start) < overlap {
            0
        } else {
            let mut lo = 0usize;
            let mut hi = start;
            while lo < hi {
                let mid = lo + (hi - lo).div_ceil(2);
                if adapter.nws(mid, start) >= overlap {
                    lo = mid;
                } else {
                    hi = mid - 1;
                }
            }
            lo
        };

        let extension = start - candidate;
        if (extension as f32) > 0.25 * self.config.max_raw_chars as f32 {
            start
        } else {
            candidate
        }
    }
}

fn common_prefix_len(a: &[String], b: &[String]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Context path of a merged window: the more specific path when one extends
/// the other, the common prefix when they diverge.
fn merged_path(a: &[String], b: &[String]) -> Vec<String> {
    let common = common_prefix_len(a, b);
    if common >= a.len().min(b.len()) {
        if a.len() >= b.len() {
            a.to_vec()
        } else {
            b.to_vec()
        }
    } else {
        a[..common].to_vec()
    }
}

// ============================================================================
// Tests
// ============================================================================
