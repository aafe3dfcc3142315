//! Context packing: merge chunk intervals per file, slice source text, and
//! enforce the total character budget.

use std::collections::HashMap;

use serde::Serialize;

use cw_db::{RowStore, StoredChunk};

use crate::config::PackConfig;
use crate::errors::CwResult;

/// A merged, scored byte interval within one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
    pub score: f32,
    pub breadcrumb: String,
}

/// One sliced segment of a packed file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedSegment {
    /// 1-based line range.
    pub start_line: usize,
    pub end_line: usize,
    pub raw_start: u32,
    pub raw_end: u32,
    pub score: f32,
    pub breadcrumb: String,
    pub text: String,
}

/// All packed segments of one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedFile {
    pub file_path: String,
    pub segments: Vec<PackedSegment>,
}

/// The context packer.
#[derive(Debug, Clone)]
pub struct ContextPacker {
    config: PackConfig,
}

impl ContextPacker {
    /// Create a packer.
    pub fn new(config: PackConfig) -> Self {
        Self { config }
    }

    /// Pack scored chunks into per-file segments under the budget.
    pub fn pack(
        &self,
        chunks: &[(StoredChunk, f32)],
        row_store: &RowStore,
    ) -> CwResult<Vec<PackedFile>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        // Group by file, track the file's best score for ordering.
        let mut by_file: HashMap<&str, Vec<&(StoredChunk, f32)>> = HashMap::new();
        for entry in chunks {
            by_file.entry(entry.0.file_path.as_str()).or_default().push(entry);
        }

        let mut files: Vec<(&str, f32)> = by_file
            .iter()
            .map(|(path, entries)| {
                let best = entries
                    .iter()
                    .map(|(_, score)| *score)
                    .fold(f32::MIN, f32::max);
                (*path, best)
            })
            .collect();
        files.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        // One batched content load for every involved file.
        let paths: Vec<String> = files.iter().map(|(p, _)| p.to_string()).collect();
        let contents = row_store.get_contents(&paths)?;

        let mut packed = Vec::new();
        let mut total_chars = 0usize;

        'files: for (path, _) in files {
            let Some(content) = contents.get(path) else {
                continue;
            };
            let entries = &by_file[path];

            let intervals: Vec<Interval> = entries
                .iter()
                .map(|(chunk, score)| Interval {
                    start: chunk.raw_start,
                    end: chunk.raw_end,
                    score: *score,
                    breadcrumb: chunk.breadcrumb.clone(),
                })
                .collect();
            let merged = merge_intervals(intervals);

            // Keep the best-scoring segments, then restore source order.
            let mut selected = merged;
            selected.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.start.cmp(&b.start))
            });
            selected.truncate(self.config.max_segments_per_file);
            selected.sort_by_key(|interval| interval.start);

            let mut segments = Vec::new();
            for interval in selected {
                let segment = slice_segment(content, &interval);
                total_chars += segment.text.chars().count();
                segments.push(segment);
                if total_chars > self.config.max_total_chars {
                    if !segments.is_empty() {
                        packed.push(PackedFile {
                            file_path: path.to_string(),
                            segments,
                        });
                    }
                    break 'files;
                }
            }

            if !segments.is_empty() {
                packed.push(PackedFile {
                    file_path: path.to_string(),
                    segments,
                });
            }
        }

        Ok(packed)
    }
}

/// Linear merge of sorted intervals; overlapping or touching spans collapse
/// to one, keeping the max score and the first-seen breadcrumb.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by_key(|interval| interval.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
                last.score = last.score.max(interval.score);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

fn slice_segment(content: &str, interval: &Interval) -> PackedSegment {
    let start = clamp_to_char_boundary(content, interval.start as usize);
    let end = clamp_to_char_boundary(content, interval.end as usize);
    let (start, end) = if start <= end { (start, end) } else { (end, start) };

    let start_line = content[..start].matches('\n').count() + 1;
    let end_line = content[..end].matches('\n').count() + 1;

    PackedSegment {
        start_line,
        end_line,
        raw_start: start as u32,
        raw_end: end as u32,
        score: interval.score,
        breadcrumb: interval.breadcrumb.clone(),
        text: content[start..end].to_string(),
    }
}

fn clamp_to_char_boundary(content: &str, offset: usize) -> usize {
    let mut offset = offset.min(content.len());
    while offset > 0 && !content.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

// ============================================================================
// Tests
// ============================================================================
