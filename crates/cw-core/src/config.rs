//! Tuning configuration for the splitter, search pipeline, expander, and
//! packer.
//!
//! Every knob has the default the retrieval pipeline was tuned with; the
//! serde shape allows overriding from a JSON blob without breaking on
//! missing fields.

use serde::{Deserialize, Serialize};

use crate::errors::CwError;

// ============================================================================
// Splitter
// ============================================================================

/// Semantic splitter configuration. Budgets are in non-whitespace (NWS)
/// characters except `max_raw_chars`, which bounds the raw span length.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitterConfig {
    /// NWS budget per chunk.
    /// Default: 1000
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u32,

    /// Windows below this NWS size get a relaxed merge budget.
    /// Default: 50
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: u32,

    /// NWS overlap pulled backwards into the embedding window.
    /// Default: 120
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    /// Raw span cap. Default: 4 * max_chunk_size.
    #[serde(default = "default_max_raw_chars")]
    pub max_raw_chars: u32,
}

fn default_max_chunk_size() -> u32 {
    1000
}

fn default_min_chunk_size() -> u32 {
    50
}

fn default_chunk_overlap() -> u32 {
    120
}

fn default_max_raw_chars() -> u32 {
    4 * default_max_chunk_size()
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_raw_chars: default_max_raw_chars(),
        }
    }
}

impl SplitterConfig {
    /// Validate the splitter configuration.
    ///
    /// # Errors
    /// Returns an error if budgets are zero or inverted.
    pub fn validate(&self) -> Result<(), CwError> {
        if self.max_chunk_size == 0 {
            return Err(CwError::InvalidConfiguration {
                message: "splitter.maxChunkSize must be positive".to_string(),
                hint: "Set maxChunkSize to a positive NWS budget (recommended: 1000)".to_string(),
            });
        }
        if self.min_chunk_size >= self.max_chunk_size {
            return Err(CwError::InvalidConfiguration {
                message: "splitter.minChunkSize must be below maxChunkSize".to_string(),
                hint: "Use a small minimum (recommended: 50)".to_string(),
            });
        }
        if self.max_raw_chars < self.max_chunk_size {
            return Err(CwError::InvalidConfiguration {
                message: "splitter.maxRawChars must be at least maxChunkSize".to_string(),
                hint: "Use 4x maxChunkSize (recommended: 4000)".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Search
// ============================================================================

/// Hybrid search configuration: recall widths, RRF fusion weights, and the
/// smart top-K cutoff anchors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    /// Vector recall width. Default: 80
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,

    /// Vector candidates kept by ascending distance. Default: 60
    #[serde(default = "default_vector_top_m")]
    pub vector_top_m: usize,

    /// Total lexical chunk candidates. Default: 40
    #[serde(default = "default_lex_total_chunks")]
    pub lex_total_chunks: usize,

    /// Files considered in the files_fts fallback. Default: 20
    #[serde(default = "default_fts_top_k_files")]
    pub fts_top_k_files: usize,

    /// Chunks selected per file in the fallback. Default: 2
    #[serde(default = "default_lex_chunks_per_file")]
    pub lex_chunks_per_file: usize,

    /// Fused candidates forwarded to the reranker. Default: 60
    #[serde(default = "default_fused_top_m")]
    pub fused_top_m: usize,

    /// RRF k0 constant. Default: 20
    #[serde(default = "default_rrf_k0")]
    pub rrf_k0: f32,

    /// RRF weight of the vector branch. Default: 0.6
    #[serde(default = "default_w_vec")]
    pub w_vec: f32,

    /// RRF weight of the lexical branch. Default: 0.4
    #[serde(default = "default_w_lex")]
    pub w_lex: f32,

    /// Absolute score floor; below it only the top candidate survives.
    /// Default: 0.25
    #[serde(default = "default_smart_min_score")]
    pub smart_min_score: f32,

    /// Ratio anchor: candidates must reach top * ratio. Default: 0.5
    #[serde(default = "default_smart_top_score_ratio")]
    pub smart_top_score_ratio: f32,

    /// Delta anchor: candidates must reach top - delta. Default: 0.25
    #[serde(default = "default_smart_top_score_delta_abs")]
    pub smart_top_score_delta_abs: f32,

    /// Seeds always admitted against the floor alone. Default: 2
    #[serde(default = "default_smart_min_k")]
    pub smart_min_k: usize,

    /// Hard seed cap. Default: 8
    #[serde(default = "default_smart_max_k")]
    pub smart_max_k: usize,
}

fn default_vector_top_k() -> usize {
    80
}

fn default_vector_top_m() -> usize {
    60
}

fn default_lex_total_chunks() -> usize {
    40
}

fn default_fts_top_k_files() -> usize {
    20
}

fn default_lex_chunks_per_file() -> usize {
    2
}

fn default_fused_top_m() -> usize {
    60
}

fn default_rrf_k0() -> f32 {
    20.0
}

fn default_w_vec() -> f32 {
    0.6
}

fn default_w_lex() -> f32 {
    0.4
}

fn default_smart_min_score() -> f32 {
    0.25
}

fn default_smart_top_score_ratio() -> f32 {
    0.5
}

fn default_smart_top_score_delta_abs() -> f32 {
    0.25
}

fn default_smart_min_k() -> usize {
    2
}

fn default_smart_max_k() -> usize {
    8
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_top_k: default_vector_top_k(),
            vector_top_m: default_vector_top_m(),
            lex_total_chunks: default_lex_total_chunks(),
            fts_top_k_files: default_fts_top_k_files(),
            lex_chunks_per_file: default_lex_chunks_per_file(),
            fused_top_m: default_fused_top_m(),
            rrf_k0: default_rrf_k0(),
            w_vec: default_w_vec(),
            w_lex: default_w_lex(),
            smart_min_score: default_smart_min_score(),
            smart_top_score_ratio: default_smart_top_score_ratio(),
            smart_top_score_delta_abs: default_smart_top_score_delta_abs(),
            smart_min_k: default_smart_min_k(),
            smart_max_k: default_smart_max_k(),
        }
    }
}

impl SearchConfig {
    /// Validate the search configuration.
    ///
    /// # Errors
    /// Returns an error if the RRF constant or weights would break fusion.
    pub fn validate(&self) -> Result<(), CwError> {
        if self.rrf_k0 <= 0.0 {
            return Err(CwError::InvalidConfiguration {
                message: "search.rrfK0 must be positive".to_string(),
                hint: "Set rrfK0 to a positive value (recommended: 20)".to_string(),
            });
        }
        if self.w_vec < 0.0 || self.w_lex < 0.0 {
            return Err(CwError::InvalidConfiguration {
                message: "search fusion weights cannot be negative".to_string(),
                hint: "Use wVec=0.6, wLex=0.4".to_string(),
            });
        }
        if self.smart_max_k == 0 {
            return Err(CwError::InvalidConfiguration {
                message: "search.smartMaxK must be positive".to_string(),
                hint: "Set smartMaxK to at least 1 (recommended: 8)".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Expansion
// ============================================================================

/// Graph expansion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandConfig {
    /// Same-file neighbor hops per seed. Default: 1
    #[serde(default = "default_neighbor_hops")]
    pub neighbor_hops: usize,

    /// Score decay per neighbor hop. Default: 0.8
    #[serde(default = "default_decay_neighbor")]
    pub decay_neighbor: f32,

    /// Breadcrumb siblings added per parent prefix. Default: 1
    #[serde(default = "default_breadcrumb_expand_limit")]
    pub breadcrumb_expand_limit: usize,

    /// Score decay for breadcrumb siblings. Default: 0.7
    #[serde(default = "default_decay_breadcrumb")]
    pub decay_breadcrumb: f32,

    /// Import targets followed per seed file at depth 0. Default: 5
    #[serde(default = "default_import_files_per_seed")]
    pub import_files_per_seed: usize,

    /// Chunks taken per resolved import file. Default: 2
    #[serde(default = "default_chunks_per_import_file")]
    pub chunks_per_import_file: usize,

    /// Score decay for import expansion. Default: 0.6
    #[serde(default = "default_decay_import")]
    pub decay_import: f32,

    /// Additional decay applied at depth 1. Default: 0.7
    #[serde(default = "default_decay_depth")]
    pub decay_depth: f32,
}

fn default_neighbor_hops() -> usize {
    1
}

fn default_decay_neighbor() -> f32 {
    0.8
}

fn default_breadcrumb_expand_limit() -> usize {
    1
}

fn default_decay_breadcrumb() -> f32 {
    0.7
}

fn default_import_files_per_seed() -> usize {
    5
}

fn default_chunks_per_import_file() -> usize {
    2
}

fn default_decay_import() -> f32 {
    0.6
}

fn default_decay_depth() -> f32 {
    0.7
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            neighbor_hops: default_neighbor_hops(),
            decay_neighbor: default_decay_neighbor(),
            breadcrumb_expand_limit: default_breadcrumb_expand_limit(),
            decay_breadcrumb: default_decay_breadcrumb(),
            import_files_per_seed: default_import_files_per_seed(),
            chunks_per_import_file: default_chunks_per_import_file(),
            decay_import: default_decay_import(),
            decay_depth: default_decay_depth(),
        }
    }
}

// ============================================================================
// Packing
// ============================================================================

/// Context packer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackConfig {
    /// Best-scoring segments kept per file. Default: 3
    #[serde(default = "default_max_segments_per_file")]
    pub max_segments_per_file: usize,

    /// Total character budget across the pack. Default: 48000
    #[serde(default = "default_max_total_chars")]
    pub max_total_chars: usize,
}

fn default_max_segments_per_file() -> usize {
    3
}

fn default_max_total_chars() -> usize {
    48_000
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            max_segments_per_file: default_max_segments_per_file(),
            max_total_chars: default_max_total_chars(),
        }
    }
}

// ============================================================================
// Top level
// ============================================================================

/// Full engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaverConfig {
    #[serde(default)]
    pub splitter: SplitterConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub expand: ExpandConfig,
    #[serde(default)]
    pub pack: PackConfig,
}

impl WeaverConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), CwError> {
        self.splitter.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

/// Options for a scan run.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Run the vector indexing phase. Default: true.
    pub vector_index: bool,
    /// Truncate the row store and recreate the vector table first.
    pub force_reindex: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            vector_index: true,
            force_reindex: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        WeaverConfig::default().validate().unwrap();
    }

    #[test]
    fn default_constants_match_tuning() {
        let search = SearchConfig::default();
        assert_eq!(search.vector_top_k, 80);
        assert_eq!(search.fused_top_m, 60);
        assert!((search.w_vec - 0.6).abs() < f32::EPSILON);
        assert!((search.w_lex - 0.4).abs() < f32::EPSILON);
        assert!((search.rrf_k0 - 20.0).abs() < f32::EPSILON);

        let splitter = SplitterConfig::default();
        assert_eq!(splitter.max_raw_chars, 4 * splitter.max_chunk_size);
    }

    #[test]
    fn inverted_splitter_budget_rejected() {
        let config = SplitterConfig {
            min_chunk_size: 2000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rrf_k0_rejected() {
        let config = SearchConfig {
            rrf_k0: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_deserializes_from_partial_json() {
        let config: WeaverConfig =
            serde_json::from_str(r#"{"search": {"vectorTopK": 10}}"#).unwrap();
        assert_eq!(config.search.vector_top_k, 10);
        assert_eq!(config.search.vector_top_m, 60);
    }
}
