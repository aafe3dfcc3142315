//! The ContextWeaver engine: per-project registries plus the scan and
//! search entry points.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info};

use cw_db::{ChunkStore, FileMeta, FileUpsert, RowStore, META_EMBEDDING_DIMENSIONS};
use cw_model::{
    create_embedding_model, create_reranker_model, EmbeddingConfig, EmbeddingModel,
    RerankerConfig, RerankerModel,
};

use crate::chunk::{chunk_source, Language, SemanticSplitter};
use crate::config::{ScanOptions, WeaverConfig};
use crate::constants::adaptive_concurrency;
use crate::errors::{CwError, CwResult};
use crate::expand::GraphExpander;
use crate::index::{IndexFile, Indexer};
use crate::lock::ProcessLock;
use crate::project::ProjectId;
use crate::scan::{FileStatus, ScanReport, ScanStats, Scanner};
use crate::search::{ContextPack, SearchService};

/// Index health summary for one project.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub project_id: String,
    pub files: usize,
    pub chunk_fts_rows: usize,
    pub vectors: Option<usize>,
    /// Rows whose vectors are missing or stale (self-heal backlog).
    pub pending_vector_rows: usize,
    pub embedding_dimensions: Option<usize>,
    pub trigram_fts: bool,
}

/// The engine. Owns the service clients, the worker pool, and per-project
/// caches (chunk stores, graph expanders); everything else is opened per
/// operation.
pub struct WeaverEngine {
    config: WeaverConfig,
    home: PathBuf,
    embedder: Option<Box<dyn EmbeddingModel>>,
    reranker: Option<Box<dyn RerankerModel>>,
    splitter: SemanticSplitter,
    pool: rayon::ThreadPool,
    chunk_stores: Mutex<HashMap<String, Arc<ChunkStore>>>,
    expanders: Mutex<HashMap<String, Arc<GraphExpander>>>,
}

impl WeaverEngine {
    /// Create an engine with explicit service clients.
    pub fn new(
        config: WeaverConfig,
        embedder: Option<Box<dyn EmbeddingModel>>,
        reranker: Option<Box<dyn RerankerModel>>,
    ) -> CwResult<Self> {
        config.validate()?;
        let home = dirs::home_dir().ok_or(CwError::NoHomeDirectory)?;
        Self::with_home_dir(config, home, embedder, reranker)
    }

    /// Create an engine rooted at an explicit home directory.
    pub fn with_home_dir(
        config: WeaverConfig,
        home: PathBuf,
        embedder: Option<Box<dyn EmbeddingModel>>,
        reranker: Option<Box<dyn RerankerModel>>,
    ) -> CwResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(adaptive_concurrency())
            .build()
            .map_err(|e| CwError::InvalidConfiguration {
                message: format!("failed to build worker pool: {e}"),
                hint: "Check thread limits".to_string(),
            })?;

        Ok(Self {
            splitter: SemanticSplitter::new(config.splitter.clone()),
            config,
            home,
            embedder,
            reranker,
            pool,
            chunk_stores: Mutex::new(HashMap::new()),
            expanders: Mutex::new(HashMap::new()),
        })
    }

    /// Create an engine from `CONTEXTWEAVER_*` environment variables.
    ///
    /// A service whose base URL is unset stays unconfigured; operations
    /// that need it fail with [`CwError::ServiceNotConfigured`].
    pub fn from_env(config: WeaverConfig) -> CwResult<Self> {
        let embedder = if std::env::var(cw_model::config::EMBEDDING_BASE_URL_ENV).is_ok() {
            Some(create_embedding_model(EmbeddingConfig::from_env()?))
        } else {
            None
        };
        let reranker = if std::env::var(cw_model::config::RERANK_BASE_URL_ENV).is_ok() {
            Some(create_reranker_model(RerankerConfig::from_env()?))
        } else {
            None
        };
        Self::new(config, embedder, reranker)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    /// Scan a project: crawl, process, reconcile, and (unless disabled)
    /// run the vector indexing phase with self-healing.
    pub fn scan(&self, root: &Path, opts: &ScanOptions) -> CwResult<ScanReport> {
        let project_id = ProjectId::derive(root)?;
        info!("Scanning {:?} as project {project_id}", root);

        std::fs::create_dir_all(project_id.data_dir(&self.home))?;
        let _lock = ProcessLock::acquire(&project_id.lock_path(&self.home), "scan")?;

        let mut row_store = RowStore::open(&project_id.index_db_path(&self.home))?;
        let mut force_reindex = opts.force_reindex;

        // Dimension bookkeeping happens eagerly at scan start.
        let chunk_store = if opts.vector_index {
            let embedder = self.require_embedder("scan")?;
            let dimensions = embedder.dimension();
            let stored = row_store.get_metadata(META_EMBEDDING_DIMENSIONS)?;
            match stored {
                Some(value) if value != dimensions.to_string() => {
                    info!("Embedding dimensions changed ({value} -> {dimensions}); full reindex");
                    force_reindex = true;
                }
                _ => {}
            }
            row_store.set_metadata(META_EMBEDDING_DIMENSIONS, &dimensions.to_string())?;
            Some(self.chunk_store(&project_id, dimensions)?)
        } else {
            None
        };

        if force_reindex {
            row_store.truncate()?;
            if let Some(store) = &chunk_store {
                store.clear()?;
            }
            self.invalidate_expander(&project_id);
        }

        let known: HashMap<String, FileMeta> = row_store
            .load_all_files()?
            .into_iter()
            .map(|meta| (meta.path.clone(), meta))
            .collect();

        let scanner = Scanner::new(root, &self.splitter);
        let crawled = scanner.crawl()?;
        let (processed, errors) = scanner.process(&crawled, &known, &self.pool);

        // Reconcile the row store with the crawl.
        let crawl_set: HashSet<&str> = crawled.iter().map(|f| f.rel_path.as_str()).collect();
        let deleted: Vec<String> = known
            .keys()
            .filter(|path| !crawl_set.contains(path.as_str()))
            .cloned()
            .collect();

        let mut stats = ScanStats {
            deleted: deleted.len(),
            errors: errors.len(),
            ..Default::default()
        };

        let mut upserts: Vec<FileUpsert> = Vec::new();
        let mut mtime_updates: Vec<(String, i64)> = Vec::new();
        for file in &processed {
            match file.status {
                FileStatus::Added => stats.added += 1,
                FileStatus::Modified => stats.modified += 1,
                FileStatus::Unchanged => stats.unchanged += 1,
                FileStatus::Skipped => stats.skipped += 1,
            }
            match file.status {
                FileStatus::Added | FileStatus::Modified | FileStatus::Skipped => {
                    upserts.push(FileUpsert {
                        path: file.path.clone(),
                        hash: file.hash.clone(),
                        mtime: file.mtime,
                        size: file.size,
                        content: file.content.clone(),
                        language: file.language.clone(),
                    });
                }
                FileStatus::Unchanged => mtime_updates.push((file.path.clone(), file.mtime)),
            }
        }

        row_store.upsert_files(&upserts)?;
        row_store.update_mtimes(&mtime_updates)?;
        row_store.delete_files(&deleted)?;

        if stats.added > 0 || stats.deleted > 0 {
            self.invalidate_expander(&project_id);
        }

        // Vector indexing phase.
        let vector = match chunk_store {
            Some(store) => {
                let embedder = self.require_embedder("scan")?;
                let indexer = Indexer::new(embedder, &store);

                let mut tasks: Vec<IndexFile> = Vec::new();
                for file in &processed {
                    match file.status {
                        FileStatus::Added | FileStatus::Modified if file.content.is_some() => {
                            tasks.push(IndexFile {
                                path: file.path.clone(),
                                hash: file.hash.clone(),
                                chunks: file.chunks.clone(),
                            });
                        }
                        // Self-healing: vectors were never durably recorded
                        // for the current hash; re-chunk from stored content.
                        FileStatus::Unchanged => {
                            let stale = known
                                .get(&file.path)
                                .map(|meta| meta.vector_index_hash.as_deref() != Some(&file.hash))
                                .unwrap_or(false);
                            if !stale {
                                continue;
                            }
                            let Some(content) = row_store.get_content(&file.path)? else {
                                continue;
                            };
                            let Some(language) = Language::from_path(&file.path) else {
                                continue;
                            };
                            debug!("Self-healing vectors for {}", file.path);
                            let chunks =
                                chunk_source(&self.splitter, &content, &file.path, language);
                            tasks.push(IndexFile {
                                path: file.path.clone(),
                                hash: file.hash.clone(),
                                chunks,
                            });
                        }
                        _ => {}
                    }
                }

                // Deleted files plus files that fell out of indexing (grew
                // past the size cap, turned binary) leave no stale vectors.
                let mut purge = deleted.clone();
                for file in &processed {
                    if file.status == FileStatus::Skipped
                        && known
                            .get(&file.path)
                            .map(|meta| meta.vector_index_hash.is_some())
                            .unwrap_or(false)
                    {
                        purge.push(file.path.clone());
                    }
                }

                let mut vector_stats = indexer.index_files(&mut row_store, tasks)?;
                vector_stats.removed = indexer.remove_files(&mut row_store, &purge)?;
                Some(vector_stats)
            }
            None => None,
        };

        Ok(ScanReport {
            project_id: project_id.to_string(),
            stats,
            vector,
            errors,
        })
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Build a context pack for a query against an indexed project.
    pub fn build_context_pack(&self, root: &Path, query: &str) -> CwResult<ContextPack> {
        let project_id = ProjectId::derive(root)?;
        let embedder = self.require_embedder("search")?;
        let reranker: &dyn RerankerModel = self
            .reranker
            .as_deref()
            .ok_or_else(|| CwError::ServiceNotConfigured {
                operation: "search".to_string(),
                service: "rerank".to_string(),
            })?;

        let row_store = RowStore::open(&project_id.index_db_path(&self.home))?;
        let chunk_store = self.chunk_store(&project_id, embedder.dimension())?;
        let expander = self.expander(&project_id);

        let service = SearchService {
            row_store: &row_store,
            chunk_store: chunk_store.as_ref(),
            embedder,
            reranker,
            expander: expander.as_ref(),
            config: &self.config.search,
            pack_config: &self.config.pack,
        };
        service.build_context_pack(query)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Report index health for a project.
    pub fn status(&self, root: &Path) -> CwResult<StatusReport> {
        let project_id = ProjectId::derive(root)?;
        let row_store = RowStore::open(&project_id.index_db_path(&self.home))?;

        let dimensions = row_store
            .get_metadata(META_EMBEDDING_DIMENSIONS)?
            .and_then(|v| v.parse::<usize>().ok());
        let vectors = match dimensions {
            Some(dims) => Some(self.chunk_store(&project_id, dims)?.count()?),
            None => None,
        };

        Ok(StatusReport {
            project_id: project_id.to_string(),
            files: row_store.file_count()?,
            chunk_fts_rows: row_store.chunk_fts_count()?,
            vectors,
            pending_vector_rows: row_store.pending_vector_count()?,
            embedding_dimensions: dimensions,
            trigram_fts: row_store.trigram_enabled(),
        })
    }

    /// Delete the project's data directory (row store, vectors, lock).
    pub fn clear(&self, root: &Path) -> CwResult<()> {
        let project_id = ProjectId::derive(root)?;
        self.close_project(&project_id);

        let data_dir = project_id.data_dir(&self.home);
        if data_dir.exists() {
            info!("Removing {:?}", data_dir);
            std::fs::remove_dir_all(&data_dir)?;
        }
        Ok(())
    }

    /// Drop every cached per-project handle.
    pub fn close_all(&self) {
        self.chunk_stores.lock().unwrap().clear();
        self.expanders.lock().unwrap().clear();
    }

    // ========================================================================
    // Registries
    // ========================================================================

    fn chunk_store(&self, project_id: &ProjectId, dimensions: usize) -> CwResult<Arc<ChunkStore>> {
        let mut stores = self.chunk_stores.lock().unwrap();
        if let Some(store) = stores.get(project_id.as_str()) {
            if store.dimension() == dimensions {
                return Ok(Arc::clone(store));
            }
        }
        let store = Arc::new(ChunkStore::open(
            &project_id.vectors_path(&self.home),
            dimensions,
        )?);
        stores.insert(project_id.as_str().to_string(), Arc::clone(&store));
        Ok(store)
    }

    fn expander(&self, project_id: &ProjectId) -> Arc<GraphExpander> {
        let mut expanders = self.expanders.lock().unwrap();
        Arc::clone(
            expanders
                .entry(project_id.as_str().to_string())
                .or_insert_with(|| Arc::new(GraphExpander::new(self.config.expand.clone()))),
        )
    }

    fn invalidate_expander(&self, project_id: &ProjectId) {
        self.expanders.lock().unwrap().remove(project_id.as_str());
    }

    fn close_project(&self, project_id: &ProjectId) {
        self.chunk_stores.lock().unwrap().remove(project_id.as_str());
        self.expanders.lock().unwrap().remove(project_id.as_str());
    }

    fn require_embedder(&self, operation: &str) -> CwResult<&dyn EmbeddingModel> {
        self.embedder
            .as_deref()
            .ok_or_else(|| CwError::ServiceNotConfigured {
                operation: operation.to_string(),
                service: "embedding".to_string(),
            })
    }
}
