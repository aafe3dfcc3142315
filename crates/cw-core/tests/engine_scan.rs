//! Engine-level scan behavior: incremental change detection, reconcile,
//! and the self-healing vector phase.

mod common;

use std::sync::atomic::Ordering;

use common::{test_env, write, DIMS};
use cw_core::{ProjectId, ScanOptions};
use cw_db::{ChunkStore, RowStore};

fn rust_file(name: &str) -> String {
    format!(
        "/// Entry point for {name}.\npub fn {name}(input: &str) -> String {{\n    let trimmed = input.trim();\n    format!(\"{name}: {{trimmed}}\")\n}}\n"
    )
}

#[test]
fn first_scan_indexes_everything() {
    let env = test_env();
    let root = env.project.path();
    write(root, "src/alpha.rs", &rust_file("alpha"));
    write(root, "src/beta.rs", &rust_file("beta"));
    write(root, "README.md", "# Test project\n\nProse body.\n");

    let report = env.engine.scan(root, &ScanOptions::default()).unwrap();

    assert_eq!(report.stats.added, 3);
    assert_eq!(report.stats.modified, 0);
    assert_eq!(report.stats.deleted, 0);
    assert_eq!(report.stats.errors, 0);

    let vector = report.vector.expect("vector phase ran");
    assert_eq!(vector.indexed, 3);
    assert!(vector.chunks >= 3);
}

#[test]
fn second_scan_is_incremental_with_zero_embedding_calls() {
    let env = test_env();
    let root = env.project.path();
    write(root, "src/alpha.rs", &rust_file("alpha"));
    write(root, "src/beta.rs", &rust_file("beta"));

    env.engine.scan(root, &ScanOptions::default()).unwrap();
    let calls_after_first = env.embed_calls.load(Ordering::SeqCst);
    assert!(calls_after_first > 0);

    let report = env.engine.scan(root, &ScanOptions::default()).unwrap();

    assert_eq!(report.stats.added, 0);
    assert_eq!(report.stats.modified, 0);
    assert_eq!(report.stats.unchanged, 2);
    assert_eq!(report.stats.deleted, 0);
    assert_eq!(report.stats.errors, 0);
    assert_eq!(report.vector.unwrap().indexed, 0);
    assert_eq!(
        env.embed_calls.load(Ordering::SeqCst),
        calls_after_first,
        "an unchanged rescan must not touch the embedding service"
    );
}

#[test]
fn modified_and_deleted_files_reconcile() {
    let env = test_env();
    let root = env.project.path();
    write(root, "src/alpha.rs", &rust_file("alpha"));
    write(root, "src/beta.rs", &rust_file("beta"));
    env.engine.scan(root, &ScanOptions::default()).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(20));
    write(root, "src/alpha.rs", &rust_file("alpha_changed"));
    std::fs::remove_file(root.join("src/beta.rs")).unwrap();

    let report = env.engine.scan(root, &ScanOptions::default()).unwrap();
    assert_eq!(report.stats.modified, 1);
    assert_eq!(report.stats.deleted, 1);

    let vector = report.vector.unwrap();
    assert_eq!(vector.indexed, 1);
    assert_eq!(vector.removed, 1);

    // The vector store no longer knows beta.rs.
    let project_id = ProjectId::derive(root).unwrap();
    let store = ChunkStore::open(&project_id.vectors_path(env.home.path()), DIMS).unwrap();
    assert!(store.get_file_chunks("src/beta.rs").unwrap().is_empty());
    assert!(!store.get_file_chunks("src/alpha.rs").unwrap().is_empty());
}

#[test]
fn self_heal_reembeds_stale_rows() {
    let env = test_env();
    let root = env.project.path();
    write(root, "src/alpha.rs", &rust_file("alpha"));
    write(root, "src/beta.rs", &rust_file("beta"));
    env.engine.scan(root, &ScanOptions::default()).unwrap();

    let project_id = ProjectId::derive(root).unwrap();
    let db_path = project_id.index_db_path(env.home.path());

    // Simulate a crash between vector upsert and row-store commit: the
    // durable marker no longer matches the content hash, and the vectors
    // are gone.
    {
        let row_store = RowStore::open(&db_path).unwrap();
        row_store
            .set_vector_index_hash("src/alpha.rs", "stale")
            .unwrap();
        let chunk_store =
            ChunkStore::open(&project_id.vectors_path(env.home.path()), DIMS).unwrap();
        chunk_store
            .delete_files(&["src/alpha.rs".to_string()])
            .unwrap();
    }

    let report = env.engine.scan(root, &ScanOptions::default()).unwrap();

    // Metadata-wise the file is unchanged, but the vector phase heals it.
    assert_eq!(report.stats.unchanged, 2);
    assert_eq!(report.stats.modified, 0);
    assert_eq!(report.vector.unwrap().indexed, 1);

    let row_store = RowStore::open(&db_path).unwrap();
    let metas = row_store.load_all_files().unwrap();
    let alpha = metas.iter().find(|m| m.path == "src/alpha.rs").unwrap();
    assert_eq!(alpha.vector_index_hash.as_deref(), Some(alpha.hash.as_str()));

    // And the chunks are back, exactly once each.
    let chunk_store =
        ChunkStore::open(&project_id.vectors_path(env.home.path()), DIMS).unwrap();
    let chunks = chunk_store.get_file_chunks("src/alpha.rs").unwrap();
    assert!(!chunks.is_empty());
    let mut indexes: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
    indexes.dedup();
    assert_eq!(indexes.len(), chunks.len(), "no duplicate chunk indexes");
}

#[test]
fn force_reindex_rebuilds_from_scratch() {
    let env = test_env();
    let root = env.project.path();
    write(root, "src/alpha.rs", &rust_file("alpha"));
    env.engine.scan(root, &ScanOptions::default()).unwrap();

    let report = env
        .engine
        .scan(
            root,
            &ScanOptions {
                force_reindex: true,
                ..Default::default()
            },
        )
        .unwrap();

    // Truncation makes every file new again.
    assert_eq!(report.stats.added, 1);
    assert_eq!(report.vector.unwrap().indexed, 1);
}

#[test]
fn scan_without_vector_phase_skips_embedding() {
    let env = test_env();
    let root = env.project.path();
    write(root, "src/alpha.rs", &rust_file("alpha"));

    let report = env
        .engine
        .scan(
            root,
            &ScanOptions {
                vector_index: false,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(report.stats.added, 1);
    assert!(report.vector.is_none());
    assert_eq!(env.embed_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn status_reports_counts() {
    let env = test_env();
    let root = env.project.path();
    write(root, "src/alpha.rs", &rust_file("alpha"));
    env.engine.scan(root, &ScanOptions::default()).unwrap();

    let status = env.engine.status(root).unwrap();
    assert_eq!(status.files, 1);
    assert_eq!(status.pending_vector_rows, 0);
    assert_eq!(status.embedding_dimensions, Some(DIMS));
    assert!(status.vectors.unwrap() > 0);
    assert!(status.chunk_fts_rows > 0);
}

#[test]
fn clear_removes_project_data() {
    let env = test_env();
    let root = env.project.path();
    write(root, "src/alpha.rs", &rust_file("alpha"));
    env.engine.scan(root, &ScanOptions::default()).unwrap();

    let project_id = ProjectId::derive(root).unwrap();
    assert!(project_id.data_dir(env.home.path()).exists());

    env.engine.clear(root).unwrap();
    assert!(!project_id.data_dir(env.home.path()).exists());
}
