use std::sync::Arc;

use import_service::dedupe::{file_hash, DuplicateGuard};
use import_service::files::{FileStore, MemoryFileStore};
use import_service::import::{ImportEngine, ImportSettings};
use import_service::models::{ImportError, ImportFormat, ImportJob, ImportStatus};
use import_service::storage::{ImportStore, MemoryImportStore};

fn small_settings(chunk_size: usize) -> ImportSettings {
    ImportSettings {
        chunk_size,
        batch_size: 50,
        progress_interval: 100,
        error_log_cap: 100,
    }
}

struct Harness {
    store: Arc<MemoryImportStore>,
    files: Arc<MemoryFileStore>,
    engine: ImportEngine,
}

fn harness(chunk_size: usize) -> Harness {
    harness_with(small_settings(chunk_size))
}

fn harness_with(settings: ImportSettings) -> Harness {
    let store = Arc::new(MemoryImportStore::new());
    let files = Arc::new(MemoryFileStore::new());
    let engine = ImportEngine::new(
        store.clone() as Arc<dyn ImportStore>,
        files.clone() as Arc<dyn FileStore>,
        settings,
    );
    Harness {
        store,
        files,
        engine,
    }
}

async fn seed_job(h: &Harness, path: &str, bytes: Vec<u8>) -> mongodb::bson::oid::ObjectId {
    h.files.insert(path, bytes);
    let job = ImportJob::new("planilha.csv".into(), path.into(), 0.5, ImportFormat::Csv);
    h.store.insert_job(&job).await.unwrap()
}

fn csv_with_rows(n: usize) -> Vec<u8> {
    let mut out = String::from("CPF,NOME,MARGEM\n");
    for i in 0..n {
        out.push_str(&format!("{},Cliente {},100{},\n", 10_000_000_000u64 + i as u64, i, i));
    }
    out.into_bytes()
}

#[tokio::test]
async fn resumes_across_three_chunks() {
    let h = harness(1000);
    let id = seed_job(&h, "imports/large.csv", csv_with_rows(2500)).await;

    let first = h.engine.process_chunk(id, None).await.unwrap();
    assert_eq!(first.total_processed, 1000);
    assert_eq!(first.total_rows, 2500);
    assert!(!first.is_complete);
    assert_eq!(first.next_offset, Some(1000));

    let second = h.engine.process_chunk(id, first.next_offset).await.unwrap();
    assert_eq!(second.total_processed, 2000);
    assert_eq!(second.next_offset, Some(2000));

    let third = h.engine.process_chunk(id, second.next_offset).await.unwrap();
    assert_eq!(third.total_processed, 2500);
    assert!(third.is_complete);
    assert_eq!(third.next_offset, None);

    let job = h.store.load_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, ImportStatus::Completed);
    assert!(job.processing_ended_at.is_some());
    assert_eq!(h.store.client_count(), 2500);
}

#[tokio::test]
async fn stale_continuation_cannot_rewind_progress() {
    let h = harness(1000);
    let id = seed_job(&h, "imports/large.csv", csv_with_rows(2500)).await;

    h.engine.process_chunk(id, None).await.unwrap();
    // A replayed offset below the persisted floor is clamped up, not honored.
    let summary = h.engine.process_chunk(id, Some(0)).await.unwrap();
    assert_eq!(summary.total_processed, 2000);
    assert_eq!(summary.next_offset, Some(2000));
}

#[tokio::test]
async fn row_errors_are_isolated_and_do_not_fail_the_job() {
    let h = harness(1000);
    // Row 3 of 5 carries a CPF with too many digits.
    let csv = b"CPF,NOME\n\
        11111111111,Ana\n\
        22222222222,Bia\n\
        123456789012345,Carla\n\
        44444444444,Dora\n\
        55555555555,Eva\n"
        .to_vec();
    let id = seed_job(&h, "imports/errors.csv", csv).await;

    let summary = h.engine.process_chunk(id, None).await.unwrap();
    assert!(summary.is_complete);
    assert_eq!(summary.errors_count, 1);
    assert_eq!(h.store.client_count(), 4);

    let job = h.store.load_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, ImportStatus::Completed);
    assert_eq!(job.error_log.len(), 1);
    // Header is line 1, so the third data row is line 4.
    assert_eq!(job.error_log[0].line, 4);
}

#[tokio::test]
async fn rows_without_cpf_are_dropped_silently() {
    let h = harness(1000);
    let csv = b"CPF,NOME\n11111111111,Ana\n,Sem CPF\n22222222222,Bia\n".to_vec();
    let id = seed_job(&h, "imports/drops.csv", csv).await;

    let summary = h.engine.process_chunk(id, None).await.unwrap();
    assert!(summary.is_complete);
    assert_eq!(summary.errors_count, 0);
    assert_eq!(h.store.client_count(), 2);
    assert!(h.store.client("11111111111").is_some());
}

#[tokio::test]
async fn reprocessing_a_chunk_is_idempotent() {
    let h = harness(1000);
    let csv = b"CPF,NOME,NUMERO_CONTRATO,VALOR_PARCELA\n\
        11111111111,Ana,CT-1,\"1.234,56\"\n\
        11111111111,Ana,CT-2,\"987,10\"\n"
        .to_vec();
    let id = seed_job(&h, "imports/contracts.csv", csv).await;
    h.engine.process_chunk(id, None).await.unwrap();

    // Same natural keys written again leave the tables unchanged.
    let job = ImportJob::new("planilha.csv".into(), "imports/contracts.csv".into(), 0.5, ImportFormat::Csv);
    let second_id = h.store.insert_job(&job).await.unwrap();
    h.engine.process_chunk(second_id, None).await.unwrap();

    assert_eq!(h.store.client_count(), 1);
    assert_eq!(h.store.contract_count(), 2);
    let contract = h.store.contract("11111111111", "CT-1").unwrap();
    assert_eq!(contract.valor_parcela, Some(1234.56));
}

#[tokio::test]
async fn client_write_failure_does_not_block_contract_writes() {
    let h = harness(1000);
    let csv = b"CPF,NOME,NUMERO_CONTRATO\n11111111111,Ana,CT-1\n".to_vec();
    let id = seed_job(&h, "imports/iso.csv", csv).await;

    h.store.fail_client_writes(true);
    let summary = h.engine.process_chunk(id, None).await.unwrap();
    assert!(summary.is_complete);
    assert_eq!(h.store.client_count(), 0);
    assert_eq!(h.store.contract_count(), 1);
}

#[tokio::test]
async fn zero_progress_interval_does_not_panic_the_chunk() {
    let h = harness_with(ImportSettings {
        chunk_size: 1000,
        batch_size: 50,
        progress_interval: 0,
        error_log_cap: 100,
    });
    let id = seed_job(&h, "imports/zero-interval.csv", csv_with_rows(250)).await;

    let summary = h.engine.process_chunk(id, None).await.unwrap();
    assert!(summary.is_complete);
    assert_eq!(summary.total_processed, 250);
    assert_eq!(h.store.client_count(), 250);
}

#[tokio::test]
async fn zero_chunk_size_still_advances_the_offset() {
    let h = harness_with(ImportSettings {
        chunk_size: 0,
        batch_size: 50,
        progress_interval: 100,
        error_log_cap: 100,
    });
    let id = seed_job(&h, "imports/zero-chunk.csv", csv_with_rows(3)).await;

    // Each invocation must make progress so the poller can never spin on
    // an unchanged offset.
    let first = h.engine.process_chunk(id, None).await.unwrap();
    assert_eq!(first.total_processed, 1);
    assert_eq!(first.next_offset, Some(1));

    let second = h.engine.process_chunk(id, first.next_offset).await.unwrap();
    assert_eq!(second.total_processed, 2);
    assert_eq!(second.next_offset, Some(2));
}

#[tokio::test]
async fn second_invocation_for_an_in_flight_job_is_rejected() {
    use tokio::sync::Semaphore;

    struct GatedFileStore {
        bytes: Vec<u8>,
        entered: Semaphore,
        release: Semaphore,
    }

    #[async_trait::async_trait]
    impl FileStore for GatedFileStore {
        async fn fetch(&self, _path: &str) -> import_service::models::Result<Vec<u8>> {
            self.entered.add_permits(1);
            self.release.acquire().await.expect("gate closed").forget();
            Ok(self.bytes.clone())
        }
    }

    let store = Arc::new(MemoryImportStore::new());
    let gated = Arc::new(GatedFileStore {
        bytes: csv_with_rows(10),
        entered: Semaphore::new(0),
        release: Semaphore::new(0),
    });
    let engine = Arc::new(ImportEngine::new(
        store.clone() as Arc<dyn ImportStore>,
        gated.clone() as Arc<dyn FileStore>,
        small_settings(1000),
    ));

    let job = ImportJob::new("gated.csv".into(), "imports/gated.csv".into(), 0.1, ImportFormat::Csv);
    let id = store.insert_job(&job).await.unwrap();

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.process_chunk(id, None).await }
    });

    // Wait until the first invocation is inside the chunk, then race it.
    gated.entered.acquire().await.unwrap().forget();
    let err = engine.process_chunk(id, None).await.unwrap_err();
    assert!(matches!(err, ImportError::JobBusy(_)));

    gated.release.add_permits(1);
    let summary = first.await.unwrap().unwrap();
    assert!(summary.is_complete);
    assert_eq!(store.client_count(), 10);
}

#[tokio::test]
async fn persistence_failure_mid_chunk_marks_the_job_failed() {
    let h = harness(1000);
    let id = seed_job(&h, "imports/flaky.csv", csv_with_rows(250)).await;

    // Save 1 stamps processing; save 2 is the first progress persist.
    h.store.fail_job_save_number(2);
    let err = h.engine.process_chunk(id, None).await.unwrap_err();
    assert!(matches!(err, ImportError::Storage(_)));

    let job = h.store.load_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, ImportStatus::Failed);
    assert!(job.processing_ended_at.is_some());
    assert_eq!(job.error_log.last().unwrap().line, 0);
}

#[tokio::test]
async fn missing_file_fails_the_job_terminally() {
    let h = harness(1000);
    let job = ImportJob::new("ghost.csv".into(), "imports/ghost.csv".into(), 0.1, ImportFormat::Csv);
    let id = h.store.insert_job(&job).await.unwrap();

    let err = h.engine.process_chunk(id, None).await.unwrap_err();
    assert!(matches!(err, ImportError::Storage(_)));

    let job = h.store.load_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, ImportStatus::Failed);
    assert!(job.processing_ended_at.is_some());
    assert_eq!(job.error_log.len(), 1);
    assert_eq!(job.error_log[0].line, 0);

    // Terminal jobs are not reprocessed.
    let summary = h.engine.process_chunk(id, None).await.unwrap();
    assert_eq!(summary.processed_in_chunk, 0);
}

#[tokio::test]
async fn unknown_job_id_is_reported() {
    let h = harness(1000);
    let err = h
        .engine
        .process_chunk(mongodb::bson::oid::ObjectId::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::JobNotFound(_)));
}

#[tokio::test]
async fn poller_drives_a_chunked_job_to_completion() {
    use import_service::poller::ImportPoller;

    let store = Arc::new(MemoryImportStore::new());
    let files = Arc::new(MemoryFileStore::new());
    files.insert("imports/polled.csv", csv_with_rows(2500));
    let engine = Arc::new(ImportEngine::new(
        store.clone() as Arc<dyn ImportStore>,
        files as Arc<dyn FileStore>,
        small_settings(1000),
    ));

    let job = ImportJob::new("polled.csv".into(), "imports/polled.csv".into(), 0.5, ImportFormat::Csv);
    let id = store.insert_job(&job).await.unwrap();

    // First chunk is kicked off by the caller; the poller takes it from there.
    engine.process_chunk(id, None).await.unwrap();

    let mut cfg = import_service::config::Config::from_env();
    cfg.poll_interval_ms = 1;
    let poller = ImportPoller::from_config(engine, store.clone() as Arc<dyn ImportStore>, &cfg);
    let finished = poller.poll_until_terminal(id).await.unwrap();
    assert_eq!(finished.status, ImportStatus::Completed);
    assert_eq!(finished.processed_rows, 2500);
    assert_eq!(store.client_count(), 2500);

    let progress = poller.progress(id).await.unwrap();
    assert_eq!(progress.status, ImportStatus::Completed);
    assert_eq!(progress.fraction, 1.0);
}

#[tokio::test]
async fn duplicate_guard_round_trip() {
    let store = Arc::new(MemoryImportStore::new());
    let guard = DuplicateGuard::new(store.clone() as Arc<dyn ImportStore>);

    let bytes = b"CPF,NOME\n11111111111,Ana\n";
    let hash = file_hash(bytes);
    assert_eq!(hash, file_hash(bytes));

    let before = guard.check(&hash, Some("clientes")).await.unwrap();
    assert!(!before.is_duplicate);

    guard
        .record(hash.clone(), Some("clientes".into()), "planilha.csv".into(), 1)
        .await
        .unwrap();

    let after = guard.check(&hash, Some("clientes")).await.unwrap();
    assert!(after.is_duplicate);
    assert_eq!(after.original_file_name.as_deref(), Some("planilha.csv"));
    assert_eq!(after.records_imported, Some(1));

    // Same hash under a different module scope is not a duplicate.
    let other_scope = guard.check(&hash, Some("contratos")).await.unwrap();
    assert!(!other_scope.is_duplicate);
}
