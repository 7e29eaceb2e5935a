//! Integration tests for the batch pipeline.
//!
//! Every test runs offline: the classifier and the transcription engines are
//! in-test doubles, images are tiny JPEGs generated with the `image` crate,
//! and all files live in `tempfile` directories.

use async_trait::async_trait;
use edgequake_scan2txt::pipeline::llm::normalise_transcript;
use edgequake_scan2txt::{
    batch, BatchInput, BatchProgressCallback, ClassificationResult, CoarseLabel,
    DocumentClassifier, EngineKind, EngineSet, ImageRef, ItemError, ItemPipeline, ScanError,
    TranscriptionConfig, TranscriptionEngine, TranscriptionPrompt, TranscriptionRequest,
    TranscriptionResult, DEFAULT_NO_TEXT_SENTINEL,
};
use edgequake_scan2txt::{LocalOcrEngine, OcrModel};
use image::{DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Classifies by file-name prefix: `hw_` handwritten, `form_` other document
/// type, anything else typewritten.
struct ByName;

impl DocumentClassifier for ByName {
    fn name(&self) -> &str {
        "by-name"
    }

    fn classify(&self, image: &ImageRef) -> Result<ClassificationResult, ItemError> {
        let name = image.display_name();
        let label = if name.starts_with("hw_") {
            CoarseLabel::Handwritten
        } else if name.starts_with("form_") {
            CoarseLabel::OtherDocumentType
        } else {
            CoarseLabel::Typewritten
        };
        Ok(ClassificationResult {
            label,
            confidence: 0.9,
            top_label: Some(label.to_string()),
            raw_scores: Vec::new(),
        })
    }
}

/// Behaves like a VLM scripted by file stem:
/// `blank*` answers with whitespace, `denied*` fails authentication,
/// everything else gets `"<stem> run <n>"`.
#[derive(Default)]
struct ScriptedEngine {
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, CoarseLabel)>>,
}

#[async_trait]
impl TranscriptionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn transcribe(&self, request: &TranscriptionRequest) -> TranscriptionResult {
        let run = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let name = request.image.display_name();
        self.seen
            .lock()
            .unwrap()
            .push((name.clone(), request.engine_hint));

        let stem = name.split('.').next().unwrap_or_default().to_string();
        if stem.starts_with("denied") {
            return TranscriptionResult::failed(ItemError::Authentication {
                detail: "HTTP 401: invalid api key".into(),
            });
        }
        let raw = if stem.starts_with("blank") {
            "  \n ".to_string()
        } else {
            format!("{stem} run {run}")
        };
        TranscriptionResult::ok(normalise_transcript(&raw, DEFAULT_NO_TEXT_SENTINEL))
    }
}

#[derive(Default)]
struct Events {
    started: AtomicUsize,
    completed: AtomicUsize,
    errored: Mutex<Vec<String>>,
    finished: Mutex<Option<(usize, usize)>>,
}

impl BatchProgressCallback for Events {
    fn on_item_start(&self, _index: usize, _total: usize, _name: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_item_complete(&self, _index: usize, _total: usize, _name: &str, _chars: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_item_error(&self, _index: usize, _total: usize, name: &str, _error: &str) {
        self.errored.lock().unwrap().push(name.to_string());
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        *self.finished.lock().unwrap() = Some((total, succeeded));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` shows raw scores
/// and failure context.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn jpeg_bytes() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([250, 250, 245])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .expect("encode jpeg");
    buf
}

fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, jpeg_bytes()).expect("write jpeg");
    path
}

fn pipeline_with(config: TranscriptionConfig, engines: EngineSet) -> ItemPipeline {
    ItemPipeline::new(config, Arc::new(ByName), engines)
}

fn remote_only(engine: Arc<ScriptedEngine>) -> ItemPipeline {
    pipeline_with(
        TranscriptionConfig::default(),
        EngineSet::new().with(EngineKind::RemoteVision, engine),
    )
}

fn prompt() -> TranscriptionPrompt {
    TranscriptionPrompt::builtin(DEFAULT_NO_TEXT_SENTINEL)
}

fn file_names(dir: &Path, ext: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("ls")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(ext))
        .collect();
    names.sort();
    names
}

// ── Per-item isolation ───────────────────────────────────────────────────────

#[tokio::test]
async fn corrupt_item_does_not_affect_siblings() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    for name in ["a.jpg", "b.jpg", "d.jpg", "e.jpg"] {
        write_jpeg(dir.path(), name);
    }
    std::fs::write(dir.path().join("c.jpg"), b"\xff\xd8\xff\xe0 not really a jpeg").expect("write");

    let engine = Arc::new(ScriptedEngine::default());
    let report = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &remote_only(Arc::clone(&engine)),
    )
    .await
    .expect("run");

    assert_eq!((report.total, report.succeeded, report.failed), (5, 4, 1));
    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].image.file_name().unwrap(), "c.jpg");
    assert_eq!(failed[0].error.as_ref().map(|e| e.kind()), Some("invalid_image"));

    // Items after the corrupt one were processed normally, in order.
    let seen: Vec<String> = engine.seen.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(seen, vec!["a.jpg", "b.jpg", "d.jpg", "e.jpg"]);
    assert_eq!(
        file_names(dir.path(), ".txt"),
        vec!["a.txt", "b.txt", "d.txt", "e.txt"]
    );
}

#[tokio::test]
async fn remote_failure_is_recorded_and_batch_continues() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "a.jpg");
    write_jpeg(dir.path(), "denied.jpg");
    write_jpeg(dir.path(), "z.jpg");

    let report = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &remote_only(Arc::new(ScriptedEngine::default())),
    )
    .await
    .expect("run");

    assert_eq!((report.succeeded, report.failed), (2, 1));
    let denied = &report.items[1];
    assert_eq!(denied.error.as_ref().map(|e| e.kind()), Some("authentication"));
    assert_eq!(denied.classification.as_ref().map(|c| c.label), Some(CoarseLabel::Typewritten));
    assert!(denied.output.is_none());
    assert!(!dir.path().join("denied.txt").exists());

    match report.into_result() {
        Err(ScanError::PartialFailure { failed, total, .. }) => assert_eq!((failed, total), (1, 3)),
        other => panic!("expected PartialFailure, got {other:?}"),
    }
}

// ── Naming and overwrite ─────────────────────────────────────────────────────

#[tokio::test]
async fn second_run_overwrites_previous_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("out");
    let image = write_jpeg(dir.path(), "report.jpg");

    let engine = Arc::new(ScriptedEngine::default());
    let pipeline = remote_only(Arc::clone(&engine));
    for _ in 0..2 {
        let report = batch::run(
            &BatchInput::File(image.clone()),
            &prompt(),
            Some(out.path()),
            &pipeline,
        )
        .await
        .expect("run");
        assert!(report.is_success());
    }

    let text = std::fs::read_to_string(out.path().join("report.txt")).expect("read");
    assert_eq!(text, "report run 2");
    assert_eq!(file_names(out.path(), ""), vec!["report.txt"]);
}

// ── Sentinel ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn blank_page_is_a_success_with_sentinel() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = write_jpeg(dir.path(), "blank_page.jpg");

    let report = batch::run(
        &BatchInput::File(image),
        &prompt(),
        None,
        &remote_only(Arc::new(ScriptedEngine::default())),
    )
    .await
    .expect("run");

    assert!(report.is_success());
    let text = std::fs::read_to_string(dir.path().join("blank_page.txt")).expect("read");
    assert_eq!(text, DEFAULT_NO_TEXT_SENTINEL);
    assert_eq!(report.items[0].chars, DEFAULT_NO_TEXT_SENTINEL.chars().count());
}

// ── End-to-end scenarios ─────────────────────────────────────────────────────

#[tokio::test]
async fn single_file_output_lands_beside_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = write_jpeg(dir.path(), "doc.jpg");

    let report = batch::run(
        &BatchInput::File(image),
        &prompt(),
        None,
        &remote_only(Arc::new(ScriptedEngine::default())),
    )
    .await
    .expect("run");

    let expected = dir.path().join("doc.txt");
    assert_eq!(report.items[0].output.as_deref(), Some(expected.as_path()));
    assert_eq!(std::fs::read_to_string(expected).expect("read"), "doc run 1");
}

#[tokio::test]
async fn directory_only_transcribes_jpegs() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "a.jpg");
    write_jpeg(dir.path(), "b.jpeg");
    std::fs::write(dir.path().join("c.png"), b"png bytes").expect("write");

    let report = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &remote_only(Arc::new(ScriptedEngine::default())),
    )
    .await
    .expect("run");

    assert_eq!((report.total, report.succeeded), (2, 2));
    assert_eq!(file_names(dir.path(), ".txt"), vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn explicit_output_dir_is_created() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "a.jpg");
    let out = dir.path().join("nested").join("out");

    let report = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        Some(&out),
        &remote_only(Arc::new(ScriptedEngine::default())),
    )
    .await
    .expect("run");

    assert!(report.is_success());
    assert!(out.join("a.txt").is_file());
    assert!(!dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn empty_directory_is_an_empty_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let report = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &remote_only(Arc::new(ScriptedEngine::default())),
    )
    .await
    .expect("run");

    assert_eq!(report.total, 0);
    assert!(report.is_success());
}

#[tokio::test]
async fn unsupported_single_file_is_an_item_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let png = dir.path().join("scan.png");
    std::fs::write(&png, b"png bytes").expect("write");

    let report = batch::run(
        &BatchInput::File(png),
        &prompt(),
        None,
        &remote_only(Arc::new(ScriptedEngine::default())),
    )
    .await
    .expect("not fatal");

    assert_eq!((report.total, report.failed), (1, 1));
    assert_eq!(report.items[0].error.as_ref().map(|e| e.kind()), Some("invalid_image"));
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_input_is_fatal() {
    let err = batch::run(
        &BatchInput::Directory("/definitely/not/a/dir".into()),
        &prompt(),
        None,
        &remote_only(Arc::new(ScriptedEngine::default())),
    )
    .await
    .expect_err("fatal");
    assert!(matches!(err, ScanError::InputNotFound { .. }));
}

#[tokio::test]
async fn unwritable_output_dir_is_fatal_before_any_item() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "a.jpg");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"a file, not a dir").expect("write");

    let engine = Arc::new(ScriptedEngine::default());
    let err = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        Some(&blocker.join("out")),
        &remote_only(Arc::clone(&engine)),
    )
    .await
    .expect_err("fatal");

    assert!(matches!(err, ScanError::OutputDirUnwritable { .. }));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

/// Make `dir` read-only; `false` when the process can write regardless
/// (running as root), in which case the caller skips.
#[cfg(unix)]
fn make_read_only(dir: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o555)).expect("chmod");
    let canary = dir.join(".canary");
    if std::fs::write(&canary, b"x").is_ok() {
        let _ = std::fs::remove_file(canary);
        println!("SKIP — permissions are not enforced for this user");
        return false;
    }
    true
}

#[cfg(unix)]
fn make_writable(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755)).expect("chmod");
}

#[cfg(unix)]
#[tokio::test]
async fn existing_read_only_output_dir_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "a.jpg");
    let out = dir.path().join("out");
    std::fs::create_dir(&out).expect("mkdir");
    if !make_read_only(&out) {
        make_writable(&out);
        return;
    }

    let engine = Arc::new(ScriptedEngine::default());
    let result = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        Some(&out),
        &remote_only(Arc::clone(&engine)),
    )
    .await;
    make_writable(&out);

    let err = result.expect_err("fatal");
    assert!(matches!(err, ScanError::OutputDirUnwritable { .. }));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn read_only_input_dir_is_fatal_without_explicit_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scans = dir.path().join("scans");
    std::fs::create_dir(&scans).expect("mkdir");
    write_jpeg(&scans, "a.jpg");
    write_jpeg(&scans, "b.jpg");
    if !make_read_only(&scans) {
        make_writable(&scans);
        return;
    }

    let engine = Arc::new(ScriptedEngine::default());
    let result = batch::run(
        &BatchInput::Directory(scans.clone()),
        &prompt(),
        None,
        &remote_only(Arc::clone(&engine)),
    )
    .await;
    make_writable(&scans);

    match result {
        Err(ScanError::OutputDirUnwritable { path, .. }) => assert_eq!(path, scans),
        other => panic!("expected OutputDirUnwritable, got {other:?}"),
    }
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

// ── Output collisions ────────────────────────────────────────────────────────

#[tokio::test]
async fn images_sharing_a_stem_do_not_overwrite_each_other() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "a.jpeg");
    write_jpeg(dir.path(), "a.jpg");
    write_jpeg(dir.path(), "b.jpg");

    let engine = Arc::new(ScriptedEngine::default());
    let report = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &remote_only(Arc::clone(&engine)),
    )
    .await
    .expect("run");

    assert_eq!((report.total, report.succeeded, report.failed), (3, 2, 1));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 2);

    let clash = &report.items[1];
    assert_eq!(clash.image, dir.path().join("a.jpg"));
    match &clash.error {
        Some(ItemError::Persist { path, detail }) => {
            assert_eq!(path, &dir.path().join("a.txt"));
            assert!(detail.contains("a.jpeg"), "{detail}");
        }
        other => panic!("expected persist error, got {other:?}"),
    }

    let kept = std::fs::read_to_string(dir.path().join("a.txt")).expect("read");
    assert_eq!(kept, "a run 1");
    assert_eq!(file_names(dir.path(), ".txt"), vec!["a.txt", "b.txt"]);
}

// ── Routing ──────────────────────────────────────────────────────────────────

/// Stands in for an on-device handwriting model.
struct FixedReader;

impl OcrModel for FixedReader {
    fn name(&self) -> &str {
        "fixed"
    }

    fn recognise(&self, _image: &image::DynamicImage) -> Result<String, String> {
        Ok("  dear diary,\n".to_string())
    }
}

#[tokio::test]
async fn handwritten_scans_are_read_by_local_ocr_engine() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "hw_diary.jpg");
    write_jpeg(dir.path(), "letter.jpg");

    let config = TranscriptionConfig::builder()
        .route(CoarseLabel::Handwritten, EngineKind::LocalOcr)
        .build()
        .expect("config");
    let remote = Arc::new(ScriptedEngine::default());
    let local = Arc::new(LocalOcrEngine::new(Arc::new(FixedReader), &config));
    let engines = EngineSet::new()
        .with(EngineKind::RemoteVision, Arc::clone(&remote) as _)
        .with(EngineKind::LocalOcr, local);

    let report = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &pipeline_with(config, engines),
    )
    .await
    .expect("run");

    assert!(report.is_success());
    let diary = std::fs::read_to_string(dir.path().join("hw_diary.txt")).expect("read");
    assert_eq!(diary, "dear diary,");
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handwritten_to_missing_local_engine_fails_explicitly() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "hw_diary.jpg");
    write_jpeg(dir.path(), "typed.jpg");

    let config = TranscriptionConfig::builder()
        .route(CoarseLabel::Handwritten, EngineKind::LocalOcr)
        .build()
        .expect("config");
    let remote = Arc::new(ScriptedEngine::default());
    let pipeline = pipeline_with(
        config,
        EngineSet::new().with(EngineKind::RemoteVision, Arc::clone(&remote) as _),
    );

    let report = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &pipeline,
    )
    .await
    .expect("run");

    let hw = &report.items[0];
    assert_eq!(hw.engine, Some(EngineKind::LocalOcr));
    assert_eq!(hw.error.as_ref().map(|e| e.kind()), Some("engine_unavailable"));
    assert!(report.items[1].succeeded());
    // The handwritten item never silently fell back to the remote engine.
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handwritten_routes_to_registered_local_engine() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "form_tax.jpg");
    write_jpeg(dir.path(), "hw_diary.jpg");

    let config = TranscriptionConfig::builder()
        .route(CoarseLabel::Handwritten, EngineKind::LocalOcr)
        .build()
        .expect("config");
    let remote = Arc::new(ScriptedEngine::default());
    let local = Arc::new(ScriptedEngine::default());
    let engines = EngineSet::new()
        .with(EngineKind::RemoteVision, Arc::clone(&remote) as _)
        .with(EngineKind::LocalOcr, Arc::clone(&local) as _);

    let report = batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &pipeline_with(config, engines),
    )
    .await
    .expect("run");

    assert!(report.is_success());
    assert_eq!(
        *local.seen.lock().unwrap(),
        vec![("hw_diary.jpg".to_string(), CoarseLabel::Handwritten)]
    );
    assert_eq!(
        *remote.seen.lock().unwrap(),
        vec![("form_tax.jpg".to_string(), CoarseLabel::OtherDocumentType)]
    );
}

// ── Progress events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_callback_sees_every_item() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "a.jpg");
    std::fs::write(dir.path().join("b.jpg"), b"garbage").expect("write");
    write_jpeg(dir.path(), "c.jpg");

    let events = Arc::new(Events::default());
    let config = TranscriptionConfig::builder()
        .progress_callback(Arc::clone(&events) as _)
        .build()
        .expect("config");
    let pipeline = pipeline_with(
        config,
        EngineSet::new().with(EngineKind::RemoteVision, Arc::new(ScriptedEngine::default())),
    );

    batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &pipeline,
    )
    .await
    .expect("run");

    assert_eq!(events.started.load(Ordering::SeqCst), 3);
    assert_eq!(events.completed.load(Ordering::SeqCst), 2);
    assert_eq!(*events.errored.lock().unwrap(), vec!["b.jpg".to_string()]);
    assert_eq!(*events.finished.lock().unwrap(), Some((3, 2)));
}

// ── Runtime entry points ─────────────────────────────────────────────────────

#[test]
fn run_on_a_test_runtime() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_jpeg(dir.path(), "a.jpg");
    let pipeline = remote_only(Arc::new(ScriptedEngine::default()));

    let report = tokio_test::block_on(batch::run(
        &BatchInput::Directory(dir.path().to_path_buf()),
        &prompt(),
        None,
        &pipeline,
    ))
    .expect("run");
    assert_eq!(report.succeeded, 1);
}

#[test]
fn run_sync_without_a_runtime() {
    let dir = tempfile::tempdir().expect("tempdir");
    let image = write_jpeg(dir.path(), "letter.JPG");
    let pipeline = remote_only(Arc::new(ScriptedEngine::default()));

    let report = batch::run_sync(&BatchInput::File(image), &prompt(), None, &pipeline)
        .expect("run");
    assert!(report.is_success());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("letter.txt")).expect("read"),
        "letter run 1"
    );
}
