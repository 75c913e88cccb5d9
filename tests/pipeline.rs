//! Pipeline integration tests with a stubbed model.
//!
//! No network access: every test injects a [`StubProvider`] through
//! `ReportConfig::provider`, and PDFs are read back with `lopdf`.

use async_trait::async_trait;
use qvs2pdf::{
    convert, convert_sync, convert_to_file, convert_upload, convert_with_cancel, deliver_report,
    render_explanation, CancellationToken, ErrorKind, ExplanationProvider, Generation, OutputName,
    PipelineStage, PromptPayload, Qvs2PdfError, ReportConfig, ReportProgressCallback,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replays canned replies and records every prompt it receives.
struct StubProvider {
    replies: Mutex<VecDeque<Result<Generation, Qvs2PdfError>>>,
    seen: Mutex<Vec<PromptPayload>>,
}

impl StubProvider {
    fn replying(text: &str) -> Arc<Self> {
        Self::scripted(vec![Ok(Generation {
            text: text.to_string(),
            input_tokens: 120,
            output_tokens: 40,
        })])
    }

    fn scripted(replies: Vec<Result<Generation, Qvs2PdfError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn last_prompt(&self) -> PromptPayload {
        self.seen.lock().unwrap().last().cloned().expect("no prompt seen")
    }
}

#[async_trait]
impl ExplanationProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-1"
    }

    async fn generate(&self, prompt: &PromptPayload) -> Result<Generation, Qvs2PdfError> {
        self.seen.lock().unwrap().push(prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Generation::text("# Fallback\n")))
    }
}

#[derive(Default)]
struct StageRecorder {
    events: Mutex<Vec<String>>,
}

impl ReportProgressCallback for StageRecorder {
    fn on_stage_start(&self, stage: PipelineStage) {
        self.events.lock().unwrap().push(format!("start:{stage:?}"));
    }

    fn on_stage_complete(&self, stage: PipelineStage, _elapsed: Duration) {
        self.events.lock().unwrap().push(format!("done:{stage:?}"));
    }

    fn on_failure(&self, stage: PipelineStage, _error: &str) {
        self.events.lock().unwrap().push(format!("fail:{stage:?}"));
    }
}

/// Route library logs to the test harness; `RUST_LOG=qvs2pdf=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_with(provider: Arc<StubProvider>) -> ReportConfig {
    ReportConfig::builder().provider(provider).build().unwrap()
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn pdf_text(bytes: &[u8]) -> String {
    let doc = lopdf::Document::load_mem(bytes).expect("valid PDF");
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    doc.extract_text(&pages).expect("extractable text")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sample_script_becomes_sample_pdf() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "sample.qvs", "LOAD * FROM table.qvd;");
    let stub = StubProvider::replying("# Summary\n- Loads table.qvd");

    let output = convert(script.as_path(), &config_with(stub.clone()))
        .await
        .unwrap();

    assert_eq!(output.report.filename, "sample.pdf");
    assert!(output.report.bytes.starts_with(b"%PDF"));
    let text = pdf_text(&output.report.bytes);
    assert!(text.contains("Summary"), "missing heading in {text:?}");
    assert!(text.contains("Loads table.qvd"), "missing bullet in {text:?}");

    assert_eq!(output.explanation.provider, "stub");
    assert_eq!(output.explanation.model, "stub-1");
    assert_eq!(output.stats.input_tokens, 120);
    assert_eq!(output.stats.output_tokens, 40);
    assert_eq!(output.stats.page_count, 1);
    assert_eq!(output.stats.pdf_bytes, output.report.bytes.len());
    assert!(output.html.contains("<h1>Summary</h1>"));
}

#[tokio::test]
async fn prompt_carries_instruction_and_body_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let body = "SET ThousandSep=',';\r\nFacts:\n  LOAD Id,\tAmount RESIDENT Raw;\n";
    let script = write_script(dir.path(), "facts.qvs", body);
    let stub = StubProvider::replying("# Facts\n");

    let output = convert(script.as_path(), &config_with(stub.clone()))
        .await
        .unwrap();

    assert_eq!(
        output.stats.instruction_version.as_deref(),
        Some(qvs2pdf::prompts::INSTRUCTION_TEMPLATE_VERSION)
    );
    let prompt = stub.last_prompt();
    assert_eq!(prompt.body, body);
    assert_eq!(prompt.instruction, qvs2pdf::prompts::DEFAULT_INSTRUCTION);
    let text = prompt.to_text();
    assert!(text.starts_with(qvs2pdf::prompts::DEFAULT_INSTRUCTION));
    assert!(text.ends_with(body));
}

#[tokio::test]
async fn instruction_override_is_sent() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "a.qvs", "LOAD 1 AS x AUTOGENERATE 1;");
    let stub = StubProvider::replying("# A\n");
    let config = ReportConfig::builder()
        .provider(stub.clone())
        .instruction("Explain briefly.")
        .build()
        .unwrap();

    let output = convert(script.as_path(), &config).await.unwrap();
    assert_eq!(stub.last_prompt().instruction, "Explain briefly.");
    assert_eq!(output.stats.instruction_version, None);
}

#[tokio::test]
async fn headers_bullets_and_emphasis_keep_order() {
    let markdown = "## Section Title\n\n- first bullet\n- second bullet\n\nSome *emphasised* words and **strong** ones.\n";
    let output = render_explanation(markdown, "order.qvs", &ReportConfig::default())
        .await
        .unwrap();
    let text = pdf_text(&output.report.bytes);

    let positions: Vec<usize> = [
        "Section Title",
        "first bullet",
        "second bullet",
        "Some emphasised words and strong ones.",
    ]
    .iter()
    .map(|needle| {
        text.find(needle)
            .unwrap_or_else(|| panic!("{needle:?} not in {text:?}"))
    })
    .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
}

#[tokio::test]
async fn same_markdown_renders_identical_bytes() {
    let markdown = "# Summary\n\n| Table | Source |\n|---|---|\n| Sales | sales.qvd |\n\n```\nLOAD *\n```\n";
    let config = ReportConfig::default();
    let a = render_explanation(markdown, "x.qvs", &config).await.unwrap();
    let b = render_explanation(markdown, "x.qvs", &config).await.unwrap();
    assert_eq!(a.report.bytes, b.report.bytes);
}

#[tokio::test]
async fn missing_credential_fails_before_any_io() {
    let config = ReportConfig::builder()
        .api_key_env("QVS2PDF_TEST_KEY_THAT_IS_NEVER_SET")
        .build()
        .unwrap();

    // The script does not exist: a Configuration error proves nothing was read.
    let err = convert("/definitely/not/here.qvs", &config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(err, Qvs2PdfError::MissingCredential { .. }));
}

#[tokio::test]
async fn missing_script_is_io_error() {
    let stub = StubProvider::replying("# never\n");
    let err = convert("/definitely/not/here.qvs", &config_with(stub.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn empty_script_still_produces_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "empty.qvs", "");
    let stub = StubProvider::replying("# Empty script\n\nNothing is loaded.\n");

    let output = convert(script.as_path(), &config_with(stub.clone()))
        .await
        .unwrap();
    assert_eq!(stub.last_prompt().body, "");
    assert_eq!(output.stats.script_chars, 0);
    assert!(pdf_text(&output.report.bytes).contains("Nothing is loaded."));
}

#[tokio::test]
async fn blank_reply_is_empty_response() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "s.qvs", "LOAD 1;");
    let stub = StubProvider::replying("   \n");
    let err = convert(script.as_path(), &config_with(stub))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyResponse);
}

#[tokio::test]
async fn service_error_fails_fast_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "s.qvs", "LOAD 1;");
    let stub = StubProvider::scripted(vec![
        Err(Qvs2PdfError::ServiceError {
            provider: "stub".into(),
            detail: "503".into(),
        }),
        Ok(Generation::text("# Too late\n")),
    ]);
    let err = convert(script.as_path(), &config_with(stub.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Service);
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn service_error_retried_when_configured() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "s.qvs", "LOAD 1;");
    let stub = StubProvider::scripted(vec![
        Err(Qvs2PdfError::ServiceError {
            provider: "stub".into(),
            detail: "503".into(),
        }),
        Ok(Generation::text("# Recovered\n")),
    ]);
    let config = ReportConfig::builder()
        .provider(stub.clone())
        .max_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let output = convert(script.as_path(), &config).await.unwrap();
    assert_eq!(stub.calls(), 2);
    assert_eq!(output.stats.retries, 1);
}

#[tokio::test]
async fn cancelled_token_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "s.qvs", "LOAD 1;");
    let stub = StubProvider::replying("# never delivered\n");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = convert_with_cancel(script.as_path(), &config_with(stub), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn convert_to_file_writes_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "sample.qvs", "LOAD * FROM table.qvd;");
    let out_dir = dir.path().join("reports");
    std::fs::create_dir(&out_dir).unwrap();
    let stub = StubProvider::replying("# Summary\n- Loads table.qvd\n");

    let stats = convert_to_file(script.as_path(), &out_dir, &config_with(stub))
        .await
        .unwrap();

    let written = out_dir.join("sample.pdf");
    let bytes = std::fs::read(&written).unwrap();
    assert_eq!(bytes.len(), stats.pdf_bytes);
    let entries = std::fs::read_dir(&out_dir).unwrap().count();
    assert_eq!(entries, 1, "temp file left behind");
}

#[tokio::test]
async fn deliver_report_runs_as_deliver_stage() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "sample.qvs", "LOAD * FROM table.qvd;");
    let recorder = Arc::new(StageRecorder::default());
    let config = ReportConfig::builder()
        .provider(StubProvider::replying("# Summary\n"))
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let output = convert(script.as_path(), &config).await.unwrap();
    recorder.events.lock().unwrap().clear();
    let written = deliver_report(&output, dir.path(), &config).await.unwrap();

    assert_eq!(written, dir.path().join("sample.pdf"));
    assert_eq!(std::fs::read(&written).unwrap(), output.report.bytes);
    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events, vec!["start:Deliver", "done:Deliver"]);
}

#[test]
fn convert_sync_runs_without_a_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "sample.qvs", "LOAD * FROM table.qvd;");
    let stub = StubProvider::replying("# Summary\n- Loads table.qvd\n");

    let output = convert_sync(script.as_path(), &config_with(stub.clone())).unwrap();

    assert_eq!(stub.calls(), 1);
    assert_eq!(output.report.filename, "sample.pdf");
    assert!(pdf_text(&output.report.bytes).contains("Loads table.qvd"));
}

#[tokio::test]
async fn unwritable_destination_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "sample.qvs", "LOAD 1;");
    let blocker = write_script(dir.path(), "not-a-dir", "x");
    let stub = StubProvider::replying("# Summary\n");

    let err = convert_to_file(script.as_path(), blocker.join("out.pdf"), &config_with(stub))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[tokio::test]
async fn upload_in_windows_1252_becomes_download() {
    let stub = StubProvider::replying("# Résumé\n\nLoads *café* data.\n");
    let config = ReportConfig::builder()
        .provider(stub.clone())
        .output_name(OutputName::Fixed("Dashboard Summary.pdf".into()))
        .build()
        .unwrap();
    // "Café" in windows-1252
    let bytes = b"LOAD 'Caf\xe9' AS name AUTOGENERATE 1;".to_vec();

    let download = convert_upload("scripts\\caf.qvs", bytes, "windows-1252", &config, true)
        .await
        .unwrap();

    assert_eq!(stub.last_prompt().body, "LOAD 'Café' AS name AUTOGENERATE 1;");
    assert_eq!(download.filename, "Dashboard Summary.pdf");
    assert_eq!(download.content_type, "application/pdf");
    assert!(download.bytes.starts_with(b"%PDF"));
    assert_eq!(download.preview.as_deref(), Some("# Résumé\n\nLoads *café* data.\n"));
    assert_eq!(
        download.content_disposition(),
        "attachment; filename=\"Dashboard Summary.pdf\""
    );
}

#[tokio::test]
async fn malformed_upload_is_decode_error() {
    let stub = StubProvider::replying("# x\n");
    let err = convert_upload("bad.qvs", vec![0xff, 0xfe, 0xfd], "utf-8", &config_with(stub.clone()), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Qvs2PdfError::Decode { .. }));
    assert_eq!(stub.calls(), 0);
}

#[tokio::test]
async fn stages_reported_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "s.qvs", "LOAD 1;");
    let recorder = Arc::new(StageRecorder::default());
    let config = ReportConfig::builder()
        .provider(StubProvider::replying("# Done\n"))
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    convert_to_file(script.as_path(), dir.path().join("s.pdf"), &config)
        .await
        .unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start:Acquire",
            "done:Acquire",
            "start:Compose",
            "done:Compose",
            "start:Explain",
            "done:Explain",
            "start:Render",
            "done:Render",
            "start:Deliver",
            "done:Deliver",
        ]
    );
}

#[tokio::test]
async fn failure_reported_for_failing_stage() {
    let recorder = Arc::new(StageRecorder::default());
    let config = ReportConfig::builder()
        .provider(StubProvider::replying("# x\n"))
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let _ = convert("/missing/script.qvs", &config).await;
    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events, vec!["start:Acquire", "fail:Acquire"]);
}

#[tokio::test]
async fn long_explanation_spans_pages() {
    init_tracing();
    let mut markdown = String::from("# Long script\n\n");
    for i in 0..120 {
        markdown.push_str(&format!(
            "## Section {i}\n\n- Loads table_{i}.qvd and joins it to the calendar.\n\n"
        ));
    }
    let output = render_explanation(&markdown, "long.qvs", &ReportConfig::default())
        .await
        .unwrap();
    assert!(output.report.page_count > 5);
    let text = pdf_text(&output.report.bytes);
    assert!(text.contains("Section 0"));
    assert!(text.contains("Loads table_119.qvd"));
}
