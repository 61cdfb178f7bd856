//! Integration tests for the retrieval pipeline.
//!
//! A wiremock server plays the mirror: landing pages live at `/<doi>` and
//! documents under `/downloads/`.

use std::io::Write;
use std::path::Path;

use doihive_core::download::{
    DownloadEngine, FailureKind, HttpClient, Job, OutcomeStatus, Pacing, RetryPolicy,
    RunStatistics, TransportSettings, output_filename,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

fn engine(workers: usize) -> DownloadEngine {
    let client = HttpClient::new(&TransportSettings::for_workers(workers))
        .expect("client should build");
    DownloadEngine::new(workers, client)
        .expect("workers in range")
        .with_pacing(Pacing::none())
        .with_retry_policies(
            RetryPolicy::page().without_delays(),
            RetryPolicy::payload().without_delays(),
        )
}

fn landing_page(document_path: &str) -> String {
    format!(
        r#"<html><head><title>Paper</title></head><body>
<div class="download"><a href="{document_path}">download</a></div>
</body></html>"#
    )
}

fn pdf_bytes(len: usize) -> Vec<u8> {
    let mut data = b"%PDF-1.7\n".to_vec();
    data.resize(len, b'x');
    data
}

async fn mount_article(server: &MockServer, doi: &str, document: Vec<u8>) {
    let file = format!("/downloads/{}.pdf", doi.replace('/', "_"));
    Mock::given(method("GET"))
        .and(path(format!("/{doi}")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(landing_page(&file)),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(file))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(document),
        )
        .mount(server)
        .await;
}

async fn run(engine: &DownloadEngine, jobs: Vec<Job>, dir: &Path) -> RunStatistics {
    engine.run(jobs, dir).await.expect("run should start")
}

#[tokio::test]
async fn test_single_doi_is_retrieved_and_committed() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_article(&mock_server, "10.1000/xyz123", pdf_bytes(102_400)).await;
    let temp = TempDir::new().expect("temp dir");

    let stats = run(
        &engine(1),
        vec![Job::for_identifier(&mock_server.uri(), "10.1000/xyz123")],
        temp.path(),
    )
    .await;

    assert_eq!(stats.total, 1);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.total_bytes, 102_400);
    let saved = temp.path().join(output_filename("10.1000/xyz123"));
    assert!(saved.ends_with("10.1000_xyz123.pdf"));
    let data = std::fs::read(&saved).expect("document saved");
    assert_eq!(data.len(), 102_400);
    assert!(data.starts_with(b"%PDF"));

    let leftovers: Vec<_> = std::fs::read_dir(temp.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty(), "staging files must not survive a run");
}

#[tokio::test]
async fn test_second_run_skips_without_network() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let temp = TempDir::new().expect("temp dir");
    std::fs::write(temp.path().join("10.1000_abc.pdf"), pdf_bytes(2048)).expect("seed file");
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let stats = run(
        &engine(2),
        vec![Job::for_identifier(&mock_server.uri(), "10.1000/abc")],
        temp.path(),
    )
    .await;

    assert_eq!(stats.total, 1);
    assert_eq!(stats.skip, 1);
    assert_eq!(stats.success, 0);
    assert_eq!(stats.total_bytes, 2048);
}

#[tokio::test]
async fn test_persistent_forbidden_page_stops_at_three_attempts() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/10.1000/blocked"))
        .respond_with(ResponseTemplate::new(403))
        .expect(3)
        .mount(&mock_server)
        .await;
    let temp = TempDir::new().expect("temp dir");

    let stats = run(
        &engine(1),
        vec![Job::for_identifier(&mock_server.uri(), "10.1000/blocked")],
        temp.path(),
    )
    .await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.failures[0].identifier, "10.1000/blocked");
    assert_eq!(stats.failures[0].kind, FailureKind::RateLimited);
    assert_eq!(stats.anomaly_count(), 1);
}

#[tokio::test]
async fn test_html_error_page_fails_integrity_and_leaves_no_file() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_article(
        &mock_server,
        "10.1000/fake",
        b"<html><body>403 Forbidden</body></html>".to_vec(),
    )
    .await;
    let temp = TempDir::new().expect("temp dir");

    let stats = run(
        &engine(1),
        vec![Job::for_identifier(&mock_server.uri(), "10.1000/fake")],
        temp.path(),
    )
    .await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.failures[0].kind, FailureKind::Integrity);
    assert!(!temp.path().join("10.1000_fake.pdf").exists());
}

#[tokio::test]
async fn test_every_job_is_counted_across_workers() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let dois: Vec<String> = (0..10).map(|i| format!("10.1000/paper{i}")).collect();
    for doi in dois.iter().take(7) {
        mount_article(&mock_server, doi, pdf_bytes(1024)).await;
    }
    Mock::given(method("GET"))
        .and(path_regex(r"^/10\.1000/paper[7-9]$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><title>Article is not available</title></head></html>",
        ))
        .mount(&mock_server)
        .await;
    let temp = TempDir::new().expect("temp dir");
    let jobs = dois
        .iter()
        .map(|doi| Job::for_identifier(&mock_server.uri(), doi))
        .collect();

    let stats = run(&engine(3), jobs, temp.path()).await;

    assert_eq!(stats.total, 10);
    assert_eq!(stats.success + stats.skip + stats.failed, 10);
    assert_eq!(stats.success, 7);
    assert_eq!(stats.failures_of(FailureKind::Unavailable), 3);
    assert_eq!(stats.durations.len(), 10);
    assert_eq!(stats.total_bytes, 7 * 1024);
}

#[tokio::test]
async fn test_duplicate_identifiers_download_once() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_article(&mock_server, "10.1000/dup", pdf_bytes(4096)).await;
    let temp = TempDir::new().expect("temp dir");
    let job = Job::for_identifier(&mock_server.uri(), "10.1000/dup");

    let stats = run(&engine(2), vec![job.clone(), job], temp.path()).await;

    assert_eq!(stats.total, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.skip, 1);
    let document_hits = mock_server
        .received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .filter(|request| request.url.path().starts_with("/downloads/"))
        .count();
    assert_eq!(document_hits, 1);
}

#[tokio::test]
async fn test_gzip_encoded_landing_page_is_decoded() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(landing_page("/downloads/gz.pdf").as_bytes())
        .expect("gzip write");
    let compressed = encoder.finish().expect("gzip finish");
    Mock::given(method("GET"))
        .and(path("/10.1000/gz"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(compressed),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/downloads/gz.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(pdf_bytes(512)),
        )
        .mount(&mock_server)
        .await;
    let temp = TempDir::new().expect("temp dir");

    let stats = run(
        &engine(1),
        vec![Job::for_identifier(&mock_server.uri(), "10.1000/gz")],
        temp.path(),
    )
    .await;

    assert_eq!(stats.success, 1, "failures: {:?}", stats.failures);
}

#[tokio::test]
async fn test_unrecognized_page_is_saved_for_triage() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let markup = "<html><head><title>Mirror front page</title></head><body>Welcome</body></html>";
    Mock::given(method("GET"))
        .and(path("/10.1000/odd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(markup))
        .mount(&mock_server)
        .await;
    let temp = TempDir::new().expect("temp dir");

    let stats = run(
        &engine(1),
        vec![Job::for_identifier(&mock_server.uri(), "10.1000/odd")],
        temp.path(),
    )
    .await;

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.failures[0].kind, FailureKind::Extraction);
    assert!(stats.failures[0].reason.contains("Mirror front page"));
    let dump = temp.path().join("debug").join("10.1000_odd.html");
    assert_eq!(std::fs::read_to_string(dump).expect("diagnostics saved"), markup);
}

#[tokio::test]
async fn test_observer_sees_every_outcome() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_article(&mock_server, "10.1000/seen", pdf_bytes(1024)).await;
    let temp = TempDir::new().expect("temp dir");
    let seen = std::sync::Mutex::new(Vec::new());

    let stats = engine(2)
        .run_with_observer(
            vec![Job::for_identifier(&mock_server.uri(), "10.1000/seen")],
            temp.path(),
            &|outcome: &doihive_core::download::Outcome| {
                seen.lock().expect("observer lock").push(outcome.status);
            },
        )
        .await
        .expect("run should start");

    assert_eq!(stats.success, 1);
    assert_eq!(*seen.lock().expect("observer lock"), [OutcomeStatus::Success]);
}
