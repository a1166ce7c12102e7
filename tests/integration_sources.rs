#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Source acquisition against a mock web server, feeding the chunker

use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use embed_index::config::FetchConfig;
use embed_index::embeddings::{ChunkingConfig, chunk_document};
use embed_index::sources::{HttpClient, SourceFetcher};

const GUIDE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <title>Install Guide</title>
    <meta name="description" content="Installing the tool">
    <style>body { color: red; }</style>
    <script>console.log("tracking");</script>
</head>
<body>
    <header>Site header</header>
    <nav><a href="/">Home</a></nav>
    <article>
        <h1>Installing</h1>
        <p>Download the archive and unpack it.</p>
        <p>Run the installer from a terminal.</p>
    </article>
    <footer>Copyright</footer>
</body>
</html>"#;

fn fetcher() -> SourceFetcher {
    let config = FetchConfig {
        user_agent: "embed-index-integration".to_string(),
        timeout_seconds: 5,
        max_retries: 1,
    };
    SourceFetcher::with_http_client(
        HttpClient::new(&config).with_retry_delay(Duration::from_millis(1)),
    )
}

#[tokio::test]
async fn remote_html_is_stripped_to_article_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/guide"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(GUIDE_PAGE),
        )
        .mount(&server)
        .await;

    let source = format!("{}/guide", server.uri());
    let document = fetcher().fetch_document(&source).await;

    assert!(document.is_available());
    assert_eq!(
        document.content,
        "Installing\nDownload the archive and unpack it.\nRun the installer from a terminal."
    );
    assert_eq!(
        document.metadata.get("title").map(String::as_str),
        Some("Install Guide")
    );
    assert_eq!(
        document.metadata.get("description").map(String::as_str),
        Some("Installing the tool")
    );
    assert_eq!(document.metadata.get("lang").map(String::as_str), Some("en"));
    for chrome in ["Site header", "Home", "Copyright", "tracking", "color"] {
        assert!(
            !document.content.contains(chrome),
            "{chrome:?} should have been stripped"
        );
    }
}

#[tokio::test]
async fn mixed_batch_keeps_order_and_reports_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("plain remote text"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("should create temp dir");
    let local = temp_dir.path().join("local.md");
    std::fs::write(&local, "# Local\n\nlocal body").expect("should write file");

    let sources = vec![
        format!("{}/missing", server.uri()),
        local.to_string_lossy().into_owned(),
        format!("{}/ok.txt", server.uri()),
    ];
    let documents = fetcher().fetch_documents(&sources).await;

    assert_eq!(documents.len(), 3);
    assert_eq!(documents[0].fetch_failure.as_deref(), Some("HTTP error 404"));
    assert_eq!(documents[1].content, "# Local\n\nlocal body");
    assert_eq!(documents[2].content, "plain remote text");
    for (document, source) in documents.iter().zip(&sources) {
        assert_eq!(&document.source, source);
    }
}

#[tokio::test]
async fn fetched_document_chunks_carry_its_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(GUIDE_PAGE),
        )
        .mount(&server)
        .await;

    let source = format!("{}/guide", server.uri());
    let document = fetcher().fetch_document(&source).await;
    let chunking = ChunkingConfig::new(30, 0).expect("valid chunking");

    let chunks = chunk_document(&document, &chunking).expect("valid chunking");

    assert!(chunks.len() > 1);
    let rebuilt: String = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
    assert_eq!(rebuilt, document.content);
    for (position, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, position);
        assert_eq!(chunk.source, source);
        assert_eq!(
            chunk.metadata.get("title").map(String::as_str),
            Some("Install Guide")
        );
        assert!(chunk.text.chars().count() <= 30);
    }
}
