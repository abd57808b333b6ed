use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ragbatch_core::{EmbedErrorKind, EmbedderCapability, ErrorClass};
use ragbatch_embed::http::{from_status, retry_after};
use ragbatch_embed::ollama::with_default_tag;
use ragbatch_embed::{OllamaEmbedder, OpenAiCompatibleEmbedder};

/// Accept one connection, drain the request, answer with a canned response.
async fn serve_once(status_line: &'static str, extra_headers: &'static str, body: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut sock, _)) = listener.accept().await else { return };
        let mut buf = vec![0u8; 256 * 1024];
        let mut read = 0usize;
        loop {
            let n = sock.read(&mut buf[read..]).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            read += n;
            if let Some(pos) = buf[..read].windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while read < pos + 4 + len {
                    let n = sock.read(&mut buf[read..]).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    read += n;
                }
                break;
            }
        }
        let resp = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{}\r\n{}",
            status_line,
            body.len(),
            extra_headers,
            body
        );
        let _ = sock.write_all(resp.as_bytes()).await;
        let _ = sock.shutdown().await;
    });
    format!("http://{}", addr)
}

fn texts(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("chunk {i}")).collect()
}

#[test]
fn status_codes_map_to_error_kinds() {
    let cases = [
        (StatusCode::TOO_MANY_REQUESTS, EmbedErrorKind::RateLimited),
        (StatusCode::UNAUTHORIZED, EmbedErrorKind::Unauthorized),
        (StatusCode::FORBIDDEN, EmbedErrorKind::Forbidden),
        (StatusCode::PAYLOAD_TOO_LARGE, EmbedErrorKind::TooLarge),
        (StatusCode::UNPROCESSABLE_ENTITY, EmbedErrorKind::InvalidRequest),
        (StatusCode::BAD_GATEWAY, EmbedErrorKind::ServerError),
        (StatusCode::IM_A_TEAPOT, EmbedErrorKind::Other),
    ];
    for (status, kind) in cases {
        let err = from_status(status, "body", None);
        assert_eq!(err.kind, kind, "{status}");
        assert_eq!(err.status, Some(status.as_u16()));
    }
}

#[test]
fn retry_after_header_parsing() {
    let mut headers = HeaderMap::new();
    assert_eq!(retry_after(&headers), None);
    headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
    assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
    headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
    assert_eq!(retry_after(&headers), None, "HTTP dates are not interpreted");
    for odd in ["99999999999999999999", "1e30", "-5", "2.5", "NaN"] {
        headers.insert(RETRY_AFTER, HeaderValue::from_static(odd));
        assert_eq!(retry_after(&headers), None, "{odd}");
    }
    headers.insert(RETRY_AFTER, HeaderValue::from_static("18446744073709551615"));
    assert_eq!(retry_after(&headers), Some(Duration::from_secs(u64::MAX)));
}

#[test]
fn ollama_model_tag_defaults_to_latest() {
    assert_eq!(with_default_tag("nomic-embed-text"), "nomic-embed-text:latest");
    assert_eq!(with_default_tag("bge-m3:567m"), "bge-m3:567m");
}

#[tokio::test]
async fn openai_compatible_orders_by_index() {
    let body = r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#.to_string();
    let base = serve_once("200 OK", "", body).await;
    let client = OpenAiCompatibleEmbedder::upstage("up_test_key_0123456789", Some(&base), None).unwrap();
    let vectors = client.embed(&texts(2)).await.expect("embed");
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn openai_compatible_count_mismatch_is_an_error() {
    let body = r#"{"data":[{"embedding":[1.0],"index":0}]}"#.to_string();
    let base = serve_once("200 OK", "", body).await;
    let client = OpenAiCompatibleEmbedder::openai("sk-test", Some(&base), None).unwrap();
    let err = client.embed(&texts(3)).await.unwrap_err();
    assert_eq!(err.kind, EmbedErrorKind::Other);
    assert!(err.message.contains("expected 3"), "{}", err.message);
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let base = serve_once("429 Too Many Requests", "retry-after: 3\r\n", "{}".to_string()).await;
    let client = OpenAiCompatibleEmbedder::upstage("up_test_key_0123456789", Some(&base), None).unwrap();
    let err = client.embed(&texts(1)).await.unwrap_err();
    assert_eq!(err.kind, EmbedErrorKind::RateLimited);
    assert_eq!(err.retry_after, Some(Duration::from_secs(3)));
    // A short hint on a hosted profile is a transient quota blip
    assert_eq!(client.profile().classify(&err), ErrorClass::Retryable);
}

#[tokio::test]
async fn oversized_retry_after_still_reports_rate_limit() {
    let base = serve_once("429 Too Many Requests", "retry-after: 1e30\r\n", "{}".to_string()).await;
    let client = OpenAiCompatibleEmbedder::upstage("up_test_key_0123456789", Some(&base), None).unwrap();
    let joined = tokio::spawn(async move { client.embed(&texts(1)).await }).await;
    let err = joined.expect("embed task must not panic").unwrap_err();
    assert_eq!(err.kind, EmbedErrorKind::RateLimited);
    assert_eq!(err.retry_after, None);
}

#[tokio::test]
async fn unauthorized_is_auth_fatal() {
    let base = serve_once("401 Unauthorized", "", r#"{"error":"bad key"}"#.to_string()).await;
    let client = OpenAiCompatibleEmbedder::upstage("up_wrong_key_0123456789", Some(&base), None).unwrap();
    let err = client.embed(&texts(1)).await.unwrap_err();
    assert_eq!(err.kind, EmbedErrorKind::Unauthorized);
    assert_eq!(client.profile().classify(&err), ErrorClass::AuthFatal);
}

#[tokio::test]
async fn ollama_embed_and_missing_model() {
    let body = r#"{"embeddings":[[0.5,0.5],[0.1,0.9]]}"#.to_string();
    let base = serve_once("200 OK", "", body).await;
    let ollama = OllamaEmbedder::new(Some(&base), Some("nomic-embed-text"));
    assert_eq!(ollama.model(), "nomic-embed-text:latest");
    let vectors = ollama.embed(&texts(2)).await.expect("embed");
    assert_eq!(vectors.len(), 2);

    let base = serve_once("404 Not Found", "", r#"{"error":"model not found"}"#.to_string()).await;
    let ollama = OllamaEmbedder::new(Some(&base), Some("missing"));
    let err = ollama.embed(&texts(1)).await.unwrap_err();
    assert_eq!(err.kind, EmbedErrorKind::InvalidRequest);
    assert_eq!(ollama.profile().classify(&err), ErrorClass::RequestFatal);
}

#[tokio::test]
async fn ollama_readiness_checks_installed_models() {
    let tags = r#"{"models":[{"name":"nomic-embed-text:latest"}]}"#.to_string();
    let base = serve_once("200 OK", "", tags.clone()).await;
    OllamaEmbedder::new(Some(&base), Some("nomic-embed-text")).check_ready().await.expect("installed");

    let base = serve_once("200 OK", "", tags).await;
    let err = OllamaEmbedder::new(Some(&base), Some("bge-m3")).check_ready().await.unwrap_err();
    assert_eq!(err.kind, EmbedErrorKind::InvalidRequest);
}

#[tokio::test]
async fn ollama_unreachable_is_a_network_error() {
    // Bind then drop to get a port with nothing listening.
    let port = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap().port();
    let ollama = OllamaEmbedder::new(Some(&format!("http://127.0.0.1:{port}")), Some("nomic-embed-text"));
    let err = ollama.check_ready().await.unwrap_err();
    assert_eq!(err.kind, EmbedErrorKind::Network);
}
