mod common;

use std::path::Path;

use common::{json_response, text_response, MockHttpClient};
use runbook_core::types::HttpRequest;
use runbook_exec::runner::http::{HttpClientOptions, ReqwestHttpClient, TRACE_HEADER};
use runbook_exec::runner::HttpRunner;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

const BOUNDARY: &str = "123456789012345678901234567890abcdefghijklmnopqrstuvwxyz";

fn request(payload: Value) -> HttpRequest {
    HttpRequest::from_payload(&payload).unwrap()
}

#[tokio::test]
async fn request_and_response_are_recorded() {
    let client = MockHttpClient::always(json_response(201, json!({"id": 1})));
    let runner = HttpRunner::new(
        "req",
        Url::parse("https://api.github.com/api/v3").unwrap(),
        client.clone(),
    );
    let req = request(json!({
        "/repos/octocat/hello?page=2": {
            "post": {
                "headers": {"X-Token": "abc"},
                "body": {"application/json": {"title": "hi"}}
            }
        }
    }));

    let out = runner.run(&req, Path::new("."), false, None).await.unwrap();

    let sent = &client.requests()[0];
    assert_eq!(sent.method, "POST");
    assert_eq!(
        sent.url.as_str(),
        "https://api.github.com/api/v3/repos/octocat/hello?page=2"
    );
    assert_eq!(sent.header("x-token"), Some("abc"));
    assert_eq!(sent.header("content-type"), Some("application/json"));
    assert_eq!(sent.body, br#"{"title":"hi"}"#.to_vec());

    let result = out.result.unwrap();
    assert_eq!(result["res"]["status"], json!(201));
    assert_eq!(result["res"]["body"], json!({"id": 1}));
    assert_eq!(result["res"]["headers"]["content-type"], json!(["application/json"]));
    assert_eq!(result["req"]["body"], json!({"title": "hi"}));
    assert!(out.warnings.is_empty());
}

#[tokio::test]
async fn explicit_content_type_wins_for_plain_bodies() {
    let client = MockHttpClient::always(text_response(200, "text/plain", "pong"));
    let runner = HttpRunner::new("req", Url::parse("http://localhost").unwrap(), client.clone());
    let req = request(json!({
        "/ping": {
            "put": {
                "headers": {"Content-Type": "text/plain; charset=utf-8"},
                "body": {"text/plain": "ping"}
            }
        }
    }));

    let out = runner.run(&req, Path::new("."), false, None).await.unwrap();

    let sent = &client.requests()[0];
    assert_eq!(sent.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(sent.body, b"ping".to_vec());
    assert_eq!(out.result.unwrap()["res"]["body"], json!("pong"));
}

#[tokio::test]
async fn trace_header_is_attached_when_requested() {
    let client = MockHttpClient::always(json_response(200, json!({})));
    let runner = HttpRunner::new("req", Url::parse("http://localhost").unwrap(), client.clone());
    let req = request(json!({"/": {"get": {}}}));

    runner
        .run(&req, Path::new("."), false, Some(r#"{"id":"r1","step":"0"}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(
        client.requests()[0].header(TRACE_HEADER),
        Some(r#"{"id":"r1","step":"0"}"#)
    );
}

#[tokio::test]
async fn multipart_body_uploads_files_from_the_root() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("dummy.png"), b"PNGDATA").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

    let client = MockHttpClient::always(json_response(200, json!({})));
    let runner = HttpRunner::new("req", Url::parse("http://localhost").unwrap(), client.clone())
        .with_multipart_boundary(BOUNDARY);
    let req = request(json!({
        "/upload": {
            "post": {
                "body": {
                    "multipart/form-data": {
                        "username": "bob",
                        "upload": ["dummy.png", "notes.txt"]
                    }
                }
            }
        }
    }));

    runner.run(&req, dir.path(), false, None).await.unwrap();

    let sent = &client.requests()[0];
    assert_eq!(
        sent.header("content-type").unwrap(),
        format!("multipart/form-data; boundary={BOUNDARY}")
    );
    let expected = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"username\"\r\n\r\n\
         bob\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"upload\"; filename=\"dummy.png\"\r\n\
         Content-Type: image/png\r\n\r\n\
         PNGDATA\r\n\
         --{b}\r\n\
         Content-Disposition: form-data; name=\"upload\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         hello\r\n\
         --{b}--\r\n",
        b = BOUNDARY
    );
    assert_eq!(String::from_utf8(sent.body.clone()).unwrap(), expected);
}

#[tokio::test]
async fn multipart_content_type_overrides_user_header() {
    let client = MockHttpClient::always(json_response(200, json!({})));
    let runner = HttpRunner::new("req", Url::parse("http://localhost").unwrap(), client.clone())
        .with_multipart_boundary("xyz");
    let req = request(json!({
        "/upload": {
            "post": {
                "headers": {"Content-Type": "multipart/form-data"},
                "body": {"multipart/form-data": [{"a": "1"}, {"b": "2"}]}
            }
        }
    }));

    runner.run(&req, Path::new("."), false, None).await.unwrap();

    let sent = &client.requests()[0];
    let content_types: Vec<_> = sent
        .headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .collect();
    assert_eq!(content_types.len(), 1);
    assert_eq!(content_types[0].1, "multipart/form-data; boundary=xyz");
}

#[tokio::test]
async fn structured_body_with_unknown_media_type_is_rejected() {
    let client = MockHttpClient::always(json_response(200, json!({})));
    let runner = HttpRunner::new("req", Url::parse("http://localhost").unwrap(), client.clone());
    let req = request(json!({
        "/x": {"post": {"body": {"application/octet-stream": {"a": 1}}}}
    }));

    let err = runner.run(&req, Path::new("."), false, None).await.unwrap_err();

    assert_eq!(err.kind(), runbook_exec::ErrorKind::Payload);
    assert_eq!(client.calls(), 0);
}

/// Serves `/redirect` as a 302 to `/target` and everything else as 200.
async fn redirect_server() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => read += n,
                    }
                }
                let head = String::from_utf8_lossy(&buf[..read]);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let response = if path == "/redirect" {
                    "HTTP/1.1 302 Found\r\nLocation: /target\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string()
                } else {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        path.len(),
                        path
                    )
                };
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    Url::parse(&format!("http://{addr}")).unwrap()
}

#[tokio::test]
async fn redirects_are_followed_by_default() {
    let base = redirect_server().await;
    let client = ReqwestHttpClient::new(&HttpClientOptions::default()).unwrap();
    let runner = HttpRunner::new("req", base, std::sync::Arc::new(client));
    let req = request(json!({"/redirect": {"get": {}}}));

    let out = runner.run(&req, Path::new("."), false, None).await.unwrap();

    let result = out.result.unwrap();
    assert_eq!(result["res"]["status"], json!(200));
    assert_eq!(result["res"]["body"], json!("/target"));
}

#[tokio::test]
async fn redirects_can_be_left_unfollowed() {
    let base = redirect_server().await;
    let client = ReqwestHttpClient::new(&HttpClientOptions {
        follow_redirects: false,
        ..HttpClientOptions::default()
    })
    .unwrap();
    let runner = HttpRunner::new("req", base, std::sync::Arc::new(client));
    let req = request(json!({"/redirect": {"get": {}}}));

    let out = runner.run(&req, Path::new("."), false, None).await.unwrap();

    let result = out.result.unwrap();
    assert_eq!(result["res"]["status"], json!(302));
    assert_eq!(result["res"]["headers"]["location"], json!(["/target"]));
    assert_eq!(result["res"]["body"], Value::Null);
}

#[test]
fn client_certificate_requires_a_key() {
    let err = ReqwestHttpClient::new(&HttpClientOptions {
        cert: Some(b"-----BEGIN CERTIFICATE-----".to_vec()),
        ..HttpClientOptions::default()
    })
    .err()
    .unwrap();
    assert_eq!(err, "cert is set but key is missing");
}
