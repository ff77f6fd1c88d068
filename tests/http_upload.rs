//! Drives the reqwest transport against a minimal local HTTP server.
//!
//! The server accepts one connection, reads a complete request (sized by
//! `Content-Length` or chunked), hands it back to the test and answers with
//! a fixed status and body.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use pixpost::config::{PipelineConfig, TransportConfig};
use pixpost::imaging::RustBackend;
use pixpost::process::{Pipeline, PipelineEvent, PipelineOutcome};
use pixpost::types::{EncodedAsset, SelectedFile};
use pixpost::upload::{HttpTransport, ProgressReporter, Transport, UploadError, UploadJob, UploadOutcome};
use std::collections::BTreeMap;
use std::sync::mpsc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

struct Request {
    head: String,
    body: Vec<u8>,
}

impl Request {
    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// Decode a chunked body; `None` until the terminating chunk has arrived.
fn dechunk(mut raw: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let line_end = find(raw, b"\r\n")?;
        let size_field = std::str::from_utf8(&raw[..line_end]).ok()?;
        let size = usize::from_str_radix(size_field.split(';').next()?.trim(), 16).ok()?;
        raw = &raw[line_end + 2..];
        if size == 0 {
            return Some(out);
        }
        if raw.len() < size + 2 {
            return None;
        }
        out.extend_from_slice(&raw[..size]);
        raw = &raw[size + 2..];
    }
}

async fn read_request(stream: &mut TcpStream) -> Request {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending a full request");
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = find(&buf, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).into_owned();
        let raw = &buf[end + 4..];

        if let Some(len) = header(&head, "content-length") {
            let len: usize = len.parse().unwrap();
            if raw.len() >= len {
                return Request {
                    head,
                    body: raw[..len].to_vec(),
                };
            }
        } else if let Some(body) = dechunk(raw) {
            return Request { head, body };
        }
    }
}

/// Serve one request; the captured request is delivered on the receiver.
async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<Request>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/photos", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        let _ = tx.send(request);
    });

    (url, rx)
}

fn transport(url: &str, method: &str) -> HttpTransport {
    HttpTransport::new(&TransportConfig {
        url: url.to_string(),
        method: method.to_string(),
        ..TransportConfig::default()
    })
    .unwrap()
}

fn job(len: usize) -> UploadJob {
    let mut fields = BTreeMap::new();
    fields.insert("album".to_string(), "trip".to_string());
    UploadJob {
        asset: EncodedAsset {
            bytes: Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>()),
            mime: "image/jpeg".to_string(),
            quality: 0.8,
            fell_back: false,
        },
        filename: "holiday.FgkkMx2O5H.jpg".to_string(),
        file_field: "photo".to_string(),
        fields,
    }
}

fn progress_values(rx: mpsc::Receiver<PipelineEvent>) -> Vec<f64> {
    rx.try_iter()
        .filter_map(|event| match event {
            PipelineEvent::UploadProgress { percent, .. } => Some(percent),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Transport
// =========================================================================

#[tokio::test]
async fn multipart_body_carries_file_and_fields() {
    let (url, request) = serve_once("200 OK", "stored").await;
    let job = job(40_000);
    let expected = job.asset.bytes.clone();

    let outcome = transport(&url, "post")
        .send(job, ProgressReporter::default())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        UploadOutcome::Success {
            body: "stored".to_string()
        }
    );

    let request = request.await.unwrap();
    assert!(request.head.starts_with("POST /photos HTTP/1.1"));
    assert!(header(&request.head, "content-type")
        .unwrap()
        .starts_with("multipart/form-data; boundary="));

    let text = request.body_text();
    assert!(text.contains("name=\"album\""));
    assert!(text.contains("trip"));
    assert!(text.contains("name=\"photo\"; filename=\"holiday.FgkkMx2O5H.jpg\""));
    assert!(text.contains("Content-Type: image/jpeg"));
    assert!(find(&request.body, &expected).is_some());
    // Text fields go before the file part.
    assert!(text.find("name=\"album\"").unwrap() < text.find("name=\"photo\"").unwrap());
}

#[tokio::test]
async fn put_method_is_used_when_configured() {
    let (url, request) = serve_once("200 OK", "").await;
    transport(&url, "PUT")
        .send(job(10), ProgressReporter::default())
        .await
        .unwrap();
    assert!(request.await.unwrap().head.starts_with("PUT /photos"));
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100() {
    let (url, _request) = serve_once("200 OK", "a fairly long response body").await;
    let (tx, rx) = mpsc::channel();

    let outcome = transport(&url, "POST")
        .send(job(100_000), ProgressReporter::new(Some(tx)))
        .await
        .unwrap();
    assert!(matches!(outcome, UploadOutcome::Success { .. }));

    let values = progress_values(rx);
    assert!(!values.is_empty());
    assert!(values.windows(2).all(|w| w[0] <= w[1]));
    assert!(values.iter().any(|&p| p > 0.0 && p <= 49.0));
    assert_eq!(*values.last().unwrap(), 100.0);
}

#[tokio::test]
async fn non_200_status_is_a_failure_with_body() {
    for status in ["201 Created", "500 Internal Server Error"] {
        let (url, _request) = serve_once(status, "nope").await;
        let outcome = transport(&url, "POST")
            .send(job(10), ProgressReporter::default())
            .await
            .unwrap();
        let UploadOutcome::Failure(failure) = outcome else {
            panic!("{status} should not count as success");
        };
        assert_eq!(failure.status, status[..3].parse().ok());
        assert_eq!(failure.body, "nope");
    }
}

#[tokio::test]
async fn refused_connection_is_a_failure_without_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/photos", listener.local_addr().unwrap());
    drop(listener);

    let outcome = transport(&url, "POST")
        .send(job(10), ProgressReporter::default())
        .await
        .unwrap();
    let UploadOutcome::Failure(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.status, None);
    assert!(!failure.body.is_empty());
}

#[tokio::test]
async fn unusable_target_is_an_error() {
    let err = transport("not a url", "POST")
        .send(job(10), ProgressReporter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidUrl(_)));

    let err = transport("http://127.0.0.1:9/", "PATCH")
        .send(job(10), ProgressReporter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidMethod(_)));
}

// =========================================================================
// Pipeline over HTTP
// =========================================================================

#[tokio::test]
async fn pipeline_uploads_photo_over_http() {
    let (url, request) = serve_once("200 OK", "{\"id\":1}").await;

    let image = RgbImage::from_fn(48, 32, |x, y| Rgb([x as u8 * 5, y as u8 * 7, 128]));
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 95)
        .write_image(image.as_raw(), 48, 32, ExtendedColorType::Rgb8)
        .unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("Beach Day.jpg");
    std::fs::write(&path, &jpeg).unwrap();

    let mut config = PipelineConfig::default();
    config.quality = 0.6;
    config.transport.url = url;
    let http = HttpTransport::new(&config.transport).unwrap();
    let pipeline = Pipeline::new(config, RustBackend::new(), http);

    let outcome = pipeline
        .handle_selection(vec![SelectedFile::from_path(&path)])
        .await
        .unwrap();
    let PipelineOutcome::Uploaded { asset, filename, body } = outcome else {
        panic!("expected upload, got {outcome:?}");
    };
    assert_eq!(body, "{\"id\":1}");
    assert_eq!(filename, pixpost::naming::upload_filename("Beach Day.jpg", &asset.bytes));
    assert!(filename.starts_with("Beach Day."));

    let request = request.await.unwrap();
    assert!(request
        .body_text()
        .contains(&format!("name=\"file\"; filename=\"{}\"", filename)));
    assert!(find(&request.body, &asset.bytes).is_some());
}
