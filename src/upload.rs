//! Upload stage: package an encoded asset as a multipart form and send it.
//!
//! ## Progress
//!
//! Progress is a single number in `[0, 100]` built from two phases:
//!
//! | Phase | Range | Source |
//! |---|---|---|
//! | Send | `0..=49` | bytes of the file part pulled by the connection |
//! | Receive | `50..=100` | response body bytes read |
//!
//! When the request size is unknown the send phase reports `0` and flags
//! the value as indeterminate. [`ProgressReporter`] never lets the value go
//! backwards, and a successful upload always ends at exactly `100`.
//!
//! ## Outcomes
//!
//! Only status `200` counts as success. Any other status, and any
//! connection or read error once the request is underway, is an
//! [`UploadOutcome::Failure`] value rather than an `Err`; `Err` is reserved
//! for requests that cannot be built at all.

use crate::config::TransportConfig;
use crate::process::PipelineEvent;
use crate::types::EncodedAsset;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, Url};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Highest value the send phase reports.
pub const SEND_PHASE_MAX: f64 = 49.0;
/// Value the receive phase starts from.
pub const RECEIVE_PHASE_START: f64 = 50.0;

/// Size of the file-part chunks handed to the connection.
const CHUNK_SIZE: usize = 16 * 1024;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid upload URL `{0}`")]
    InvalidUrl(String),
    #[error("Unsupported upload method `{0}`")]
    InvalidMethod(String),
    #[error("Cannot package upload: {0}")]
    Packaging(String),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Everything needed to send one asset.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub asset: EncodedAsset,
    /// Part filename, `<stem>.<hash>.jpg`.
    pub filename: String,
    /// Multipart field carrying the file.
    pub file_field: String,
    /// Extra text fields, sent before the file part.
    pub fields: BTreeMap<String, String>,
}

/// Terminal state of a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UploadOutcome {
    Success { body: String },
    Failure(TransportFailure),
}

/// Context of a failed send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportFailure {
    /// HTTP status, `None` when no response arrived.
    pub status: Option<u16>,
    /// Response body, or the error message when there is no body.
    pub body: String,
}

// =============================================================================
// Progress
// =============================================================================

/// Send-phase percentage; `None` when `total` is unknown.
pub fn send_percent(loaded: u64, total: Option<u64>) -> Option<f64> {
    let total = total?;
    if total == 0 {
        return Some(SEND_PHASE_MAX);
    }
    let fraction = (loaded as f64 / total as f64).clamp(0.0, 1.0);
    Some(fraction * SEND_PHASE_MAX)
}

/// Receive-phase percentage; `50` when `total` is unknown.
pub fn receive_percent(loaded: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => {
            let fraction = (loaded as f64 / total as f64).clamp(0.0, 1.0);
            RECEIVE_PHASE_START + fraction * (100.0 - RECEIVE_PHASE_START)
        }
        _ => RECEIVE_PHASE_START,
    }
}

/// Monotonic progress sink shared between the request body and the
/// response reader.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    current: Arc<Mutex<f64>>,
    events: Option<Sender<PipelineEvent>>,
}

impl ProgressReporter {
    pub fn new(events: Option<Sender<PipelineEvent>>) -> Self {
        Self {
            current: Arc::new(Mutex::new(0.0)),
            events,
        }
    }

    pub fn send_phase(&self, loaded: u64, total: Option<u64>) {
        match send_percent(loaded, total) {
            Some(percent) => self.report(percent, false),
            None => self.report(0.0, true),
        }
    }

    pub fn receive_phase(&self, loaded: u64, total: Option<u64>) {
        self.report(receive_percent(loaded, total), false);
    }

    pub fn complete(&self) {
        self.report(100.0, false);
    }

    /// Latest reported value.
    pub fn percent(&self) -> f64 {
        self.current.lock().map(|p| *p).unwrap_or(0.0)
    }

    fn report(&self, percent: f64, indeterminate: bool) {
        let percent = match self.current.lock() {
            Ok(mut current) => {
                *current = current.max(percent.clamp(0.0, 100.0));
                *current
            }
            Err(_) => return,
        };
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is watching.
            let _ = events.send(PipelineEvent::UploadProgress {
                percent,
                indeterminate,
            });
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Sends an [`UploadJob`] and reports progress while doing so.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        job: UploadJob,
        progress: ProgressReporter,
    ) -> impl Future<Output = Result<UploadOutcome, UploadError>> + Send;
}

/// Multipart upload over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
    method: String,
}

impl HttpTransport {
    /// Build a transport for `config`.
    ///
    /// URL and method are checked when a job is sent, so a transport can be
    /// built for a compress-only run with no endpoint configured.
    pub fn new(config: &TransportConfig) -> Result<Self, UploadError> {
        Ok(Self {
            client: Client::builder().build()?,
            url: config.url.clone(),
            method: config.method.clone(),
        })
    }

    fn target(&self) -> Result<(Method, Url), UploadError> {
        let url = Url::parse(&self.url).map_err(|_| UploadError::InvalidUrl(self.url.clone()))?;
        let method = match self.method.to_ascii_uppercase().as_str() {
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            _ => return Err(UploadError::InvalidMethod(self.method.clone())),
        };
        Ok((method, url))
    }
}

/// File part streamed in chunks, reporting send progress as each chunk is
/// pulled.
fn streamed_part(job: &UploadJob, progress: ProgressReporter) -> Result<Part, UploadError> {
    let bytes: Bytes = job.asset.bytes.clone();
    let total = bytes.len() as u64;
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(CHUNK_SIZE)
        .map(|start| bytes.slice(start..(start + CHUNK_SIZE).min(bytes.len())))
        .collect();

    let mut sent = 0u64;
    let body = futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress.send_phase(sent, Some(total));
        Ok::<Bytes, std::io::Error>(chunk)
    });

    Part::stream_with_length(Body::wrap_stream(body), total)
        .file_name(job.filename.clone())
        .mime_str(&job.asset.mime)
        .map_err(|e| UploadError::Packaging(format!("{}: {}", job.asset.mime, e)))
}

impl Transport for HttpTransport {
    async fn send(
        &self,
        job: UploadJob,
        progress: ProgressReporter,
    ) -> Result<UploadOutcome, UploadError> {
        let (method, url) = self.target()?;

        let mut form = Form::new();
        for (key, value) in &job.fields {
            form = form.text(key.clone(), value.clone());
        }
        form = form.part(job.file_field.clone(), streamed_part(&job, progress.clone())?);

        log::debug!(
            "{} {} ({} bytes as `{}`)",
            method,
            url,
            job.asset.len(),
            job.filename
        );

        let mut response = match self
            .client
            .request(method, url)
            .multipart(form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Ok(UploadOutcome::Failure(TransportFailure {
                    status: None,
                    body: e.to_string(),
                }));
            }
        };

        let status = response.status().as_u16();
        let total = response.content_length();
        progress.receive_phase(0, total);

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    progress.receive_phase(body.len() as u64, total);
                }
                Ok(None) => break,
                Err(e) => {
                    return Ok(UploadOutcome::Failure(TransportFailure {
                        status: Some(status),
                        body: e.to_string(),
                    }));
                }
            }
        }
        let body = String::from_utf8_lossy(&body).into_owned();

        if status == 200 {
            progress.complete();
            Ok(UploadOutcome::Success { body })
        } else {
            Ok(UploadOutcome::Failure(TransportFailure {
                status: Some(status),
                body,
            }))
        }
    }
}
