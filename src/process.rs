//! Single-photo pipeline: read → orient → compress → upload.
//!
//! A [`Pipeline`] is bound to one input source. Each call to
//! [`Pipeline::handle_selection`] runs one selection through these stages:
//!
//! ```text
//! selection ─► checks ─► read file ─► EXIF orientation ─► decode
//!           ─► resample + rotate + encode (or keep original) ─► upload
//! ```
//!
//! ## Hooks
//!
//! [`PipelineHooks`] is called between stages. Every call is wrapped in an
//! isolating boundary: a returned error or a panic is logged and discarded.
//! The two `before_*` hooks can also stop their stage by returning
//! [`Proceed::Stop`]; an error from either of them aborts the run.
//!
//! ## Concurrency
//!
//! Stages are separated by `tokio::task::yield_now()`, so hooks and other
//! tasks get a turn between them, but the stages of one run never overlap.
//! Decoding and compressing run on tokio's blocking pool and are awaited
//! before the next stage starts.
//! While a run is in flight the pipeline is *processing*; further selections
//! return [`PipelineOutcome::Busy`] without doing anything. The flag is
//! cleared on every way out of a run, errors included.
//!
//! ## Events
//!
//! Progress is reported as [`PipelineEvent`]s over an optional
//! `std::sync::mpsc` channel. The CLI drains it on a printer thread and
//! formats each event with [`output::format_pipeline_event`](crate::output::format_pipeline_event).

use crate::config::PipelineConfig;
use crate::imaging::operations;
use crate::imaging::{self, BackendError, Orientation, Quality, RasterBackend, ResamplePlan};
use crate::naming;
use crate::types::{EncodedAsset, SelectedFile};
use crate::upload::{
    ProgressReporter, Transport, TransportFailure, UploadError, UploadJob, UploadOutcome,
};
use bytes::Bytes;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Wrong Image Amount")]
    WrongImageAmount,
    #[error("Wrong Image Type")]
    WrongImageType,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("Upload could not be sent: {0}")]
    Upload(#[from] UploadError),
    #[error("Image task did not finish: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Error type hooks may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;
pub type HookResult<T = ()> = Result<T, HookError>;

/// Answer of a `before_*` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Proceed {
    #[default]
    Continue,
    Stop,
}

/// Callbacks invoked at fixed points of a run.
///
/// Every method has a no-op default; implement only the ones you need.
pub trait PipelineHooks: Send + Sync {
    fn after_input_change(&self, _files: &[SelectedFile]) -> HookResult {
        Ok(())
    }

    fn before_read_file(&self, _file: &SelectedFile) -> HookResult {
        Ok(())
    }

    fn after_read_file(&self, _file: &SelectedFile, _original: &Bytes) -> HookResult {
        Ok(())
    }

    /// `Stop` skips compression and carries the original bytes forward.
    fn before_compress(&self, _original: &Bytes) -> HookResult<Proceed> {
        Ok(Proceed::Continue)
    }

    /// `aborted` is set when `before_compress` returned `Stop`.
    fn after_compress(
        &self,
        _asset: &EncodedAsset,
        _original: &Bytes,
        _aborted: bool,
    ) -> HookResult {
        Ok(())
    }

    /// `Stop` ends the run without sending anything.
    fn before_upload(&self, _asset: &EncodedAsset) -> HookResult<Proceed> {
        Ok(Proceed::Continue)
    }

    fn after_upload(&self, _asset: &EncodedAsset, _aborted: bool) -> HookResult {
        Ok(())
    }

    fn on_upload_success(&self, _body: &str) -> HookResult {
        Ok(())
    }

    fn on_upload_failure(&self, _failure: &TransportFailure) -> HookResult {
        Ok(())
    }

    /// Receives every error that ends a run.
    fn on_error(&self, error: &PipelineError) {
        log::error!("{}", error);
    }
}

/// Hooks that do nothing beyond the default error logging.
pub struct NoHooks;

impl PipelineHooks for NoHooks {}

/// Status updates for a loading indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    FileAccepted {
        name: String,
        bytes: usize,
    },
    OrientationDetected {
        orientation: Orientation,
    },
    CompressStarted,
    CompressFinished {
        original_bytes: usize,
        encoded_bytes: usize,
        fell_back: bool,
    },
    UploadProgress {
        percent: f64,
        indeterminate: bool,
    },
    UploadFinished {
        success: bool,
    },
}

/// Stage a `before_*` hook aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Compress,
    Upload,
}

/// How a run ended, when it did not end in an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Another run was in flight; the selection was ignored.
    Busy,
    /// Upload is disabled; the asset is the final product.
    Compressed {
        asset: EncodedAsset,
        filename: String,
    },
    Uploaded {
        asset: EncodedAsset,
        filename: String,
        body: String,
    },
    UploadFailed {
        asset: EncodedAsset,
        filename: String,
        failure: TransportFailure,
    },
    /// `before_upload` returned `Stop`.
    UploadCancelled {
        asset: EncodedAsset,
        filename: String,
    },
    /// A `before_*` hook failed.
    Aborted { stage: Stage },
}

impl PipelineOutcome {
    pub fn asset(&self) -> Option<&EncodedAsset> {
        match self {
            Self::Compressed { asset, .. }
            | Self::Uploaded { asset, .. }
            | Self::UploadFailed { asset, .. }
            | Self::UploadCancelled { asset, .. } => Some(asset),
            Self::Busy | Self::Aborted { .. } => None,
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Compressed { filename, .. }
            | Self::Uploaded { filename, .. }
            | Self::UploadFailed { filename, .. }
            | Self::UploadCancelled { filename, .. } => Some(filename),
            Self::Busy | Self::Aborted { .. } => None,
        }
    }
}

/// Clears the processing flag when dropped.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        (!flag.swap(true, Ordering::AcqRel)).then(|| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run a hook, logging and discarding failures and panics.
///
/// `None` means the hook did not complete.
fn guarded<T>(name: &str, call: impl FnOnce() -> HookResult<T>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            log::error!("{} hook failed: {}", name, e);
            None
        }
        Err(_) => {
            log::error!("{} hook panicked", name);
            None
        }
    }
}

/// One input source's pipeline.
pub struct Pipeline<B, T> {
    config: PipelineConfig,
    backend: Arc<B>,
    transport: T,
    hooks: Arc<dyn PipelineHooks>,
    events: Option<Sender<PipelineEvent>>,
    processing: AtomicBool,
}

impl<B, T> Pipeline<B, T>
where
    B: RasterBackend + Send + 'static,
    T: Transport,
{
    pub fn new(config: PipelineConfig, backend: B, transport: T) -> Self {
        Self {
            config,
            backend: Arc::new(backend),
            transport,
            hooks: Arc::new(NoHooks),
            events: None,
            processing: AtomicBool::new(false),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn PipelineHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Run one selection through every stage.
    ///
    /// Errors are passed to [`PipelineHooks::on_error`] before being
    /// returned.
    pub async fn handle_selection(
        &self,
        files: Vec<SelectedFile>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let Some(_guard) = ProcessingGuard::claim(&self.processing) else {
            log::info!("still processing, ignoring new selection");
            return Ok(PipelineOutcome::Busy);
        };

        let result = self.run(files).await;
        if let Err(e) = &result {
            let hooks = &self.hooks;
            if panic::catch_unwind(AssertUnwindSafe(|| hooks.on_error(e))).is_err() {
                log::error!("on_error hook panicked while handling: {}", e);
            }
        }
        result
    }

    async fn run(&self, files: Vec<SelectedFile>) -> Result<PipelineOutcome, PipelineError> {
        let hooks = &self.hooks;
        let quality = Quality::new(self.config.quality);

        guarded("after_input_change", || hooks.after_input_change(&files));
        tokio::task::yield_now().await;

        let file = match <[SelectedFile; 1]>::try_from(files) {
            Ok([file]) => file,
            Err(_) => return Err(PipelineError::WrongImageAmount),
        };
        if !file.is_accepted_type() {
            return Err(PipelineError::WrongImageType);
        }

        // Read
        guarded("before_read_file", || hooks.before_read_file(&file));
        tokio::task::yield_now().await;
        let original = Bytes::from(tokio::fs::read(&file.path).await?);
        guarded("after_read_file", || hooks.after_read_file(&file, &original));
        log::info!("{} ({} bytes, {})", file.name, original.len(), file.mime);
        self.emit(PipelineEvent::FileAccepted {
            name: file.name.clone(),
            bytes: original.len(),
        });

        // Orient + decode
        let orientation = imaging::read_orientation(&original);
        log::debug!("orientation {:?}", orientation);
        self.emit(PipelineEvent::OrientationDetected { orientation });
        tokio::task::yield_now().await;
        let source = {
            let backend = Arc::clone(&self.backend);
            let original = original.clone();
            tokio::task::spawn_blocking(move || imaging::decode(&*backend, &original)).await??
        };

        // Compress
        let (asset, skipped) = match guarded("before_compress", || hooks.before_compress(&original)) {
            None => {
                return Ok(PipelineOutcome::Aborted {
                    stage: Stage::Compress,
                });
            }
            Some(Proceed::Stop) => {
                log::info!("compression skipped by hook, keeping original");
                let asset = EncodedAsset::original(original.clone(), &file.mime, quality.ratio());
                (asset, true)
            }
            Some(Proceed::Continue) => {
                tokio::task::yield_now().await;
                self.emit_compress(PipelineEvent::CompressStarted);
                let backend = Arc::clone(&self.backend);
                let (bytes, mime) = (original.clone(), file.mime.clone());
                let asset = tokio::task::spawn_blocking(move || {
                    imaging::compress(&*backend, &source, &bytes, &mime, orientation, quality)
                })
                .await??;
                self.emit_compress(PipelineEvent::CompressFinished {
                    original_bytes: original.len(),
                    encoded_bytes: asset.len(),
                    fell_back: asset.fell_back,
                });
                (asset, false)
            }
        };
        guarded("after_compress", || {
            hooks.after_compress(&asset, &original, skipped)
        });

        let filename = naming::upload_filename(&file.name, &asset.bytes);
        if !self.config.upload {
            return Ok(PipelineOutcome::Compressed { asset, filename });
        }

        // Upload
        match guarded("before_upload", || hooks.before_upload(&asset)) {
            None => {
                return Ok(PipelineOutcome::Aborted {
                    stage: Stage::Upload,
                });
            }
            Some(Proceed::Stop) => {
                log::info!("upload cancelled by hook");
                guarded("after_upload", || hooks.after_upload(&asset, true));
                return Ok(PipelineOutcome::UploadCancelled { asset, filename });
            }
            Some(Proceed::Continue) => {}
        }
        tokio::task::yield_now().await;

        let job = UploadJob {
            asset: asset.clone(),
            filename: filename.clone(),
            file_field: self.config.transport.file_field.clone(),
            fields: self.config.transport.extra_fields.clone(),
        };
        let progress = ProgressReporter::new(if self.config.show_upload_loading {
            self.events.clone()
        } else {
            None
        });

        let outcome = match self.transport.send(job, progress).await? {
            UploadOutcome::Success { body } => {
                log::info!("uploaded {}", filename);
                guarded("on_upload_success", || hooks.on_upload_success(&body));
                PipelineOutcome::Uploaded {
                    asset,
                    filename,
                    body,
                }
            }
            UploadOutcome::Failure(failure) => {
                log::warn!(
                    "upload of {} failed (status {:?})",
                    filename,
                    failure.status
                );
                guarded("on_upload_failure", || hooks.on_upload_failure(&failure));
                PipelineOutcome::UploadFailed {
                    asset,
                    filename,
                    failure,
                }
            }
        };
        if self.config.show_upload_loading {
            self.emit(PipelineEvent::UploadFinished {
                success: matches!(outcome, PipelineOutcome::Uploaded { .. }),
            });
        }
        if let Some(asset) = outcome.asset() {
            guarded("after_upload", || hooks.after_upload(asset, false));
        }
        Ok(outcome)
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn emit_compress(&self, event: PipelineEvent) {
        if self.config.show_compress_loading {
            self.emit(event);
        }
    }
}

/// What a run would do with a file, without encoding anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inspection {
    pub orientation: Orientation,
    pub plan: ResamplePlan,
    /// Dimensions of the encoded image after orientation correction.
    pub output: (u32, u32),
    pub warnings: Vec<String>,
}

/// Read orientation and plan the resample for `original`.
pub fn inspect(backend: &impl RasterBackend, original: &[u8]) -> Result<Inspection, PipelineError> {
    let orientation = imaging::read_orientation(original);
    let surface = backend.decode(original)?;
    let (width, height) = surface.dimensions();
    let plan = imaging::plan_resample(width, height);
    let output = if orientation.swaps_dimensions() {
        (plan.outer.height, plan.outer.width)
    } else {
        (plan.outer.width, plan.outer.height)
    };
    Ok(Inspection {
        orientation,
        plan,
        output,
        warnings: operations::source_warnings(width, height),
    })
}
