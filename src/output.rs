//! CLI output formatting.
//!
//! Each `format_*` function returns display lines and does no I/O, so the
//! wording is unit tested; `main` prints them. Pipeline events render as a
//! plain-text loading indicator:
//!
//! ```text
//! holiday.jpg (3.2 MB)
//!     Orientation: rotate90-cw
//! Compressing
//! Compressing complete (3.2 MB → 812.4 KB)
//! Uploading 12%
//! Uploading 49%
//! Uploading 100%
//! Uploading complete
//! ```

use crate::process::{Inspection, PipelineEvent, PipelineOutcome, Stage};
use std::path::Path;

/// Human-readable byte count: `512 B`, `1.5 KB`, `3.2 MB`.
fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Format a single pipeline event as display lines.
pub fn format_pipeline_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::FileAccepted { name, bytes } => {
            vec![format!("{} ({})", name, format_bytes(*bytes))]
        }
        PipelineEvent::OrientationDetected { orientation } => {
            let label = serde_json::to_value(orientation)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| orientation.tag().to_string());
            vec![format!("{}Orientation: {}", indent(1), label)]
        }
        PipelineEvent::CompressStarted => vec!["Compressing".to_string()],
        PipelineEvent::CompressFinished {
            original_bytes,
            encoded_bytes,
            fell_back,
        } => {
            let detail = if *fell_back {
                format!("kept original, {}", format_bytes(*original_bytes))
            } else {
                format!(
                    "{} → {}",
                    format_bytes(*original_bytes),
                    format_bytes(*encoded_bytes)
                )
            };
            vec![format!("Compressing complete ({})", detail)]
        }
        PipelineEvent::UploadProgress {
            percent,
            indeterminate,
        } => {
            if *indeterminate {
                vec!["Uploading…".to_string()]
            } else {
                vec![format!("Uploading {}%", percent.floor() as u32)]
            }
        }
        PipelineEvent::UploadFinished { success } => {
            if *success {
                vec!["Uploading complete".to_string()]
            } else {
                vec!["Uploading failed".to_string()]
            }
        }
    }
}

/// Summary lines for a finished run.
///
/// `written` is where the compressed file was saved, if it was.
pub fn format_outcome(outcome: &PipelineOutcome, written: Option<&Path>) -> Vec<String> {
    match outcome {
        PipelineOutcome::Busy => vec!["Busy: a photo is already being processed".to_string()],
        PipelineOutcome::Compressed { asset, filename } => {
            let mut lines = vec![format!("{} ({})", filename, format_bytes(asset.len()))];
            if let Some(path) = written {
                lines.push(format!("{}Saved: {}", indent(1), path.display()));
            }
            lines
        }
        PipelineOutcome::Uploaded { filename, body, .. } => {
            let mut lines = vec![format!("Uploaded {}", filename)];
            if !body.is_empty() {
                lines.push(format!("{}Response: {}", indent(1), body.trim()));
            }
            lines
        }
        PipelineOutcome::UploadFailed {
            filename, failure, ..
        } => {
            let status = failure
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "no response".to_string());
            let mut lines = vec![format!("Upload of {} failed ({})", filename, status)];
            if !failure.body.is_empty() {
                lines.push(format!("{}Response: {}", indent(1), failure.body.trim()));
            }
            lines
        }
        PipelineOutcome::UploadCancelled { filename, .. } => {
            vec![format!("Upload of {} cancelled", filename)]
        }
        PipelineOutcome::Aborted { stage } => {
            let stage = match stage {
                Stage::Compress => "compress",
                Stage::Upload => "upload",
            };
            vec![format!("Stopped before {}", stage)]
        }
    }
}

/// Inspection report for one file.
///
/// ```text
/// IMG_0042.jpg
///     Orientation: 6
///     Source: 4000x3000
///     Output: 1732x2309 (ratio 1.732)
///     Tiles: 2x2 of 1164x876, padding 5
/// ```
pub fn format_inspection(name: &str, report: &Inspection) -> Vec<String> {
    let plan = &report.plan;
    let mut lines = vec![
        name.to_string(),
        format!("{}Orientation: {}", indent(1), report.orientation.tag()),
        format!("{}Source: {}x{}", indent(1), plan.source.0, plan.source.1),
    ];
    if plan.outer.needs_downscale() {
        lines.push(format!(
            "{}Output: {}x{} (ratio {:.3})",
            indent(1),
            report.output.0,
            report.output.1,
            plan.outer.ratio
        ));
    } else {
        lines.push(format!(
            "{}Output: {}x{}",
            indent(1),
            report.output.0,
            report.output.1
        ));
    }
    match &plan.tiles {
        Some(tiles) => lines.push(format!(
            "{}Tiles: {}x{} of {}x{}, padding {}",
            indent(1),
            tiles.count,
            tiles.count,
            tiles.tile_width,
            tiles.tile_height,
            tiles.padding
        )),
        None => lines.push(format!("{}Tiles: none", indent(1))),
    }
    for warning in &report.warnings {
        lines.push(format!("{}Warning: {}", indent(1), warning));
    }
    lines
}
