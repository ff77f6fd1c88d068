//! Pipeline configuration module.
//!
//! Handles loading, merging, and sanitizing `pixpost.toml`. Stock defaults
//! are the base layer; a config file and then command-line flags are merged
//! on top, and the merged result is sanitized field by field.
//!
//! ## Configuration Options
//!
//! ```toml
//! # Every key is optional; the values below are the defaults
//!
//! quality = 1.0                 # JPEG quality ratio in (0, 1]
//! upload = true                 # false stops after compression
//! show_compress_loading = true  # emit compress progress events
//! show_upload_loading = true    # emit upload progress events
//!
//! [transport]
//! url = ""                      # upload endpoint (required to upload)
//! method = "POST"               # POST or PUT
//! file_field = "file"           # multipart field carrying the image
//!
//! [transport.extra_fields]      # extra multipart text fields
//! album = "holidays"
//! ```
//!
//! ## Sanitizing
//!
//! Values of the wrong type (`quality = "high"`) and values that fail their
//! rule (quality outside `(0, 1]`, an empty URL, a method other than
//! POST/PUT, an empty field name) are reset to their default instead of
//! failing the load. The names of reset fields
//! are returned so the caller can log them.
//!
//! Unknown keys are an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "pixpost.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Pipeline configuration loaded from `pixpost.toml`.
///
/// All fields have defaults; config files need only specify the values
/// they want to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// JPEG quality ratio in `(0, 1]`.
    pub quality: f64,
    /// Upload after compressing.
    pub upload: bool,
    /// Emit compress start/finish events.
    pub show_compress_loading: bool,
    /// Emit upload progress events.
    pub show_upload_loading: bool,
    pub transport: TransportConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality: 1.0,
            upload: true,
            show_compress_loading: true,
            show_upload_loading: true,
            transport: TransportConfig::default(),
        }
    }
}

/// Upload endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    pub url: String,
    /// `POST` or `PUT`, any case on input, upper case after sanitizing.
    pub method: String,
    /// Multipart field name for the image part.
    pub file_field: String,
    /// Extra text fields sent alongside the image.
    pub extra_fields: BTreeMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "POST".to_string(),
            file_field: "file".to_string(),
            extra_fields: BTreeMap::new(),
        }
    }
}

/// A sanitized config plus the dotted names of fields that were reset.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub config: PipelineConfig,
    pub resets: Vec<&'static str>,
}

impl PipelineConfig {
    /// Reset every field that fails its rule to the default value.
    pub fn sanitize(self) -> Sanitized {
        let defaults = PipelineConfig::default();
        let mut resets = Vec::new();
        let mut config = self;

        if !crate::imaging::Quality::is_valid_ratio(config.quality) {
            config.quality = defaults.quality;
            resets.push("quality");
        }
        if config.transport.url.trim().is_empty() {
            // Empty is also the default; only flag it when uploading.
            config.transport.url = defaults.transport.url.clone();
            if config.upload {
                resets.push("transport.url");
            }
        }
        match config.transport.method.to_ascii_uppercase().as_str() {
            m @ ("POST" | "PUT") => config.transport.method = m.to_string(),
            _ => {
                config.transport.method = defaults.transport.method.clone();
                resets.push("transport.method");
            }
        }
        if config.transport.file_field.is_empty() {
            config.transport.file_field = defaults.transport.file_field.clone();
            resets.push("transport.file_field");
        }

        Sanitized { config, resets }
    }
}

// =============================================================================
// Config loading and merging
// =============================================================================

/// Defaults as a TOML table, the bottom layer of every merge.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(PipelineConfig::default())?)
}

/// Layer `overlay` onto `base`.
///
/// Tables merge per key, recursing into nested tables; any other overlay
/// value replaces the base value. Base keys the overlay does not mention
/// survive.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// TOML shape a known field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Float,
    Bool,
    Str,
    Table,
    /// Table whose values are all strings.
    StrMap,
}

impl FieldKind {
    fn accepts(self, value: &toml::Value) -> bool {
        match self {
            FieldKind::Float => value.is_float(),
            FieldKind::Bool => value.is_bool(),
            FieldKind::Str => value.is_str(),
            FieldKind::Table => value.is_table(),
            FieldKind::StrMap => value
                .as_table()
                .is_some_and(|t| t.values().all(toml::Value::is_str)),
        }
    }
}

/// Every known field, parents before children.
const TYPED_FIELDS: &[(&str, FieldKind)] = &[
    ("quality", FieldKind::Float),
    ("upload", FieldKind::Bool),
    ("show_compress_loading", FieldKind::Bool),
    ("show_upload_loading", FieldKind::Bool),
    ("transport", FieldKind::Table),
    ("transport.url", FieldKind::Str),
    ("transport.method", FieldKind::Str),
    ("transport.file_field", FieldKind::Str),
    ("transport.extra_fields", FieldKind::StrMap),
];

fn value_at<'a>(root: &'a toml::Value, path: &str) -> Option<&'a toml::Value> {
    path.split('.').try_fold(root, |value, key| value.get(key))
}

fn value_at_mut<'a>(root: &'a mut toml::Value, path: &str) -> Option<&'a mut toml::Value> {
    path.split('.').try_fold(root, |value, key| value.get_mut(key))
}

/// Replace known fields holding the wrong TOML type with their default.
///
/// Integers are accepted where a float is expected. Returns the dotted
/// names of replaced fields. Unknown keys are left for deserialization to
/// reject.
fn reset_mistyped(merged: &mut toml::Value, defaults: &toml::Value) -> Vec<&'static str> {
    let mut resets = Vec::new();
    for &(path, kind) in TYPED_FIELDS {
        let Some(value) = value_at_mut(merged, path) else {
            continue;
        };
        if let (FieldKind::Float, Some(int)) = (kind, value.as_integer()) {
            *value = toml::Value::Float(int as f64);
        }
        if kind.accepts(value) {
            continue;
        }
        if let Some(default) = value_at(defaults, path) {
            *value = default.clone();
            resets.push(path);
        }
    }
    resets
}

/// Merge overlays in order onto the stock defaults and sanitize, keeping
/// the names of every field that was reset.
///
/// A field of the wrong type is reset like a field failing its rule.
pub fn resolve_sanitized(
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<Sanitized, ConfigError> {
    let defaults = stock_defaults_value()?;
    let mut merged = overlays.into_iter().fold(defaults.clone(), merge_toml);
    let mut resets = reset_mistyped(&mut merged, &defaults);
    let config: PipelineConfig = merged.try_into()?;

    let sanitized = config.sanitize();
    for field in sanitized.resets {
        if !resets.contains(&field) {
            resets.push(field);
        }
    }
    Ok(Sanitized {
        config: sanitized.config,
        resets,
    })
}

/// Merge overlays in order onto the stock defaults, then sanitize.
///
/// Reset fields are logged with `log::warn!`.
pub fn resolve_config(
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<PipelineConfig, ConfigError> {
    let Sanitized { config, resets } = resolve_sanitized(overlays)?;
    for field in resets {
        log::warn!("config field `{}` is invalid, using its default", field);
    }
    Ok(config)
}

/// Load config from the TOML file at `path`; a missing file means defaults.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock `pixpost.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixpost configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Invalid values (quality outside (0, 1], an unknown method, an empty
# field name) are reset to their default with a warning.
# Unknown keys will cause an error.

# JPEG quality as a ratio in (0, 1]. 1.0 is the encoder's best quality.
quality = 1.0

# Upload after compressing. With false, `pixpost upload` only compresses.
upload = true

# Print "Compressing" / "Compressing complete" while encoding.
show_compress_loading = true

# Print "Uploading N%" while sending.
show_upload_loading = true

# ---------------------------------------------------------------------------
# Upload endpoint
# ---------------------------------------------------------------------------
[transport]
# Endpoint receiving the multipart form. Required to upload.
url = ""

# HTTP method: POST or PUT.
method = "POST"

# Multipart field carrying the image. The part's filename is
# <original-stem>.<content-hash>.jpg
file_field = "file"

# Extra text fields sent with every upload.
[transport.extra_fields]
# album = "holidays"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn overlay(src: &str) -> toml::Value {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn default_config_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.quality, 1.0);
        assert!(config.upload);
        assert!(config.show_compress_loading);
        assert!(config.show_upload_loading);
        assert_eq!(config.transport.method, "POST");
        assert_eq!(config.transport.file_field, "file");
        assert!(config.transport.extra_fields.is_empty());
    }

    #[test]
    fn parse_partial_config() {
        let config: PipelineConfig = toml::from_str("quality = 0.8").unwrap();
        assert_eq!(config.quality, 0.8);
        assert!(config.upload);
        assert_eq!(config.transport.file_field, "file");
    }

    #[test]
    fn parse_transport_with_extra_fields() {
        let toml = r#"
[transport]
url = "https://example.test/upload"
method = "put"

[transport.extra_fields]
album = "holidays"
token = "abc"
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.transport.url, "https://example.test/upload");
        assert_eq!(config.transport.method, "put");
        assert_eq!(config.transport.extra_fields["album"], "holidays");
        assert_eq!(config.transport.extra_fields.len(), 2);
    }

    // =========================================================================
    // sanitize tests
    // =========================================================================

    fn uploading(url: &str) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.transport.url = url.to_string();
        config
    }

    #[test]
    fn sanitize_accepts_valid_config() {
        let Sanitized { config, resets } = uploading("http://x.test/").sanitize();
        assert!(resets.is_empty());
        assert_eq!(config, uploading("http://x.test/"));
    }

    #[test]
    fn sanitize_resets_out_of_range_quality() {
        for bad in [0.0, -1.0, 1.01, f64::NAN, f64::INFINITY] {
            let mut config = uploading("http://x.test/");
            config.quality = bad;
            let out = config.sanitize();
            assert_eq!(out.config.quality, 1.0);
            assert_eq!(out.resets, vec!["quality"]);
        }
    }

    #[test]
    fn sanitize_keeps_quality_boundary() {
        let mut config = uploading("http://x.test/");
        config.quality = 1.0;
        assert!(config.sanitize().resets.is_empty());
    }

    #[test]
    fn sanitize_normalizes_method_case() {
        let mut config = uploading("http://x.test/");
        config.transport.method = "put".to_string();
        let out = config.sanitize();
        assert_eq!(out.config.transport.method, "PUT");
        assert!(out.resets.is_empty());
    }

    #[test]
    fn sanitize_resets_unknown_method() {
        let mut config = uploading("http://x.test/");
        config.transport.method = "PATCH".to_string();
        let out = config.sanitize();
        assert_eq!(out.config.transport.method, "POST");
        assert_eq!(out.resets, vec!["transport.method"]);
    }

    #[test]
    fn sanitize_resets_empty_file_field() {
        let mut config = uploading("http://x.test/");
        config.transport.file_field.clear();
        let out = config.sanitize();
        assert_eq!(out.config.transport.file_field, "file");
        assert_eq!(out.resets, vec!["transport.file_field"]);
    }

    #[test]
    fn sanitize_flags_missing_url_only_when_uploading() {
        assert_eq!(uploading("  ").sanitize().resets, vec!["transport.url"]);

        let mut config = PipelineConfig::default();
        config.upload = false;
        assert!(config.sanitize().resets.is_empty());
    }

    #[test]
    fn sanitize_reports_every_reset_field() {
        let mut config = uploading("");
        config.quality = 5.0;
        config.transport.method = "GET".to_string();
        config.transport.file_field.clear();
        let out = config.sanitize();
        assert_eq!(
            out.resets,
            vec![
                "quality",
                "transport.url",
                "transport.method",
                "transport.file_field"
            ]
        );
    }

    // =========================================================================
    // merge / resolve tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let merged = merge_toml(overlay("quality = 1.0"), overlay("quality = 0.5"));
        assert_eq!(merged.get("quality").unwrap().as_float(), Some(0.5));
    }

    #[test]
    fn merge_toml_preserves_nested_base_keys() {
        let base = overlay("[transport]\nurl = \"a\"\nmethod = \"PUT\"");
        let merged = merge_toml(base, overlay("[transport]\nurl = \"b\""));
        let transport = merged.get("transport").unwrap();
        assert_eq!(transport.get("url").unwrap().as_str(), Some("b"));
        assert_eq!(transport.get("method").unwrap().as_str(), Some("PUT"));
    }

    #[test]
    fn resolve_config_applies_overlays_in_order() {
        let config = resolve_config([
            overlay("quality = 0.6\n[transport]\nurl = \"http://file.test/\""),
            overlay("quality = 0.9"),
        ])
        .unwrap();
        assert_eq!(config.quality, 0.9);
        assert_eq!(config.transport.url, "http://file.test/");
    }

    #[test]
    fn resolve_config_sanitizes() {
        let config = resolve_config([overlay("quality = 3.0\nupload = false")]).unwrap();
        assert_eq!(config.quality, 1.0);
    }

    #[test]
    fn unknown_key_rejected() {
        let result = resolve_config([overlay("ratio = 0.5")]);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_nested_key_rejected() {
        let result = resolve_config([overlay("[transport]\nxhr = true")]);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // Mistyped fields
    // =========================================================================

    #[test]
    fn wrong_type_is_reset_and_reported() {
        let Sanitized { config, resets } =
            resolve_sanitized([overlay("quality = \"high\"\nupload = false")]).unwrap();
        assert_eq!(config.quality, 1.0);
        assert!(!config.upload);
        assert_eq!(resets, vec!["quality"]);
    }

    #[test]
    fn wrong_type_does_not_fail_resolve_config() {
        let config = resolve_config([overlay("upload = \"yes\"")]).unwrap();
        assert!(config.upload);
    }

    #[test]
    fn mistyped_transport_fields_are_reset() {
        let src = r#"
upload = false

[transport]
url = 5
method = true
file_field = "photo"

[transport.extra_fields]
album = 3
"#;
        let Sanitized { config, resets } = resolve_sanitized([overlay(src)]).unwrap();
        assert_eq!(config.transport, TransportConfig {
            file_field: "photo".to_string(),
            ..TransportConfig::default()
        });
        assert_eq!(
            resets,
            vec!["transport.url", "transport.method", "transport.extra_fields"]
        );
    }

    #[test]
    fn transport_that_is_not_a_table_is_reset() {
        let Sanitized { config, resets } =
            resolve_sanitized([overlay("upload = false\ntransport = \"http://x.test/\"")]).unwrap();
        assert_eq!(config.transport, TransportConfig::default());
        assert_eq!(resets, vec!["transport"]);
    }

    #[test]
    fn integer_quality_is_accepted() {
        let Sanitized { config, resets } =
            resolve_sanitized([overlay("quality = 1\nupload = false")]).unwrap();
        assert_eq!(config.quality, 1.0);
        assert!(resets.is_empty());
    }

    #[test]
    fn type_reset_is_reported_once() {
        // A mistyped url is reset by type and would fail the non-empty rule too.
        let Sanitized { resets, .. } =
            resolve_sanitized([overlay("[transport]\nurl = false")]).unwrap();
        assert_eq!(resets, vec!["transport.url"]);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        fs::write(
            &path,
            r#"
quality = 0.75
show_upload_loading = false

[transport]
url = "http://localhost:8080/upload"
file_field = "photo"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.quality, 0.75);
        assert!(!config.show_upload_loading);
        assert_eq!(config.transport.file_field, "photo");
        assert_eq!(config.transport.method, "POST");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pixpost.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: PipelineConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        assert!(content.contains("[transport]"));
        assert!(content.contains("[transport.extra_fields]"));
    }

    #[test]
    fn stock_defaults_value_has_all_keys() {
        let val = stock_defaults_value().unwrap();
        assert!(val.is_table());
        for key in ["quality", "upload", "show_compress_loading", "transport"] {
            assert!(val.get(key).is_some(), "missing {key}");
        }
    }
}
