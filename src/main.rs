use clap::{Parser, Subcommand};
use pixpost::config::{self, DEFAULT_CONFIG_FILE, PipelineConfig};
use pixpost::imaging::RustBackend;
use pixpost::output;
use pixpost::process::{self, Pipeline, PipelineOutcome};
use pixpost::types::SelectedFile;
use pixpost::upload::HttpTransport;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pixpost")]
#[command(about = "Normalize, downsize and upload a single photo")]
#[command(long_about = "\
Normalize, downsize and upload a single photo

A photo goes through four stages:

  read      the file is checked (exactly one image: jpeg, png, gif or bmp)
  orient    the EXIF orientation tag is read from JPEG files
  compress  the image is scaled under 4 megapixels, drawn upright and
            re-encoded as JPEG; the original is kept if that is smaller
  upload    the result is posted as multipart form data

Uploaded files are named <stem>.<hash>.jpg, where the hash is derived from
the uploaded bytes.

Run 'pixpost gen-config' to generate a documented pixpost.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// JPEG quality ratio in (0, 1]
    #[arg(long, global = true)]
    quality: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress a photo and save it without uploading
    Compress {
        /// Photo to compress (exactly one)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory the compressed file is written to
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
    /// Compress a photo and upload it
    Upload {
        /// Photo to upload (exactly one)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Upload endpoint
        #[arg(long)]
        url: Option<String>,

        /// HTTP method: POST or PUT
        #[arg(long)]
        method: Option<String>,

        /// Multipart field name for the image
        #[arg(long)]
        field: Option<String>,

        /// Extra form field, repeatable
        #[arg(long = "data", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        data: Vec<(String, String)>,
    },
    /// Show orientation and resize plan without encoding
    Inspect {
        file: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock pixpost.toml with all options documented
    GenConfig,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{s}`")),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Compress { files, output } => {
            let mut overlay = toml::Table::new();
            overlay.insert("upload".into(), false.into());
            let config = load(&cli.config, cli.quality, overlay)?;

            let outcome = run(config, &files).await?;
            let written = match &outcome {
                Some(PipelineOutcome::Compressed { asset, filename }) => {
                    std::fs::create_dir_all(&output)?;
                    let path = output.join(filename);
                    std::fs::write(&path, &asset.bytes)?;
                    Some(path)
                }
                _ => None,
            };
            Ok(report(outcome.as_ref(), written.as_deref()))
        }
        Command::Upload {
            files,
            url,
            method,
            field,
            data,
        } => {
            let mut transport = toml::Table::new();
            if let Some(url) = url {
                transport.insert("url".into(), url.into());
            }
            if let Some(method) = method {
                transport.insert("method".into(), method.into());
            }
            if let Some(field) = field {
                transport.insert("file_field".into(), field.into());
            }
            if !data.is_empty() {
                let extra: toml::Table = data.into_iter().map(|(k, v)| (k, v.into())).collect();
                transport.insert("extra_fields".into(), extra.into());
            }
            let mut overlay = toml::Table::new();
            overlay.insert("transport".into(), transport.into());
            let config = load(&cli.config, cli.quality, overlay)?;

            let outcome = run(config, &files).await?;
            Ok(report(outcome.as_ref(), None))
        }
        Command::Inspect { file, json } => {
            let bytes = std::fs::read(&file)?;
            let inspection = process::inspect(&RustBackend::new(), &bytes)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&inspection)?);
            } else {
                let name = file.file_name().unwrap_or(file.as_os_str()).to_string_lossy();
                for line in output::format_inspection(&name, &inspection) {
                    println!("{}", line);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Config file, then command-line overrides, merged onto the defaults.
fn load(
    path: &Path,
    quality: Option<f64>,
    mut overlay: toml::Table,
) -> Result<PipelineConfig, config::ConfigError> {
    if let Some(quality) = quality {
        overlay.insert("quality".into(), quality.into());
    }
    let file = config::load_raw_config(path)?;
    config::resolve_config(file.into_iter().chain([toml::Value::Table(overlay)]))
}

/// Run one selection, printing events as they arrive.
///
/// `None` means the pipeline rejected the selection; the error was already
/// logged by the pipeline's error handler.
async fn run(
    config: PipelineConfig,
    files: &[PathBuf],
) -> Result<Option<PipelineOutcome>, Box<dyn std::error::Error>> {
    let transport = HttpTransport::new(&config.transport)?;
    let selection: Vec<SelectedFile> = files.iter().map(|p| SelectedFile::from_path(p)).collect();

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_pipeline_event(&event) {
                println!("{}", line);
            }
        }
    });

    let pipeline = Pipeline::new(config, RustBackend::new(), transport).with_events(tx);
    let result = pipeline.handle_selection(selection).await;
    drop(pipeline);
    printer.join().map_err(|_| "output thread panicked")?;

    Ok(result.ok())
}

fn report(outcome: Option<&PipelineOutcome>, written: Option<&Path>) -> ExitCode {
    let Some(outcome) = outcome else {
        return ExitCode::FAILURE;
    };
    for line in output::format_outcome(outcome, written) {
        println!("{}", line);
    }
    match outcome {
        PipelineOutcome::Compressed { .. }
        | PipelineOutcome::Uploaded { .. }
        | PipelineOutcome::UploadCancelled { .. } => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
