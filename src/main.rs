use clap::{Parser, Subcommand};
use idframe::config::{self, DEFAULT_CONFIG_FILE, PipelineConfig};
use idframe::error::BatchError;
use idframe::imaging::locator_from_config;
use idframe::process::{self, CancelFlag};
use idframe::types::{ArtifactInput, ProcessingOptions, ProcessingRequest};
use idframe::{output, sniff};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    if env!("IDFRAME_RELEASE_TAG") == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("IDFRAME_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "idframe")]
#[command(about = "Frame ID photos: find the face, fix the orientation, crop to 360x480")]
#[command(long_about = "\
Frame ID photos: find the face, fix the orientation, crop to 360x480

Inputs may be JPEG or PNG images, PDFs (page 1 is used), or ZIP bundles of
images. The file type is read from the file's contents, not its extension.

Every input image is probed in all four orientations; the one where the face
detector is most confident wins. The crop keeps a margin around the face and
is resized to exactly the output size. Images without a detectable face are
center-cropped and reported with a warning.

One item produces a single image; several produce a ZIP archive.

Run 'idframe gen-config' to generate a documented idframe.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Log pipeline internals to stderr (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ProcessArgs {
    /// Images, PDFs, or ZIP bundles, in the order they should be processed
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Directory the output image or archive is written to
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Config file (default: ./idframe.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Margin around the face, as a fraction of the face size
    #[arg(long)]
    margin: Option<f64>,

    /// Name of the output archive for multi-item batches
    #[arg(long)]
    archive_name: Option<String>,

    /// Print the JSON response instead of progress lines
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Crop and resize every face photo in the given files
    Process(ProcessArgs),
    /// Report the detected type of each file
    Sniff {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print a stock idframe.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Process(args) => run_process(args)?,
        Command::Sniff { files } => {
            for path in files {
                let bytes = std::fs::read(&path)?;
                println!(
                    "{}",
                    output::format_sniff(&path.display().to_string(), sniff::sniff(&bytes))
                );
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Diagnostics go to stderr so stdout stays clean for progress or JSON.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_pipeline_config(explicit: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    match explicit {
        Some(path) if !path.exists() => {
            Err(format!("config file not found: {}", path.display()).into())
        }
        Some(path) => Ok(config::load_config(path)?),
        None => Ok(config::load_config(Path::new(DEFAULT_CONFIG_FILE))?),
    }
}

fn run_process(args: ProcessArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_pipeline_config(args.config.as_deref())?;
    let locator = locator_from_config(&config.detection)?;

    let artifacts = args
        .files
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(ArtifactInput::new(name, std::fs::read(path)?))
        })
        .collect::<Result<Vec<_>, std::io::Error>>()?;
    let request = ProcessingRequest {
        artifacts,
        options: ProcessingOptions {
            margin_ratio: args.margin,
            archive_name: args.archive_name,
            ..Default::default()
        },
    };

    let outcome = if args.json {
        process::process_batch(request, &config, locator.as_ref())
    } else {
        let (tx, rx) = std::sync::mpsc::channel();
        let printer = std::thread::spawn(move || {
            for event in rx {
                for line in output::format_item_event(&event) {
                    println!("{}", line);
                }
            }
        });
        let outcome = process::process_batch_with_events(
            request,
            &config,
            locator.as_ref(),
            &CancelFlag::new(),
            Some(&tx),
        );
        drop(tx);
        printer.join().ok();
        outcome
    };

    if args.json {
        let response = process::build_response(&outcome);
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    match outcome {
        Ok(result) => {
            std::fs::create_dir_all(&args.out)?;
            let path = args.out.join(result.output.filename());
            std::fs::write(&path, result.output.bytes())?;
            if !args.json {
                output::print_summary(&result);
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
        Err(BatchError::AllItemsFailed { logs, .. }) => {
            if !args.json {
                for line in &logs {
                    eprintln!("{line}");
                }
            }
            Err(BatchError::AllItemsFailed {
                logs,
                items: Vec::new(),
            }
            .into())
        }
        Err(other) => Err(other.into()),
    }
}
