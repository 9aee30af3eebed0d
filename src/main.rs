use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use winlay::{BatchSummary, BuildingModel, EngineError, IouMethod, WindowOverlay, WindowOverlayConfig};

#[derive(Parser)]
#[command(name = "winlay")]
#[command(about = "Overlay reference window geometry onto building photographs", long_about = None)]
struct Cli {
    /// Data file naming the names files and the building info directory
    #[arg(long, global = true, default_value = "obj.data")]
    data: PathBuf,

    /// Extension of the precomputed detection files next to each image
    #[arg(long, global = true, default_value = "detections")]
    detections_ext: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Draw projected windows on every image in a directory
    Test {
        dir: PathBuf,

        /// Detector confidence threshold
        #[arg(long, default_value_t = 0.2)]
        thresh: f32,

        /// Also write marker debug images
        #[arg(long)]
        show_markers: bool,

        /// Write overlays here instead of next to the images
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Score projected windows against ground-truth quadrangles
    Iou {
        dir: PathBuf,

        /// Detector confidence threshold
        #[arg(long, default_value_t = 0.2)]
        thresh: f32,

        /// Extension of the ground-truth files next to each image
        #[arg(long, default_value = "quads")]
        gt_ext: String,

        #[arg(long, value_enum, default_value_t = IouMethod::Fan)]
        iou_method: IouMethod,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the loaded buildings and surfaces
    Buildings,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    /// One line per image plus the mean
    Text,
    /// JSON summary with per-image results
    Json,
}

fn print_summary(summary: &BatchSummary, format: OutputFormat) -> Result<(), EngineError> {
    match format {
        OutputFormat::Json => println!("{}", summary.to_json()?),
        OutputFormat::Text => {
            for result in &summary.results {
                match (&result.iou, &result.error) {
                    (Some(iou), _) => println!("{}\t{:.4}", result.path.display(), iou),
                    (None, Some(err)) => println!("{}\tfailed: {}", result.path.display(), err),
                    (None, None) => println!("{}\t-", result.path.display()),
                }
            }
            match summary.mean_iou() {
                Some(mean) => println!("mean IoU: {:.4} ({} processed, {} failed)", mean, summary.processed, summary.failed),
                None => println!("mean IoU: n/a ({} processed, {} failed)", summary.processed, summary.failed),
            }
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = WindowOverlayConfig::new(&cli.data);
    config.detections_ext = cli.detections_ext;

    match cli.command {
        Command::Buildings => {
            let model = BuildingModel::from_data_file(&cli.data)?;
            print!("{}", model.describe());
        }
        Command::Test {
            dir,
            thresh,
            show_markers,
            out_dir,
        } => {
            config.detect.thresh = thresh;
            config.detect.show_markers = show_markers;
            let mut overlay = WindowOverlay::new(config)?;
            let summary = overlay.overlay_dir(&dir, out_dir.as_deref())?;
            println!("{} processed, {} failed", summary.processed, summary.failed);
        }
        Command::Iou {
            dir,
            thresh,
            gt_ext,
            iou_method,
            format,
        } => {
            config.detect.thresh = thresh;
            config.eval.iou_method = iou_method;
            let mut overlay = WindowOverlay::new(config)?;
            let summary = overlay.iou_dir(&dir, &gt_ext)?;
            print_summary(&summary, format)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
