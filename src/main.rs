use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use digitizer_pool::grabber::grid::GridLayout;
use digitizer_pool::grabber::manager::DigitizerManager;
use digitizer_pool::operator::FrameOperator;
use digitizer_pool::settings::store::ParamsStore;
use digitizer_pool::settings::types::DebugLevel;
use digitizer_pool::{create_api, BackendChoice, BACKEND_ENV};

/// Probe and exercise the frame-grabber digitizer pool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Vendor adapter: sim, mil or none
    #[arg(long, env = BACKEND_ENV)]
    backend: Option<BackendChoice>,

    /// Raise the log level (-v basic, -vv verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the one-line pool summary
    Summary,

    /// Probe device slots and print the report
    Dump {
        /// Number of slots to probe (1..=256)
        #[arg(long, default_value_t = 64)]
        slots: u32,

        /// Include allocated handles and grab statistics
        #[arg(long)]
        detail: bool,
    },

    /// Grab one frame from a logical camera
    Grab {
        /// Logical camera index
        index: usize,

        /// Frame width in pixels (native width when omitted)
        #[arg(long)]
        width: Option<u32>,

        /// Frame height in pixels (native height when omitted)
        #[arg(long)]
        height: Option<u32>,

        /// Write the RGBA8 bytes to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Compose cameras into a grid canvas
    Grid {
        /// Number of cameras to tile
        #[arg(long, default_value_t = 4)]
        cameras: usize,

        /// Grid columns
        #[arg(long, default_value_t = 2)]
        cols: u32,

        /// Tile size in pixels (width height)
        #[arg(long, value_delimiter = ' ', num_args = 2, default_value = "320 240")]
        tile: Vec<u32>,

        /// Logical index of the first tile
        #[arg(long, default_value_t = 0)]
        first: usize,

        /// Write the RGBA8 canvas to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run one operator cook from a JSON parameter file
    Cook {
        /// Parameter file (defaults are used when it does not exist)
        #[arg(long, default_value = "operator.json")]
        params: PathBuf,

        /// Write the parameters back after normalising them
        #[arg(long)]
        save: bool,
    },

    /// Print grab statistics as JSON after a pass over every camera
    Stats {
        /// Number of logical cameras to grab from
        #[arg(long, default_value_t = 4)]
        cameras: usize,
    },
}

fn init_logging(level: DebugLevel) {
    let default = level.level_filter().as_str().to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn write_frame(path: &Path, data: &[u8], width: u32, height: u32) -> Result<()> {
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    println!("wrote {width}x{height} RGBA8 to {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(DebugLevel::from_index(args.verbose));

    let backend = args.backend.unwrap_or_else(BackendChoice::default_for_build);
    tracing::debug!("Backend: {backend:?}");
    let manager = Arc::new(DigitizerManager::new(create_api(backend)));

    match args.command {
        Command::Summary => {
            if let Err(e) = manager.ensure_system_selected() {
                tracing::warn!("{e}");
            }
            println!("{}", manager.summary_line());
        }
        Command::Dump { slots, detail } => {
            println!("{}", manager.dump_devices(slots, detail));
        }
        Command::Grab {
            index,
            width,
            height,
            out,
        } => {
            let (width, height) = match (width, height) {
                (Some(w), Some(h)) => (w, h),
                (None, None) => {
                    let shape = manager
                        .native_shape(index)
                        .with_context(|| format!("camera {index} has no native size"))?;
                    (shape.width, shape.height)
                }
                _ => bail!("--width and --height must be given together"),
            };
            let data = manager
                .grab(index, width, height)
                .with_context(|| format!("grabbing camera {index}"))?;
            match out {
                Some(path) => write_frame(&path, &data, width, height)?,
                None => println!("camera {index}: {width}x{height}, {} bytes", data.len()),
            }
        }
        Command::Grid {
            cameras,
            cols,
            tile,
            first,
            out,
        } => {
            let &[tile_width, tile_height] = tile.as_slice() else {
                bail!("--tile needs a width and a height");
            };
            let layout =
                GridLayout::for_cameras(cameras, cols, tile_width, tile_height).starting_at(first);
            let canvas = layout.canvas_shape().context("invalid grid layout")?;
            let (data, report) = manager.grab_grid(&layout).context("composing grid")?;
            println!("filled {:?}", report.filled);
            for (index, reason) in &report.failed {
                println!("camera {index} failed: {reason}");
            }
            if let Some(path) = out {
                write_frame(&path, &data, canvas.width, canvas.height)?;
            }
        }
        Command::Cook { params, save } => {
            let store = ParamsStore::new(params);
            let operator = FrameOperator::new(manager.clone());
            let output = operator.cook(&store.get());
            println!(
                "frame {}x{} captured={}",
                output.frame.width, output.frame.height, output.captured
            );
            for (label, text) in [
                ("warning", &output.warning),
                ("error", &output.error),
                ("info", &output.info),
            ] {
                if !text.is_empty() {
                    println!("{label}: {text}");
                }
            }
            if save {
                store
                    .save()
                    .with_context(|| format!("saving {}", store.path().display()))?;
            }
        }
        Command::Stats { cameras } => {
            for index in 0..cameras {
                let shape = match manager.native_shape(index) {
                    Ok(shape) => shape,
                    Err(e) => {
                        tracing::warn!("Camera {index}: {e}");
                        continue;
                    }
                };
                if let Err(e) = manager.grab(index, shape.width, shape.height) {
                    tracing::warn!("Camera {index}: {e}");
                }
            }
            let json = serde_json::to_string_pretty(&manager.stats())
                .context("serialising statistics")?;
            println!("{json}");
        }
    }

    manager.shutdown();
    Ok(())
}
