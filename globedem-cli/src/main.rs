use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use globedem::{reader::DEFAULT_DATASET_PATH, DatasetReader, ReaderBuilder, TileShape};
use std::path::PathBuf;

mod commands;

/// Global elevation raster CLI tool
#[derive(Parser)]
#[command(name = "globedem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Assembled dataset file
    #[arg(
        short,
        long,
        env = "GLOBEDEM_DATASET",
        default_value = DEFAULT_DATASET_PATH,
        global = true
    )]
    dataset: PathBuf,

    /// Samples per chunk as WxH
    #[arg(
        short,
        long,
        env = "GLOBEDEM_TILE_SHAPE",
        default_value = "14401x10801",
        global = true
    )]
    tile_shape: TileShape,

    /// Comma-separated chunk codes (default: all 24)
    #[arg(long, env = "GLOBEDEM_CHUNKS", global = true)]
    chunks: Option<String>,

    /// Sample value treated as "no data"
    #[arg(long, env = "GLOBEDEM_VOID_VALUE", global = true)]
    void_value: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

/// How extracted payloads are turned into raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConverterKind {
    /// Decode GeoTIFF in-process
    Tiff,
    /// Payload already holds raw big-endian samples
    Raw,
    /// Run ImageMagick `convert`
    Imagemagick,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the source chunks and assemble a dataset
    Download {
        /// Output dataset file (default: --dataset)
        #[arg(conflicts_with = "split_dir")]
        target: Option<PathBuf>,

        /// Write one file per chunk into this directory instead
        #[arg(long)]
        split_dir: Option<PathBuf>,

        /// File name prefix for split output ({prefix}NN.raw)
        #[arg(long, requires = "split_dir")]
        chunk_prefix: Option<String>,

        /// Expected samples per chunk as WxH (default: --tile-shape)
        #[arg(long)]
        expect_resolution: Option<TileShape>,

        /// Scratch directory; must be empty (default: a temporary directory next to the target)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Archive URL template containing {code}
        #[arg(long)]
        url_template: Option<String>,

        /// Archive entry name template containing {code}
        #[arg(long)]
        entry_template: Option<String>,

        /// Read archives from a local mirror instead of the network
        #[arg(long)]
        mirror_dir: Option<PathBuf>,

        /// Payload converter
        #[arg(long, value_enum, default_value = "tiff")]
        converter: ConverterKind,

        /// Chunks fetched and converted concurrently
        #[arg(short, long, default_value = "1")]
        jobs: usize,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "300")]
        timeout: u64,

        /// Retries after a failed transfer
        #[arg(long, default_value = "3")]
        retries: u32,
    },

    /// Query elevation for a single coordinate
    #[command(allow_negative_numbers = true)]
    Query {
        /// Latitude in decimal degrees
        lat: f64,

        /// Longitude in decimal degrees
        lon: f64,

        /// Use bilinear interpolation for sub-sample accuracy
        #[arg(short, long)]
        interpolate: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Render the dataset as an ASCII-art world map
    Ascii {
        /// Output size in characters as WxH
        #[arg(short, long, default_value = "78x25")]
        shape: TileShape,
    },

    /// Display information about the dataset
    Info,
}

impl Cli {
    /// Chunk list given by --chunks, if any.
    fn chunk_list(&self) -> Option<Vec<String>> {
        self.chunks
            .as_deref()
            .map(globedem::chunk::parse_chunk_list)
            .filter(|codes| !codes.is_empty())
    }

    /// Open the dataset described by the global options.
    fn open_dataset(&self) -> Result<DatasetReader> {
        let mut builder = ReaderBuilder::new(&self.dataset).tile_shape(self.tile_shape);
        if let Some(chunks) = self.chunk_list() {
            builder = builder.chunks(chunks);
        }
        if let Some(void) = self.void_value {
            builder = builder.void_value(void);
        }
        let dataset = builder.open().map_err(|e| {
            anyhow::Error::new(e).context(format!(
                "Failed to open dataset {}",
                self.dataset.display()
            ))
        })?;
        Ok(dataset)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "globedem=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Download {
            target,
            split_dir,
            chunk_prefix,
            expect_resolution,
            workspace,
            url_template,
            entry_template,
            mirror_dir,
            converter,
            jobs,
            timeout,
            retries,
        } => commands::download::run(commands::download::DownloadArgs {
            target: target.clone().unwrap_or_else(|| cli.dataset.clone()),
            split_dir: split_dir.clone(),
            chunk_prefix: chunk_prefix.clone(),
            chunks: cli.chunk_list(),
            shape: expect_resolution.unwrap_or(cli.tile_shape),
            workspace: workspace.clone(),
            url_template: url_template.clone(),
            entry_template: entry_template.clone(),
            mirror_dir: mirror_dir.clone(),
            converter: *converter,
            jobs: *jobs,
            timeout: *timeout,
            retries: *retries,
        }),
        Commands::Query {
            lat,
            lon,
            interpolate,
            json,
        } => commands::query::run(&cli.open_dataset()?, *lat, *lon, *interpolate, *json),
        Commands::Ascii { shape } => commands::ascii::run(&cli.open_dataset()?, *shape),
        Commands::Info => commands::info::run(&cli.open_dataset()?),
    }
}
