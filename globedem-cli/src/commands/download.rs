use anyhow::{Context, Result};
use globedem::{
    Assembler, BuildOptions, BuildTarget, CommandConverter, Converter, DatasetLayout,
    HttpTransport, MirrorTransport, RawConverter, SourceConfig, TiffConverter, TileShape,
    Transport,
};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use crate::ConverterKind;

/// Options of the `download` command.
pub struct DownloadArgs {
    pub target: PathBuf,
    pub split_dir: Option<PathBuf>,
    pub chunk_prefix: Option<String>,
    pub chunks: Option<Vec<String>>,
    pub shape: TileShape,
    pub workspace: Option<PathBuf>,
    pub url_template: Option<String>,
    pub entry_template: Option<String>,
    pub mirror_dir: Option<PathBuf>,
    pub converter: ConverterKind,
    pub jobs: usize,
    pub timeout: u64,
    pub retries: u32,
}

pub fn run(args: DownloadArgs) -> Result<()> {
    let layout = DatasetLayout::viewfinder_15().with_shape(args.shape);
    let codes = args.chunks.unwrap_or_else(|| layout.codes().to_vec());

    let mut source = match args.url_template {
        Some(template) => SourceConfig::with_url_template(template),
        None => SourceConfig::viewfinder_15(),
    };
    if let Some(template) = args.entry_template {
        source = source.with_entry_template(template);
    }
    source = source
        .with_timeout(args.timeout)
        .with_max_retries(args.retries);

    let transport: Box<dyn Transport> = match &args.mirror_dir {
        Some(dir) => Box::new(MirrorTransport::new(dir)),
        None => Box::new(HttpTransport::new(&source).context("Failed to create HTTP client")?),
    };
    let converter: Box<dyn Converter> = match args.converter {
        ConverterKind::Tiff => Box::new(TiffConverter),
        ConverterKind::Raw => Box::new(RawConverter),
        ConverterKind::Imagemagick => Box::new(CommandConverter::imagemagick()),
    };

    let target = match args.split_dir {
        Some(path) => BuildTarget::Directory {
            path,
            prefix: args.chunk_prefix,
        },
        None => BuildTarget::File(args.target),
    };

    // Scratch space defaults to a hidden directory beside the target so
    // the final rename stays on one filesystem.
    let (workspace, _scratch) = match args.workspace {
        Some(dir) => (dir, None),
        None => {
            let dir = tempfile::Builder::new()
                .prefix(".globedem-work-")
                .tempdir_in(parent_dir(target.path()))
                .context("Failed to create workspace")?;
            (dir.path().to_path_buf(), Some(dir))
        }
    };

    let assembler = Assembler::new(source, layout.clone(), transport, converter)
        .context("Invalid source configuration")?;

    println!(
        "Building {} chunk(s) of {} samples into {}",
        codes.len(),
        layout.shape(),
        target.path().display()
    );

    let pb = ProgressBar::new(codes.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("#>-"),
    );

    let report = assembler
        .build(
            &target,
            &codes,
            &workspace,
            &BuildOptions::default().with_jobs(args.jobs),
            |progress| {
                pb.set_position(progress.completed as u64);
                pb.set_message(format!(
                    "chunk {} ({})",
                    progress.code,
                    HumanBytes(progress.bytes)
                ));
            },
        )
        .with_context(|| format!("Failed to build {}", target.path().display()));

    match report {
        Ok(report) => {
            pb.finish_with_message("done");
            println!(
                "Wrote {} chunk(s), {} to {}",
                report.chunks,
                HumanBytes(report.bytes),
                report.target.display()
            );
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("failed");
            Err(e)
        }
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
