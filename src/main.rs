// AssetLens - main.rs
//
// Command-line front end. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation
// 3. One pipeline run over a directory: discovery, Info enrichment and
//    optional thumbnails, paged through the queue as a scrolling view would
// 4. Printing the finished rows

use assetlens::app::pipeline::{Pipeline, PipelineConfig};
use assetlens::app::sidecar::{JsonSidecar, SidecarStore};
use assetlens::core::dataset::DataSet;
use assetlens::core::discovery::DirectorySource;
use assetlens::core::model::{Category, DataKind, DataSetKey, SortKey, ThumbnailState};
use assetlens::platform::config::{self, PlatformPaths};
use assetlens::util::{constants, logging};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Longest wait for one batch of enrichment work.
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    File,
    Sequence,
}

impl From<KindArg> for DataKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::File => DataKind::File,
            KindArg::Sequence => DataKind::Sequence,
        }
    }
}

/// AssetLens - asset browser item-loading pipeline.
///
/// Lists the files (or collapsed image sequences) under a directory with
/// their size, date and sidecar metadata, optionally generating thumbnails.
#[derive(Parser, Debug)]
#[command(name = "assetlens", version, about)]
struct Cli {
    /// Location to browse.
    path: PathBuf,

    /// Task subdirectory under the location.
    #[arg(short = 't', long = "task", default_value = "")]
    task: String,

    /// Show individual files or collapsed sequences.
    #[arg(short = 'k', long = "kind", value_enum, default_value = "file")]
    kind: KindArg,

    /// Sort column: name, modified, size or type.
    #[arg(short = 's', long = "sort")]
    sort: Option<String>,

    #[arg(long = "descending")]
    descending: bool,

    /// Generate thumbnails for every row.
    #[arg(long = "thumbnails")]
    thumbnails: bool,

    /// Sidecar metadata file (defaults to .assetlens.json in the browsed root).
    #[arg(long = "sidecar")]
    sidecar: Option<PathBuf>,

    /// Maximum Records per DataSet.
    #[arg(long = "max-items")]
    max_items: Option<usize>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let (mut app_config, config_warnings) = config::load_config(&platform_paths);

    logging::init(cli.debug, app_config.log_level.as_deref());
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "AssetLens starting"
    );

    if let Some(max_items) = cli.max_items {
        app_config.set_max_items(max_items);
    }
    if let Some(ref sort) = cli.sort {
        match SortKey::parse(sort) {
            Some(key) => app_config.sort.key = key,
            None => {
                eprintln!("Error: unknown sort column '{sort}' (expected name, modified, size or type)");
                std::process::exit(2);
            }
        }
    }
    if cli.descending {
        app_config.sort.descending = true;
    }

    if let Err(e) = run(&cli, PipelineConfig::from(&app_config)) {
        tracing::error!(error = %e, "Run failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli, config: PipelineConfig) -> assetlens::util::error::Result<()> {
    let key = DataSetKey::new(&cli.path, cli.task.as_str(), cli.kind.into());
    let root = key.root();

    let mut builder = Pipeline::builder(config);
    let sidecar_path = cli
        .sidecar
        .clone()
        .unwrap_or_else(|| root.join(constants::SIDECAR_FILE_NAME));
    if sidecar_path.is_file() {
        let sidecar = JsonSidecar::load(&sidecar_path)?;
        tracing::info!(path = %sidecar_path.display(), rows = sidecar.len(), "Sidecar loaded");
        builder = builder.with_sidecar(Arc::new(sidecar) as Arc<dyn SidecarStore>);
    } else if cli.sidecar.is_some() {
        tracing::warn!(path = %sidecar_path.display(), "Sidecar file not found; continuing without");
    }
    let pipeline = builder.build()?;

    let source = DirectorySource::new(&root);
    let report = pipeline.load_with_yield(&key, &source, &mut |accepted| {
        tracing::debug!(accepted, "Discovery progress");
    })?;
    if let Some(ref outcome) = report.outcome {
        for warning in &outcome.warnings {
            tracing::warn!(warning = %warning, "Discovery warning");
        }
    }

    if !pipeline.wait_idle(IDLE_TIMEOUT) {
        tracing::warn!("Info enrichment did not finish in time; printing partial rows");
    }

    let Some(dataset) = pipeline.dataset(&key) else {
        return Ok(());
    };

    if cli.thumbnails {
        // Page through the rows one queue-full at a time, the way a scrolling
        // view feeds the bounded Thumbnail queue.
        let page = pipeline.config().thumbnail.capacity.max(1);
        let mut start = 0;
        while start < dataset.len() {
            let end = (start + page).min(dataset.len());
            pipeline.enqueue_rows(Category::Thumbnail, &key, start..end);
            if !pipeline.wait_idle(IDLE_TIMEOUT) {
                tracing::warn!(start, end, "Thumbnail page did not finish in time");
            }
            start = end;
        }
    }

    print_rows(&dataset, cli.thumbnails);

    if let Some(outcome) = report.outcome {
        if outcome.truncated {
            eprintln!(
                "Note: listing truncated at {} items (use --max-items to raise the limit)",
                dataset.len()
            );
        }
    }
    Ok(())
}

fn print_rows(dataset: &DataSet, thumbnails: bool) {
    for record in dataset.rows() {
        let info = record.info();
        let mut line = format!(
            "{}\t{}\t{}\t{}",
            record.base().display_name,
            info.details,
            info.description,
            record.flags()
        );
        if thumbnails {
            match record.thumbnail() {
                ThumbnailState::Cached(path) => {
                    line.push('\t');
                    line.push_str(&path.display().to_string());
                }
                ThumbnailState::Fallback => line.push_str("\t-"),
                ThumbnailState::Empty => {}
            }
        }
        println!("{line}");
    }
}
