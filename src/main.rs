use std::{fs::File, path::PathBuf};
use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use log::*;

use dxanalyze::{datafiles, farm, report, timeconv, ReportConfig};
use dxanalyze::datafiles::FileSource;

#[derive(Debug, Subcommand)]
enum Mode
{
    /// Charts for one engine from exported analytic files
    Offline {
        /// Directory with the exported analytic files
        #[arg(short = 'd', long, value_name = "directory")]
        datadir: PathBuf,
        /// File prefix: <prefix>-analytics-<analytic>-raw.csv
        #[arg(short = 'f', long, value_name = "prefix")]
        file_prefix: String,
        /// Use the same throughput and latency scale for all analytics
        #[arg(short = 's', long)]
        syncy: bool,
        /// Timezone of the engine for json files, UTC or GMT+hh:mm
        #[arg(short = 't', long, value_name = "timezone", default_value = "UTC")]
        timezone: String,
    },
    /// Capacity chart for a farm of engines from aggregated analytic files
    Farm {
        /// Directory with <engine>-analytics-(cpu|network)-aggregated.csv files
        #[arg(short = 'd', long, value_name = "directory")]
        datadir: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[clap(version, about, long_about = None)]
pub struct Opts
{
    /// Output directory for the charts
    #[arg(short = 'o', long, value_name = "directory", default_value = ".")]
    out_directory: PathBuf,
    /// Debug logging
    #[arg(long)]
    debug: bool,
    /// Write the log to a file instead of stderr
    #[arg(short = 'l', long, value_name = "file")]
    logfile: Option<PathBuf>,
    /// Parallel
    #[arg(short = 'p', long, value_name = "parallel", default_value = "3")]
    parallel: usize,
    #[command(subcommand)]
    mode: Mode,
}

fn init_logging(args: &Opts) -> Result<()>
{
    let mut builder = env_logger::Builder::from_default_env();
    if args.debug
    {
        builder.filter_level(LevelFilter::Debug);
    }
    if let Some(logfile) = &args.logfile
    {
        let file = File::create(logfile).with_context(|| format!("can't create log file {}", logfile.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<()>
{
    let args = Opts::parse();
    init_logging(&args)?;

    let config = ReportConfig {
        out_directory: args.out_directory.clone(),
        sync_y: matches!(args.mode, Mode::Offline { syncy: true, .. }),
        parallel: args.parallel.max(1),
    };
    debug!("{:?}", config);

    match &args.mode
    {
        Mode::Offline { datadir, file_prefix, timezone, .. } => {
            let offset = timeconv::parse_timezone(timezone)?;
            let source = FileSource::open(datadir, file_prefix, offset)?;
            info!("analytics available: {:?}", source.available_analytics());
            let charts = report::generate_report(&source, &config)
                .with_context(|| format!("report for {} in {}", file_prefix, datadir.display()))?;
            info!("{} charts written to {}", charts.len(), config.out_directory.display());
        },
        Mode::Farm { datadir } => {
            datafiles::ensure_writable(&config.out_directory)?;
            let files = datafiles::find_farm_files(datadir)?;
            let summary = farm::generate_farm_summary(&files)?;
            if let Some(path) = farm::render_farm_chart(&summary, &config.out_directory)?
            {
                info!("farm chart written to {}", path.display());
            }
        },
    }
    Ok(())
}
