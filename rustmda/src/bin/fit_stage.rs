use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rustmda::config::read_config;
use rustmda::{DiskReadMda, Mda};
use sscore::algorithm::template_provider::MeanTemplateProvider;
use sscore::data::timeseries::{Timeseries, TimeseriesSource};
use sscore::{fit_stage, FitOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "Keep the candidate spikes that best explain the recording", long_about = None)]
struct Cli {
    /// Recording, M x N `.mda`
    #[arg(long)]
    timeseries: PathBuf,

    /// Candidate events, R x L `.mda` (R >= 3)
    #[arg(long)]
    firings: PathBuf,

    /// Kept events, written as float64 `.mda`
    #[arg(long)]
    firings_out: PathBuf,

    /// Also write the per-shell templates used for fitting
    #[arg(long)]
    templates_out: Option<PathBuf>,

    /// JSON file with fit options; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    clip_size: Option<usize>,

    #[arg(long)]
    min_shell_size: Option<usize>,

    #[arg(long)]
    shell_increment: Option<f64>,

    #[arg(long)]
    chunk_size: Option<usize>,

    #[arg(long)]
    overlap_size: Option<usize>,

    /// Worker threads, 0 for one per core
    #[arg(long)]
    num_threads: Option<usize>,

    #[arg(long)]
    min_improvement_fraction: Option<f64>,

    /// Write a JSON run summary here
    #[arg(long)]
    summary_out: Option<PathBuf>,

    /// Load the whole recording into memory instead of reading chunks from disk
    #[arg(long, action = ArgAction::SetTrue)]
    in_memory: bool,

    /// Log kernel passes
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> Result<FitOptions, Box<dyn Error>> {
        let mut opts = match &self.config {
            Some(path) => read_config(path)?,
            None => FitOptions::default(),
        };
        if let Some(v) = self.clip_size {
            opts.clip_size = v;
        }
        if let Some(v) = self.min_shell_size {
            opts.min_shell_size = v;
        }
        if let Some(v) = self.shell_increment {
            opts.shell_increment = v;
        }
        if let Some(v) = self.chunk_size {
            opts.chunk_size = v;
        }
        if let Some(v) = self.overlap_size {
            opts.overlap_size = v;
        }
        if let Some(v) = self.num_threads {
            opts.num_threads = v;
        }
        if self.min_improvement_fraction.is_some() {
            opts.min_improvement_fraction = self.min_improvement_fraction;
        }
        opts.validate()?;
        Ok(opts)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let opts = cli.options()?;
    let firings = Mda::read(&cli.firings)?.into_firings()?;

    let source: Box<dyn TimeseriesSource> = if cli.in_memory {
        let ts: Timeseries = Mda::read(&cli.timeseries)?.into_timeseries()?;
        Box::new(ts)
    } else {
        Box::new(DiskReadMda::open(&cli.timeseries)?)
    };
    info!(
        "{} channels, {} timepoints, {} candidate events",
        source.num_channels(),
        source.num_timepoints(),
        firings.len()
    );

    let out = fit_stage(source.as_ref(), &firings, &MeanTemplateProvider::default(), &opts)?;
    Mda::from_firings(&out.firings).write64(&cli.firings_out)?;

    if let Some(path) = &cli.templates_out {
        Mda::from_templates(&out.templates).write32(path)?;
    }

    if let Some(path) = &cli.summary_out {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &out.summary)?;
    }

    info!(
        "fit stage done in {:.3}s ({} chunks)",
        out.summary.total_secs, out.summary.num_chunks
    );
    Ok(())
}
