mod app;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufWriter;

use app::{Cli, check_all, collect_inputs, write_reports};
use config::{RuntimeConfig, Settings};

const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    // Serializing a long and/or chain recurses once per term.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads.unwrap_or(0))
        .stack_size(WORKER_STACK_SIZE)
        .build()
        .context("CLI: Failed to initialize thread pool")?;

    let settings = Settings::load(cli.config.as_deref()).context("CLI: Failed to load settings")?;
    let runtime = RuntimeConfig::resolve(cli.max_depth, cli.max_terms, cli.format, &settings);
    let options = runtime.parse_options();

    let inputs = collect_inputs(&cli, &settings)?;
    if inputs.is_empty() {
        anyhow::bail!("CLI: No filters given; pass them as arguments, --input or in --config");
    }
    tracing::info!(
        "Parsing {} filters (max depth {}, max terms {})",
        inputs.len(),
        options.max_depth,
        options.max_terms
    );

    let start = std::time::Instant::now();
    let reports = pool.install(|| check_all(&inputs, &options));
    let rejected = reports.iter().filter(|report| !report.ok).count();

    pool.install(|| {
        let stdout = std::io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        write_reports(runtime.format, &reports, &mut out)
    })?;

    tracing::info!(
        "Done! {} parsed, {} rejected in {:.3}s",
        reports.len() - rejected,
        rejected,
        start.elapsed().as_secs_f64()
    );

    if rejected > 0 {
        anyhow::bail!("{} of {} filters failed to parse", rejected, reports.len());
    }

    Ok(())
}
