use fraunhofer::aperture::Registry;
use fraunhofer::config::Config;
use fraunhofer::pipeline;
use fraunhofer::transform::SerialPlanner;
use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::path::PathBuf;
use std::thread;
use tracing::{error, info, Level};



#[derive(Parser)]
#[command(version, about = "Far-field diffraction patterns for a batch of apertures")]
struct Args {
    /// Batch description: grid size, output prefix, tasks and shapes
    config: PathBuf,

    #[arg(short, long, value_name = "N")]
    /// Number of worker threads (defaults to the available parallelism)
    threads: Option<usize>,

    #[arg(short, long, conflicts_with = "quiet")]
    /// Log every step of every shape
    verbose: bool,

    #[arg(short, long)]
    /// Only log warnings and errors, no progress bar
    quiet: bool
}



fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            e.print().ok();
            std::process::exit(1);
        }
    };

    let level = match (args.verbose, args.quiet) {
        (true, _) => Level::DEBUG,
        (_, true) => Level::WARN,
        _ => Level::INFO
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    if let Err(e) = run(&args) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = Config::from_file(&args.config)?;
    let registry = Registry::standard();

    config.check_generators(&registry)?;

    let results_path = config.results_path();
    let results_file = File::create(&results_path)
        .with_context(|| format!("creating {}", results_path.display()))?;

    let threads = pipeline::worker_count(
        args.threads.unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1)),
        config.shapes.len()
    );

    info!("{} shapes of {}x{} from {}", config.shapes.len(), config.nx, config.ny, args.config.display());

    let (tx, rx) = flume::unbounded();
    let template = "{msg} ({elapsed}) [{wide_bar:.cyan/blue}] {pos}/{len} shapes ({eta})";
    let bar = if args.quiet { ProgressBar::hidden() } else { ProgressBar::new(config.shapes.len() as u64) };
    let bar_clone = bar.clone();

    bar.set_style(ProgressStyle::with_template(template)?.progress_chars("#>-"));
    bar.set_message("Simulating");

    let handle = thread::spawn(move || {
        for _ in rx.iter() {
            bar_clone.inc(1);
        }
    });

    // A single worker gets the parallel transforms instead
    let planner = SerialPlanner::new(threads == 1);
    let results = pipeline::run(&config, &registry, &planner, threads, Some(tx));

    handle.join().map_err(|_| anyhow::anyhow!("progress thread panicked"))?;
    bar.finish();

    pipeline::write_results(results_file, &results?)
        .with_context(|| format!("writing {}", results_path.display()))?;

    info!("results written to {}", results_path.display());

    Ok(())
}
