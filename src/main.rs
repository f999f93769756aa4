use clap::{Parser, Subcommand};

use ferrous_mapper::pipelines::linear::map_opt::MapCliOptions;
use ferrous_mapper::pipelines::linear::mapper;

#[derive(Parser)]
#[command(name = "ferrous-mapper")]
#[command(about = "FerrousMapper - hash-block read mapper for DNA sequences with IUPAC ambiguity codes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align reads (or read pairs) to reference sequences
    Align(MapCliOptions),
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Align(opts) => {
            // Map verbosity (1=error, 2=warning, 3=info, 4=debug, 5+=trace)
            // to Rust log levels
            let log_level = match opts.verbosity {
                v if v <= 1 => log::LevelFilter::Error,
                2 => log::LevelFilter::Warn,
                3 => log::LevelFilter::Info,
                4 => log::LevelFilter::Debug,
                _ => log::LevelFilter::Trace,
            };

            env_logger::Builder::from_default_env()
                .filter_level(log_level)
                .format_timestamp(None) // Don't show timestamps
                .format_target(false) // Don't show module names
                .init();

            log::info!(
                "Aligning {} against {}",
                opts.queries.display(),
                opts.reference.display()
            );

            // Default to number of CPU cores if not specified
            let mut num_threads = opts.threads.unwrap_or_else(num_cpus::get);
            if num_threads < 1 {
                log::warn!("Invalid thread count {}, using 1 thread", num_threads);
                num_threads = 1;
            }

            // Reasonable upper bound to prevent accidental resource exhaustion
            let max_threads = num_cpus::get() * 2;
            if num_threads > max_threads {
                log::warn!(
                    "Thread count {} exceeds recommended maximum {}, capping at {}",
                    num_threads,
                    max_threads,
                    max_threads
                );
                num_threads = max_threads;
            }

            // Index construction runs on the global rayon pool.
            if let Err(e) = rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global()
            {
                log::warn!(
                    "Failed to configure thread pool: {} (may already be initialized)",
                    e
                );
            }

            if let Err(e) = mapper::main_align(&opts, num_threads) {
                log::error!("{:#}", e);
                std::process::exit(1);
            }
        }
    }
}
