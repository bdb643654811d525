use std::process;
use tpch_driver::config::BenchConfig;
use tpch_driver::coordinator::{Benchmark, MissingDataDir};
use tpch_driver::report;

fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env: {e}");
            process::exit(1);
        }
    }

    let config = BenchConfig::from_env().unwrap_or_else(|e| {
        eprintln!("{e:#}");
        process::exit(1);
    });

    tpch_core::initialize_logger(config.log_level, config.log_file.as_deref()).unwrap_or_else(
        |e| {
            eprintln!("Failed to initialize logger: {e:#}");
            process::exit(1);
        },
    );

    log::info!("Starting TPC-H driver, scale factor {}", config.scale_factor);

    match Benchmark::new(config).run() {
        Ok(summary) => {
            report::print_summary(&summary);
            if let Some(path) = &summary.sample_log {
                log::info!("Resource log written to {}", path.display());
            }
        }
        Err(e) => {
            if let Some(missing) = e.downcast_ref::<MissingDataDir>() {
                println!("{missing}");
            } else {
                log::error!("Benchmark failed: {e:#}");
                eprintln!("Benchmark failed: {e:#}");
            }
            process::exit(1);
        }
    }
}
