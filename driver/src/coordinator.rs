//! Benchmark coordinator: sampler, load, warm-up, then the timed throughput
//! phase.
//!
//! | Phase      | Work                                           | Timed |
//! |------------|------------------------------------------------|-------|
//! | Load       | schema + 8 tables into the template            | load  |
//! | Copy       | template to a fresh working database           | no    |
//! | Warm-up    | RF1(1), power stream 0, RF2(1)                 | no    |
//! | Throughput | N query streams and 1 refresh stream at once   | yes   |

use crate::config::BenchConfig;
use crate::database::Database;
use crate::datafile::DataFormat;
use crate::loader;
use crate::query_stream::{self, QueryMode, QueryTiming};
use crate::refresh::{RefreshTiming, Refresher};
use crate::report::RunSummary;
use crate::sampler::{self, ResourceSampler, SAMPLE_INTERVAL};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// The data directory does not exist; nothing was started.
#[derive(Debug)]
pub struct MissingDataDir(pub PathBuf);

impl fmt::Display for MissingDataDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data directory {} does not exist, exiting", self.0.display())
    }
}

impl std::error::Error for MissingDataDir {}

pub struct Benchmark {
    config: BenchConfig,
    sample_interval: Duration,
}

impl Benchmark {
    pub fn new(config: BenchConfig) -> Self {
        Self {
            config,
            sample_interval: SAMPLE_INTERVAL,
        }
    }

    /// Sample more or less often than once a second.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Run the whole benchmark and return what was measured.
    ///
    /// Fails with [`MissingDataDir`] before starting anything when the data
    /// directory is absent. Any other failure in the load, warm-up or in a
    /// worker ends the run with that error once every worker has finished.
    pub fn run(&self) -> Result<RunSummary> {
        let config = &self.config;
        let sf = config.scale_factor;
        println!("Running the TPC-H Benchmark on scale factor {sf}");

        if !config.data_dir.is_dir() {
            return Err(MissingDataDir(config.data_dir.clone()).into());
        }

        println!("Scale factor {sf}");
        match config.refresh_format {
            DataFormat::Parquet => println!("Parquet refresh"),
            DataFormat::Tbl => println!("CSV refresh"),
        }

        let log_path = config.log_dir.join(sampler::log_file_name(sf, Utc::now()));
        // Dropping the sampler on any early return stops and joins it.
        let sampler = match sampler::default_probe() {
            Ok(probe) => Some(ResourceSampler::start(&log_path, probe, self.sample_interval)?),
            Err(e) => {
                log::error!("Resource sampling disabled: {e:#}");
                None
            }
        };

        anyhow::ensure!(
            config.template_path != config.database_path,
            "template and working database must be different files ({})",
            config.database_path.display()
        );
        let template = Database::new(&config.template_path, config.busy_timeout);
        let load_duration = self.load_phase(&template)?;

        // Every run refreshes an untouched copy of the template.
        let db = Database::new(&config.database_path, config.busy_timeout);
        template.copy_to(&db)?;
        log::info!(
            "Copied {} to {}",
            template.path().display(),
            db.path().display()
        );

        let db = db.with_wal_autocheckpoint_mib(sf.get());
        let refresher = Refresher::new(&config.data_dir, config.refresh_format);
        let (rf1, power_queries, rf2) = self.warm_up(&db, &refresher)?;

        let streams = sf.streams();
        let refresh_sets = sf.refresh_sets();
        println!("Running {streams} query streams, {refresh_sets} refresh sets");
        log::info!("Starting throughput test");

        let start = Instant::now();
        let (stream_queries, refreshes) =
            run_throughput(&db, &refresher, streams, refresh_sets, config.query_mode)?;
        let throughput_interval = start.elapsed();
        log::info!(
            "Throughput test finished in {:.2}s",
            throughput_interval.as_secs_f64()
        );

        let sample_log = match sampler {
            Some(sampler) => match sampler.stop() {
                Ok(samples) => {
                    log::info!("Wrote {samples} resource samples to {}", log_path.display());
                    Some(log_path)
                }
                Err(e) => {
                    log::error!("Resource sampler failed: {e:#}");
                    None
                }
            },
            None => None,
        };

        Ok(RunSummary {
            scale_factor: sf,
            streams,
            refresh_sets,
            load_duration,
            rf1,
            rf2,
            power_queries,
            stream_queries,
            refreshes,
            throughput_interval,
            sample_log,
        })
    }

    fn load_phase(&self, db: &Database) -> Result<Option<Duration>> {
        let config = &self.config;
        if config.reuse_database && db.exists() {
            println!("Reusing cached template {}", db.path().display());
            return Ok(None);
        }

        println!("Begin loading");
        log::info!(
            "Loading {} into {}",
            config.data_dir.display(),
            db.path().display()
        );
        let report = loader::load(db, &config.schema_path, &config.data_dir, config.checkpoint)?;
        println!("Done loading in {:.1} seconds", report.duration.as_secs_f64());
        log::info!("Loaded {} rows in total", report.total_rows());
        Ok(Some(report.duration))
    }

    /// RF1(1), the power-test stream, then RF2(1), outside the timed region.
    fn warm_up(
        &self,
        db: &Database,
        refresher: &Refresher,
    ) -> Result<(Duration, Vec<QueryTiming>, Duration)> {
        let mut conn = db.connect()?;

        let start = Instant::now();
        refresher.rf1(&mut conn, 1).context("warm-up RF1")?;
        let rf1 = start.elapsed();

        let power_queries = query_stream::run_stream(&conn, 0, self.config.query_mode)
            .context("power test")?;

        let start = Instant::now();
        refresher.rf2(&mut conn, 1).context("warm-up RF2")?;
        let rf2 = start.elapsed();

        log::info!(
            "Warm-up RF1 {:.3}s, RF2 {:.3}s",
            rf1.as_secs_f64(),
            rf2.as_secs_f64()
        );
        Ok((rf1, power_queries, rf2))
    }
}

/// Run query streams `1..=streams` and the refresh stream over units
/// `2..=refresh_sets + 1` concurrently, each on its own connection, and wait
/// for all of them.
fn run_throughput(
    db: &Database,
    refresher: &Refresher,
    streams: usize,
    refresh_sets: u32,
    mode: QueryMode,
) -> Result<(Vec<QueryTiming>, Vec<RefreshTiming>)> {
    thread::scope(|s| {
        let mut query_handles = Vec::with_capacity(streams);
        for stream in 1..=streams {
            let handle = thread::Builder::new()
                .name(format!("query-stream-{stream}"))
                .spawn_scoped(s, move || -> Result<Vec<QueryTiming>> {
                    let conn = db.connect()?;
                    query_stream::run_stream(&conn, stream, mode)
                })
                .context("spawning query stream")?;
            query_handles.push((stream, handle));
        }

        let refresh_handle = thread::Builder::new()
            .name("refresh-stream".into())
            .spawn_scoped(s, move || -> Result<Vec<RefreshTiming>> {
                let mut conn = db.connect()?;
                refresher.run_stream(&mut conn, 2..=refresh_sets + 1)
            })
            .context("spawning refresh stream")?;

        // Join everything before reporting, keeping the first failure.
        let mut first_error = None;
        let mut queries = Vec::new();
        for (stream, handle) in query_handles {
            match join_worker(handle, &format!("query stream {stream}")) {
                Ok(timings) => queries.extend(timings),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        let refreshes = match join_worker(refresh_handle, "refresh stream") {
            Ok(timings) => timings,
            Err(e) => {
                first_error.get_or_insert(e);
                Vec::new()
            }
        };

        match first_error {
            Some(e) => Err(e),
            None => Ok((queries, refreshes)),
        }
    })
}

fn join_worker<T>(handle: thread::ScopedJoinHandle<'_, Result<T>>, name: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("{name} panicked"))?
        .with_context(|| name.to_string())
}
