//! Background resource sampler.
//!
//! A dedicated thread appends one tab-separated record of this process's CPU
//! and memory usage to a log file every interval until it is stopped. The log
//! is flushed after every record so it can be tailed while the benchmark
//! runs. A write failure ends the sampler thread but not the benchmark.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tpch_core::ScaleFactor;

/// Interval between samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Column names of the sampler log.
pub const LOG_COLUMNS: [&str; 6] = [
    "time_offset",
    "cpu_percent",
    "cpu_user",
    "cpu_system",
    "memory_rss",
    "memory_vms",
];

/// Cumulative counters of the current process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessCounters {
    /// User-mode CPU time in seconds.
    pub cpu_user: f64,
    /// Kernel-mode CPU time in seconds.
    pub cpu_system: f64,
    /// Resident set size in bytes.
    pub memory_rss: u64,
    /// Virtual memory size in bytes.
    pub memory_vms: u64,
}

/// Source of process counters.
pub trait ProcessProbe: Send {
    fn read(&mut self) -> Result<ProcessCounters>;
}

/// Reads `/proc/self/stat`.
#[cfg(target_os = "linux")]
pub struct ProcfsProbe {
    ticks_per_second: f64,
    page_size: u64,
}

#[cfg(target_os = "linux")]
impl ProcfsProbe {
    pub fn new() -> Self {
        Self {
            ticks_per_second: procfs::ticks_per_second() as f64,
            page_size: procfs::page_size(),
        }
    }
}

#[cfg(target_os = "linux")]
impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl ProcessProbe for ProcfsProbe {
    fn read(&mut self) -> Result<ProcessCounters> {
        let stat = procfs::process::Process::myself()?.stat()?;
        Ok(ProcessCounters {
            cpu_user: stat.utime as f64 / self.ticks_per_second,
            cpu_system: stat.stime as f64 / self.ticks_per_second,
            memory_rss: stat.rss * self.page_size,
            memory_vms: stat.vsize,
        })
    }
}

/// The probe for the current platform.
pub fn default_probe() -> Result<Box<dyn ProcessProbe>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(ProcfsProbe::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("resource sampling is only supported on Linux")
    }
}

/// CPU utilisation between consecutive samples, as a percentage of one CPU.
///
/// The first sample has nothing to compare against and reports 0.
#[derive(Debug, Default)]
pub struct CpuPercent {
    last: Option<(Duration, f64)>,
}

impl CpuPercent {
    pub fn update(&mut self, elapsed: Duration, cpu_seconds: f64) -> f64 {
        let percent = match self.last {
            Some((prev_elapsed, prev_cpu)) => {
                let wall = elapsed.saturating_sub(prev_elapsed).as_secs_f64();
                if wall > 0.0 {
                    ((cpu_seconds - prev_cpu) / wall * 100.0).max(0.0)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.last = Some((elapsed, cpu_seconds));
        percent
    }
}

/// One line of the sampler log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRecord {
    pub time_offset: Duration,
    pub cpu_percent: f64,
    pub counters: ProcessCounters,
}

impl SampleRecord {
    /// Tab-separated line, without the newline.
    pub fn to_tsv(&self) -> String {
        format!(
            "{:.2}\t{}\t{:.2}\t{:.2}\t{}\t{}",
            self.time_offset.as_secs_f64(),
            self.cpu_percent.round() as u64,
            self.counters.cpu_user,
            self.counters.cpu_system,
            self.counters.memory_rss,
            self.counters.memory_vms
        )
    }
}

/// `log-sf<SF>-<UTC timestamp>.tsv`, with `:` and the space of the timestamp
/// made filesystem-safe.
pub fn log_file_name(sf: ScaleFactor, now: DateTime<Utc>) -> String {
    format!("log-sf{sf}-{}.tsv", now.format("%Y-%m-%dT%H-%M-%S%.6f+00-00"))
}

/// Handle to a running sampler thread.
pub struct ResourceSampler {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<u64>>>,
    path: PathBuf,
}

impl ResourceSampler {
    /// Spawn the sampler thread writing to `path`.
    ///
    /// The log file is created by the sampler thread; failing to create or
    /// write it only ends that thread.
    pub fn start(
        path: impl Into<PathBuf>,
        probe: Box<dyn ProcessProbe>,
        interval: Duration,
    ) -> Result<Self> {
        let path = path.into();
        let stop_flag = Arc::new(AtomicBool::new(false));

        let handle = thread::Builder::new()
            .name("resource-sampler".into())
            .spawn({
                let stop_flag = stop_flag.clone();
                let path = path.clone();
                move || sampler_thread_main(&path, probe, interval, &stop_flag)
            })
            .context("spawning resource sampler thread")?;

        Ok(Self {
            stop_flag,
            handle: Some(handle),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Signal the thread to stop and wait for it.
    ///
    /// Returns the number of records written. The thread notices the stop
    /// flag at its next tick, so this can block for up to one interval.
    pub fn stop(mut self) -> Result<u64> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<u64> {
        self.stop_flag.store(true, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|e| anyhow::anyhow!("resource sampler thread panicked: {e:?}"))?,
            None => Ok(0),
        }
    }
}

impl Drop for ResourceSampler {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Resource sampler failed: {e:#}");
        }
    }
}

fn sampler_thread_main(
    path: &Path,
    mut probe: Box<dyn ProcessProbe>,
    interval: Duration,
    stop_flag: &AtomicBool,
) -> Result<u64> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut log = BufWriter::new(file);
    println!("Logging to {}", path.display());

    writeln!(log, "{}", LOG_COLUMNS.join("\t"))?;
    log.flush()?;

    let start = Instant::now();
    let mut cpu = CpuPercent::default();
    let mut written = 0u64;

    while !stop_flag.load(Ordering::SeqCst) {
        let counters = probe.read()?;
        let time_offset = start.elapsed();
        let cpu_percent = cpu.update(time_offset, counters.cpu_user + counters.cpu_system);
        let record = SampleRecord {
            time_offset,
            cpu_percent,
            counters,
        };
        writeln!(log, "{}", record.to_tsv())
            .and_then(|()| log.flush())
            .with_context(|| format!("writing {}", path.display()))?;
        written += 1;

        thread::sleep(interval);
    }

    Ok(written)
}
