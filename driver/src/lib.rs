//! TPC-H Benchmark Driver
//!
//! Loads `dbgen` output into an SQLite database, then runs the TPC-H
//! throughput test: one query stream per the scale factor's stream count plus
//! a single refresh stream, all concurrently, each on its own connection.
//! Process CPU and memory usage are sampled once per second into a `.tsv` log
//! for the whole run.
//!
//! Run the benchmark: `SF=1 cargo run --release`
//! Run tests: `cargo test`

pub mod config;
pub mod coordinator;
pub mod database;
pub mod datafile;
pub mod loader;
pub mod query_stream;
pub mod refresh;
pub mod report;
pub mod sampler;
