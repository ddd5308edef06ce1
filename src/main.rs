// SPDX-FileCopyrightText: 2025 Manuel Quarneti <mq1@ik.me>
// SPDX-License-Identifier: GPL-2.0-only

use anyhow::Result;
use clap::{Parser, builder::Styles};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use crossterm::style::Stylize;
use prealloc_bench::preallocate::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use prealloc_bench::{BenchConfig, BenchReport, DEFAULT_FILE_NAME, DEFAULT_FILE_SIZE, PAYLOAD};
use std::path::PathBuf;

/// A Rust utility that benchmarks file preallocation.
///
/// This tool grows a file to a fixed size twice: once by moving its
/// end-of-file marker (fast) and once by writing zeroes into it (slow).
/// Each run checks the resulting size and seek offsets, writes a short
/// payload at the start of the file, and is timed.
///
/// The ratio of the fast duration to the slow duration is printed at the end.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about, styles = Styles::styled())]
struct Options {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// The file to create; any existing file at this path is replaced.
    #[arg(name = "FILE", default_value = DEFAULT_FILE_NAME)]
    file: PathBuf,

    /// The size the file is preallocated to, in bytes.
    #[arg(
        long,
        default_value_t = DEFAULT_FILE_SIZE,
        value_parser = clap::value_parser!(u64).range(PAYLOAD.len() as u64..)
    )]
    size: u64,

    /// Chunk size used when zero-filling, in bytes (at most 64 MiB).
    #[arg(
        long,
        default_value_t = DEFAULT_CHUNK_SIZE,
        value_parser = parse_chunk_size
    )]
    chunk_size: usize,

    /// Leave the file on disk after the benchmark.
    #[arg(long)]
    keep: bool,
}

fn main() -> Result<()> {
    let options = Options::parse();

    init_logger(&options.verbose);

    let report = run_benchmark(&options)?;
    print_summary(&report);

    Ok(())
}

/// Initializes the logger with a verbosity level controlled by the `-v` flag.
fn init_logger(verbosity: &Verbosity<InfoLevel>) {
    env_logger::Builder::new()
        .filter_level(verbosity.log_level_filter())
        .format_timestamp_micros()
        .init();
}

fn parse_chunk_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("chunk size must be at least 1 byte".to_string()),
        Ok(n) if n > MAX_CHUNK_SIZE => Err(format!(
            "chunk size must be at most {MAX_CHUNK_SIZE} bytes"
        )),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Runs both preallocation strategies by calling the library function.
fn run_benchmark(options: &Options) -> Result<BenchReport> {
    let config = BenchConfig {
        path: options.file.clone(),
        size: options.size,
        chunk_size: options.chunk_size,
        keep: options.keep,
    };

    log::debug!("Benchmark configuration: {config:?}");

    Ok(prealloc_bench::benchmark(&config)?)
}

fn print_summary(report: &BenchReport) {
    let fast = format!("fast: preallocate took {:?}", report.fast.preallocate);
    let slow = format!("slow: preallocate took {:?}", report.slow.preallocate);

    println!("{}", fast.red().bold());
    println!("{}", slow.red().bold());
    println!("fast took {:.5}x the time it took slow", report.ratio());
}
