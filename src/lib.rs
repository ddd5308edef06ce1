// SPDX-FileCopyrightText: 2025 Manuel Quarneti <mq1@ik.me>
// SPDX-License-Identifier: GPL-2.0-only

//! A Rust library that measures how much faster it is to preallocate a large
//! file by moving its end-of-file marker than by writing zeroes into it.

pub mod preallocate;
mod util;

use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub use preallocate::{Preallocate, SetLen, Strategy, ZeroFill};
pub use util::{format_bytes, remove_if_exists};

// --- Constants ---

/// The file created in the working directory when no path is given.
pub const DEFAULT_FILE_NAME: &str = "test.dat";

/// The default target size: 512 MiB.
pub const DEFAULT_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Written at the start of the preallocated file to check it is usable.
pub const PAYLOAD: &[u8] = b"hello!";

// --- Error Handling ---

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("expected size to be {expected} {stage}, got {actual}")]
    UnexpectedSize {
        stage: &'static str,
        expected: u64,
        actual: u64,
    },
    #[error("expected {whence} seek to be {expected}, got {actual}")]
    UnexpectedOffset {
        whence: &'static str,
        expected: u64,
        actual: u64,
    },
    #[error("short write: wrote {actual} of {expected} bytes")]
    ShortWrite { expected: usize, actual: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;

fn check_size(stage: &'static str, expected: u64, actual: u64) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(BenchError::UnexpectedSize {
            stage,
            expected,
            actual,
        })
    }
}

fn check_offset(whence: &'static str, expected: u64, actual: u64) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(BenchError::UnexpectedOffset {
            whence,
            expected,
            actual,
        })
    }
}

// --- Configuration ---

/// Parameters of a benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// The file to create, grow and finally remove.
    pub path: PathBuf,
    /// The exact length the file must reach, in bytes.
    pub size: u64,
    /// Chunk size of the zero-fill strategy, in bytes.
    pub chunk_size: usize,
    /// Leave the file on disk once the benchmark is over.
    pub keep: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_FILE_NAME),
            size: DEFAULT_FILE_SIZE,
            chunk_size: preallocate::DEFAULT_CHUNK_SIZE,
            keep: false,
        }
    }
}

impl BenchConfig {
    /// Rejects parameters the test sequence cannot verify.
    pub fn validate(&self) -> Result<()> {
        if self.size < PAYLOAD.len() as u64 {
            return Err(BenchError::InvalidConfig(format!(
                "target size {} is smaller than the {}-byte payload",
                self.size,
                PAYLOAD.len()
            )));
        }
        if self.chunk_size == 0 {
            return Err(BenchError::InvalidConfig(
                "chunk size must be at least 1 byte".to_string(),
            ));
        }
        if self.chunk_size > preallocate::MAX_CHUNK_SIZE {
            return Err(BenchError::InvalidConfig(format!(
                "chunk size {} exceeds the {} maximum",
                self.chunk_size,
                format_bytes(preallocate::MAX_CHUNK_SIZE as u64)
            )));
        }
        Ok(())
    }
}

// --- Reports ---

/// Timings and byte counts of one test sequence.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub preallocate: Duration,
    /// Bytes written while preallocating; 0 for [`SetLen`].
    pub preallocated_bytes: u64,
    pub payload_bytes: usize,
    pub write: Duration,
    /// The whole sequence, from removal to final close.
    pub total: Duration,
}

/// Outcome of [`benchmark`].
#[derive(Debug, Clone, Copy)]
pub struct BenchReport {
    pub fast: RunReport,
    pub slow: RunReport,
}

impl BenchReport {
    /// Time taken by the fast sequence as a fraction of the slow one.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.fast.total.as_secs_f64() / self.slow.total.as_secs_f64()
    }
}

// --- Test Sequence ---

/// Creates the file, grows it with `strategy` and verifies the result.
///
/// Any I/O failure or size/offset mismatch aborts the sequence with an error.
/// The file is left on disk, `config.size` bytes long, with [`PAYLOAD`] at
/// its start.
pub fn run_sequence(config: &BenchConfig, strategy: &dyn Preallocate) -> Result<RunReport> {
    let started = Instant::now();
    let path = config.path.as_path();

    debug!("Removing stale file: {}", path.display());
    remove_if_exists(path)?;

    debug!("Creating file: {}", path.display());
    let mut file = File::create(path)?;
    check_size("after create", 0, file.metadata()?.len())?;

    info!("Preallocating {}", strategy.name());
    let before = Instant::now();
    let preallocated_bytes = strategy.preallocate(&mut file, config.size)?;
    let preallocate = before.elapsed();
    info!("Preallocate took {preallocate:?}");

    file.sync_all()?;
    drop(file);
    check_size("after close", config.size, fs::metadata(path)?.len())?;

    debug!("Reopening file: {}", path.display());
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    check_size("after reopen", config.size, file.metadata()?.len())?;

    let end = file.seek(SeekFrom::End(0))?;
    check_offset("end", config.size, end)?;
    let start = file.seek(SeekFrom::Start(0))?;
    check_offset("start", 0, start)?;

    let before = Instant::now();
    let payload_bytes = file.write(PAYLOAD)?;
    if payload_bytes != PAYLOAD.len() {
        return Err(BenchError::ShortWrite {
            expected: PAYLOAD.len(),
            actual: payload_bytes,
        });
    }
    info!("Wrote {payload_bytes} bytes");
    let write = before.elapsed();
    info!("Write took {write:?}");

    check_size("after write", config.size, file.metadata()?.len())?;
    file.sync_all()?;
    drop(file);
    info!("Closed");

    Ok(RunReport {
        preallocate,
        preallocated_bytes,
        payload_bytes,
        write,
        total: started.elapsed(),
    })
}

fn banner(title: &str) {
    info!("");
    info!("========== {title} ==========");
}

fn run_strategy(config: &BenchConfig, strategy: Strategy) -> Result<RunReport> {
    banner(strategy.label());
    let preallocator = strategy.preallocator(config.chunk_size);
    run_sequence(config, preallocator.as_ref())
}

/// Public entry point for the benchmark.
///
/// Runs the test sequence with the fast strategy, then with the slow one,
/// logs the ratio of their durations and removes the file unless
/// `config.keep` is set.
pub fn benchmark(config: &BenchConfig) -> Result<BenchReport> {
    config.validate()?;
    info!("testing with {} file", format_bytes(config.size));

    let fast = run_strategy(config, Strategy::Fast)?;
    let slow = run_strategy(config, Strategy::Slow)?;
    let report = BenchReport { fast, slow };

    banner("stats");
    info!("fast took {:.5}x the time it took slow", report.ratio());

    if config.keep {
        info!("Keeping {}", config.path.display());
    } else {
        remove_if_exists(&config.path)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, size: u64) -> BenchConfig {
        BenchConfig {
            path: dir.path().join(DEFAULT_FILE_NAME),
            size,
            ..BenchConfig::default()
        }
    }

    fn read_file(config: &BenchConfig) -> Vec<u8> {
        let mut data = Vec::new();
        File::open(&config.path)
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        data
    }

    #[test]
    fn default_config_matches_constants() {
        let config = BenchConfig::default();
        assert_eq!(config.path, PathBuf::from("test.dat"));
        assert_eq!(config.size, 536_870_912);
        assert_eq!(config.chunk_size, 16 * 1024);
        assert!(!config.keep);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_target_smaller_than_payload() {
        let config = BenchConfig {
            size: 5,
            ..BenchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let config = BenchConfig {
            chunk_size: 0,
            ..BenchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_oversized_chunk_size() {
        let config = BenchConfig {
            chunk_size: usize::MAX,
            ..BenchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenchError::InvalidConfig(_))
        ));

        let config = BenchConfig {
            chunk_size: preallocate::MAX_CHUNK_SIZE,
            ..BenchConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn offset_mismatch_message_names_the_seek() {
        let err = check_offset("end", 4096, 10).unwrap_err();

        assert!(matches!(
            err,
            BenchError::UnexpectedOffset {
                whence: "end",
                expected: 4096,
                actual: 10,
            }
        ));
        assert_eq!(err.to_string(), "expected end seek to be 4096, got 10");
        check_offset("start", 0, 0).unwrap();
    }

    #[test]
    fn fast_sequence_reaches_target_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, 4 * 1024 * 1024);

        let report = run_sequence(&config, &SetLen).unwrap();

        assert_eq!(report.preallocated_bytes, 0);
        assert_eq!(report.payload_bytes, 6);
        assert_eq!(fs::metadata(&config.path).unwrap().len(), 4 * 1024 * 1024);
    }

    #[test]
    fn slow_sequence_writes_every_byte() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, 1_000_000);

        let report = run_sequence(&config, &ZeroFill::default()).unwrap();

        assert_eq!(report.preallocated_bytes, 1_000_000);
        assert_eq!(report.payload_bytes, 6);
        assert_eq!(fs::metadata(&config.path).unwrap().len(), 1_000_000);
    }

    #[test]
    fn payload_lands_at_start_and_rest_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, 100);

        for strategy in [Strategy::Fast, Strategy::Slow] {
            run_sequence(&config, strategy.preallocator(config.chunk_size).as_ref()).unwrap();

            let data = read_file(&config);
            assert_eq!(data.len(), 100);
            assert_eq!(&data[..6], PAYLOAD);
            assert!(data[6..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn target_equal_to_payload_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, PAYLOAD.len() as u64);

        run_sequence(&config, &ZeroFill::default()).unwrap();
        assert_eq!(read_file(&config), PAYLOAD);
    }

    #[test]
    fn sequence_replaces_a_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, 4096);
        fs::write(&config.path, vec![0xFF; 10_000]).unwrap();

        let report = run_sequence(&config, &ZeroFill::new(1000)).unwrap();

        assert_eq!(report.preallocated_bytes, 4096);
        let data = read_file(&config);
        assert_eq!(data.len(), 4096);
        assert!(data[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn repeated_runs_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, 64 * 1024);

        for _ in 0..2 {
            run_sequence(&config, &SetLen).unwrap();
            assert_eq!(fs::metadata(&config.path).unwrap().len(), 64 * 1024);
            run_sequence(&config, &ZeroFill::default()).unwrap();
            assert_eq!(fs::metadata(&config.path).unwrap().len(), 64 * 1024);
        }
    }

    #[test]
    fn undersized_preallocation_is_reported() {
        struct Nothing;

        impl Preallocate for Nothing {
            fn name(&self) -> &'static str {
                "not at all"
            }

            fn preallocate(&self, _file: &mut File, _size: u64) -> io::Result<u64> {
                Ok(0)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, 1024);

        let err = run_sequence(&config, &Nothing).unwrap_err();
        assert!(matches!(
            err,
            BenchError::UnexpectedSize {
                stage: "after close",
                expected: 1024,
                actual: 0,
            }
        ));
        assert_eq!(err.to_string(), "expected size to be 1024 after close, got 0");
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = BenchConfig {
            path: dir.path().join("missing").join("test.dat"),
            size: 1024,
            ..BenchConfig::default()
        };

        assert!(matches!(
            run_sequence(&config, &SetLen),
            Err(BenchError::Io(_))
        ));
    }

    #[test]
    fn benchmark_runs_both_strategies_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, 256 * 1024);

        let report = benchmark(&config).unwrap();

        assert_eq!(report.fast.preallocated_bytes, 0);
        assert_eq!(report.slow.preallocated_bytes, 256 * 1024);
        assert!(report.ratio().is_finite());
        assert!(!config.path.exists());
    }

    #[test]
    fn benchmark_keeps_file_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let config = BenchConfig {
            keep: true,
            ..config_in(&dir, 8192)
        };

        benchmark(&config).unwrap();

        assert_eq!(fs::metadata(&config.path).unwrap().len(), 8192);
    }

    #[test]
    fn slow_sequence_with_large_chunk_on_small_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = BenchConfig {
            chunk_size: preallocate::MAX_CHUNK_SIZE,
            ..config_in(&dir, 100)
        };

        let report = benchmark(&config).unwrap();

        assert_eq!(report.slow.preallocated_bytes, 100);
        assert!(!config.path.exists());
    }

    #[test]
    fn benchmark_validates_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir, 1);

        assert!(benchmark(&config).is_err());
        assert!(!config.path.exists());
    }
}
