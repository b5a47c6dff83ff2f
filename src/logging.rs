//! Tracing setup: console output plus a daily log file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// `<log_dir>/bot_<YYYYMMDD>.log`
pub fn log_file_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!("bot_{}.log", date.format("%Y%m%d")))
}

fn open_log_file(log_dir: &Path, date: NaiveDate) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(log_dir, date))
}

struct OpenLog {
    date: NaiveDate,
    file: File,
}

/// Log file writer that moves on to a new `bot_<YYYYMMDD>.log` when the
/// local date changes.
pub struct DailyLogFile {
    log_dir: PathBuf,
    current: Mutex<OpenLog>,
}

impl DailyLogFile {
    /// Create `log_dir` if needed and open today's file
    pub fn open(log_dir: &Path) -> Result<Self> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let date = Local::now().date_naive();
        let file = open_log_file(log_dir, date).with_context(|| {
            format!(
                "Failed to open log file {}",
                log_file_path(log_dir, date).display()
            )
        })?;

        Ok(Self {
            log_dir: log_dir.to_path_buf(),
            current: Mutex::new(OpenLog { date, file }),
        })
    }

    /// Path of the file currently written to
    pub fn current_path(&self) -> PathBuf {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        log_file_path(&self.log_dir, current.date)
    }

    fn write_on(&self, date: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.date != date {
            let file = open_log_file(&self.log_dir, date)?;
            *current = OpenLog { date, file };
        }
        current.file.write(buf)
    }
}

impl io::Write for &DailyLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_on(Local::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .file
            .flush()
    }
}

/// Install the global subscriber.
///
/// The level comes from `RUST_LOG` and defaults to `info`. With `json` the
/// file layer writes one JSON object per event. Returns the path of today's
/// log file.
pub fn init_logging(log_dir: &Path, json: bool) -> Result<PathBuf> {
    let log_file = Arc::new(DailyLogFile::open(log_dir)?);
    let path = log_file.current_path();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer().with_target(true);
    let file_layer = if json {
        fmt::layer().json().with_writer(log_file).boxed()
    } else {
        fmt::layer().with_ansi(false).with_writer(log_file).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(path)
}
