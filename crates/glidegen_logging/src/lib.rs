//! Shared logging utilities for glidegen binaries.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "glidegen=info,glidegen_remote=info,glidegen_schema=info,glidegen_db=info,glidegen_render=info";
const VERBOSE_LOG_FILTER: &str =
    "glidegen=debug,glidegen_remote=debug,glidegen_schema=debug,glidegen_db=debug,glidegen_render=debug";
const QUIET_CONSOLE_FILTER: &str = "warn,glidegen=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Environment variable overriding the glidegen home directory.
pub const HOME_ENV: &str = "GLIDEGEN_HOME";

/// Logging configuration shared by glidegen binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Widen console output to debug level.
    pub verbose: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// `RUST_LOG`, when set, drives both outputs.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = SharedLog::open(log_dir, config.app_name)
        .context("Failed to initialize rolling log writer")?;

    let from_env = EnvFilter::try_from_default_env().ok();
    let file_filter = match &from_env {
        Some(filter) => filter.clone(),
        None if config.verbose => EnvFilter::new(VERBOSE_LOG_FILTER),
        None => EnvFilter::new(DEFAULT_LOG_FILTER),
    };
    let console_filter = match from_env {
        Some(filter) => filter,
        None if config.verbose => EnvFilter::new(VERBOSE_LOG_FILTER),
        None => EnvFilter::new(QUIET_CONSOLE_FILTER),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.verbose)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Get the glidegen home directory: ~/.glidegen, unless overridden.
pub fn glidegen_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".glidegen"))
        .context("Could not determine home directory; set GLIDEGEN_HOME")
}

/// Get the logs directory: ~/.glidegen/logs
pub fn logs_dir() -> Result<PathBuf> {
    Ok(glidegen_home()?.join("logs"))
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// `<stem>.log` plus numbered predecessors `<stem>.log.1` (newest) up to
/// `<stem>.log.<generations - 1>` (oldest).
struct LogFiles {
    dir: PathBuf,
    stem: String,
    generations: usize,
}

impl LogFiles {
    /// Generation 0 is the file being written.
    fn path(&self, generation: usize) -> PathBuf {
        match generation {
            0 => self.dir.join(format!("{}.log", self.stem)),
            n => self.dir.join(format!("{}.log.{}", self.stem, n)),
        }
    }

    fn open_live(&self) -> io::Result<(File, u64)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(0))?;
        let len = file.metadata()?.len();
        Ok((file, len))
    }

    /// Age every generation by one; the oldest falls off the end.
    fn shift(&self) -> io::Result<()> {
        let last = self.generations.saturating_sub(1);
        if last == 0 {
            return Ok(());
        }
        if self.path(last).exists() {
            fs::remove_file(self.path(last))?;
        }
        for generation in (0..last).rev() {
            let from = self.path(generation);
            if from.exists() {
                fs::rename(&from, self.path(generation + 1))?;
            }
        }
        Ok(())
    }
}

/// Size-capped log file that rotates through [`LogFiles`].
struct RotatingLog {
    files: LogFiles,
    max_bytes: u64,
    live: Option<File>,
    written: u64,
}

impl RotatingLog {
    fn open(dir: PathBuf, app_name: &str, generations: usize, max_bytes: u64) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let files = LogFiles {
            dir,
            stem: sanitize_name(app_name),
            generations: generations.max(1),
        };
        let (live, written) = files.open_live()?;
        let mut log = Self {
            files,
            max_bytes,
            live: Some(live),
            written,
        };
        if log.written > log.max_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut live) = self.live.take() {
            let _ = live.flush();
        }
        self.files.shift()?;
        let (live, written) = self.files.open_live()?;
        self.live = Some(live);
        self.written = written;
        Ok(())
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // a single oversized line still lands in a fresh file
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.roll()?;
        }
        let live = self
            .live
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = live.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.live.as_mut() {
            Some(live) => live.flush(),
            None => Ok(()),
        }
    }
}

/// Shares one [`RotatingLog`] between every event the subscriber formats.
struct SharedLog(Mutex<RotatingLog>);

impl SharedLog {
    fn open(dir: PathBuf, app_name: &str) -> Result<Self> {
        let log = RotatingLog::open(dir, app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", app_name))?;
        Ok(Self(Mutex::new(log)))
    }
}

struct SharedLogWriter<'a>(&'a Mutex<RotatingLog>);

impl SharedLogWriter<'_> {
    fn with_log<T>(&self, f: impl FnOnce(&mut RotatingLog) -> io::Result<T>) -> io::Result<T> {
        let mut log = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        f(&mut log)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLog {
    type Writer = SharedLogWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogWriter(&self.0)
    }
}

impl Write for SharedLogWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_log(|log| log.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_log(|log| log.flush())
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_names_become_safe_file_names() {
        assert_eq!(sanitize_name("glidegen"), "glidegen");
        assert_eq!(sanitize_name("glide gen/../x"), "glide_gen____x");
    }

    #[test]
    fn oversized_logs_rotate_and_old_files_drop_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = RotatingLog::open(dir.path().to_path_buf(), "glidegen", 3, 16).unwrap();

        for line in ["first line 0001\n", "second line 002\n", "third line 0003\n", "fourth line 004\n"] {
            log.write_all(line.as_bytes()).unwrap();
        }
        log.flush().unwrap();

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("glidegen.log"), "fourth line 004\n");
        assert_eq!(read("glidegen.log.1"), "third line 0003\n");
        assert_eq!(read("glidegen.log.2"), "second line 002\n");
        assert!(!dir.path().join("glidegen.log.3").exists());
    }
}
