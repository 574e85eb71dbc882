//! Log file writer with timestamps
//!
//! [`LogFile`] implements [`::log::Log`], so the crate's `log::debug!` /
//! `log::warn!` records end up in a session file once [`LogFile::install`]
//! has been called. Without an installed logger the records are dropped.

use crate::{Error, Result};
use chrono::{Local, Utc};
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Clone)]
pub struct LogFile {
    inner: Arc<LogFileInner>,
}

struct LogFileInner {
    state: Mutex<LogState>,
    start: Instant,
    path: PathBuf,
    output_to_console: bool,
}

struct LogState {
    writer: BufWriter<File>,
    last_seconds: f32,
}

impl LogFile {
    /// Create a log file at `path`, or `segedit_<timestamp>.log` in the
    /// temp folder when no path is given
    pub fn new(path: Option<&Path>, output_to_console: bool) -> Result<Self> {
        let path = match path {
            Some(path) if !path.as_os_str().is_empty() => path.to_path_buf(),
            _ => env::temp_dir().join(format!(
                "segedit_{}.log",
                Local::now().format("%Y%m%d_%H%M%S")
            )),
        };

        let file = File::create(&path).map_err(|e| {
            Error::OperationFailed(format!("Unable to create file {}: {}", path.display(), e))
        })?;

        let log = Self {
            inner: Arc::new(LogFileInner {
                state: Mutex::new(LogState {
                    writer: BufWriter::new(file),
                    last_seconds: 0.0,
                }),
                start: Instant::now(),
                path,
                output_to_console,
            }),
        };

        log.log(format!("Opened {}", log.path().display()))?;
        log.log("\n----------------------------------------\n")?;
        log.log_time()?;
        log.log(format!("Operating System      {}", env::consts::OS))?;
        log.log(format!("Architecture:         {}", env::consts::ARCH))?;
        log.log("\n----------------------------------------\n")?;

        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn log(&self, message: impl AsRef<str>) -> Result<()> {
        self.inner.log_lines(message.as_ref())
    }

    pub fn log_time(&self) -> Result<()> {
        self.log(format!(
            "Current time (UTC): {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S (UTC)")
        ))?;
        self.log(format!(
            "Current local time: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S (%z)")
        ))?;
        Ok(())
    }

    /// Route `log` records up to `level` into this file.
    ///
    /// Only one logger can be installed per process; a second call fails.
    pub fn install(&self, level: ::log::LevelFilter) -> Result<()> {
        ::log::set_boxed_logger(Box::new(self.clone())).map_err(|e| {
            Error::OperationFailed(format!("Unable to install logger: {}", e))
        })?;
        ::log::set_max_level(level);
        Ok(())
    }
}

impl ::log::Log for LogFile {
    // Filtering happens through the global max level set by `install`.
    fn enabled(&self, _metadata: &::log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &::log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = format!("[{:<5}] {}: {}", record.level(), record.target(), record.args());
        if let Err(err) = self.inner.log_lines(&message) {
            eprintln!("segedit: failed to write log record: {}", err);
        }
    }

    fn flush(&self) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        let _ = state.writer.flush();
    }
}

impl LogFileInner {
    fn log_lines(&self, message: &str) -> Result<()> {
        let seconds = self.start.elapsed().as_secs_f32();

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let diff = seconds - state.last_seconds;
        let prefix = format!("{:7.0}s {:6.1}+ ", seconds, diff);

        for line in message.split('\n') {
            if self.output_to_console {
                println!("{}{}", prefix, line);
            }
            state.writer.write_all(prefix.as_bytes())?;
            state.writer.write_all(line.as_bytes())?;
            state.writer.write_all(b"\n")?;
            state.writer.flush()?;
            state.last_seconds = seconds;
        }

        Ok(())
    }
}

impl Drop for LogFileInner {
    fn drop(&mut self) {
        let _ = self.log_lines("\n----------------------------------------\n");
        let _ = self.log_lines("Closing log file.");
        let _ = self.log_lines("Done.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::log::Log;

    #[test]
    fn test_records_written_with_prefix() {
        let path = env::temp_dir().join(format!("segedit_log_unit_{}.log", std::process::id()));
        let log = LogFile::new(Some(path.as_path()), false).expect("create log file");
        log.log("first\nsecond").expect("write");
        Log::log(
            &log,
            &::log::Record::builder()
                .args(format_args!("claimed {} voxels", 12))
                .level(::log::Level::Error)
                .target("segedit::engine")
                .build(),
        );

        let text = std::fs::read_to_string(&path).expect("read back");
        assert!(text.contains("Opened"));
        assert!(text.lines().any(|l| l.ends_with("first")));
        assert!(text.lines().any(|l| l.ends_with("second")));
        assert!(text.contains("[ERROR] segedit::engine: claimed 12 voxels"));
        assert!(text.lines().all(|l| l.contains("s ") && l.contains("+ ")));
        drop(log);
        let _ = std::fs::remove_file(&path);
    }
}
