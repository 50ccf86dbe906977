//! Per-run logger.
//!
//! Each run gets a log file under the logs directory. Every line is also
//! forwarded to `tracing`, so the console shows what the file records.
//! Transcoder stderr goes to a bounded tail buffer and is only written out
//! when a job fails (or always, outside compact mode).

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, MessagePrefix};

/// Logger for one pipeline run.
pub struct RunLogger {
    run_name: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    config: LogConfig,
    tail_buffer: Mutex<VecDeque<String>>,
}

impl RunLogger {
    /// Create the log directory and open `<log_dir>/<run_name>.log`.
    pub fn new(
        run_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
    ) -> std::io::Result<Self> {
        let run_name = run_name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&run_name)));
        let file = File::create(&log_path)?;

        Ok(Self {
            run_name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
        })
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        self.write_line(message);
        emit(level, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log a command about to run.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    pub fn phase(&self, phase_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Phase.format(phase_name));
    }

    pub fn section(&self, section_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Section.format(section_name));
    }

    /// Log a resume decision.
    pub fn skip(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Skip.format(message));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Record a line of transcoder output.
    ///
    /// Always kept in the tail buffer; written to the log only outside
    /// compact mode.
    pub fn output_line(&self, line: &str) {
        {
            let mut buffer = self.tail_buffer.lock();
            if buffer.len() >= self.config.error_tail {
                buffer.pop_front();
            }
            if self.config.error_tail > 0 {
                buffer.push_back(line.to_string());
            }
        }

        if !self.config.compact {
            self.log(LogLevel::Debug, &format!("[stderr] {}", line));
        }
    }

    /// Write the tail buffer out (after a failure).
    pub fn show_tail(&self, header: &str) {
        let buffer = self.tail_buffer.lock();
        if buffer.is_empty() {
            return;
        }

        self.write_line(&format!("[{}/tail]", header));
        for line in buffer.iter() {
            self.write_line(line);
            tracing::error!("  {}", line);
        }
    }

    pub fn clear_tail(&self) {
        self.tail_buffer.lock().clear();
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Flush and release the log file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn write_line(&self, message: &str) {
        let line = if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        };

        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", line);
        }
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        self.close();
    }
}

fn emit(level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!("{}", message),
        LogLevel::Debug => tracing::debug!("{}", message),
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Warn => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }
}

/// Make a string safe to use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_log_file() {
        let dir = tempdir().unwrap();
        let logger = RunLogger::new("run_1", dir.path().join("logs"), LogConfig::default()).unwrap();

        assert!(logger.log_path().exists());
        assert!(logger.log_path().ends_with("logs/run_1.log"));
    }

    #[test]
    fn writes_prefixed_lines() {
        crate::logging::init_test_tracing();
        let dir = tempdir().unwrap();
        let logger = RunLogger::new("run_1", dir.path(), LogConfig::default()).unwrap();

        logger.phase("Concatenate");
        logger.skip("2020_0101_120000_00_a.MP4");
        logger.debug("hidden at info level");
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("=== Concatenate ==="));
        assert!(content.contains("[SKIP] 2020_0101_120000_00_a.MP4"));
        assert!(!content.contains("hidden at info level"));
    }

    #[test]
    fn compact_mode_keeps_output_in_tail_only() {
        let dir = tempdir().unwrap();
        let mut config = LogConfig::default();
        config.error_tail = 3;

        let logger = RunLogger::new("run_1", dir.path(), config).unwrap();
        for i in 0..5 {
            logger.output_line(&format!("frame {}", i));
        }
        logger.flush();

        let tail: Vec<String> = logger.tail_buffer.lock().iter().cloned().collect();
        assert_eq!(tail, vec!["frame 2", "frame 3", "frame 4"]);
        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(!content.contains("frame"));

        logger.show_tail("ffmpeg");
        logger.flush();
        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("[ffmpeg/tail]"));
        assert!(content.contains("frame 4"));
        assert!(!content.contains("frame 1"));
    }

    #[test]
    fn sanitizes_filename() {
        assert_eq!(sanitize_filename("run_2020-01-01"), "run_2020-01-01");
        assert_eq!(sanitize_filename("has/slash"), "has_slash");
        assert_eq!(sanitize_filename("12:00:00"), "12_00_00");
    }
}
