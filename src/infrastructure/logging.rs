//! Queue-fed file logging
//!
//! Producers format lines and push them into a bounded `BlockQueue<String>`;
//! a single writer thread drains the queue into rolling files under the
//! configured directory. A full queue drops the line instead of blocking the
//! caller. Shutdown closes the queue, which lets the writer flush what is
//! buffered and exit.
//!
//! `init_logging` additionally installs a `tracing` subscriber whose fmt
//! layer writes through the same queue. With `enabled = false` only the
//! console layer is installed and no files are created.

use crate::infrastructure::block_queue::{BlockQueue, PushError};
use crate::infrastructure::config::{LogConfig, LogRotation};
use crate::infrastructure::metrics::MetricsCollector;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log sink setup failures
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("log IO error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to install subscriber: {0}")]
    Subscriber(String),
}

/// Cloneable producer side of the sink
#[derive(Clone)]
pub struct LogSender {
    queue: Arc<BlockQueue<String>>,
    metrics: Arc<MetricsCollector>,
}

impl LogSender {
    /// Queue one already-formatted line
    ///
    /// Returns false when the line was dropped (queue full or closed).
    pub fn send(&self, line: String) -> bool {
        match self.queue.push(line) {
            Ok(()) => true,
            Err(PushError::Full(_)) => {
                self.metrics.record_log_dropped();
                false
            }
            Err(PushError::Closed(_)) => false,
        }
    }

    /// Format `[YYYY-MM-DD HH:MM:SS] [level]: message` and queue it
    pub fn write(&self, level: Level, args: fmt::Arguments<'_>) -> bool {
        self.send(format_line(OffsetDateTime::now_utc(), level, args))
    }
}

/// Buffers one formatted event; queued as a single line on drop
pub struct LineWriter {
    sender: LogSender,
    buf: Vec<u8>,
}

impl Write for LineWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            self.sender.send(line);
        }
    }
}

impl<'a> MakeWriter<'a> for LogSender {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            sender: self.clone(),
            buf: Vec::with_capacity(256),
        }
    }
}

/// Bounded-queue log sink with a dedicated writer thread
pub struct LogSink {
    sender: LogSender,
    writer: Option<JoinHandle<()>>,
}

impl LogSink {
    /// Create the log directory, open the first file and start the writer
    pub fn start(config: &LogConfig, metrics: Arc<MetricsCollector>) -> Result<Self, LogError> {
        fs::create_dir_all(&config.directory)?;

        let mut file = SplitFile::open(config)?;
        let queue = Arc::new(BlockQueue::new(config.queue_capacity));
        let drain_queue = Arc::clone(&queue);

        let writer = thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || drain(&drain_queue, &mut file))?;

        Ok(Self {
            sender: LogSender { queue, metrics },
            writer: Some(writer),
        })
    }

    /// Producer handle; also usable as a `tracing_subscriber` writer
    pub fn sender(&self) -> LogSender {
        self.sender.clone()
    }

    /// Queue a formatted line at `level`
    pub fn write(&self, level: Level, args: fmt::Arguments<'_>) -> bool {
        self.sender.write(level, args)
    }

    /// Queue a raw line (a trailing newline is expected)
    pub fn push_line(&self, line: String) -> bool {
        self.sender.send(line)
    }

    /// Lines waiting for the writer
    pub fn pending(&self) -> usize {
        self.sender.queue.len()
    }

    /// Close the queue and wait for the writer to flush everything buffered
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.sender.queue.close();
        if let Some(handle) = self.writer.take() {
            if handle.join().is_err() {
                eprintln!("log writer thread panicked");
            }
        }
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Keeps the global sink alive; dropping it flushes and stops the writer
pub struct LogGuard {
    sink: Option<LogSink>,
}

impl LogGuard {
    /// `None` when file logging is disabled
    pub fn sink(&self) -> Option<&LogSink> {
        self.sink.as_ref()
    }

    /// Explicit shutdown, same as dropping the guard
    pub fn shutdown(self) {
        if let Some(sink) = self.sink {
            sink.shutdown();
        }
    }
}

/// Start the sink and install it as the global `tracing` subscriber
///
/// Returns a guard which must be kept alive for the duration of the program.
///
/// # Errors
/// Fails if the log directory cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(config: &LogConfig, metrics: Arc<MetricsCollector>) -> Result<LogGuard, LogError> {
    let sink = start_sink(config, metrics)?;

    let file_layer = sink.as_ref().map(|sink| {
        tracing_subscriber::fmt::layer()
            .with_writer(sink.sender())
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
    });

    // Console layer for development
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.level))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| LogError::Subscriber(e.to_string()))?;

    if sink.is_some() {
        tracing::info!("Logging initialized. Log files in {}", config.directory.display());
    } else {
        tracing::info!("Logging initialized, file output disabled");
    }

    Ok(LogGuard { sink })
}

fn start_sink(config: &LogConfig, metrics: Arc<MetricsCollector>) -> Result<Option<LogSink>, LogError> {
    if !config.enabled {
        return Ok(None);
    }
    LogSink::start(config, metrics).map(Some)
}

fn drain(queue: &BlockQueue<String>, file: &mut SplitFile) {
    while let Ok(line) = queue.pop() {
        if let Err(e) = file.write_line(&line) {
            eprintln!("log write failed: {}", e);
        }
        if queue.is_empty() {
            flush_or_report(file);
        }
    }
    flush_or_report(file);
}

fn flush_or_report(file: &mut SplitFile) {
    if let Err(e) = file.flush() {
        eprintln!("log flush failed: {}", e);
    }
}

fn format_line(now: OffsetDateTime, level: Level, args: fmt::Arguments<'_>) -> String {
    let stamp = now
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_default();
    format!("[{}] [{}]: {}\n", stamp, level_tag(level), args)
}

fn level_tag(level: Level) -> &'static str {
    if level == Level::ERROR {
        "error"
    } else if level == Level::WARN {
        "warn"
    } else if level == Level::INFO {
        "info"
    } else {
        "debug"
    }
}

fn to_rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Rolling appender that also starts a new numbered file every `split_lines`
struct SplitFile {
    directory: PathBuf,
    prefix: String,
    rotation: LogRotation,
    split_lines: u64,
    lines: u64,
    part: u64,
    appender: RollingFileAppender,
}

impl SplitFile {
    fn open(config: &LogConfig) -> io::Result<Self> {
        let appender = open_appender(&config.directory, &config.file_prefix, config.rotation, 0)?;
        Ok(Self {
            directory: config.directory.clone(),
            prefix: config.file_prefix.clone(),
            rotation: config.rotation,
            split_lines: config.split_lines,
            lines: 0,
            part: 0,
            appender,
        })
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.split_lines > 0 && self.lines >= self.split_lines {
            self.appender.flush()?;
            self.part += 1;
            self.appender = open_appender(&self.directory, &self.prefix, self.rotation, self.part)?;
            self.lines = 0;
        }
        self.appender.write_all(line.as_bytes())?;
        self.lines += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.appender.flush()
    }
}

fn open_appender(
    directory: &std::path::Path,
    prefix: &str,
    rotation: LogRotation,
    part: u64,
) -> io::Result<RollingFileAppender> {
    let name = if part == 0 {
        prefix.to_string()
    } else {
        format!("{}.{}", prefix, part)
    };
    RollingFileAppender::builder()
        .rotation(to_rotation(rotation))
        .filename_prefix(name)
        .filename_suffix("log")
        .build(directory)
        .map_err(io::Error::other)
}
