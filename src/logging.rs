use crate::anyhow_loc;
use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fmt;
use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_chrome::FlushGuard;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

const DEFAULT_LOG_FILE: &str = "vfs-snapshot.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(anyhow_loc!(
                "Invalid log level '{}'. Valid options are: error, warn, info, debug, trace",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
    Simple,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File { path: Utf8PathBuf },
    Both { path: Utf8PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    #[serde(default = "default_log_output")]
    pub output: LogOutput,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Simple
}

fn default_log_output() -> LogOutput {
    LogOutput::Stdout
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            output: default_log_output(),
        }
    }
}

/// Keeps background log writers alive. Hold it until the program exits.
#[derive(Default)]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
    _profile: Option<FlushGuard>,
}

/// Event format without span context, so console output stays one line per
/// event while spans still reach the profiler.
pub struct PlainEventFormat;

impl<S, N> FormatEvent<S, N> for PlainEventFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = event.metadata().level();

        if writer.has_ansi_escapes() {
            let color_code = match *level {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            write!(writer, "{}{:>5}\x1b[0m ", color_code, level)?;
        } else {
            write!(writer, "{:>5} ", level)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        LogFormat::Simple => tracing_subscriber::fmt::layer().event_format(PlainEventFormat).boxed(),
    }
}

fn file_layer(path: &Utf8Path) -> (BoxedLayer, WorkerGuard) {
    let dir = path.parent().filter(|p| !p.as_str().is_empty()).unwrap_or(Utf8Path::new("."));
    let file_name = path.file_name().unwrap_or(DEFAULT_LOG_FILE);
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .boxed();
    (layer, guard)
}

/// The layers `config` asks for, console first.
fn output_layers(config: &LogConfig) -> (Vec<BoxedLayer>, Option<WorkerGuard>) {
    match &config.output {
        LogOutput::Stdout => (vec![console_layer(config.format)], None),
        LogOutput::File { path } => {
            let (layer, guard) = file_layer(path);
            (vec![layer], Some(guard))
        }
        LogOutput::Both { path } => {
            let (layer, guard) = file_layer(path);
            (vec![console_layer(config.format), layer], Some(guard))
        }
    }
}

pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let filter = EnvFilter::new(config.level.as_str());
    let (layers, file_guard) = output_layers(config);

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow_loc!("Failed to install tracing subscriber: {}", e))?;

    tracing::debug!("Logging initialized with {} level", config.level.as_str());

    Ok(LoggingGuard {
        _file: file_guard,
        _profile: None,
    })
}

/// Like [`init_logging`], plus a chrome trace written to `trace_path` when the
/// returned guard is dropped.
pub fn init_logging_with_profile(config: &LogConfig, trace_path: &Utf8Path) -> Result<LoggingGuard> {
    let filter = EnvFilter::new(config.level.as_str());
    let (mut layers, file_guard) = output_layers(config);

    let (chrome_layer, flush_guard) = tracing_chrome::ChromeLayerBuilder::new()
        .file(trace_path.as_std_path())
        .include_args(true)
        .build();
    layers.push(chrome_layer.boxed());

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow_loc!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("Profiling enabled, trace will be written to: {}", trace_path);

    Ok(LoggingGuard {
        _file: file_guard,
        _profile: Some(flush_guard),
    })
}

/// Records `duration_ms` and `duration_us` on its span when dropped.
pub struct TimingGuard {
    span: tracing::span::EnteredSpan,
    start: std::time::Instant,
}

impl TimingGuard {
    pub fn new(span: tracing::Span) -> Self {
        Self {
            span: span.entered(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_ms", duration.as_millis() as u64);
        self.span.record("duration_us", duration.as_micros() as u64);
    }
}

/// Enters a span that records its own duration. Keep the returned guard alive
/// for the timed section.
#[macro_export]
macro_rules! timed_span {
    ($level:expr, $name:expr) => {
        $crate::timed_span!($level, $name,)
    };
    ($level:expr, $name:expr, $($fields:tt)*) => {{
        let span = tracing::span!($level, $name, duration_ms = tracing::field::Empty, duration_us = tracing::field::Empty, $($fields)*);
        $crate::logging::TimingGuard::new(span)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_err, assert_ok};
    use std::str::FromStr;

    #[test]
    fn log_level_parses_case_insensitively() {
        assert_eq!(LogLevel::from_str("WARN").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert_err!(LogLevel::from_str("loud"));
    }

    #[test]
    fn log_config_defaults() {
        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Simple);
        assert_eq!(config.output, LogOutput::Stdout);
    }

    #[test]
    fn log_config_file_output() {
        let parsed = serde_json::from_str::<LogConfig>(
            r#"{ "level": "debug", "output": { "both": { "path": "logs/vfs.log" } } }"#,
        );
        assert_ok!(parsed);
        let config = parsed.unwrap();
        assert_eq!(
            config.output,
            LogOutput::Both {
                path: Utf8PathBuf::from("logs/vfs.log")
            }
        );
    }

    #[test]
    fn log_config_rejects_unknown_fields() {
        assert_err!(serde_json::from_str::<LogConfig>(r#"{ "colour": true }"#));
    }
}
