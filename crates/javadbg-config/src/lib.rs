//! Configuration model and `tracing` setup for javadbg.
//!
//! The debug adapter reads an optional TOML file. Every key has a default, so
//! an empty file (or no file at all) yields a usable configuration.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once, OnceLock};

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter, MakeWriterExt};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

/// Default cap for a single DAP message body.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugConfig {
    pub logging: LoggingConfig,
    pub adapter: AdapterConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    pub level: String,

    /// Emit logs in JSON format.
    pub json: bool,

    /// Mirror logs to stderr. stdout is reserved for the DAP stream.
    pub stderr: bool,

    /// Append logs to the given file path.
    ///
    /// If the file cannot be opened, file logging is disabled while other sinks
    /// remain active.
    pub file: Option<PathBuf>,

    /// Capture and include backtraces in panic reports.
    pub include_backtrace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
            stderr: true,
            file: None,
            include_backtrace: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directives from `level`, followed by `RUST_LOG` when it is set.
    fn directives(&self) -> String {
        let level = match self.level.trim() {
            "" => "info",
            level if level.eq_ignore_ascii_case("warning") => "warn",
            level => level,
        };
        match std::env::var("RUST_LOG") {
            Ok(env) if !env.trim().is_empty() => format!("{level},{}", env.trim()),
            _ => level.to_owned(),
        }
    }

    /// The effective filter. Directives that do not parse fall back to `info`.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.directives())
            .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// List static fields alongside locals and instance fields.
    pub show_static_variables: bool,

    /// Render type names fully qualified (`java.lang.String` vs `String`).
    pub show_qualified_names: bool,

    /// Default timeout for `attach` when the request does not carry one.
    pub attach_timeout_ms: u64,

    /// Timeout for adapter-initiated requests to the client. `0` waits forever.
    pub request_timeout_ms: u64,

    /// Upper bound for the `Content-Length` of a single inbound message.
    pub max_message_bytes: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            show_static_variables: true,
            show_qualified_names: true,
            attach_timeout_ms: 10_000,
            request_timeout_ms: 0,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The `Display` impl embeds a source snippet; keep only the message.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

fn sanitize_toml_error_message(message: &str) -> String {
    static QUOTED_STRING_RE: OnceLock<regex::Regex> = OnceLock::new();

    let re = QUOTED_STRING_RE.get_or_init(|| {
        regex::Regex::new(r#""(?:\\.|[^"\\])*""#).expect("quoted-string regex should compile")
    });
    let mut out = re.replace_all(message, r#""<redacted>""#).into_owned();

    // `unknown field `x`` carries a user-controlled key; `missing field `x`` does not.
    if let Some(pos) = out.find("unknown field `") {
        let start = pos + "unknown field `".len();
        if let Some(end_rel) = out[start..].find('`') {
            out.replace_range(start..start + end_rel, "<redacted>");
        }
    }

    out
}

impl DebugConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

struct MutexFileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            guard: self
                .file
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }
}

struct MutexFileWriter<'a> {
    guard: std::sync::MutexGuard<'a, std::fs::File>,
}

impl Write for MutexFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();

/// Initializes structured `tracing` logging.
///
/// Safe to call multiple times; only the first call installs a global
/// subscriber.
pub fn init_tracing(logging: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = logging.env_filter();

        let file = logging
            .file
            .as_ref()
            .and_then(|path| {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .ok()
            })
            .map(|file| Arc::new(Mutex::new(file)));
        let file_open_failed = logging.file.is_some() && file.is_none();

        let make_writer = match (logging.stderr, file) {
            (true, Some(file)) => {
                BoxMakeWriter::new(io::stderr.and(MutexFileMakeWriter { file }))
            }
            (true, None) => BoxMakeWriter::new(io::stderr),
            (false, Some(file)) => BoxMakeWriter::new(MutexFileMakeWriter { file }),
            (false, None) => BoxMakeWriter::new(io::sink),
        };

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_open_failed {
            if let Some(path) = logging.file.as_ref() {
                tracing::warn!(
                    target: "javadbg.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}
