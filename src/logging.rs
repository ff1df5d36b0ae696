//! Log setup and log helpers.
//!
//! [`init_logging`] installs the process-wide `tracing` subscriber.
//! [`LogDeduper`] limits how often a recurring message is emitted; callers own
//! an instance and pass it where it is needed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::ValueEnum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `cost_audit=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `config.level`. An unparseable level
/// falls back to `info` with a warning. Returns `false` if logging was
/// already initialized, in which case nothing changes.
pub fn init_logging(config: &LogConfig) -> bool {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let mut bad_level = None;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| {
            bad_level = Some(config.level.clone());
            EnvFilter::new("info")
        })
    });

    let effective = filter.to_string();
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    // Another subscriber may have been installed outside this module.
    if installed.is_err() {
        return false;
    }
    announce_level(&effective, config.format, bad_level.as_deref());
    true
}

fn announce_level(effective: &str, format: LogFormat, bad_level: Option<&str>) {
    if let Some(level) = bad_level {
        warn!(level = %level, "error parsing log level, using 'info'");
    }
    info!(level = %effective, %format, "log level set");
}

// ---------------------------------------------------------------------------
// Deduplicated logging
// ---------------------------------------------------------------------------

/// Counts emissions per message template and stops emitting a template once
/// it has been logged `limit` times. The emission that reaches the limit is
/// followed by a one-time "suppressing future logs" info line.
#[derive(Debug, Default)]
pub struct LogDeduper {
    counts: Mutex<HashMap<String, usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

impl LogDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `template` has been offered so far.
    pub fn count(&self, template: &str) -> usize {
        self.counts.lock().get(template).copied().unwrap_or(0)
    }

    /// Returns whether `message` was emitted.
    pub fn warn(&self, limit: usize, template: &str, message: &str) -> bool {
        self.log(Level::Warn, limit, template, message)
    }

    pub fn error(&self, limit: usize, template: &str, message: &str) -> bool {
        self.log(Level::Error, limit, template, message)
    }

    pub fn info(&self, limit: usize, template: &str, message: &str) -> bool {
        self.log(Level::Info, limit, template, message)
    }

    fn log(&self, level: Level, limit: usize, template: &str, message: &str) -> bool {
        let times = {
            let mut counts = self.counts.lock();
            let n = counts.entry(template.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        if times > limit {
            return false;
        }
        match level {
            Level::Info => info!("{message}"),
            Level::Warn => warn!("{message}"),
            Level::Error => error!("{message}"),
        }
        if times == limit {
            info!("{template} logged {limit} times: suppressing future logs");
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Profiling
// ---------------------------------------------------------------------------

/// Log the time elapsed since `start`.
pub fn profile(start: Instant, name: &str) {
    info!("[Profiler] {:?}: {}", start.elapsed(), name);
}

/// Like [`profile`], but only when more than `threshold` has elapsed.
/// Returns whether a line was logged.
pub fn profile_with_threshold(start: Instant, threshold: Duration, name: &str) -> bool {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        info!("[Profiler] {:?}: {}", elapsed, name);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Clone)]
    struct LogBuffer(Arc<StdMutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs<F: FnOnce()>(f: F) -> String {
        let buf = Arc::new(StdMutex::new(Vec::new()));
        let writer = LogBuffer(buf.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, f);

        let bytes = buf.lock().expect("log buffer lock").clone();
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[test]
    fn deduper_stops_at_limit() {
        let dedup = LogDeduper::new();
        let emitted: Vec<bool> = (0..5)
            .map(|i| dedup.warn(3, "node {} missing", &format!("node {i} missing")))
            .collect();
        assert_eq!(emitted, vec![true, true, true, false, false]);
        assert_eq!(dedup.count("node {} missing"), 5);
    }

    #[test]
    fn deduper_announces_suppression_once() {
        let dedup = LogDeduper::new();
        let logs = capture_logs(|| {
            for _ in 0..4 {
                dedup.error(2, "pricing lookup failed", "pricing lookup failed");
            }
        });
        assert_eq!(logs.matches("ERROR").count(), 2);
        assert_eq!(logs.matches("suppressing future logs").count(), 1);
    }

    #[test]
    fn deduper_counts_templates_independently() {
        let dedup = LogDeduper::new();
        assert!(dedup.info(1, "a", "a"));
        assert!(!dedup.info(1, "a", "a"));
        assert!(dedup.info(1, "b", "b"));
    }

    #[test]
    fn profile_threshold() {
        let logs = capture_logs(|| {
            assert!(!profile_with_threshold(
                Instant::now(),
                Duration::from_secs(3600),
                "fast"
            ));
            profile(Instant::now(), "join");
        });
        assert!(logs.contains("[Profiler]"));
        assert!(logs.contains("join"));
        assert!(!logs.contains("fast"));
    }

    #[test]
    fn announces_effective_level() {
        let logs = capture_logs(|| announce_level("debug", LogFormat::Pretty, None));
        assert!(logs.contains("log level set"));
        assert!(logs.contains("level=debug"));
        assert!(!logs.contains("error parsing log level"));
    }

    #[test]
    fn announces_fallback_for_bad_level() {
        let logs = capture_logs(|| announce_level("info", LogFormat::Json, Some("loud")));
        assert!(logs.contains("error parsing log level"));
        assert!(logs.contains("level=loud"));
        assert!(logs.contains("log level set"));
        assert!(logs.contains("format=json"));
    }

    #[test]
    fn format_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
