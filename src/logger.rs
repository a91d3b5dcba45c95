//! log4rs setup: a rolling application log, a rolling audit log for writes
//! (`natours::audit`), and in development a console request log
//! (`natours::http`).

use crate::errors::AppError;
use crate::telemetry::{AUDIT_TARGET, HTTP_TARGET};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
    /// Rolled files kept per log (default 7).
    pub retention: Option<u32>,
    /// Echo the request log to the console.
    pub console_requests: bool,
}

impl LogSettings {
    /// Reads `NATOURS_LOG_DIR`, `NATOURS_LOG_LEVEL` and `NATOURS_LOG_RETENTION`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            dir: std::env::var("NATOURS_LOG_DIR").ok().map(PathBuf::from),
            level: std::env::var("NATOURS_LOG_LEVEL").ok(),
            retention: std::env::var("NATOURS_LOG_RETENTION").ok().and_then(|s| s.parse().ok()),
            console_requests: false,
        }
    }
}

fn level_filter(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, name: &str, keep: u32) -> Result<RollingFileAppender, AppError> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{name}.{{}}.log")).display()), keep)
        .map_err(|e| AppError::Config(format!("log roller {name}: {e}")))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{name}.log")), Box::new(policy))
        .map_err(|e| AppError::Config(format!("log file {name}: {e}")))
}

/// Builds the log configuration without installing it.
pub fn build_config(settings: &LogSettings) -> Result<Config, AppError> {
    let base = match &settings.dir {
        Some(d) => d.clone(),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&base)?;
    let keep = settings.retention.unwrap_or(7);
    let lvl = level_filter(settings.level.as_deref());

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl));

    builder = if settings.console_requests {
        let console = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new("{m}{n}"))).build();
        builder
            .appender(Appender::builder().build("console", Box::new(console)))
            .logger(Logger::builder().appender("console").additive(true).build(HTTP_TARGET, LevelFilter::Info))
    } else {
        builder.logger(Logger::builder().build(HTTP_TARGET, lvl))
    };

    builder
        .build(Root::builder().appender("app").build(lvl))
        .map_err(|e| AppError::Config(format!("log config: {e}")))
}

/// Installs the logger. Fails if one is already installed.
pub fn configure_logging(settings: &LogSettings) -> Result<(), AppError> {
    let config = build_config(settings)?;
    log4rs::init_config(config).map_err(|e| AppError::Config(format!("logger: {e}")))?;
    Ok(())
}

/// Installs the logger from a log4rs YAML file.
pub fn configure_from_file(path: &Path) -> Result<(), AppError> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())
        .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(level_filter(Some("DEBUG")), LevelFilter::Debug);
        assert_eq!(level_filter(None), LevelFilter::Info);
        assert_eq!(level_filter(Some("chatty")), LevelFilter::Info);
    }

    #[test]
    fn config_builds_into_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LogSettings { dir: Some(dir.path().to_path_buf()), console_requests: true, ..LogSettings::default() };
        build_config(&settings).unwrap();
        assert!(dir.path().join("app.log").exists());
        assert!(dir.path().join("audit.log").exists());
    }
}
