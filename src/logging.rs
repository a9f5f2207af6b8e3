use log::LevelFilter;
use log4rs::{
    Config,
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            RollingFileAppender,
            policy::compound::{
                CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
            },
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};
use thiserror::Error;

const LOG_SIZE_LIMIT: u64 = 10 * 1024 * 1024; // 10 MB

const LOG_FILE_COUNT: u32 = 3;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}\n";

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("invalid log archive pattern: {0}")]
    Roller(String),
    #[error("cannot open log file: {0}")]
    File(#[from] std::io::Error),
    #[error("invalid logger config: {0}")]
    Config(String),
    #[error("logger already installed: {0}")]
    Install(#[from] log::SetLoggerError),
}

/// Console logging at info, plus a size-rolled debug log when `file_path` is set.
pub fn init_logger(file_path: Option<&str>) -> Result<(), LogInitError> {
    log4rs::init_config(build_config(file_path)?)?;
    Ok(())
}

fn build_config(file_path: Option<&str>) -> Result<Config, LogInitError> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let mut builder = Config::builder().appender(
        Appender::builder()
            .filter(Box::new(ThresholdFilter::new(LevelFilter::Info)))
            .build("stderr", Box::new(stderr)),
    );
    let mut root = Root::builder().appender("stderr");

    if let Some(path) = file_path {
        let archive_pattern = format!("{path}.{{}}");
        let roller = FixedWindowRoller::builder()
            .build(&archive_pattern, LOG_FILE_COUNT)
            .map_err(|e| LogInitError::Roller(e.to_string()))?;
        let policy = CompoundPolicy::new(
            Box::new(SizeTrigger::new(LOG_SIZE_LIMIT)),
            Box::new(roller),
        );
        let logfile = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(path, Box::new(policy))?;
        builder = builder.appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("logfile", Box::new(logfile)),
        );
        root = root.appender("logfile");
    }

    builder
        .build(root.build(LevelFilter::Debug))
        .map_err(|e| LogInitError::Config(e.to_string()))
}
