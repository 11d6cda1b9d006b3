use anyhow::{bail, Result};
use clap::Parser;

use crate::core::logging::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "mce-inputd")]
#[command(author = "Jolla MCE team")]
#[command(version = "0.1.0")]
#[command(about = "Mode Control Entity input subsystem daemon", long_about = None)]
pub struct Args {
    /// Path to the on-disk configuration document
    #[arg(short, long, env = "MCE_INPUT_CONFIG")]
    pub config: Option<String>,

    /// Directory to enumerate for `event*` nodes
    #[arg(long, env = "MCE_INPUT_DIR", default_value = "/dev/input")]
    pub input_dir: String,

    /// Minimum log level
    #[arg(short, long, value_enum, env = "MCE_INPUT_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevelArg,

    /// Directory for rotating log files; disables file logging if absent
    #[arg(long, env = "MCE_INPUT_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Stay attached to the controlling terminal instead of daemonizing
    #[arg(short, long, env = "MCE_INPUT_FOREGROUND")]
    pub foreground: bool,

    /// Classify and log devices without opening the input-grab/tklock
    /// machinery against them
    #[arg(long, env = "MCE_INPUT_SIMULATE")]
    pub simulate: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

impl Args {
    /// Validate argument combinations
    pub fn validate(&self) -> Result<()> {
        if self.simulate && !self.foreground && self.log_dir.is_none() {
            // Simulate mode run as a background daemon with no file log
            // would be silent; nothing useful for an operator to see.
            bail!("--simulate without --foreground requires --log-dir so its output is reachable");
        }
        if self.input_dir.trim().is_empty() {
            bail!("--input-dir must not be empty");
        }
        Ok(())
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

pub fn parse_and_validate() -> Result<Args> {
    let args = Args::parse();
    args.validate()?;
    Ok(args)
}
