use std::path::PathBuf;

use anyhow::{Context, Result};
use mce_input::app::App;
use mce_input::cli;
use mce_input::core::config::AppConfig;
use mce_input::core::logging::{self, LogConfig};

fn main() -> Result<()> {
    let args = cli::parse_and_validate()?;

    logging::init_logging(LogConfig {
        level: args.log_level.into(),
        enable_file: args.log_dir.is_some(),
        enable_console: args.foreground,
        log_dir: args.log_dir.as_ref().map(PathBuf::from),
        filter: None,
    })?;

    if !args.foreground {
        daemonize().context("failed to daemonize")?;
    }

    tracing::info!("mce-inputd starting");

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => AppConfig::default(),
    };

    let mut app = App::new(config, PathBuf::from(&args.input_dir), args.simulate);

    if app.is_simulate() {
        return app.simulate_enumeration();
    }

    app.run()
}

/// Classic double-fork daemonization: detach from the controlling
/// terminal and the parent's session so the reactor survives the
/// invoking shell exiting. The first fork's parent exits immediately;
/// the intermediate process calls `setsid` to become session leader,
/// then forks again so the daemon itself can never reacquire a
/// controlling terminal.
#[cfg(target_os = "linux")]
fn daemonize() -> Result<()> {
    use nix::unistd::{fork, setsid, ForkResult};

    match unsafe { fork() }.context("first fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().context("setsid failed")?;

    match unsafe { fork() }.context("second fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    std::env::set_current_dir("/").context("chdir to / failed")?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn daemonize() -> Result<()> {
    anyhow::bail!("daemonization is only supported on Linux; pass --foreground");
}
