use std::fs::File;

use anyhow::{Result, anyhow};
use clap::Parser;
use daemonize::Daemonize;
use log::{LevelFilter, error, info};
use syslog::{BasicLogger, Facility, Formatter3164};

use tufd::{application::Application, cli::Cli, config::ConfigManager};

fn init_log(level: LevelFilter) -> Result<()> {
    syslog::unix(Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "tufd".into(),
        pid: std::process::id(),
    })
    .map_err(|e| anyhow!("{e}"))
    .and_then(|logger| {
        log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
            .map(|()| log::set_max_level(level))
            .map_err(|e| anyhow!("{e}"))
    })
}

fn into_daemon() -> Result<()> {
    File::create("/var/tmp/tufd.log")
        .and_then(|out| Ok((out.try_clone()?, out)))
        .map_err(|e| anyhow!("{e}"))
        .and_then(|(stderr, stdout)| {
            Daemonize::new()
                .stdout(stdout)
                .stderr(stderr)
                .start()
                .map_err(|e| anyhow!("{e}"))
        })
}

async fn run(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::load(cli.config).await?;
    log::set_max_level(config_manager.get().log_level());
    info!("tufd {} starting", env!("CARGO_PKG_VERSION"));

    Application::builder()
        .with_config_manager(config_manager)
        .build()?
        .run()
        .await
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_log(LevelFilter::Info) {
        eprintln!("Syslog unavailable, continuing without it: {e}");
    }

    // Fork before the runtime starts its worker threads.
    if cli.daemonize {
        if let Err(e) = into_daemon() {
            error!("Failed to daemonize: {e:#}");
            eprintln!("Failed to daemonize: {e:#}");
            std::process::exit(1);
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        error!("tufd stopped with error: {e:#}");
        eprintln!("tufd: {e:#}");
        std::process::exit(1);
    }
    info!("tufd stopped");
}
