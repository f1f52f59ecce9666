use clap::Parser;
use std::path::PathBuf;

/// tufd: Asus TUF laptop control daemon (keyboard backlight, fans,
/// power profile and thermal policy)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: $TUFD_CONFIG, ~/.config/tufd/config.yml,
    /// /etc/tufd/config.yml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and log stdout/stderr to /var/tmp/tufd.log
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,
}
