use std::path::PathBuf;

use clap::Parser;

/// WhatsApp <-> Signal bridge.
#[derive(Parser, Debug)]
#[command(name = "whatsignal", about = "Bridges WhatsApp and Signal messages", disable_version_flag = true)]
pub struct Cli {
    /// Path to the JSON config file.
    #[arg(long, env = "WHATSIGNAL_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Raises the log filter to debug and allows raw-identifier logging.
    #[arg(long)]
    pub verbose: bool,

    /// Prints version metadata and exits without starting the server.
    #[arg(long)]
    pub version: bool,
}
