// CLI definitions using clap

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "monsgeek-bridge")]
#[command(author, version, about = "MonsGeek M5W wired-mode input bridge")]
pub struct Cli {
    /// Poll interval while searching for the keyboard (ms)
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Read timeout while connected (ms); bounds how quickly removal
    /// and shutdown are noticed
    #[arg(long, default_value_t = 250)]
    pub read_timeout_ms: u32,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bridge (default)
    Run,

    /// List the keyboard's HID interfaces and which one gets bridged
    #[command(visible_alias = "ls")]
    List,
}
