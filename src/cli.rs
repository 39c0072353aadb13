//! 命令行界面定义
//!
//! 定义了主程序的命令行参数和选项
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "nonce-keeper")]
#[command(version)]
#[command(about = "Issue, verify and consume single-use, time-bound nonces")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Configuration file path (defaults to searching standard locations)
    #[arg(short, long, default_value = "config.toml")]
    pub(crate) config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Test configuration file
    Test {
        /// Configuration file path (optional, defaults to config.toml)
        #[arg(index = 1)]
        config_file: Option<PathBuf>,
    },

    /// Issue a new nonce, superseding older ones for the same action and user
    Issue {
        /// Action the nonce authorizes (e.g. reset-password)
        action: String,
        /// User the nonce is bound to
        #[arg(short, long)]
        user: Uuid,
        /// Lifetime in seconds
        #[arg(short, long, default_value_t = 900)]
        expires_in: u64,
    },

    /// Check a token without consuming it
    Check {
        #[arg(allow_hyphen_values = true)]
        token: String,
        action: String,
        #[arg(short, long)]
        user: Uuid,
    },

    /// Consume a token unconditionally
    Consume {
        #[arg(allow_hyphen_values = true)]
        token: String,
    },

    /// Check a token and consume it on success
    Redeem {
        #[arg(allow_hyphen_values = true)]
        token: String,
        action: String,
        #[arg(short, long)]
        user: Uuid,
    },

    /// Show the current nonce for an action and user
    Get {
        action: String,
        #[arg(short, long)]
        user: Uuid,
    },

    /// Remove expired nonces once and exit
    Sweep,

    /// Keep the expiry sweeper running until Ctrl-C (default)
    Run,
}
