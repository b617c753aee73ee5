use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "rdb",
    about = "Drive a reference backend through its engine call table",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store file: backend settings plus the `[refs]` table
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check whether a reference exists
    Exists(NameArgs),
    /// Show a reference
    Lookup(NameArgs),
    /// Create a reference
    Write(WriteArgs),
    /// Delete a reference
    Delete(NameArgs),
    /// List references matching a glob
    List(ListArgs),
    /// Compact the backend's storage
    Compress,
}

#[derive(Args)]
pub struct NameArgs {
    pub name: String,
}

#[derive(Args)]
pub struct WriteArgs {
    pub name: String,
    /// Target object id (hex)
    #[arg(long, conflicts_with = "symbolic", required_unless_present = "symbolic")]
    pub oid: Option<String>,
    /// Target reference name
    #[arg(long)]
    pub symbolic: Option<String>,
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Glob over full names; every reference when omitted
    pub pattern: Option<String>,
    #[arg(long)]
    pub names_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_needs_exactly_one_target() {
        assert!(Cli::try_parse_from(["rdb", "write", "refs/heads/a"]).is_err());
        assert!(Cli::try_parse_from([
            "rdb", "write", "refs/heads/a", "--oid", "00", "--symbolic", "HEAD"
        ])
        .is_err());
        let cli = Cli::try_parse_from(["rdb", "write", "HEAD", "--symbolic", "refs/heads/a"]).unwrap();
        assert!(matches!(cli.command, Command::Write(WriteArgs { oid: None, .. })));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from(["rdb", "list", "refs/*", "-v", "--config", "store.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("store.toml")));
    }
}
