use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "/etc/aptctl/config.toml";

#[derive(Parser)]
#[clap(about, version, author)]
pub struct Opts {
    #[clap(
        long,
        help = "Configuration file [default: /etc/aptctl/config.toml, skipped when missing]"
    )]
    pub config: Option<PathBuf>,
    #[clap(short, long, help = "Print additional debug information")]
    pub verbose: bool,
    #[clap(short, long, help = "Do not ask for confirmation")]
    pub yes: bool,
    #[clap(subcommand)]
    pub subcmd: SubCmd,
}

#[derive(Subcommand)]
pub enum SubCmd {
    /// Refresh the package index from the configured repositories
    Update,
    /// List packages known to dpkg
    List(ListPkg),
    /// Show the state and available versions of a package
    Show(ShowPkg),
    /// Install packages, or bring them to a specific version
    Install(InstallPkg),
    /// Remove packages
    Remove(RemovePkg),
    /// Keep a package at its current version
    Hold(HoldPkg),
    /// Let a held package be upgraded again
    Unhold(HoldPkg),
    /// Manage APT sources
    #[clap(subcommand)]
    Repo(RepoCmd),
}

#[derive(Args)]
pub struct ListPkg {
    /// Only list packages with a newer candidate version
    #[clap(long)]
    pub upgradable: bool,
}

#[derive(Args)]
pub struct ShowPkg {
    /// Package name, optionally with `:arch`
    pub name: String,
}

#[derive(Args)]
pub struct InstallPkg {
    /// Package names to install
    #[clap(required = true, min_values = 1)]
    pub names: Vec<String>,
    /// Install exactly this version, downgrading if needed
    #[clap(long)]
    pub version: Option<String>,
    /// Refresh the package index first
    #[clap(long)]
    pub update: bool,
}

#[derive(Args)]
pub struct RemovePkg {
    /// Package names to remove
    #[clap(required = true, min_values = 1)]
    pub names: Vec<String>,
}

#[derive(Args)]
pub struct HoldPkg {
    pub name: String,
}

#[derive(Subcommand)]
pub enum RepoCmd {
    /// List configured repositories
    List,
    /// Add a repository and install its signing key
    Add(AddRepo),
    /// Remove a repository, and its key when nothing else uses it
    Remove(RepoLine),
    /// Comment out a repository
    Disable(RepoLine),
    /// Enable a disabled repository
    Enable(RepoLine),
}

#[derive(Args)]
pub struct AddRepo {
    /// Source line, e.g. "deb https://example.com/apt stable main"
    pub line: String,
    /// Signing key: an armored key file, a keyring file or a key id
    #[clap(long)]
    pub key: Option<String>,
    /// Source file to write the entry to
    #[clap(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct RepoLine {
    /// Source line naming the repository
    pub line: String,
}
