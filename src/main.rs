mod actions;
mod opts;

use anyhow::{Context, Result};
use aptctl::{cli, debug, due_to, error, Config};
use clap::Parser;
use opts::{Opts, DEFAULT_CONFIG};
use std::path::Path;

/// Exit codes:
/// 1 => something went wrong
/// 2 => user cancelled operation
fn main() {
    match try_main() {
        Ok(false) => (),
        Ok(true) => std::process::exit(2),
        Err(err) => {
            error!("{}", err.to_string());
            err.chain().skip(1).for_each(|cause| {
                due_to!("{}", cause);
            });
            std::process::exit(1);
        }
    }
}

fn try_main() -> Result<bool> {
    let opts = Opts::parse();
    cli::set_verbose(opts.verbose);

    let config = load_config(opts.config.as_deref(), Path::new(DEFAULT_CONFIG))?;
    actions::dispatch(&config, &opts)
}

/// A file named on the command line must load. The default one is optional.
fn load_config(explicit: Option<&Path>, default: &Path) -> Result<Config> {
    let path = match explicit {
        Some(path) => path,
        None if default.is_file() => default,
        None => {
            debug!("{} does not exist, using defaults", default.display());
            return Ok(Config::default());
        }
    };
    Config::from_file(path).context("Failed to load configuration")
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn config_sources() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.toml");
        fs::write(&custom, "sudo = false\n").unwrap();
        let missing = dir.path().join("missing.toml");

        // Explicit path wins over the default
        assert!(!load_config(Some(custom.as_path()), &missing).unwrap().sudo);
        assert!(!load_config(None, &custom).unwrap().sudo);
        assert_eq!(
            load_config(None, &missing).unwrap().sudo,
            Config::default().sudo
        );
        assert!(load_config(Some(missing.as_path()), &custom).is_err());
    }
}
