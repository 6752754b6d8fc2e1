use super::{ask_confirm, ensure_root};
use crate::opts::{Opts, RepoCmd};

use anyhow::{Context, Result};
use aptctl::{
    executor::CommandRunner,
    info,
    repo::{normalize_key_id, SigningKey, Trust},
    success, warn, Config, Repository, RepositoryMapping,
};
use console::style;
use std::{fs, path::Path};
use tabled::{Alignment, Full, Modify, Style, Table, Tabled};

#[derive(Tabled)]
struct RepoRow {
    #[header("Type")]
    kind: String,
    #[header("URI")]
    uri: String,
    #[header("Suite")]
    suite: String,
    #[header("Components")]
    components: String,
    #[header("Status")]
    status: String,
    #[header("Signed By")]
    trust: String,
}

fn describe_trust(trust: Trust) -> String {
    match trust {
        Trust::Global => "global keyrings".to_owned(),
        Trust::Keyring(path) => path.display().to_string(),
        Trust::Inline => "inline key".to_owned(),
        Trust::Pending => style("missing key").red().to_string(),
    }
}

/// `--key` is an armored key file, a keyring file or a key id.
fn signing_key(arg: &str) -> Result<SigningKey> {
    let path = Path::new(arg);
    if !path.is_file() {
        normalize_key_id(arg)?;
        return Ok(SigningKey::KeyId(arg.to_owned()));
    }
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match String::from_utf8(data) {
        Ok(text) if text.contains("-----BEGIN PGP PUBLIC KEY BLOCK-----") => {
            Ok(SigningKey::Material(text))
        }
        _ => Ok(SigningKey::Keyring(fs::canonicalize(path).with_context(|| {
            format!("Failed to resolve {}", path.display())
        })?)),
    }
}

fn parse_line(line: &str) -> Result<Repository> {
    Repository::from_line(line).context("Failed to parse the repository definition")
}

pub fn run(config: &Config, opts: &Opts, runner: &dyn CommandRunner, cmd: &RepoCmd) -> Result<bool> {
    let mut mapping = RepositoryMapping::new(config, runner);
    mapping.load().context("Failed to read APT sources")?;

    match cmd {
        RepoCmd::List => {
            let rows: Vec<RepoRow> = mapping
                .repositories()
                .into_iter()
                .map(|r| RepoRow {
                    kind: r.kind.to_string(),
                    uri: r.uri.clone(),
                    suite: r.suite.clone(),
                    components: r.components.join(" "),
                    status: if r.enabled {
                        "enabled".to_owned()
                    } else {
                        "disabled".to_owned()
                    },
                    trust: describe_trust(mapping.trust(&r)),
                })
                .collect();
            if rows.is_empty() {
                info!("No repositories configured");
            } else {
                let table = Table::new(&rows)
                    .with(Modify::new(Full).with(Alignment::left()))
                    .with(Modify::new(Full).with(|s: &str| format!(" {} ", s)))
                    .with(Style::psql());
                println!("{}", table);
            }
        }
        RepoCmd::Add(args) => {
            ensure_root()?;
            let mut repo = parse_line(&args.line)?;
            if let Some(key) = &args.key {
                repo.signing_key = Some(signing_key(key)?);
            }
            let changed = match &args.file {
                Some(file) => mapping.add_to(repo.clone(), file)?,
                None => mapping.add(repo.clone())?,
            };
            if changed {
                success!("Added {}", repo);
                info!("Run `aptctl update` to fetch its package index");
            } else {
                info!("{} is already configured", repo);
            }
        }
        RepoCmd::Remove(args) => {
            ensure_root()?;
            let repo = parse_line(&args.line)?;
            if !mapping.contains(&repo) {
                warn!("{} is not configured", repo);
                return Ok(false);
            }
            if !ask_confirm(opts, &format!("Remove {}?", repo))? {
                return Ok(true);
            }
            mapping.remove(&repo)?;
            success!("Removed {}", repo);
        }
        RepoCmd::Disable(args) => {
            ensure_root()?;
            let repo = parse_line(&args.line)?;
            if mapping.disable(&repo)? {
                success!("Disabled {}", repo);
            } else {
                info!("{} is not configured or already disabled", repo);
            }
        }
        RepoCmd::Enable(args) => {
            ensure_root()?;
            let repo = parse_line(&args.line)?;
            if mapping.enable(&repo)? {
                success!("Enabled {}", repo);
            } else {
                info!("{} is not configured or already enabled", repo);
            }
        }
    }
    Ok(false)
}
