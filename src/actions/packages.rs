use super::ask_confirm;
use crate::opts::{InstallPkg, ListPkg, Opts};

use anyhow::{Context, Result};
use aptctl::{
    executor::{apt, CommandRunner},
    info, success, warn, Config, Error, PackageCache, PackageState, PkgVersion,
};
use console::style;
use std::str::FromStr;
use tabled::{Alignment, Full, Modify, Style, Table, Tabled};

#[derive(Tabled)]
struct PackageRow {
    #[header("Name")]
    name: String,
    #[header("Installed")]
    installed: String,
    #[header("Candidate")]
    candidate: String,
    #[header("State")]
    state: String,
}

#[derive(Tabled)]
struct VersionRow {
    #[header("Version")]
    version: String,
    #[header("Architecture")]
    arch: String,
    #[header("Section")]
    section: String,
    #[header("Installed Size")]
    size: String,
}

fn or_none<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "(none)".to_owned())
}

fn print_table<T: Tabled>(rows: &[T]) {
    let table = Table::new(rows)
        .with(Modify::new(Full).with(Alignment::left()))
        .with(Modify::new(Full).with(|s: &str| format!(" {} ", s)))
        .with(Style::psql());
    println!("{}", table);
}

/// Add "did you mean" hints to a failed lookup.
fn hint(cache: &PackageCache, err: Error) -> Error {
    if let Error::PackageNotFound { name } = &err {
        let suggestions = cache.suggest(name);
        if !suggestions.is_empty() {
            info!("Did you mean: {}", suggestions.join(", "));
        }
    }
    err
}

pub fn update(runner: &dyn CommandRunner) -> Result<bool> {
    info!("Updating package index...");
    runner
        .run(&apt::update())
        .context("Failed to update the package index")?;
    success!("Package index is up to date");
    Ok(false)
}

pub fn list(config: &Config, runner: &dyn CommandRunner, args: &ListPkg) -> Result<bool> {
    let cache = PackageCache::new(runner, config).context("Failed to read the package catalog")?;
    if !cache.skipped_lines().is_empty() {
        warn!(
            "Skipped {} malformed lines of the dpkg listing",
            cache.skipped_lines().len()
        );
    }
    let rows: Vec<PackageRow> = cache
        .installed()
        .filter(|p| !args.upgradable || p.state() == PackageState::Present)
        .map(|p| PackageRow {
            name: p.identifier(),
            installed: or_none(p.installed_version()),
            candidate: or_none(p.candidate_version()),
            state: if p.is_held() {
                format!("{} (held)", p.state())
            } else {
                p.state().to_string()
            },
        })
        .collect();
    if rows.is_empty() {
        info!("No packages to list");
    } else {
        print_table(&rows);
    }
    Ok(false)
}

pub fn show(config: &Config, runner: &dyn CommandRunner, name: &str) -> Result<bool> {
    let mut cache = PackageCache::new(runner, config).context("Failed to read the package catalog")?;
    let pkg = match cache.lookup(name).cloned() {
        Ok(pkg) => pkg,
        Err(e) => return Err(hint(&cache, e).into()),
    };

    println!("{:>12} {}", style("Package:").bold(), pkg.identifier());
    println!("{:>12} {}", style("State:").bold(), pkg.state());
    println!("{:>12} {}", style("Installed:").bold(), or_none(pkg.installed_version()));
    println!("{:>12} {}", style("Candidate:").bold(), or_none(pkg.candidate_version()));
    if pkg.is_held() {
        println!("{:>12} yes", style("Held:").bold());
    }

    match cache.available(&pkg.apt_name()) {
        Ok(versions) => {
            if let Some(summary) = versions.iter().find_map(|v| v.summary.as_ref()) {
                println!("{:>12} {}", style("Summary:").bold(), summary);
            }
            let rows: Vec<VersionRow> = versions
                .into_iter()
                .map(|v| VersionRow {
                    version: v.version.to_string(),
                    arch: v.arch,
                    section: v.section.unwrap_or_default(),
                    size: v
                        .installed_size
                        .map(|s| format!("{} KiB", s))
                        .unwrap_or_default(),
                })
                .collect();
            print_table(&rows);
        }
        // Installed from a local file, no repository offers it
        Err(Error::PackageNotFound { .. }) => info!("No repository offers {}", pkg.identifier()),
        Err(e) => return Err(e.into()),
    }
    Ok(false)
}

pub fn install(config: &Config, runner: &dyn CommandRunner, args: &InstallPkg) -> Result<bool> {
    let version = match &args.version {
        Some(v) => Some(PkgVersion::from_str(v)?),
        None => None,
    };
    let mut cache = PackageCache::new(runner, config).context("Failed to read the package catalog")?;
    info!("Installing {} ...", args.names.join(", "));
    if let Err(e) = cache.add_packages(&args.names, version.as_ref(), args.update) {
        return Err(hint(&cache, e).into());
    }
    for name in &args.names {
        if let Ok(pkg) = cache.get(name) {
            success!("{} {} is installed", pkg.identifier(), or_none(pkg.installed_version()));
        }
    }
    Ok(false)
}

pub fn remove(
    config: &Config,
    opts: &Opts,
    runner: &dyn CommandRunner,
    names: &[String],
) -> Result<bool> {
    let mut cache = PackageCache::new(runner, config).context("Failed to read the package catalog")?;
    let installed: Vec<&String> = names
        .iter()
        .filter(|n| {
            cache
                .get(n)
                .map_or(false, |p| p.installed_version().is_some())
        })
        .collect();
    for name in names.iter().filter(|n| !installed.contains(n)) {
        info!("{} is not installed", name);
    }
    if installed.is_empty() {
        success!("There's nothing to remove");
        return Ok(false);
    }

    let list = installed
        .iter()
        .map(|n| n.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    info!("These packages will be {}: {}", style("removed").red().bold(), list);
    if !ask_confirm(opts, "Proceed?")? {
        return Ok(true);
    }
    let installed: Vec<String> = installed.into_iter().cloned().collect();
    for name in &installed {
        cache
            .remove_package(name)
            .with_context(|| format!("Failed to remove {}", name))?;
        success!("Removed {}", name);
    }
    Ok(false)
}

pub fn hold(config: &Config, runner: &dyn CommandRunner, name: &str, held: bool) -> Result<bool> {
    let mut cache = PackageCache::new(runner, config).context("Failed to read the package catalog")?;
    if let Err(e) = cache.get(name) {
        return Err(hint(&cache, e).into());
    }
    let pkg = cache.get_mut(name)?;
    if held {
        pkg.mark_held(runner)?;
        success!("{} is held at {}", pkg.identifier(), or_none(pkg.installed_version()));
    } else {
        pkg.unmark_held(runner)?;
        success!("{} is no longer held", pkg.identifier());
    }
    Ok(false)
}
