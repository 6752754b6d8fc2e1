//! Caller-owned snapshot of the package catalog.
use crate::{
    catalog::{
        parse_installed_listing, parse_policy_output, parse_show_output, split_arch,
        AvailableVersion, PolicyRecord, Selection,
    },
    config::Config,
    error::{Error, Result},
    executor::{apt, dpkg, patterns, CommandRunner},
    package::{Package, PackageState},
    types::PkgVersion,
};

use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap, HashSet},
};

/// Names per `apt-cache policy` invocation
const POLICY_BATCH: usize = 256;
/// Minimum similarity for [`PackageCache::suggest`]
const SUGGEST_THRESHOLD: f64 = 0.85;
const SUGGEST_MAX: usize = 5;

/// Packages known to dpkg, keyed by name (`name:arch` for foreign
/// architectures).
///
/// Reads answer from the snapshot taken by the last [`refresh`](Self::refresh)
/// and never refresh on their own. Mutations through
/// [`ensure`](Self::ensure) update the affected entry from the tool's
/// re-read state.
pub struct PackageCache<'a> {
    runner: &'a dyn CommandRunner,
    arch: String,
    packages: BTreeMap<String, Package>,
    skipped: Vec<usize>,
}

impl<'a> PackageCache<'a> {
    /// Build the cache and take the first snapshot.
    pub fn new(runner: &'a dyn CommandRunner, config: &Config) -> Result<Self> {
        let arch = match &config.arch {
            Some(arch) => arch.clone(),
            None => {
                let out = runner.run(&dpkg::print_architecture())?;
                let arch = out.stdout.trim();
                if arch.is_empty() {
                    return Err(Error::malformed_output(
                        "dpkg --print-architecture",
                        "empty architecture",
                        &out.stdout,
                    ));
                }
                arch.to_owned()
            }
        };
        let mut cache = PackageCache {
            runner,
            arch,
            packages: BTreeMap::new(),
            skipped: Vec::new(),
        };
        cache.refresh()?;
        Ok(cache)
    }

    /// Native architecture of this host.
    pub fn arch(&self) -> &str {
        &self.arch
    }

    fn is_foreign(&self, arch: &str) -> bool {
        arch != self.arch && arch != "all"
    }

    /// Cache key of `name` or `name:arch`.
    fn key(&self, name: &str) -> String {
        match split_arch(name) {
            (base, Some(arch)) if !self.is_foreign(arch) => base.to_owned(),
            _ => name.to_owned(),
        }
    }

    /// Rebuild the snapshot from `dpkg-query` and `apt-cache policy`.
    pub fn refresh(&mut self) -> Result<()> {
        let out = self.runner.run(&dpkg::listing())?;
        let listing = parse_installed_listing(&out.stdout);
        if !listing.skipped.is_empty() {
            debug!(
                "Skipped {} unrecognized lines in the package listing",
                listing.skipped.len()
            );
        }

        let keyed: Vec<(String, _)> = listing
            .records
            .into_iter()
            .map(|r| {
                let key = if self.is_foreign(&r.arch) {
                    format!("{}:{}", r.name, r.arch)
                } else {
                    r.name.clone()
                };
                (key, r)
            })
            .collect();

        let mut policies: HashMap<String, PolicyRecord> = HashMap::new();
        let keys: Vec<&str> = keyed.iter().map(|(k, _)| k.as_str()).collect();
        for chunk in keys.chunks(POLICY_BATCH) {
            let out = self.runner.run(&apt::policy(chunk))?;
            for record in parse_policy_output(&out.stdout)? {
                let key = match &record.arch {
                    Some(arch) => self.key(&format!("{}:{}", record.name, arch)),
                    None => record.name.clone(),
                };
                policies.insert(key, record);
            }
        }

        let holds = self.runner.run(&apt::showhold())?;
        let holds: HashSet<String> = holds
            .stdout
            .lines()
            .map(|l| self.key(l.trim()))
            .collect();

        let mut packages = BTreeMap::new();
        for (key, record) in keyed {
            let held = record.selection == Selection::Hold || holds.contains(&key);
            let foreign = self.is_foreign(&record.arch);
            let policy = policies.remove(&key).unwrap_or_else(|| PolicyRecord {
                name: record.name.clone(),
                arch: None,
                installed: record.version.clone(),
                candidate: None,
                versions: Vec::new(),
            });
            packages.insert(key, Package::from_policy(policy, &record.arch, foreign, held));
        }

        self.packages = packages;
        self.skipped = listing.skipped;
        Ok(())
    }

    /// Fails with [`Error::PackageNotFound`] if `name` was not in the last snapshot.
    pub fn get(&self, name: &str) -> Result<&Package> {
        self.packages
            .get(&self.key(name))
            .ok_or_else(|| Error::PackageNotFound {
                name: name.to_owned(),
            })
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Package> {
        let key = self.key(name);
        self.packages
            .get_mut(&key)
            .ok_or_else(|| Error::PackageNotFound {
                name: name.to_owned(),
            })
    }

    /// Like [`get`](Self::get), but asks apt about names dpkg has never seen.
    pub fn lookup(&mut self, name: &str) -> Result<&Package> {
        let key = self.key(name);
        if !self.packages.contains_key(&key) {
            let pkg = self.placeholder(name)?;
            if pkg.state() == PackageState::Absent {
                return Err(Error::PackageNotFound {
                    name: name.to_owned(),
                });
            }
            self.packages.insert(key.clone(), pkg);
        }
        self.get(&key)
    }

    /// Every version of `name` the repositories offer.
    pub fn available(&self, name: &str) -> Result<Vec<AvailableVersion>> {
        let not_found = || Error::PackageNotFound {
            name: name.to_owned(),
        };
        let out = match self.runner.run(&apt::show(&[name])).map_err(patterns::classify) {
            Ok(out) => out,
            Err(Error::NonZeroExit { ref stderr, .. }) if stderr.contains("No packages found") => {
                return Err(not_found())
            }
            Err(e) => return Err(e),
        };
        let res = parse_show_output(&out.stdout)?;
        if res.is_empty() {
            return Err(not_found());
        }
        Ok(res)
    }

    fn placeholder(&self, name: &str) -> Result<Package> {
        let (base, arch) = split_arch(name);
        let arch = arch.unwrap_or(&self.arch);
        let mut pkg = Package::placeholder(base, arch, self.is_foreign(arch));
        pkg.refresh(self.runner)?;
        Ok(pkg)
    }

    /// Bring `name` into `target`, creating a placeholder for unknown names.
    pub fn ensure(
        &mut self,
        name: &str,
        target: PackageState,
        version: Option<&PkgVersion>,
    ) -> Result<()> {
        let key = self.key(name);
        let mut pkg = match self.packages.get(&key) {
            Some(pkg) => pkg.clone(),
            None => self.placeholder(name)?,
        };
        let res = pkg.ensure(self.runner, target, version);
        // Keep whatever the package re-read, failed or not
        if self.packages.contains_key(&key) || pkg.installed_version().is_some() {
            self.packages.insert(key, pkg);
        }
        res
    }

    pub fn add_package(&mut self, name: &str, version: Option<&PkgVersion>) -> Result<()> {
        match version {
            Some(v) => self.ensure(name, PackageState::Present, Some(v)),
            None => self.ensure(name, PackageState::Present, None),
        }
    }

    pub fn remove_package(&mut self, name: &str) -> Result<()> {
        self.ensure(name, PackageState::Absent, None)
    }

    /// Install several packages.
    ///
    /// Names apt cannot find are retried once after refreshing the package
    /// index, unless the index was just refreshed.
    pub fn add_packages<S: AsRef<str>>(
        &mut self,
        names: &[S],
        version: Option<&PkgVersion>,
        update_first: bool,
    ) -> Result<()> {
        if update_first {
            self.update_index()?;
        }

        let mut missing = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.add_package(name, version) {
                Ok(()) => (),
                Err(e @ Error::PackageNotFound { .. }) | Err(e @ Error::VersionNotFound { .. }) => {
                    missing.push((name, e))
                }
                Err(e) => return Err(e),
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        if !update_first {
            info!("Updating the package index and retrying packages that were not found");
            self.update_index()?;
            self.refresh()?;
            let retry: Vec<&str> = missing.drain(..).map(|(n, _)| n).collect();
            for name in retry {
                match self.add_package(name, version) {
                    Ok(()) => (),
                    Err(e @ Error::PackageNotFound { .. })
                    | Err(e @ Error::VersionNotFound { .. }) => missing.push((name, e)),
                    Err(e) => return Err(e),
                }
            }
        }

        match missing.len() {
            0 => Ok(()),
            1 => Err(missing.remove(0).1),
            _ => Err(Error::PackageNotFound {
                name: missing
                    .iter()
                    .map(|(n, _)| *n)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Refresh the package index from the configured repositories.
    ///
    /// The snapshot is left alone, call [`refresh`](Self::refresh) afterwards.
    pub fn update_index(&self) -> Result<()> {
        self.runner.run(&apt::update())?;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn installed(&self) -> impl Iterator<Item = &Package> {
        self.packages
            .values()
            .filter(|p| p.installed_version().is_some())
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(&self.key(name))
    }

    /// Lines of the last listing that did not form a record.
    pub fn skipped_lines(&self) -> &[usize] {
        &self.skipped
    }

    /// Known names closest to `name`, best match first.
    pub fn suggest(&self, name: &str) -> Vec<&str> {
        let mut res: Vec<(&str, f64)> = self
            .packages
            .keys()
            .map(|k| (k.as_str(), strsim::jaro_winkler(k, name)))
            .filter(|(_, score)| *score >= SUGGEST_THRESHOLD)
            .collect();
        res.sort_by_key(|(k, score)| (Reverse((*score * 1000.0) as u32), *k));
        res.into_iter().take(SUGGEST_MAX).map(|(k, _)| k).collect()
    }
}
