mod state;

pub use state::PackageState;

use crate::{
    catalog::{parse_policy_output, PolicyRecord, VersionEntry},
    error::{Error, Result},
    executor::{apt, patterns, CommandRunner},
    types::PkgVersion,
};

/// One package as the package tools last reported it.
///
/// A `Package` never guesses the effect of a mutation: after every call to
/// apt it re-reads its policy block and compares what it asked for with
/// what it observes.
#[derive(Clone, Debug)]
pub struct Package {
    name: String,
    arch: String,
    /// Needs the `:arch` qualifier when talking to apt
    foreign: bool,
    installed: Option<PkgVersion>,
    candidate: Option<PkgVersion>,
    versions: Vec<VersionEntry>,
    held: bool,
}

impl Package {
    pub fn from_policy(record: PolicyRecord, arch: &str, foreign: bool, held: bool) -> Self {
        Package {
            name: record.name,
            arch: arch.to_owned(),
            foreign,
            installed: record.installed,
            candidate: record.candidate,
            versions: record.versions,
            held,
        }
    }

    /// A package the catalog does not know yet. Installing it is still attempted.
    pub fn placeholder(name: &str, arch: &str, foreign: bool) -> Self {
        Package {
            name: name.to_owned(),
            arch: arch.to_owned(),
            foreign,
            installed: None,
            candidate: None,
            versions: Vec::new(),
            held: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Fully qualified `name:arch`.
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.name, self.arch)
    }

    /// The name apt should be given for this package.
    pub fn apt_name(&self) -> String {
        if self.foreign {
            self.identifier()
        } else {
            self.name.clone()
        }
    }

    pub fn installed_version(&self) -> Option<&PkgVersion> {
        self.installed.as_ref()
    }

    pub fn candidate_version(&self) -> Option<&PkgVersion> {
        self.candidate.as_ref()
    }

    pub fn versions(&self) -> &[VersionEntry] {
        &self.versions
    }

    /// Versions some configured repository can deliver.
    pub fn offered_versions(&self) -> impl Iterator<Item = &PkgVersion> {
        self.versions
            .iter()
            .filter(|e| e.is_downloadable())
            .map(|e| &e.version)
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn state(&self) -> PackageState {
        match (&self.installed, &self.candidate) {
            (Some(installed), Some(candidate)) if installed == candidate => PackageState::Latest,
            (Some(_), _) => PackageState::Present,
            (None, Some(_)) => PackageState::Available,
            (None, None) => PackageState::Absent,
        }
    }

    /// Installed and nothing newer to upgrade to. A package installed from
    /// a local file has no candidate, a pinned one may have an older one.
    fn is_newest(&self) -> bool {
        match (&self.installed, &self.candidate) {
            (Some(installed), Some(candidate)) => candidate <= installed,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn describe(&self) -> String {
        match &self.installed {
            Some(v) => format!("{} ({})", self.state(), v),
            None => self.state().to_string(),
        }
    }

    fn mismatch(&self, expected: String) -> Error {
        Error::StateMismatch {
            name: self.identifier(),
            expected,
            observed: self.describe(),
        }
    }

    /// Re-read the policy block and hold mark of this package.
    pub fn refresh(&mut self, runner: &dyn CommandRunner) -> Result<()> {
        let apt_name = self.apt_name();
        let outcome = runner.run(&apt::policy(&[&apt_name]))?;
        let record = parse_policy_output(&outcome.stdout)?
            .into_iter()
            .find(|r| r.name == self.name && r.arch.as_deref().map_or(true, |a| a == self.arch));
        match record {
            Some(record) => {
                self.installed = record.installed;
                self.candidate = record.candidate;
                self.versions = record.versions;
            }
            None => {
                self.installed = None;
                self.candidate = None;
                self.versions.clear();
            }
        }

        let holds = runner.run(&apt::showhold())?;
        self.held = holds
            .stdout
            .lines()
            .any(|l| l.trim() == self.name || l.trim() == apt_name);
        Ok(())
    }

    /// Bring the package into `target`, optionally at an exact version.
    ///
    /// `Available` is treated as `Absent`, `Latest` with a version as
    /// `Present` with that version. Requests already satisfied run nothing.
    pub fn ensure(
        &mut self,
        runner: &dyn CommandRunner,
        target: PackageState,
        version: Option<&PkgVersion>,
    ) -> Result<()> {
        match (target, version) {
            (PackageState::Absent, _) | (PackageState::Available, _) => self.ensure_absent(runner),
            (PackageState::Present, Some(v)) | (PackageState::Latest, Some(v)) => {
                self.ensure_version(runner, v)
            }
            (PackageState::Present, None) => {
                if self.installed.is_some() {
                    return Ok(());
                }
                self.install(runner, &self.apt_name(), false)?;
                if self.installed.is_none() {
                    return Err(self.mismatch(PackageState::Present.to_string()));
                }
                Ok(())
            }
            (PackageState::Latest, None) => {
                if self.is_newest() {
                    return Ok(());
                }
                self.install(runner, &self.apt_name(), false)?;
                if !self.is_newest() {
                    return Err(self.mismatch(PackageState::Latest.to_string()));
                }
                Ok(())
            }
        }
    }

    fn ensure_version(&mut self, runner: &dyn CommandRunner, version: &PkgVersion) -> Result<()> {
        if self.installed.as_ref() == Some(version) {
            return Ok(());
        }
        if !self.offered_versions().any(|v| v == version) {
            return Err(Error::VersionNotFound {
                name: self.identifier(),
                version: version.to_string(),
            });
        }

        let downgrade = self.installed.as_ref().map_or(false, |i| version < i);
        let target = format!("{}={}", self.apt_name(), version);
        self.install(runner, &target, downgrade)?;
        if self.installed.as_ref() != Some(version) {
            return Err(self.mismatch(format!("{} ({})", PackageState::Present, version)));
        }
        Ok(())
    }

    fn install(&mut self, runner: &dyn CommandRunner, target: &str, downgrade: bool) -> Result<()> {
        debug!("Installing {}", target);
        runner
            .run(&apt::install(&[target], downgrade))
            .map_err(patterns::classify)?;
        self.refresh(runner)
    }

    fn ensure_absent(&mut self, runner: &dyn CommandRunner) -> Result<()> {
        if self.installed.is_none() {
            return Ok(());
        }
        debug!("Removing {}", self.identifier());
        match runner
            .run(&apt::remove(&[self.apt_name()], false))
            .map_err(patterns::classify)
        {
            // apt no longer knows it, so it cannot be installed either
            Ok(_) | Err(Error::PackageNotFound { .. }) => (),
            Err(e) => return Err(e),
        }
        self.refresh(runner)?;
        if self.installed.is_some() {
            return Err(self.mismatch(PackageState::Absent.to_string()));
        }
        Ok(())
    }

    /// Pin the package so bulk upgrades leave it alone. Idempotent.
    pub fn mark_held(&mut self, runner: &dyn CommandRunner) -> Result<()> {
        runner
            .run(&apt::hold(&self.apt_name()))
            .map_err(patterns::classify)?;
        self.held = true;
        Ok(())
    }

    /// Drop the pin set by [`mark_held`](Self::mark_held). Idempotent.
    pub fn unmark_held(&mut self, runner: &dyn CommandRunner) -> Result<()> {
        runner
            .run(&apt::unhold(&self.apt_name()))
            .map_err(patterns::classify)?;
        self.held = false;
        Ok(())
    }
}
