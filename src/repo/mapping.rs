use super::{
    deb822, oneline, write_atomic, Identity, KeyStore, Repository, SigningKey, SourceSyntax,
};
use crate::{
    config::Config,
    error::{Error, Result},
    executor::CommandRunner,
};

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

/// How the metadata of a repository is authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trust {
    /// No key named, any key in the global keyrings is accepted
    Global,
    /// Signed by the key in this keyring file
    Keyring(PathBuf),
    /// Key material is embedded in the definition
    Inline,
    /// The named key is not installed yet
    Pending,
}

#[derive(Debug, Clone)]
enum Block {
    /// Comments, blank lines and entries that failed to parse
    Raw(String),
    Line {
        repo: Repository,
        raw: String,
        dirty: bool,
        removed: bool,
    },
    Stanza {
        raw: Vec<String>,
        comments: Vec<String>,
        repos: Vec<Repository>,
        dirty: bool,
    },
}

#[derive(Debug, Clone)]
struct SourceFile {
    path: PathBuf,
    syntax: SourceSyntax,
    blocks: Vec<Block>,
    dirty: bool,
}

fn syntax_of(path: &Path) -> SourceSyntax {
    match path.extension().and_then(|e| e.to_str()) {
        Some("sources") => SourceSyntax::Deb822,
        _ => SourceSyntax::OneLine,
    }
}

impl SourceFile {
    fn new(path: PathBuf) -> Self {
        SourceFile {
            syntax: syntax_of(&path),
            path,
            blocks: Vec::new(),
            dirty: true,
        }
    }

    /// Read a source file. Entries that fail to parse are kept verbatim and
    /// reported through `errors`, unless the file has no valid entry at all.
    fn parse(path: &Path, text: &str, errors: &mut Vec<Error>) -> Result<Self> {
        let mut file = SourceFile {
            path: path.to_owned(),
            syntax: syntax_of(path),
            blocks: Vec::new(),
            dirty: false,
        };
        let mut local_errors = Vec::new();
        let mut has_content = false;
        let lines: Vec<(usize, &str)> = text.lines().enumerate().map(|(n, l)| (n + 1, l)).collect();

        match file.syntax {
            SourceSyntax::OneLine => {
                for &(n, line) in &lines {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        file.blocks.push(Block::Raw(line.to_owned()));
                        continue;
                    }
                    let is_comment = trimmed.starts_with('#');
                    has_content |= !is_comment;
                    match oneline::parse(line) {
                        Ok(repo) => file.blocks.push(Block::Line {
                            repo,
                            raw: line.to_owned(),
                            dirty: false,
                            removed: false,
                        }),
                        Err(e) => {
                            if !is_comment {
                                local_errors.push(e.at(path, n));
                            }
                            file.blocks.push(Block::Raw(line.to_owned()));
                        }
                    }
                }
            }
            SourceSyntax::Deb822 => {
                let mut i = 0;
                while i < lines.len() {
                    if lines[i].1.trim().is_empty() {
                        file.blocks.push(Block::Raw(lines[i].1.to_owned()));
                        i += 1;
                        continue;
                    }
                    let start = i;
                    while i < lines.len() && !lines[i].1.trim().is_empty() {
                        i += 1;
                    }
                    let group = &lines[start..i];
                    let raw: Vec<String> = group.iter().map(|(_, l)| (*l).to_owned()).collect();
                    if !deb822::has_fields(group) {
                        file.blocks.extend(raw.into_iter().map(Block::Raw));
                        continue;
                    }
                    has_content = true;
                    match deb822::parse(group) {
                        Ok(repos) => {
                            let comments = raw
                                .iter()
                                .filter(|l| l.trim_start().starts_with('#'))
                                .cloned()
                                .collect();
                            file.blocks.push(Block::Stanza {
                                raw,
                                comments,
                                repos,
                                dirty: false,
                            });
                        }
                        Err(e) => {
                            local_errors.push(e.in_file(path));
                            file.blocks.extend(raw.into_iter().map(Block::Raw));
                        }
                    }
                }
            }
        }

        if has_content && file.entries().is_empty() {
            return Err(if local_errors.is_empty() {
                Error::malformed_repo("", "no valid repository definition").in_file(path)
            } else {
                local_errors.remove(0)
            });
        }
        errors.append(&mut local_errors);
        Ok(file)
    }

    fn entries(&self) -> Vec<&Repository> {
        let mut res = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Line {
                    repo,
                    removed: false,
                    ..
                } => res.push(repo),
                Block::Stanza { repos, .. } => res.extend(repos.iter()),
                _ => (),
            }
        }
        res
    }

    fn push(&mut self, mut repo: Repository) {
        repo.syntax = self.syntax;
        match self.syntax {
            SourceSyntax::OneLine => self.blocks.push(Block::Line {
                raw: String::new(),
                repo,
                dirty: true,
                removed: false,
            }),
            SourceSyntax::Deb822 => {
                let needs_separator = matches!(self.blocks.last(), Some(Block::Raw(l)) if !l.trim().is_empty())
                    || matches!(self.blocks.last(), Some(Block::Line { .. }) | Some(Block::Stanza { .. }));
                if needs_separator {
                    self.blocks.push(Block::Raw(String::new()));
                }
                self.blocks.push(Block::Stanza {
                    raw: Vec::new(),
                    comments: Vec::new(),
                    repos: vec![repo],
                    dirty: true,
                });
            }
        }
        self.dirty = true;
    }

    /// Apply `f` to every entry with the identity. Returns the entries
    /// as they were before the change, for each one `f` reported changed.
    fn update<F>(&mut self, identity: &Identity, mut f: F) -> Vec<Repository>
    where
        F: FnMut(&mut Repository) -> bool,
    {
        let mut touched = Vec::new();
        for block in self.blocks.iter_mut() {
            match block {
                Block::Line {
                    repo,
                    dirty,
                    removed: false,
                    ..
                } if &repo.identity() == identity => {
                    let before = repo.clone();
                    if f(repo) {
                        *dirty = true;
                        touched.push(before);
                    }
                }
                Block::Stanza { repos, dirty, .. } => {
                    for repo in repos.iter_mut().filter(|r| &r.identity() == identity) {
                        let before = repo.clone();
                        if f(repo) {
                            *dirty = true;
                            touched.push(before);
                        }
                    }
                }
                _ => (),
            }
        }
        self.dirty |= !touched.is_empty();
        touched
    }

    fn remove(&mut self, identity: &Identity) -> Vec<Repository> {
        let mut removed_repos = Vec::new();
        for block in self.blocks.iter_mut() {
            match block {
                Block::Line { repo, removed, .. } if !*removed && &repo.identity() == identity => {
                    *removed = true;
                    removed_repos.push(repo.clone());
                }
                Block::Stanza { repos, dirty, .. } => {
                    let before = repos.len();
                    repos.retain(|r| {
                        if &r.identity() == identity {
                            removed_repos.push(r.clone());
                            false
                        } else {
                            true
                        }
                    });
                    if repos.len() != before {
                        *dirty = true;
                    }
                }
                _ => (),
            }
        }
        self.dirty |= !removed_repos.is_empty();
        removed_repos
    }

    fn render(&self) -> String {
        let mut out: Vec<String> = Vec::new();
        let mut skip_blank = false;
        for block in &self.blocks {
            let text = match block {
                Block::Raw(line) => {
                    if skip_blank && line.trim().is_empty() {
                        skip_blank = false;
                        continue;
                    }
                    line.clone()
                }
                Block::Line { removed: true, .. } => continue,
                Block::Line {
                    raw, dirty: false, ..
                } => raw.clone(),
                Block::Line { repo, .. } => oneline::render(repo),
                Block::Stanza { repos, .. } if repos.is_empty() => {
                    // Drop the separator along with the stanza
                    skip_blank = true;
                    continue;
                }
                Block::Stanza {
                    raw, dirty: false, ..
                } => raw.join("\n"),
                Block::Stanza {
                    comments, repos, ..
                } => {
                    let mut lines = comments.clone();
                    lines.push(deb822::render(repos));
                    lines.join("\n")
                }
            };
            skip_blank = false;
            out.push(text);
        }
        while out.last().map_or(false, |l| l.trim().is_empty()) {
            out.pop();
        }
        if out.is_empty() {
            return String::new();
        }
        out.join("\n") + "\n"
    }
}

/// Every repository defined in the APT source files, and the means to
/// change them.
pub struct RepositoryMapping<'a> {
    runner: &'a dyn CommandRunner,
    sources_list: PathBuf,
    sources_list_d: PathBuf,
    keys: KeyStore,
    files: Vec<SourceFile>,
    errors: Vec<Error>,
}

impl<'a> RepositoryMapping<'a> {
    pub fn new(config: &Config, runner: &'a dyn CommandRunner) -> Self {
        RepositoryMapping {
            runner,
            sources_list: config.sources_list(),
            sources_list_d: config.sources_list_d(),
            keys: KeyStore::new(config),
            files: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    fn source_paths(&self) -> Result<Vec<PathBuf>> {
        let mut res = Vec::new();
        if self.sources_list.is_file() {
            res.push(self.sources_list.clone());
        }
        if self.sources_list_d.is_dir() {
            let mut parts: Vec<PathBuf> = fs::read_dir(&self.sources_list_d)
                .map_err(|e| Error::io(&self.sources_list_d, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && matches!(
                            p.extension().and_then(|e| e.to_str()),
                            Some("list") | Some("sources")
                        )
                })
                .collect();
            parts.sort();
            res.append(&mut parts);
        }
        Ok(res)
    }

    /// Read every source file, replacing what was loaded before.
    pub fn load(&mut self) -> Result<()> {
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for path in self.source_paths()? {
            debug!("Reading sources from {}", path.display());
            let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            files.push(SourceFile::parse(&path, &text, &mut errors)?);
        }
        for e in &errors {
            warn!("Ignoring {}", e);
        }
        self.files = files;
        self.errors = errors;
        Ok(())
    }

    /// Entries skipped during the last load.
    pub fn load_errors(&self) -> &[Error] {
        &self.errors
    }

    fn entries(&self) -> impl Iterator<Item = &Repository> {
        self.files.iter().flat_map(|f| f.entries())
    }

    /// Repositories in the order they were read. Duplicate identities are
    /// merged, the enabled flag of the last one read wins.
    pub fn repositories(&self) -> Vec<Repository> {
        let mut res: Vec<Repository> = Vec::new();
        let mut seen: HashMap<Identity, usize> = HashMap::new();
        for repo in self.entries() {
            match seen.get(&repo.identity()) {
                Some(&i) => res[i].enabled = repo.enabled,
                None => {
                    seen.insert(repo.identity(), res.len());
                    res.push(repo.clone());
                }
            }
        }
        res
    }

    pub fn get(&self, identity: &Identity) -> Option<Repository> {
        self.repositories()
            .into_iter()
            .find(|r| &r.identity() == identity)
    }

    pub fn contains(&self, repo: &Repository) -> bool {
        let identity = repo.identity();
        self.entries().any(|r| r.identity() == identity)
    }

    pub fn len(&self) -> usize {
        self.repositories().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    /// Install the signing key a repository names and point the entry at
    /// the installed keyring.
    fn install_key(&self, mut repo: Repository) -> Result<Repository> {
        match &repo.signing_key {
            Some(SigningKey::KeyId(id)) => {
                let path = self.keys.import_key_id(id, self.runner)?;
                repo.signing_key = Some(SigningKey::Keyring(path));
            }
            Some(SigningKey::Material(material)) => {
                let path = self.keys.import_material(material)?;
                repo.signing_key = Some(SigningKey::Keyring(path));
            }
            Some(SigningKey::Keyring(path)) if !path.is_file() => {
                warn!(
                    "Keyring {} does not exist, {} stays untrusted until it is installed",
                    path.display(),
                    repo
                );
            }
            _ => (),
        }
        Ok(repo)
    }

    /// Add a repository to the file it would be created in by default.
    /// See [`add_to`](Self::add_to).
    pub fn add(&mut self, repo: Repository) -> Result<bool> {
        let path = repo.default_filename(self.sources_list.parent().unwrap_or(Path::new("/")));
        self.add_to(repo, &path)
    }

    /// Add a repository to `path` and install its signing key.
    ///
    /// An identity that is already defined is not written again, a disabled
    /// one is enabled instead. Returns whether any file changed.
    pub fn add_to(&mut self, repo: Repository, path: &Path) -> Result<bool> {
        if self.contains(&repo) {
            if self.entries().any(|r| r.identity() == repo.identity() && r.enabled) {
                debug!("{} is already defined", repo);
                return Ok(false);
            }
            return self.enable(&repo);
        }
        let repo = self.install_key(repo)?;

        let backup = self.files.clone();
        let idx = match self.files.iter().position(|f| f.path == path) {
            Some(idx) => idx,
            None => {
                let text = match fs::read_to_string(path) {
                    Ok(text) => Some(text),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                    Err(e) => return Err(Error::io(path, e)),
                };
                let file = match text {
                    Some(text) => SourceFile::parse(path, &text, &mut self.errors)?,
                    None => SourceFile::new(path.to_owned()),
                };
                self.files.push(file);
                self.files.len() - 1
            }
        };
        info!("Adding {} to {}", repo, path.display());
        self.files[idx].push(repo.with_syntax(syntax_of(path)));
        self.commit(backup)?;
        Ok(true)
    }

    /// Delete every definition of the repository. Its keyring goes too when
    /// it lives in the key store and nothing else refers to it.
    pub fn remove(&mut self, repo: &Repository) -> Result<bool> {
        let identity = repo.identity();
        let backup = self.files.clone();
        let mut removed = Vec::new();
        for file in self.files.iter_mut() {
            removed.append(&mut file.remove(&identity));
        }
        if removed.is_empty() {
            debug!("{} is not defined, nothing to remove", repo);
            return Ok(false);
        }
        info!("Removing {}", repo);
        self.commit(backup)?;

        let mut orphans: Vec<PathBuf> = removed
            .iter()
            .filter_map(|r| r.signing_key.as_ref())
            .filter_map(|k| self.keys.resolve(k))
            .filter(|p| self.keys.owns(p))
            .collect();
        orphans.sort();
        orphans.dedup();
        for path in orphans {
            let in_use = self
                .entries()
                .filter_map(|r| r.signing_key.as_ref())
                .any(|k| self.keys.resolve(k).as_deref() == Some(path.as_path()));
            if in_use {
                debug!("Keeping {}, still in use", path.display());
            } else {
                self.keys.remove(&path)?;
            }
        }
        Ok(true)
    }

    fn set_enabled(&mut self, repo: &Repository, enabled: bool) -> Result<bool> {
        let identity = repo.identity();
        let backup = self.files.clone();
        let mut changed = false;
        for file in self.files.iter_mut() {
            let touched = file.update(&identity, |r| {
                if r.enabled == enabled {
                    false
                } else {
                    r.enabled = enabled;
                    true
                }
            });
            changed |= !touched.is_empty();
        }
        if changed {
            info!(
                "{} {}",
                if enabled { "Enabling" } else { "Disabling" },
                repo
            );
            self.commit(backup)?;
        }
        Ok(changed)
    }

    /// Comment out every definition of the repository.
    pub fn disable(&mut self, repo: &Repository) -> Result<bool> {
        self.set_enabled(repo, false)
    }

    pub fn enable(&mut self, repo: &Repository) -> Result<bool> {
        self.set_enabled(repo, true)
    }

    pub fn trust(&self, repo: &Repository) -> Trust {
        match &repo.signing_key {
            None => Trust::Global,
            Some(SigningKey::Material(_)) => Trust::Inline,
            Some(key) => match self.keys.resolve(key) {
                Some(path) => Trust::Keyring(path),
                None => Trust::Pending,
            },
        }
    }

    /// Enabled repositories whose key is available.
    pub fn trusted(&self) -> Vec<Repository> {
        self.repositories()
            .into_iter()
            .filter(|r| r.enabled && self.trust(r) != Trust::Pending)
            .collect()
    }

    /// Write back the changes, or return to `backup` for every file that
    /// could not be written.
    fn commit(&mut self, backup: Vec<SourceFile>) -> Result<()> {
        let err = match self.write() {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        let mut backup = backup.into_iter();
        let files = std::mem::take(&mut self.files);
        for file in files {
            let old = backup.next();
            if !file.dirty {
                self.files.push(file);
            } else if let Some(old) = old {
                self.files.push(old);
            }
        }
        Err(err)
    }

    /// Write back every changed file. Files under `sources.list.d` left
    /// without content are deleted.
    fn write(&mut self) -> Result<()> {
        let sources_list_d = self.sources_list_d.clone();
        for file in self.files.iter_mut().filter(|f| f.dirty) {
            let content = file.render();
            if content.is_empty() && file.path.parent() == Some(sources_list_d.as_path()) {
                if file.path.exists() {
                    fs::remove_file(&file.path).map_err(|e| Error::io(&file.path, e))?;
                    debug!("Deleted empty {}", file.path.display());
                }
            } else {
                write_atomic(&file.path, content.as_bytes())?;
                debug!("Wrote {}", file.path.display());
            }
            file.dirty = false;
        }
        self.files.retain(|f| f.path.exists() || !f.entries().is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        executor::{download, ScriptedRunner},
        repo::{keys::test::armored_cert, SourceKind},
    };
    use sequoia_openpgp::{parse::Parse, Cert};

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = Config {
                apt_dir: dir.path().join("apt"),
                trusted_keys_dir: dir.path().join("keys"),
                keyserver: "https://keys.example.org/{}".to_owned(),
                ..Config::default()
            };
            fs::create_dir_all(config.sources_list_d()).unwrap();
            Fixture { _dir: dir, config }
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = if name == "sources.list" {
                self.config.sources_list()
            } else {
                self.config.sources_list_d().join(name)
            };
            fs::write(&path, content).unwrap();
            path
        }

        fn mapping<'a>(&self, runner: &'a ScriptedRunner) -> RepositoryMapping<'a> {
            let mut mapping = RepositoryMapping::new(&self.config, runner);
            mapping.load().unwrap();
            mapping
        }
    }

    const SOURCES_LIST: &str = "# Main archive
deb http://archive.ubuntu.com/ubuntu jammy main restricted
# deb-src http://archive.ubuntu.com/ubuntu jammy main restricted

deb http://mirror.example.com/ubuntu
deb http://security.ubuntu.com/ubuntu jammy-security main
";

    const UBUNTU_SOURCES: &str = "## Updates
Types: deb
URIs: http://archive.ubuntu.com/ubuntu
Suites: jammy-updates jammy-backports
Components: main

Types: deb
URIs: http://ppa.example.com/ubuntu
Suites: jammy
Components: main
Enabled: no
";

    fn ubuntu(suite: &str) -> Repository {
        Repository::new(SourceKind::Binary, "http://archive.ubuntu.com/ubuntu", suite, vec!["main"])
    }

    #[test]
    fn load_all_sources() {
        let fixture = Fixture::new();
        fixture.write("sources.list", SOURCES_LIST);
        fixture.write("ubuntu.sources", UBUNTU_SOURCES);
        fixture.write("ignored.save", "not a source file");
        let runner = ScriptedRunner::new();
        let mapping = fixture.mapping(&runner);

        let repos = mapping.repositories();
        let listed: Vec<(String, &str, bool)> = repos
            .iter()
            .map(|r| (r.kind.to_string(), r.suite.as_str(), r.enabled))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("deb".to_owned(), "jammy", true),
                ("deb-src".to_owned(), "jammy", false),
                ("deb".to_owned(), "jammy-security", true),
                ("deb".to_owned(), "jammy-updates", true),
                ("deb".to_owned(), "jammy-backports", true),
                ("deb".to_owned(), "jammy", false),
            ]
        );
        assert_eq!(mapping.len(), 6);
        assert!(mapping.contains(&ubuntu("jammy-updates")));
        assert!(mapping.get(&ubuntu("jammy-updates").identity()).is_some());

        let errors = mapping.load_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            Error::MalformedRepository { line_no: Some(5), file: Some(_), .. }
        ));
    }

    #[test]
    fn file_without_valid_entries_fails() {
        let fixture = Fixture::new();
        fixture.write("sources.list", SOURCES_LIST);
        let bad = fixture.write("broken.list", "# leftovers\ndeb http://example.com\n");
        let runner = ScriptedRunner::new();
        let mut mapping = RepositoryMapping::new(&fixture.config, &runner);
        match mapping.load() {
            Err(Error::MalformedRepository { file, line_no, .. }) => {
                assert_eq!(file, Some(bad));
                assert_eq!(line_no, Some(2));
            }
            other => panic!("expected MalformedRepository, got {:?}", other.err()),
        }

        // Only comments is fine
        fixture.write("broken.list", "# nothing here\n");
        mapping.load().unwrap();
    }

    #[test]
    fn duplicates_merge() {
        let fixture = Fixture::new();
        fixture.write("a.list", "deb http://example.com/debian stable main\n");
        fixture.write("b.list", "# deb http://example.com/debian stable main contrib\n");
        let runner = ScriptedRunner::new();
        let mapping = fixture.mapping(&runner);
        let repos = mapping.repositories();
        assert_eq!(repos.len(), 1);
        assert!(!repos[0].enabled);
        assert_eq!(repos[0].components, vec!["main"]);
    }

    #[test]
    fn add_is_idempotent() {
        let fixture = Fixture::new();
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);
        let repo = Repository::new(
            SourceKind::Binary,
            "https://download.example.com/linux/ubuntu",
            "jammy",
            vec!["stable"],
        );
        assert!(mapping.add(repo.clone()).unwrap());
        assert!(!mapping.add(repo.clone()).unwrap());

        let path = fixture.config.sources_list_d().join("linux-ubuntu-jammy.list");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "deb https://download.example.com/linux/ubuntu jammy stable\n"
        );

        let mut reloaded = fixture.mapping(&runner);
        assert_eq!(reloaded.repositories(), vec![repo.clone()]);
        assert!(!reloaded.add(repo).unwrap());
    }

    #[test]
    fn add_keeps_comments() {
        let fixture = Fixture::new();
        let path = fixture.write("sources.list", SOURCES_LIST);
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);
        let repo = Repository::new(SourceKind::Binary, "http://example.com/debian", "stable", vec!["main"]);
        assert!(mapping.add_to(repo, &path).unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}deb http://example.com/debian stable main\n", SOURCES_LIST)
        );
    }

    #[test]
    fn add_deb822() {
        let fixture = Fixture::new();
        let path = fixture.write("ubuntu.sources", UBUNTU_SOURCES);
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);
        let repo = Repository::new(SourceKind::Source, "http://archive.ubuntu.com/ubuntu", "jammy", vec!["main"]);
        assert!(mapping.add_to(repo, &path).unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!(
                "{}\nTypes: deb-src\nURIs: http://archive.ubuntu.com/ubuntu\nSuites: jammy\nComponents: main\n",
                UBUNTU_SOURCES
            )
        );
    }

    #[test]
    fn add_enables_disabled() {
        let fixture = Fixture::new();
        let path = fixture.write("example.list", "# deb http://example.com/debian stable main\n");
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);
        let repo = Repository::new(SourceKind::Binary, "http://example.com/debian", "stable", vec!["main"]);
        assert!(mapping.add(repo).unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "deb http://example.com/debian stable main\n"
        );
    }

    #[test]
    fn disable_and_enable() {
        let fixture = Fixture::new();
        let path = fixture.write("sources.list", SOURCES_LIST);
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);
        let security = Repository::new(
            SourceKind::Binary,
            "http://security.ubuntu.com/ubuntu",
            "jammy-security",
            vec!["main"],
        );

        assert!(mapping.disable(&security).unwrap());
        assert!(!mapping.disable(&security).unwrap());
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("# deb http://security.ubuntu.com/ubuntu jammy-security main\n"));
        assert!(text.starts_with("# Main archive\n"));
        assert!(!fixture.mapping(&runner).get(&security.identity()).unwrap().enabled);

        assert!(mapping.enable(&security).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), SOURCES_LIST);

        // Unknown identities are left alone
        let unknown = Repository::new(SourceKind::Binary, "http://nowhere.example.com", "x", vec!["main"]);
        assert!(!mapping.disable(&unknown).unwrap());
        assert!(!mapping.remove(&unknown).unwrap());
    }

    #[test]
    fn stanza_split_on_change() {
        let fixture = Fixture::new();
        let path = fixture.write("ubuntu.sources", UBUNTU_SOURCES);
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);
        assert!(mapping.disable(&ubuntu("jammy-backports")).unwrap());

        let expected = "## Updates
Types: deb
URIs: http://archive.ubuntu.com/ubuntu
Suites: jammy-updates
Components: main

Types: deb
URIs: http://archive.ubuntu.com/ubuntu
Suites: jammy-backports
Components: main
Enabled: no

Types: deb
URIs: http://ppa.example.com/ubuntu
Suites: jammy
Components: main
Enabled: no
";
        assert_eq!(fs::read_to_string(&path).unwrap(), expected);
        let reloaded = fixture.mapping(&runner);
        assert!(reloaded.get(&ubuntu("jammy-updates").identity()).unwrap().enabled);
        assert!(!reloaded.get(&ubuntu("jammy-backports").identity()).unwrap().enabled);
    }

    #[test]
    fn remove_stanzas_and_files() {
        let fixture = Fixture::new();
        let path = fixture.write("ubuntu.sources", UBUNTU_SOURCES);
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);
        let ppa = Repository::new(SourceKind::Binary, "http://ppa.example.com/ubuntu", "jammy", vec!["main"]);

        assert!(mapping.remove(&ppa).unwrap());
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("ppa.example.com"));
        assert!(text.starts_with(UBUNTU_SOURCES.split("\n\n").next().unwrap()));

        assert!(mapping.remove(&ubuntu("jammy-updates")).unwrap());
        assert!(mapping.remove(&ubuntu("jammy-backports")).unwrap());
        assert!(!path.exists());
        assert!(mapping.is_empty());
    }

    #[test]
    fn shared_keys_are_kept() {
        let fixture = Fixture::new();
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);
        let (_, armored) = armored_cert();

        let stable = Repository::new(SourceKind::Binary, "https://example.com/apt", "stable", vec!["main"])
            .with_signing_key(SigningKey::Material(armored.clone()));
        let testing = Repository::new(SourceKind::Binary, "https://example.com/apt", "testing", vec!["main"])
            .with_signing_key(SigningKey::Material(armored));
        mapping.add(stable.clone()).unwrap();
        mapping.add(testing.clone()).unwrap();

        let key = match mapping.trust(&mapping.get(&stable.identity()).unwrap()) {
            Trust::Keyring(path) => path,
            other => panic!("expected a keyring, got {:?}", other),
        };
        assert!(key.starts_with(&fixture.config.trusted_keys_dir));
        let line = fs::read_to_string(fixture.config.sources_list_d().join("apt-stable.list")).unwrap();
        assert_eq!(
            line,
            format!("deb [signed-by={}] https://example.com/apt stable main\n", key.display())
        );

        mapping.remove(&stable).unwrap();
        assert!(key.is_file());
        mapping.remove(&testing).unwrap();
        assert!(!key.exists());
    }

    #[test]
    fn add_fetches_key_ids() {
        let fixture = Fixture::new();
        let (cert, armored) = armored_cert();
        let fpr = cert.fingerprint().to_hex();
        let fetch = download::fetch(&format!("https://keys.example.org/{}", fpr)).command_line();
        let runner = ScriptedRunner::new().on(&fetch, &armored);
        let mut mapping = fixture.mapping(&runner);

        let repo = Repository::new(SourceKind::Binary, "https://example.com/apt", "stable", vec!["main"])
            .with_signing_key(SigningKey::KeyId(fpr.clone()));
        mapping.add(repo.clone()).unwrap();
        let path = fixture.config.trusted_keys_dir.join(format!("{}.gpg", fpr));
        assert_eq!(Cert::from_file(&path).unwrap().fingerprint(), cert.fingerprint());
        assert_eq!(mapping.trust(&repo), Trust::Keyring(path));

        // A key the keyserver does not know
        let runner = ScriptedRunner::new().fail(&download::fetch("https://keys.example.org/0123456789ABCDEF").command_line(), 22, "404");
        let mut mapping = fixture.mapping(&runner);
        let other = Repository::new(SourceKind::Binary, "https://other.example.com/apt", "stable", vec!["main"])
            .with_signing_key(SigningKey::KeyId("0123456789ABCDEF".to_owned()));
        assert!(matches!(mapping.add(other.clone()), Err(Error::KeyImportFailed { .. })));
        assert!(!mapping.contains(&other));
    }

    #[test]
    fn failed_write_keeps_memory_in_sync() {
        let fixture = Fixture::new();
        let path = fixture.write("a.list", "deb http://example.com/debian stable main\n");
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);

        // The rename onto a directory fails
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        let repo = Repository::new(SourceKind::Binary, "http://example.com/debian", "testing", vec!["main"]);
        assert!(mapping.add_to(repo.clone(), &path).is_err());
        assert!(!mapping.contains(&repo));
        let stable = Repository::new(SourceKind::Binary, "http://example.com/debian", "stable", vec!["main"]);
        assert!(mapping.disable(&stable).is_err());
        assert!(mapping.get(&stable.identity()).unwrap().enabled);
        assert!(mapping.remove(&stable).is_err());
        assert!(mapping.contains(&stable));

        fs::remove_dir(&path).unwrap();
        fs::write(&path, "deb http://example.com/debian stable main\n").unwrap();
        assert!(mapping.add_to(repo.clone(), &path).unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "deb http://example.com/debian stable main\ndeb http://example.com/debian testing main\n"
        );
    }

    #[test]
    fn readding_skips_key_import() {
        let fixture = Fixture::new();
        fixture.write("sources.list", "deb [signed-by=0123456789ABCDEF] http://other.example.com stable main\n");
        let runner = ScriptedRunner::new();
        let mut mapping = fixture.mapping(&runner);
        let repo = Repository::new(SourceKind::Binary, "http://other.example.com", "stable", vec!["main"])
            .with_signing_key(SigningKey::KeyId("0123456789ABCDEF".to_owned()));
        assert!(!mapping.add(repo).unwrap());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn trust_levels() {
        let fixture = Fixture::new();
        fixture.write(
            "sources.list",
            "deb http://archive.ubuntu.com/ubuntu jammy main
deb [signed-by=/nonexistent/vendor.gpg] http://vendor.example.com stable main
deb [signed-by=0123456789ABCDEF] http://other.example.com stable main
",
        );
        let runner = ScriptedRunner::new();
        let mapping = fixture.mapping(&runner);
        let trust: Vec<Trust> = mapping.repositories().iter().map(|r| mapping.trust(r)).collect();
        assert_eq!(trust, vec![Trust::Global, Trust::Pending, Trust::Pending]);
        assert_eq!(mapping.trusted().len(), 1);

        let inline = ubuntu("jammy").with_signing_key(SigningKey::Material("key".to_owned()));
        assert_eq!(mapping.trust(&inline), Trust::Inline);
    }
}
