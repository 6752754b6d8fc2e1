use super::{write_atomic, SigningKey};
use crate::{
    config::Config,
    error::{Error, Result},
    executor::{download, CommandRunner},
};

use sequoia_openpgp::{
    cert::CertParser,
    parse::Parse,
    serialize::SerializeInto,
    Cert,
};
use std::{
    fs,
    path::{Path, PathBuf},
};

const ARMOR_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";

/// Upper-case hex key id or fingerprint, without a `0x` prefix.
pub fn normalize_key_id(id: &str) -> Result<String> {
    let trimmed = id.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .replace(' ', "")
        .to_ascii_uppercase();
    if !matches!(hex.len(), 8 | 16 | 40) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::KeyImportFailed {
            key: id.to_owned(),
            reason: "key ids are 8, 16 or 40 hexadecimal digits".to_owned(),
        });
    }
    Ok(hex)
}

fn cert_matches(cert: &Cert, id: &str) -> bool {
    cert.keys().any(|ka| {
        let key = ka.key();
        match id.len() {
            40 => key.fingerprint().to_hex() == id,
            _ => key.keyid().to_hex().ends_with(id),
        }
    })
}

fn import_failed(key: &str, reason: impl ToString) -> Error {
    Error::KeyImportFailed {
        key: key.to_owned(),
        reason: reason.to_string(),
    }
}

/// The directory of trusted repository keys, one certificate per file.
pub struct KeyStore {
    config: Config,
}

impl KeyStore {
    pub fn new(config: &Config) -> Self {
        KeyStore {
            config: config.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.config.trusted_keys_dir
    }

    fn cert_path(&self, cert: &Cert) -> PathBuf {
        self.dir().join(format!("{}.gpg", cert.fingerprint().to_hex()))
    }

    fn store(&self, cert: &Cert, key: &str) -> Result<PathBuf> {
        let path = self.cert_path(cert);
        if path.is_file() {
            debug!("Key {} is already trusted", cert.fingerprint());
            return Ok(path);
        }
        let bytes = cert.to_vec().map_err(|e| import_failed(key, e))?;
        write_atomic(&path, &bytes)?;
        info!("Imported key {} to {}", cert.fingerprint(), path.display());
        Ok(path)
    }

    /// Validate armored key material and add it to the store.
    pub fn import_material(&self, armored: &str) -> Result<PathBuf> {
        if !armored.contains(ARMOR_HEADER) {
            return Err(import_failed("inline key", "not an armored public key block"));
        }
        let cert = Cert::from_bytes(armored.as_bytes()).map_err(|e| import_failed("inline key", e))?;
        self.store(&cert, &cert.fingerprint().to_hex())
    }

    /// Fetch a key from the keyserver unless the store already has it.
    pub fn import_key_id(&self, id: &str, runner: &dyn CommandRunner) -> Result<PathBuf> {
        let id = normalize_key_id(id)?;
        if let Some(path) = self.find(&id)? {
            debug!("Key {} found in {}", id, path.display());
            return Ok(path);
        }

        info!("Fetching key {} ...", id);
        let url = self.config.keyserver_url(&id);
        let out = runner
            .run(&download::fetch(&url))
            .map_err(|e| import_failed(&id, e))?;
        if !out.stdout.contains(ARMOR_HEADER) {
            return Err(import_failed(&id, "keyserver returned no public key block"));
        }
        let cert = Cert::from_bytes(out.stdout.as_bytes()).map_err(|e| import_failed(&id, e))?;
        if !cert_matches(&cert, &id) {
            return Err(import_failed(
                &id,
                format!("keyserver returned key {} instead", cert.fingerprint()),
            ));
        }
        self.store(&cert, &id)
    }

    /// The file holding a key with the given id or fingerprint.
    pub fn find(&self, id: &str) -> Result<Option<PathBuf>> {
        let id = normalize_key_id(id)?;
        if !self.dir().is_dir() {
            return Ok(None);
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(self.dir())
            .map_err(|e| Error::io(self.dir(), e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("gpg") | Some("asc")
                )
            })
            .collect();
        paths.sort();

        for path in paths {
            let parser = match CertParser::from_file(&path) {
                Ok(parser) => parser,
                Err(e) => {
                    debug!("Skipping unreadable keyring {}: {}", path.display(), e);
                    continue;
                }
            };
            for cert in parser.flatten() {
                if cert_matches(&cert, &id) {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    /// Where the key material a repository refers to is installed, if it is.
    pub fn resolve(&self, key: &SigningKey) -> Option<PathBuf> {
        match key {
            SigningKey::Keyring(path) => Some(path.clone()).filter(|p| p.is_file()),
            SigningKey::KeyId(id) => self.find(id).ok().flatten(),
            SigningKey::Material(armored) => Cert::from_bytes(armored.as_bytes())
                .ok()
                .map(|cert| self.cert_path(&cert))
                .filter(|p| p.is_file()),
        }
    }

    /// Whether a key file is one this store manages.
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir())
    }

    /// Delete a key file from the store. Files elsewhere are left alone.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        if !self.owns(path) || !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(path).map_err(|e| Error::io(path, e))?;
        info!("Removed key {}", path.display());
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::executor::ScriptedRunner;
    use sequoia_openpgp::cert::CertBuilder;

    pub(crate) fn armored_cert() -> (Cert, String) {
        let (cert, _) = CertBuilder::general_purpose(None, Some("Test <test@example.org>"))
            .generate()
            .unwrap();
        let armored = String::from_utf8(cert.armored().to_vec().unwrap()).unwrap();
        (cert, armored)
    }

    pub(crate) fn store_in(dir: &Path) -> KeyStore {
        let config = Config {
            trusted_keys_dir: dir.to_owned(),
            keyserver: "https://keys.example.org/{}".to_owned(),
            ..Config::default()
        };
        KeyStore::new(&config)
    }

    #[test]
    fn key_ids() {
        let source = vec![
            ("0xc0b21f32", Some("C0B21F32")),
            ("871920D1991BC93C", Some("871920D1991BC93C")),
            (
                "F6EC B376 2474 EDA9 D21B  7022 8719 20D1 991B C93C",
                Some("F6ECB3762474EDA9D21B7022871920D1991BC93C"),
            ),
            ("C0B21F3", None),
            ("XYZ21F32", None),
            ("", None),
        ];
        for (input, expected) in source {
            assert_eq!(normalize_key_id(input).ok().as_deref(), expected, "{}", input);
        }
    }

    #[test]
    fn import_material_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let (cert, armored) = armored_cert();

        let path = store.import_material(&armored).unwrap();
        assert_eq!(
            path,
            dir.path().join(format!("{}.gpg", cert.fingerprint().to_hex()))
        );
        let stored = Cert::from_file(&path).unwrap();
        assert_eq!(stored.fingerprint(), cert.fingerprint());
        assert_eq!(store.import_material(&armored).unwrap(), path);

        let fpr = cert.fingerprint().to_hex();
        assert_eq!(store.find(&fpr).unwrap(), Some(path.clone()));
        assert_eq!(store.find(&fpr[24..]).unwrap(), Some(path.clone()));
        assert_eq!(
            store.resolve(&SigningKey::Material(armored)),
            Some(path.clone())
        );
        assert_eq!(store.resolve(&SigningKey::KeyId(fpr)), Some(path));

        assert!(matches!(
            store.import_material("not a key"),
            Err(Error::KeyImportFailed { .. })
        ));
    }

    #[test]
    fn import_from_keyserver() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let (cert, armored) = armored_cert();
        let fpr = cert.fingerprint().to_hex();
        let fetch = download::fetch(&format!("https://keys.example.org/{}", fpr)).command_line();
        let runner = ScriptedRunner::new().on(&fetch, &armored);

        let path = store.import_key_id(&format!("0x{}", fpr.to_lowercase()), &runner).unwrap();
        assert!(path.is_file());
        // Found locally the second time
        store.import_key_id(&fpr, &runner).unwrap();
        assert_eq!(runner.count("curl"), 1);
    }

    #[test]
    fn keyserver_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let (_, armored) = armored_cert();
        let wanted = "0123456789ABCDEF";
        let fetch = download::fetch(&format!("https://keys.example.org/{}", wanted)).command_line();

        let runner = ScriptedRunner::new().fail(&fetch, 22, "curl: (22) The requested URL returned error: 404");
        assert!(matches!(
            store.import_key_id(wanted, &runner),
            Err(Error::KeyImportFailed { .. })
        ));

        let runner = ScriptedRunner::new().on(&fetch, "<html>No results found</html>");
        assert!(matches!(
            store.import_key_id(wanted, &runner),
            Err(Error::KeyImportFailed { .. })
        ));

        // A different key than asked for
        let runner = ScriptedRunner::new().on(&fetch, &armored);
        assert!(matches!(
            store.import_key_id(wanted, &runner),
            Err(Error::KeyImportFailed { .. })
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn remove_only_managed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let (_, armored) = armored_cert();
        let path = store.import_material(&armored).unwrap();

        let foreign = outside.path().join("vendor.gpg");
        fs::write(&foreign, b"key").unwrap();
        assert!(!store.remove(&foreign).unwrap());
        assert!(foreign.is_file());

        assert!(store.remove(&path).unwrap());
        assert!(!path.exists());
        assert!(!store.remove(&path).unwrap());
    }
}
