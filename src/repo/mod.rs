//! APT source definitions, the files holding them and their signing keys.
mod deb822;
mod keys;
mod mapping;
mod oneline;
mod repository;

pub use keys::{normalize_key_id, KeyStore};
pub use mapping::{RepositoryMapping, Trust};
pub use repository::{Identity, Repository, SigningKey, SourceKind, SourceSyntax};

use crate::error::{Error, Result};

use std::{
    fs,
    io::Write,
    os::unix::fs::PermissionsExt,
    path::Path,
};
use tempfile::NamedTempFile;

/// Replace `path` with `content` through a temporary file in the same
/// directory, so readers never see a partial file.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(content).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(tmp.path(), e))?;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
