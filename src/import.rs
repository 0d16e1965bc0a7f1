//! Restoring entries from a backup archive. [`resolve`] unpacks the archive
//! into a private staging directory and works out which of its entries can
//! be imported without overwriting a live one; [`import_entries`] copies
//! that set into the store.
//!
//! Entries whose names collide with live ones are left in the staging
//! directory for the user to sort out by hand.

use flate2::read::GzDecoder;
use log::{info, warn};
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The staging directory name for `archive`: its file name with up to two
/// extensions removed, so `feels-backup-20240301.tar.gz` stages into
/// `feels-backup-20240301`.
pub fn staging_name(archive: &Path) -> Option<String> {
    let once = Path::new(archive.file_name()?).file_stem()?;
    let twice = Path::new(once).file_stem()?;
    twice.to_str().map(str::to_owned)
}

/// Unpacks `archive` under `backups` and returns the extracted entry paths
/// whose names aren't already present in `live_entries`, sorted.
pub fn resolve(archive: &Path, backups: &Path, live_entries: &Path) -> Result<Vec<PathBuf>> {
    let name = staging_name(archive).ok_or_else(|| Error::InvalidArchiveName(archive.to_owned()))?;
    let staging = backups.join(name);
    create_private_dir(&staging)?;
    unpack(archive, &staging)?;

    let staged_entries = staging.join("entries");
    let live = file_names(live_entries)?;
    let mut importable = Vec::new();
    for result in fs::read_dir(&staged_entries).map_err(|err| Error::ReadDir {
        path: staged_entries.clone(),
        err,
    })? {
        let dir_entry = result.map_err(|err| Error::ReadDir {
            path: staged_entries.clone(),
            err,
        })?;
        let name = dir_entry.file_name();
        if live.contains(name.as_os_str()) {
            warn!(
                "`{}` already exists; leaving it in `{}`",
                name.to_string_lossy(),
                staged_entries.display()
            );
        } else {
            importable.push(dir_entry.path());
        }
    }

    importable.sort();
    info!(
        "{} importable entries staged in `{}`",
        importable.len(),
        staging.display()
    );
    Ok(importable)
}

/// Copies each of `paths` into `live_entries`, keeping file names. Callers
/// pass the result of [`resolve`]; collisions are not checked again.
pub fn import_entries(paths: &[PathBuf], live_entries: &Path) -> Result<Vec<PathBuf>> {
    let mut imported = Vec::with_capacity(paths.len());
    for from in paths {
        let name = from
            .file_name()
            .ok_or_else(|| Error::InvalidArchiveName(from.to_owned()))?;
        let to = live_entries.join(name);
        fs::copy(from, &to).map_err(|err| Error::Copy {
            from: from.to_owned(),
            to: to.clone(),
            err,
        })?;
        imported.push(to);
    }
    Ok(imported)
}

fn create_private_dir(path: &Path) -> Result<()> {
    let err = |err| Error::Staging {
        path: path.to_owned(),
        err,
    };
    fs::create_dir_all(path).map_err(err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700)).map_err(err)?;
    }
    Ok(())
}

/// Extracts a tar archive into `into`, transparently decompressing gzip.
fn unpack(archive: &Path, into: &Path) -> Result<()> {
    let err = |err| Error::Unpack {
        path: archive.to_owned(),
        err,
    };
    let mut reader = BufReader::new(File::open(archive).map_err(err)?);
    let gzipped = reader.fill_buf().map_err(err)?.starts_with(&GZIP_MAGIC);
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };
    Archive::new(reader).unpack(into).map_err(err)
}

fn file_names(dir: &Path) -> Result<HashSet<std::ffi::OsString>> {
    let err = |err| Error::ReadDir {
        path: dir.to_owned(),
        err,
    };
    let mut names = HashSet::new();
    for result in fs::read_dir(dir).map_err(err)? {
        names.insert(result.map_err(err)?.file_name());
    }
    Ok(names)
}

/// The result of a fallible import operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem resolving or importing a backup.
#[derive(Debug)]
pub enum Error {
    /// Returned when a staging directory name can't be derived.
    InvalidArchiveName(PathBuf),

    /// Returned when the staging directory can't be created or locked down.
    Staging { path: PathBuf, err: io::Error },

    /// Returned when the archive can't be read or extracted.
    Unpack { path: PathBuf, err: io::Error },

    /// Returned when the staged or live entry directory can't be listed.
    ReadDir { path: PathBuf, err: io::Error },

    /// Returned when a staged entry can't be copied into the store.
    Copy {
        from: PathBuf,
        to: PathBuf,
        err: io::Error,
    },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidArchiveName(path) => {
                write!(f, "Invalid archive name `{}`", path.display())
            }
            Error::Staging { path, err } => {
                write!(f, "Preparing `{}`: {}", path.display(), err)
            }
            Error::Unpack { path, err } => {
                write!(f, "Unpacking `{}`: {}", path.display(), err)
            }
            Error::ReadDir { path, err } => {
                write!(f, "Listing `{}`: {}", path.display(), err)
            }
            Error::Copy { from, to, err } => write!(
                f,
                "Importing `{}` to `{}`: {}",
                from.display(),
                to.display(),
                err
            ),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidArchiveName(_) => None,
            Error::Staging { err, .. }
            | Error::Unpack { err, .. }
            | Error::ReadDir { err, .. }
            | Error::Copy { err, .. } => Some(err),
        }
    }
}
