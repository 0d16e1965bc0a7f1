//! Mirroring of published entries to other places, such as a gopher hole.
//! A [`Mirror`] gets the same ordered entry list the HTML feed is built
//! from, and is asked to retract single entries when they are unpublished.

use crate::store::Entry;
use log::info;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A destination that mirrors a user's visible entries.
pub trait Mirror {
    /// Mirrors `entries`, which are already in display order.
    fn publish(&self, entries: &[Entry]) -> Result<()>;

    /// Removes the mirrored copy of the entry named `file_name`. Missing
    /// copies are not an error.
    fn retract(&self, file_name: &str) -> Result<()>;
}

/// Mirrors entries as plain text files into a gopher directory, with a
/// `gophermap` menu listing them most recent first.
pub struct GopherMirror {
    directory: PathBuf,
    title: String,
}

impl GopherMirror {
    pub fn new<P: Into<PathBuf>>(directory: P, title: &str) -> GopherMirror {
        GopherMirror {
            directory: directory.into(),
            title: title.to_owned(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn write_map(&self, entries: &[Entry]) -> Result<()> {
        let path = self.directory.join("gophermap");
        let write_err = |err| Error::Write {
            path: path.clone(),
            err,
        };
        let mut map = fs::File::create(&path).map_err(write_err)?;
        writeln!(map, "{}", self.title).map_err(write_err)?;
        writeln!(map).map_err(write_err)?;
        for entry in entries {
            writeln!(map, "0{}\t{}", entry.date().iso(), entry.file_name())
                .map_err(write_err)?;
        }
        Ok(())
    }
}

impl Mirror for GopherMirror {
    fn publish(&self, entries: &[Entry]) -> Result<()> {
        fs::create_dir_all(&self.directory).map_err(|err| Error::Write {
            path: self.directory.clone(),
            err,
        })?;
        for entry in entries {
            let to = self.directory.join(entry.file_name());
            fs::copy(entry.path(), &to).map_err(|err| Error::Copy {
                from: entry.path().to_owned(),
                to,
                err,
            })?;
        }
        self.write_map(entries)?;
        info!(
            "mirrored {} entries to `{}`",
            entries.len(),
            self.directory.display()
        );
        Ok(())
    }

    fn retract(&self, file_name: &str) -> Result<()> {
        let path = self.directory.join(file_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Remove { path, err }),
        }
    }
}

/// The result of a fallible mirror operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem updating a mirror.
#[derive(Debug)]
pub enum Error {
    /// Returned when an entry can't be copied into the mirror.
    Copy {
        from: PathBuf,
        to: PathBuf,
        err: io::Error,
    },

    /// Returned when the mirror directory or menu can't be written.
    Write { path: PathBuf, err: io::Error },

    /// Returned when a mirrored copy exists but can't be removed.
    Remove { path: PathBuf, err: io::Error },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Copy { from, to, err } => write!(
                f,
                "Mirroring `{}` to `{}`: {}",
                from.display(),
                to.display(),
                err
            ),
            Error::Write { path, err } => {
                write!(f, "Writing `{}`: {}", path.display(), err)
            }
            Error::Remove { path, err } => {
                write!(f, "Removing `{}`: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Copy { err, .. } | Error::Write { err, .. } | Error::Remove { err, .. } => {
                Some(err)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_publish_and_retract() -> TestResult {
        let dir = tempfile::tempdir()?;
        let entries_dir = dir.path().join("entries");
        fs::create_dir(&entries_dir)?;
        fs::write(entries_dir.join("20240301.txt"), "march")?;
        fs::write(entries_dir.join("20240215.txt"), "february")?;
        let entries = vec![
            Entry::from_path(entries_dir.join("20240301.txt")).unwrap(),
            Entry::from_path(entries_dir.join("20240215.txt")).unwrap(),
        ];

        let mirror = GopherMirror::new(dir.path().join("gopher"), "feels");
        mirror.publish(&entries)?;
        assert_eq!(
            "march",
            fs::read_to_string(mirror.directory().join("20240301.txt"))?
        );
        assert_eq!(
            "feels\n\n02024-03-01\t20240301.txt\n02024-02-15\t20240215.txt\n",
            fs::read_to_string(mirror.directory().join("gophermap"))?
        );

        mirror.retract("20240301.txt")?;
        assert!(!mirror.directory().join("20240301.txt").exists());
        mirror.retract("20240301.txt")?;
        Ok(())
    }
}
