//! The publish ledger: the persisted set of entry file names a user has
//! pulled from publication. A name in the ledger is suppressed from every
//! public output; a name not in it is published. There is nothing in
//! between.

use log::debug;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Written verbatim at the top of the ledger file on every save.
pub const HEADER: &str = "\
# files that don't get published html/gopher. this file is
# generated by feels; editing it directly may result in unexpected
# behavior. if you have problems, back up this file, delete it, and
# rebuild it from feels.
";

const COMMENT_MARKER: &str = "# ";

/// What a [`Ledger::toggle`] did to an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// The entry was removed from the ledger and is public again.
    Publishing,

    /// The entry was added to the ledger and must be taken down.
    Unpublishing,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Action::Publishing => "publishing",
            Action::Unpublishing => "unpublishing",
        })
    }
}

/// A user's set of unpublished entry names, bound to the file it was loaded
/// from.
#[derive(Clone, Debug)]
pub struct Ledger {
    path: PathBuf,
    names: BTreeSet<String>,
}

impl Ledger {
    /// An empty ledger that will persist to `path`.
    pub fn empty<P: Into<PathBuf>>(path: P) -> Ledger {
        Ledger {
            path: path.into(),
            names: BTreeSet::new(),
        }
    }

    /// Loads the ledger at `path`. Comment lines (`# ...`) and blank lines
    /// are skipped; every other line, right-trimmed, is a suppressed name. A
    /// missing file is an empty ledger.
    pub fn load<P: Into<PathBuf>>(path: P) -> Result<Ledger> {
        let mut ledger = Ledger::empty(path);
        let file = match File::open(&ledger.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no ledger at `{}`", ledger.path.display());
                return Ok(ledger);
            }
            Err(err) => {
                return Err(Error::Read {
                    path: ledger.path,
                    err,
                })
            }
        };

        for line in BufReader::new(file).lines() {
            let line = line.map_err(|err| Error::Read {
                path: ledger.path.clone(),
                err,
            })?;
            if line.starts_with(COMMENT_MARKER) {
                continue;
            }
            let name = line.trim_end();
            if !name.is_empty() {
                ledger.names.insert(name.to_owned());
            }
        }
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the entry named by the final component of `name` is
    /// suppressed.
    pub fn contains<P: AsRef<Path>>(&self, name: P) -> bool {
        match name.as_ref().file_name().and_then(|n| n.to_str()) {
            Some(file_name) => self.names.contains(file_name),
            None => false,
        }
    }

    /// The suppressed names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Flips `name` between published and unpublished, then saves the ledger.
    /// The caller is responsible for taking down artifacts when this returns
    /// [`Action::Unpublishing`].
    pub fn toggle(&mut self, name: &str) -> Result<Action> {
        let action = if self.names.remove(name) {
            Action::Publishing
        } else {
            self.names.insert(name.to_owned());
            Action::Unpublishing
        };
        self.save()?;
        Ok(action)
    }

    /// Writes the header and every name to a temporary file beside the
    /// ledger and renames it into place, so a crash never leaves a truncated
    /// ledger behind.
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let write_err = |err| Error::Write {
            path: self.path.clone(),
            err,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(self.to_string().as_bytes())
            .map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path)
            .map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl fmt::Display for Ledger {
    /// Formats the ledger exactly as it is saved to disk.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(HEADER)?;
        for name in &self.names {
            writeln!(f, "{}", name)?;
        }
        Ok(())
    }
}

/// The result of a fallible ledger operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem reading or saving a [`Ledger`].
#[derive(Debug)]
pub enum Error {
    /// Returned when the ledger file exists but can't be read.
    Read { path: PathBuf, err: io::Error },

    /// Returned when the ledger can't be written or renamed into place.
    Write { path: PathBuf, err: io::Error },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Read { path, err } => {
                write!(f, "Reading ledger `{}`: {}", path.display(), err)
            }
            Error::Write { path, err } => {
                write!(f, "Saving ledger `{}`: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Read { err, .. } => Some(err),
            Error::Write { err, .. } => Some(err),
        }
    }
}
