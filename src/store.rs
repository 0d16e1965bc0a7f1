//! Defines [`Entry`] and the queries over a user's entry directory. The
//! directory itself is the source of truth: every call rescans it, and
//! nothing here caches what it found.

use crate::filename::{self, EntryDate};
use crate::ledger::Ledger;
use chrono::{DateTime, Local};
use log::{debug, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// A single dated journal entry on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    path: PathBuf,
    date: EntryDate,
}

impl Entry {
    /// Builds an [`Entry`] for `path` if its file name is a valid entry
    /// name. The file itself is not touched.
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Option<Entry> {
        let path = path.into();
        let date = EntryDate::parse(&path)?;
        Some(Entry { path, date })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn date(&self) -> &EntryDate {
        &self.date
    }

    /// The entry's file name, e.g. `20240301.txt`.
    pub fn file_name(&self) -> String {
        self.date.file_name()
    }

    /// The owning user, taken from the path: for
    /// `/home/{user}/.ttbp/entries/{name}` this is `{user}`.
    pub fn author(&self) -> Option<&str> {
        self.path
            .parent()?
            .parent()?
            .parent()?
            .file_name()?
            .to_str()
    }

    /// Reads the entry's text. Bytes that aren't UTF-8 are replaced rather
    /// than rejected; old entries were written by all sorts of editors.
    pub fn read_body(&self) -> io::Result<String> {
        let bytes = fs::read(&self.path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Lists the visible entries in `directory`: regular files with valid entry
/// names that aren't suppressed by `ledger`, most recent first.
///
/// This is a pure query. Artifacts of suppressed entries are cleaned up by
/// [`reconcile`], which callers run separately.
pub fn list(directory: &Path, ledger: &Ledger) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for result in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let dir_entry = match result {
            Ok(dir_entry) => dir_entry,
            Err(err) if err.depth() == 0 => {
                return Err(Error::ReadDir {
                    path: directory.to_owned(),
                    err,
                })
            }
            Err(err) => {
                warn!("skipping unreadable entry: {}", err);
                continue;
            }
        };

        let path = dir_entry.path();
        if ledger.contains(path) {
            debug!("`{}` is unpublished", path.display());
            continue;
        }
        if !dir_entry.file_type().is_file() {
            continue;
        }
        match Entry::from_path(path) {
            Some(entry) => entries.push(entry),
            None => debug!("ignoring `{}`", path.display()),
        }
    }

    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    entries.reverse();
    Ok(entries)
}

/// Takes down the public artifacts of every suppressed name in `ledger` by
/// calling `take_down` with each name. Run before [`list`] so a ledger and
/// its rendered output can never disagree for long.
pub fn reconcile<F, E>(ledger: &Ledger, mut take_down: F) -> std::result::Result<(), E>
where
    F: FnMut(&str) -> std::result::Result<(), E>,
{
    for name in ledger.names() {
        take_down(name)?;
    }
    Ok(())
}

/// The number of words in an entry, or [`WordCount::Unknown`] when the file
/// couldn't be measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WordCount {
    Known(usize),
    Unknown,
}

impl fmt::Display for WordCount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WordCount::Known(n) => n.fmt(f),
            WordCount::Unknown => f.write_str("???"),
        }
    }
}

/// Descriptive metadata for one entry.
#[derive(Clone, Debug)]
pub struct EntryMeta {
    pub path: PathBuf,

    /// Last modification time, when the filesystem reports one.
    pub modified: Option<SystemTime>,

    pub word_count: WordCount,

    /// `modified` as local time, `YYYY-MM-DD at HH:MM`. Empty when
    /// `modified` is unknown.
    pub timestamp: String,

    /// The entry date as `YYYY-MM-DD`.
    pub date: String,

    pub author: String,
}

/// Describes each entry in `entries`, preserving their order. Failures to
/// measure a file degrade the affected field and never abort the listing.
pub fn describe_all(entries: &[Entry]) -> Vec<EntryMeta> {
    entries.iter().map(describe).collect()
}

fn describe(entry: &Entry) -> EntryMeta {
    let modified = fs::metadata(entry.path())
        .and_then(|meta| meta.modified())
        .map_err(|e| warn!("no mtime for `{}`: {}", entry.path().display(), e))
        .ok();

    EntryMeta {
        path: entry.path().to_owned(),
        modified,
        word_count: count_words(entry.path()),
        timestamp: modified.map(local_timestamp).unwrap_or_default(),
        date: entry.date().iso(),
        author: entry.author().unwrap_or_default().to_owned(),
    }
}

fn count_words(path: &Path) -> WordCount {
    match fs::read(path) {
        Ok(bytes) => WordCount::Known(
            String::from_utf8_lossy(&bytes).split_whitespace().count(),
        ),
        Err(e) => {
            warn!("counting words in `{}`: {}", path.display(), e);
            WordCount::Unknown
        }
    }
}

/// Formats `time` in local time as `YYYY-MM-DD at HH:MM`.
pub fn local_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d at %H:%M")
        .to_string()
}

/// The result of a fallible store query.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem reading a store.
#[derive(Debug)]
pub enum Error {
    /// Returned when the entry directory itself can't be read.
    ReadDir { path: PathBuf, err: walkdir::Error },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ReadDir { path, err } => {
                write!(f, "Reading entries in `{}`: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ReadDir { err, .. } => Some(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn touch(dir: &Path, name: &str, body: &str) -> io::Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, body)?;
        Ok(path)
    }

    fn names(entries: &[Entry]) -> Vec<String> {
        entries.iter().map(Entry::file_name).collect()
    }

    #[test]
    fn test_list_orders_most_recent_first() -> TestResult {
        let dir = tempfile::tempdir()?;
        for name in &["20240301.txt", "20240215.txt", "20240220.txt"] {
            touch(dir.path(), name, "hi")?;
        }
        let ledger = Ledger::empty(dir.path().join("nopub"));
        assert_eq!(
            vec!["20240301.txt", "20240220.txt", "20240215.txt"],
            names(&list(dir.path(), &ledger)?)
        );
        Ok(())
    }

    #[test]
    fn test_list_excludes_ledger_and_invalid_names() -> TestResult {
        let dir = tempfile::tempdir()?;
        for name in &[
            "20240101.txt",
            "20240102.txt",
            "20240103.txt",
            "notes.txt",
            "20240104.md",
        ] {
            touch(dir.path(), name, "hi")?;
        }
        fs::create_dir(dir.path().join("20240105.txt"))?;

        let ledger_path = dir.path().join("nopub");
        fs::write(&ledger_path, "20240102.txt\n20231231.txt\n")?;
        let ledger = Ledger::load(&ledger_path)?;

        let entries = list(dir.path(), &ledger)?;
        assert_eq!(vec!["20240103.txt", "20240101.txt"], names(&entries));
        for pair in entries.windows(2) {
            assert!(pair[0].date() > pair[1].date());
        }
        Ok(())
    }

    #[test]
    fn test_list_missing_directory_fails() {
        let ledger = Ledger::empty("nopub");
        assert!(list(Path::new("/nonexistent/entries"), &ledger).is_err());
    }

    #[test]
    fn test_reconcile_visits_every_suppressed_name() -> TestResult {
        let dir = tempfile::tempdir()?;
        let mut ledger = Ledger::empty(dir.path().join("nopub"));
        ledger.toggle("20240101.txt")?;
        ledger.toggle("20240102.txt")?;

        let mut seen = Vec::new();
        reconcile(&ledger, |name| -> io::Result<()> {
            seen.push(name.to_owned());
            Ok(())
        })?;
        assert_eq!(vec!["20240101.txt", "20240102.txt"], seen);
        Ok(())
    }

    #[test]
    fn test_author_from_path() {
        let entry = Entry::from_path("/home/alice/.ttbp/entries/20240101.txt").unwrap();
        assert_eq!(Some("alice"), entry.author());
    }

    #[test]
    fn test_describe_all() -> TestResult {
        let home = tempfile::tempdir()?;
        let entries_dir = home.path().join("carol").join(".ttbp").join("entries");
        fs::create_dir_all(&entries_dir)?;
        let path = touch(&entries_dir, "20240220.txt", "one two\nthree  four\n")?;

        let entries = vec![
            Entry::from_path(&path).unwrap(),
            Entry::from_path(entries_dir.join("20240101.txt")).unwrap(),
        ];
        let meta = describe_all(&entries);

        assert_eq!(2, meta.len());
        assert_eq!(path, meta[0].path);
        assert_eq!(WordCount::Known(4), meta[0].word_count);
        assert_eq!("2024-02-20", meta[0].date);
        assert_eq!("carol", meta[0].author);
        assert!(meta[0].timestamp.contains(" at "));

        assert_eq!(WordCount::Unknown, meta[1].word_count);
        assert_eq!("???", meta[1].word_count.to_string());
        assert_eq!("2024-01-01", meta[1].date);
        Ok(())
    }
}
