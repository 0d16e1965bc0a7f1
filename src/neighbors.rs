//! Builds the shared feed: a single page linking every user who opted in to
//! publishing, most recently active first.
//!
//! Other users' stores are read without locking and may be half-written or
//! malformed. A problem with one user is logged and that user is left out;
//! it never stops the page from being built for everyone else.

use crate::config::{self, Settings, StoreLayout};
use crate::filename;
use crate::markdown;
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One publishing user as shown on the shared feed.
#[derive(Clone, Debug, PartialEq)]
pub struct NeighborRecord {
    pub user: String,

    /// Where the user's pages live, or empty if they never set a publish
    /// directory.
    pub url: String,

    /// When the user's most recent entry was created. `None` for users
    /// without any valid entries.
    pub last_entry: Option<DateTime<Local>>,
}

impl NeighborRecord {
    /// `YYYY-MM-DD at HH:MM (utc±H)` for the last entry, or empty.
    pub fn timestamp(&self) -> String {
        match &self.last_entry {
            Some(time) => {
                let offset = time.format("%z").to_string();
                let mut chars = offset.chars();
                let sign = chars.next().unwrap_or('+');
                let hour = chars.nth(1).unwrap_or('0');
                format!(
                    "{} (utc{}{})",
                    time.format("%Y-%m-%d at %H:%M"),
                    sign,
                    hour
                )
            }
            None => String::new(),
        }
    }

    /// The list item body: a link to the user's pages plus the timestamp.
    pub fn display_link(&self) -> String {
        let link = format!("<a href=\"{}\">~{}</a>", self.url, self.user);
        match self.timestamp() {
            ts if ts.is_empty() => link,
            ts => format!("{} {}", link, ts),
        }
    }
}

/// Reads every user's store under `homes` to find who is publishing.
pub struct Aggregator<'a> {
    /// The directory holding every user's home directory.
    pub homes: &'a Path,

    /// Prefix for user URLs, e.g. `http://tilde.town/~`.
    pub live_url: &'a str,

    /// The user running this process. Their in-memory settings are used
    /// instead of the file so unsaved changes take effect.
    pub local_user: &'a str,
    pub local_settings: &'a Settings,
}

impl<'a> Aggregator<'a> {
    /// The users under `homes` whose stores are initialized, sorted by name.
    pub fn discover_users(&self) -> Result<Vec<String>> {
        let read_err = |err| Error::ReadHomes {
            path: self.homes.to_owned(),
            err,
        };
        let mut users = Vec::new();
        for result in fs::read_dir(self.homes).map_err(read_err)? {
            let dir_entry = result.map_err(read_err)?;
            let user = match dir_entry.file_name().into_string() {
                Ok(user) => user,
                Err(_) => continue,
            };
            if StoreLayout::for_user(self.homes, &user).is_initialized() {
                users.push(user);
            }
        }
        users.sort();
        Ok(users)
    }

    /// Loads `user`'s settings, or the in-memory settings for the local
    /// user.
    pub fn settings(&self, user: &str) -> config::Result<Settings> {
        if user == self.local_user {
            Ok(self.local_settings.clone())
        } else {
            Settings::load(&StoreLayout::for_user(self.homes, user).settings())
        }
    }

    /// Whether `user` opted in to publishing. Unreadable settings count as
    /// not publishing.
    pub fn is_publishing(&self, user: &str) -> bool {
        match self.settings(user) {
            Ok(settings) => settings.publishing,
            Err(e) => {
                warn!("skipping ~{}: {}", user, e);
                false
            }
        }
    }

    /// Builds the record for a single user, or `None` if they aren't
    /// publishing.
    pub fn neighbor(&self, user: &str) -> Result<Option<NeighborRecord>> {
        let settings = self.settings(user)?;
        if !settings.publishing {
            return Ok(None);
        }

        let url = match settings.publish_dir.as_deref() {
            Some(dir) if !dir.is_empty() => format!("{}{}/{}", self.live_url, user, dir),
            _ => String::new(),
        };
        let entries = StoreLayout::for_user(self.homes, user).entries();
        let last_entry = match latest_entry(&entries) {
            Some(path) => created(&path).map(DateTime::<Local>::from),
            None => None,
        };

        Ok(Some(NeighborRecord {
            user: user.to_owned(),
            url,
            last_entry,
        }))
    }

    /// Every publishing user's record, most recent entry first. Users
    /// without entries come last.
    pub fn neighbors(&self) -> Result<Vec<NeighborRecord>> {
        let mut records = Vec::new();
        for user in self.discover_users()? {
            match self.neighbor(&user) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!("~{} isn't publishing", user),
                Err(e) => warn!("skipping ~{}: {}", user, e),
            }
        }
        rank(&mut records);
        Ok(records)
    }
}

/// Sorts records by last entry, most recent first; records without an entry
/// sort last.
pub fn rank(records: &mut [NeighborRecord]) {
    records.sort_by(|a, b| b.last_entry.cmp(&a.last_entry));
}

/// The lexicographically greatest validly-named file in `entries`. A
/// directory that is missing or can't be listed has no entries; the user
/// still appears on the shared feed, just without a timestamp.
fn latest_entry(entries: &Path) -> Option<PathBuf> {
    let dir = match fs::read_dir(entries) {
        Ok(dir) => dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("listing entries in `{}`: {}", entries.display(), e);
            return None;
        }
    };

    let mut latest: Option<PathBuf> = None;
    for result in dir {
        let path = match result {
            Ok(dir_entry) => dir_entry.path(),
            Err(e) => {
                warn!("listing entries in `{}`: {}", entries.display(), e);
                continue;
            }
        };
        if !filename::is_valid(&path) {
            continue;
        }
        if latest.as_ref().map_or(true, |l| path.file_name() > l.file_name()) {
            latest = Some(path);
        }
    }
    latest
}

/// The file's creation time, falling back to its modification time on
/// filesystems that don't record one.
fn created(path: &Path) -> Option<SystemTime> {
    let meta = fs::metadata(path)
        .map_err(|e| warn!("reading `{}`: {}", path.display(), e))
        .ok()?;
    meta.created().or_else(|_| meta.modified()).ok()
}

/// The shared feed page and where it goes.
pub struct SharedFeed<'a> {
    pub path: &'a Path,
    pub title: &'a str,

    /// Markdown documentation shown above the list of users.
    pub readme: Option<&'a Path>,
}

impl SharedFeed<'_> {
    /// Renders the page for `records`, which should already be ranked.
    pub fn render(&self, records: &[NeighborRecord]) -> Result<String> {
        let docs = match self.readme {
            Some(readme) => match fs::read_to_string(readme) {
                Ok(text) => markdown::render(&text, "docs").map_err(Error::Markdown)?,
                Err(e) => {
                    warn!("reading `{}`: {}", readme.display(), e);
                    String::new()
                }
            },
            None => String::new(),
        };

        let mut out = format!(
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 3.2//EN\">\n\
             <html>\n\
             \t<head>\n\
             \t\t<title>{title}</title>\n\
             \t\t<link rel=\"stylesheet\" href=\"style.css\" />\n\
             \t</head>\n\
             \t<body>\n\
             \t\t<div class=\"meta\">\n\
             \t\t<h1>{title}</h1>\n\
             \t\t</div>\n\
             \t\t<p>&nbsp;</p>\n\
             \t\t<div class=\"docs\">\n{docs}\t\t</div>\n\
             \t\t<p>&nbsp;</p>\n\
             \t\t<div class=\"feed\">\n\
             \t\t<h3>live feels-sharing:</h3>\n\
             \t\t\t<ul>\n",
            title = self.title,
            docs = docs,
        );
        for record in records {
            out.push_str(&format!("\t\t\t\t<li>{}</li>\n", record.display_link()));
        }
        out.push_str("\t\t\t</ul>\n\t\t</div>\n\t</body>\n</html>\n");
        Ok(out)
    }

    /// Renders and writes the page. If the destination's directory doesn't
    /// exist the page is skipped and `false` is returned.
    pub fn write(&self, records: &[NeighborRecord]) -> Result<bool> {
        let page = self.render(records)?;
        match fs::write(self.path, page) {
            Ok(()) => {
                info!(
                    "wrote shared feed `{}` with {} users",
                    self.path.display(),
                    records.len()
                );
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no shared feed destination at `{}`", self.path.display());
                Ok(false)
            }
            Err(err) => Err(Error::Write {
                path: self.path.to_owned(),
                err,
            }),
        }
    }
}

/// The result of a fallible aggregation operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem building the shared feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when the homes directory can't be listed.
    ReadHomes { path: PathBuf, err: io::Error },

    /// Returned when a user's settings can't be loaded.
    Settings(config::Error),

    /// Returned when the documentation can't be converted.
    Markdown(io::Error),

    /// Returned when the shared feed can't be written.
    Write { path: PathBuf, err: io::Error },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ReadHomes { path, err } => {
                write!(f, "Listing users in `{}`: {}", path.display(), err)
            }
            Error::Settings(err) => err.fmt(f),
            Error::Markdown(err) => write!(f, "Rendering documentation: {}", err),
            Error::Write { path, err } => {
                write!(f, "Writing `{}`: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ReadHomes { err, .. } => Some(err),
            Error::Settings(err) => Some(err),
            Error::Markdown(err) => Some(err),
            Error::Write { err, .. } => Some(err),
        }
    }
}

impl From<config::Error> for Error {
    /// Converts a [`config::Error`] into an [`Error`]. This allows us to use
    /// the `?` operator when loading settings.
    fn from(err: config::Error) -> Error {
        Error::Settings(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn add_user(homes: &Path, user: &str, settings: &str, entries: &[&str]) -> io::Result<()> {
        let layout = StoreLayout::for_user(homes, user);
        fs::create_dir_all(layout.config_dir())?;
        fs::create_dir_all(layout.entries())?;
        fs::write(layout.settings(), settings)?;
        for name in entries {
            fs::write(layout.entries().join(name), "words")?;
        }
        Ok(())
    }

    fn record(user: &str, last_entry: Option<DateTime<Local>>) -> NeighborRecord {
        NeighborRecord {
            user: user.to_owned(),
            url: String::new(),
            last_entry,
        }
    }

    #[test]
    fn test_rank_most_recent_first_and_empty_last() {
        let older = Local.timestamp_opt(1_700_000_000, 0).single();
        let newer = Local.timestamp_opt(1_710_000_000, 0).single();
        let mut records = vec![
            record("empty", None),
            record("older", older),
            record("newer", newer),
        ];
        rank(&mut records);
        let users: Vec<&str> = records.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(vec!["newer", "older", "empty"], users);
    }

    #[test]
    fn test_display_link() {
        let mut r = record("alice", None);
        r.url = "http://tilde.town/~alice/blog".to_owned();
        assert_eq!(
            "<a href=\"http://tilde.town/~alice/blog\">~alice</a>",
            r.display_link()
        );

        r.last_entry = Local.timestamp_opt(1_710_000_000, 0).single();
        let link = r.display_link();
        assert!(link.contains(" at "), "{}", link);
        assert!(link.contains("(utc"), "{}", link);
    }

    #[test]
    fn test_neighbors_filters_and_isolates() -> TestResult {
        let homes = tempfile::tempdir()?;
        let published = r#"{"publishing": true, "publish dir": "blog"}"#;
        add_user(homes.path(), "alice", published, &["20240101.txt", "notes.txt"])?;
        add_user(homes.path(), "bob", r#"{"publishing": false}"#, &["20240102.txt"])?;
        add_user(homes.path(), "carol", published, &[])?;
        add_user(homes.path(), "mallory", "{not valid", &["20240103.txt"])?;
        // a home without a store
        fs::create_dir(homes.path().join("dave"))?;

        let local = Settings {
            publishing: true,
            publish_dir: Some("feels".to_owned()),
            gopher: false,
        };
        // bob has opted in locally but not saved it yet
        let aggregator = Aggregator {
            homes: homes.path(),
            live_url: "http://tilde.town/~",
            local_user: "bob",
            local_settings: &local,
        };

        assert_eq!(
            vec!["alice", "bob", "carol", "mallory"],
            aggregator.discover_users()?
        );
        assert!(aggregator.is_publishing("bob"));
        assert!(!aggregator.is_publishing("mallory"));

        let records = aggregator.neighbors()?;
        let users: Vec<&str> = records.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(3, users.len());
        assert_eq!("carol", users[2]);
        assert!(users.contains(&"alice"));
        assert!(users.contains(&"bob"));

        let alice = records.iter().find(|r| r.user == "alice").unwrap();
        assert_eq!("http://tilde.town/~alice/blog", alice.url);
        assert!(alice.last_entry.is_some());
        let bob = records.iter().find(|r| r.user == "bob").unwrap();
        assert_eq!("http://tilde.town/~bob/feels", bob.url);
        assert_eq!(None, records[2].last_entry);
        Ok(())
    }

    #[test]
    fn test_unlistable_entries_rank_last() -> TestResult {
        let homes = tempfile::tempdir()?;
        let published = r#"{"publishing": true, "publish dir": "blog"}"#;
        add_user(homes.path(), "alice", published, &[])?;
        add_user(homes.path(), "bob", published, &["20240102.txt"])?;
        // alice's entries directory is a plain file, so listing it fails
        let alice_entries = StoreLayout::for_user(homes.path(), "alice").entries();
        fs::remove_dir(&alice_entries)?;
        fs::write(&alice_entries, "not a directory")?;

        let local = Settings::default();
        let aggregator = Aggregator {
            homes: homes.path(),
            live_url: "http://tilde.town/~",
            local_user: "nobody",
            local_settings: &local,
        };
        let records = aggregator.neighbors()?;
        let users: Vec<&str> = records.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(vec!["bob", "alice"], users);
        assert_eq!(None, records[1].last_entry);
        assert_eq!("", records[1].timestamp());
        Ok(())
    }

    #[test]
    fn test_shared_feed_write() -> TestResult {
        let dir = tempfile::tempdir()?;
        let readme = dir.path().join("README.md");
        fs::write(&readme, "# about\n\nhello neighbors\n")?;
        let path = dir.path().join("index.html");
        let feed = SharedFeed {
            path: &path,
            title: "feels engine",
            readme: Some(&readme),
        };

        let mut alice = record("alice", None);
        alice.url = "http://tilde.town/~alice/blog".to_owned();
        assert!(feed.write(&[alice, record("bob", None)])?);

        let page = fs::read_to_string(&path)?;
        assert!(page.contains("<title>feels engine</title>"));
        assert!(page.contains("<h1>about</h1>"));
        let alice_at = page.find("~alice").unwrap();
        let bob_at = page.find("~bob").unwrap();
        assert!(alice_at < bob_at);
        Ok(())
    }

    #[test]
    fn test_shared_feed_missing_destination_is_skipped() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("missing").join("index.html");
        let feed = SharedFeed {
            path: &path,
            title: "feels",
            readme: Some(Path::new("/nonexistent/README.md")),
        };
        assert!(!feed.write(&[])?);
        Ok(())
    }
}
