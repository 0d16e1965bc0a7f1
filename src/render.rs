//! Renders entries to HTML: a fragment per entry, a feed page holding every
//! visible entry, and a permalink page per entry. Every feed write is a full
//! rebuild. All permalinks are rewritten and permalinks for entries that are
//! no longer visible are removed, so the output directory always matches the
//! entry list it was last given.

use crate::config::StoreLayout;
use crate::filename::{self, EntryDate};
use crate::markdown;
use crate::store::Entry;
use chrono::Local;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The feed file name used when the caller doesn't pick one.
pub const DEFAULT_FEED_FILE: &str = "default.html";

/// The user's page header and footer, inserted verbatim around every page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Templates {
    pub header: String,
    pub footer: String,
}

impl Templates {
    /// Reads `header.txt` and `footer.txt` from the store's config directory.
    pub fn load(layout: &StoreLayout) -> Result<Templates> {
        let read = |path: PathBuf| {
            fs::read_to_string(&path).map_err(|err| Error::ReadTemplate { path, err })
        };
        Ok(Templates {
            header: read(layout.header())?,
            footer: read(layout.footer())?,
        })
    }
}

/// Renders and writes a single user's pages into their `www` directory.
pub struct Renderer<'a> {
    /// The header and footer wrapped around every page.
    pub templates: &'a Templates,

    /// The directory the feed and permalink pages are written to.
    pub www: &'a Path,

    /// The date stamped into each page's generation comment. It is fixed per
    /// renderer so that repeated renders produce identical bytes.
    pub generated_on: String,
}

impl<'a> Renderer<'a> {
    /// Creates a renderer stamped with today's local date.
    pub fn new(templates: &'a Templates, www: &'a Path) -> Renderer<'a> {
        Renderer {
            templates,
            www,
            generated_on: Local::now().format("%d %B %y").to_string(),
        }
    }

    /// Renders one entry's HTML fragment: an anchor, a dated heading that
    /// links to the anchor, the body as HTML, and a permalink line.
    pub fn render_entry(&self, entry: &Entry) -> Result<String> {
        let body = entry.read_body().map_err(|err| Error::ReadEntry {
            path: entry.path().to_owned(),
            err,
        })?;
        fragment(entry.date(), &body).map_err(|err| Error::Markdown {
            path: entry.path().to_owned(),
            err,
        })
    }

    /// Renders the fragment of every entry that can be rendered, keeping
    /// their order. An entry that fails is logged and left out so the rest
    /// of the feed still goes up.
    fn render_all<'e>(&self, entries: &'e [Entry]) -> (Vec<&'e Entry>, Vec<String>) {
        entries
            .iter()
            .filter_map(|entry| match self.render_entry(entry) {
                Ok(fragment) => Some((entry, fragment)),
                Err(e) => {
                    warn!("leaving out of the feed: {}", e);
                    None
                }
            })
            .unzip()
    }

    /// Renders the feed page for `entries`, which are expected to be in
    /// display order already.
    pub fn render_feed(&self, entries: &[Entry]) -> Result<String> {
        let (_, fragments) = self.render_all(entries);
        Ok(self.page(&fragments))
    }

    /// Renders the standalone page for a single entry.
    pub fn render_permalink(&self, entry: &Entry) -> Result<String> {
        Ok(self.page(&[self.render_entry(entry)?]))
    }

    /// Writes the feed page to `{www}/{file_name}` along with a permalink
    /// page for every entry, then removes permalinks for anything that
    /// didn't make it onto the page. Returns the feed's path.
    pub fn write_feed(&self, entries: &[Entry], file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(self.www).map_err(|err| Error::Write {
            path: self.www.to_owned(),
            err,
        })?;

        let (shown, fragments) = self.render_all(entries);
        for (entry, fragment) in shown.iter().zip(&fragments) {
            write(
                &self.www.join(entry.date().permalink()),
                &self.page(std::slice::from_ref(fragment)),
            )?;
        }

        let feed = self.www.join(file_name);
        write(&feed, &self.page(&fragments))?;

        let pruned = self.prune(shown.iter().copied())?;
        info!(
            "wrote `{}` with {} entries ({} stale permalinks removed)",
            feed.display(),
            shown.len(),
            pruned.len()
        );
        Ok(feed)
    }

    /// Writes the permalink page for one entry and returns its path.
    pub fn write_permalink(&self, entry: &Entry) -> Result<PathBuf> {
        let path = self.www.join(entry.date().permalink());
        write(&path, &self.render_permalink(entry)?)?;
        Ok(path)
    }

    /// Removes the permalink page for the entry named `name` (either
    /// `YYYYMMDD.txt` or a path to it). A page that doesn't exist is already
    /// unpublished.
    pub fn unpublish(&self, name: &str) -> Result<()> {
        let stem = match Path::new(name).file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => return Ok(()),
        };
        remove_if_exists(&self.www.join(format!("{}.html", stem)))
    }

    /// Deletes every permalink page in the output directory whose entry is
    /// not in `visible`. Only files named like permalinks are considered.
    pub fn prune<'e, I>(&self, visible: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = &'e Entry>,
    {
        let keep: HashSet<String> = visible.into_iter().map(|e| e.date().permalink()).collect();
        let read_err = |err| Error::Write {
            path: self.www.to_owned(),
            err,
        };

        let mut removed = Vec::new();
        let dir = match fs::read_dir(self.www) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(removed),
            Err(e) => return Err(read_err(e)),
        };
        for result in dir {
            let dir_entry = result.map_err(read_err)?;
            let name = dir_entry.file_name();
            let name = match name.to_str() {
                Some(name) => name,
                None => continue,
            };
            if is_permalink_name(name) && !keep.contains(name) {
                let path = dir_entry.path();
                debug!("removing stale permalink `{}`", path.display());
                remove_if_exists(&path)?;
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Assembles a full page from already-rendered fragments.
    fn page(&self, fragments: &[String]) -> String {
        let mut out = format!(
            "<!--generated by feels on {}-->\n\n",
            self.generated_on
        );
        out.push_str(&self.templates.header);
        out.push('\n');
        for fragment in fragments {
            out.push_str(fragment);
            out.push('\n');
        }
        out.push_str(&self.templates.footer);
        out
    }
}

/// The HTML fragment for an entry dated `date` with markdown `body`.
pub fn fragment(date: &EntryDate, body: &str) -> io::Result<String> {
    let anchor = date.to_string();
    let mut out = format!(
        "\t\t<p><a name=\"{anchor}\"></a><br /><br /></p>\n\
         \t\t<div class=\"entry\">\n\
         \t\t\t<h5><a href=\"#{anchor}\">{day}</a> {month} {year}</h5>\n\
         \t\t\t",
        anchor = anchor,
        day = date.day,
        month = date.month_name(),
        year = date.year,
    );
    markdown::to_html(&mut out, body, &anchor)?;
    out.push_str(&format!(
        "\t\t\t<p class=\"permalink\"><a href=\"{}\">permalink</a></p>\n\
         \n\t\t</div>\n",
        date.permalink()
    ));
    Ok(out)
}

fn is_permalink_name(name: &str) -> bool {
    match name.strip_suffix(".html") {
        Some(stem) => filename::is_valid(format!("{}.{}", stem, filename::ENTRY_EXTENSION)),
        None => false,
    }
}

fn write(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|err| Error::Write {
        path: path.to_owned(),
        err,
    })
}

/// Removes the file at `path`, treating an already-missing file as success.
pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::Remove {
            path: path.to_owned(),
            err,
        }),
    }
}

/// The result of a fallible rendering operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem rendering or writing pages.
#[derive(Debug)]
pub enum Error {
    /// Returned when a header or footer template can't be read.
    ReadTemplate { path: PathBuf, err: io::Error },

    /// Returned when an entry's source file can't be read.
    ReadEntry { path: PathBuf, err: io::Error },

    /// Returned when an entry's markdown can't be converted.
    Markdown { path: PathBuf, err: io::Error },

    /// Returned when an output page or directory can't be written.
    Write { path: PathBuf, err: io::Error },

    /// Returned when an artifact exists but can't be removed.
    Remove { path: PathBuf, err: io::Error },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ReadTemplate { path, err } => {
                write!(f, "Reading template `{}`: {}", path.display(), err)
            }
            Error::ReadEntry { path, err } => {
                write!(f, "Reading entry `{}`: {}", path.display(), err)
            }
            Error::Markdown { path, err } => {
                write!(f, "Rendering entry `{}`: {}", path.display(), err)
            }
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
            Error::ReadTemplate { err, .. }
            | Error::ReadEntry { err, .. }
            | Error::Markdown { err, .. }
            | Error::Write { err, .. }
            | Error::Remove { err, .. } => Some(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ledger::Ledger;
    use crate::store;
    use std::collections::BTreeSet;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn templates() -> Templates {
        Templates {
            header: "<html><body>\n".to_owned(),
            footer: "</body></html>\n".to_owned(),
        }
    }

    fn renderer<'a>(templates: &'a Templates, www: &'a Path) -> Renderer<'a> {
        Renderer {
            templates,
            www,
            generated_on: "01 March 24".to_owned(),
        }
    }

    fn permalinks(www: &Path) -> io::Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for result in fs::read_dir(www)? {
            let name = result?.file_name().to_string_lossy().into_owned();
            if is_permalink_name(&name) {
                names.insert(name);
            }
        }
        Ok(names)
    }

    #[test]
    fn test_fragment_structure() -> io::Result<()> {
        let date = EntryDate::parse("20240301.txt").unwrap();
        assert_eq!(
            "\t\t<p><a name=\"20240301\"></a><br /><br /></p>\n\
             \t\t<div class=\"entry\">\n\
             \t\t\t<h5><a href=\"#20240301\">01</a> march 2024</h5>\n\
             \t\t\t<p>hello <b>world</b></p>\n\
             \t\t\t<p class=\"permalink\"><a href=\"20240301.html\">permalink</a></p>\n\
             \n\t\t</div>\n",
            fragment(&date, "hello <b>world</b>\n")?
        );
        Ok(())
    }

    #[test]
    fn test_feed_layout() -> TestResult {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("20240301.txt"), "newer")?;
        fs::write(dir.path().join("20240215.txt"), "older")?;
        let entries = store::list(dir.path(), &Ledger::empty("nopub"))?;
        let templates = templates();
        let www = dir.path().join("www");
        let renderer = renderer(&templates, &www);

        let feed = renderer.render_feed(&entries)?;
        let first = renderer.render_entry(&entries[0])?;
        let second = renderer.render_entry(&entries[1])?;
        assert_eq!(
            format!(
                "<!--generated by feels on 01 March 24-->\n\n<html><body>\n\n{}\n{}\n</body></html>\n",
                first, second
            ),
            feed
        );
        assert!(feed.find("newer") < feed.find("older"));

        let permalink = renderer.render_permalink(&entries[1])?;
        assert!(permalink.contains(&second));
        assert!(!permalink.contains("newer"));
        Ok(())
    }

    #[test]
    fn test_write_feed_matches_visible_set_and_is_idempotent() -> TestResult {
        let dir = tempfile::tempdir()?;
        let entries_dir = dir.path().join("entries");
        fs::create_dir(&entries_dir)?;
        for name in &["20240101.txt", "20240102.txt", "20240103.txt"] {
            fs::write(entries_dir.join(name), format!("entry {}", name))?;
        }
        let www = dir.path().join("www");
        fs::create_dir(&www)?;
        fs::write(www.join("20231225.html"), "stale")?;
        fs::write(www.join("style.css"), "body {}")?;

        let mut ledger = Ledger::empty(dir.path().join("nopub"));
        ledger.toggle("20240102.txt")?;
        let entries = store::list(&entries_dir, &ledger)?;

        let templates = templates();
        let renderer = renderer(&templates, &www);
        let feed = renderer.write_feed(&entries, DEFAULT_FEED_FILE)?;
        let first = fs::read_to_string(&feed)?;

        let wanted: BTreeSet<String> = vec!["20240101.html", "20240103.html"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(wanted, permalinks(&www)?);
        assert!(www.join("style.css").exists());

        let permalink = fs::read_to_string(www.join("20240103.html"))?;
        renderer.write_feed(&entries, DEFAULT_FEED_FILE)?;
        assert_eq!(first, fs::read_to_string(&feed)?);
        assert_eq!(permalink, fs::read_to_string(www.join("20240103.html"))?);
        Ok(())
    }

    #[test]
    fn test_bad_entries_are_left_out() -> TestResult {
        let dir = tempfile::tempdir()?;
        let entries_dir = dir.path().join("entries");
        fs::create_dir(&entries_dir)?;
        fs::write(entries_dir.join("20240101.txt"), "fine")?;
        fs::write(entries_dir.join("20240102.txt"), b"caf\xe9 latin-1")?;
        let www = dir.path().join("www");
        fs::create_dir(&www)?;
        fs::write(www.join("20240103.html"), "left over")?;

        let mut entries = store::list(&entries_dir, &Ledger::empty("nopub"))?;
        // listed, then removed before rendering
        entries.insert(0, Entry::from_path(entries_dir.join("20240103.txt")).unwrap());

        let templates = templates();
        let renderer = renderer(&templates, &www);
        let feed = fs::read_to_string(renderer.write_feed(&entries, DEFAULT_FEED_FILE)?)?;
        assert!(feed.contains("caf\u{fffd} latin-1"), "{}", feed);
        assert!(feed.contains("fine"));

        let wanted: BTreeSet<String> = vec!["20240101.html", "20240102.html"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(wanted, permalinks(&www)?);
        Ok(())
    }

    #[test]
    fn test_unpublish_removes_permalink() -> TestResult {
        let dir = tempfile::tempdir()?;
        let templates = templates();
        let renderer = renderer(&templates, dir.path());
        fs::write(dir.path().join("20240101.html"), "page")?;

        renderer.unpublish("20240101.txt")?;
        assert!(!dir.path().join("20240101.html").exists());

        // already gone
        renderer.unpublish("20240101.txt")?;
        Ok(())
    }

    #[test]
    fn test_templates_load() -> TestResult {
        let dir = tempfile::tempdir()?;
        let layout = StoreLayout::new(dir.path());
        fs::create_dir_all(layout.config_dir())?;
        fs::write(layout.header(), "head")?;
        fs::write(layout.footer(), "foot")?;
        assert_eq!(
            Templates {
                header: "head".to_owned(),
                footer: "foot".to_owned(),
            },
            Templates::load(&layout)?
        );
        fs::remove_file(layout.footer())?;
        assert!(Templates::load(&layout).is_err());
        Ok(())
    }

    #[test]
    fn test_is_permalink_name() {
        assert!(is_permalink_name("20240101.html"));
        assert!(!is_permalink_name("index.html"));
        assert!(!is_permalink_name("default.html"));
        assert!(!is_permalink_name("20240101.txt"));
    }
}
