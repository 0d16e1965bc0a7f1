//! Exports [`Session`], which ties the pieces of a single user's store
//! together: it holds the loaded settings, templates, ledger and visible
//! entry list, and runs every operation that changes them.
//!
//! Every structural change (a toggle, a delete, an import) ends with
//! [`Session::refresh`], which reloads the ledger, takes down artifacts of
//! unpublished entries, rescans the entry directory and rebuilds the output.

use crate::config::{self, Config, Settings};
use crate::filename;
use crate::gopher::{self, GopherMirror, Mirror};
use crate::import;
use crate::ledger::{self, Action, Ledger};
use crate::neighbors::{self, Aggregator, NeighborRecord, SharedFeed};
use crate::render::{self, Renderer, Templates};
use crate::store::{self, Entry, EntryMeta};
use chrono::Local;
use log::{debug, info};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The feed page written whenever a publishing user's store changes.
pub const INDEX_FILE: &str = "index.html";

/// One user's loaded store.
pub struct Session {
    config: Config,
    settings: Settings,
    templates: Templates,
    ledger: Ledger,
    entries: Vec<Entry>,
    mirror: Option<Box<dyn Mirror>>,

    /// Fixed at load so every page rendered by this session carries the
    /// same generation stamp.
    generated_on: String,
}

impl Session {
    /// Loads the local user's settings and templates from their store and
    /// brings the output up to date.
    pub fn open(config: Config) -> Result<Session> {
        let settings = Settings::load(&config.store.settings())?;
        let templates = Templates::load(&config.store)?;
        Session::with_settings(config, settings, templates)
    }

    /// Like [`Session::open`] but with settings and templates supplied by
    /// the caller instead of read from the store.
    pub fn with_settings(config: Config, settings: Settings, templates: Templates) -> Result<Session> {
        let mirror = config
            .gopher_directory
            .as_ref()
            .map(|dir| Box::new(GopherMirror::new(dir, &config.title)) as Box<dyn Mirror>);
        let ledger = Ledger::load(config.store.nopub())?;
        let mut session = Session {
            config,
            settings,
            templates,
            ledger,
            entries: Vec::new(),
            mirror,
            generated_on: Local::now().format("%d %B %y").to_string(),
        };
        session.refresh()?;
        Ok(session)
    }

    /// Replaces the mirror used for gopher publishing.
    pub fn set_mirror(&mut self, mirror: Option<Box<dyn Mirror>>) {
        self.mirror = mirror;
    }

    /// Swaps in new settings without touching the file, e.g. after the user
    /// changed an option this session.
    pub fn reload_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The visible entries as of the last refresh, most recent first.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_publishing(&self) -> bool {
        self.settings.publishing
    }

    /// Metadata for every visible entry.
    pub fn describe(&self) -> Vec<EntryMeta> {
        store::describe_all(&self.entries)
    }

    fn www(&self) -> PathBuf {
        self.config.store.www()
    }

    fn with_renderer<T>(&self, f: impl FnOnce(&Renderer<'_>) -> render::Result<T>) -> Result<T> {
        let www = self.www();
        let renderer = Renderer {
            templates: &self.templates,
            www: &www,
            generated_on: self.generated_on.clone(),
        };
        Ok(f(&renderer)?)
    }

    /// Reloads the ledger, takes down anything it suppresses, rescans the
    /// entry directory, and, for publishing users, rewrites the feed and
    /// feeds the gopher mirror.
    pub fn refresh(&mut self) -> Result<()> {
        self.ledger = Ledger::load(self.config.store.nopub())?;
        store::reconcile(&self.ledger, |name| self.unpublish(name))?;
        self.entries = store::list(&self.config.store.entries(), &self.ledger)?;
        debug!("{} visible entries", self.entries.len());

        if self.settings.publishing {
            self.write_feed(INDEX_FILE)?;
            if self.settings.gopher {
                if let Some(mirror) = &self.mirror {
                    mirror.publish(&self.entries)?;
                }
            }
        }
        Ok(())
    }

    /// Writes the feed to `{www}/{file_name}` plus every permalink.
    pub fn write_feed(&self, file_name: &str) -> Result<PathBuf> {
        self.with_renderer(|renderer| renderer.write_feed(&self.entries, file_name))
    }

    /// Removes every public copy of the entry named `name`: its permalink and
    /// its mirrored file. Missing copies are fine.
    pub fn unpublish(&self, name: &str) -> Result<()> {
        self.with_renderer(|renderer| renderer.unpublish(name))?;
        if let Some(mirror) = &self.mirror {
            mirror.retract(name)?;
        }
        Ok(())
    }

    /// Flips `name` between published and unpublished and rebuilds.
    pub fn toggle(&mut self, name: &str) -> Result<Action> {
        check_entry_name(name)?;
        let action = self.ledger.toggle(name)?;
        if action == Action::Unpublishing {
            self.unpublish(name)?;
        }
        info!("{} {}", action, name);
        self.refresh()?;
        Ok(action)
    }

    /// Deletes the entry named `name` and all of its public copies. Returns
    /// false if there was no such entry.
    pub fn delete(&mut self, name: &str) -> Result<bool> {
        check_entry_name(name)?;
        let path = self.config.store.entries().join(name);
        let existed = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(err) => return Err(Error::Delete { path, err }),
        };
        self.unpublish(name)?;
        if existed {
            info!("deleted `{}`", path.display());
            self.refresh()?;
        }
        Ok(existed)
    }

    /// Stages `archive` and returns the entries it could import without
    /// clobbering anything. With `apply`, those entries are copied into the
    /// store and the output is rebuilt.
    pub fn import(&mut self, archive: &Path, apply: bool) -> Result<Vec<PathBuf>> {
        let entries = self.config.store.entries();
        let importable = import::resolve(archive, &self.config.store.backups(), &entries)?;
        if !apply {
            return Ok(importable);
        }
        let imported = import::import_entries(&importable, &entries)?;
        self.refresh()?;
        Ok(imported)
    }

    fn aggregator(&self) -> Aggregator {
        Aggregator {
            homes: &self.config.homes,
            live_url: &self.config.live_url,
            local_user: &self.config.user,
            local_settings: &self.settings,
        }
    }

    /// Ranks every publishing user under the configured homes directory.
    pub fn neighbors(&self) -> Result<Vec<NeighborRecord>> {
        Ok(self.aggregator().neighbors()?)
    }

    /// Rebuilds the shared feed, if one is configured. Returns the records
    /// that were listed.
    pub fn write_shared_feed(&self) -> Result<Vec<NeighborRecord>> {
        let records = self.neighbors()?;
        if let Some(path) = &self.config.shared_feed {
            SharedFeed {
                path,
                title: &self.config.title,
                readme: self.config.readme.as_deref(),
            }
            .write(&records)?;
        }
        Ok(records)
    }
}

/// Only bare, validly named entry files may be toggled or deleted; anything
/// else could point outside the entry directory.
fn check_entry_name(name: &str) -> Result<()> {
    let bare = Path::new(name).components().count() == 1;
    if bare && filename::is_valid(name) {
        Ok(())
    } else {
        Err(Error::InvalidEntryName(name.to_owned()))
    }
}

/// The result of a fallible session operation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for session operations, wrapping the error of whichever
/// stage failed.
#[derive(Debug)]
pub enum Error {
    /// Returned for problems loading configuration or settings.
    Config(config::Error),

    /// Returned for problems reading or saving the ledger.
    Ledger(ledger::Error),

    /// Returned for problems scanning the entry directory.
    Store(store::Error),

    /// Returned for problems rendering or writing pages.
    Render(render::Error),

    /// Returned for problems updating the gopher mirror.
    Mirror(gopher::Error),

    /// Returned for problems building the shared feed.
    Neighbors(neighbors::Error),

    /// Returned for problems resolving or importing a backup.
    Import(import::Error),

    /// Returned when a name passed to [`Session::toggle`] or
    /// [`Session::delete`] isn't a bare entry file name.
    InvalidEntryName(String),

    /// Returned when an entry exists but can't be deleted.
    Delete { path: PathBuf, err: io::Error },
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(err) => err.fmt(f),
            Error::Ledger(err) => err.fmt(f),
            Error::Store(err) => err.fmt(f),
            Error::Render(err) => err.fmt(f),
            Error::Mirror(err) => err.fmt(f),
            Error::Neighbors(err) => err.fmt(f),
            Error::Import(err) => err.fmt(f),
            Error::InvalidEntryName(name) => {
                write!(f, "`{}` isn't an entry name (want YYYYMMDD.txt)", name)
            }
            Error::Delete { path, err } => {
                write!(f, "Deleting `{}`: {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Ledger(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::Render(err) => Some(err),
            Error::Mirror(err) => Some(err),
            Error::Neighbors(err) => Some(err),
            Error::Import(err) => Some(err),
            Error::InvalidEntryName(_) => None,
            Error::Delete { err, .. } => Some(err),
        }
    }
}

impl From<config::Error> for Error {
    /// Converts [`config::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: config::Error) -> Error {
        Error::Config(err)
    }
}

impl From<ledger::Error> for Error {
    /// Converts [`ledger::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: ledger::Error) -> Error {
        Error::Ledger(err)
    }
}

impl From<store::Error> for Error {
    /// Converts [`store::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: store::Error) -> Error {
        Error::Store(err)
    }
}

impl From<render::Error> for Error {
    /// Converts [`render::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: render::Error) -> Error {
        Error::Render(err)
    }
}

impl From<gopher::Error> for Error {
    /// Converts [`gopher::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: gopher::Error) -> Error {
        Error::Mirror(err)
    }
}

impl From<neighbors::Error> for Error {
    /// Converts [`neighbors::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: neighbors::Error) -> Error {
        Error::Neighbors(err)
    }
}

impl From<import::Error> for Error {
    /// Converts [`import::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: import::Error) -> Error {
        Error::Import(err)
    }
}
