//! Configuration: the site-wide [`Config`] loaded from `feels.yaml`, the
//! [`StoreLayout`] that maps a user's store root onto its well-known paths,
//! and the per-user [`Settings`] record kept in `config/ttbprc`.

use log::debug;
use serde::Deserialize;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// The name of the site configuration file searched for by
/// [`Config::from_directory`].
pub const CONFIG_FILE_NAME: &str = "feels.yaml";

/// The directory name of a user's store, relative to their home directory.
pub const STORE_DIR_NAME: &str = ".ttbp";

/// The well-known paths inside a single user's store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> StoreLayout {
        StoreLayout { root: root.into() }
    }

    /// The layout of `user`'s store under a shared `homes` directory, i.e.
    /// `{homes}/{user}/.ttbp`.
    pub fn for_user(homes: &Path, user: &str) -> StoreLayout {
        StoreLayout::new(homes.join(user).join(STORE_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> PathBuf {
        self.root.join("entries")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    /// The publish ledger (`config/nopub`).
    pub fn nopub(&self) -> PathBuf {
        self.config_dir().join("nopub")
    }

    pub fn settings(&self) -> PathBuf {
        self.config_dir().join("ttbprc")
    }

    pub fn header(&self) -> PathBuf {
        self.config_dir().join("header.txt")
    }

    pub fn footer(&self) -> PathBuf {
        self.config_dir().join("footer.txt")
    }

    pub fn www(&self) -> PathBuf {
        self.root.join("www")
    }

    pub fn backups(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// A store counts as initialized once its settings file exists.
    pub fn is_initialized(&self) -> bool {
        self.settings().exists()
    }
}

/// A user's persisted preferences. Only the keys this crate cares about are
/// modeled; anything else in the file is ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Settings {
    /// Whether the user opted in to HTML publishing and the shared feed.
    #[serde(default)]
    pub publishing: bool,

    /// The directory under the user's web root that their `www` is exposed
    /// as.
    #[serde(default, rename = "publish dir")]
    pub publish_dir: Option<String>,

    /// Whether entries are also mirrored to gopher.
    #[serde(default)]
    pub gopher: bool,
}

impl Settings {
    /// Loads settings from a `ttbprc` file. Existing files are JSON; YAML is
    /// accepted too for hand-written settings.
    pub fn load(path: &Path) -> Result<Settings> {
        let text = fs::read_to_string(path).map_err(|err| Error::Open {
            kind: "settings",
            path: path.to_owned(),
            err,
        })?;
        match serde_json::from_str(&text) {
            Ok(settings) => Ok(settings),
            Err(json_err) => {
                debug!("`{}` isn't JSON ({}); trying YAML", path.display(), json_err);
                serde_yaml::from_str(&text).map_err(|err| Error::DeserializeYaml {
                    path: path.to_owned(),
                    err,
                })
            }
        }
    }
}

#[derive(Deserialize)]
struct Project {
    #[serde(default)]
    store: Option<PathBuf>,

    #[serde(default)]
    homes: Option<PathBuf>,

    #[serde(default)]
    live_url: Option<String>,

    #[serde(default)]
    shared_feed: Option<PathBuf>,

    #[serde(default)]
    readme: Option<PathBuf>,

    #[serde(default)]
    gopher_directory: Option<PathBuf>,

    #[serde(default)]
    title: Option<String>,
}

/// Site-wide configuration for a `feels` run.
#[derive(Clone, Debug)]
pub struct Config {
    /// The local user's identifier.
    pub user: String,

    /// The local user's store.
    pub store: StoreLayout,

    /// The directory holding every user's home directory. Other users'
    /// stores are discovered under it.
    pub homes: PathBuf,

    /// The URL prefix users' publish directories hang off, e.g.
    /// `http://tilde.town/~`.
    pub live_url: String,

    /// Where the shared feed is written, if anywhere.
    pub shared_feed: Option<PathBuf>,

    /// Documentation rendered at the top of the shared feed.
    pub readme: Option<PathBuf>,

    /// Where gopher mirroring copies entries, if enabled.
    pub gopher_directory: Option<PathBuf>,

    /// The title of the shared feed page.
    pub title: String,
}

const DEFAULT_HOMES: &str = "/home";
const DEFAULT_LIVE_URL: &str = "http://tilde.town/~";
const DEFAULT_TITLE: &str = "tilde.town feels engine";

impl Config {
    /// Searches `dir` and its ancestors for [`CONFIG_FILE_NAME`] and loads the
    /// first one found. Falls back to [`Config::from_home`] when no ancestor
    /// has one.
    pub fn from_directory(dir: &Path, home: &Path) -> Result<Config> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            Config::from_project_file(&path, home)
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent, home),
                None => Config::from_home(home),
            }
        }
    }

    /// Loads a specific `feels.yaml`. Fields the file leaves out take the
    /// same defaults as [`Config::from_home`].
    pub fn from_project_file(path: &Path, home: &Path) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path, "project")?)
            .map_err(|err| Error::DeserializeYaml {
                path: path.to_owned(),
                err,
            })?;
        let defaults = Config::from_home(home)?;
        Ok(Config {
            user: defaults.user,
            store: project
                .store
                .map(StoreLayout::new)
                .unwrap_or(defaults.store),
            homes: project.homes.unwrap_or(defaults.homes),
            live_url: project.live_url.unwrap_or(defaults.live_url),
            shared_feed: project.shared_feed.or(defaults.shared_feed),
            readme: project.readme.or(defaults.readme),
            gopher_directory: project
                .gopher_directory
                .or(defaults.gopher_directory),
            title: project.title.unwrap_or(defaults.title),
        })
    }

    /// The default configuration for the user whose home directory is
    /// `home`. The user's identifier is the home directory's name.
    pub fn from_home(home: &Path) -> Result<Config> {
        let user = home
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::InvalidHome(home.to_owned()))?
            .to_owned();
        Ok(Config {
            user,
            store: StoreLayout::new(home.join(STORE_DIR_NAME)),
            homes: PathBuf::from(DEFAULT_HOMES),
            live_url: DEFAULT_LIVE_URL.to_owned(),
            shared_feed: None,
            readme: None,
            gopher_directory: Some(home.join("public_gopher").join("feels")),
            title: DEFAULT_TITLE.to_owned(),
        })
    }
}

fn open(path: &Path, kind: &'static str) -> Result<File> {
    File::open(path).map_err(|err| Error::Open {
        kind,
        path: path.to_owned(),
        err,
    })
}

/// The result of a fallible configuration operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading configuration.
#[derive(Debug)]
pub enum Error {
    /// Returned when a configuration file can't be opened.
    Open {
        kind: &'static str,
        path: PathBuf,
        err: std::io::Error,
    },

    /// Returned when a configuration file isn't valid YAML (or JSON) for the
    /// expected shape.
    DeserializeYaml {
        path: PathBuf,
        err: serde_yaml::Error,
    },

    /// Returned when the home directory has no usable final component to
    /// derive a user name from.
    InvalidHome(PathBuf),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Open { kind, path, err } => {
                write!(f, "Opening {} file `{}`: {}", kind, path.display(), err)
            }
            Error::DeserializeYaml { path, err } => {
                write!(f, "Parsing `{}`: {}", path.display(), err)
            }
            Error::InvalidHome(path) => {
                write!(f, "Can't derive a user name from `{}`", path.display())
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Open { err, .. } => Some(err),
            Error::DeserializeYaml { err, .. } => Some(err),
            Error::InvalidHome(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn test_layout_paths() {
        let layout = StoreLayout::for_user(Path::new("/home"), "alice");
        assert_eq!(Path::new("/home/alice/.ttbp"), layout.root());
        assert_eq!(PathBuf::from("/home/alice/.ttbp/entries"), layout.entries());
        assert_eq!(
            PathBuf::from("/home/alice/.ttbp/config/nopub"),
            layout.nopub()
        );
        assert_eq!(
            PathBuf::from("/home/alice/.ttbp/config/ttbprc"),
            layout.settings()
        );
        assert_eq!(PathBuf::from("/home/alice/.ttbp/www"), layout.www());
    }

    #[test]
    fn test_settings_from_json() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ttbprc");
        fs::write(
            &path,
            r#"{"editor": "vim", "publishing": true, "publish dir": "blog", "gopher": false}"#,
        )?;
        let settings = Settings::load(&path)?;
        assert_eq!(
            Settings {
                publishing: true,
                publish_dir: Some("blog".to_owned()),
                gopher: false,
            },
            settings
        );
        Ok(())
    }

    #[test]
    fn test_settings_tab_indented_json() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ttbprc");
        fs::write(
            &path,
            "{\n\t\"publishing\": true,\n\t\"publish dir\": \"blog\"\n}\n",
        )?;
        let settings = Settings::load(&path)?;
        assert!(settings.publishing);
        assert_eq!(Some("blog".to_owned()), settings.publish_dir);
        Ok(())
    }

    #[test]
    fn test_settings_yaml() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ttbprc");
        fs::write(&path, "publishing: true\ngopher: true\n")?;
        let settings = Settings::load(&path)?;
        assert!(settings.publishing);
        assert!(settings.gopher);
        Ok(())
    }

    #[test]
    fn test_settings_defaults() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ttbprc");
        fs::write(&path, "{}")?;
        assert_eq!(Settings::default(), Settings::load(&path)?);
        Ok(())
    }

    #[test]
    fn test_settings_missing_file() {
        match Settings::load(Path::new("/nonexistent/ttbprc")) {
            Err(Error::Open { kind, .. }) => assert_eq!("settings", kind),
            other => panic!("wanted open error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_home_defaults() -> Result<()> {
        let config = Config::from_home(Path::new("/home/alice"))?;
        assert_eq!("alice", config.user);
        assert_eq!(Path::new("/home/alice/.ttbp"), config.store.root());
        assert_eq!(PathBuf::from("/home"), config.homes);
        assert_eq!(DEFAULT_LIVE_URL, config.live_url);
        Ok(())
    }

    #[test]
    fn test_from_directory_finds_ancestor_file(
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "homes: /srv/homes\ntitle: neighborhood feels\n",
        )?;
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested)?;

        let config = Config::from_directory(&nested, Path::new("/home/bob"))?;
        assert_eq!("bob", config.user);
        assert_eq!(PathBuf::from("/srv/homes"), config.homes);
        assert_eq!("neighborhood feels", config.title);
        assert_eq!(Path::new("/home/bob/.ttbp"), config.store.root());
        Ok(())
    }
}
