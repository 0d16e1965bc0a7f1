use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use env_logger::Env;
use feels::config::Config;
use feels::render::DEFAULT_FEED_FILE;
use feels::session::Session;
use std::error::Error;
use std::path::{Path, PathBuf};

fn main() {
    let matches = app().get_matches();
    let level = if matches.is_present("verbose") {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&matches) {
        eprintln!("ERROR {}", e);
        let mut source = e.source();
        while let Some(err) = source {
            eprintln!("  caused by: {}", err);
            source = err.source();
        }
        std::process::exit(1);
    }
}

fn app() -> App<'static, 'static> {
    let entry = Arg::with_name("entry")
        .required(true)
        .help("Entry file name, e.g. 20240301.txt");
    App::new("feels")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .value_name("FILE")
                .help("Site configuration file (default: search for feels.yaml)"),
        )
        .arg(
            Arg::with_name("verbose")
                .long("verbose")
                .short("v")
                .help("Log progress as well as warnings"),
        )
        .subcommand(
            SubCommand::with_name("render")
                .about("Render the feed and every permalink page")
                .arg(
                    Arg::with_name("out")
                        .long("out")
                        .takes_value(true)
                        .value_name("FILE")
                        .help("Feed file name inside the www directory"),
                ),
        )
        .subcommand(SubCommand::with_name("list").about("List visible entries"))
        .subcommand(
            SubCommand::with_name("toggle")
                .about("Publish or unpublish an entry")
                .arg(entry.clone()),
        )
        .subcommand(
            SubCommand::with_name("delete")
                .about("Delete an entry and its public copies")
                .arg(entry),
        )
        .subcommand(
            SubCommand::with_name("neighbors")
                .about("Rank publishing users and rebuild the shared feed"),
        )
        .subcommand(
            SubCommand::with_name("import")
                .about("Restore entries from a backup archive")
                .arg(
                    Arg::with_name("archive")
                        .required(true)
                        .help("A .tar or .tar.gz backup"),
                )
                .arg(
                    Arg::with_name("apply")
                        .long("apply")
                        .help("Copy importable entries into the store"),
                ),
        )
}

fn run(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or("HOME is not set")?;
    let config = match matches.value_of("config") {
        Some(path) => Config::from_project_file(Path::new(path), &home)?,
        None => Config::from_directory(&std::env::current_dir()?, &home)?,
    };
    let mut session = Session::open(config)?;

    match matches.subcommand() {
        ("render", Some(sub)) => {
            let feed = session.write_feed(sub.value_of("out").unwrap_or(DEFAULT_FEED_FILE))?;
            println!("{}", feed.display());
        }
        ("list", _) => {
            for meta in session.describe() {
                println!(
                    "{}  {:>5} words  {}",
                    meta.date, meta.word_count, meta.timestamp
                );
            }
        }
        ("toggle", Some(sub)) => {
            let name = sub.value_of("entry").unwrap_or_default();
            println!("{} {}", session.toggle(name)?, name);
        }
        ("delete", Some(sub)) => {
            let name = sub.value_of("entry").unwrap_or_default();
            if !session.delete(name)? {
                return Err(format!("no entry named `{}`", name).into());
            }
            println!("deleted {}", name);
        }
        ("neighbors", _) => {
            for record in session.write_shared_feed()? {
                println!("~{:<16} {:<30} {}", record.user, record.timestamp(), record.url);
            }
        }
        ("import", Some(sub)) => {
            let archive = Path::new(sub.value_of("archive").unwrap_or_default());
            let apply = sub.is_present("apply");
            let paths = session.import(archive, apply)?;
            if !apply {
                println!("{} entries can be imported (rerun with --apply):", paths.len());
            }
            for path in paths {
                println!("{}", path.display());
            }
        }
        (other, _) => return Err(format!("unknown command `{}`", other).into()),
    }
    Ok(())
}
