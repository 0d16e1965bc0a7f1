//! The entry filename convention. Every entry lives in a file named
//! `YYYYMMDD.txt`, and the file name is the only source of an entry's date.
//!
//! Validation is deliberately lenient about the calendar: the day field only
//! has to fall in `01..=31`, so `20240230.txt` is a valid name. Stores in the
//! wild already contain such names and they must keep rendering.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;

/// The extension every entry file carries.
pub const ENTRY_EXTENSION: &str = "txt";

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

static ENTRY_STEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(19|20)[0-9]{2}(0[1-9]|1[0-2])(0[1-9]|[12][0-9]|3[01])$")
        .expect("valid entry stem regex")
});

/// Returns true if the final component of `name` is a valid entry file name.
/// `name` may be a bare file name or a full path.
pub fn is_valid<P: AsRef<Path>>(name: P) -> bool {
    let path = name.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ENTRY_EXTENSION) => {}
        _ => return false,
    }
    match path.file_stem().and_then(|stem| stem.to_str()) {
        Some(stem) => ENTRY_STEM.is_match(stem),
        None => false,
    }
}

/// The date encoded in an entry file name, kept as the original zero-padded
/// digit strings so it always formats back to exactly the name it came from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryDate {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl EntryDate {
    /// Splits a valid entry name into its 4/2/2 digit fields. Returns `None`
    /// for names that don't pass [`is_valid`].
    pub fn parse<P: AsRef<Path>>(name: P) -> Option<EntryDate> {
        let path = name.as_ref();
        if !is_valid(path) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        Some(EntryDate {
            year: stem[0..4].to_owned(),
            month: stem[4..6].to_owned(),
            day: stem[6..8].to_owned(),
        })
    }

    /// `YYYY-MM-DD`
    pub fn iso(&self) -> String {
        format!("{}-{}-{}", self.year, self.month, self.day)
    }

    /// The lowercase English name of the month, e.g. `march`.
    pub fn month_name(&self) -> &'static str {
        // month is validated to 01..=12
        let index = self.month.parse::<usize>().unwrap_or(1);
        MONTHS[(index.max(1) - 1) % 12]
    }

    /// The name of the entry's source file (`YYYYMMDD.txt`).
    pub fn file_name(&self) -> String {
        format!("{}.{}", self, ENTRY_EXTENSION)
    }

    /// The name of the entry's permalink page (`YYYYMMDD.html`).
    pub fn permalink(&self) -> String {
        format!("{}.html", self)
    }
}

impl fmt::Display for EntryDate {
    /// Displays the date as the compact `YYYYMMDD` stem.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.year, self.month, self.day)
    }
}
