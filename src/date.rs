use std::fmt;
use std::str::FromStr;
use time::{Date, Month};

/// Calendar day taken from an archive filename (`pagecounts-YYYYMMDD-HHMMSS.gz`).
/// Rendered back as the compact `YYYYMMDD` form used in the counts table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageDate(Date);

impl PageDate {
    pub fn new(year: i32, month: u8, day: u8) -> Option<Self> {
        let month = Month::try_from(month).ok()?;
        Date::from_calendar_date(year, month, day).ok().map(Self)
    }

    pub fn date(self) -> Date {
        self.0
    }
}

impl fmt::Display for PageDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.0.year(), self.0.month() as u8, self.0.day())
    }
}

impl FromStr for PageDate {
    type Err = String;
    /// Accepts `YYYYMMDD` or `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.trim().chars().filter(|c| *c != '-').collect();
        if compact.len() != 8 || !compact.bytes().all(|b| b.is_ascii_digit()) {
            return Err("expected YYYYMMDD".into());
        }
        let year: i32 = compact[0..4].parse().map_err(|_| "invalid year")?;
        let month: u8 = compact[4..6].parse().map_err(|_| "invalid month")?;
        let day: u8 = compact[6..8].parse().map_err(|_| "invalid day")?;
        Self::new(year, month, day).ok_or_else(|| format!("no such calendar day: {s}"))
    }
}

/// Inclusive bound check; `None` on either side is open.
pub fn within_range(d: PageDate, start: Option<PageDate>, end: Option<PageDate>) -> bool {
    start.map_or(true, |s| d >= s) && end.map_or(true, |e| d <= e)
}
