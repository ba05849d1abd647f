use crate::errors::ParseError;

/// `(date, title, views)` parsed from one cache line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountKey {
    pub date: String,
    pub title: String,
    pub views: u64,
}

impl CountKey {
    /// Reduce key: `date|title`.
    pub fn key(&self) -> String {
        format!("{}|{}", self.date, self.title)
    }
}

/// Split a reduce key back into `(date, title)`. The date never contains `|`, so the first
/// separator is the boundary even when the title contains one.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('|')
}

/// Parses cache lines of the form `<project> <title> <views> <bytes>|<filename>`.
///
/// The date comes from the filename, not the line: the second `-` separated segment of the
/// extension-less name (`pagecounts-20160101-000000.gz` -> `20160101`).
#[derive(Clone, Copy, Debug)]
pub struct KeyExtractor {
    date_segment: usize,
}

impl Default for KeyExtractor {
    fn default() -> Self {
        Self { date_segment: 1 }
    }
}

impl KeyExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different `-` segment of the filename as the date.
    pub fn with_date_segment(mut self, idx: usize) -> Self {
        self.date_segment = idx;
        self
    }

    pub fn date_from_filename(&self, filename: &str) -> Result<String, ParseError> {
        let stem = match filename.find('.') {
            Some(i) => &filename[..i],
            None => filename,
        };
        let seg = stem
            .split('-')
            .nth(self.date_segment)
            .ok_or_else(|| ParseError::FilenameSchema(filename.to_string()))?;
        if seg.len() != 8 || !seg.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidDate(seg.to_string()));
        }
        Ok(seg.to_string())
    }

    pub fn parse(&self, line: &str) -> Result<CountKey, ParseError> {
        // Filenames never contain '|', titles might.
        let (content, filename) = line.rsplit_once('|').ok_or(ParseError::MissingSeparator)?;
        let fields: Vec<&str> = content.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(ParseError::FieldCount(fields.len()));
        }
        let views: u64 = fields[2].parse().map_err(|_| ParseError::Views(fields[2].to_string()))?;
        let date = self.date_from_filename(filename.trim())?;
        Ok(CountKey { date, title: fields[1].to_string(), views })
    }

    /// `(key, views)` pair for the reduce step.
    pub fn key_from_line(&self, line: &str) -> Result<(String, u64), ParseError> {
        let k = self.parse(line)?;
        Ok((k.key(), k.views))
    }
}
