//! Line filter: keep raw log lines that start with `"<project> <title> "` for a known title.

use ahash::AHashSet;

/// Prefix matcher over `"<project> <title> "` for a fixed project code.
///
/// Equivalent to testing every prefix with `starts_with`, but does one hash probe per
/// space in the line instead, so titles that themselves contain spaces still match.
#[derive(Clone, Debug)]
pub struct TitlePrefixes {
    project_prefix: String, // "<project> "
    titles: AHashSet<String>,
}

impl TitlePrefixes {
    pub fn new<I, S>(project: &str, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            project_prefix: format!("{} ", project.trim()),
            titles: titles
                .into_iter()
                .map(|s| -> String { s.into() })
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize { self.titles.len() }
    pub fn is_empty(&self) -> bool { self.titles.is_empty() }

    /// The literal prefix strings this filter accepts, sorted.
    pub fn prefixes(&self) -> Vec<String> {
        let mut v: Vec<String> = self.titles.iter().map(|t| format!("{}{} ", self.project_prefix, t)).collect();
        v.sort();
        v
    }

    /// True if `line` begins with any accepted prefix. When one title is a prefix of
    /// another both may match; presence is all that is reported.
    pub fn matches(&self, line: &str) -> bool {
        let Some(rest) = line.strip_prefix(self.project_prefix.as_str()) else {
            return false;
        };
        rest.match_indices(' ').any(|(i, _)| self.titles.contains(&rest[..i]))
    }
}

/// Free-function form: `prefixes` are complete `"<project> <title> "` strings.
pub fn matches(line: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| line.starts_with(p.as_str()))
}
