//! Title registry, hand-curated spelling exceptions, and expansion of canonical titles into
//! every spelling that can show up as a log-line title field.

use crate::archive::decode_latin1;
use crate::errors::MissingTitle;
use ahash::AHashMap;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const BUILTIN_EXCEPTIONS: &str = include_str!("../data/title_exceptions.json");

/// Identifier -> canonical title, as produced by the title scraper (`wiki_titles.json`).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct TitleRegistry {
    by_id: BTreeMap<String, String>,
}

impl TitleRegistry {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse title registry {}", path.display()))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { by_id: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn len(&self) -> usize { self.by_id.len() }
    pub fn is_empty(&self) -> bool { self.by_id.is_empty() }

    /// `(id, canonical_title)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_id.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Irregular spellings keyed by canonical title. Pure data: loaded from JSON
/// `{ "Canonical_Title": ["variant", ...] }`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct TitleExceptions {
    table: BTreeMap<String, Vec<String>>,
}

impl TitleExceptions {
    /// The table shipped in `data/title_exceptions.json`.
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_EXCEPTIONS).context("parse builtin title exceptions")
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parse title exceptions {}", path.display()))
    }

    pub fn insert(&mut self, canonical: impl Into<String>, variant: impl Into<String>) {
        self.table.entry(canonical.into()).or_default().push(variant.into());
    }

    pub fn merge(&mut self, other: TitleExceptions) {
        for (canonical, variants) in other.table {
            self.table.entry(canonical).or_default().extend(variants);
        }
    }

    /// Merge the table named by `PVETL_TITLE_EXCEPTIONS_FILE`, if set.
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("PVETL_TITLE_EXCEPTIONS_FILE") {
            if !path.trim().is_empty() {
                let extra = Self::from_path(Path::new(path.trim()))?;
                tracing::info!("Merged title exceptions from {}", path.trim());
                self.merge(extra);
            }
        }
        Ok(())
    }

    pub fn variants(&self, canonical: &str) -> &[String] {
        self.table.get(canonical).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Spelling of `s` as it appears after decoding its UTF-8 bytes one byte per char.
pub fn raw_bytes_spelling(s: &str) -> String {
    decode_latin1(s.as_bytes())
}

/// Derives candidate title spellings from the registry plus the exceptions table.
pub struct TitleExpander<'a> {
    registry: &'a TitleRegistry,
    exceptions: &'a TitleExceptions,
}

impl<'a> TitleExpander<'a> {
    pub fn new(registry: &'a TitleRegistry, exceptions: &'a TitleExceptions) -> Self {
        Self { registry, exceptions }
    }

    /// All spellings of one canonical title, canonical form first. May contain duplicates.
    pub fn variants_of(&self, canonical: &str) -> Vec<String> {
        let mut out = vec![canonical.to_string()];
        if canonical.contains('(') {
            out.push(canonical.replace('(', "%28").replace(')', "%29"));
        }
        out.extend(self.exceptions.variants(canonical).iter().cloned());

        let non_ascii: Vec<String> = out.iter().filter(|s| !s.is_ascii()).map(|s| raw_bytes_spelling(s)).collect();
        out.extend(non_ascii);
        out
    }

    /// Sorted, deduplicated spellings for every registry title.
    pub fn expand(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .registry
            .iter()
            .flat_map(|(_, canonical)| self.variants_of(canonical))
            .collect();
        set.into_iter().collect()
    }
}

/// Maps every expanded spelling back to its single canonical title (and registry id).
#[derive(Clone, Debug, Default)]
pub struct VariantIndex {
    to_canonical: AHashMap<String, String>,
    ids: AHashMap<String, String>,
}

impl VariantIndex {
    /// Fails when one spelling would resolve to two different canonical titles.
    pub fn build(registry: &TitleRegistry, exceptions: &TitleExceptions) -> Result<Self> {
        let expander = TitleExpander::new(registry, exceptions);
        let mut to_canonical: AHashMap<String, String> = AHashMap::new();
        let mut ids: AHashMap<String, String> = AHashMap::new();

        for (id, canonical) in registry.iter() {
            ids.entry(canonical.to_string()).or_insert_with(|| id.to_string());
            for v in expander.variants_of(canonical) {
                match to_canonical.get(&v) {
                    Some(existing) if existing != canonical => {
                        bail!("spelling {v:?} maps to both {existing:?} and {canonical:?}");
                    }
                    Some(_) => {}
                    None => {
                        to_canonical.insert(v, canonical.to_string());
                    }
                }
            }
        }
        Ok(Self { to_canonical, ids })
    }

    pub fn canonical<'s>(&'s self, spelling: &str) -> Result<&'s str, MissingTitle> {
        self.to_canonical
            .get(spelling)
            .map(String::as_str)
            .ok_or_else(|| MissingTitle(spelling.to_string()))
    }

    pub fn id_of(&self, canonical: &str) -> Option<&str> {
        self.ids.get(canonical).map(String::as_str)
    }

    pub fn len(&self) -> usize { self.to_canonical.len() }
    pub fn is_empty(&self) -> bool { self.to_canonical.is_empty() }
}
