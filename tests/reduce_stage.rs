#[path = "common/mod.rs"]
mod common;

use common::*;
use pvetl::{DailyCounts, ReduceMode, TitleExceptions, TitleRegistry, VariantIndex};

const LINES: &[&str] = &[
    "en Argo_(2012_film) 100 5000|pagecounts-20160101-000000.gz",
    "en Lincoln_(film) 20 900|pagecounts-20160101-000000.gz",
    "en Argo_(2012_film) 50 2500|pagecounts-20160101-010000.gz",
    "en Argo_%282012_film%29 3 100|pagecounts-20160101-010000.gz",
    "en Argo_(2012_film) 7 350|pagecounts-20160102-000000.gz",
];

fn cache_of(base: &std::path::Path) -> std::path::PathBuf {
    base.join("cache").join("pv").join("pageviews.gz")
}

fn counts_of(base: &std::path::Path) -> std::path::PathBuf {
    base.join("cache").join("viewsperday.csv")
}

fn index() -> VariantIndex {
    let reg = TitleRegistry::from_pairs([("Q1", "Argo_(2012_film)"), ("Q2", "Lincoln_(film)")]);
    VariantIndex::build(&reg, &TitleExceptions::default()).unwrap()
}

fn row(date: &str, title: &str, views: u128) -> (String, String, u128) {
    (date.to_string(), title.to_string(), views)
}

/// Without an index, each logged spelling is its own title.
#[test]
fn reduce_sums_views_per_date_and_title() {
    let base = scratch();
    write_cache(&cache_of(&base), LINES);

    let report = etl_for(&base).reduce_counts(None).unwrap();
    assert_eq!(report.lines_read, 5);
    assert_eq!(report.records, 4);
    assert_eq!(report.malformed, 0);

    assert_eq!(
        read_csv_rows(&counts_of(&base)),
        vec![
            row("20160101", "Argo_%282012_film%29", 3),
            row("20160101", "Argo_(2012_film)", 150),
            row("20160101", "Lincoln_(film)", 20),
            row("20160102", "Argo_(2012_film)", 7),
        ]
    );
}

/// Spellings of one title fold into its canonical name.
#[test]
fn canonical_titles_merge_spelling_variants() {
    let base = scratch();
    write_cache(&cache_of(&base), LINES);
    let idx = index();

    etl_for(&base).reduce_counts(Some(&idx)).unwrap();
    assert_eq!(
        read_csv_rows(&counts_of(&base)),
        vec![
            row("20160101", "Argo_(2012_film)", 153),
            row("20160101", "Lincoln_(film)", 20),
            row("20160102", "Argo_(2012_film)", 7),
        ]
    );
}

/// Reordering cache lines does not change the result.
#[test]
fn reduce_is_order_independent() {
    let a = scratch();
    let b = scratch();
    write_cache(&cache_of(&a), LINES);
    let mut reversed: Vec<&str> = LINES.to_vec();
    reversed.reverse();
    reversed.swap(0, 2);
    write_cache(&cache_of(&b), &reversed);

    etl_for(&a).reduce_counts(None).unwrap();
    etl_for(&b).reduce_counts(None).unwrap();
    assert_eq!(read_csv_rows(&counts_of(&a)), read_csv_rows(&counts_of(&b)));
}

/// A malformed line is dropped and counted; every other key is unaffected.
#[test]
fn malformed_lines_are_skipped() {
    let base = scratch();
    let mut lines: Vec<&str> = LINES.to_vec();
    lines.push("en Argo_(2012_film) lots 1|pagecounts-20160101-000000.gz");
    lines.push("en Argo_(2012_film) 1 1");
    lines.push("en Argo_(2012_film) 1 1|pagecounts.gz");
    write_cache(&cache_of(&base), &lines);

    let report = etl_for(&base).reduce_counts(None).unwrap();
    assert_eq!(report.lines_read, 8);
    assert_eq!(report.malformed, 3);
    assert_eq!(report.records, 4);
    assert!(read_csv_rows(&counts_of(&base)).contains(&row("20160101", "Argo_(2012_film)", 150)));
}

/// With an index, titles outside the registry are dropped and counted.
#[test]
fn unmapped_titles_are_counted() {
    let base = scratch();
    let mut lines: Vec<&str> = LINES.to_vec();
    lines.push("en Skyfall 9 9|pagecounts-20160101-000000.gz");
    write_cache(&cache_of(&base), &lines);
    let idx = index();

    let report = etl_for(&base).reduce_counts(Some(&idx)).unwrap();
    assert_eq!(report.unmapped, 1);
    assert!(!read_csv_rows(&counts_of(&base)).iter().any(|(_, t, _)| t == "Skyfall"));
}

/// Disk shards produce exactly the in-memory result.
#[test]
fn sharded_reduce_matches_in_memory() {
    let mem = scratch();
    let disk = scratch();
    write_cache(&cache_of(&mem), LINES);
    write_cache(&cache_of(&disk), LINES);

    etl_for(&mem).reduce_counts(None).unwrap();
    let report = etl_for(&disk)
        .reduce_mode(ReduceMode::Sharded { shards: 3 })
        .reduce_counts(None)
        .unwrap();

    assert!(report.spilled);
    assert_eq!(report.records, 4);
    assert_eq!(read_csv_rows(&counts_of(&mem)), read_csv_rows(&counts_of(&disk)));
    assert!(!disk.join("work").join("reduce_kv_shards").exists());
}

/// No cache yet: the table has only its header.
#[test]
fn missing_cache_yields_header_only_table() {
    let base = scratch();
    let report = etl_for(&base).reduce_counts(None).unwrap();
    assert_eq!(report.records, 0);
    assert!(read_csv_rows(&counts_of(&base)).is_empty());
}

/// Sums past `u64::MAX` are kept exactly.
#[test]
fn daily_counts_widen_past_u64() {
    let mut counts = DailyCounts::new();
    counts.ingest("20160101|Argo".into(), u128::from(u64::MAX)).unwrap();
    counts.ingest("20160101|Argo".into(), 1).unwrap();
    assert_eq!(counts.get("20160101", "Argo"), Some(u128::from(u64::MAX) + 1));

    let mut other = DailyCounts::new();
    other.ingest("20160101|Argo".into(), 2).unwrap();
    counts.merge(other).unwrap();
    assert_eq!(counts.records().len(), 1);
    assert_eq!(counts.records()[0].views, u128::from(u64::MAX) + 3);
}
