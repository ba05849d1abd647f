#[path = "common/mod.rs"]
mod common;

use common::*;
use pvetl::{CacheAppender, PageDate, TitleExceptions, TitleRegistry};
use std::fs;

fn titles() -> (TitleRegistry, TitleExceptions) {
    (
        TitleRegistry::from_pairs([("Q1", "Argo_(2012_film)"), ("Q2", "Lincoln_(film)")]),
        TitleExceptions::builtin().unwrap(),
    )
}

/// Matching lines are appended, tagged with their archive's base name; lines for other
/// projects or unregistered titles never reach the cache. Consumed archives are deleted and
/// a second run finds nothing to do.
#[test]
fn filter_appends_matches_and_consumes_inputs() {
    let base = make_raw_corpus();
    let (reg, ex) = titles();
    let etl = etl_for(&base).delete_inputs(true);

    let report = etl.filter_with_registry(&reg, &ex).unwrap();
    assert_eq!(report.files_seen, 3);
    assert_eq!(report.files_processed, 3);
    assert_eq!(report.lines_scanned, 9);
    assert_eq!(report.lines_appended, 5);
    assert_eq!(report.deleted.len(), 3);
    assert!(report.failed.is_empty());

    let cache = base.join("cache").join("pv").join("pageviews.gz");
    let lines = decompress_gz_lines(&cache);
    assert_eq!(
        lines,
        vec![
            "en Argo_(2012_film) 100 5000|pagecounts-20160101-000000.gz",
            "en Lincoln_(film) 20 900|pagecounts-20160101-000000.gz",
            "en Argo_(2012_film) 50 2500|pagecounts-20160101-010000.gz",
            "en Argo_%282012_film%29 3 100|pagecounts-20160101-010000.gz",
            "en Argo_(2012_film) 7 350|pagecounts-20160102-000000.gz",
        ]
    );
    assert!(!lines.iter().any(|l| l.starts_with("de ") || l.contains("soundtrack")));
    assert!(etl.planned_archives().unwrap().is_empty());

    // Nothing left to consume: the cache is untouched.
    let again = etl.filter_with_registry(&reg, &ex).unwrap();
    assert_eq!(again.files_seen, 0);
    assert_eq!(decompress_gz_lines(&cache).len(), 5);

    // Staged parts are cleaned up.
    let parts = base.join("work").join("filter_parts");
    assert_eq!(fs::read_dir(parts).unwrap().count(), 0);
}

#[test]
fn keep_inputs_leaves_archives_in_place() {
    let base = make_raw_corpus();
    let (reg, ex) = titles();
    let report = etl_for(&base).filter_with_registry(&reg, &ex).unwrap();

    assert_eq!(report.lines_appended, 5);
    assert!(report.deleted.is_empty());
    assert_eq!(etl_for(&base).planned_archives().unwrap().len(), 3);
}

/// A dry run counts matches without creating the cache or deleting anything.
#[test]
fn dry_run_writes_and_deletes_nothing() {
    let base = make_raw_corpus();
    let (reg, ex) = titles();
    let report = etl_for(&base)
        .delete_inputs(true)
        .dry_run(true)
        .filter_with_registry(&reg, &ex)
        .unwrap();

    assert_eq!(report.lines_appended, 5);
    assert!(report.deleted.is_empty());
    assert!(!base.join("cache").join("pv").join("pageviews.gz").exists());
    assert_eq!(etl_for(&base).planned_archives().unwrap().len(), 3);
}

/// An archive that cannot be decoded is reported, contributes nothing, and is never
/// deleted; the healthy archives are processed as usual.
#[test]
fn corrupt_archive_is_kept_and_reported() {
    let base = make_raw_corpus();
    let bad = base.join("raw").join("2016").join("pagecounts-20160103-000000.gz");
    fs::write(&bad, b"definitely not gzip").unwrap();

    let (reg, ex) = titles();
    let report = etl_for(&base).delete_inputs(true).filter_with_registry(&reg, &ex).unwrap();

    assert_eq!(report.files_seen, 4);
    assert_eq!(report.files_processed, 3);
    assert_eq!(report.deleted.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, bad);
    assert!(bad.exists());
    assert_eq!(decompress_gz_lines(&base.join("cache").join("pv").join("pageviews.gz")).len(), 5);
}

/// Archives outside the date range are not read; their files are left alone.
#[test]
fn date_range_limits_archives() {
    let base = make_raw_corpus();
    let (reg, ex) = titles();
    let day = PageDate::new(2016, 1, 2);
    let report = etl_for(&base)
        .delete_inputs(true)
        .date_range(day, day)
        .filter_with_registry(&reg, &ex)
        .unwrap();

    assert_eq!(report.files_seen, 1);
    assert_eq!(report.lines_appended, 1);
    assert_eq!(etl_for(&base).planned_archives().unwrap().len(), 2);
}

/// Unrelated files and non-matching names under the input tree are ignored.
#[test]
fn discovery_only_picks_archive_names() {
    let base = make_raw_corpus();
    fs::write(base.join("raw").join("README.txt"), "notes").unwrap();
    write_gz_lines(&base.join("raw").join("deep").join("x").join("pageviews-20160105-230000.gz"), &["en Argo_(2012_film) 1 1"]);
    write_gz_lines(&base.join("raw").join("projectcounts-20160101-000000.gz"), &["en Argo_(2012_film) 1 1"]);

    let names: Vec<String> = etl_for(&base).planned_archives().unwrap().into_iter().map(|j| j.name).collect();
    assert_eq!(names.len(), 4);
    assert!(names.contains(&"pageviews-20160105-230000.gz".to_string()));
    assert!(!names.iter().any(|n| n.starts_with("projectcounts")));
}

/// Filtering several archives at once yields the same cache content as one at a time.
#[test]
fn concurrent_filtering_matches_sequential() {
    let seq_base = make_raw_corpus();
    let par_base = make_raw_corpus();
    let (reg, ex) = titles();

    etl_for(&seq_base).filter_with_registry(&reg, &ex).unwrap();
    etl_for(&par_base).file_concurrency(3).filter_with_registry(&reg, &ex).unwrap();

    let mut a = decompress_gz_lines(&seq_base.join("cache").join("pv").join("pageviews.gz"));
    let mut b = decompress_gz_lines(&par_base.join("cache").join("pv").join("pageviews.gz"));
    a.sort();
    b.sort();
    assert_eq!(a, b);
}

/// Raw bytes that are not UTF-8 are copied to the cache unchanged.
#[test]
fn non_utf8_bytes_are_preserved() {
    let base = scratch();
    write_gz_bytes(
        &base.join("raw").join("pagecounts-20160101-000000.gz"),
        &[b"en Caf\xe9 5 10", b"en Cafe 1 1"],
    );

    let report = etl_for(&base).filter_raws(&["Caf\u{e9}"]).unwrap();
    assert_eq!(report.lines_appended, 1);

    let raw = decompress_gz_raw(&base.join("cache").join("pv").join("pageviews.gz"));
    assert_eq!(raw, vec![b"en Caf\xe9 5 10|pagecounts-20160101-000000.gz".to_vec()]);
}

/// Archives sharing a base name in different folders are staged separately, even when
/// filtered at the same time, so every matched line lands in the cache exactly once.
#[test]
fn same_named_archives_filter_concurrently() {
    let lines: Vec<String> = (0..5_000).map(|i| format!("en Argo_(2012_film) {i} 100")).collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    let (reg, ex) = titles();

    for _ in 0..5 {
        let base = scratch();
        write_gz_lines(&base.join("raw").join("a").join("pagecounts-20160101-000000.gz"), &lines);
        write_gz_lines(&base.join("raw").join("b").join("pagecounts-20160101-000000.gz"), &lines);

        let report = etl_for(&base)
            .delete_inputs(true)
            .file_concurrency(2)
            .parallelism(4)
            .filter_with_registry(&reg, &ex)
            .unwrap();
        assert_eq!(report.lines_appended, 10_000);
        assert_eq!(report.deleted.len(), 2);

        let mut cached = decompress_gz_lines(&base.join("cache").join("pv").join("pageviews.gz"));
        assert_eq!(cached.len(), 10_000);
        cached.sort();
        cached.dedup();
        // Both archives carry identical lines and tags, so each appears exactly twice.
        assert_eq!(cached.len(), 5_000);
        assert!(cached.iter().all(|l| l.ends_with(" 100|pagecounts-20160101-000000.gz")));
    }
}

/// When the append itself fails, the input stays, the failure is reported, and nothing is
/// deleted.
#[test]
fn failed_append_keeps_inputs() {
    let base = make_raw_corpus();
    let cache_dir = base.join("cache_is_a_dir");
    fs::create_dir_all(&cache_dir).unwrap();

    let (reg, ex) = titles();
    let report = etl_for(&base)
        .cache_path(&cache_dir)
        .delete_inputs(true)
        .filter_with_registry(&reg, &ex)
        .unwrap();

    assert_eq!(report.files_processed, 0);
    assert_eq!(report.failed.len(), 3);
    assert!(report.deleted.is_empty());
    for (path, _) in &report.failed {
        assert!(path.exists(), "{} was deleted", path.display());
    }
    assert_eq!(etl_for(&base).planned_archives().unwrap().len(), 3);
    assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 0);
}

/// A failing append rolls the cache back to its previous length.
#[test]
fn failed_append_leaves_cache_length_unchanged() {
    let base = scratch();
    let cache = base.join("cache").join("pageviews.gz");
    let part = base.join("ok.part");
    fs::write(&part, "en Argo_(2012_film) 1 1|pagecounts-20160101-000000.gz\n").unwrap();

    let mut app = CacheAppender::open(&cache).unwrap();
    app.append_part(&part).unwrap();
    let before = fs::metadata(&cache).unwrap().len();

    assert!(app.append_part(&base.join("missing.part")).is_err());
    assert_eq!(fs::metadata(&cache).unwrap().len(), before);
    assert_eq!(
        decompress_gz_lines(&cache),
        vec!["en Argo_(2012_film) 1 1|pagecounts-20160101-000000.gz"]
    );

    // The appender stays usable after a rollback.
    app.append_part(&part).unwrap();
    assert_eq!(decompress_gz_lines(&cache).len(), 2);
}
