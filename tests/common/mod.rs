#![allow(dead_code)]

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pvetl::{PageviewETL, ReduceMode};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Write a gzip archive containing the given lines, as raw bytes.
pub fn write_gz_bytes(path: &Path, lines: &[&[u8]]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = GzEncoder::new(f, Compression::fast());
    for l in lines {
        enc.write_all(l).unwrap();
        enc.write_all(b"\n").unwrap();
    }
    enc.finish().unwrap();
}

/// Write a gzip archive containing the given text lines.
pub fn write_gz_lines(path: &Path, lines: &[&str]) {
    let raw: Vec<&[u8]> = lines.iter().map(|l| l.as_bytes()).collect();
    write_gz_bytes(path, &raw);
}

/// Decompress every member of a gzip file into raw byte lines (empty lines skipped).
pub fn decompress_gz_raw(path: &Path) -> Vec<Vec<u8>> {
    let r = BufReader::new(MultiGzDecoder::new(File::open(path).unwrap()));
    r.split(b'\n').map(|l| l.unwrap()).filter(|l| !l.is_empty()).collect()
}

/// Decompress every member of a gzip file into UTF-8 lines (lossy).
pub fn decompress_gz_lines(path: &Path) -> Vec<String> {
    decompress_gz_raw(path)
        .into_iter()
        .map(|l| String::from_utf8_lossy(&l).into_owned())
        .collect()
}

/// Read the counts table into `(date, title, views)` rows, header excluded.
pub fn read_csv_rows(path: &Path) -> Vec<(String, String, u128)> {
    let mut rd = csv::Reader::from_path(path).unwrap();
    assert_eq!(rd.headers().unwrap(), vec!["date", "title", "views"]);
    let mut rows: Vec<(String, String, u128)> = rd
        .records()
        .map(|r| {
            let r = r.unwrap();
            (r[0].to_string(), r[1].to_string(), r[2].parse().unwrap())
        })
        .collect();
    rows.sort();
    rows
}

/// Fresh scratch folder (kept on disk for the test's lifetime).
pub fn scratch() -> PathBuf {
    tempfile::tempdir().unwrap().into_path()
}

/// A small raw corpus with two hourly archives on 2016-01-01 and one on 2016-01-02:
///
/// - `Argo_(2012_film)` gets 100 + 50 views on 20160101 and 7 on 20160102
/// - `Argo_%282012_film%29` (percent-encoded spelling) gets 3 views on 20160101
/// - `Lincoln_(film)` gets 20 views on 20160101
/// - `Argo_(2012_film)_soundtrack` is not a registered title
/// - `de Argo_(2012_film) ...` belongs to another project
/// - `Argo` alone is not registered
pub fn make_raw_corpus() -> PathBuf {
    let base = scratch();
    let raw = base.join("raw");

    write_gz_lines(
        &raw.join("2016").join("pagecounts-20160101-000000.gz"),
        &[
            "en Argo_(2012_film) 100 5000",
            "en Argo_(2012_film)_soundtrack 4 200",
            "de Argo_(2012_film) 9 100",
            "en Lincoln_(film) 20 900",
            "en Argo 11 300",
        ],
    );
    write_gz_lines(
        &raw.join("2016").join("pagecounts-20160101-010000.gz"),
        &["en Argo_(2012_film) 50 2500", "en Argo_%282012_film%29 3 100"],
    );
    write_gz_lines(
        &raw.join("2016").join("pagecounts-20160102-000000.gz"),
        &["en Argo_(2012_film) 7 350", "fr Lincoln_(film) 1 10"],
    );
    base
}

pub fn registry_json(base: &Path) -> PathBuf {
    let p = base.join("wiki_titles.json");
    fs::write(&p, r#"{"Q1": "Argo_(2012_film)", "Q2": "Lincoln_(film)"}"#).unwrap();
    p
}

/// Pipeline rooted at `base` with progress disabled.
pub fn etl_for(base: &Path) -> PageviewETL {
    PageviewETL::new()
        .input_dir(base.join("raw"))
        .cache_path(base.join("cache").join("pv").join("pageviews.gz"))
        .counts_path(base.join("cache").join("viewsperday.csv"))
        .work_dir(base.join("work"))
        .reduce_mode(ReduceMode::InMemory)
        .progress(false)
}

/// Write a cache file directly: every line becomes one gzip member.
pub fn write_cache(path: &Path, lines: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = fs::OpenOptions::new().create(true).append(true).open(path).unwrap();
    for l in lines {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(l.as_bytes()).unwrap();
        enc.write_all(b"\n").unwrap();
        f.write_all(&enc.finish().unwrap()).unwrap();
    }
}
