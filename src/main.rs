use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pvetl::{
    init_tracing_once, IntegrityMode, PageDate, PageviewETL, ReduceMode, TitleExceptions, TitleExpander,
    TitleRegistry, VariantIndex,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Filter hourly pagecount archives and reduce them to daily views per title")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append matching lines from raw archives to the cache, then delete the consumed archives
    Filter(FilterArgs),
    /// Sum cached lines into the date,title,views table
    Reduce(ReduceArgs),
    /// Filter, then reduce
    Run(RunArgs),
    /// Decode raw archives and list the corrupt ones (read-only)
    Check(CheckArgs),
    /// Print every title spelling the filter would match
    Titles(TitleArgs),
}

#[derive(Args, Debug, Clone)]
struct TitleArgs {
    /// Title registry: JSON object of id -> canonical title
    #[arg(long, default_value = "wiki_titles.json")]
    titles: PathBuf,

    /// Extra spelling exceptions (JSON object of canonical title -> [variants]), merged
    /// over the built-in table
    #[arg(long)]
    exceptions: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct InputArgs {
    /// Folder tree containing raw hourly archives
    #[arg(short, long, default_value = "./pagecounts-raw")]
    input: PathBuf,

    /// Archive file name regex; repeat for several collection epochs
    #[arg(long = "pattern")]
    patterns: Vec<String>,

    /// First archive date to include (YYYYMMDD)
    #[arg(long)]
    start: Option<PageDate>,

    /// Last archive date to include (YYYYMMDD)
    #[arg(long)]
    end: Option<PageDate>,

    /// Archives decoded concurrently
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Accumulation cache (gzip, append-only)
    #[arg(long, default_value = "./cache/pv/pageviews.gz")]
    cache: PathBuf,

    /// Scratch folder for staged parts and reduce shards
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Rayon worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug, Clone)]
struct FilterArgs {
    #[command(flatten)]
    titles: TitleArgs,
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    common: CommonArgs,

    /// Log project code lines must start with
    #[arg(long, default_value = "en")]
    project: String,

    /// Do not delete raw archives after their lines are appended
    #[arg(long)]
    keep_inputs: bool,

    /// Count matches only: nothing is appended and nothing is deleted
    #[arg(long)]
    dry_run: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Memory,
    Sharded,
    Adaptive,
}

#[derive(Args, Debug, Clone)]
struct ReduceOpts {
    /// Output table
    #[arg(short, long, default_value = "./cache/viewsperday.csv")]
    out: PathBuf,

    /// Keep titles as logged instead of mapping them to canonical registry titles
    #[arg(long)]
    raw_titles: bool,

    #[arg(long, value_enum, default_value_t = ModeArg::Adaptive)]
    mode: ModeArg,

    /// Disk shards for sharded / adaptive reduce
    #[arg(long, default_value_t = 64)]
    shards: usize,
}

#[derive(Args, Debug, Clone)]
struct ReduceArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[command(flatten)]
    reduce: ReduceOpts,

    /// Title registry used to canonicalize titles; without it titles stay as logged
    #[arg(long)]
    titles: Option<PathBuf>,

    #[arg(long)]
    exceptions: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[command(flatten)]
    filter: FilterArgs,
    #[command(flatten)]
    reduce: ReduceOpts,
}

#[derive(Args, Debug, Clone)]
struct CheckArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Decode every archive to the end instead of sampling
    #[arg(long)]
    full: bool,

    /// Decompressed bytes sampled per archive in quick mode
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    sample_bytes: u64,

    #[arg(long)]
    no_progress: bool,
}

fn load_titles(args: &TitleArgs) -> Result<(TitleRegistry, TitleExceptions)> {
    load_titles_from(&args.titles, args.exceptions.as_deref())
}

fn load_titles_from(registry: &Path, exceptions: Option<&Path>) -> Result<(TitleRegistry, TitleExceptions)> {
    let registry = TitleRegistry::from_path(registry)?;
    let mut ex = TitleExceptions::builtin()?;
    if let Some(p) = exceptions {
        ex.merge(TitleExceptions::from_path(p)?);
    }
    ex.merge_from_env()?;
    Ok((registry, ex))
}

fn reduce_mode(opts: &ReduceOpts) -> ReduceMode {
    match opts.mode {
        ModeArg::Memory => ReduceMode::InMemory,
        ModeArg::Sharded => ReduceMode::Sharded { shards: opts.shards },
        ModeArg::Adaptive => ReduceMode::Adaptive { shards: opts.shards },
    }
}

fn with_input(mut etl: PageviewETL, input: &InputArgs) -> PageviewETL {
    etl = etl.input_dir(&input.input).date_range(input.start, input.end).file_concurrency(input.jobs);
    if !input.patterns.is_empty() {
        etl = etl.archive_patterns(input.patterns.clone());
    }
    etl
}

fn with_common(mut etl: PageviewETL, common: &CommonArgs) -> PageviewETL {
    etl = etl.cache_path(&common.cache).progress(!common.no_progress);
    if let Some(dir) = &common.work_dir {
        etl = etl.work_dir(dir);
    }
    if let Some(n) = common.threads {
        etl = etl.parallelism(n);
    }
    etl
}

fn filter_etl(args: &FilterArgs) -> PageviewETL {
    let etl = with_common(with_input(PageviewETL::new(), &args.input), &args.common);
    if args.keep_inputs || args.dry_run {
        tracing::info!("Raw archives will be kept");
    } else {
        tracing::warn!("Raw archives are deleted once their lines are in the cache (pass --keep-inputs to keep them)");
    }
    etl.project(&args.project)
        .delete_inputs(!args.keep_inputs)
        .dry_run(args.dry_run)
        .progress_label("Filtering")
}

fn main() -> Result<()> {
    init_tracing_once();
    let cli = Cli::parse();

    match cli.command {
        Command::Filter(args) => {
            let (registry, exceptions) = load_titles(&args.titles)?;
            let report = filter_etl(&args).filter_with_registry(&registry, &exceptions)?;
            println!(
                "{} files processed, {} lines appended, {} deleted, {} failed",
                report.files_processed,
                report.lines_appended,
                report.deleted.len(),
                report.failed.len()
            );
        }
        Command::Reduce(args) => {
            let index = match (&args.titles, args.reduce.raw_titles) {
                (Some(path), false) => {
                    let (registry, exceptions) = load_titles_from(path, args.exceptions.as_deref())?;
                    Some(VariantIndex::build(&registry, &exceptions)?)
                }
                _ => None,
            };
            let report = with_common(PageviewETL::new(), &args.common)
                .counts_path(&args.reduce.out)
                .reduce_mode(reduce_mode(&args.reduce))
                .reduce_counts(index.as_ref())?;
            println!(
                "{} rows from {} lines ({} malformed, {} unmapped)",
                report.records, report.lines_read, report.malformed, report.unmapped
            );
        }
        Command::Run(args) => {
            let (registry, exceptions) = load_titles(&args.filter.titles)?;
            let (f, r) = filter_etl(&args.filter)
                .counts_path(&args.reduce.out)
                .reduce_mode(reduce_mode(&args.reduce))
                .canonical_titles(!args.reduce.raw_titles)
                .run(&registry, &exceptions)?;
            println!(
                "{} files processed, {} lines appended, {} failed; {} rows written",
                f.files_processed,
                f.lines_appended,
                f.failed.len(),
                r.records
            );
        }
        Command::Check(args) => {
            let mode = if args.full {
                IntegrityMode::Full
            } else {
                IntegrityMode::Quick { sample_bytes: args.sample_bytes }
            };
            let bad = with_input(PageviewETL::new(), &args.input)
                .progress(!args.no_progress)
                .check_integrity(mode)?;
            for (path, err) in &bad {
                println!("{}\t{}", path.display(), err);
            }
            if !bad.is_empty() {
                bail!("{} corrupt archives", bad.len());
            }
        }
        Command::Titles(args) => {
            let (registry, exceptions) = load_titles(&args)?;
            for t in TitleExpander::new(&registry, &exceptions).expand() {
                println!("{t}");
            }
        }
    }
    Ok(())
}
