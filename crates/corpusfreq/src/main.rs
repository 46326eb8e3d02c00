use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use corpus_stats::{
    Adjustment, ComparisonOptions, DEFAULT_RESAMPLES, DEFAULT_SEED, HomogeneityOptions,
    ProportionMethod,
};
use corpus_table::LoadMode;
use corpus_types::{DocumentId, Significance};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use corpusfreq::config::{
    DEFAULT_EXTENSION, DEFAULT_HOST, DEFAULT_INTERVAL_WORDS, DEFAULT_LEVEL, DEFAULT_PORT,
};
use corpusfreq::{
    AnalysisConfig, AppState, ComparisonPlan, EmptyDocumentPolicy, ServeConfig, ServedCorpus,
    export_run, load_corpus, router, run,
};

const MAX_PAGE_SIZE: usize = 500;

#[derive(Parser)]
#[command(name = "corpusfreq")]
#[command(about = "Word frequency tables and significance tests for text corpora")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a corpus, run the tests and write CSV/JSON results.
    Analyze(AnalyzeArgs),
    /// Load a corpus and answer queries about it over HTTP.
    Serve(ServeArgs),
}

#[derive(Args)]
struct CorpusArgs {
    /// Directory of UTF-8 text files, one document per file.
    #[arg(long, env = "CORPUS_DIR")]
    input: PathBuf,
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    ext: String,
    #[arg(long, default_value = "mmap", value_parser = parse_load_mode)]
    mode: LoadMode,
    #[arg(long, default_value_t = false)]
    parallel: bool,
    /// One stopword per line; `#` starts a comment line.
    #[arg(long)]
    stopwords: Option<PathBuf>,
    /// Leave documents without tokens out instead of keeping zero columns.
    #[arg(long, default_value_t = false)]
    skip_empty: bool,
    #[arg(long, default_value_t = DEFAULT_RESAMPLES)]
    resamples: u32,
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// Use Fisher's exact test for word comparisons.
    #[arg(long, default_value_t = false)]
    fisher: bool,
    /// Confidence level for Clopper-Pearson intervals.
    #[arg(long, default_value_t = DEFAULT_LEVEL)]
    level: f64,
    #[arg(long, default_value_t = Significance::DEFAULT_ALPHA)]
    alpha: f64,
    /// Report adjusted p-values (bonferroni or bh) next to the raw ones.
    #[arg(long, value_parser = parse_adjustment)]
    adjust: Option<Adjustment>,
}

#[derive(Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    corpus: CorpusArgs,
    #[arg(long, short)]
    output: PathBuf,
    /// Compare two documents word by word. Repeat for more pairs.
    #[arg(long, num_args = 2, value_names = ["A", "B"], action = ArgAction::Append)]
    compare: Vec<String>,
    #[arg(long, default_value_t = false, conflicts_with = "compare")]
    all_pairs: bool,
    /// Report intervals for this many of the most frequent words.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_WORDS)]
    interval_words: usize,
    /// Add a relative-frequency block to counts.csv.
    #[arg(long, default_value_t = false)]
    relative: bool,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    corpus: CorpusArgs,
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => analyze(args),
        Commands::Serve(args) => serve(args).await,
    }
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    let mut config = analysis_config(&args.corpus)?;
    config.comparisons = comparison_plan(&args.compare, args.all_pairs)?;
    config.interval_words = args.interval_words;
    info!(
        "analyzing {} (*.{}, mode: {:?})",
        config.input_dir.display(),
        config.extension,
        config.load_mode
    );

    let start = Instant::now();
    let report = run(&config)?;
    let written = export_run(&report, &args.output, args.relative)?;

    println!(
        "Analyzed {} documents ({} words) in {} ms: {} homogeneity tests, {} word comparisons, {} skipped.",
        report.documents.len(),
        report.table.word_count(),
        start.elapsed().as_millis(),
        report.homogeneity.len(),
        report.comparisons.len(),
        report.skipped.len()
    );
    for skipped in report.skipped_documents() {
        println!("  skipped {skipped}");
    }
    println!(
        "Wrote {} files to {}",
        written.len(),
        args.output.display()
    );
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = analysis_config(&args.corpus)?;
    let serve = ServeConfig {
        host: args.host,
        port: args.port,
    };
    info!("binding to {}", serve.address());
    info!(
        "serving corpus at {} (mode: {:?})",
        config.input_dir.display(),
        config.load_mode
    );

    let start = Instant::now();
    let corpus = load_corpus(&config)?;
    info!(
        "corpus loaded in {} ms ({} documents, {} words)",
        start.elapsed().as_millis(),
        corpus.documents.len(),
        corpus.table.word_count()
    );

    let state = AppState {
        corpus: Arc::new(ServedCorpus::new(corpus, &config)),
        max_limit: MAX_PAGE_SIZE,
    };
    let app = router(state).layer(TraceLayer::new_for_http());
    let listener = TcpListener::bind(serve.address())
        .await
        .with_context(|| format!("bind {}", serve.address()))?;

    axum::serve(listener, app).await?;
    Ok(())
}

fn analysis_config(args: &CorpusArgs) -> Result<AnalysisConfig> {
    for (name, value) in [("level", args.level), ("alpha", args.alpha)] {
        if !(value > 0.0 && value < 1.0) {
            bail!("--{name} must lie strictly between 0 and 1, got {value}");
        }
    }
    let significance = Significance::new(args.alpha);

    let mut config = AnalysisConfig::new(&args.input);
    config.extension = args.ext.clone();
    config.load_mode = args.mode;
    config.stopwords = args.stopwords.clone();
    config.parallel = args.parallel;
    config.empty_documents = if args.skip_empty {
        EmptyDocumentPolicy::Skip
    } else {
        EmptyDocumentPolicy::Include
    };
    config.homogeneity = HomogeneityOptions {
        resamples: args.resamples,
        seed: args.seed,
        significance,
        ..HomogeneityOptions::default()
    };
    config.proportion = ComparisonOptions {
        method: if args.fisher {
            ProportionMethod::FisherExact
        } else {
            ProportionMethod::ChiSquareYates
        },
        significance,
    };
    config.adjustment = args.adjust;
    config.level = args.level;
    Ok(config)
}

fn comparison_plan(compare: &[String], all_pairs: bool) -> Result<ComparisonPlan> {
    if all_pairs {
        return Ok(ComparisonPlan::AllPairs);
    }
    if compare.is_empty() {
        return Ok(ComparisonPlan::Auto);
    }
    ComparisonPlan::pairs(
        compare
            .chunks_exact(2)
            .map(|pair| (DocumentId::from(pair[0].as_str()), DocumentId::from(pair[1].as_str()))),
    )
    .context("invalid --compare")
}

fn parse_adjustment(raw: &str) -> Result<Adjustment, String> {
    Adjustment::parse(raw)
        .ok_or_else(|| format!("unknown adjustment {raw:?}, expected bonferroni or bh"))
}

fn parse_load_mode(raw: &str) -> Result<LoadMode, String> {
    LoadMode::parse(raw).ok_or_else(|| format!("unknown load mode {raw:?}, expected mmap or owned"))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn repeated_compare_flags_become_pairs() {
        let cli = Cli::try_parse_from([
            "corpusfreq",
            "analyze",
            "--input",
            "corpus",
            "--output",
            "out",
            "--compare",
            "iliad",
            "odyssey",
            "--compare",
            "iliad",
            "theogony",
            "--fisher",
        ])
        .unwrap();
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(
            comparison_plan(&args.compare, args.all_pairs).unwrap(),
            ComparisonPlan::Pairs(vec![
                ("iliad".into(), "odyssey".into()),
                ("iliad".into(), "theogony".into()),
            ])
        );
        let config = analysis_config(&args.corpus).unwrap();
        assert_eq!(config.proportion.method, ProportionMethod::FisherExact);
        assert_eq!(config.homogeneity.seed, DEFAULT_SEED);
        assert_eq!(config.empty_documents, EmptyDocumentPolicy::Include);
        assert_eq!(config.adjustment, None);
    }

    #[test]
    fn compare_flags_reject_self_pairs_and_drop_repeats() {
        let parse = |extra: &[&str]| {
            let mut argv = vec!["corpusfreq", "analyze", "--input", "c", "--output", "o"];
            argv.extend_from_slice(extra);
            let Commands::Analyze(args) = Cli::try_parse_from(argv).unwrap().command else {
                panic!("expected analyze");
            };
            comparison_plan(&args.compare, args.all_pairs)
        };
        assert!(parse(&["--compare", "iliad", "iliad"]).is_err());
        assert_eq!(
            parse(&["--compare", "iliad", "odyssey", "--compare", "odyssey", "iliad"]).unwrap(),
            ComparisonPlan::Pairs(vec![("iliad".into(), "odyssey".into())])
        );
    }

    #[test]
    fn adjust_flag_is_opt_in() {
        let cli =
            Cli::try_parse_from(["corpusfreq", "serve", "--input", "c", "--adjust", "bh"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = analysis_config(&args.corpus).unwrap();
        assert_eq!(config.adjustment, Some(Adjustment::BenjaminiHochberg));

        assert!(
            Cli::try_parse_from(["corpusfreq", "serve", "--input", "c", "--adjust", "holm"])
                .is_err()
        );
    }

    #[test]
    fn rejects_out_of_range_level() {
        let cli = Cli::try_parse_from([
            "corpusfreq",
            "serve",
            "--input",
            "corpus",
            "--level",
            "1.5",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert!(analysis_config(&args.corpus).is_err());
    }

    #[test]
    fn rejects_unknown_load_mode() {
        assert!(
            Cli::try_parse_from([
                "corpusfreq",
                "analyze",
                "--input",
                "c",
                "--output",
                "o",
                "--mode",
                "heap"
            ])
            .is_err()
        );
    }
}
