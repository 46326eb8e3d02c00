//! One analysis run: discover documents, build their tables, aggregate, and
//! run every configured test.
//!
//! Nothing here aborts on a single bad document or an untestable comparison.
//! Those become [`Skipped`] entries in the [`RunReport`] and the run moves
//! on. Only problems with the run as a whole (missing input directory,
//! duplicate document ids, an unreadable stopword list) are returned as
//! errors.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use corpus_stats::{Adjustment, WordComparisonReport, compare_words, confidence_interval, corpus_homogeneity};
use corpus_table::{
    CorpusBuilder, CorpusTable, DocumentFile, DocumentStats, DocumentText, FrequencyTable,
    LoadMode, Tokenizer, WordTokenizer, discover,
};
use corpus_types::{
    ConfidenceInterval, DocumentId, HomogeneityResult, SkipReason, SkipScope, Skipped, TestKind,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{AnalysisConfig, ComparisonPlan, EmptyDocumentPolicy};

#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub path: PathBuf,
    pub stats: DocumentStats,
}

/// A finished corpus plus whatever could not be loaded into it.
#[derive(Debug)]
pub struct LoadedCorpus {
    pub table: CorpusTable,
    /// In column order.
    pub documents: Vec<DocumentSummary>,
    pub skipped: Vec<Skipped>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HomogeneityOutcome {
    pub documents: Vec<DocumentId>,
    pub result: HomogeneityResult,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WordInterval {
    pub word: String,
    pub document: DocumentId,
    pub count: u64,
    pub total: u64,
    pub interval: ConfidenceInterval,
}

/// Everything a run produced, including each skip and its reason.
#[derive(Debug)]
pub struct RunReport {
    pub table: CorpusTable,
    pub documents: Vec<DocumentSummary>,
    /// Corpus-wide test first, then one per compared pair.
    pub homogeneity: Vec<HomogeneityOutcome>,
    pub comparisons: Vec<WordComparisonReport>,
    /// Adjustment reported next to the raw comparison p-values, if any.
    pub adjustment: Option<Adjustment>,
    pub intervals: Vec<WordInterval>,
    pub skipped: Vec<Skipped>,
}

impl RunReport {
    pub fn skipped_documents(&self) -> impl Iterator<Item = &Skipped> + '_ {
        self.skipped
            .iter()
            .filter(|s| s.scope == SkipScope::Document)
    }
}

/// Load, aggregate and test a corpus as configured.
pub fn run(config: &AnalysisConfig) -> Result<RunReport> {
    let corpus = load_corpus(config)?;
    Ok(analyze(corpus, config))
}

/// Build the tokenizer a config asks for.
pub fn tokenizer_for(config: &AnalysisConfig) -> Result<WordTokenizer> {
    let tokenizer = WordTokenizer::new();
    match &config.stopwords {
        Some(path) => {
            let tokenizer = tokenizer.load_stopwords(path)?;
            info!(
                "loaded {} stopwords from {}",
                tokenizer.stopword_count(),
                path.display()
            );
            Ok(tokenizer)
        }
        None => Ok(tokenizer),
    }
}

/// Read every document under the configured directory into one corpus table.
pub fn load_corpus(config: &AnalysisConfig) -> Result<LoadedCorpus> {
    let tokenizer = tokenizer_for(config)?;
    let files = discover(&config.input_dir, &config.extension)?;

    let start = Instant::now();
    let tables: Vec<Result<FrequencyTable, SkipReason>> = if config.parallel {
        files
            .par_iter()
            .map(|file| build_table(file, config.load_mode, &tokenizer))
            .collect()
    } else {
        files
            .iter()
            .map(|file| build_table(file, config.load_mode, &tokenizer))
            .collect()
    };

    // Merge in path order so parallel and sequential runs agree.
    let mut builder = CorpusBuilder::new();
    let mut documents = Vec::with_capacity(files.len());
    let mut skipped = Vec::new();
    for (file, table) in files.iter().zip(tables) {
        let table = match table {
            Ok(table) => table,
            Err(reason) => {
                warn!("skipping {}: {reason}", file.path.display());
                skipped.push(Skipped::document(file.id.as_str(), reason));
                continue;
            }
        };
        if table.is_empty() {
            match config.empty_documents {
                EmptyDocumentPolicy::Skip => {
                    warn!("skipping {}: no tokens", file.path.display());
                    skipped.push(Skipped::document(
                        file.id.as_str(),
                        SkipReason::EmptyDocument,
                    ));
                    continue;
                }
                EmptyDocumentPolicy::Include => {
                    warn!("{} has no tokens, keeping it as a zero column", file.path.display());
                }
            }
        }
        builder.add(&table)?;
        documents.push(DocumentSummary {
            id: table.id().clone(),
            path: file.path.clone(),
            stats: table.stats(),
        });
    }

    let table = builder.finish();
    info!(
        "aggregated {} documents ({} words, {} skipped) in {} ms",
        documents.len(),
        table.word_count(),
        skipped.len(),
        start.elapsed().as_millis()
    );
    Ok(LoadedCorpus {
        table,
        documents,
        skipped,
    })
}

fn build_table(
    file: &DocumentFile,
    mode: LoadMode,
    tokenizer: &dyn Tokenizer,
) -> Result<FrequencyTable, SkipReason> {
    let text = DocumentText::load(&file.path, mode)
        .map_err(|err| SkipReason::Unreadable(format!("{err:#}")))?;
    let text = text.as_str().map_err(|_| SkipReason::InvalidUtf8)?;
    let table = FrequencyTable::build(file.id.clone(), tokenizer.tokenize(text));
    debug!("{}: {} tokens", file.id, table.total());
    Ok(table)
}

/// Run the configured tests over a loaded corpus.
pub fn analyze(corpus: LoadedCorpus, config: &AnalysisConfig) -> RunReport {
    let LoadedCorpus {
        table,
        documents,
        mut skipped,
    } = corpus;
    let start = Instant::now();

    let mut homogeneity = Vec::new();
    if let Some(outcome) = corpus_wide_homogeneity(&table, config, &mut skipped) {
        homogeneity.push(outcome);
    }

    let mut comparisons = Vec::new();
    for (a, b) in planned_pairs(&table, &config.comparisons) {
        let subject = format!("{a} vs {b}");
        if a == b {
            warn!("skipping {subject}: a document is not compared with itself");
            for kind in [TestKind::Homogeneity, TestKind::WordProportion] {
                skipped.push(Skipped::test(
                    kind,
                    subject.as_str(),
                    SkipReason::InvalidInput("a and b must name different documents".into()),
                ));
            }
            continue;
        }
        match corpus_homogeneity(&table, &[a.as_str(), b.as_str()], &config.homogeneity) {
            Ok(result) => homogeneity.push(HomogeneityOutcome {
                documents: vec![a.clone(), b.clone()],
                result,
            }),
            Err(err) => {
                warn!("skipping homogeneity test {subject}: {err}");
                skipped.push(Skipped::test(
                    TestKind::Homogeneity,
                    subject.as_str(),
                    err.skip_reason(),
                ));
            }
        }
        match compare_words(&table, a.as_str(), b.as_str(), &config.proportion) {
            Ok(report) => {
                if let Some(note) = report.multiple_comparisons_note() {
                    info!("{subject}: {note}");
                }
                skipped.extend(report.skipped.iter().cloned());
                comparisons.push(report);
            }
            Err(err) => {
                warn!("skipping word comparison {subject}: {err}");
                skipped.push(Skipped::test(
                    TestKind::WordProportion,
                    subject.as_str(),
                    err.skip_reason(),
                ));
            }
        }
    }

    let intervals = word_intervals(&table, config, &mut skipped);
    info!(
        "ran {} homogeneity tests, {} word comparisons, {} intervals in {} ms",
        homogeneity.len(),
        comparisons.len(),
        intervals.len(),
        start.elapsed().as_millis()
    );

    RunReport {
        table,
        documents,
        homogeneity,
        comparisons,
        adjustment: config.adjustment,
        intervals,
        skipped,
    }
}

/// Homogeneity across every document that has tokens.
fn corpus_wide_homogeneity(
    table: &CorpusTable,
    config: &AnalysisConfig,
    skipped: &mut Vec<Skipped>,
) -> Option<HomogeneityOutcome> {
    let mut ids = Vec::new();
    for column in table.documents() {
        if column.total_tokens == 0 {
            skipped.push(Skipped::test(
                TestKind::Homogeneity,
                column.id.as_str(),
                SkipReason::EmptyDocument,
            ));
        } else {
            ids.push(column.id.as_str());
        }
    }
    match corpus_homogeneity(table, &ids, &config.homogeneity) {
        Ok(result) => Some(HomogeneityOutcome {
            documents: ids.into_iter().map(DocumentId::from).collect(),
            result,
        }),
        Err(err) => {
            warn!("skipping corpus-wide homogeneity test: {err}");
            skipped.push(Skipped::test(
                TestKind::Homogeneity,
                "corpus",
                err.skip_reason(),
            ));
            None
        }
    }
}

fn planned_pairs(table: &CorpusTable, plan: &ComparisonPlan) -> Vec<(DocumentId, DocumentId)> {
    let ids: Vec<&DocumentId> = table.documents().iter().map(|c| &c.id).collect();
    match plan {
        ComparisonPlan::Auto if ids.len() == 2 => vec![(ids[0].clone(), ids[1].clone())],
        ComparisonPlan::Auto => Vec::new(),
        ComparisonPlan::AllPairs => ids
            .iter()
            .enumerate()
            .flat_map(|(i, a)| ids[i + 1..].iter().map(|b| ((*a).clone(), (*b).clone())))
            .collect(),
        ComparisonPlan::Pairs(pairs) => pairs.clone(),
    }
}

/// Clopper-Pearson intervals for the most frequent words in every document.
fn word_intervals(
    table: &CorpusTable,
    config: &AnalysisConfig,
    skipped: &mut Vec<Skipped>,
) -> Vec<WordInterval> {
    let mut intervals = Vec::new();
    if config.interval_words == 0 {
        return intervals;
    }
    for (col, column) in table.documents().iter().enumerate() {
        if column.total_tokens == 0 {
            skipped.push(Skipped::test(
                TestKind::ConfidenceInterval,
                column.id.as_str(),
                SkipReason::EmptyDocument,
            ));
            continue;
        }
        for row in table.rows().take(config.interval_words) {
            let count = row.count_at(col);
            match confidence_interval(count, column.total_tokens, config.level) {
                Ok(interval) => intervals.push(WordInterval {
                    word: row.word().to_string(),
                    document: column.id.clone(),
                    count,
                    total: column.total_tokens,
                    interval,
                }),
                Err(err) => skipped.push(Skipped::test(
                    TestKind::ConfidenceInterval,
                    format!("{} in {}", row.word(), column.id),
                    err.skip_reason(),
                )),
            }
        }
    }
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(docs: &[(&str, &str)]) -> CorpusTable {
        let tables: Vec<FrequencyTable> = docs
            .iter()
            .map(|(id, text)| FrequencyTable::build(*id, text.split_whitespace()))
            .collect();
        CorpusTable::aggregate(tables.iter()).unwrap()
    }

    #[test]
    fn auto_plan_compares_only_a_pair() {
        let two = table(&[("a", "x"), ("b", "y")]);
        assert_eq!(
            planned_pairs(&two, &ComparisonPlan::Auto),
            vec![(DocumentId::from("a"), DocumentId::from("b"))]
        );
        let three = table(&[("a", "x"), ("b", "y"), ("c", "z")]);
        assert!(planned_pairs(&three, &ComparisonPlan::Auto).is_empty());
        assert_eq!(planned_pairs(&three, &ComparisonPlan::AllPairs).len(), 3);
    }

    #[test]
    fn empty_document_is_excluded_from_tests_with_a_skip() {
        let corpus = table(&[("a", "x x y"), ("b", "x y y"), ("e", "")]);
        let mut config = AnalysisConfig::new("unused");
        config.interval_words = 1;
        let mut skipped = Vec::new();

        let outcome = corpus_wide_homogeneity(&corpus, &config, &mut skipped).unwrap();
        assert_eq!(outcome.documents, vec![DocumentId::from("a"), DocumentId::from("b")]);
        let intervals = word_intervals(&corpus, &config, &mut skipped);
        assert_eq!(intervals.len(), 2);

        assert_eq!(skipped.len(), 2);
        assert!(skipped.iter().all(|s| s.subject == "e"));
        assert!(skipped.iter().all(|s| s.reason == SkipReason::EmptyDocument));
    }

    #[test]
    fn same_document_pair_is_skipped() {
        let corpus = LoadedCorpus {
            table: table(&[("a", "x y"), ("b", "y z")]),
            documents: Vec::new(),
            skipped: Vec::new(),
        };
        let mut config = AnalysisConfig::new("unused");
        config.interval_words = 0;
        config.comparisons = ComparisonPlan::Pairs(vec![("a".into(), "a".into())]);
        let report = analyze(corpus, &config);
        assert!(report.comparisons.is_empty());
        assert_eq!(report.homogeneity.len(), 1);
        let pair_skips: Vec<_> = report.skipped.iter().filter(|s| s.subject == "a vs a").collect();
        assert_eq!(pair_skips.len(), 2);
        assert!(matches!(pair_skips[0].reason, SkipReason::InvalidInput(_)));
    }

    #[test]
    fn single_document_corpus_skips_homogeneity() {
        let corpus = table(&[("only", "x y")]);
        let config = AnalysisConfig::new("unused");
        let mut skipped = Vec::new();
        assert!(corpus_wide_homogeneity(&corpus, &config, &mut skipped).is_none());
        assert_eq!(skipped[0].subject, "corpus");
        assert!(matches!(skipped[0].reason, SkipReason::InsufficientData(_)));
    }
}
