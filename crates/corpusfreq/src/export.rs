//! CSV and JSON files for a finished run.
//!
//! Every writer takes any [`Write`] so tests can render into a `Vec<u8>`;
//! [`export_run`] lays the files out in an output directory.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use corpus_stats::{Adjustment, WordComparisonReport};
use corpus_table::CorpusTable;
use corpus_types::ratio;
use tracing::info;

use crate::pipeline::{DocumentSummary, HomogeneityOutcome, RunReport, WordInterval};
use crate::report::{RunSummary, SkippedView};

/// Wide word x document counts. With `relative` set, one `<doc>_freq`
/// column per document follows the raw counts.
pub fn write_counts_csv<W: Write>(table: &CorpusTable, relative: bool, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    let columns = table.documents();

    let mut header = Vec::with_capacity(1 + columns.len() * 2);
    header.push("word".to_string());
    header.extend(columns.iter().map(|c| c.id.to_string()));
    if relative {
        header.extend(columns.iter().map(|c| format!("{}_freq", c.id)));
    }
    writer.write_record(&header)?;

    for row in table.rows() {
        let counts = row.counts();
        let mut record = Vec::with_capacity(header.len());
        record.push(row.word().to_string());
        record.extend(counts.iter().map(u64::to_string));
        if relative {
            record.extend(
                counts
                    .iter()
                    .zip(columns)
                    .map(|(count, column)| ratio(*count, column.total_tokens).to_string()),
            );
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Ranked word comparisons between two documents. With an adjustment, a
/// `p_adjusted` column follows the raw p-value.
pub fn write_comparisons_csv<W: Write>(
    report: &WordComparisonReport,
    adjustment: Option<Adjustment>,
    out: W,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    let mut header = vec![
        "word",
        "count_a",
        "total_a",
        "prop_a",
        "count_b",
        "total_b",
        "prop_b",
        "p_value",
    ];
    if adjustment.is_some() {
        header.push("p_adjusted");
    }
    header.push("significant");
    writer.write_record(&header)?;

    let adjusted = adjustment.map(|a| report.adjusted_p_values(a));
    for (i, c) in report.comparisons.iter().enumerate() {
        let mut record = vec![
            c.word.clone(),
            c.count_a.to_string(),
            c.total_a.to_string(),
            c.proportion_a().to_string(),
            c.count_b.to_string(),
            c.total_b.to_string(),
            c.proportion_b().to_string(),
            c.p_value.to_string(),
        ];
        if let Some(adjusted) = &adjusted {
            record.push(adjusted[i].to_string());
        }
        record.push(c.significant.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_documents_csv<W: Write>(documents: &[DocumentSummary], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "document",
        "path",
        "total_tokens",
        "distinct_words",
        "hapax_legomena",
        "type_token_ratio",
    ])?;
    for doc in documents {
        writer.write_record([
            doc.id.to_string(),
            doc.path.display().to_string(),
            doc.stats.total_tokens.to_string(),
            doc.stats.distinct_words.to_string(),
            doc.stats.hapax_legomena.to_string(),
            doc.stats.type_token_ratio.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_homogeneity_csv<W: Write>(outcomes: &[HomogeneityOutcome], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "documents",
        "statistic",
        "degrees_of_freedom",
        "p_value",
        "method",
        "words_tested",
        "significant",
    ])?;
    for outcome in outcomes {
        let documents: Vec<&str> = outcome.documents.iter().map(|d| d.as_str()).collect();
        let result = &outcome.result;
        writer.write_record([
            documents.join(";"),
            result.statistic.to_string(),
            result
                .degrees_of_freedom
                .map(|df| df.to_string())
                .unwrap_or_default(),
            result.p_value.to_string(),
            result.method.to_string(),
            result.words_tested.to_string(),
            result.significant.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_intervals_csv<W: Write>(intervals: &[WordInterval], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "word",
        "document",
        "count",
        "total",
        "proportion",
        "lower",
        "upper",
        "level",
    ])?;
    for w in intervals {
        writer.write_record([
            w.word.clone(),
            w.document.to_string(),
            w.count.to_string(),
            w.total.to_string(),
            ratio(w.count, w.total).to_string(),
            w.interval.lower.to_string(),
            w.interval.upper.to_string(),
            w.interval.level.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_skipped_csv<W: Write>(report: &RunReport, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["scope", "subject", "reason"])?;
    for skipped in &report.skipped {
        let view = SkippedView::from(skipped);
        writer.write_record([view.scope, view.subject, view.reason])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_report_json<W: Write>(report: &RunReport, mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, &RunSummary::from(report))?;
    out.flush()?;
    Ok(())
}

/// File name for a pairwise comparison. Letters and digits in any script
/// are kept, `-` and `_` too; anything else in a document id becomes `_`.
pub fn comparison_file_name(report: &WordComparisonReport) -> String {
    let clean = |id: &str| -> String {
        id.chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!(
        "comparison_{}_vs_{}.csv",
        clean(report.document_a.as_str()),
        clean(report.document_b.as_str())
    )
}

/// One file name per comparison, in order. Names that would collide with an
/// earlier one (ignoring case) get a `_2`, `_3`, ... suffix.
pub fn comparison_file_names(comparisons: &[WordComparisonReport]) -> Vec<String> {
    let mut taken = HashSet::new();
    comparisons
        .iter()
        .map(|report| {
            let base = comparison_file_name(report);
            let stem = base.trim_end_matches(".csv").to_string();
            let mut name = base;
            let mut n = 2;
            while !taken.insert(name.to_lowercase()) {
                name = format!("{stem}_{n}.csv");
                n += 1;
            }
            name
        })
        .collect()
}

/// Write every output file of a run into `dir`, creating it if needed.
/// Returns the paths written, in order.
pub fn export_run(
    report: &RunReport,
    dir: impl AsRef<Path>,
    relative: bool,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;

    let mut written = Vec::new();
    let mut emit = |name: &str, write: &dyn Fn(BufWriter<File>) -> Result<()>| -> Result<()> {
        let path = dir.join(name);
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        write(BufWriter::new(file)).with_context(|| format!("write {}", path.display()))?;
        written.push(path);
        Ok(())
    };

    emit("counts.csv", &|w| write_counts_csv(&report.table, relative, w))?;
    emit("documents.csv", &|w| write_documents_csv(&report.documents, w))?;
    emit("homogeneity.csv", &|w| write_homogeneity_csv(&report.homogeneity, w))?;
    let names = comparison_file_names(&report.comparisons);
    for (comparison, name) in report.comparisons.iter().zip(&names) {
        emit(name, &|w| write_comparisons_csv(comparison, report.adjustment, w))?;
    }
    emit("intervals.csv", &|w| write_intervals_csv(&report.intervals, w))?;
    emit("skipped.csv", &|w| write_skipped_csv(report, w))?;
    emit("report.json", &|w| write_report_json(report, w))?;

    info!("wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}
