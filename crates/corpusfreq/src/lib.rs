//! Batch analysis of a text corpus: per-document word counts, one wide
//! corpus table, chi-square homogeneity and per-word proportion tests, and
//! exact confidence intervals. Results go to CSV/JSON files or are served
//! read-only over HTTP.

pub mod config;
pub mod export;
pub mod handlers;
pub mod pipeline;
pub mod report;

pub use config::{AnalysisConfig, ComparisonPlan, EmptyDocumentPolicy, ServeConfig};
pub use export::export_run;
pub use handlers::{AppState, ServedCorpus, router};
pub use pipeline::{LoadedCorpus, RunReport, analyze, load_corpus, run};
