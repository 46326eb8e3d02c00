use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use corpus_stats::{
    Adjustment, ComparisonOptions, HomogeneityOptions, ProportionMethod, StatsError, compare_words,
    confidence_interval, corpus_homogeneity,
};
use corpus_table::CorpusTable;
use corpus_types::{Skipped, TestKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::config::AnalysisConfig;
use crate::pipeline::{DocumentSummary, HomogeneityOutcome, LoadedCorpus, WordInterval};
use crate::report::{DocumentView, HomogeneityView, IntervalView, PairView, SkippedView};

const DEFAULT_LIMIT: usize = 50;

/// A finalized corpus and the test settings queries run with.
pub struct ServedCorpus {
    pub table: CorpusTable,
    pub documents: Vec<DocumentSummary>,
    pub skipped: Vec<Skipped>,
    pub homogeneity: HomogeneityOptions,
    pub proportion: ComparisonOptions,
    pub adjustment: Option<Adjustment>,
    pub level: f64,
}

impl ServedCorpus {
    pub fn new(corpus: LoadedCorpus, config: &AnalysisConfig) -> Self {
        Self {
            table: corpus.table,
            documents: corpus.documents,
            skipped: corpus.skipped,
            homogeneity: config.homogeneity,
            proportion: config.proportion,
            adjustment: config.adjustment,
            level: config.level,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub corpus: Arc<ServedCorpus>,
    pub max_limit: usize,
}

#[derive(Deserialize)]
pub struct WordsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct CompareQuery {
    pub a: Option<String>,
    pub b: Option<String>,
    pub limit: Option<usize>,
    pub method: Option<String>,
    /// `bonferroni`, `bh`, or `none` to turn off a server-wide default.
    pub adjust: Option<String>,
}

#[derive(Deserialize)]
pub struct IntervalQuery {
    pub word: Option<String>,
    pub document: Option<String>,
    pub level: Option<f64>,
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentView>,
    skipped: Vec<SkippedView>,
}

#[derive(Serialize)]
struct WordRow {
    word: String,
    total: u64,
    counts: Vec<u64>,
}

#[derive(Serialize)]
struct WordsResponse {
    total: usize,
    offset: usize,
    limit: usize,
    has_more: bool,
    documents: Vec<String>,
    items: Vec<WordRow>,
}

#[derive(Serialize)]
struct CompareResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    homogeneity: Option<HomogeneityView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comparison: Option<PairView>,
    skipped: Vec<SkippedView>,
}

#[derive(Serialize)]
struct IntervalResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<IntervalView>,
    skipped: Vec<SkippedView>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/documents", get(documents))
        .route("/v1/words", get(words))
        .route("/v1/compare", get(compare))
        .route("/v1/interval", get(interval))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn documents(State(state): State<AppState>) -> Json<DocumentsResponse> {
    let corpus = &state.corpus;
    Json(DocumentsResponse {
        documents: corpus.documents.iter().map(DocumentView::from).collect(),
        skipped: corpus.skipped.iter().map(SkippedView::from).collect(),
    })
}

async fn words(
    State(state): State<AppState>,
    Query(params): Query<WordsQuery>,
) -> Result<Json<WordsResponse>, ApiError> {
    let limit = parse_limit(params.limit, state.max_limit)?;
    let offset = params.offset.unwrap_or(0);
    let table = &state.corpus.table;

    let items: Vec<WordRow> = table
        .rows()
        .skip(offset)
        .take(limit)
        .map(|row| WordRow {
            word: row.word().to_string(),
            total: row.total(),
            counts: row.counts(),
        })
        .collect();
    let total = table.word_count();
    Ok(Json(WordsResponse {
        total,
        offset,
        limit,
        has_more: offset.saturating_add(items.len()) < total,
        documents: table.documents().iter().map(|c| c.id.to_string()).collect(),
        items,
    }))
}

async fn compare(
    State(state): State<AppState>,
    Query(params): Query<CompareQuery>,
) -> Result<Json<CompareResponse>, ApiError> {
    let a = required(params.a, "a")?;
    let b = required(params.b, "b")?;
    if a == b {
        return Err(ApiError::bad_request("a and b must name different documents"));
    }
    let limit = parse_limit(params.limit, state.max_limit)?;
    let method = match params.method.as_deref() {
        None => state.corpus.proportion.method,
        Some(raw) => ProportionMethod::parse(raw).ok_or_else(|| {
            ApiError::bad_request(format!("unknown method {raw:?}, expected yates or fisher"))
        })?,
    };
    let adjustment = match params.adjust.as_deref() {
        None => state.corpus.adjustment,
        Some("none") => None,
        Some(raw) => Some(Adjustment::parse(raw).ok_or_else(|| {
            ApiError::bad_request(format!(
                "unknown adjustment {raw:?}, expected bonferroni, bh or none"
            ))
        })?),
    };
    for id in [&a, &b] {
        if state.corpus.table.document(id).is_none() {
            return Err(ApiError::NotFound(format!("unknown document {id}")));
        }
    }

    // Monte Carlo homogeneity and Fisher tests can take a while on big corpora.
    let corpus = Arc::clone(&state.corpus);
    let response = tokio::task::spawn_blocking(move || {
        run_comparison(&corpus, &a, &b, method, adjustment, limit)
    })
    .await
    .map_err(|err| {
        error!("comparison task failed: {err}");
        ApiError::Internal
    })?;
    Ok(Json(response))
}

fn run_comparison(
    corpus: &ServedCorpus,
    a: &str,
    b: &str,
    method: ProportionMethod,
    adjustment: Option<Adjustment>,
    limit: usize,
) -> CompareResponse {
    let subject = format!("{a} vs {b}");
    let mut skipped = Vec::new();
    let mut skip = |kind: TestKind, err: StatsError| {
        skipped.push(SkippedView::from(&Skipped::test(
            kind,
            subject.as_str(),
            err.skip_reason(),
        )));
    };

    let homogeneity = match corpus_homogeneity(&corpus.table, &[a, b], &corpus.homogeneity) {
        Ok(result) => Some(HomogeneityView::from(&HomogeneityOutcome {
            documents: vec![a.into(), b.into()],
            result,
        })),
        Err(err) => {
            skip(TestKind::Homogeneity, err);
            None
        }
    };

    let options = ComparisonOptions {
        method,
        ..corpus.proportion
    };
    let comparison = match compare_words(&corpus.table, a, b, &options) {
        Ok(report) => Some(PairView::new(&report, Some(limit), adjustment)),
        Err(err) => {
            skip(TestKind::WordProportion, err);
            None
        }
    };

    CompareResponse {
        homogeneity,
        comparison,
        skipped,
    }
}

async fn interval(
    State(state): State<AppState>,
    Query(params): Query<IntervalQuery>,
) -> Result<Json<IntervalResponse>, ApiError> {
    let word = required(params.word, "word")?.to_lowercase();
    let document = required(params.document, "document")?;
    let level = params.level.unwrap_or(state.corpus.level);
    if !(level > 0.0 && level < 1.0) {
        return Err(ApiError::bad_request("level must lie strictly between 0 and 1"));
    }
    let table = &state.corpus.table;
    let column = table
        .document(&document)
        .ok_or_else(|| ApiError::NotFound(format!("unknown document {document}")))?;

    let count = table.count(&word, &document);
    let response = match confidence_interval(count, column.total_tokens, level) {
        Ok(interval) => IntervalResponse {
            interval: Some(IntervalView::from(&WordInterval {
                word,
                document: column.id.clone(),
                count,
                total: column.total_tokens,
                interval,
            })),
            skipped: Vec::new(),
        },
        Err(_) if column.total_tokens == 0 => IntervalResponse {
            interval: None,
            skipped: vec![SkippedView::from(&Skipped::test(
                TestKind::ConfidenceInterval,
                format!("{word} in {document}"),
                corpus_types::SkipReason::EmptyDocument,
            ))],
        },
        Err(err) => IntervalResponse {
            interval: None,
            skipped: vec![SkippedView::from(&Skipped::test(
                TestKind::ConfidenceInterval,
                format!("{word} in {document}"),
                err.skip_reason(),
            ))],
        },
    };
    Ok(Json(response))
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))
}

fn parse_limit(limit: Option<usize>, max_limit: usize) -> Result<usize, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err(ApiError::bad_request("limit must be >= 1"));
    }
    Ok(limit.min(max_limit))
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                let body = Json(ErrorResponse { error: msg });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            ApiError::NotFound(msg) => {
                let body = Json(ErrorResponse { error: msg });
                (StatusCode::NOT_FOUND, body).into_response()
            }
            ApiError::Internal => {
                let body = Json(json!({ "error": "internal server error" }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}
