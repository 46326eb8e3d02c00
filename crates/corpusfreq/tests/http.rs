use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::util::ServiceExt;

use corpusfreq::{AnalysisConfig, AppState, ServedCorpus, load_corpus, router};

fn make_state() -> AppState {
    let tempdir = tempfile::tempdir().unwrap();
    std::fs::write(tempdir.path().join("a.txt"), "The cat sat. The cat ran.").unwrap();
    std::fs::write(tempdir.path().join("b.txt"), "The dog ran.").unwrap();
    std::fs::write(tempdir.path().join("empty.txt"), "").unwrap();
    let config = AnalysisConfig::new(tempdir.path());
    let corpus = load_corpus(&config).unwrap();
    AppState {
        corpus: Arc::new(ServedCorpus::new(corpus, &config)),
        max_limit: 500,
    }
}

async fn get(uri: &str) -> (StatusCode, serde_json::Value) {
    let app = router(make_state());
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body_bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let body = serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn error_text(body: &serde_json::Value) -> String {
    body["error"]
        .as_str()
        .unwrap_or_default()
        .to_lowercase()
}

#[tokio::test]
async fn healthz_ok() {
    let app = router(make_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn documents_lists_columns_with_stats() {
    let (status, body) = get("/v1/documents").await;
    assert_eq!(status, StatusCode::OK);
    let docs = body["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 3);
    assert_eq!(docs[0]["id"], "a");
    assert_eq!(docs[0]["total_tokens"], 6);
    assert_eq!(docs[0]["distinct_words"], 4);
    assert_eq!(docs[2]["id"], "empty");
    assert_eq!(docs[2]["total_tokens"], 0);
    assert!(body["skipped"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn words_are_ranked_and_paged() {
    let (status, body) = get("/v1/words?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 5);
    assert_eq!(body["has_more"], true);
    assert_eq!(body["documents"], serde_json::json!(["a", "b", "empty"]));
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["word"], "the");
    assert_eq!(items[0]["counts"], serde_json::json!([2, 1, 0]));
    assert_eq!(items[1]["word"], "cat");

    let (_, body) = get("/v1/words?limit=10&offset=4").await;
    assert_eq!(body["has_more"], false);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn words_rejects_zero_limit() {
    let (status, body) = get("/v1/words?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_text(&body).contains("limit"));
}

#[tokio::test]
async fn compare_returns_ranked_words() {
    let (status, body) = get("/v1/compare?a=a&b=b&limit=3&method=fisher").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["homogeneity"]["p_value"].as_f64().unwrap() <= 1.0);
    let comparison = &body["comparison"];
    assert_eq!(comparison["document_a"], "a");
    assert_eq!(comparison["tests_run"], 5);
    assert_eq!(comparison["comparisons"].as_array().unwrap().len(), 3);
    assert!(body["skipped"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn compare_with_empty_document_reports_skips() {
    let (status, body) = get("/v1/compare?a=a&b=empty").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("comparison").is_none());
    let skipped = body["skipped"].as_array().unwrap();
    assert_eq!(skipped.len(), 2);
    assert!(skipped.iter().all(|s| s["subject"] == "a vs empty"));
}

#[tokio::test]
async fn compare_rejects_bad_params() {
    let (status, body) = get("/v1/compare?a=a").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_text(&body).contains("required"));

    let (status, body) = get("/v1/compare?a=a&b=b&method=ttest").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_text(&body).contains("method"));

    let (status, body) = get("/v1/compare?a=a&b=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(error_text(&body).contains("unknown document"));
}

#[tokio::test]
async fn compare_adjusts_only_when_asked() {
    let (_, body) = get("/v1/compare?a=a&b=b").await;
    assert!(body["comparison"].get("adjustment").is_none());
    assert!(body["comparison"]["comparisons"][0].get("p_adjusted").is_none());

    let (status, body) = get("/v1/compare?a=a&b=b&adjust=bonferroni").await;
    assert_eq!(status, StatusCode::OK);
    let comparison = &body["comparison"];
    assert_eq!(comparison["adjustment"], "bonferroni");
    let first = &comparison["comparisons"][0];
    let raw = first["p_value"].as_f64().unwrap();
    let adjusted = first["p_adjusted"].as_f64().unwrap();
    assert_eq!(adjusted, (raw * 5.0).min(1.0));

    let (status, body) = get("/v1/compare?a=a&b=b&adjust=holm").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_text(&body).contains("adjustment"));
}

#[tokio::test]
async fn compare_rejects_self_comparison() {
    let (status, body) = get("/v1/compare?a=a&b=a").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_text(&body).contains("different documents"));
}

#[tokio::test]
async fn interval_for_word_in_document() {
    let (status, body) = get("/v1/interval?word=Cat&document=a&level=0.9").await;
    assert_eq!(status, StatusCode::OK);
    let interval = &body["interval"];
    assert_eq!(interval["count"], 2);
    assert_eq!(interval["total"], 6);
    assert_eq!(interval["level"], 0.9);
    let lower = interval["lower"].as_f64().unwrap();
    let upper = interval["upper"].as_f64().unwrap();
    assert!(lower < 2.0 / 6.0 && 2.0 / 6.0 < upper);
}

#[tokio::test]
async fn interval_on_empty_document_is_skipped() {
    let (status, body) = get("/v1/interval?word=cat&document=empty").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("interval").is_none());
    assert_eq!(body["skipped"][0]["reason"], "document has no tokens");
}

#[tokio::test]
async fn interval_rejects_bad_level() {
    let (status, body) = get("/v1/interval?word=cat&document=a&level=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_text(&body).contains("level"));
}
