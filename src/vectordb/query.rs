//! Request bodies and response parsing for the Elasticsearch adapter.

use super::{QueryHit, WhereFilter, APP_ID_KEY};
use crate::document::Metadata;
use crate::error::{BulkFailure, RaglineError, Result};
use serde::Deserialize;
use serde_json::{json, Value};

/// Field holding the stored text.
pub const TEXT_FIELD: &str = "text";
/// Field holding the stored metadata object.
pub const METADATA_FIELD: &str = "metadata";
/// Field holding the dense vector.
pub const EMBEDDINGS_FIELD: &str = "embeddings";
/// Largest `from + size` a search may request (`index.max_result_window`).
pub const MAX_RESULT_WINDOW: usize = 10_000;
/// Script parameter carrying the query vector.
pub const QUERY_VECTOR_PARAM: &str = "input_query_vector";

/// Similarity script; the +1.0 keeps scores non-negative.
pub const COSINE_SCRIPT: &str = "cosineSimilarity(params.input_query_vector, 'embeddings') + 1.0";

/// Index body declaring the text field and an unindexed dense vector.
pub fn index_mapping(vector_dimension: usize) -> Value {
    json!({
        "mappings": {
            "properties": {
                TEXT_FIELD: { "type": "text" },
                EMBEDDINGS_FIELD: {
                    "type": "dense_vector",
                    "index": false,
                    "dims": vector_dimension
                }
            }
        }
    })
}

fn app_id_term(app_id: &str) -> Value {
    json!({ "term": { format!("{}.{}", METADATA_FIELD, APP_ID_KEY): app_id } })
}

/// Search body returning the ids among `ids` that exist (and match the filter).
///
/// Callers keep `ids` within `MAX_RESULT_WINDOW`.
pub fn exists_query(ids: &[String], filter: &WhereFilter) -> Value {
    let mut must = vec![json!({ "ids": { "values": ids } })];
    if let Some(app_id) = &filter.app_id {
        must.push(app_id_term(app_id));
    }

    json!({
        "query": { "bool": { "must": must } },
        "_source": false,
        "size": ids.len()
    })
}

/// Script-score search body ranking documents by cosine similarity.
///
/// Without a filter every document carrying a text field is scored; with an
/// app id the match clause is replaced by the app id term.
pub fn similarity_query(
    query_vector: &[f32],
    filter: &WhereFilter,
    n_results: usize,
    source_fields: &[&str],
) -> Value {
    let must = match &filter.app_id {
        Some(app_id) => vec![app_id_term(app_id)],
        None => vec![json!({ "exists": { "field": TEXT_FIELD } })],
    };

    json!({
        "query": {
            "script_score": {
                "query": { "bool": { "must": must } },
                "script": {
                    "source": COSINE_SCRIPT,
                    "params": { QUERY_VECTOR_PARAM: query_vector }
                }
            }
        },
        "_source": source_fields,
        "size": n_results
    })
}

/// Count body matching every document.
pub fn count_all_query() -> Value {
    json!({ "query": { "match_all": {} } })
}

/// Body of one indexed document.
pub fn document_source(text: &str, metadata: &Metadata, embedding: &[f32]) -> Value {
    json!({
        TEXT_FIELD: text,
        METADATA_FIELD: metadata,
        EMBEDDINGS_FIELD: embedding
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: Option<Value>,
}

fn parse_raw_hits(response: Value) -> Result<Vec<RawHit>> {
    let parsed: SearchResponse = serde_json::from_value(response)
        .map_err(|e| RaglineError::unavailable("malformed search response", e))?;
    Ok(parsed.hits.hits)
}

/// Ids of all hits in a search response.
pub fn parse_hit_ids(response: Value) -> Result<Vec<String>> {
    Ok(parse_raw_hits(response)?.into_iter().map(|h| h.id).collect())
}

/// Hits with their text, metadata and score, in response order.
pub fn parse_query_hits(response: Value) -> Result<Vec<QueryHit>> {
    let hits = parse_raw_hits(response)?
        .into_iter()
        .filter_map(|hit| {
            let source = hit.source?;
            let text = source.get(TEXT_FIELD)?.as_str()?.to_string();
            let metadata = source
                .get(METADATA_FIELD)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            Some(QueryHit {
                id: hit.id,
                text,
                metadata,
                score: hit.score.unwrap_or(0.0) as f32,
            })
        })
        .collect();
    Ok(hits)
}

/// Per-item failures reported in a bulk response.
pub fn parse_bulk_failures(response: &Value) -> Vec<BulkFailure> {
    if !response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return Vec::new();
    }

    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        // each item is keyed by its action: {"index": {...}}
        .filter_map(|item| item.as_object()?.values().next())
        .filter_map(|result| {
            let error = result.get("error")?;
            let id = result
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let reason = error
                .get("reason")
                .or_else(|| error.get("type"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            Some(BulkFailure { id, reason })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_mapping_shape() {
        let body = index_mapping(384);
        let embeddings = &body["mappings"]["properties"]["embeddings"];
        assert_eq!(embeddings["type"], "dense_vector");
        assert_eq!(embeddings["index"], false);
        assert_eq!(embeddings["dims"], 384);
        assert_eq!(body["mappings"]["properties"]["text"]["type"], "text");
    }

    #[test]
    fn test_exists_query_without_filter() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let body = exists_query(&ids, &WhereFilter::none());

        let must = body["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 1);
        assert_eq!(must[0], json!({"ids": {"values": ["a", "b"]}}));
        assert_eq!(body["_source"], false);
        assert_eq!(body["size"], 2);
    }

    #[test]
    fn test_exists_query_appends_app_filter() {
        let ids = vec!["a".to_string()];
        let body = exists_query(&ids, &WhereFilter::app("X"));

        let must = body["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert_eq!(must[1], json!({"term": {"metadata.app_id": "X"}}));
    }

    #[test]
    fn test_similarity_query_default_clause() {
        let body = similarity_query(&[0.5, 0.5], &WhereFilter::none(), 3, &["text"]);
        let script_score = &body["query"]["script_score"];

        assert_eq!(
            script_score["query"]["bool"]["must"],
            json!([{"exists": {"field": "text"}}])
        );
        assert_eq!(script_score["script"]["source"], COSINE_SCRIPT);
        assert_eq!(
            script_score["script"]["params"]["input_query_vector"],
            json!([0.5, 0.5])
        );
        assert_eq!(body["_source"], json!(["text"]));
        assert_eq!(body["size"], 3);
    }

    #[test]
    fn test_similarity_query_filter_replaces_clause() {
        let body = similarity_query(&[1.0], &WhereFilter::app("X"), 1, &["text"]);
        assert_eq!(
            body["query"]["script_score"]["query"]["bool"]["must"],
            json!([{"term": {"metadata.app_id": "X"}}])
        );
    }

    #[test]
    fn test_parse_query_hits() {
        let response = json!({
            "hits": {
                "total": {"value": 2, "relation": "eq"},
                "hits": [
                    {"_id": "a", "_score": 1.9, "_source": {"text": "first", "metadata": {"app_id": "X"}}},
                    {"_id": "b", "_score": 1.2, "_source": {"text": "second"}},
                    {"_id": "c", "_score": 1.0}
                ]
            }
        });

        let hits = parse_query_hits(response).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "first");
        assert_eq!(hits[0].metadata["app_id"], "X");
        assert!((hits[0].score - 1.9).abs() < 1e-6);
        assert!(hits[1].metadata.is_empty());
    }

    #[test]
    fn test_parse_hit_ids_and_malformed() {
        let response = json!({"hits": {"hits": [{"_id": "a"}, {"_id": "b"}]}});
        assert_eq!(parse_hit_ids(response).unwrap(), vec!["a", "b"]);

        let err = parse_hit_ids(json!({"error": "boom"})).unwrap_err();
        assert!(matches!(err, RaglineError::SourceUnavailable(_)));
    }

    #[test]
    fn test_parse_bulk_failures() {
        let ok = json!({"errors": false, "items": [{"index": {"_id": "a", "status": 201}}]});
        assert!(parse_bulk_failures(&ok).is_empty());

        let partial = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "a", "status": 201, "result": "created"}},
                {"index": {"_id": "b", "status": 400, "error": {
                    "type": "document_parsing_exception",
                    "reason": "The [dims] property must be 3"
                }}},
                {"index": {"_id": "c", "status": 429, "error": {"type": "es_rejected_execution_exception"}}}
            ]
        });

        let failures = parse_bulk_failures(&partial);
        assert_eq!(
            failures,
            vec![
                BulkFailure {
                    id: "b".to_string(),
                    reason: "The [dims] property must be 3".to_string()
                },
                BulkFailure {
                    id: "c".to_string(),
                    reason: "es_rejected_execution_exception".to_string()
                },
            ]
        );
    }
}
