//! In-process search engine.
//!
//! Executes the subset of the Elasticsearch query DSL the adapter emits
//! (`match_all`, `ids`, `term`, `exists`, `bool`, cosine `script_score`)
//! against documents held in memory. Useful for testing and small datasets.

use super::query::{EMBEDDINGS_FIELD, MAX_RESULT_WINDOW};
use super::{cosine_similarity, BulkOperation, SearchEngine};
use crate::error::{RaglineError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{OnceLock, RwLock};

/// Hits returned when a search body has no `size`.
const DEFAULT_SIZE: usize = 10;

#[derive(Debug, Default)]
struct MemoryIndex {
    dims: Option<usize>,
    /// Documents visible to searches.
    visible: BTreeMap<String, Value>,
    /// Documents written since the last refresh.
    pending: BTreeMap<String, Value>,
}

/// In-memory search engine.
#[derive(Default)]
pub struct MemoryEngine {
    indices: RwLock<HashMap<String, MemoryIndex>>,
    closed: AtomicBool,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the indices currently present, sorted.
    pub fn index_names(&self) -> Result<Vec<String>> {
        let indices = self.read()?;
        let mut names: Vec<String> = indices.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(RaglineError::SourceUnavailable(
                "search engine connection is closed".to_string(),
            ));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, MemoryIndex>>> {
        self.indices
            .read()
            .map_err(|e| RaglineError::unavailable("failed to acquire lock", e))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryIndex>>> {
        self.indices
            .write()
            .map_err(|e| RaglineError::unavailable("failed to acquire lock", e))
    }

    fn missing(index: &str) -> RaglineError {
        RaglineError::NotFound(format!("no such index [{}]", index))
    }
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.read()?.contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        self.ensure_open()?;
        let mut indices = self.write()?;
        if indices.contains_key(index) {
            return Ok(());
        }

        let dims = body
            .pointer(&format!("/mappings/properties/{}/dims", EMBEDDINGS_FIELD))
            .and_then(Value::as_u64)
            .map(|d| d as usize);

        indices.insert(
            index.to_string(),
            MemoryIndex {
                dims,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.ensure_open()?;
        self.write()?
            .remove(index)
            .map(|_| ())
            .ok_or_else(|| Self::missing(index))
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<Value> {
        self.ensure_open()?;
        let mut indices = self.write()?;
        let mut items = Vec::with_capacity(operations.len());
        let mut errors = false;

        for op in operations {
            // writes to unknown indices create them with dynamic mapping
            let target = indices.entry(op.index.clone()).or_default();

            let stored_len = op
                .source
                .get(EMBEDDINGS_FIELD)
                .and_then(Value::as_array)
                .map(Vec::len);

            let rejected = match (target.dims, stored_len) {
                (Some(dims), Some(len)) if dims != len => Some(format!(
                    "The [dims] property must be {}, got {}",
                    dims, len
                )),
                _ => None,
            };

            let item = match rejected {
                Some(reason) => {
                    errors = true;
                    json!({"index": {
                        "_index": op.index,
                        "_id": op.id,
                        "status": 400,
                        "error": {"type": "document_parsing_exception", "reason": reason}
                    }})
                }
                None => {
                    let existed = target.pending.contains_key(&op.id)
                        || target.visible.contains_key(&op.id);
                    let (status, result) = if existed { (200, "updated") } else { (201, "created") };
                    target.pending.insert(op.id.clone(), op.source.clone());
                    json!({"index": {
                        "_index": op.index,
                        "_id": op.id,
                        "status": status,
                        "result": result
                    }})
                }
            };
            items.push(item);
        }

        Ok(json!({ "took": 0, "errors": errors, "items": items }))
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.ensure_open()?;
        let mut indices = self.write()?;
        let target = indices.get_mut(index).ok_or_else(|| Self::missing(index))?;
        let pending = std::mem::take(&mut target.pending);
        target.visible.extend(pending);
        Ok(())
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Value> {
        self.ensure_open()?;
        let indices = self.read()?;
        let target = indices.get(index).ok_or_else(|| Self::missing(index))?;

        let query = body.get("query").cloned().unwrap_or_else(|| json!({"match_all": {}}));
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(DEFAULT_SIZE);
        if size > MAX_RESULT_WINDOW {
            return Err(RaglineError::SourceUnavailable(format!(
                "Result window is too large, size must be less than or equal to: [{}] but was [{}]",
                MAX_RESULT_WINDOW, size
            )));
        }

        let mut scored = Vec::new();
        for (id, source) in &target.visible {
            if let Some(score) = score_document(&query, id, source)? {
                scored.push((id, source, score));
            }
        }

        // stable sort keeps id order for equal scores
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));
        let total = scored.len();

        let hits: Vec<Value> = scored
            .into_iter()
            .take(size)
            .map(|(id, source, score)| {
                let mut hit = Map::new();
                hit.insert("_index".to_string(), json!(index));
                hit.insert("_id".to_string(), json!(id));
                hit.insert("_score".to_string(), json!(score));
                if let Some(filtered) = filter_source(source, body.get("_source")) {
                    hit.insert("_source".to_string(), filtered);
                }
                Value::Object(hit)
            })
            .collect();

        Ok(json!({
            "hits": {
                "total": {"value": total, "relation": "eq"},
                "hits": hits
            }
        }))
    }

    async fn count(&self, index: &str, body: &Value) -> Result<u64> {
        self.ensure_open()?;
        let indices = self.read()?;
        let target = indices.get(index).ok_or_else(|| Self::missing(index))?;

        let query = body.get("query").cloned().unwrap_or_else(|| json!({"match_all": {}}));
        let mut count = 0;
        for (id, source) in &target.visible {
            if matches_query(&query, id, source)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }
}

fn unsupported(what: impl std::fmt::Display) -> RaglineError {
    RaglineError::Validation(format!("unsupported query clause: {}", what))
}

/// Score of a document under a query, or None when it does not match.
fn score_document(query: &Value, id: &str, source: &Value) -> Result<Option<f64>> {
    if let Some(script_score) = query.get("script_score") {
        let inner = script_score
            .get("query")
            .ok_or_else(|| unsupported("script_score without query"))?;
        if !matches_query(inner, id, source)? {
            return Ok(None);
        }
        let script = script_score
            .get("script")
            .ok_or_else(|| unsupported("script_score without script"))?;
        return evaluate_cosine_script(script, source).map(Some);
    }

    Ok(matches_query(query, id, source)?.then_some(1.0))
}

fn cosine_script_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*cosineSimilarity\(\s*params\.(\w+)\s*,\s*'(\w+)'\s*\)\s*(?:\+\s*([0-9]+(?:\.[0-9]+)?))?\s*$",
        )
        .expect("cosine script pattern is valid")
    })
}

fn evaluate_cosine_script(script: &Value, source: &Value) -> Result<f64> {
    let text = script
        .get("source")
        .and_then(Value::as_str)
        .ok_or_else(|| unsupported("script without source"))?;
    let caps = cosine_script_pattern()
        .captures(text)
        .ok_or_else(|| unsupported(text))?;

    let param = &caps[1];
    let field = &caps[2];
    let offset: f64 = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0);

    let query_vector = as_vector(script.pointer(&format!("/params/{}", param)));
    let stored = as_vector(source.get(field));
    if query_vector.is_empty() || stored.is_empty() {
        return Err(RaglineError::Validation(format!(
            "cosineSimilarity requires vectors in params.{} and field [{}]",
            param, field
        )));
    }

    Ok(cosine_similarity(&query_vector, &stored) as f64 + offset)
}

fn as_vector(value: Option<&Value>) -> Vec<f32> {
    value
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_f64).map(|f| f as f32).collect())
        .unwrap_or_default()
}

/// Whether a document satisfies a (non-scoring) query clause.
fn matches_query(query: &Value, id: &str, source: &Value) -> Result<bool> {
    let (name, body) = query
        .as_object()
        .and_then(|o| o.iter().next())
        .ok_or_else(|| unsupported(query))?;

    match (name.as_str(), body) {
        ("match_all", _) => Ok(true),
        ("ids", body) => {
            let values = body
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| unsupported("ids without values"))?;
            Ok(values.iter().any(|v| v.as_str() == Some(id)))
        }
        ("term", body) => {
            let (field, expected) = body
                .as_object()
                .and_then(|o| o.iter().next())
                .ok_or_else(|| unsupported("empty term"))?;
            // long form: {"term": {"field": {"value": x}}}
            let expected = expected.get("value").unwrap_or(expected);
            Ok(lookup_field(source, field) == Some(expected))
        }
        ("exists", body) => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| unsupported("exists without field"))?;
            Ok(lookup_field(source, field).is_some_and(|v| !v.is_null()))
        }
        ("bool", body) => {
            for key in ["must", "filter"] {
                for sub in clauses(body.get(key)) {
                    if !matches_query(sub, id, source)? {
                        return Ok(false);
                    }
                }
            }
            for sub in clauses(body.get("must_not")) {
                if matches_query(sub, id, source)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (other, _) => Err(unsupported(other)),
    }
}

/// A bool occurrence may hold one clause or an array of clauses.
fn clauses(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
        None => Vec::new(),
    }
}

/// Resolve a dotted field path such as `metadata.app_id`.
fn lookup_field<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(source, |node, key| node.get(key))
}

fn filter_source(source: &Value, spec: Option<&Value>) -> Option<Value> {
    match spec {
        None | Some(Value::Bool(true)) => Some(source.clone()),
        Some(Value::Bool(false)) => None,
        Some(Value::String(field)) => Some(pick_fields(source, &[field.as_str()])),
        Some(Value::Array(fields)) => {
            let names: Vec<&str> = fields.iter().filter_map(Value::as_str).collect();
            Some(pick_fields(source, &names))
        }
        Some(_) => Some(source.clone()),
    }
}

fn pick_fields(source: &Value, fields: &[&str]) -> Value {
    let mut out = Map::new();
    for field in fields {
        if let Some(v) = source.get(*field) {
            out.insert((*field).to_string(), v.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectordb::query::{index_mapping, similarity_query};
    use crate::vectordb::WhereFilter;

    fn doc(index: &str, id: &str, text: &str, app: Option<&str>, emb: Vec<f32>) -> BulkOperation {
        let mut metadata = Map::new();
        if let Some(app) = app {
            metadata.insert("app_id".to_string(), json!(app));
        }
        BulkOperation {
            index: index.to_string(),
            id: id.to_string(),
            source: json!({"text": text, "metadata": metadata, "embeddings": emb}),
        }
    }

    #[tokio::test]
    async fn test_writes_hidden_until_refresh() {
        let engine = MemoryEngine::new();
        engine.create_index("c_2", &json!({})).await.unwrap();
        engine
            .bulk(&[doc("c_2", "a", "hello", None, vec![1.0, 0.0])])
            .await
            .unwrap();

        let all = json!({"query": {"match_all": {}}});
        assert_eq!(engine.count("c_2", &all).await.unwrap(), 0);

        engine.refresh("c_2").await.unwrap();
        assert_eq!(engine.count("c_2", &all).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bulk_rejects_wrong_dims() {
        let engine = MemoryEngine::new();
        engine
            .create_index("c_2", &index_mapping(2))
            .await
            .unwrap();

        let response = engine
            .bulk(&[
                doc("c_2", "a", "ok", None, vec![1.0, 0.0]),
                doc("c_2", "b", "bad", None, vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        assert_eq!(response["errors"], true);
        assert_eq!(response["items"][0]["index"]["result"], "created");
        assert_eq!(response["items"][1]["index"]["status"], 400);
    }

    #[tokio::test]
    async fn test_script_score_orders_hits() {
        let engine = MemoryEngine::new();
        engine.create_index("c_2", &json!({})).await.unwrap();
        engine
            .bulk(&[
                doc("c_2", "far", "far", None, vec![0.0, 1.0]),
                doc("c_2", "near", "near", None, vec![1.0, 0.1]),
                doc("c_2", "opposite", "opposite", None, vec![-1.0, 0.0]),
            ])
            .await
            .unwrap();
        engine.refresh("c_2").await.unwrap();

        let body = similarity_query(&[1.0, 0.0], &WhereFilter::none(), 2, &["text"]);
        let response = engine.search("c_2", &body).await.unwrap();
        let hits = response["hits"]["hits"].as_array().unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0]["_id"], "near");
        assert_eq!(hits[1]["_id"], "far");
        assert!(hits[0]["_score"].as_f64().unwrap() > 1.9);
        assert_eq!(hits[0]["_source"], json!({"text": "near"}));
    }

    #[tokio::test]
    async fn test_term_on_nested_metadata() {
        let engine = MemoryEngine::new();
        engine
            .bulk(&[
                doc("c_1", "a", "one", Some("X"), vec![1.0]),
                doc("c_1", "b", "two", Some("Y"), vec![1.0]),
            ])
            .await
            .unwrap();
        engine.refresh("c_1").await.unwrap();

        let body = json!({"query": {"bool": {"must": [{"term": {"metadata.app_id": "Y"}}]}}});
        assert_eq!(engine.count("c_1", &body).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_index_and_close() {
        let engine = MemoryEngine::new();
        let err = engine.search("nope", &json!({})).await.unwrap_err();
        assert!(matches!(err, RaglineError::NotFound(_)));

        engine.close().await.unwrap();
        assert!(engine.is_closed());
        let err = engine.index_exists("nope").await.unwrap_err();
        assert!(matches!(err, RaglineError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_search_rejects_oversized_window() {
        let engine = MemoryEngine::new();
        engine.create_index("c_1", &index_mapping(1)).await.unwrap();

        let body = json!({"query": {"match_all": {}}, "size": MAX_RESULT_WINDOW});
        assert!(engine.search("c_1", &body).await.is_ok());

        let body = json!({"query": {"match_all": {}}, "size": MAX_RESULT_WINDOW + 1});
        let err = engine.search("c_1", &body).await.unwrap_err();
        assert!(matches!(err, RaglineError::SourceUnavailable(_)));
    }

    #[test]
    fn test_unsupported_script_rejected() {
        let script = json!({"source": "doc['x'].value * 2", "params": {}});
        let err = evaluate_cosine_script(&script, &json!({})).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }
}
