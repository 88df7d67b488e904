//! Exhaustive search with local pagination
//!
//! The downstream search primitive has no stable ordering or cursor, so it is
//! always asked for the complete matching set. Offset and limit are applied
//! here, after parsing, and `total_results` counts the full parsed set.

use crate::dispatcher::CommandDispatcher;
use hostbridge_logging::{get_metrics, get_sanitizer};
use hostbridge_protocol::{
    BridgeError, BridgeResult, PaginatedSearchResponse, SearchParams, SearchRequest,
    SearchResultRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

/// Which downstream operation backs exhaustive search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub operation: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            operation: "search_functions".to_string(),
        }
    }
}

/// Validate, fetch everything, parse, then slice
///
/// Only `{"query": ...}` is forwarded; limit and offset never leave this
/// function.
#[instrument(skip(dispatcher, request), fields(query = %request.query))]
pub async fn search_functions(
    dispatcher: &CommandDispatcher,
    config: &SearchConfig,
    request: SearchRequest,
) -> BridgeResult<PaginatedSearchResponse> {
    let params = request.validate_params()?;

    let raw = dispatcher
        .dispatch(&config.operation, json!({ "query": params.query }))
        .await?;
    let lines = result_lines(&config.operation, raw)?;

    let response = paginate(&params, &lines);
    get_metrics().record_search(response.dropped_lines);
    if response.dropped_lines > 0 {
        warn!(
            "Dropped {} unparseable line(s) out of {} for query '{}'",
            response.dropped_lines,
            lines.len(),
            params.query
        );
    }

    Ok(response)
}

/// Parse every line and cut the `[offset, offset + limit)` page
pub fn paginate<S: AsRef<str>>(params: &SearchParams, lines: &[S]) -> PaginatedSearchResponse {
    let mut records = Vec::with_capacity(lines.len());
    let mut dropped_lines = 0;

    for line in lines {
        let line = line.as_ref();
        match SearchResultRecord::parse_line(line) {
            Some(record) => records.push(record),
            None => {
                dropped_lines += 1;
                debug!("Unparseable search line: {}", get_sanitizer().sanitize(line));
            }
        }
    }

    let total_results = records.len();
    let items = records
        .into_iter()
        .skip(params.offset)
        .take(params.limit)
        .collect();

    PaginatedSearchResponse {
        query: params.query.clone(),
        total_results,
        page: params.page(),
        limit: params.limit,
        items,
        dropped_lines,
    }
}

/// Normalize the downstream result into lines
///
/// Accepts a newline-separated string or an array of strings. Non-string
/// array elements are kept as their JSON text so they count as dropped lines.
fn result_lines(operation: &str, raw: Value) -> BridgeResult<Vec<String>> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => Ok(text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect()),
        Value::Array(values) => Ok(values
            .into_iter()
            .map(|value| match value {
                Value::String(line) => line,
                other => other.to_string(),
            })
            .collect()),
        other => Err(BridgeError::downstream(
            operation,
            format!("expected a list of lines, got {}", value_kind(&other)),
        )),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
