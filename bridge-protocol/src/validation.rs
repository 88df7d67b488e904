//! Validation of inbound search requests

use crate::{BridgeError, BridgeResult, SearchRequest};
use serde_json::Value;
use validator::{Validate, ValidationErrors};

/// Smallest accepted page size
pub const MIN_LIMIT: usize = 1;
/// Largest accepted page size
pub const MAX_LIMIT: usize = 1000;
/// Page size used when the request omits `limit`
pub const DEFAULT_LIMIT: usize = 100;
/// Offset used when the request omits `offset`
pub const DEFAULT_OFFSET: usize = 0;

/// Reported in this order when several fields are invalid at once.
const FIELD_ORDER: [&str; 3] = ["query", "limit", "offset"];

/// Search parameters after validation and defaulting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
}

impl SearchParams {
    /// One-based page number the offset falls into
    pub fn page(&self) -> usize {
        self.offset / self.limit + 1
    }
}

impl SearchRequest {
    /// Decode a search body, naming the offending field on a type mismatch
    ///
    /// # Errors
    ///
    /// `Validation` on `body` when the body is not an object, otherwise on
    /// the first field (in query, limit, offset order) with the wrong type.
    pub fn from_json_value(body: Value) -> BridgeResult<Self> {
        let Some(object) = body.as_object() else {
            return Err(BridgeError::validation(
                "body",
                "request body must be a JSON object",
            ));
        };

        if object.get("query").is_some_and(|query| !query.is_string()) {
            return Err(BridgeError::validation("query", "query must be a string"));
        }
        for field in ["limit", "offset"] {
            let mistyped = object
                .get(field)
                .is_some_and(|value| !value.is_null() && !value.is_i64());
            if mistyped {
                return Err(BridgeError::validation(
                    field,
                    format!("{field} must be an integer"),
                ));
            }
        }

        Ok(serde_json::from_value(body)?)
    }

    /// Validate the request and apply defaults
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] naming the first offending field.
    pub fn validate_params(&self) -> BridgeResult<SearchParams> {
        self.validate().map_err(first_field_error)?;

        let limit = match self.limit {
            Some(limit) => usize::try_from(limit)
                .map_err(|_| BridgeError::validation("limit", "limit is out of range"))?,
            None => DEFAULT_LIMIT,
        };
        let offset = match self.offset {
            Some(offset) => usize::try_from(offset)
                .map_err(|_| BridgeError::validation("offset", "offset is out of range"))?,
            None => DEFAULT_OFFSET,
        };

        Ok(SearchParams {
            query: self.query.clone(),
            limit,
            offset,
        })
    }
}

fn first_field_error(errors: ValidationErrors) -> BridgeError {
    let field_errors = errors.field_errors();

    for field in FIELD_ORDER {
        if let Some(list) = field_errors.get(field) {
            let message = list
                .iter()
                .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| format!("{field} is invalid"));
            return BridgeError::validation(field, message);
        }
    }

    BridgeError::validation("body", errors.to_string())
}
