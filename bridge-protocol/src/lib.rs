//! Core wire types for the hostbridge HTTP bridge
//!
//! This crate holds everything that crosses the HTTP boundary between a
//! tool-calling client and the host application's scripting surface:
//! the error taxonomy, request/response models, and request validation.
//!
//! # Quick Start
//!
//! ```rust
//! use hostbridge_protocol::{SearchRequest, SearchResultRecord};
//!
//! let request = SearchRequest {
//!     query: "Reset".to_string(),
//!     limit: Some(5),
//!     offset: None,
//! };
//! let params = request.validate_params().unwrap();
//! assert_eq!(params.limit, 5);
//! assert_eq!(params.offset, 0);
//!
//! let record = SearchResultRecord::parse_line("ResetHandler @ 0x1000").unwrap();
//! assert_eq!(record.address, "0x1000");
//! ```

pub mod error;
pub mod model;
pub mod validation;


pub use error::{BridgeError, BridgeResult, ErrorCode, ErrorDetail, ErrorResponse};
pub use model::*;
pub use validation::{DEFAULT_LIMIT, DEFAULT_OFFSET, MAX_LIMIT, MIN_LIMIT, SearchParams};
