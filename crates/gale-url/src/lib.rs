//! gale-url: Zero-dependency URL decomposition and query-string codec
//!
//! Single Source of Truth (SSOT) for how gale-core turns a full URL into
//! request components and how it renders a request's query map.
//!
//! ## Features
//! - `Url::parse` never fails: malformed input yields an all-absent `Url`
//! - Absent components are `None`, present-but-empty ones are `Some("")`
//! - Query maps render in a stable sorted order
//! - Zero external dependencies
//!
//! ## Limitations
//! The query codec does not percent-encode or percent-decode. Keys and
//! values are expected to already be in their wire form.
//!
//! ## Example
//! ```
//! use gale_url::{decode_query, encode_query_with_prefix, Url};
//!
//! let url = Url::parse("http://127.0.0.1:3001/search?page=2&q=gale");
//! let query = decode_query(url.query().unwrap_or(""));
//! assert_eq!(query["q"], "gale");
//!
//! let target = format!("{}{}", url.path().unwrap_or("/"), encode_query_with_prefix(&query));
//! assert_eq!(target, "/search?page=2&q=gale");
//! ```

mod query;
mod url;

pub use query::{decode_query, encode_query, encode_query_with_prefix};
pub use url::Url;
