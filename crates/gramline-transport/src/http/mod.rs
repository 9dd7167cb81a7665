//! HTTP transport.
//!
//! [`HttpTransport`] issues one `POST {api_base}/bot{token}/{method}` per API
//! call and turns the response envelope into a result or an
//! [`ApiError`](gramline_core::ApiError).

mod client;
mod envelope;

pub use client::HttpTransport;
pub use envelope::decode_envelope;
