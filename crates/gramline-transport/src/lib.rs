//! # Gramline Transport
//!
//! The HTTP side of the Gramline bot API client.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Runtime / Context   │  (calls ApiClient::request)
//! ├──────────────────────┤
//! │  gramline-core       │  (ApiClient trait, Params, errors)
//! ├──────────────────────┤
//! │  gramline-transport  │  <- This crate
//! │   MultipartEncoder   │     JSON or multipart body
//! │   HttpTransport      │     POST + envelope decoding
//! ├──────────────────────┤
//! │  Network (HTTPS)     │
//! └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gramline_core::{ApiClient, Params};
//! use gramline_transport::{HttpTransport, HttpTransportConfig};
//!
//! let transport = HttpTransport::new(HttpTransportConfig::new(token))?;
//! let me = transport.request("getMe", Params::new()).await?;
//! ```

pub mod config;
pub mod http;
pub mod multipart;

pub use config::{DEFAULT_API_BASE, HttpTransportConfig, mask_token};
pub use http::{HttpTransport, decode_envelope};
pub use multipart::{EncodedBody, FilePart, MultipartBody, MultipartEncoder, needs_multipart};
