//! Relaxed parsing for non-standard upstream error bodies.
//!
//! Backends speak several incompatible error shapes for the same class of
//! failure (a clean `{error: {message}}` envelope, a FastAPI-style `detail`
//! array, or a bare `detail` string). This type accepts all three so that a
//! client-visible error message can be recovered instead of falling back to
//! the raw body text.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProviderErrorBody {
    #[allow(dead_code)]
    Standard { error: StandardErrorDetail },
    FastApi { detail: Vec<FastApiErrorDetail> },
    Simple { detail: String },
}

#[derive(Debug, Deserialize)]
pub struct StandardErrorDetail {
    pub message: String,
    #[allow(dead_code)]
    pub r#type: Option<String>,
    #[allow(dead_code)]
    pub code: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct FastApiErrorDetail {
    pub msg: String,
    #[allow(dead_code)]
    pub r#type: Option<String>,
}
