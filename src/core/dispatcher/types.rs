//! Dispatch request and response types

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// How a successful response body should be decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseKind {
    /// JSON, falling back to text when the body does not parse
    #[default]
    Json,
    Text,
    Bytes,
}

/// Optional parts of a dispatch call
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HashMap<String, String>,
    pub response_kind: ResponseKind,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn response_kind(mut self, kind: ResponseKind) -> Self {
        self.response_kind = kind;
        self
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseData {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Successful dispatch result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResponse {
    pub data: ResponseData,
    /// Lowercase header names
    pub headers: HashMap<String, String>,
    pub status: u16,
}

impl DispatchResponse {
    pub(super) fn decode(
        status: u16,
        headers: HashMap<String, String>,
        body: &[u8],
        kind: ResponseKind,
    ) -> Self {
        let data = match kind {
            ResponseKind::Bytes => ResponseData::Bytes(body.to_vec()),
            ResponseKind::Text => ResponseData::Text(String::from_utf8_lossy(body).into_owned()),
            ResponseKind::Json if body.iter().all(u8::is_ascii_whitespace) => {
                ResponseData::Json(Value::Null)
            }
            ResponseKind::Json => match serde_json::from_slice(body) {
                Ok(value) => ResponseData::Json(value),
                Err(_) => ResponseData::Text(String::from_utf8_lossy(body).into_owned()),
            },
        };

        Self {
            data,
            headers,
            status,
        }
    }
}
