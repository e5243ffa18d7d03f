use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use ureq::http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{FetchError, Result};

/// Status, headers and body of a completed request.
#[derive(Clone, Debug, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    /// Adds a header, ignoring names or values that are not valid HTTP.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Sends a GET request and returns the raw response.
///
/// Non-2xx statuses are returned as responses, not errors; only failures to
/// get any response at all (DNS, connect, TLS, timeout) are errors.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, headers: &HeaderMap) -> Result<RawResponse>;
}

/// Serves canned responses keyed by exact URL.
///
/// Unknown URLs answer 404. Every request is recorded along with its headers.
#[derive(Default)]
pub struct MemoryTransport {
    responses: Mutex<HashMap<String, std::result::Result<RawResponse, FetchError>>>,
    requests: Mutex<Vec<(String, HeaderMap)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, response: RawResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), Ok(response));
    }

    pub fn insert_json(&self, url: impl Into<String>, json: &str) {
        self.insert(
            url,
            RawResponse::ok(json).with_header("content-type", "application/json"),
        );
    }

    pub fn insert_error(&self, url: impl Into<String>, error: FetchError) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), Err(error));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn last_headers(&self, url: &str) -> Option<HeaderMap> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(u, _)| u == url)
            .map(|(_, h)| h.clone())
    }
}

impl Transport for MemoryTransport {
    fn get(&self, url: &str, headers: &HeaderMap) -> Result<RawResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((url.to_string(), headers.clone()));

        match self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
        {
            Some(response) => response.clone(),
            None => Ok(RawResponse::new(404, Vec::new())),
        }
    }
}
