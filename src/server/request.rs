use http::Method;
use may_minihttp::Request;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::ids::RequestId;

/// Request body interpreted as JSON.
///
/// Parsing happens once, when the context is built. Handlers choose how
/// strict to be through [`RequestContext::json_body`] and the field helpers.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonBody {
    /// No body, or a body whose content type is not JSON
    Absent,
    /// Body parsed successfully
    Parsed(Value),
    /// Body claimed to be JSON but failed to parse
    Malformed(String),
}

impl JsonBody {
    /// Parse `raw` when `content_type` names JSON. A body without any content
    /// type is parsed too, matching what most API clients send.
    #[must_use]
    pub fn from_body(content_type: Option<&str>, raw: &[u8]) -> Self {
        if raw.is_empty() {
            return JsonBody::Absent;
        }
        let is_json = content_type.map_or(true, |ct| ct.to_ascii_lowercase().contains("json"));
        if !is_json {
            return JsonBody::Absent;
        }
        match serde_json::from_slice(raw) {
            Ok(value) => JsonBody::Parsed(value),
            Err(e) => JsonBody::Malformed(e.to_string()),
        }
    }
}

/// Immutable per-request snapshot shared by every task spawned for it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id, taken from `x-request-id` when valid
    pub request_id: RequestId,
    pub method: Method,
    /// Path without the query string
    pub path: String,
    pub query: HashMap<String, String>,
    /// Headers with lowercase names
    pub headers: HashMap<String, String>,
    pub raw_body: Vec<u8>,
    pub json: JsonBody,
}

impl RequestContext {
    /// Build a context from a method and a path that may carry a query string.
    #[must_use]
    pub fn new(method: Method, raw_path: &str) -> Self {
        let path = raw_path.split('?').next().unwrap_or("/").to_string();
        Self {
            request_id: RequestId::new(),
            method,
            path,
            query: parse_query_params(raw_path),
            headers: HashMap::new(),
            raw_body: Vec::new(),
            json: JsonBody::Absent,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self.json = JsonBody::from_body(self.header("content-type"), &self.raw_body);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.raw_body = body.into();
        self.json = JsonBody::from_body(self.header("content-type"), &self.raw_body);
        self
    }

    /// Header lookup, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// The parsed JSON body.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when the body is missing or malformed.
    pub fn json_body(&self) -> Result<&Value> {
        match &self.json {
            JsonBody::Parsed(value) => Ok(value),
            JsonBody::Absent => Err(Error::invalid("request body must be JSON")),
            JsonBody::Malformed(msg) => Err(Error::invalid(format!("malformed JSON body: {msg}"))),
        }
    }

    /// A required string field of a JSON object body.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when the body is not an object, the field is
    /// missing, or the field is not a string.
    pub fn json_str_field(&self, field: &str) -> Result<&str> {
        let body = self.json_body()?;
        let object = body
            .as_object()
            .ok_or_else(|| Error::invalid("request body must be a JSON object"))?;
        match object.get(field) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(Error::invalid(format!("field '{field}' must be a string"))),
            None => Err(Error::invalid(format!("missing field '{field}'"))),
        }
    }
}

/// Parse query string parameters from a URL path
///
/// Extracts everything after the `?` character and URL-decodes parameter names and values.
#[must_use]
pub fn parse_query_params(path: &str) -> HashMap<String, String> {
    if let Some(pos) = path.find('?') {
        let query_str = &path[pos + 1..];
        url::form_urlencoded::parse(query_str.as_bytes())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    } else {
        HashMap::new()
    }
}

/// Build a [`RequestContext`] from a `may_minihttp::Request`.
///
/// # Errors
///
/// [`Error::InvalidArgument`] for an unparseable method token, [`Error::Io`]
/// when the body cannot be read.
pub fn parse_request(req: Request) -> Result<RequestContext> {
    let method: Method = req
        .method()
        .parse()
        .map_err(|_| Error::invalid(format!("unsupported method '{}'", req.method())))?;
    let raw_path = req.path().to_string();

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    debug!(
        header_count = headers.len(),
        header_names = ?headers.keys().take(20).collect::<Vec<_>>(),
        "Headers extracted"
    );

    let mut raw_body = Vec::new();
    let size = req.body().read_to_end(&mut raw_body)?;

    let mut ctx = RequestContext::new(method, &raw_path);
    ctx.request_id = RequestId::from_header_or_new(headers.get("x-request-id").map(String::as_str));
    ctx.json = JsonBody::from_body(headers.get("content-type").map(String::as_str), &raw_body);
    ctx.headers = headers;
    ctx.raw_body = raw_body;

    if let JsonBody::Malformed(err) = &ctx.json {
        debug!(request_id = %ctx.request_id, error = %err, "JSON body parse failed");
    }

    info!(
        request_id = %ctx.request_id,
        method = %ctx.method,
        path = %ctx.path,
        body_size_bytes = size,
        "HTTP request parsed"
    );

    Ok(ctx)
}
