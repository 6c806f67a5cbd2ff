//! HTTP Request types
//!
//! A [`Request`] is a plain value populated through chained setters (or the
//! consuming [`RequestBuilder`]) and read by the engine at send time. The
//! engine copies what it needs, so one descriptor can be sent any number of
//! times and mutated between sends.

use crate::{Error, Result};
use bytes::Bytes;
use gale_url::{decode_query, encode_query_with_prefix, Url};
use http::header::{HeaderName, HeaderValue, HOST};
use http_body_util::Full;
use std::collections::BTreeMap;
use std::fmt;

/// Protocol version written on the request line
pub const HTTP_VERSION: &str = "HTTP/1.1";

/// HTTP Methods
///
/// Only GET and POST are put on the wire. Parsing anything other than GET
/// yields POST, which is also the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    #[default]
    Post,
}

impl Method {
    /// Parse from string, falling back to POST
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("GET") {
            Method::Get
        } else {
            Method::Post
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }

    fn to_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Well-known port for a scheme
pub fn default_port(scheme: &str) -> Option<u16> {
    if scheme.eq_ignore_ascii_case("http") {
        Some(80)
    } else if scheme.eq_ignore_ascii_case("https") {
        Some(443)
    } else {
        None
    }
}

/// HTTP Request descriptor
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    scheme: String,
    host: String,
    port: u16,
    path: String,
    headers: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
    body: Bytes,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: Method::default(),
            scheme: String::new(),
            host: String::new(),
            port: 80,
            path: String::new(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: Bytes::new(),
        }
    }
}

impl Request {
    /// Create an empty POST request to port 80
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.method = method;
        self
    }

    /// Populate scheme, host, port, path and query from a full URL.
    ///
    /// Components missing from the URL leave the current values untouched,
    /// except the port, which falls back to the scheme's well-known port.
    /// A malformed URL changes nothing.
    pub fn set_url(&mut self, url: &str) -> &mut Self {
        let url = Url::parse(url);
        if let Some(scheme) = url.scheme() {
            self.scheme = scheme.to_string();
        }
        if let Some(host) = url.host() {
            self.host = host.to_string();
        }
        match url.port() {
            Some(port) => self.port = port,
            None => {
                if let Some(port) = url.scheme().and_then(default_port) {
                    self.port = port;
                }
            }
        }
        if let Some(path) = url.path() {
            self.path = path.to_string();
        }
        if let Some(query) = url.query() {
            self.query = decode_query(query);
        }
        self
    }

    pub fn set_scheme(&mut self, scheme: impl Into<String>) -> &mut Self {
        self.scheme = scheme.into();
        self
    }

    pub fn set_host(&mut self, host: impl Into<String>, port: u16) -> &mut Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.path = path.into();
        self
    }

    /// Set one header; a repeated name keeps the last value
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replace all headers
    pub fn set_headers(&mut self, headers: BTreeMap<String, String>) -> &mut Self {
        self.headers = headers;
        self
    }

    /// Set one query parameter; a repeated key keeps the last value
    pub fn set_query(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Replace all query parameters
    pub fn set_queries(&mut self, query: BTreeMap<String, String>) -> &mut Self {
        self.query = query;
        self
    }

    /// Set the payload. Only sent for POST.
    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Get a header value (case-sensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn queries(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(|s| s.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the scheme asks for an encrypted transport
    pub fn is_secure(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    /// Request target as written on the request line.
    ///
    /// GET carries the encoded query after the path, POST sends the path
    /// alone. An empty path is sent as `/`.
    pub fn uri(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { self.path.as_str() };
        match self.method {
            Method::Get => format!("{}{}", path, encode_query_with_prefix(&self.query)),
            Method::Post => path.to_string(),
        }
    }

    /// `host:port`, used when no Host header was set explicitly
    pub fn host_header(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Build the outbound wire request.
    ///
    /// User headers are written first; `Host` is synthesized only when none
    /// of them names it, so an explicit Host always wins.
    pub(crate) fn to_wire(&self) -> Result<http::Request<Full<Bytes>>> {
        let target = self.uri();
        let uri = target
            .parse::<http::Uri>()
            .map_err(|e| Error::InvalidUri(format!("{}: {}", target, e)))?;

        let mut builder = http::Request::builder().method(self.method.to_http()).uri(uri);
        let headers = builder
            .headers_mut()
            .ok_or_else(|| Error::Internal("request builder rejected method or target".to_string()))?;

        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidHeader(format!("{:?}: {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidHeader(format!("{}: {:?}: {}", name, value, e)))?;
            headers.append(header_name, header_value);
        }

        if !headers.contains_key(HOST) {
            let host = self.host_header();
            let value = HeaderValue::from_str(&host)
                .map_err(|e| Error::InvalidHost(format!("{}: {}", host, e)))?;
            headers.insert(HOST, value);
        }

        let body = match self.method {
            Method::Get => Bytes::new(),
            Method::Post => self.body.clone(),
        };

        builder
            .body(Full::new(body))
            .map_err(|e| Error::Internal(e.to_string()))
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.method, self.uri(), HTTP_VERSION)?;
        for (name, value) in &self.headers {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        write!(f, "\r\n{}", String::from_utf8_lossy(&self.body))
    }
}

/// Builder for constructing requests
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new builder from a method and a full URL
    pub fn new(method: Method, url: &str) -> Self {
        let mut request = Request::new();
        request.set_method(method).set_url(url);
        Self { request }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.set_header(name, value);
        self
    }

    /// Add a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.set_query(key, value);
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.set_body(body);
        self
    }

    /// Build the request
    pub fn build(self) -> Request {
        self.request
    }
}
