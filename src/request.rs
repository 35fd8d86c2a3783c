// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Discovery Request Model
 * Normalized HTTP request values used for dedup and dispatch
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use url::{Position, Url};

use crate::errors::{ScannerError, ScannerResult};

/// Explicit HTTP verb enumeration. The verb is data, not a dynamically
/// resolved method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Head,
    Put,
    Delete,
    Options,
    Patch,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ScannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "HEAD" => Ok(HttpMethod::Head),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            "PATCH" => Ok(HttpMethod::Patch),
            "TRACE" => Ok(HttpMethod::Trace),
            other => Err(ScannerError::Validation(format!(
                "unsupported HTTP method: {other}"
            ))),
        }
    }
}

/// Structural identity of a request: base URL, path skeleton and the
/// sorted set of parameter names. Requests sharing a shape differ only in
/// enumerable values and get bucketed together by the variant limiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestShape {
    pub base: String,
    pub path_skeleton: String,
    pub param_names: Vec<String>,
}

/// An abstract HTTP request discovered during the crawl phase. Immutable
/// value type once constructed; equality and hashing are defined on the
/// normalized form with the URL fragment stripped (extra headers are a
/// transport detail and excluded).
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    url: Url,
    method: HttpMethod,
    body_params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookie: Option<String>,
}

impl DiscoveryRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            url,
            method,
            body_params: Vec::new(),
            headers: Vec::new(),
            cookie: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Parse an absolute http(s) URL into a request.
    pub fn parse(method: HttpMethod, url: &str) -> ScannerResult<Self> {
        let parsed = Url::parse(url).map_err(|_| ScannerError::Network(
            crate::errors::NetworkError::InvalidUrl {
                url: url.to_string(),
            },
        ))?;
        ensure_http(&parsed)?;
        Ok(Self::new(method, parsed))
    }

    /// Parse a raw request head ("METHOD URI HTTP/x.y" followed by header
    /// lines) plus an optional form-encoded body. Relative request URIs are
    /// resolved against the Host header. Content-Length is dropped; the
    /// transport recomputes it.
    pub fn from_raw(head: &str, body: Option<&str>) -> ScannerResult<Self> {
        let mut lines = head.lines();
        let request_line = lines
            .next()
            .ok_or_else(|| ScannerError::Validation("empty request head".to_string()))?;

        let mut parts = request_line.split_whitespace();
        let method: HttpMethod = parts
            .next()
            .ok_or_else(|| ScannerError::Validation("missing method in request line".to_string()))?
            .parse()?;
        let uri = parts.next().ok_or_else(|| {
            ScannerError::Validation("missing URI in request line".to_string())
        })?;

        let mut headers = Vec::new();
        let mut cookie = None;
        let mut host = None;
        for line in lines {
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(ScannerError::Validation(format!(
                    "malformed header line: {line}"
                )));
            };
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("host") {
                host = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("cookie") {
                cookie = Some(value.to_string());
            } else if !name.eq_ignore_ascii_case("content-length") {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let absolute = if uri.starts_with('/') {
            let host = host.ok_or_else(|| {
                ScannerError::Validation(
                    "relative request URI without a Host header".to_string(),
                )
            })?;
            format!("http://{host}{uri}")
        } else {
            uri.to_string()
        };

        let mut request = Self::parse(method, &absolute)?;
        request.headers = headers;
        request.cookie = cookie;
        if let Some(body) = body {
            request.body_params = url::form_urlencoded::parse(body.as_bytes())
                .into_owned()
                .collect();
        }
        Ok(request)
    }

    pub fn with_body_params(mut self, params: Vec<(String, String)>) -> Self {
        self.body_params = params;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.cookie = Some(cookie.to_string());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn body_params(&self) -> &[(String, String)] {
        &self.body_params
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    /// Drop the URL fragment; fragments never reach the wire and must not
    /// distinguish otherwise equal requests.
    pub fn strip_fragment(&mut self) {
        self.url.set_fragment(None);
    }

    /// The fragment-stripped URL string used as the seen-set key.
    pub fn normalized_url(&self) -> String {
        self.url[..Position::AfterQuery].to_string()
    }

    /// Scheme + authority, the scope-membership key.
    pub fn base_url(&self) -> String {
        self.url[..Position::BeforePath].to_string()
    }

    pub fn query_param_names(&self) -> Vec<String> {
        self.url
            .query_pairs()
            .map(|(name, _)| name.into_owned())
            .collect()
    }

    /// Structural shape for variant bucketing.
    pub fn shape(&self) -> RequestShape {
        let mut param_names: Vec<String> = self.query_param_names();
        param_names.extend(self.body_params.iter().map(|(name, _)| name.clone()));
        param_names.sort();
        param_names.dedup();

        RequestShape {
            base: self.base_url(),
            path_skeleton: path_skeleton(self.url.path()),
            param_names,
        }
    }
}

impl fmt::Display for DiscoveryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.normalized_url())
    }
}

impl PartialEq for DiscoveryRequest {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.normalized_url() == other.normalized_url()
            && self.body_params == other.body_params
            && self.cookie == other.cookie
    }
}

impl Eq for DiscoveryRequest {}

impl Hash for DiscoveryRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method.hash(state);
        self.normalized_url().hash(state);
        self.body_params.hash(state);
        self.cookie.hash(state);
    }
}

fn ensure_http(url: &Url) -> ScannerResult<()> {
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ScannerError::Network(
            crate::errors::NetworkError::InvalidUrl {
                url: url.to_string(),
            },
        ));
    }
    Ok(())
}

/// Collapse enumerable path segments so `/item/123` and `/item/124` share
/// a skeleton.
fn path_skeleton(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                "{n}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
