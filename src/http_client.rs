// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Discovery Transport Client
 * Resilient HTTP sending with pause/stop cooperation, retries and a
 * cross-request circuit breaker
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use moka::future::Cache;
use parking_lot::Mutex;
use rand::Rng;
use reqwest::Client;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::analysis::AnalysisBus;
use crate::errors::{NetworkError, ScannerError, ScannerResult};
use crate::evasion::{EvasionChain, OutboundRequest};
use crate::request::DiscoveryRequest;
use crate::scan_context::ScanContext;
use crate::status::ScanStatus;

/// Realistic browser User-Agents to avoid trivial blocks
const BROWSER_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    // Safari on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

fn next_user_agent() -> &'static str {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let index = COUNTER.fetch_add(1, Ordering::Relaxed) % BROWSER_USER_AGENTS.len();
    BROWSER_USER_AGENTS[index]
}

/// How long the pause loop sleeps between checks
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

const NO_CONTENT: u16 = 204;

/// Connection pool settings, tuned for scan throughput
const POOL_IDLE_PER_HOST: usize = 32;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Per-send behavior flags
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Consult/populate the response cache
    pub cache: bool,
    /// Offer the request/response pair to the analysis sink
    pub grep: bool,
    pub follow_redirects: bool,
    /// Attach the request's cookie
    pub cookies: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            cache: true,
            grep: true,
            follow_redirects: true,
            cookies: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Monotonically increasing sequence identifier for cross-referencing
    pub id: u64,
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
    pub duration_ms: u64,
    pub from_cache: bool,
}

impl HttpResponse {
    pub fn contains(&self, pattern: &str) -> bool {
        self.body.contains(pattern)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get(&name.to_lowercase()).cloned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

pub struct HttpClient {
    client: Client,
    client_no_redirect: Client,
    context: Arc<ScanContext>,
    status: Arc<ScanStatus>,
    user_agent: &'static str,
    /// Recent transient failures shared across all in-flight requests;
    /// multi-writer, hence the mutex
    error_window: Mutex<VecDeque<String>>,
    ignore_errors: AtomicBool,
    sequence: AtomicU64,
    cache: Option<Cache<String, HttpResponse>>,
    evasion: EvasionChain,
    analysis: Option<Arc<AnalysisBus>>,
    collected_cookies: Mutex<Vec<String>>,
}

impl HttpClient {
    pub fn new(context: Arc<ScanContext>, status: Arc<ScanStatus>) -> ScannerResult<Self> {
        let config = context.config();
        let user_agent = next_user_agent();

        let builder = |redirect: reqwest::redirect::Policy| {
            Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .redirect(redirect)
                .user_agent(user_agent)
                .pool_max_idle_per_host(POOL_IDLE_PER_HOST)
                .pool_idle_timeout(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS))
                .tcp_keepalive(Duration::from_secs(60))
                .tcp_nodelay(true)
                .build()
        };

        let client = builder(reqwest::redirect::Policy::limited(config.max_redirects))
            .map_err(|e| ScannerError::Configuration(format!("failed to build HTTP client: {e}")))?;
        let client_no_redirect = builder(reqwest::redirect::Policy::none())
            .map_err(|e| ScannerError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            client_no_redirect,
            context,
            status,
            user_agent,
            error_window: Mutex::new(VecDeque::new()),
            ignore_errors: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            cache: None,
            evasion: EvasionChain::new(),
            analysis: None,
            collected_cookies: Mutex::new(Vec::new()),
        })
    }

    /// Enable response caching
    pub fn with_cache(mut self) -> Self {
        let config = self.context.config();
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .build();
        self.cache = Some(cache);
        self
    }

    pub fn with_evasion_chain(mut self, chain: EvasionChain) -> Self {
        self.evasion = chain;
        self
    }

    /// Enable the analysis ("grep") hand-off
    pub fn with_analysis_bus(mut self, bus: Arc<AnalysisBus>) -> Self {
        self.analysis = Some(bus);
        self
    }

    /// Suspend circuit-breaker accounting; failures are still retried per
    /// request but never escalate to a scan abort.
    pub fn ignore_errors(&self, yes: bool) {
        self.ignore_errors.store(yes, Ordering::Relaxed);
    }

    /// Set-Cookie values observed during this scan
    pub fn cookies(&self) -> Vec<String> {
        self.collected_cookies.lock().clone()
    }

    /// Current length of the consecutive-failure window
    pub fn consecutive_failures(&self) -> usize {
        self.error_window.lock().len()
    }

    /// The headers this client would put on the wire for `request`,
    /// before evasion.
    pub fn request_headers(&self, request: &DiscoveryRequest) -> Vec<(String, String)> {
        let mut headers = vec![("User-Agent".to_string(), self.user_agent.to_string())];
        headers.extend(self.prepare(request, &SendOptions::default()).headers);
        headers
    }

    /// Send a raw request head ("METHOD URI HTTP/x.y" plus header lines)
    /// and optional body, as typed by a user or replayed from a file.
    pub async fn send_raw(
        &self,
        head: &str,
        body: Option<&str>,
        options: SendOptions,
    ) -> ScannerResult<HttpResponse> {
        let request = DiscoveryRequest::from_raw(head, body)?;
        self.send(&request, options).await
    }

    /// Send a discovery request. Valid HTTP responses of any status are
    /// returned normally; transient network failures are retried up to the
    /// configured bound and a sustained failure run aborts the whole scan.
    pub async fn send(
        &self,
        request: &DiscoveryRequest,
        options: SendOptions,
    ) -> ScannerResult<HttpResponse> {
        self.wait_if_paused().await?;

        if !matches!(request.url().scheme(), "http" | "https") {
            return Err(ScannerError::Network(NetworkError::InvalidUrl {
                url: request.url().to_string(),
            }));
        }

        if self.context.is_excluded(request.url()) {
            return Ok(self.no_content_response(request));
        }

        let cache_key = cache_key(request);
        if options.cache {
            if let Some(cache) = &self.cache {
                if let Some(mut hit) = cache.get(&cache_key).await {
                    hit.from_cache = true;
                    debug!(url = %request.url(), id = hit.id, "serving response from cache");
                    return Ok(hit);
                }
            }
        }

        let outbound = self.evasion.apply(self.prepare(request, &options));

        let max_retries = self.context.config().max_retries;
        let mut attempt: u32 = 0;
        loop {
            // The user can pause (or stop) between attempts too
            self.wait_if_paused().await?;

            let started = Instant::now();
            match self.dispatch(&outbound, &options).await {
                Ok(response) => {
                    // 4xx/5xx are valid outcomes, not network failures
                    self.reset_error_window();
                    let response = self
                        .finish_response(request, &cache_key, &options, started, response)
                        .await;
                    return Ok(response);
                }
                Err(err) => {
                    if !err.is_timeout() {
                        // Timeouts are expected at scale; everything else
                        // counts toward the scan-wide breaker
                        self.record_failure(&err)?;
                    }

                    if !err.is_retryable() || attempt >= max_retries {
                        warn!(
                            url = %outbound.url,
                            attempts = attempt + 1,
                            error = %err,
                            "request failed permanently"
                        );
                        return Err(ScannerError::RequestFailed {
                            url: outbound.url.to_string(),
                            attempts: attempt + 1,
                            source: err,
                        });
                    }

                    attempt += 1;
                    debug!(url = %outbound.url, attempt, error = %err, "re-sending request");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                }
            }
        }
    }

    /// Block while the scan is paused; abort when it is stopped. This is
    /// the cooperative cancellation checkpoint in front of all network I/O.
    async fn wait_if_paused(&self) -> ScannerResult<()> {
        while self.status.is_paused() {
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
            if self.status.is_stopped() {
                return Err(ScannerError::Stopped);
            }
        }
        if self.status.is_stopped() {
            return Err(ScannerError::Stopped);
        }
        Ok(())
    }

    /// Header/cookie preparation for the wire.
    fn prepare(&self, request: &DiscoveryRequest, options: &SendOptions) -> OutboundRequest {
        let mut headers: Vec<(String, String)> = vec![("Accept".to_string(), "*/*".to_string())];
        headers.extend(request.headers().iter().cloned());

        if options.cookies {
            if let Some(cookie) = request.cookie() {
                headers.push(("Cookie".to_string(), cookie.to_string()));
            }
        }

        let body = if request.body_params().is_empty() {
            None
        } else {
            let has_content_type = headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                headers.push((
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ));
            }
            Some(form_encode(request.body_params()))
        };

        let mut url = request.url().clone();
        url.set_fragment(None);

        OutboundRequest {
            method: request.method(),
            url,
            headers,
            body,
        }
    }

    async fn dispatch(
        &self,
        outbound: &OutboundRequest,
        options: &SendOptions,
    ) -> Result<reqwest::Response, NetworkError> {
        let client = if options.follow_redirects {
            &self.client
        } else {
            &self.client_no_redirect
        };

        let method = reqwest::Method::from_bytes(outbound.method.as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = client.request(method, outbound.url.clone());
        for (name, value) in &outbound.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &outbound.body {
            builder = builder.body(body.clone());
        }

        builder
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(outbound.url.as_str(), &e))
    }

    async fn finish_response(
        &self,
        request: &DiscoveryRequest,
        cache_key: &str,
        options: &SendOptions,
        started: Instant,
        response: reqwest::Response,
    ) -> HttpResponse {
        let status_code = response.status().as_u16();

        let mut headers = HashMap::with_capacity(response.headers().len());
        {
            let mut collected = self.collected_cookies.lock();
            for (name, value) in response.headers() {
                let Ok(value) = value.to_str() else { continue };
                if name.as_str() == "set-cookie" {
                    collected.push(value.to_string());
                }
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let body_bytes = response.bytes().await.unwrap_or_default();
        let max_body_size = self.context.config().max_body_size;
        let body = if body_bytes.len() > max_body_size {
            String::from_utf8_lossy(&body_bytes[..max_body_size]).to_string()
        } else {
            String::from_utf8_lossy(&body_bytes).to_string()
        };

        let id = self.next_id();
        let http_response = HttpResponse {
            id,
            status_code,
            body,
            headers,
            duration_ms: started.elapsed().as_millis() as u64,
            from_cache: false,
        };

        debug!(
            id,
            status = status_code,
            grep = options.grep,
            "{} {} returned HTTP code {}",
            request.method(),
            request.normalized_url(),
            status_code
        );

        if options.grep {
            self.grep(request, &http_response);
        }

        if options.cache {
            if let Some(cache) = &self.cache {
                cache
                    .insert(cache_key.to_string(), http_response.clone())
                    .await;
            }
        }

        http_response
    }

    /// Offer the pair to the analysis sink when the target host is in
    /// scope. Must never block or fail the send path.
    fn grep(&self, request: &DiscoveryRequest, response: &HttpResponse) {
        let Some(bus) = &self.analysis else { return };
        let Some(host) = request.url().host_str() else {
            return;
        };
        if !self.context.is_target_domain(host) {
            return;
        }

        let mut canonical = request.clone();
        canonical.strip_fragment();
        bus.offer(canonical, response.clone());
    }

    /// Append a transient failure to the shared window; at capacity the
    /// whole scan is aborted with a known or unknown root cause.
    fn record_failure(&self, err: &NetworkError) -> ScannerResult<()> {
        if self.ignore_errors.load(Ordering::Relaxed) {
            return Ok(());
        }

        let capacity = self.context.config().error_window_size;
        let mut window = self.error_window.lock();
        window.push_back(err.to_string());
        while window.len() > capacity {
            window.pop_front();
        }

        debug!(
            consecutive_failures = window.len(),
            "incrementing consecutive failure count"
        );

        if window.len() >= capacity {
            // Unrecoverable for the whole scan: flag the stop so every
            // other in-flight worker unwinds at its next checkpoint
            self.status.stop();
            warn!(
                error = %err,
                "too many consecutive failures while performing HTTP requests, aborting scan"
            );

            return Err(match err.stop_reason() {
                Some(reason) => ScannerError::MustStopKnownReason {
                    reason,
                    last_error: err.to_string(),
                },
                None => ScannerError::MustStopUnknownReason {
                    recent: window.iter().cloned().collect(),
                },
            });
        }

        Ok(())
    }

    fn reset_error_window(&self) {
        let mut window = self.error_window.lock();
        if !window.is_empty() {
            window.clear();
            debug!("resetting consecutive failure count");
        }
    }

    /// Synthetic empty response for explicitly excluded addresses, logged
    /// as if sent.
    fn no_content_response(&self, request: &DiscoveryRequest) -> HttpResponse {
        let id = self.next_id();
        debug!(
            id,
            "{} {} configured as non-target, returning empty response without sending",
            request.method(),
            request.normalized_url()
        );
        HttpResponse {
            id,
            status_code: NO_CONTENT,
            body: String::new(),
            headers: HashMap::new(),
            duration_ms: 0,
            from_cache: false,
        }
    }

    fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn cache_key(request: &DiscoveryRequest) -> String {
    let mut key = format!("{} {}", request.method(), request.normalized_url());
    if !request.body_params().is_empty() {
        key.push(' ');
        key.push_str(&form_encode(request.body_params()));
    }
    key
}

fn form_encode(params: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in params {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

/// Short linear backoff with jitter to avoid hammering a struggling host
/// in lockstep.
fn retry_backoff(attempt: u32) -> Duration {
    let base = 100 * u64::from(attempt);
    let jitter_range = (base as f64 * 0.3) as i64;
    let jitter = if jitter_range > 0 {
        rand::rng().random_range(-jitter_range..=jitter_range)
    } else {
        0
    };
    Duration::from_millis((base as i64 + jitter).max(0) as u64)
}
