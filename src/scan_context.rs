// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Scan Context
 * Immutable per-run target scope and discovery configuration
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::{Position, Url};
use validator::Validate;

use crate::errors::{ScannerError, ScannerResult};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DiscoveryConfig {
    /// Upper bound on concurrently running plugin invocations
    #[validate(range(min = 1, max = 256))]
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Wall-clock budget for the whole discovery phase
    #[validate(range(min = 1))]
    #[serde(default = "default_max_discovery_time_secs")]
    pub max_discovery_time_secs: u64,

    /// Accepted requests per (base URL, shape) bucket
    #[validate(range(min = 1))]
    #[serde(default = "default_max_variants")]
    pub max_variants: u32,

    /// Additional attempts after the first failed send
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Consecutive non-timeout failures before the whole scan is aborted
    #[validate(range(min = 1, max = 1000))]
    #[serde(default = "default_error_window_size")]
    pub error_window_size: usize,

    /// Expected insertions for the initial seen-set sizing; the filter
    /// grows past this without losing the no-false-negative guarantee
    #[validate(range(min = 64))]
    #[serde(default = "default_seen_set_capacity")]
    pub seen_set_capacity: usize,

    /// Desired false-positive rate of the seen-set
    #[validate(range(min = 0.000001, max = 0.5))]
    #[serde(default = "default_seen_set_error_rate")]
    pub seen_set_error_rate: f64,

    /// Per-request network timeout, delegated to the transport layer
    #[validate(range(min = 1))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Responses larger than this are truncated to bound memory
    #[validate(range(min = 1024))]
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_worker_pool_size() -> usize {
    10
}

fn default_max_discovery_time_secs() -> u64 {
    1800
}

fn default_max_variants() -> u32 {
    5
}

fn default_max_retries() -> u32 {
    2
}

fn default_error_window_size() -> usize {
    10
}

fn default_seen_set_capacity() -> usize {
    16_384
}

fn default_seen_set_error_rate() -> f64 {
    0.001
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_cache_capacity() -> u64 {
    1024
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            max_discovery_time_secs: default_max_discovery_time_secs(),
            max_variants: default_max_variants(),
            max_retries: default_max_retries(),
            error_window_size: default_error_window_size(),
            seen_set_capacity: default_seen_set_capacity(),
            seen_set_error_rate: default_seen_set_error_rate(),
            request_timeout_secs: default_request_timeout_secs(),
            max_redirects: default_max_redirects(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// The immutable scan scope: target base URLs, target domains and the
/// explicitly excluded addresses. Built once, shared by reference for the
/// whole run; there is no ambient global configuration.
#[derive(Debug)]
pub struct ScanContext {
    targets: Vec<Url>,
    base_urls: HashSet<String>,
    target_domains: HashSet<String>,
    excluded: HashSet<String>,
    config: DiscoveryConfig,
}

impl ScanContext {
    pub fn new(
        targets: Vec<Url>,
        excluded: Vec<Url>,
        config: DiscoveryConfig,
    ) -> ScannerResult<Self> {
        config
            .validate()
            .map_err(|e| ScannerError::Configuration(e.to_string()))?;

        if targets.is_empty() {
            return Err(ScannerError::Configuration(
                "at least one target URL is required".to_string(),
            ));
        }

        let mut base_urls = HashSet::new();
        let mut target_domains = HashSet::new();
        for target in &targets {
            verify_target(target)?;
            base_urls.insert(base_url_of(target));
            if let Some(host) = target.host_str() {
                target_domains.insert(host.to_string());
            }
        }

        let excluded = excluded.iter().map(|u| path_url_of(u)).collect();

        Ok(Self {
            targets,
            base_urls,
            target_domains,
            excluded,
            config,
        })
    }

    pub fn targets(&self) -> &[Url] {
        &self.targets
    }

    pub fn base_urls(&self) -> &HashSet<String> {
        &self.base_urls
    }

    pub fn target_domains(&self) -> &HashSet<String> {
        &self.target_domains
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Scope test: membership of the request's base URL in the target set.
    pub fn is_in_scope(&self, url: &Url) -> bool {
        self.base_urls.contains(&base_url_of(url))
    }

    pub fn is_target_domain(&self, host: &str) -> bool {
        self.target_domains.contains(host)
    }

    /// Blacklist test for the transport layer; the query string is ignored
    /// so an excluded page matches regardless of parameters.
    pub fn is_excluded(&self, url: &Url) -> bool {
        self.excluded.contains(&path_url_of(url))
    }
}

fn base_url_of(url: &Url) -> String {
    url[..Position::BeforePath].to_string()
}

fn path_url_of(url: &Url) -> String {
    url[..Position::AfterPath].to_string()
}

fn verify_target(url: &Url) -> ScannerResult<()> {
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ScannerError::Configuration(format!(
            "invalid target URL {url}: specify the protocol (http/https) and a domain or IP \
             address, e.g. http://host.tld/ or https://127.0.0.1/"
        )));
    }
    Ok(())
}
