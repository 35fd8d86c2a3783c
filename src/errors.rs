// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Discovery Error Types
 * Transport failure classification and scan-fatal stop signals
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Well-known root causes for a circuit-breaker trip. These map to the
/// errno-level failures a scan runs into when the target (or the local
/// network) goes away mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NameResolution,
    ConnectionRefused,
    HostUnreachable,
    ConnectionReset,
    NetworkDown,
    NetworkUnreachable,
    Timeout,
    OutOfSpace,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::NameResolution => "name resolution failure",
            StopReason::ConnectionRefused => "connection refused",
            StopReason::HostUnreachable => "host unreachable",
            StopReason::ConnectionReset => "connection reset",
            StopReason::NetworkDown => "network down",
            StopReason::NetworkUnreachable => "network unreachable",
            StopReason::Timeout => "timeout",
            StopReason::OutOfSpace => "out of disk space",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient network failures with detailed classification
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection timeout for {url}")]
    ConnectionTimeout { url: String },

    #[error("DNS resolution failed for {host}: {reason}")]
    DnsResolutionFailed { host: String, reason: String },

    #[error("Connection refused for {url}")]
    ConnectionRefused { url: String },

    #[error("Connection reset by peer for {url}")]
    ConnectionReset { url: String },

    #[error("Host unreachable for {url}")]
    HostUnreachable { url: String },

    #[error("Network down for {url}")]
    NetworkDown { url: String },

    #[error("Network unreachable for {url}")]
    NetworkUnreachable { url: String },

    #[error("TLS handshake failed for {host}: {reason}")]
    TlsHandshakeFailed { host: String, reason: String },

    #[error("Out of disk space: {reason}")]
    OutOfSpace { reason: String },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Network error for {url}: {reason}")]
    Other { url: String, reason: String },
}

impl NetworkError {
    /// Check if error is worth another attempt for the same request
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            NetworkError::InvalidUrl { .. } | NetworkError::OutOfSpace { .. }
        )
    }

    /// Timeouts are retried but excluded from circuit-breaker accounting
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetworkError::ConnectionTimeout { .. })
    }

    /// Map to a well-known circuit-breaker trip cause, if there is one
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            NetworkError::ConnectionTimeout { .. } => Some(StopReason::Timeout),
            NetworkError::DnsResolutionFailed { .. } => Some(StopReason::NameResolution),
            NetworkError::ConnectionRefused { .. } => Some(StopReason::ConnectionRefused),
            NetworkError::ConnectionReset { .. } => Some(StopReason::ConnectionReset),
            NetworkError::HostUnreachable { .. } => Some(StopReason::HostUnreachable),
            NetworkError::NetworkDown { .. } => Some(StopReason::NetworkDown),
            NetworkError::NetworkUnreachable { .. } => Some(StopReason::NetworkUnreachable),
            NetworkError::OutOfSpace { .. } => Some(StopReason::OutOfSpace),
            _ => None,
        }
    }

    /// Classify a reqwest failure by walking its source chain down to the
    /// underlying io error kind.
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return NetworkError::ConnectionTimeout {
                url: url.to_string(),
            };
        }

        let host = err
            .url()
            .and_then(|u| u.host_str())
            .unwrap_or("unknown")
            .to_string();
        let description = err.to_string();
        let lowered = description.to_lowercase();

        if lowered.contains("dns") || lowered.contains("resolve") {
            return NetworkError::DnsResolutionFailed {
                host,
                reason: description,
            };
        }
        if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("ssl") {
            return NetworkError::TlsHandshakeFailed {
                host,
                reason: description,
            };
        }

        match io_error_kind(err) {
            Some(std::io::ErrorKind::ConnectionRefused) => NetworkError::ConnectionRefused {
                url: url.to_string(),
            },
            Some(std::io::ErrorKind::ConnectionReset)
            | Some(std::io::ErrorKind::ConnectionAborted)
            | Some(std::io::ErrorKind::BrokenPipe) => NetworkError::ConnectionReset {
                url: url.to_string(),
            },
            Some(std::io::ErrorKind::HostUnreachable) => NetworkError::HostUnreachable {
                url: url.to_string(),
            },
            Some(std::io::ErrorKind::NetworkDown) => NetworkError::NetworkDown {
                url: url.to_string(),
            },
            Some(std::io::ErrorKind::NetworkUnreachable) => NetworkError::NetworkUnreachable {
                url: url.to_string(),
            },
            Some(std::io::ErrorKind::TimedOut) => NetworkError::ConnectionTimeout {
                url: url.to_string(),
            },
            Some(std::io::ErrorKind::StorageFull) => NetworkError::OutOfSpace {
                reason: description,
            },
            _ => NetworkError::Other {
                url: url.to_string(),
                reason: description,
            },
        }
    }
}

fn io_error_kind(err: &reqwest::Error) -> Option<std::io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = cause.source();
    }
    None
}

/// Main error type for the discovery engine
#[derive(Error, Debug)]
pub enum ScannerError {
    /// Network-level failure on a single attempt
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// The user stopped the scan, or stopped it while paused; cooperative
    /// abort, never retried
    #[error("Scan stopped by user")]
    Stopped,

    /// Retry budget exhausted for one request; fatal for this request
    /// chain only
    #[error("Giving up on {url} after {attempts} attempts: {source}")]
    RequestFailed {
        url: String,
        attempts: u32,
        source: NetworkError,
    },

    /// Circuit breaker tripped with a recognized root cause; fatal for the
    /// entire scan
    #[error("Too many consecutive network failures ({reason}): {last_error}")]
    MustStopKnownReason {
        reason: StopReason,
        last_error: String,
    },

    /// Circuit breaker tripped without a recognized root cause; recent
    /// failures are attached for diagnosis
    #[error("Too many consecutive network failures with no recognized cause")]
    MustStopUnknownReason { recent: Vec<String> },

    /// A plugin returned results inline instead of emitting them through
    /// its output channel
    #[error("Plugin {plugin} returned results inline instead of using its output channel")]
    PluginContract { plugin: String },

    /// A plugin failed at runtime; the scan continues
    #[error("Plugin {plugin} failed: {reason}")]
    Plugin { plugin: String, reason: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// General errors
    #[error("Scanner error: {0}")]
    General(String),
}

impl ScannerError {
    /// True when the error aborts the whole scan, not just one request
    pub fn is_scan_fatal(&self) -> bool {
        matches!(
            self,
            ScannerError::Stopped
                | ScannerError::MustStopKnownReason { .. }
                | ScannerError::MustStopUnknownReason { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ScannerError::Network(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Result type for scanner operations
pub type ScannerResult<T> = Result<T, ScannerError>;
