// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Knowledge and Exception Sinks
 * Opaque append/query record of discoveries and plugin failures
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::error;

use crate::errors::ScannerError;
use crate::plugin::PluginType;
use crate::request::DiscoveryRequest;

/// Append/query sink for confirmed-new discoveries. Persistence is the
/// consumer's concern; the dispatcher only records and summarizes.
pub trait KnowledgeSink: Send + Sync {
    fn record(&self, request: &DiscoveryRequest);

    /// Unique recorded URLs, unordered.
    fn urls(&self) -> Vec<String>;

    /// Unique recorded requests (the fuzzable surface), unordered.
    fn fuzzable_requests(&self) -> Vec<DiscoveryRequest>;
}

#[derive(Default)]
pub struct InMemoryKnowledge {
    urls: RwLock<HashSet<String>>,
    requests: RwLock<HashSet<DiscoveryRequest>>,
}

impl InMemoryKnowledge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.requests.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.read().is_empty()
    }
}

impl KnowledgeSink for InMemoryKnowledge {
    fn record(&self, request: &DiscoveryRequest) {
        self.urls.write().insert(request.normalized_url());
        self.requests.write().insert(request.clone());
    }

    fn urls(&self) -> Vec<String> {
        self.urls.read().iter().cloned().collect()
    }

    fn fuzzable_requests(&self) -> Vec<DiscoveryRequest> {
        self.requests.read().iter().cloned().collect()
    }
}

/// Receives plugin failures and contract defects. The scan continues after
/// every record; this is diagnosis, not control flow.
pub trait ExceptionSink: Send + Sync {
    fn record(
        &self,
        plugin_type: PluginType,
        plugin_name: &str,
        request: &DiscoveryRequest,
        error: &ScannerError,
    );
}

/// Default sink that reports through the log.
#[derive(Default)]
pub struct LoggingExceptionSink;

impl LoggingExceptionSink {
    pub fn new() -> Self {
        Self
    }
}

impl ExceptionSink for LoggingExceptionSink {
    fn record(
        &self,
        plugin_type: PluginType,
        plugin_name: &str,
        request: &DiscoveryRequest,
        error: &ScannerError,
    ) {
        error!(
            plugin_type = %plugin_type,
            plugin = plugin_name,
            request = %request,
            error = %error,
            "plugin exception recorded"
        );
    }
}
