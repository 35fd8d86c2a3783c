// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Discovery Plugin Capability
 * The interface every crawl/infrastructure plugin implements
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

use crate::errors::ScannerResult;
use crate::request::DiscoveryRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    Crawl,
    Infrastructure,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Crawl => "crawl",
            PluginType::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single discover() invocation reports back to the dispatcher.
/// Discovered requests travel through the plugin's output channel, never
/// the return value; `Inline` exists so the dispatcher can detect and
/// report that contract violation instead of silently ignoring it.
#[derive(Debug)]
pub enum DiscoverOutcome {
    /// Normal completion; anything found was emitted on the output channel
    Done,
    /// Run-once signal: the plugin has nothing more to contribute this
    /// scan and should not be invoked again
    Exhausted,
    /// Results returned inline instead of through the output channel
    Inline(Vec<DiscoveryRequest>),
}

/// A plugin's private output channel handle. The receiving side lives in
/// the dispatcher, which drains it after every submission.
#[derive(Clone)]
pub struct PluginOutput {
    tx: mpsc::UnboundedSender<DiscoveryRequest>,
}

impl PluginOutput {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DiscoveryRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, request: DiscoveryRequest) {
        // The dispatcher owns the receiver for the whole run; a closed
        // channel only happens during teardown, where emissions are moot.
        let _ = self.tx.send(request);
    }
}

/// Capability interface for discovery plugins. The dispatcher depends only
/// on this trait, never on concrete plugin types.
#[async_trait]
pub trait DiscoveryPlugin: Send + Sync {
    /// Examine one request, emitting any newly found requests on `out`.
    async fn discover(
        &self,
        request: &DiscoveryRequest,
        out: &PluginOutput,
    ) -> ScannerResult<DiscoverOutcome>;

    /// Teardown hook, invoked exactly once per scan.
    async fn end(&self) -> ScannerResult<()> {
        Ok(())
    }

    fn name(&self) -> &str;

    fn plugin_type(&self) -> PluginType;
}
