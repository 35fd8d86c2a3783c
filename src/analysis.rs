// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Analysis hand-off - downstream content inspection feed
//!
//! The transport client offers every in-scope (request, response) pair to
//! this bus for content inspection ("grep") by a downstream consumer. The
//! hand-off is strictly non-blocking: a full or closed sink drops the pair
//! silently rather than stalling the send path.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::http_client::HttpResponse;
use crate::request::DiscoveryRequest;

/// Default capacity for the hand-off channel
const CHANNEL_CAPACITY: usize = 1000;

pub type AnalysisPair = (DiscoveryRequest, HttpResponse);

/// Bounded, drop-on-overflow feed of request/response pairs.
pub struct AnalysisBus {
    tx: mpsc::Sender<AnalysisPair>,
    dropped: AtomicU64,
}

impl AnalysisBus {
    /// Create a bus and the consumer side of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AnalysisPair>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn with_default_capacity() -> (Self, mpsc::Receiver<AnalysisPair>) {
        Self::new(CHANNEL_CAPACITY)
    }

    /// Offer a pair to the consumer. Never blocks and never fails the
    /// caller; overflow is counted and dropped.
    pub fn offer(&self, request: DiscoveryRequest, response: HttpResponse) {
        if self.tx.try_send((request, response)).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(dropped, "analysis sink not keeping up, dropping pair");
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
