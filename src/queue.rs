// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Work Queue Types
 * Work items and the producer handle feeding the discovery consumer
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use tokio::sync::mpsc;

use crate::request::DiscoveryRequest;

/// A unit of work flowing through the discovery queues. The poison pill is
/// a distinguished sentinel signalling graceful shutdown; it is never a
/// valid request.
#[derive(Debug, Clone)]
pub enum WorkItem {
    Request(DiscoveryRequest),
    PoisonPill,
}

/// Cloneable producer side of the dispatcher's input queue. The core seeds
/// target requests through it and enqueues the sentinel when discovery
/// should wind down.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<WorkItem>,
}

impl QueueHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<WorkItem>) -> Self {
        Self { tx }
    }

    /// Returns false if the consumer is gone.
    pub fn push(&self, request: DiscoveryRequest) -> bool {
        self.tx.send(WorkItem::Request(request)).is_ok()
    }

    pub fn poison(&self) -> bool {
        self.tx.send(WorkItem::PoisonPill).is_ok()
    }
}
