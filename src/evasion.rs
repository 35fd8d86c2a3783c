// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Evasion Transform Chain
 * Ordered, fault-isolated request mutation before the wire
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use tracing::warn;
use url::Url;

use crate::errors::ScannerResult;
use crate::request::HttpMethod;

/// A fully prepared outgoing request, after header/cookie preparation and
/// before hitting the network.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// One step of the evasion chain. Lower priority runs first.
pub trait EvasionTransform: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        50
    }

    fn transform(&self, request: OutboundRequest) -> ScannerResult<OutboundRequest>;
}

/// Priority-ordered transform chain. Registration order is preserved for
/// equal priorities. A transform that fails is logged and skipped; the
/// request continues through the rest of the chain untouched by the
/// failing step.
#[derive(Default)]
pub struct EvasionChain {
    transforms: Vec<Box<dyn EvasionTransform>>,
}

impl EvasionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, transform: Box<dyn EvasionTransform>) {
        self.transforms.push(transform);
        // Stable sort keeps registration order within the same priority
        self.transforms.sort_by_key(|t| t.priority());
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn apply(&self, mut request: OutboundRequest) -> OutboundRequest {
        for transform in &self.transforms {
            match transform.transform(request.clone()) {
                Ok(modified) => request = modified,
                Err(err) => {
                    warn!(
                        transform = transform.name(),
                        error = %err,
                        "evasion transform failed to modify the request, skipping"
                    );
                }
            }
        }
        request
    }
}
