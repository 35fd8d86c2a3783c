// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Dedup Engine
 * Seen-URL filtering and variant capping for the discovery phase
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use growable_bloom_filter::GrowableBloom;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::request::{DiscoveryRequest, RequestShape};
use crate::scan_context::ScanContext;

/// Probabilistic seen-URL set. Guarantees no false negatives: once a URL
/// is inserted, an equal fragment-stripped URL always tests positive.
/// False positives are the accepted cost of bounded memory; the filter
/// grows with scan volume.
pub struct SeenUrlFilter {
    filter: GrowableBloom,
}

impl SeenUrlFilter {
    pub fn new(expected_insertions: usize, error_rate: f64) -> Self {
        Self {
            filter: GrowableBloom::new(error_rate, expected_insertions),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.filter.contains(url)
    }

    pub fn insert(&mut self, url: &str) {
        self.filter.insert(url);
    }
}

/// Caps how many structurally identical requests pass through, bounding
/// the combinatorial explosion from enumerable identifiers such as
/// `?id=123`, `?id=124`, ...
pub struct VariantDb {
    buckets: HashMap<RequestShape, u32>,
    cap: u32,
}

impl VariantDb {
    pub fn new(cap: u32) -> Self {
        Self {
            buckets: HashMap::new(),
            cap,
        }
    }

    /// Admit a request of the given shape if its bucket is below the cap,
    /// incrementing the bucket count.
    pub fn admit(&mut self, shape: RequestShape) -> bool {
        let count = self.buckets.entry(shape).or_insert(0);
        if *count < self.cap {
            *count += 1;
            true
        } else {
            false
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Decides whether a candidate request is genuinely new. State is mutated
/// only from the single dispatch thread, so no locking is needed.
pub struct DedupEngine {
    context: Arc<ScanContext>,
    seen: SeenUrlFilter,
    variants: VariantDb,
}

impl DedupEngine {
    pub fn new(context: Arc<ScanContext>) -> Self {
        let config = context.config();
        let seen = SeenUrlFilter::new(config.seen_set_capacity, config.seen_set_error_rate);
        let variants = VariantDb::new(config.max_variants);
        Self {
            context,
            seen,
            variants,
        }
    }

    /// Returns true when the request passes all of: scope, seen-before,
    /// variant cap. Out-of-scope requests are dropped before touching any
    /// state so they never pollute the seen-set or variant buckets.
    pub fn accept(&mut self, request: &mut DiscoveryRequest) -> bool {
        request.strip_fragment();

        if !self.context.is_in_scope(request.url()) {
            debug!(url = %request.url(), "dropping out-of-scope discovery");
            return false;
        }

        let key = request.normalized_url();
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(&key);

        if !self.variants.admit(request.shape()) {
            debug!(url = %request.url(), "variant cap reached for this shape");
            return false;
        }

        true
    }

    pub fn is_seen(&self, url: &str) -> bool {
        self.seen.contains(url)
    }
}
