// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Scan Status
 * Pause/stop state machine and progress reporting shared across workers
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crate::request::DiscoveryRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Running,
    Paused,
    Stopping,
}

const RUNNING: u8 = 0;
const PAUSED: u8 = 1;
const STOPPING: u8 = 2;

/// Shared scan status handle. Workers poll it at their checkpoints; the
/// controlling layer flips it. Stopping is terminal: a pause(false) issued
/// after stop() does not resurrect the scan.
pub struct ScanStatus {
    state: AtomicU8,
    started: Instant,
    phase: Mutex<String>,
    running_plugin: Mutex<String>,
    current_request: Mutex<Option<DiscoveryRequest>>,
    progress: AtomicU64,
}

impl ScanStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RUNNING),
            started: Instant::now(),
            phase: Mutex::new(String::new()),
            running_plugin: Mutex::new(String::new()),
            current_request: Mutex::new(None),
            progress: AtomicU64::new(0),
        }
    }

    pub fn pause(&self, pause: bool) {
        let next = if pause { PAUSED } else { RUNNING };
        loop {
            let current = self.state.load(Ordering::SeqCst);
            if current == STOPPING {
                return;
            }
            if self
                .state
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }

    pub fn stop(&self) {
        self.state.store(STOPPING, Ordering::SeqCst);
    }

    pub fn state(&self) -> ScanState {
        match self.state.load(Ordering::SeqCst) {
            PAUSED => ScanState::Paused,
            STOPPING => ScanState::Stopping,
            _ => ScanState::Running,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state() == ScanState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ScanState::Stopping
    }

    pub fn run_time(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn set_phase(&self, phase: &str) {
        *self.phase.lock() = phase.to_string();
    }

    pub fn phase(&self) -> String {
        self.phase.lock().clone()
    }

    pub fn set_running_plugin(&self, name: &str) {
        *self.running_plugin.lock() = name.to_string();
    }

    pub fn running_plugin(&self) -> String {
        self.running_plugin.lock().clone()
    }

    pub fn set_current_request(&self, request: &DiscoveryRequest) {
        *self.current_request.lock() = Some(request.clone());
    }

    pub fn current_request(&self) -> Option<DiscoveryRequest> {
        self.current_request.lock().clone()
    }

    pub fn inc_progress(&self) -> u64 {
        self.progress.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }
}

impl Default for ScanStatus {
    fn default() -> Self {
        Self::new()
    }
}
