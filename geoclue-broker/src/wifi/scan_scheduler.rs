/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Access-point bookkeeping and scan cadence decisions.
//!
//! # Access-point sets
//!
//! ```text
//!                 signal > floor
//!   ┌─────────┐ ───────────────▶ ┌────────┐
//!   │ ignored │                  │ active │ ──▶ fingerprint / query
//!   └─────────┘ ◀─────────────── └────────┘
//!        ▲        signal <= floor     ▲
//!        │ added at/below floor       │ added above floor
//! ```
//!
//! Ignored access points are still tracked so a later signal rise promotes them.
//! Every method returns whether the fingerprint changed; the caller uses that to
//! (re)arm the settle timer.
//!
//! # Cadence
//!
//! The next scan is scheduled after the detailed interval while consumers demand
//! street-level accuracy or better, and after the coarse interval otherwise.

use crate::accuracy::AccuracyLevel;
use crate::config::WifiConfig;
use crate::observability::events;
use crate::wifi::access_point::{AccessPoint, ApEvent};
use crate::wifi::fingerprint::Fingerprint;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const COMPONENT: &str = "scan_scheduler";

pub struct ScanScheduler {
    noise_floor_dbm: i32,
    signal_bucket_dbm: i32,
    interval_detailed: Duration,
    interval_coarse: Duration,
    demand: AccuracyLevel,
    active: BTreeMap<String, AccessPoint>,
    ignored: BTreeMap<String, AccessPoint>,
}

impl ScanScheduler {
    pub fn new(config: &WifiConfig) -> Self {
        Self {
            noise_floor_dbm: config.noise_floor_dbm,
            signal_bucket_dbm: config.signal_bucket_dbm,
            interval_detailed: config.scan_interval_detailed(),
            interval_coarse: config.scan_interval_coarse(),
            demand: AccuracyLevel::None,
            active: BTreeMap::new(),
            ignored: BTreeMap::new(),
        }
    }

    pub fn set_demand(&mut self, demand: AccuracyLevel) {
        self.demand = demand;
    }

    pub fn demand(&self) -> AccuracyLevel {
        self.demand
    }

    pub fn scan_interval(&self) -> Duration {
        if self.demand >= AccuracyLevel::Street {
            self.interval_detailed
        } else {
            self.interval_coarse
        }
    }

    /// Replaces both sets with a completed scan; `true` if the fingerprint changed.
    pub fn apply_scan(&mut self, access_points: Vec<AccessPoint>) -> bool {
        let previous = self.fingerprint();
        self.active.clear();
        self.ignored.clear();
        for ap in access_points {
            self.track(ap);
        }
        previous != self.fingerprint()
    }

    pub fn apply_event(&mut self, event: ApEvent) -> bool {
        let previous = self.fingerprint();
        match event {
            ApEvent::Added(ap) => {
                let bssid = key(&ap.bssid);
                self.ignored.remove(&bssid);
                self.active.remove(&bssid);
                self.track(ap);
            }
            ApEvent::Removed { bssid } => {
                let bssid = key(&bssid);
                self.ignored.remove(&bssid);
                self.active.remove(&bssid);
            }
            ApEvent::SignalChanged { bssid, signal_dbm } => {
                self.update_signal(key(&bssid), signal_dbm);
            }
        }
        previous != self.fingerprint()
    }

    pub fn active_access_points(&self) -> Vec<AccessPoint> {
        self.active.values().cloned().collect()
    }

    pub fn ignored_count(&self) -> usize {
        self.ignored.len()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_access_points(self.active.values(), self.signal_bucket_dbm)
    }

    /// Re-files a known access point under its new signal, moving it across the floor.
    fn update_signal(&mut self, bssid: String, signal_dbm: i32) {
        let (mut ap, was_active) = if let Some(ap) = self.active.remove(&bssid) {
            (ap, true)
        } else if let Some(ap) = self.ignored.remove(&bssid) {
            (ap, false)
        } else {
            return;
        };
        ap.signal_dbm = signal_dbm;
        let bssid = ap.bssid.clone();
        let now_active = self.track(ap);
        if now_active && !was_active {
            debug!(
                event = events::WIFI_AP_PROMOTED,
                component = COMPONENT,
                bssid = %bssid,
                signal_dbm,
                "access point rose above noise floor"
            );
        } else if was_active && !now_active {
            debug!(
                event = events::WIFI_AP_DEMOTED,
                component = COMPONENT,
                bssid = %bssid,
                signal_dbm,
                "access point fell to noise floor"
            );
        }
    }

    /// Files `ap` into the right set; returns `true` if it went to the active set.
    fn track(&mut self, ap: AccessPoint) -> bool {
        let bssid = key(&ap.bssid);
        if ap.signal_dbm > self.noise_floor_dbm {
            self.active.insert(bssid, ap);
            true
        } else {
            self.ignored.insert(bssid, ap);
            false
        }
    }
}

fn key(bssid: &str) -> String {
    bssid.to_ascii_lowercase()
}
