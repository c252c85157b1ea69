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

//! Wi-Fi location source: scan loop, debounce and cached web lookups.
//!
//! While at least one consumer holds the source active, a single task owns the scan
//! loop. It scans, arms a settle timer whenever the active AP set changes, and on
//! expiry resolves the current fingerprint from the cache or through one web query.
//! A change in consumer demand reschedules the pending scan relative to the last one.
//! At most one query per fingerprint is in flight; repeated refreshes for the same
//! fingerprint are absorbed. Scan failures end scanning until the source is restarted.

use crate::accuracy::AccuracyLevel;
use crate::config::WifiConfig;
use crate::location::Location;
use crate::observability::events;
use crate::sources::location_source::{
    Activation, Deactivation, LocationSource, MemoryPressure, SourceError, SourceSink,
};
use crate::sources::web_source::{FetchError, FetchQuery, WebGeolocator, WebSourceCore};
use crate::wifi::access_point::{ApEvent, WifiScanner};
use crate::wifi::cache::WifiCache;
use crate::wifi::fingerprint::Fingerprint;
use crate::wifi::scan_scheduler::ScanScheduler;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMPONENT: &str = "wifi_source";

struct FetchCompletion {
    fingerprint: Fingerprint,
    result: Option<Result<Location, FetchError>>,
}

struct WifiInner {
    web: WebSourceCore,
    scanner: Arc<dyn WifiScanner>,
    scheduler: Mutex<ScanScheduler>,
    cache: Mutex<WifiCache>,
    ap_changed: Notify,
    demand_changed: Notify,
    config: WifiConfig,
}

impl WifiInner {
    fn scheduler(&self) -> std::sync::MutexGuard<'_, ScanScheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, WifiCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves the current fingerprint; spawns a query on a cache miss.
    fn refresh(
        self: &Arc<Self>,
        in_flight: &mut HashSet<Fingerprint>,
        completions: &mpsc::UnboundedSender<FetchCompletion>,
        token: &CancellationToken,
    ) {
        let (fingerprint, access_points) = {
            let scheduler = self.scheduler();
            (scheduler.fingerprint(), scheduler.active_access_points())
        };
        if fingerprint.is_empty() {
            debug!(
                event = events::WIFI_REFRESH_SKIPPED,
                component = COMPONENT,
                source = %self.web.name(),
                reason = "no_usable_access_points",
                "nothing to geolocate"
            );
            return;
        }

        let cached = self.cache().lookup(&fingerprint, Instant::now());
        if let Some(location) = cached {
            debug!(
                event = events::WIFI_CACHE_HIT,
                component = COMPONENT,
                source = %self.web.name(),
                fingerprint = %fingerprint,
                "serving cached location"
            );
            self.web.publish(location);
            return;
        }

        if !in_flight.insert(fingerprint.clone()) {
            debug!(
                event = events::WIFI_FETCH_COALESCED,
                component = COMPONENT,
                source = %self.web.name(),
                fingerprint = %fingerprint,
                "query for this fingerprint already in flight"
            );
            return;
        }

        debug!(
            event = events::WIFI_CACHE_MISS,
            component = COMPONENT,
            source = %self.web.name(),
            fingerprint = %fingerprint,
            access_points = access_points.len(),
            "querying geolocation service"
        );
        let inner = self.clone();
        let completions = completions.clone();
        let token = token.child_token();
        tokio::spawn(async move {
            let query = FetchQuery::Wifi { access_points };
            let result = inner.web.fetch(&query, &token).await;
            let _ = completions.send(FetchCompletion {
                fingerprint,
                result,
            });
        });
    }

    fn complete(&self, in_flight: &mut HashSet<Fingerprint>, completion: FetchCompletion) {
        in_flight.remove(&completion.fingerprint);
        // Failures and cancellations are already logged by the web core; the previous
        // value stays in place.
        if let Some(Ok(location)) = completion.result {
            self.cache()
                .insert(completion.fingerprint, location.clone(), Instant::now());
            self.web.publish(location);
        }
    }

    fn prune(&self) {
        let removed = self.cache().prune(Instant::now());
        if removed > 0 {
            debug!(
                event = events::WIFI_CACHE_PRUNE,
                component = COMPONENT,
                source = %self.web.name(),
                removed,
                "pruned expired cache entries"
            );
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_scan_loop(inner: Arc<WifiInner>, token: CancellationToken) {
    info!(
        event = events::WIFI_LOOP_START,
        component = COMPONENT,
        source = %inner.web.name(),
        "wifi scan loop started"
    );

    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();
    let mut in_flight: HashSet<Fingerprint> = HashSet::new();
    let mut scan_at = Some(Instant::now());
    let mut last_scan: Option<Instant> = None;
    let mut settle_at: Option<Instant> = None;
    let prune_interval = inner.config.prune_interval();
    let mut prune = tokio::time::interval_at(Instant::now() + prune_interval, prune_interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep_until(scan_at) => {
                scan_at = None;
                last_scan = Some(Instant::now());
                let scanned = tokio::select! {
                    _ = token.cancelled() => break,
                    scanned = inner.scanner.scan() => scanned,
                };
                match scanned {
                    Ok(access_points) => {
                        let seen = access_points.len();
                        let (changed, interval) = {
                            let mut scheduler = inner.scheduler();
                            (scheduler.apply_scan(access_points), scheduler.scan_interval())
                        };
                        debug!(
                            event = events::WIFI_SCAN_OK,
                            component = COMPONENT,
                            source = %inner.web.name(),
                            seen,
                            changed,
                            next_scan_s = interval.as_secs(),
                            "scan completed"
                        );
                        if changed {
                            settle_at = Some(Instant::now() + inner.config.settle_delay());
                        }
                        scan_at = Some(Instant::now() + interval);
                    }
                    Err(err) => {
                        warn!(
                            event = events::WIFI_SCAN_FAILED,
                            component = COMPONENT,
                            source = %inner.web.name(),
                            err = %err,
                            "scan failed; no further scans until restart"
                        );
                    }
                }
            }
            _ = inner.demand_changed.notified() => {
                // A failed scanner stays stopped.
                if let (Some(last), Some(_)) = (last_scan, scan_at) {
                    scan_at = Some(last + inner.scheduler().scan_interval());
                }
            }
            _ = inner.ap_changed.notified() => {
                settle_at = Some(Instant::now() + inner.config.settle_delay());
            }
            _ = sleep_until(settle_at) => {
                settle_at = None;
                inner.refresh(&mut in_flight, &completion_tx, &token);
            }
            Some(completion) = completion_rx.recv() => {
                inner.complete(&mut in_flight, completion);
            }
            _ = prune.tick() => inner.prune(),
        }
    }

    info!(
        event = events::WIFI_LOOP_STOP,
        component = COMPONENT,
        source = %inner.web.name(),
        abandoned_queries = in_flight.len(),
        "wifi scan loop stopped"
    );
}

/// Wi-Fi backed [`LocationSource`].
pub struct WifiSource {
    inner: Arc<WifiInner>,
    running: Mutex<Option<CancellationToken>>,
}

impl WifiSource {
    pub fn new(
        name: impl Into<String>,
        scanner: Arc<dyn WifiScanner>,
        geolocator: Arc<dyn WebGeolocator>,
        config: &WifiConfig,
        network_available: bool,
    ) -> Self {
        Self {
            inner: Arc::new(WifiInner {
                web: WebSourceCore::new(name, geolocator, network_available),
                scanner,
                scheduler: Mutex::new(ScanScheduler::new(config)),
                cache: Mutex::new(WifiCache::new(config.cache_max_age())),
                ap_changed: Notify::new(),
                demand_changed: Notify::new(),
                config: config.clone(),
            }),
            running: Mutex::new(None),
        }
    }

    /// Per-AP notification from the Wi-Fi backend.
    pub fn notify_access_point(&self, event: ApEvent) {
        let changed = self.inner.scheduler().apply_event(event);
        if changed {
            self.inner.ap_changed.notify_one();
        }
    }

    /// Connectivity notification from the network monitor collaborator.
    pub fn network_changed(&self, available: bool) {
        if self.inner.web.set_network_available(available) {
            self.inner.web.publish_accuracy(self.available_accuracy());
            if available {
                self.inner.ap_changed.notify_one();
            }
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.inner.cache().len()
    }

    pub fn scan_demand(&self) -> AccuracyLevel {
        self.inner.scheduler().demand()
    }
}

impl LocationSource for WifiSource {
    fn name(&self) -> &str {
        self.inner.web.name()
    }

    fn attach(&self, sink: SourceSink) {
        self.inner.web.sink().attach(sink);
    }

    fn start(&self) -> Result<Activation, SourceError> {
        let activation = self.inner.web.activation().acquire();
        if activation == Activation::Started {
            let token = CancellationToken::new();
            let previous = self
                .running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .replace(token.clone());
            if let Some(previous) = previous {
                previous.cancel();
            }
            tokio::spawn(run_scan_loop(self.inner.clone(), token));
        }
        Ok(activation)
    }

    fn stop(&self) -> Result<Deactivation, SourceError> {
        let deactivation = self.inner.web.activation().release()?;
        if deactivation == Deactivation::Stopped {
            if let Some(token) = self
                .running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                token.cancel();
            }
        }
        Ok(deactivation)
    }

    fn available_accuracy(&self) -> AccuracyLevel {
        if self.inner.web.network_available() {
            AccuracyLevel::Street
        } else {
            AccuracyLevel::None
        }
    }

    fn current_location(&self) -> Option<Location> {
        self.inner.web.last_location()
    }

    fn set_required_accuracy(&self, level: AccuracyLevel) {
        let (before, after) = {
            let mut scheduler = self.inner.scheduler();
            let before = scheduler.scan_interval();
            scheduler.set_demand(level);
            (before, scheduler.scan_interval())
        };
        if before != after {
            debug!(
                event = events::WIFI_DEMAND_CHANGED,
                component = COMPONENT,
                source = %self.inner.web.name(),
                demand = %level,
                next_scan_s = after.as_secs(),
                "scan cadence follows new demand"
            );
            self.inner.demand_changed.notify_one();
        }
    }

    fn on_memory_pressure(&self, level: MemoryPressure) {
        match level {
            MemoryPressure::Moderate => self.inner.prune(),
            MemoryPressure::Critical => {
                let removed = self.inner.cache().clear();
                info!(
                    event = events::WIFI_CACHE_CLEAR,
                    component = COMPONENT,
                    source = %self.inner.web.name(),
                    removed,
                    "cleared location cache under memory pressure"
                );
            }
        }
    }
}

impl Drop for WifiSource {
    fn drop(&mut self) {
        if let Some(token) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}
