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

use async_trait::async_trait;
use geoclue_broker::sources::web_source::{FetchError, FetchQuery, WebGeolocator};
use geoclue_broker::wifi::access_point::{AccessPoint, ScanError, WifiScanner};
use geoclue_broker::{AccuracyLevel, AuthorizationDecision, Authorizer, Location};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// [`Authorizer`] answering from a per-application table, optionally after a delay.
pub struct ScriptedAuthorizer {
    default: AuthorizationDecision,
    decisions: Mutex<HashMap<String, AuthorizationDecision>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedAuthorizer {
    pub fn new(default: AuthorizationDecision) -> Self {
        Self {
            default,
            decisions: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_decision(self, desktop_id: &str, decision: AuthorizationDecision) -> Self {
        self.set_decision(desktop_id, decision);
        self
    }

    /// Answers only after `delay`; pair with paused time to test cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_decision(&self, desktop_id: &str, decision: AuthorizationDecision) {
        self.decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(desktop_id.to_string(), decision);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for ScriptedAuthorizer {
    async fn authorize(&self, desktop_id: &str, requested: AccuracyLevel) -> AuthorizationDecision {
        self.calls.fetch_add(1, Ordering::SeqCst);
        debug!("authorize {desktop_id} at {requested}");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(desktop_id)
            .copied()
            .unwrap_or(self.default)
    }
}

/// [`WebGeolocator`] that records every query and answers with a fixed location unless
/// a failure was scripted for the next call.
pub struct CountingGeolocator {
    location: Location,
    scripted: Mutex<VecDeque<FetchError>>,
    queries: Mutex<Vec<FetchQuery>>,
}

impl CountingGeolocator {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            scripted: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, err: FetchError) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    pub fn fetch_count(&self) -> usize {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn queries(&self) -> Vec<FetchQuery> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl WebGeolocator for CountingGeolocator {
    async fn fetch(&self, query: &FetchQuery) -> Result<Location, FetchError> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.clone());
        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match scripted {
            Some(err) => Err(err),
            None => Ok(self.location.clone()),
        }
    }
}

/// [`WifiScanner`] replaying scripted results; the last successful scan repeats once
/// the script runs out.
pub struct ScriptedScanner {
    script: Mutex<VecDeque<Result<Vec<AccessPoint>, ScanError>>>,
    last: Mutex<Vec<AccessPoint>>,
    scans: AtomicUsize,
}

impl ScriptedScanner {
    pub fn new(access_points: Vec<AccessPoint>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(access_points),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn push_result(&self, result: Result<Vec<AccessPoint>, ScanError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WifiScanner for ScriptedScanner {
    async fn scan(&self) -> Result<Vec<AccessPoint>, ScanError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(access_points)) => {
                *self.last.lock().unwrap_or_else(PoisonError::into_inner) = access_points.clone();
                Ok(access_points)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self
                .last
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()),
        }
    }
}
