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

//! Shared plumbing for sources backed by a web geolocation service.
//!
//! [`WebSourceCore`] is composed into concrete sources (IP, Wi-Fi). It owns connectivity
//! gating, the activation refcount, the event sink and cancellable fetches, so the
//! concrete source only decides *what* to query and *when*.

use crate::accuracy::AccuracyLevel;
use crate::location::Location;
use crate::observability::events;
use crate::sources::location_source::{
    ActivationCounter, ProviderStatus, SinkSlot, SourceEvent,
};
use crate::wifi::access_point::AccessPoint;
use async_trait::async_trait;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const COMPONENT: &str = "web_source";

/// What to ask the geolocation service about.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchQuery {
    /// Geolocate an IP address; `None` means the caller's public address.
    Ip { address: Option<IpAddr> },
    /// Geolocate from visible access points (already filtered above the noise floor).
    Wifi { access_points: Vec<AccessPoint> },
}

impl FetchQuery {
    fn kind(&self) -> &'static str {
        match self {
            FetchQuery::Ip { .. } => "ip",
            FetchQuery::Wifi { .. } => "wifi",
        }
    }
}

/// Geolocation service failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FetchError {
    InvalidArgument(String),
    NoMatch,
    ServerError(String),
    NetworkError(String),
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidArgument(detail) => write!(f, "invalid query: {}", detail),
            FetchError::NoMatch => write!(f, "service has no match for the query"),
            FetchError::ServerError(detail) => write!(f, "service error: {}", detail),
            FetchError::NetworkError(detail) => write!(f, "network error: {}", detail),
        }
    }
}

impl std::error::Error for FetchError {}

/// External web geolocation collaborator.
#[async_trait]
pub trait WebGeolocator: Send + Sync {
    async fn fetch(&self, query: &FetchQuery) -> Result<Location, FetchError>;
}

/// Connectivity-gated fetch helper shared by web-backed sources.
pub struct WebSourceCore {
    name: String,
    geolocator: Arc<dyn WebGeolocator>,
    network_available: AtomicBool,
    last_location: Mutex<Option<Location>>,
    activation: ActivationCounter,
    sink: SinkSlot,
}

impl WebSourceCore {
    pub fn new(
        name: impl Into<String>,
        geolocator: Arc<dyn WebGeolocator>,
        network_available: bool,
    ) -> Self {
        Self {
            name: name.into(),
            geolocator,
            network_available: AtomicBool::new(network_available),
            last_location: Mutex::new(None),
            activation: ActivationCounter::default(),
            sink: SinkSlot::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn activation(&self) -> &ActivationCounter {
        &self.activation
    }

    pub fn sink(&self) -> &SinkSlot {
        &self.sink
    }

    pub fn network_available(&self) -> bool {
        self.network_available.load(Ordering::SeqCst)
    }

    /// Records connectivity; returns `true` if it changed.
    pub fn set_network_available(&self, available: bool) -> bool {
        let previous = self.network_available.swap(available, Ordering::SeqCst);
        if previous != available {
            debug!(
                event = events::WEB_NETWORK_CHANGED,
                component = COMPONENT,
                source = %self.name,
                available,
                "connectivity changed"
            );
        }
        previous != available
    }

    /// Pushes the accuracy/status pair matching `level` to consumers.
    pub fn publish_accuracy(&self, level: AccuracyLevel) {
        let status = if level > AccuracyLevel::None {
            ProviderStatus::Available
        } else {
            ProviderStatus::Unavailable
        };
        self.sink.emit(SourceEvent::AccuracyChanged(level));
        self.sink.emit(SourceEvent::StatusChanged(status));
    }

    /// Stores `location` as the latest value and forwards it.
    pub fn publish(&self, location: Location) {
        *self
            .last_location
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(location.clone());
        self.sink.emit(SourceEvent::LocationChanged(location));
    }

    pub fn last_location(&self) -> Option<Location> {
        self.last_location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one fetch unless `token` fires first.
    ///
    /// Returns `None` when cancelled or offline; the result of a cancelled fetch is
    /// discarded rather than reported as a failure. Failures are logged here so callers
    /// simply skip the cycle.
    pub async fn fetch(
        &self,
        query: &FetchQuery,
        token: &CancellationToken,
    ) -> Option<Result<Location, FetchError>> {
        if !self.network_available() {
            debug!(
                event = events::WEB_FETCH_CANCELLED,
                component = COMPONENT,
                source = %self.name,
                query = query.kind(),
                reason = "offline",
                "skipping fetch while offline"
            );
            return None;
        }

        debug!(
            event = events::WEB_FETCH_START,
            component = COMPONENT,
            source = %self.name,
            query = query.kind(),
            "issuing geolocation query"
        );

        let result = tokio::select! {
            _ = token.cancelled() => None,
            result = self.geolocator.fetch(query) => Some(result),
        };

        match &result {
            None => debug!(
                event = events::WEB_FETCH_CANCELLED,
                component = COMPONENT,
                source = %self.name,
                query = query.kind(),
                "discarding cancelled geolocation query"
            ),
            Some(Ok(_)) if token.is_cancelled() => {
                debug!(
                    event = events::WEB_FETCH_CANCELLED,
                    component = COMPONENT,
                    source = %self.name,
                    query = query.kind(),
                    "discarding result that raced cancellation"
                );
                return None;
            }
            Some(Ok(location)) => debug!(
                event = events::WEB_FETCH_OK,
                component = COMPONENT,
                source = %self.name,
                query = query.kind(),
                accuracy = location.accuracy,
                "geolocation query resolved"
            ),
            Some(Err(err)) => warn!(
                event = events::WEB_FETCH_FAILED,
                component = COMPONENT,
                source = %self.name,
                query = query.kind(),
                err = %err,
                "geolocation query failed; skipping this cycle"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchError, FetchQuery, WebGeolocator, WebSourceCore};
    use crate::location::Location;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct SlowGeolocator {
        calls: AtomicUsize,
        delay: Duration,
        result: Result<Location, FetchError>,
    }

    #[async_trait]
    impl WebGeolocator for SlowGeolocator {
        async fn fetch(&self, _query: &FetchQuery) -> Result<Location, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    fn core(result: Result<Location, FetchError>, online: bool) -> (Arc<SlowGeolocator>, WebSourceCore) {
        let geolocator = Arc::new(SlowGeolocator {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            result,
        });
        let core = WebSourceCore::new("web", geolocator.clone(), online);
        (geolocator, core)
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_returns_service_result() {
        let (_, core) = core(Ok(Location::new(10.0, 20.0, 3_000.0)), true);
        let token = CancellationToken::new();

        let result = core.fetch(&FetchQuery::Ip { address: None }, &token).await;
        assert_eq!(
            result.and_then(Result::ok).map(|location| location.latitude),
            Some(10.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn offline_fetch_is_skipped_without_calling_service() {
        let (geolocator, core) = core(Err(FetchError::NoMatch), false);

        let result = core
            .fetch(&FetchQuery::Ip { address: None }, &CancellationToken::new())
            .await;
        assert!(result.is_none());
        assert_eq!(geolocator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_fetch_is_discarded() {
        let (_, core) = core(Ok(Location::new(1.0, 1.0, 1.0)), true);
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        let result = core.fetch(&FetchQuery::Ip { address: None }, &token).await;
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_surface_to_caller() {
        let (_, core) = core(Err(FetchError::ServerError("503".into())), true);

        let result = core
            .fetch(&FetchQuery::Ip { address: None }, &CancellationToken::new())
            .await;
        assert_eq!(result, Some(Err(FetchError::ServerError("503".into()))));
    }

    #[test]
    fn network_toggle_reports_changes_only() {
        let (_, core) = core(Err(FetchError::NoMatch), true);
        assert!(!core.set_network_available(true));
        assert!(core.set_network_available(false));
        assert!(!core.network_available());
    }
}
