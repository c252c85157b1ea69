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

//! Geolocation by public IP address.

use crate::accuracy::AccuracyLevel;
use crate::location::Location;
use crate::sources::location_source::{
    Activation, Deactivation, LocationSource, SourceError, SourceSink,
};
use crate::sources::web_source::{FetchQuery, WebGeolocator, WebSourceCore};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// IP geolocation source. Queries once per activation and again whenever connectivity
/// comes back while active.
pub struct IpSource {
    core: Arc<WebSourceCore>,
    accuracy: AccuracyLevel,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl IpSource {
    pub fn new(
        name: impl Into<String>,
        geolocator: Arc<dyn WebGeolocator>,
        network_available: bool,
    ) -> Self {
        Self {
            core: Arc::new(WebSourceCore::new(name, geolocator, network_available)),
            accuracy: AccuracyLevel::City,
            in_flight: Mutex::new(None),
        }
    }

    /// Overrides the accuracy class advertised while online.
    pub fn with_accuracy(mut self, accuracy: AccuracyLevel) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Connectivity notification from the network monitor collaborator.
    pub fn network_changed(&self, available: bool) {
        if !self.core.set_network_available(available) {
            return;
        }
        self.core.publish_accuracy(self.available_accuracy());
        if available && self.core.activation().is_active() {
            self.refresh();
        } else if !available {
            self.cancel_in_flight();
        }
    }

    fn refresh(&self) {
        let token = CancellationToken::new();
        let previous = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let core = self.core.clone();
        tokio::spawn(async move {
            if let Some(Ok(location)) = core.fetch(&FetchQuery::Ip { address: None }, &token).await {
                core.publish(location);
            }
        });
    }

    fn cancel_in_flight(&self) {
        if let Some(token) = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

impl LocationSource for IpSource {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn attach(&self, sink: SourceSink) {
        self.core.sink().attach(sink);
    }

    fn start(&self) -> Result<Activation, SourceError> {
        let activation = self.core.activation().acquire();
        if activation == Activation::Started && self.core.network_available() {
            self.refresh();
        }
        Ok(activation)
    }

    fn stop(&self) -> Result<Deactivation, SourceError> {
        let deactivation = self.core.activation().release()?;
        if deactivation == Deactivation::Stopped {
            self.cancel_in_flight();
        }
        Ok(deactivation)
    }

    fn available_accuracy(&self) -> AccuracyLevel {
        if self.core.network_available() {
            self.accuracy
        } else {
            AccuracyLevel::None
        }
    }

    fn current_location(&self) -> Option<Location> {
        self.core.last_location()
    }
}

#[cfg(test)]
mod tests {
    use super::IpSource;
    use crate::accuracy::AccuracyLevel;
    use crate::location::Location;
    use crate::sources::location_source::{LocationSource, ProviderStatus, SourceEvent, SourceSink};
    use crate::sources::web_source::{FetchError, FetchQuery, WebGeolocator};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct IpLookupStub {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WebGeolocator for IpLookupStub {
        async fn fetch(&self, query: &FetchQuery) -> Result<Location, FetchError> {
            assert_eq!(query, &FetchQuery::Ip { address: None });
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as f64;
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Location::new(40.0 + call, -3.7, 12_000.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_queries_once_and_publishes() {
        let geolocator = Arc::new(IpLookupStub::default());
        let source = IpSource::new("ip", geolocator.clone(), true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.attach(SourceSink::from_channel(tx));

        source.start().expect("start should succeed");
        source.start().expect("second consumer should share");

        let event = rx.recv().await.expect("a location should be published");
        assert!(matches!(event, SourceEvent::LocationChanged(location) if location.latitude == 40.0));
        assert_eq!(geolocator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.current_location().map(|l| l.latitude), Some(40.0));
    }

    #[tokio::test(start_paused = true)]
    async fn going_offline_reports_unavailable_and_back_online_refreshes() {
        let geolocator = Arc::new(IpLookupStub::default());
        let source = IpSource::new("ip", geolocator.clone(), true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.attach(SourceSink::from_channel(tx));
        source.start().expect("start should succeed");
        let _first = rx.recv().await;

        source.network_changed(false);
        assert_eq!(source.available_accuracy(), AccuracyLevel::None);
        assert_eq!(
            rx.recv().await,
            Some(SourceEvent::AccuracyChanged(AccuracyLevel::None))
        );
        assert_eq!(
            rx.recv().await,
            Some(SourceEvent::StatusChanged(ProviderStatus::Unavailable))
        );

        source.network_changed(true);
        assert_eq!(
            rx.recv().await,
            Some(SourceEvent::AccuracyChanged(AccuracyLevel::City))
        );
        assert_eq!(
            rx.recv().await,
            Some(SourceEvent::StatusChanged(ProviderStatus::Available))
        );
        assert!(matches!(
            rx.recv().await,
            Some(SourceEvent::LocationChanged(location)) if location.latitude == 41.0
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_last_consumer_cancels_pending_query() {
        let geolocator = Arc::new(IpLookupStub::default());
        let source = IpSource::new("ip", geolocator.clone(), true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.attach(SourceSink::from_channel(tx));

        source.start().expect("start should succeed");
        tokio::task::yield_now().await;
        source.stop().expect("stop should succeed");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
        assert!(source.stop().is_err());
    }
}
