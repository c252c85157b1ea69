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

mod support;

use geoclue_broker::sources::location_source::MemoryPressure;
use geoclue_broker::sources::web_source::FetchQuery;
use geoclue_broker::wifi::access_point::AccessPoint;
use geoclue_broker::wifi::wifi_source::WifiSource;
use geoclue_broker::{AccuracyLevel, AllowAll, BrokerConfig};
use integration_test_utils::{
    access_points, location_at, next_event, wifi_descriptor, CountingGeolocator, ScriptedScanner,
};
use std::sync::Arc;
use std::time::Duration;
use support::{latitude_of, provider_changed, started_session};

fn wifi_fixture() -> (Arc<WifiSource>, Arc<ScriptedScanner>, Arc<CountingGeolocator>) {
    let mut visible = access_points(3, -60);
    visible.push(AccessPoint::new("66:77:88:99:aa:bb", -95));
    let scanner = Arc::new(ScriptedScanner::new(visible));
    let geolocator = Arc::new(CountingGeolocator::new(location_at(59.33, 18.07, 40.0)));
    let source = Arc::new(WifiSource::new(
        "wifi",
        scanner.clone(),
        geolocator.clone(),
        &BrokerConfig::default().wifi,
        true,
    ));
    (source, scanner, geolocator)
}

#[tokio::test(start_paused = true)]
async fn wifi_fix_reaches_session_and_is_cached() {
    let (wifi, scanner, geolocator) = wifi_fixture();
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker.add_provider(wifi_descriptor("wifi"), wifi.clone()).expect("wifi should register");
    let running = support::spawn_broker(broker);

    let mut session = started_session(&running.handle, ":1.80", "org.example.Maps", AccuracyLevel::Street).await;
    assert_eq!(next_event(&mut session).await, provider_changed(None, Some("wifi")));
    assert_eq!(latitude_of(&next_event(&mut session).await), Some(59.33));
    assert_eq!(wifi.scan_demand(), AccuracyLevel::Street);

    // Unchanged rescans neither query the service nor publish again.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert!(scanner.scan_count() >= 3);
    assert_eq!(geolocator.fetch_count(), 1);
    assert!(session.try_recv_event().is_none());

    let queries = geolocator.queries();
    assert!(matches!(
        &queries[0],
        FetchQuery::Wifi { access_points } if access_points.len() == 3
    ));
    assert_eq!(wifi.cached_entries(), 1);

    let notified = running
        .handle
        .memory_pressure(MemoryPressure::Critical)
        .await
        .expect("memory pressure should be forwarded");
    assert_eq!(notified, 1);
    assert_eq!(wifi.cached_entries(), 0);
    running.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn losing_connectivity_deselects_and_recovery_serves_cache() {
    let (wifi, _scanner, geolocator) = wifi_fixture();
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker.add_provider(wifi_descriptor("wifi"), wifi.clone()).expect("wifi should register");
    let running = support::spawn_broker(broker);

    let mut session = started_session(&running.handle, ":1.81", "org.example.Maps", AccuracyLevel::Street).await;
    assert_eq!(next_event(&mut session).await, provider_changed(None, Some("wifi")));
    assert_eq!(latitude_of(&next_event(&mut session).await), Some(59.33));

    wifi.network_changed(false);
    assert_eq!(next_event(&mut session).await, provider_changed(Some("wifi"), None));
    running.handle.sync().await.expect("sync");
    assert!(session.try_recv_event().is_none());

    wifi.network_changed(true);
    assert_eq!(next_event(&mut session).await, provider_changed(None, Some("wifi")));
    assert_eq!(latitude_of(&next_event(&mut session).await), Some(59.33));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(geolocator.fetch_count(), 1);
    running.shutdown().await;
}
