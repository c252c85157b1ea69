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

use geoclue_broker::sources::location_source::ProviderStatus;
use geoclue_broker::{
    AccuracyLevel, AllowAll, Interface, InterfaceSet, ResourceFlags, SessionEvent,
    SessionRequirements,
};
use integration_test_utils::{
    address_descriptor, drain_events, gps_descriptor, ip_descriptor, location_at, next_event,
    FakeSource,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use support::{provider_changed, provider_changed_on, started_session};

#[tokio::test]
async fn session_falls_back_to_ip_when_gps_fails() {
    let gps = Arc::new(FakeSource::new("gps", AccuracyLevel::Exact).with_location(location_at(48.85, 2.35, 5.0)));
    let ip = Arc::new(FakeSource::new("ip", AccuracyLevel::Country).with_location(location_at(48.0, 2.0, 200_000.0)));
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker.add_provider(gps_descriptor("gps"), gps.clone()).expect("gps should register");
    broker.add_provider(ip_descriptor("ip"), ip.clone()).expect("ip should register");
    let running = support::spawn_broker(broker);

    let mut session = started_session(&running.handle, ":1.10", "org.example.Maps", AccuracyLevel::Country).await;
    assert_eq!(next_event(&mut session).await, provider_changed(None, Some("gps")));
    assert_eq!(support::latitude_of(&next_event(&mut session).await), Some(48.85));
    assert_eq!(ip.start_count(), 0);

    gps.set_status(ProviderStatus::Error);
    assert_eq!(next_event(&mut session).await, provider_changed(Some("gps"), Some("ip")));
    assert_eq!(support::latitude_of(&next_event(&mut session).await), Some(48.0));
    assert_eq!(gps.stop_count(), 1);
    assert_eq!(ip.start_count(), 1);

    let snapshot = session.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.position_provider.as_deref(), Some("ip"));
    running.shutdown().await;
}

#[tokio::test]
async fn lower_ranked_provider_flapping_is_invisible() {
    let gps = Arc::new(FakeSource::new("gps", AccuracyLevel::Exact));
    let ip = Arc::new(FakeSource::new("ip", AccuracyLevel::Country));
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker.add_provider(gps_descriptor("gps"), gps.clone()).expect("gps should register");
    broker.add_provider(ip_descriptor("ip"), ip.clone()).expect("ip should register");
    let running = support::spawn_broker(broker);

    let mut session = started_session(&running.handle, ":1.11", "org.example.Maps", AccuracyLevel::Country).await;
    assert_eq!(next_event(&mut session).await, provider_changed(None, Some("gps")));

    for _ in 0..3 {
        ip.set_status(ProviderStatus::Error);
        ip.set_status(ProviderStatus::Available);
    }
    running.handle.sync().await.expect("sync");
    assert!(drain_events(&mut session).is_empty());
    running.shutdown().await;
}

#[tokio::test]
async fn session_without_admissible_provider_stays_unselected() {
    let gps = Arc::new(FakeSource::new("gps", AccuracyLevel::Exact));
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker.add_provider(gps_descriptor("gps"), gps.clone()).expect("gps should register");
    let running = support::spawn_broker(broker);

    let mut session = running.handle.create_session(":1.12").await.expect("session");
    session.set_desktop_id("org.example.Weather").await.expect("desktop id");
    session
        .set_requirements(
            SessionRequirements::default().with_allowed_resources(ResourceFlags::NETWORK),
        )
        .await
        .expect("requirements");
    session.start().await.expect("start should succeed without a match");
    assert_eq!(next_event(&mut session).await, SessionEvent::ActiveChanged(true));

    let snapshot = session.snapshot().await.expect("snapshot");
    assert!(snapshot.active);
    assert_eq!(snapshot.position_provider, None);
    assert_eq!(gps.start_count(), 0);

    session.stop().await.expect("stop should succeed");
    assert_eq!(next_event(&mut session).await, SessionEvent::ActiveChanged(false));
    assert!(drain_events(&mut session).is_empty());
    session.stop().await.expect("stopping an inactive session is harmless");
    running.shutdown().await;
}

#[tokio::test]
async fn session_lowered_to_no_accuracy_stays_unselected() {
    let gps = Arc::new(FakeSource::new("gps", AccuracyLevel::Exact).with_location(location_at(60.17, 24.94, 5.0)));
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker.add_provider(gps_descriptor("gps"), gps.clone()).expect("gps should register");
    let running = support::spawn_broker(broker);

    let mut session = started_session(&running.handle, ":1.13", "org.example.Maps", AccuracyLevel::Exact).await;
    assert_eq!(next_event(&mut session).await, provider_changed(None, Some("gps")));
    assert_eq!(support::latitude_of(&next_event(&mut session).await), Some(60.17));

    session
        .set_requirements(SessionRequirements::default().with_accuracy(AccuracyLevel::None))
        .await
        .expect("requirements");
    assert_eq!(next_event(&mut session).await, provider_changed(Some("gps"), None));
    assert_eq!(gps.stop_count(), 1);

    gps.set_status(ProviderStatus::Error);
    gps.set_status(ProviderStatus::Available);
    running.handle.sync().await.expect("sync");
    assert!(drain_events(&mut session).is_empty());
    assert_eq!(gps.start_count(), 1);

    let snapshot = session.snapshot().await.expect("snapshot");
    assert!(snapshot.active);
    assert_eq!(snapshot.effective_accuracy, AccuracyLevel::None);
    assert_eq!(snapshot.position_provider, None);

    session
        .set_requirements(SessionRequirements::default().with_accuracy(AccuracyLevel::Street))
        .await
        .expect("requirements");
    assert_eq!(next_event(&mut session).await, provider_changed(None, Some("gps")));
    assert_eq!(gps.start_count(), 2);
    running.shutdown().await;
}

#[tokio::test]
async fn accuracy_downgrade_only_affects_sessions_that_need_it() {
    let wifi = Arc::new(FakeSource::new("wifi", AccuracyLevel::Exact));
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker
        .add_provider(geoclue_broker::ProviderDescriptor::new("wifi"), wifi.clone())
        .expect("wifi should register");
    let running = support::spawn_broker(broker);

    let mut street = started_session(&running.handle, ":1.20", "org.example.Nav", AccuracyLevel::Street).await;
    let mut city = started_session(&running.handle, ":1.21", "org.example.Weather", AccuracyLevel::City).await;
    assert_eq!(next_event(&mut street).await, provider_changed(None, Some("wifi")));
    assert_eq!(next_event(&mut city).await, provider_changed(None, Some("wifi")));
    assert_eq!(wifi.start_count(), 1);
    assert_eq!(wifi.required_accuracy(), AccuracyLevel::Street);

    wifi.set_accuracy(AccuracyLevel::City);
    running.handle.sync().await.expect("sync");

    assert_eq!(drain_events(&mut street), vec![provider_changed(Some("wifi"), None)]);
    assert!(drain_events(&mut city).is_empty());
    assert_eq!(wifi.required_accuracy(), AccuracyLevel::City);
    assert_eq!(wifi.stop_count(), 0);
    running.shutdown().await;
}

#[tokio::test]
async fn removing_selected_provider_moves_sessions_before_teardown() {
    let gps = Arc::new(FakeSource::new("gps", AccuracyLevel::Exact));
    let ip = Arc::new(FakeSource::new("ip", AccuracyLevel::Country));
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker.add_provider(gps_descriptor("gps"), gps.clone()).expect("gps should register");
    broker.add_provider(ip_descriptor("ip"), ip.clone()).expect("ip should register");
    let running = support::spawn_broker(broker);

    let mut session = started_session(&running.handle, ":1.30", "org.example.Maps", AccuracyLevel::Country).await;
    assert_eq!(next_event(&mut session).await, provider_changed(None, Some("gps")));

    running.handle.remove_provider("gps").await.expect("gps should be removed");
    assert_eq!(next_event(&mut session).await, provider_changed(Some("gps"), Some("ip")));
    assert_eq!(gps.stop_count(), 1);
    assert!(!gps.is_active());
    assert!(running.handle.remove_provider("gps").await.is_err());

    let replacement = Arc::new(FakeSource::new("gps-2", AccuracyLevel::Exact));
    running
        .handle
        .add_provider(gps_descriptor("gps-2"), replacement.clone())
        .await
        .expect("replacement should register");
    assert_eq!(next_event(&mut session).await, provider_changed(Some("ip"), Some("gps-2")));
    assert_eq!(ip.stop_count(), 1);
    running.shutdown().await;
}

#[tokio::test]
async fn shared_provider_starts_once_and_stops_with_last_session() {
    let gps = Arc::new(FakeSource::new("gps", AccuracyLevel::Exact));
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker.add_provider(gps_descriptor("gps"), gps.clone()).expect("gps should register");
    let running = support::spawn_broker(broker);

    let first = started_session(&running.handle, ":1.40", "org.example.A", AccuracyLevel::City).await;
    let second = started_session(&running.handle, ":1.41", "org.example.B", AccuracyLevel::Exact).await;
    assert_eq!(gps.start_count(), 1);
    assert_eq!(gps.required_accuracy(), AccuracyLevel::Exact);

    second.stop().await.expect("stop");
    assert_eq!(gps.stop_count(), 0);
    assert_eq!(gps.required_accuracy(), AccuracyLevel::City);

    assert!(running.handle.peer_vanished(":1.40").await.expect("peer vanished"));
    assert_eq!(gps.stop_count(), 1);
    assert_eq!(
        first.snapshot().await,
        Err(geoclue_broker::BrokerError::Session(geoclue_broker::SessionError::NotFound))
    );
    running.shutdown().await;
}

#[tokio::test]
async fn address_interface_is_opt_in() {
    let gps = Arc::new(FakeSource::new("gps", AccuracyLevel::Exact));
    let geocoder = Arc::new(FakeSource::new("geocoder", AccuracyLevel::Street));
    let mut broker = support::make_broker(Arc::new(AllowAll));
    broker.add_provider(gps_descriptor("gps"), gps.clone()).expect("gps should register");
    broker
        .add_provider(address_descriptor("geocoder"), geocoder.clone())
        .expect("geocoder should register");
    let running = support::spawn_broker(broker);

    let mut session = started_session(&running.handle, ":1.50", "org.example.Maps", AccuracyLevel::City).await;
    assert_eq!(next_event(&mut session).await, provider_changed(None, Some("gps")));
    assert_eq!(geocoder.start_count(), 0);

    session
        .set_interfaces(InterfaceSet::from_iter([Interface::Position, Interface::Address]))
        .await
        .expect("interfaces");
    assert_eq!(
        next_event(&mut session).await,
        provider_changed_on(Interface::Address, None, Some("geocoder"))
    );

    let address = geoclue_broker::Address::new(
        BTreeMap::from([("locality".to_string(), "Helsinki".to_string())]),
        100.0,
    );
    geocoder.push_address(address.clone());
    assert_eq!(next_event(&mut session).await, SessionEvent::AddressChanged(address));

    session
        .set_interfaces(InterfaceSet::position_only())
        .await
        .expect("interfaces");
    running.handle.sync().await.expect("sync");
    assert_eq!(geocoder.stop_count(), 1);
    assert!(drain_events(&mut session).is_empty());
    running.shutdown().await;
}
