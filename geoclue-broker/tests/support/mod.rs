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

#![allow(dead_code)]

use geoclue_broker::{
    AccuracyLevel, Broker, BrokerConfig, BrokerHandle, Interface, SessionEvent, SessionHandle,
    SessionRequirements,
};
use integration_test_utils::next_event;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub(crate) struct RunningBroker {
    pub(crate) handle: BrokerHandle,
    runner: JoinHandle<()>,
}

impl RunningBroker {
    pub(crate) async fn shutdown(self) {
        self.handle.shutdown();
        self.runner.await.expect("broker loop should stop cleanly");
    }
}

pub(crate) fn make_broker(authorizer: Arc<dyn geoclue_broker::Authorizer>) -> Broker {
    integration_test_utils::init_logging();
    Broker::new(BrokerConfig::default(), authorizer)
}

pub(crate) fn spawn_broker(broker: Broker) -> RunningBroker {
    let handle = broker.handle();
    let runner = tokio::spawn(broker.run());
    RunningBroker { handle, runner }
}

/// Creates, configures and starts a session, consuming its `ActiveChanged(true)`.
pub(crate) async fn started_session(
    handle: &BrokerHandle,
    peer: &str,
    desktop_id: &str,
    accuracy: AccuracyLevel,
) -> SessionHandle {
    let mut session = handle
        .create_session(peer)
        .await
        .expect("session creation should succeed");
    session
        .set_desktop_id(desktop_id)
        .await
        .expect("desktop id should be accepted");
    session
        .set_requirements(SessionRequirements::default().with_accuracy(accuracy))
        .await
        .expect("requirements should be accepted");
    session.start().await.expect("start should succeed");
    assert_eq!(next_event(&mut session).await, SessionEvent::ActiveChanged(true));
    session
}

pub(crate) fn provider_changed(old: Option<&str>, new: Option<&str>) -> SessionEvent {
    provider_changed_on(Interface::Position, old, new)
}

pub(crate) fn provider_changed_on(
    interface: Interface,
    old: Option<&str>,
    new: Option<&str>,
) -> SessionEvent {
    SessionEvent::ProviderChanged {
        interface,
        old: old.map(str::to_string),
        new: new.map(str::to_string),
    }
}

pub(crate) fn latitude_of(event: &SessionEvent) -> Option<f64> {
    match event {
        SessionEvent::LocationChanged(location) => Some(location.latitude),
        _ => None,
    }
}
