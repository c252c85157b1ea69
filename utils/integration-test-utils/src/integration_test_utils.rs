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

use geoclue_broker::{SessionEvent, SessionHandle};
use std::time::Duration;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const EVENT_WAIT: Duration = Duration::from_secs(5);

/// Installs a test-writer subscriber once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits for the next session event, panicking if none arrives in time.
pub async fn next_event(session: &mut SessionHandle) -> SessionEvent {
    timeout(EVENT_WAIT, session.recv_event())
        .await
        .expect("timed out waiting for a session event")
        .expect("broker closed the session event stream")
}

/// Collects every event already queued on the session.
pub fn drain_events(session: &mut SessionHandle) -> Vec<SessionEvent> {
    std::iter::from_fn(|| session.try_recv_event()).collect()
}
