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

//! Outward per-session event stream.

use crate::accuracy::Interface;
use crate::location::{Address, Location};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

const COMPONENT: &str = "session_events";

/// Events a client observes on its session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "data")]
pub enum SessionEvent {
    /// The selected provider for `interface` changed. `None` means no provider matches.
    ProviderChanged {
        interface: Interface,
        old: Option<String>,
        new: Option<String>,
    },
    LocationChanged(Location),
    AddressChanged(Address),
    ActiveChanged(bool),
}

/// Broadcast fan-out owned by one session.
///
/// Emission never blocks the broker loop; receivers that fall more than the configured
/// capacity behind observe a lag instead.
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of receivers the event reached.
    pub fn emit(&self, event: SessionEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(component = COMPONENT, "no receivers attached; event dropped");
                0
            }
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
