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

//! # geoclue-broker
//!
//! `geoclue-broker` arbitrates between location providers of differing accuracy and
//! availability and relays the best admissible one to each client session.
//!
//! Typical usage is API-first and centered on [`Broker`], [`BrokerHandle`] and
//! [`SessionHandle`]. Providers are described by descriptor files, bound to
//! [`LocationSource`](sources::location_source::LocationSource) implementations, and
//! selected per session by accuracy, resources and update capability.
//!
//! ```
//! use std::sync::Arc;
//! use geoclue_broker::sources::static_source::StaticSource;
//! use geoclue_broker::{
//!     AccuracyLevel, AllowAll, Broker, BrokerConfig, Location, ProviderDescriptor,
//!     SessionEvent,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let mut broker = Broker::new(BrokerConfig::default(), Arc::new(AllowAll));
//! broker
//!     .add_provider(
//!         ProviderDescriptor::new("manual"),
//!         Arc::new(StaticSource::new(
//!             "manual",
//!             Location::new(52.52, 13.405, 50.0),
//!             AccuracyLevel::Street,
//!         )),
//!     )
//!     .unwrap();
//! let handle = broker.handle();
//! let runner = tokio::spawn(broker.run());
//!
//! let mut session = handle.create_session(":1.42").await.unwrap();
//! session.set_desktop_id("org.example.Maps").await.unwrap();
//! session.start().await.unwrap();
//!
//! assert_eq!(session.recv_event().await.unwrap(), SessionEvent::ActiveChanged(true));
//! assert!(matches!(
//!     session.recv_event().await.unwrap(),
//!     SessionEvent::ProviderChanged { new: Some(_), .. }
//! ));
//!
//! handle.shutdown();
//! runner.await.unwrap();
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - API facade: [`Broker`] loop plus cloneable [`BrokerHandle`] and per-client
//!   [`SessionHandle`]
//! - Control plane: provider descriptors and registry, session lifecycle and the
//!   authorization gate
//! - Routing: reselection trigger rule, per-session arbitration and threshold relay
//! - Data plane: subscription guards driving source activation and per-session event
//!   fan-out
//! - Sources: the location source capability, the shared source registry and the
//!   static, IP and Wi-Fi sources
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events/spans and does not unconditionally initialize a global
//! subscriber. Binaries and tests are responsible for one-time `tracing_subscriber`
//! initialization at process boundaries.

pub mod accuracy;
pub use accuracy::{AccuracyClass, AccuracyLevel, Interface, InterfaceSet, ProvideFlags, ResourceFlags};

pub mod location;
pub use location::{Address, Location};

pub mod config;
pub use config::{BrokerConfig, WifiConfig};

mod broker;
pub use broker::{Broker, BrokerError, BrokerHandle, SessionHandle, SessionSnapshot};

pub mod control_plane;
pub use control_plane::authorization::{
    AllowAll, AuthorizationDecision, AuthorizationPolicy, Authorizer, StaticAuthorizer,
};
pub use control_plane::descriptor::{DescriptorError, DescriptorSource, ProviderDescriptor};
pub use control_plane::provider_registry::RegistryError;
pub use control_plane::session_manager::{
    ResourceFlagsConfig, SessionError, SessionId, SessionRequirements,
};

mod data_plane;
pub use data_plane::session_events::SessionEvent;

#[doc(hidden)]
pub mod observability;
pub mod routing;
pub use routing::threshold::Thresholds;

pub mod sources;
pub mod wifi;
