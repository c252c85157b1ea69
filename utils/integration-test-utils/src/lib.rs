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

mod fake_source;
pub use fake_source::FakeSource;

mod fake_collaborators;
pub use fake_collaborators::{CountingGeolocator, ScriptedAuthorizer, ScriptedScanner};

mod integration_test_builders;
pub use integration_test_builders::{
    access_points, address_descriptor, descriptor_text, gps_descriptor, ip_descriptor,
    location_at, location_at_time, wifi_descriptor,
};

mod integration_test_utils;
pub use integration_test_utils::{drain_events, init_logging, next_event};
