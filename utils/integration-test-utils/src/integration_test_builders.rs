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

use geoclue_broker::{
    AccuracyLevel, Interface, InterfaceSet, Location, ProvideFlags, ProviderDescriptor,
    ResourceFlags,
};
use geoclue_broker::wifi::access_point::AccessPoint;
use std::time::{Duration, SystemTime};

pub fn location_at(latitude: f64, longitude: f64, accuracy_m: f64) -> Location {
    Location::new(latitude, longitude, accuracy_m)
}

/// A fix stamped `seconds` after a fixed epoch, for threshold tests.
pub fn location_at_time(latitude: f64, longitude: f64, seconds: u64) -> Location {
    Location::new(latitude, longitude, 10.0)
        .with_timestamp(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + seconds))
}

pub fn gps_descriptor(name: &str) -> ProviderDescriptor {
    ProviderDescriptor::new(name)
        .with_requires(ResourceFlags::GPS)
        .with_provides(ProvideFlags::PUSHES_UPDATES | ProvideFlags::DETAILED_ACCURACY)
        .with_accuracy(AccuracyLevel::Exact)
}

pub fn ip_descriptor(name: &str) -> ProviderDescriptor {
    ProviderDescriptor::new(name)
        .with_requires(ResourceFlags::NETWORK)
        .with_provides(ProvideFlags::FUZZY_ACCURACY)
        .with_accuracy(AccuracyLevel::Country)
}

pub fn wifi_descriptor(name: &str) -> ProviderDescriptor {
    ProviderDescriptor::new(name)
        .with_requires(ResourceFlags::NETWORK)
        .with_provides(ProvideFlags::PUSHES_UPDATES)
        .with_accuracy(AccuracyLevel::Street)
}

pub fn address_descriptor(name: &str) -> ProviderDescriptor {
    ProviderDescriptor::new(name)
        .with_requires(ResourceFlags::NETWORK)
        .with_interfaces(InterfaceSet::from_iter([Interface::Address]))
        .with_accuracy(AccuracyLevel::Street)
}

/// Renders a descriptor file in the key-file format the registry loads.
pub fn descriptor_text(name: &str, requires: &[&str], provides: &[&str], interfaces: &[&str]) -> String {
    format!(
        "[Geoclue Provider]\nName={name}\nService=org.freedesktop.Geoclue.Providers.{name}\nPath=/org/freedesktop/Geoclue/Providers/{name}\nRequires={}\nProvides={}\nInterfaces={}\n",
        requires.join(";"),
        provides.join(";"),
        interfaces.join(";"),
    )
}

pub fn access_points(count: usize, signal_dbm: i32) -> Vec<AccessPoint> {
    (0..count)
        .map(|index| AccessPoint::new(format!("00:11:22:33:44:{index:02x}"), signal_dbm))
        .collect()
}
