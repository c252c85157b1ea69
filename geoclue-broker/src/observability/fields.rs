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

//! Canonical structured field keys and value-format helpers.

use crate::location::Location;

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const PROVIDER: &str = "provider";
pub const SESSION: &str = "session";
pub const PEER: &str = "peer";
pub const DESKTOP_ID: &str = "desktop_id";
pub const INTERFACE: &str = "interface";
pub const FINGERPRINT: &str = "fingerprint";
pub const REF_COUNT: &str = "ref_count";
pub const REASON: &str = "reason";
pub const ERR: &str = "err";

pub const NONE: &str = "none";
pub const REASON_ALREADY_ACTIVE: &str = "already_active";
pub const REASON_NO_DESKTOP_ID: &str = "no_desktop_id";
pub const REASON_AUTHORIZATION_REVOKED: &str = "authorization_revoked";
pub const REASON_PROVIDER_REMOVED: &str = "provider_removed";
pub const REASON_STALE_COMPLETION: &str = "stale_completion";

/// Formats an optional provider name, falling back to [`NONE`].
pub fn format_optional_name(name: Option<&str>) -> String {
    name.unwrap_or(NONE).to_string()
}

/// Compact `lat,lon ±accuracy` rendering used in relay logs.
pub fn format_location(location: &Location) -> String {
    format!(
        "{:.6},{:.6} ±{:.0}m",
        location.latitude, location.longitude, location.accuracy
    )
}

#[cfg(test)]
mod tests {
    use super::{format_location, format_optional_name, NONE};
    use crate::location::Location;

    #[test]
    fn format_optional_name_falls_back_when_absent() {
        assert_eq!(format_optional_name(None), NONE);
        assert_eq!(format_optional_name(Some("gps")), "gps");
    }

    #[test]
    fn format_location_is_compact() {
        let location = Location::new(48.8566, 2.3522, 25.4);
        assert_eq!(format_location(&location), "48.856600,2.352200 ±25m");
    }
}
