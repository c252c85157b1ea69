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

//! Accuracy levels and the capability flag sets providers advertise.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Radius, in meters, at or below which a fix counts as street level.
pub const RADIUS_STREET_M: f64 = 1_000.0;
/// Radius, in meters, at or below which a fix counts as city level.
pub const RADIUS_CITY_M: f64 = 15_000.0;
/// Radius, in meters, at or below which a regional fix still counts as neighborhood level.
pub const RADIUS_REGION_M: f64 = 50_000.0;
/// Radius, in meters, at or below which a fix counts as country level.
pub const RADIUS_COUNTRY_M: f64 = 300_000.0;

/// Ordered coarseness classification of a fix.
///
/// The derived ordering is the ranking used everywhere: `None < Country < City <
/// Neighborhood < Street < Exact`. Discriminants are the stable wire values.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyLevel {
    #[default]
    None = 0,
    Country = 1,
    City = 4,
    Neighborhood = 5,
    Street = 6,
    Exact = 8,
}

impl AccuracyLevel {
    pub const ALL: [AccuracyLevel; 6] = [
        AccuracyLevel::None,
        AccuracyLevel::Country,
        AccuracyLevel::City,
        AccuracyLevel::Neighborhood,
        AccuracyLevel::Street,
        AccuracyLevel::Exact,
    ];

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Maps a wire value back to a level. Unknown values yield `None`.
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_u32() == value)
    }

    /// Classifies an accuracy radius in meters.
    pub fn from_radius(radius_m: f64) -> Self {
        if !radius_m.is_finite() || radius_m < 0.0 {
            AccuracyLevel::None
        } else if radius_m <= RADIUS_STREET_M {
            AccuracyLevel::Street
        } else if radius_m <= RADIUS_CITY_M {
            AccuracyLevel::City
        } else if radius_m <= RADIUS_REGION_M {
            AccuracyLevel::Neighborhood
        } else if radius_m <= RADIUS_COUNTRY_M {
            AccuracyLevel::Country
        } else {
            AccuracyLevel::None
        }
    }

    /// The accuracy class a requirement at this level demands from a provider.
    pub fn required_class(self) -> Option<AccuracyClass> {
        match self {
            AccuracyLevel::None => None,
            AccuracyLevel::Street | AccuracyLevel::Exact => Some(AccuracyClass::Detailed),
            _ => Some(AccuracyClass::Fuzzy),
        }
    }

    fn name(self) -> &'static str {
        match self {
            AccuracyLevel::None => "none",
            AccuracyLevel::Country => "country",
            AccuracyLevel::City => "city",
            AccuracyLevel::Neighborhood => "neighborhood",
            AccuracyLevel::Street => "street",
            AccuracyLevel::Exact => "exact",
        }
    }
}

impl Display for AccuracyLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AccuracyLevel {
    type Err = UnknownAccuracyLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownAccuracyLevel(trimmed.to_string()))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownAccuracyLevel(pub String);

impl Display for UnknownAccuracyLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown accuracy level: {}", self.0)
    }
}

impl std::error::Error for UnknownAccuracyLevel {}

/// Accuracy guarantee class. `Detailed` satisfies a `Fuzzy` requirement, never the reverse.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AccuracyClass {
    Fuzzy,
    Detailed,
}

macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($flag:ident = $bit:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
        pub struct $name(u8);

        impl $name {
            $(pub const $flag: $name = $name($bit);)+

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn bits(self) -> u8 {
                self.0
            }

            pub const fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            /// `true` when every flag in `self` is also present in `other`.
            pub const fn is_subset_of(self, other: $name) -> bool {
                self.0 & !other.0 == 0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }
        }

        impl BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                let mut set = f.debug_set();
                $(if self.contains($name::$flag) {
                    set.entry(&stringify!($flag));
                })+
                set.finish()
            }
        }
    };
}

flag_set! {
    /// Inputs a provider consumes. Sessions restrict these through `allowed_resources`.
    ResourceFlags {
        NETWORK = 0b01,
        GPS = 0b10,
    }
}

impl ResourceFlags {
    pub const ALL: ResourceFlags = ResourceFlags(0b11);
}

flag_set! {
    /// Guarantees a provider offers.
    ProvideFlags {
        PUSHES_UPDATES = 0b001,
        DETAILED_ACCURACY = 0b010,
        FUZZY_ACCURACY = 0b100,
    }
}

impl ProvideFlags {
    /// The single accuracy class this provider contributes to a selection pass.
    ///
    /// Declaring both classes resolves to `Detailed`. Declaring neither yields `None` and
    /// the caller derives the class from the live accuracy level.
    pub fn declared_class(self) -> Option<AccuracyClass> {
        if self.contains(ProvideFlags::DETAILED_ACCURACY) {
            Some(AccuracyClass::Detailed)
        } else if self.contains(ProvideFlags::FUZZY_ACCURACY) {
            Some(AccuracyClass::Fuzzy)
        } else {
            None
        }
    }
}

/// Capability interfaces a provider may implement and a session may enable.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Interface {
    Position,
    Address,
}

impl Interface {
    pub const ALL: [Interface; 2] = [Interface::Position, Interface::Address];

    pub(crate) fn index(self) -> usize {
        match self {
            Interface::Position => 0,
            Interface::Address => 1,
        }
    }
}

impl Display for Interface {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Interface::Position => f.write_str("position"),
            Interface::Address => f.write_str("address"),
        }
    }
}

/// Explicit tagged set of interfaces.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct InterfaceSet([bool; 2]);

impl InterfaceSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn position_only() -> Self {
        Self::from_iter([Interface::Position])
    }

    pub fn contains(&self, interface: Interface) -> bool {
        self.0[interface.index()]
    }

    pub fn insert(&mut self, interface: Interface) {
        self.0[interface.index()] = true;
    }

    pub fn remove(&mut self, interface: Interface) {
        self.0[interface.index()] = false;
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|present| *present)
    }

    pub fn iter(&self) -> impl Iterator<Item = Interface> + '_ {
        Interface::ALL
            .into_iter()
            .filter(move |interface| self.contains(*interface))
    }
}

impl FromIterator<Interface> for InterfaceSet {
    fn from_iter<T: IntoIterator<Item = Interface>>(iter: T) -> Self {
        let mut set = InterfaceSet::empty();
        for interface in iter {
            set.insert(interface);
        }
        set
    }
}

impl fmt::Debug for InterfaceSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{AccuracyClass, AccuracyLevel, Interface, InterfaceSet, ProvideFlags, ResourceFlags};

    #[test]
    fn accuracy_levels_rank_in_declared_order() {
        let mut shuffled = vec![
            AccuracyLevel::Street,
            AccuracyLevel::None,
            AccuracyLevel::Exact,
            AccuracyLevel::City,
            AccuracyLevel::Country,
            AccuracyLevel::Neighborhood,
        ];
        shuffled.sort();
        assert_eq!(shuffled, AccuracyLevel::ALL.to_vec());
    }

    #[test]
    fn accuracy_wire_values_round_trip_and_reject_gaps() {
        assert_eq!(AccuracyLevel::from_u32(6), Some(AccuracyLevel::Street));
        assert_eq!(AccuracyLevel::Exact.as_u32(), 8);
        assert_eq!(AccuracyLevel::from_u32(2), None);
        assert_eq!(AccuracyLevel::from_u32(7), None);
    }

    #[test]
    fn accuracy_level_parses_names_case_insensitively() {
        assert_eq!("City".parse::<AccuracyLevel>(), Ok(AccuracyLevel::City));
        assert_eq!(" EXACT ".parse::<AccuracyLevel>(), Ok(AccuracyLevel::Exact));
        assert!("planet".parse::<AccuracyLevel>().is_err());
    }

    #[test]
    fn radius_classification_uses_coarse_thresholds() {
        assert_eq!(AccuracyLevel::from_radius(30.0), AccuracyLevel::Street);
        assert_eq!(AccuracyLevel::from_radius(9_000.0), AccuracyLevel::City);
        assert_eq!(AccuracyLevel::from_radius(40_000.0), AccuracyLevel::Neighborhood);
        assert_eq!(AccuracyLevel::from_radius(250_000.0), AccuracyLevel::Country);
        assert_eq!(AccuracyLevel::from_radius(5_000_000.0), AccuracyLevel::None);
        assert_eq!(AccuracyLevel::from_radius(f64::NAN), AccuracyLevel::None);
    }

    #[test]
    fn street_and_exact_require_detailed_class() {
        assert_eq!(AccuracyLevel::None.required_class(), None);
        assert_eq!(
            AccuracyLevel::City.required_class(),
            Some(AccuracyClass::Fuzzy)
        );
        assert_eq!(
            AccuracyLevel::Street.required_class(),
            Some(AccuracyClass::Detailed)
        );
        assert!(AccuracyClass::Detailed > AccuracyClass::Fuzzy);
    }

    #[test]
    fn resource_subset_semantics() {
        let network = ResourceFlags::NETWORK;
        assert!(ResourceFlags::empty().is_subset_of(network));
        assert!(network.is_subset_of(ResourceFlags::ALL));
        assert!(!ResourceFlags::ALL.is_subset_of(network));
        assert!(!ResourceFlags::GPS.is_subset_of(network));
    }

    #[test]
    fn declaring_both_accuracy_classes_resolves_to_detailed() {
        let both = ProvideFlags::DETAILED_ACCURACY | ProvideFlags::FUZZY_ACCURACY;
        assert_eq!(both.declared_class(), Some(AccuracyClass::Detailed));
        assert_eq!(
            ProvideFlags::FUZZY_ACCURACY.declared_class(),
            Some(AccuracyClass::Fuzzy)
        );
        assert_eq!(ProvideFlags::PUSHES_UPDATES.declared_class(), None);
    }

    #[test]
    fn interface_set_iterates_in_fixed_order() {
        let set: InterfaceSet = [Interface::Address, Interface::Position]
            .into_iter()
            .collect();
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Interface::Position, Interface::Address]
        );
        assert!(InterfaceSet::empty().is_empty());
    }
}
