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
    AccuracyLevel, AuthorizationPolicy, BrokerConfig, Interface, InterfaceSet, Location, Thresholds,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, reason: String },
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "unable to read {}: {source}", path.display())
            }
            ConfigError::Parse { path, reason } => {
                write!(f, "unable to parse {}: {reason}", path.display())
            }
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub(crate) broker: BrokerConfig,
    pub(crate) descriptors_dir: Option<PathBuf>,
    #[serde(default)]
    pub(crate) static_sources: Vec<StaticSourceConfig>,
    #[serde(default)]
    pub(crate) policy: AuthorizationPolicy,
    pub(crate) session: DemoSessionConfig,
}

/// A manual position served by the provider of the same name.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct StaticSourceConfig {
    pub(crate) provider: String,
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
    pub(crate) accuracy_m: f64,
    pub(crate) level: AccuracyLevel,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

impl StaticSourceConfig {
    pub fn location(&self) -> Location {
        let location = Location::new(self.latitude, self.longitude, self.accuracy_m);
        match &self.description {
            Some(description) => location.with_description(description.clone()),
            None => location,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DemoSessionConfig {
    pub(crate) desktop_id: String,
    #[serde(default = "default_peer")]
    pub(crate) peer: String,
    #[serde(default = "default_accuracy")]
    pub(crate) accuracy: AccuracyLevel,
    #[serde(default)]
    pub(crate) thresholds: Thresholds,
    #[serde(default = "default_interfaces")]
    pub(crate) interfaces: Vec<Interface>,
    #[serde(default = "default_run_for_s")]
    pub(crate) run_for_s: u64,
}

impl DemoSessionConfig {
    pub fn interface_set(&self) -> InterfaceSet {
        self.interfaces.iter().copied().collect()
    }
}

fn default_peer() -> String {
    ":1.1".to_string()
}

fn default_accuracy() -> AccuracyLevel {
    AccuracyLevel::City
}

fn default_interfaces() -> Vec<Interface> {
    vec![Interface::Position]
}

fn default_run_for_s() -> u64 {
    30
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = json5::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        // Relative descriptor directories resolve against the config file.
        if let (Some(dir), Some(base)) = (config.descriptors_dir.as_mut(), path.parent()) {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.session_event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "broker.session_event_capacity must be positive".to_string(),
            ));
        }
        if self.session.interfaces.is_empty() {
            return Err(ConfigError::Invalid(
                "session.interfaces must name at least one interface".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.static_sources {
            if !seen.insert(source.provider.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate static source for provider {}",
                    source.provider
                )));
            }
            if !source.location().is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "static source {} has an out-of-range position",
                    source.provider
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError};
    use geoclue_broker::{AccuracyLevel, Interface};

    const SAMPLE: &str = r#"{
        // comments are fine in json5
        descriptors_dir: "providers",
        static_sources: [
            { provider: "manual", latitude: 48.2, longitude: 16.37, accuracy_m: 30, level: "street" },
        ],
        policy: {
            default: { allowed: true, max_accuracy: "exact" },
            applications: { "org.example.Weather": { allowed: true, max_accuracy: "city" } },
        },
        session: { desktop_id: "org.example.Weather", accuracy: "exact", interfaces: ["position", "address"] },
    }"#;

    #[test]
    fn sample_parses_with_defaults() {
        let config: Config = json5::from_str(SAMPLE).expect("sample should parse");
        config.validate().expect("sample should be valid");
        assert_eq!(config.broker.session_event_capacity, 64);
        assert_eq!(config.session.peer, ":1.1");
        assert_eq!(config.session.run_for_s, 30);
        assert_eq!(config.session.accuracy, AccuracyLevel::Exact);
        assert!(config.session.interface_set().contains(Interface::Address));
        assert_eq!(
            config.policy.decision_for("org.example.Weather").max_accuracy,
            AccuracyLevel::City
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let text = r#"{ session: { desktop_id: "a" }, sesion_timeout: 5 }"#;
        assert!(json5::from_str::<Config>(text).is_err());
    }

    #[test]
    fn duplicate_static_sources_are_invalid() {
        let text = r#"{
            static_sources: [
                { provider: "manual", latitude: 1, longitude: 1, accuracy_m: 10, level: "exact" },
                { provider: "manual", latitude: 2, longitude: 2, accuracy_m: 10, level: "exact" },
            ],
            session: { desktop_id: "a" },
        }"#;
        let config: Config = json5::from_str(text).expect("should parse");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
