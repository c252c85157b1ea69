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

//! Provider descriptor model and `.provider` key-file parsing.
//!
//! ```text
//! [Geoclue Provider]
//! Name=Hostip
//! Service=org.freedesktop.Geoclue.Providers.Hostip
//! Path=/org/freedesktop/Geoclue/Providers/Hostip
//! Requires=RequiresNetwork
//! Provides=ProvidesUpdates;ProvidesFuzzyAccuracy
//! Interfaces=org.freedesktop.Geoclue.Position;org.freedesktop.Geoclue.Address
//! Accuracy=city
//! ```

use crate::accuracy::{AccuracyLevel, Interface, InterfaceSet, ProvideFlags, ResourceFlags};
use ini::{Ini, ParseError};
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const PROVIDER_GROUP: &str = "Geoclue Provider";
pub const PROVIDER_FILE_EXTENSION: &str = "provider";

const INTERFACE_PREFIX: &str = "org.freedesktop.Geoclue.";

/// Static description of one provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderDescriptor {
    pub name: String,
    pub service: String,
    pub path: String,
    pub requires: ResourceFlags,
    pub provides: ProvideFlags,
    pub interfaces: InterfaceSet,
    /// Max accuracy assumed until the bound source reports its own.
    pub accuracy: Option<AccuracyLevel>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DescriptorError {
    Io { path: PathBuf, message: String },
    MissingGroup,
    MissingKey(&'static str),
    UnknownFlag { key: &'static str, value: String },
    /// The key file itself could not be parsed.
    Malformed { line: usize, message: String },
}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::Io { path, message } => {
                write!(f, "failed to read {}: {}", path.display(), message)
            }
            DescriptorError::MissingGroup => write!(f, "missing [{}] group", PROVIDER_GROUP),
            DescriptorError::MissingKey(key) => write!(f, "missing required key {}", key),
            DescriptorError::UnknownFlag { key, value } => {
                write!(f, "unknown value {:?} for key {}", value, key)
            }
            DescriptorError::Malformed { line, message } => {
                write!(f, "malformed key file at line {}: {}", line, message)
            }
        }
    }
}

impl Error for DescriptorError {}

impl From<ParseError> for DescriptorError {
    fn from(err: ParseError) -> Self {
        DescriptorError::Malformed {
            line: err.line,
            message: err.msg.to_string(),
        }
    }
}

impl ProviderDescriptor {
    /// A descriptor for an in-process provider implementing only `Position`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            service: String::new(),
            path: String::new(),
            name,
            requires: ResourceFlags::empty(),
            provides: ProvideFlags::empty(),
            interfaces: InterfaceSet::position_only(),
            accuracy: None,
        }
    }

    pub fn with_requires(mut self, requires: ResourceFlags) -> Self {
        self.requires = requires;
        self
    }

    pub fn with_provides(mut self, provides: ProvideFlags) -> Self {
        self.provides = provides;
        self
    }

    pub fn with_interfaces(mut self, interfaces: InterfaceSet) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn with_accuracy(mut self, accuracy: AccuracyLevel) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Parses the `[Geoclue Provider]` group of a key file. Other groups are ignored.
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let ini = Ini::load_from_str(text)?;
        let section = ini
            .section(Some(PROVIDER_GROUP))
            .ok_or(DescriptorError::MissingGroup)?;

        let mut requires = ResourceFlags::empty();
        if let Some(value) = section.get("Requires") {
            for token in list(value) {
                requires |= parse_requires(token)?;
            }
        }
        let mut provides = ProvideFlags::empty();
        if let Some(value) = section.get("Provides") {
            for token in list(value) {
                provides |= parse_provides(token)?;
            }
        }
        let mut interfaces = InterfaceSet::empty();
        if let Some(value) = section.get("Interfaces") {
            for token in list(value) {
                interfaces.insert(parse_interface(token)?);
            }
        }
        let accuracy = match section.get("Accuracy").map(str::trim) {
            Some(value) => Some(value.parse::<AccuracyLevel>().map_err(|_| {
                DescriptorError::UnknownFlag {
                    key: "Accuracy",
                    value: value.to_string(),
                }
            })?),
            None => None,
        };

        let name = required(section.get("Name"), "Name")?;
        if interfaces.is_empty() {
            return Err(DescriptorError::MissingKey("Interfaces"));
        }

        Ok(Self {
            name,
            service: section
                .get("Service")
                .map(|value| value.trim().to_string())
                .ok_or(DescriptorError::MissingKey("Service"))?,
            path: section
                .get("Path")
                .map(|value| value.trim().to_string())
                .ok_or(DescriptorError::MissingKey("Path"))?,
            requires,
            provides,
            interfaces,
            accuracy,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let text = std::fs::read_to_string(path).map_err(|err| DescriptorError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse(&text)
    }
}

/// Raw descriptor text plus where it came from, as handed to the registry loader.
#[derive(Clone, Debug)]
pub struct DescriptorSource {
    pub origin: String,
    pub text: String,
}

impl DescriptorSource {
    pub fn new(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            text: text.into(),
        }
    }
}

/// Reads every `*.provider` file in `dir`, sorted by file name.
///
/// Unreadable files are returned as errors so the caller can log and skip them.
pub fn read_descriptor_dir(
    dir: &Path,
) -> Result<Vec<Result<DescriptorSource, DescriptorError>>, DescriptorError> {
    let io_error = |err: std::io::Error| DescriptorError::Io {
        path: dir.to_path_buf(),
        message: err.to_string(),
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(PROVIDER_FILE_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            std::fs::read_to_string(&path)
                .map(|text| DescriptorSource::new(path.display().to_string(), text))
                .map_err(|err| DescriptorError::Io {
                    path: path.clone(),
                    message: err.to_string(),
                })
        })
        .collect())
}

fn required(value: Option<&str>, key: &'static str) -> Result<String, DescriptorError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(DescriptorError::MissingKey(key))
}

fn list(value: &str) -> impl Iterator<Item = &str> {
    value.split(';').map(str::trim).filter(|token| !token.is_empty())
}

fn parse_requires(token: &str) -> Result<ResourceFlags, DescriptorError> {
    match token {
        "RequiresNetwork" => Ok(ResourceFlags::NETWORK),
        "RequiresGPS" => Ok(ResourceFlags::GPS),
        other => Err(DescriptorError::UnknownFlag {
            key: "Requires",
            value: other.to_string(),
        }),
    }
}

fn parse_provides(token: &str) -> Result<ProvideFlags, DescriptorError> {
    match token {
        "ProvidesUpdates" => Ok(ProvideFlags::PUSHES_UPDATES),
        "ProvidesDetailedAccuracy" => Ok(ProvideFlags::DETAILED_ACCURACY),
        "ProvidesFuzzyAccuracy" => Ok(ProvideFlags::FUZZY_ACCURACY),
        other => Err(DescriptorError::UnknownFlag {
            key: "Provides",
            value: other.to_string(),
        }),
    }
}

fn parse_interface(token: &str) -> Result<Interface, DescriptorError> {
    match token.strip_prefix(INTERFACE_PREFIX).unwrap_or(token) {
        "Position" => Ok(Interface::Position),
        "Address" => Ok(Interface::Address),
        _ => Err(DescriptorError::UnknownFlag {
            key: "Interfaces",
            value: token.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{DescriptorError, ProviderDescriptor};
    use crate::accuracy::{AccuracyLevel, Interface, ProvideFlags, ResourceFlags};

    const HOSTIP: &str = "\
# Shipped with the hostip provider
[Geoclue Provider]
Name=Hostip
Service=org.freedesktop.Geoclue.Providers.Hostip
Path=/org/freedesktop/Geoclue/Providers/Hostip
Requires=RequiresNetwork
Provides=ProvidesUpdates;ProvidesFuzzyAccuracy;
Interfaces=org.freedesktop.Geoclue.Position;Address
Accuracy=City

[Desktop Entry]
Comment=ignored
";

    #[test]
    fn parses_full_descriptor() {
        let descriptor = ProviderDescriptor::parse(HOSTIP).expect("descriptor should parse");

        assert_eq!(descriptor.name, "Hostip");
        assert_eq!(descriptor.path, "/org/freedesktop/Geoclue/Providers/Hostip");
        assert_eq!(descriptor.requires, ResourceFlags::NETWORK);
        assert!(descriptor.provides.contains(ProvideFlags::PUSHES_UPDATES));
        assert!(descriptor.provides.contains(ProvideFlags::FUZZY_ACCURACY));
        assert!(descriptor.interfaces.contains(Interface::Position));
        assert!(descriptor.interfaces.contains(Interface::Address));
        assert_eq!(descriptor.accuracy, Some(AccuracyLevel::City));
    }

    #[test]
    fn missing_group_and_keys_are_reported() {
        assert_eq!(
            ProviderDescriptor::parse("Name=Orphan\n"),
            Err(DescriptorError::MissingGroup)
        );
        assert_eq!(
            ProviderDescriptor::parse("[Geoclue Provider]\nName=NoIfaces\nService=s\nPath=/p\n"),
            Err(DescriptorError::MissingKey("Interfaces"))
        );
        assert_eq!(
            ProviderDescriptor::parse("[Geoclue Provider]\nInterfaces=Position\n"),
            Err(DescriptorError::MissingKey("Name"))
        );
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        let text = "[Geoclue Provider]\nName=X\nService=s\nPath=/p\nInterfaces=Position\nRequires=RequiresCellular\n";
        assert_eq!(
            ProviderDescriptor::parse(text),
            Err(DescriptorError::UnknownFlag {
                key: "Requires",
                value: "RequiresCellular".into(),
            })
        );

        let text = "[Geoclue Provider]\nName=X\nService=s\nPath=/p\nInterfaces=Velocity\n";
        assert!(matches!(
            ProviderDescriptor::parse(text),
            Err(DescriptorError::UnknownFlag { key: "Interfaces", .. })
        ));
    }

    #[test]
    fn unparseable_key_file_is_malformed() {
        let text = "[Geoclue Provider\nName=X\n";
        assert!(matches!(
            ProviderDescriptor::parse(text),
            Err(DescriptorError::Malformed { .. })
        ));
    }

    #[test]
    fn empty_name_counts_as_missing() {
        let text = "[Geoclue Provider]\nName=\nService=s\nPath=/p\nInterfaces=Position\n";
        assert_eq!(
            ProviderDescriptor::parse(text),
            Err(DescriptorError::MissingKey("Name"))
        );
    }

    #[test]
    fn builder_defaults_to_position_only() {
        let descriptor = ProviderDescriptor::new("gps")
            .with_requires(ResourceFlags::GPS)
            .with_provides(ProvideFlags::PUSHES_UPDATES | ProvideFlags::DETAILED_ACCURACY)
            .with_accuracy(AccuracyLevel::Exact);

        assert!(descriptor.interfaces.contains(Interface::Position));
        assert!(!descriptor.interfaces.contains(Interface::Address));
        assert_eq!(descriptor.accuracy, Some(AccuracyLevel::Exact));
    }
}
