//! Values exchanged with the host device-service framework.

use std::collections::HashMap;

use bytes::Bytes;

/// Protocol name -> property map, as configured for a device.
pub type ProtocolProperties = HashMap<String, String>;

/// One resource operation the host asks the driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub device_resource_name: String,
    pub attributes: HashMap<String, String>,
}

impl CommandRequest {
    pub fn new(device_resource_name: impl Into<String>) -> Self {
        Self {
            device_resource_name: device_resource_name.into(),
            attributes: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Binary { media_type: String, data: Bytes },
    Uint64(u64),
    Bool(bool),
}

impl Reading {
    pub fn type_name(&self) -> &'static str {
        match self {
            Reading::Binary { .. } => "Binary",
            Reading::Uint64(_) => "Uint64",
            Reading::Bool(_) => "Bool",
        }
    }
}

/// A typed reading (or write parameter) for a device resource.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandValue {
    pub device_resource_name: String,
    /// Milliseconds since the Unix epoch at which the value was captured.
    pub origin: i64,
    pub reading: Reading,
}

impl CommandValue {
    pub fn binary(
        device_resource_name: impl Into<String>,
        origin: i64,
        media_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        Self {
            device_resource_name: device_resource_name.into(),
            origin,
            reading: Reading::Binary {
                media_type: media_type.into(),
                data,
            },
        }
    }

    pub fn uint64(device_resource_name: impl Into<String>, origin: i64, value: u64) -> Self {
        Self {
            device_resource_name: device_resource_name.into(),
            origin,
            reading: Reading::Uint64(value),
        }
    }

    pub fn bool(device_resource_name: impl Into<String>, origin: i64, value: bool) -> Self {
        Self {
            device_resource_name: device_resource_name.into(),
            origin,
            reading: Reading::Bool(value),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.reading {
            Reading::Uint64(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<(&str, &Bytes)> {
        match &self.reading {
            Reading::Binary { media_type, data } => Some((media_type.as_str(), data)),
            _ => None,
        }
    }
}

/// Readings pushed to the host outside of a read command.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncValues {
    pub device_name: String,
    pub command_values: Vec<CommandValue>,
}
