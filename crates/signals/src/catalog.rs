//! Signal Catalog
//!
//! Read-only registry of the signals the dashboard knows how to poll.

use crate::error::CatalogError;
use obd_protocol::Pid;
use serde::Serialize;
use std::collections::HashSet;

/// One pollable signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalDescriptor {
    /// Stable key, safe for HTML ids and form field names
    pub key: String,
    /// Human-readable label
    pub label: String,
    /// PID queried for this signal
    pub command: Pid,
}

impl SignalDescriptor {
    /// Create a new descriptor
    pub fn new(key: &str, label: &str, command: Pid) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            command,
        }
    }

    /// Unit of every value reported for this signal
    pub fn unit(&self) -> &'static str {
        self.command.unit()
    }
}

/// Registry of signal descriptors, in display order
#[derive(Debug, Clone)]
pub struct SignalCatalog {
    entries: Vec<SignalDescriptor>,
}

impl SignalCatalog {
    /// Build a catalog, rejecting duplicate or unsafe keys
    pub fn new(entries: Vec<SignalDescriptor>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !is_safe_key(&entry.key) {
                return Err(CatalogError::InvalidKey(entry.key.clone()));
            }
            if !seen.insert(entry.key.as_str()) {
                return Err(CatalogError::DuplicateKey(entry.key.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// The dashboard's built-in signal set
    pub fn standard() -> Self {
        Self {
            entries: vec![
                SignalDescriptor::new("RPM", "RPM", Pid::Rpm),
                SignalDescriptor::new("Speed", "Speed", Pid::Speed),
                SignalDescriptor::new("CoolantTemp", "Coolant Temp", Pid::CoolantTemp),
                SignalDescriptor::new("Throttle", "Throttle", Pid::ThrottlePosition),
                SignalDescriptor::new("FuelLevel", "Fuel Level", Pid::FuelLevel),
                SignalDescriptor::new("IntakeTemp", "Intake Temp", Pid::IntakeTemp),
                SignalDescriptor::new("MAF", "MAF", Pid::Maf),
            ],
        }
    }

    /// Find a descriptor by key
    pub fn lookup(&self, key: &str) -> Result<&SignalDescriptor, CatalogError> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .ok_or_else(|| CatalogError::UnknownSignal(key.to_string()))
    }

    /// Whether `key` is registered
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// Descriptors in display order
    pub fn iter(&self) -> impl Iterator<Item = &SignalDescriptor> {
        self.entries.iter()
    }

    /// Keys in display order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_safe_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}
