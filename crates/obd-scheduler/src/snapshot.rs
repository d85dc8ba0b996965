//! Snapshot of one poll cycle

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Push channel event name carrying a snapshot
pub const OBD_DATA_EVENT: &str = "obd_data";

/// Values of the enabled signals at one poll tick, in catalog order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    values: Vec<(String, f64)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value; keys are expected to be unique per cycle
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.values.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| *value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(key, value)| (key.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Encode as a push channel message: `{"event":"obd_data","data":{..}}`
    pub fn to_push_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&PushEvent {
            event: OBD_DATA_EVENT,
            data: self,
        })
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in &self.values {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(serde::Serialize)]
struct PushEvent<'a> {
    event: &'static str,
    data: &'a Snapshot,
}
