//! Per-signal Selection
//!
//! A [`Selection`] assigns every catalog key one of three states. It is an
//! immutable value: edits build a new selection that replaces the old one.

use crate::catalog::{SignalCatalog, SignalDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Whether a signal is polled and shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SignalState {
    #[default]
    #[serde(rename = "Enable")]
    Enabled,
    #[serde(rename = "Disable")]
    Disabled,
    #[serde(rename = "Not applicable")]
    NotApplicable,
}

impl SignalState {
    /// All states, in the order the setup form offers them
    pub const ALL: [SignalState; 3] = [
        SignalState::Enabled,
        SignalState::Disabled,
        SignalState::NotApplicable,
    ];

    /// Wire string used by the setup form and the selection file
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalState::Enabled => "Enable",
            SignalState::Disabled => "Disable",
            SignalState::NotApplicable => "Not applicable",
        }
    }

    /// Parse a wire string; anything unrecognised is `NotApplicable`
    pub fn coerce(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == value)
            .unwrap_or(SignalState::NotApplicable)
    }
}

/// Full mapping from catalog key to [`SignalState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Selection {
    states: BTreeMap<String, SignalState>,
}

impl Selection {
    /// Every catalog key enabled
    pub fn all_enabled(catalog: &SignalCatalog) -> Self {
        Self {
            states: catalog
                .keys()
                .map(|key| (key.to_string(), SignalState::Enabled))
                .collect(),
        }
    }

    /// Build from explicit states. Keys outside the catalog are dropped,
    /// catalog keys without a state default to `Enabled`.
    pub fn from_states<I>(catalog: &SignalCatalog, states: I) -> Self
    where
        I: IntoIterator<Item = (String, SignalState)>,
    {
        let mut selection = Self::all_enabled(catalog);
        for (key, state) in states {
            match selection.states.get_mut(&key) {
                Some(slot) => *slot = state,
                None => warn!(signal = %key, "Ignoring selection for unknown signal"),
            }
        }
        selection
    }

    /// Build from a setup form submission. This is a full replace: every
    /// catalog key takes the submitted state, and keys that were omitted or
    /// carry an unrecognised value become `NotApplicable`.
    pub fn from_form(catalog: &SignalCatalog, form: &HashMap<String, String>) -> Self {
        Self {
            states: catalog
                .keys()
                .map(|key| {
                    let state = form
                        .get(key)
                        .map(|value| SignalState::coerce(value))
                        .unwrap_or(SignalState::NotApplicable);
                    (key.to_string(), state)
                })
                .collect(),
        }
    }

    /// State of `key`; keys never set are `Enabled`
    pub fn state(&self, key: &str) -> SignalState {
        self.states.get(key).copied().unwrap_or_default()
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.state(key) == SignalState::Enabled
    }

    /// Enabled descriptors, in catalog order
    pub fn enabled<'a>(
        &'a self,
        catalog: &'a SignalCatalog,
    ) -> impl Iterator<Item = &'a SignalDescriptor> + 'a {
        catalog.iter().filter(move |entry| self.is_enabled(&entry.key))
    }

    /// `(key, state)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, SignalState)> {
        self.states.iter().map(|(key, state)| (key.as_str(), *state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::Pid;
    use proptest::prelude::*;

    fn two_signal_catalog() -> SignalCatalog {
        SignalCatalog::new(vec![
            SignalDescriptor::new("RPM", "RPM", Pid::Rpm),
            SignalDescriptor::new("Speed", "Speed", Pid::Speed),
        ])
        .unwrap()
    }

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_is_enabled() {
        let catalog = two_signal_catalog();
        let selection = Selection::all_enabled(&catalog);
        assert!(selection.is_enabled("RPM"));
        assert!(selection.is_enabled("Speed"));
        assert_eq!(SignalState::default(), SignalState::Enabled);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(SignalState::coerce("Enable"), SignalState::Enabled);
        assert_eq!(SignalState::coerce("Disable"), SignalState::Disabled);
        assert_eq!(SignalState::coerce("Not applicable"), SignalState::NotApplicable);
        assert_eq!(SignalState::coerce("enable"), SignalState::NotApplicable);
        assert_eq!(SignalState::coerce(""), SignalState::NotApplicable);
    }

    #[test]
    fn test_form_is_full_replace() {
        let catalog = two_signal_catalog();
        let selection = Selection::from_form(&catalog, &form(&[("RPM", "Enable")]));
        assert_eq!(selection.state("RPM"), SignalState::Enabled);
        // Omitted key is not carried over from any earlier selection
        assert_eq!(selection.state("Speed"), SignalState::NotApplicable);
    }

    #[test]
    fn test_form_coerces_bad_values_and_ignores_extra_fields() {
        let catalog = two_signal_catalog();
        let selection = Selection::from_form(
            &catalog,
            &form(&[("RPM", "On"), ("Speed", "Disable"), ("Boost", "Enable")]),
        );
        assert_eq!(selection.state("RPM"), SignalState::NotApplicable);
        assert_eq!(selection.state("Speed"), SignalState::Disabled);
        assert_eq!(selection.iter().count(), 2);
    }

    #[test]
    fn test_from_states_drops_unknown_keys() {
        let catalog = two_signal_catalog();
        let selection = Selection::from_states(
            &catalog,
            vec![
                ("Speed".to_string(), SignalState::Disabled),
                ("Boost".to_string(), SignalState::Enabled),
            ],
        );
        assert_eq!(selection.state("RPM"), SignalState::Enabled);
        assert_eq!(selection.state("Speed"), SignalState::Disabled);
        assert!(selection.iter().all(|(key, _)| catalog.contains(key)));
    }

    #[test]
    fn test_enabled_follows_catalog_order() {
        let catalog = SignalCatalog::standard();
        let selection = Selection::from_form(
            &catalog,
            &form(&[("MAF", "Enable"), ("RPM", "Enable"), ("Speed", "Disable")]),
        );
        let keys: Vec<_> = selection.enabled(&catalog).map(|d| d.key.as_str()).collect();
        assert_eq!(keys, ["RPM", "MAF"]);
    }

    #[test]
    fn test_serializes_wire_strings() {
        let catalog = two_signal_catalog();
        let selection = Selection::from_form(&catalog, &form(&[("RPM", "Enable")]));
        let json = serde_json::to_value(&selection).unwrap();
        assert_eq!(json["RPM"], "Enable");
        assert_eq!(json["Speed"], "Not applicable");
    }

    proptest! {
        #[test]
        fn prop_update_is_idempotent(
            values in proptest::collection::vec(
                prop_oneof![
                    Just("Enable".to_string()),
                    Just("Disable".to_string()),
                    Just("Not applicable".to_string()),
                    ".*",
                ],
                7,
            ),
            omit in proptest::collection::vec(any::<bool>(), 7),
        ) {
            let catalog = SignalCatalog::standard();
            let submitted: HashMap<String, String> = catalog
                .keys()
                .zip(values)
                .zip(omit)
                .filter(|(_, omitted)| !omitted)
                .map(|((key, value), _)| (key.to_string(), value))
                .collect();

            let first = Selection::from_form(&catalog, &submitted);
            let second = Selection::from_form(&catalog, &submitted);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.iter().all(|(key, _)| catalog.contains(key)));
            prop_assert_eq!(first.iter().count(), catalog.len());
        }
    }
}
