//! The domain payload shared by both catalogue machines.

use serde::{Deserialize, Serialize};

/// Content of one catalogue service entry.
///
/// This is the `data` half of the wire envelope; machine metadata lives next
/// to it under `fsm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceData {
    /// Display name shown in the catalogue. Trimmed before persistence.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Identifier of the owning organisation in the CMS, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation: Option<String>,
}

impl ServiceData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            organisation: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_organisation(mut self, organisation: impl Into<String>) -> Self {
        self.organisation = Some(organisation.into());
        self
    }

    /// Trim display fields. Applied on every store write.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            description: self.description.map(|d| d.trim().to_string()),
            organisation: self.organisation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_trims_display_fields() {
        let data = ServiceData::new("  Waste Collection  ")
            .with_description("  Kerbside pickup.  ")
            .with_organisation("org-42");

        let normalized = data.normalized();

        assert_eq!(normalized.name, "Waste Collection");
        assert_eq!(normalized.description.as_deref(), Some("Kerbside pickup."));
        assert_eq!(normalized.organisation.as_deref(), Some("org-42"));
    }

    #[test]
    fn serializes_with_camel_case_and_no_null_noise() {
        let data = ServiceData::new("Parking Permits");

        let json = serde_json::to_value(&data).unwrap();

        assert_eq!(json, serde_json::json!({ "name": "Parking Permits" }));
    }
}
