//! Hub catalog entries.

use crate::name::{ApiVersion, LibraryVersion};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}
impl From<HubVersion> for LibraryVersion {
    fn from(version: HubVersion) -> Self {
        LibraryVersion::new(version.major, version.minor, version.patch)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubApiVersion {
    pub major: u32,
    pub minor: u32,
}
impl From<HubApiVersion> for ApiVersion {
    fn from(version: HubApiVersion) -> Self {
        ApiVersion::new(version.major, version.minor)
    }
}

/// One publicly distributable content type, as described by the hub.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubContentType {
    /// Machine name of the library.
    pub id: String,
    pub version: HubVersion,
    pub core_api_version_needed: HubApiVersion,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub is_recommended: bool,
    #[serde(default)]
    pub popularity: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Everything else the hub sends, kept so the cache round-trips it.
    #[serde(flatten)]
    pub other: serde_json::Map<String, Value>,
}
impl HubContentType {
    pub fn version(&self) -> LibraryVersion {
        self.version.into()
    }

    pub fn required_api(&self) -> ApiVersion {
        self.core_api_version_needed.into()
    }
}

/// Body of a successful content-types response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubCatalog {
    pub content_types: Vec<HubContentType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog() {
        let json = r#"{"contentTypes": [{
            "id": "H5P.Accordion",
            "version": { "major": 1, "minor": 0, "patch": 26 },
            "coreApiVersionNeeded": { "major": 1, "minor": 24 },
            "title": "Accordion",
            "summary": "Create vertically stacked expandable items",
            "isRecommended": true,
            "screenshots": []
        }]}"#;
        let catalog: HubCatalog = serde_json::from_str(json).unwrap();
        let accordion = &catalog.content_types[0];
        assert_eq!(accordion.version(), LibraryVersion::new(1, 0, 26));
        assert_eq!(accordion.required_api(), ApiVersion::new(1, 24));
        assert!(accordion.other.contains_key("screenshots"));
    }
}
