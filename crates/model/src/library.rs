//! Library descriptors (`library.json`) and installed libraries.

use crate::error::Result;
use crate::name::{ApiVersion, LibraryName, LibraryVersion};
use crate::schema::{self, flag, flag_as_int, optional_flag, optional_flag_as_int};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Deref;

/// Name of the descriptor file at the root of every library directory.
pub const LIBRARY_DESCRIPTOR: &str = "library.json";
/// Name of the optional semantics file at the root of a library directory.
pub const SEMANTICS_FILE: &str = "semantics.json";
/// Directory (inside a library) holding per-language JSON files.
pub const LANGUAGE_DIRECTORY: &str = "language";

/// A file referenced by a descriptor, relative to the library directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileReference {
    pub path: String,
}
impl From<&str> for FileReference {
    fn from(path: &str) -> Self {
        Self { path: path.to_string() }
    }
}

/// The core API version a library requires from its host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreApi {
    pub major_version: u32,
    pub minor_version: u32,
}
impl From<CoreApi> for ApiVersion {
    fn from(api: CoreApi) -> Self {
        ApiVersion::new(api.major_version, api.minor_version)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropCss {
    pub machine_name: String,
}

/// The typed contents of a `library.json` descriptor.
///
/// Dependencies are declared as three explicit lists; nothing else in the
/// document is ever walked looking for library references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryMetadata {
    pub title: String,
    pub machine_name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub patch_version: u32,
    #[serde(deserialize_with = "flag", serialize_with = "flag_as_int")]
    pub runnable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_api: Option<CoreApi>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preloaded_js: Vec<FileReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preloaded_css: Vec<FileReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preloaded_dependencies: Vec<LibraryName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub editor_dependencies: Vec<LibraryName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_dependencies: Vec<LibraryName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embed_types: Vec<String>,
    #[serde(
        default,
        deserialize_with = "optional_flag",
        serialize_with = "optional_flag_as_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub fullscreen: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_library_css: Vec<DropCss>,
    /// Present on addons: describes which content the addon attaches to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_to: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_settings: Option<Value>,
}
impl LibraryMetadata {
    /// Parse and schema-check a `library.json` document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let metadata: Self = schema::parse(bytes)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Field-level checks that serde's structural decoding can't express.
    pub fn validate(&self) -> Result<()> {
        schema::check_title("$.title", &self.title)?;
        schema::check_machine_name("$.machineName", &self.machine_name)?;
        schema::check_version_number("$.majorVersion", self.major_version)?;
        schema::check_version_number("$.minorVersion", self.minor_version)?;
        schema::check_version_number("$.patchVersion", self.patch_version)?;
        if let Some(api) = self.core_api {
            schema::check_version_number("$.coreApi.majorVersion", api.major_version)?;
            schema::check_version_number("$.coreApi.minorVersion", api.minor_version)?;
        }
        for (i, file) in self.preloaded_js.iter().enumerate() {
            schema::check_file_path(&format!("$.preloadedJs[{i}].path"), &file.path)?;
        }
        for (i, file) in self.preloaded_css.iter().enumerate() {
            schema::check_file_path(&format!("$.preloadedCss[{i}].path"), &file.path)?;
        }
        schema::check_dependencies("$.preloadedDependencies", &self.preloaded_dependencies)?;
        schema::check_dependencies("$.editorDependencies", &self.editor_dependencies)?;
        schema::check_dependencies("$.dynamicDependencies", &self.dynamic_dependencies)?;
        schema::check_embed_types("$.embedTypes", &self.embed_types)?;
        Ok(())
    }

    pub fn name(&self) -> LibraryName {
        LibraryName::new(&self.machine_name, self.major_version, self.minor_version)
    }

    pub fn version(&self) -> LibraryVersion {
        LibraryVersion::new(self.major_version, self.minor_version, self.patch_version)
    }

    pub fn required_api(&self) -> Option<ApiVersion> {
        self.core_api.map(ApiVersion::from)
    }

    /// Every library this one declares, across all three relations.
    pub fn dependencies(&self) -> impl Iterator<Item = &LibraryName> {
        self.preloaded_dependencies.iter().chain(&self.editor_dependencies).chain(&self.dynamic_dependencies)
    }

    pub fn depends_on(&self, name: &LibraryName) -> bool {
        self.dependencies().any(|dependency| dependency == name)
    }

    /// Every file path the descriptor promises will exist inside the library.
    pub fn preloaded_files(&self) -> impl Iterator<Item = &str> {
        self.preloaded_js.iter().chain(&self.preloaded_css).map(|f| f.path.as_str())
    }

    pub fn is_addon(&self) -> bool {
        self.add_to.is_some()
    }
}

/// Library metadata stored alongside the descriptor, but never part of it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted: Option<bool>,
}

/// A library as recorded by library storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledLibrary {
    #[serde(flatten)]
    pub metadata: LibraryMetadata,
    #[serde(default)]
    pub restricted: bool,
}
impl InstalledLibrary {
    pub fn new(metadata: LibraryMetadata, restricted: bool) -> Self {
        Self { metadata, restricted }
    }

    /// Apply a partial update, returning `true` if anything changed.
    pub fn apply(&mut self, additional: &AdditionalMetadata) -> bool {
        match additional.restricted {
            Some(restricted) if restricted != self.restricted => {
                self.restricted = restricted;
                true
            },
            _ => false,
        }
    }
}
impl Deref for InstalledLibrary {
    type Target = LibraryMetadata;
    fn deref(&self) -> &LibraryMetadata {
        &self.metadata
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;

    pub(crate) const DESCRIPTOR: &str = r#"{
        "title": "Example",
        "machineName": "H5P.Example",
        "majorVersion": 1,
        "minorVersion": 2,
        "patchVersion": 3,
        "runnable": 1,
        "coreApi": { "majorVersion": 1, "minorVersion": 19 },
        "preloadedJs": [{ "path": "scripts/example.js" }],
        "preloadedCss": [{ "path": "styles/example.css" }],
        "preloadedDependencies": [{ "machineName": "H5P.Question", "majorVersion": 1, "minorVersion": 4 }],
        "editorDependencies": [{ "machineName": "H5PEditor.Text", "majorVersion": 1, "minorVersion": 0 }]
    }"#;

    #[test]
    fn test_from_json() {
        let metadata = LibraryMetadata::from_json(DESCRIPTOR.as_bytes()).unwrap();
        assert_eq!(metadata.name(), LibraryName::new("H5P.Example", 1, 2));
        assert_eq!(metadata.version(), LibraryVersion::new(1, 2, 3));
        assert!(metadata.runnable);
        assert_eq!(metadata.required_api(), Some(ApiVersion::new(1, 19)));
        assert_eq!(metadata.preloaded_files().collect::<Vec<_>>(), ["scripts/example.js", "styles/example.css"]);
        assert!(metadata.depends_on(&LibraryName::new("H5PEditor.Text", 1, 0)));
        assert!(!metadata.depends_on(&LibraryName::new("H5P.Question", 1, 5)));
    }

    #[test]
    fn test_roundtrip_keeps_integer_flags() {
        let metadata = LibraryMetadata::from_json(DESCRIPTOR.as_bytes()).unwrap();
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["runnable"], Value::from(1));
        assert_eq!(LibraryMetadata::from_json(json.to_string().as_bytes()).unwrap(), metadata);
    }

    #[test]
    fn test_missing_field_is_schema_error() {
        let err = LibraryMetadata::from_json(br#"{"title": "x", "majorVersion": 1}"#).unwrap_err();
        match &*err {
            ErrorKind::Schema { path, reason } => {
                assert_eq!(path, "$");
                assert!(reason.contains("machineName"), "{reason}");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_dependency_reports_path() {
        let json = DESCRIPTOR.replace(r#""machineName": "H5P.Question""#, r#""machineName": "H5P Question""#);
        let err = LibraryMetadata::from_json(json.as_bytes()).unwrap_err();
        match &*err {
            ErrorKind::Schema { path, .. } => assert_eq!(path, "$.preloadedDependencies[0].machineName"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_runnable_rejects_other_integers() {
        let json = DESCRIPTOR.replace(r#""runnable": 1"#, r#""runnable": 2"#);
        assert!(LibraryMetadata::from_json(json.as_bytes()).is_err());
    }

    #[test]
    fn test_installed_library_flattens() {
        let metadata = LibraryMetadata::from_json(DESCRIPTOR.as_bytes()).unwrap();
        let mut installed = InstalledLibrary::new(metadata, false);
        let json = serde_json::to_string(&installed).unwrap();
        let parsed: InstalledLibrary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, installed);
        assert_eq!(parsed.machine_name, "H5P.Example");
        assert!(installed.apply(&AdditionalMetadata { restricted: Some(true) }));
        assert!(!installed.apply(&AdditionalMetadata { restricted: Some(true) }));
        assert!(!installed.apply(&AdditionalMetadata::default()));
    }
}
