//! Content manifest (`h5p.json`).

use crate::consts::LANGUAGE_CODE_REGEX;
use crate::error::{ErrorKind, Result};
use crate::name::LibraryName;
use crate::schema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the manifest at the root of every package.
pub const MANIFEST_FILE: &str = "h5p.json";
/// Directory holding the content section of a package.
pub const CONTENT_DIRECTORY: &str = "content";
/// Name of the parameters file inside the content section.
pub const PARAMETERS_FILE: &str = "content.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Metadata describing one content item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentManifest {
    pub title: String,
    /// Machine name of the library that renders this content.
    pub main_library: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preloaded_dependencies: Vec<LibraryName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub editor_dependencies: Vec<LibraryName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_dependencies: Vec<LibraryName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embed_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    /// Fields this crate doesn't interpret, kept so exports round-trip.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}
fn default_language() -> String {
    "und".to_string()
}
impl ContentManifest {
    /// Parse and schema-check an `h5p.json` document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let manifest: Self = schema::parse(bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        schema::check_title("$.title", &self.title)?;
        schema::check_machine_name("$.mainLibrary", &self.main_library)?;
        if self.language != "und" && !LANGUAGE_CODE_REGEX.is_match(&self.language) {
            exn::bail!(ErrorKind::Schema {
                path: "$.language".to_string(),
                reason: format!("`{}` is not a language code", self.language),
            });
        }
        schema::check_dependencies("$.preloadedDependencies", &self.preloaded_dependencies)?;
        schema::check_dependencies("$.editorDependencies", &self.editor_dependencies)?;
        schema::check_dependencies("$.dynamicDependencies", &self.dynamic_dependencies)?;
        schema::check_embed_types("$.embedTypes", &self.embed_types)?;
        Ok(())
    }

    /// The preloaded dependency naming the main library.
    ///
    /// Content whose main library is not among its preloaded dependencies
    /// can't be rendered, so storage refuses to save it.
    pub fn main_dependency(&self) -> Result<&LibraryName> {
        self.preloaded_dependencies
            .iter()
            .find(|dependency| dependency.machine_name == self.main_library)
            .ok_or_else(|| ErrorKind::MainLibraryMissing(self.main_library.clone()).into())
    }

    /// Roots for dependency resolution, in declaration order.
    pub fn dependencies(&self) -> impl Iterator<Item = &LibraryName> {
        self.preloaded_dependencies.iter().chain(&self.editor_dependencies).chain(&self.dynamic_dependencies)
    }

    pub fn depends_on(&self, name: &LibraryName) -> bool {
        self.dependencies().any(|dependency| dependency == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "title": "Quiz",
        "mainLibrary": "H5P.Quiz",
        "language": "en",
        "license": "CC BY",
        "extraTitle": "kept verbatim",
        "preloadedDependencies": [
            { "machineName": "H5P.Quiz", "majorVersion": 1, "minorVersion": 0 },
            { "machineName": "H5P.Question", "majorVersion": 1, "minorVersion": 4 }
        ]
    }"#;

    #[test]
    fn test_from_json() {
        let manifest = ContentManifest::from_json(MANIFEST.as_bytes()).unwrap();
        assert_eq!(manifest.main_dependency().unwrap(), &LibraryName::new("H5P.Quiz", 1, 0));
        assert_eq!(manifest.dependencies().count(), 2);
        assert_eq!(manifest.other["extraTitle"], "kept verbatim");
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["extraTitle"], "kept verbatim");
    }

    #[test]
    fn test_main_library_must_be_a_dependency() {
        let json = MANIFEST.replace(r#""mainLibrary": "H5P.Quiz""#, r#""mainLibrary": "H5P.Other""#);
        let manifest = ContentManifest::from_json(json.as_bytes()).unwrap();
        let err = manifest.main_dependency().unwrap_err();
        assert_eq!(*err, ErrorKind::MainLibraryMissing("H5P.Other".to_string()));
    }

    #[test]
    fn test_language_defaults_and_is_checked() {
        let json = MANIFEST.replace(r#""language": "en","#, "");
        assert_eq!(ContentManifest::from_json(json.as_bytes()).unwrap().language, "und");
        let json = MANIFEST.replace(r#""language": "en""#, r#""language": "e n""#);
        let err = ContentManifest::from_json(json.as_bytes()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Schema { path, .. } if path == "$.language"));
    }
}
