//! Validation limits and whitelists.

use parcel_model::ApiVersion;
use serde::{Deserialize, Serialize};

const CONTENT_EXTENSIONS: &[&str] = &[
    "json", "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "svg", "eot", "ttf", "woff", "woff2", "otf", "webm",
    "mp4", "ogg", "mp3", "m4a", "wav", "txt", "pdf", "rtf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods",
    "odp", "xml", "csv", "diff", "patch", "swf", "md", "textile", "vtt", "webvtt", "gltf", "glb",
];
const LIBRARY_EXTENSIONS: &[&str] = &["js", "css"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extension (without the dot) every package file name must end in.
    pub package_extension: String,
    /// Largest uncompressed size allowed for any single entry.
    pub max_file_size: u64,
    /// Largest uncompressed size allowed for the whole package.
    pub max_total_size: u64,
    /// Extensions allowed anywhere in a package.
    pub content_whitelist: Vec<String>,
    /// Extensions additionally allowed inside library directories.
    pub library_extensions: Vec<String>,
    /// Highest core API version libraries may require.
    pub core_api: ApiVersion,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            package_extension: "h5p".to_string(),
            max_file_size: 32 * 1024 * 1024,
            max_total_size: 256 * 1024 * 1024,
            content_whitelist: CONTENT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            library_extensions: LIBRARY_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            core_api: ApiVersion::new(1, 24),
        }
    }
}
impl Config {
    pub fn allows_in_content(&self, extension: &str) -> bool {
        self.content_whitelist.iter().any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }

    pub fn allows_in_library(&self, extension: &str) -> bool {
        self.allows_in_content(extension)
            || self.library_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }
}
