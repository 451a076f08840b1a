//! Scripts, styles and translations needed to run some content.

use crate::LibraryManager;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use parcel_model::LibraryName;
use parcel_model::lang::language_file_path;

/// Asset paths relative to the libraries root, e.g. `H5P.Foo-1.0/foo.js`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assets {
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
    /// Language files of the requested language, one per library that has it.
    pub translations: Vec<(LibraryName, String)>,
}

impl LibraryManager {
    /// Preloaded assets of the whole closure of `roots`, dependencies first.
    pub async fn list_assets<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a LibraryName>,
        language: Option<&str>,
    ) -> Result<Assets> {
        let graph = self.resolve_dependencies(roots).await?;
        let mut assets = Assets::default();
        for library in graph.dependencies_first() {
            let name = library.name();
            let directory = name.ubername();
            assets.scripts.extend(library.preloaded_js.iter().map(|file| format!("{directory}/{}", file.path)));
            assets.styles.extend(library.preloaded_css.iter().map(|file| format!("{directory}/{}", file.path)));
            if let Some(language) = language {
                let path = language_file_path(language);
                if self.libraries.file_exists(&name, &path).await.or_raise(|| ErrorKind::Storage)? {
                    assets.translations.push((name, format!("{directory}/{path}")));
                }
            }
        }
        Ok(assets)
    }
}
