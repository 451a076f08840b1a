//! Installed libraries: listing, deletion, upgrade checks and consistency.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use parcel_model::{HubContentType, InstalledLibrary, LibraryName, LibraryVersion};
use parcel_storage::error::ErrorKind as StorageErrorKind;
use parcel_storage::{ContentStorageHandle, LibraryStorageHandle};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

/// A newer version of an installed library offered by the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upgrade {
    pub machine_name: String,
    /// Highest installed version.
    pub installed: LibraryVersion,
    pub available: LibraryVersion,
}

/// Entry point for everything that changes or inspects installed libraries.
///
/// Every mutation of one library identity runs under that identity's lock,
/// so two concurrent installs of the same library end up as one install and
/// one "already installed".
pub struct LibraryManager {
    pub(crate) libraries: LibraryStorageHandle,
    content: ContentStorageHandle,
    locks: Mutex<HashMap<LibraryName, Arc<Mutex<()>>>>,
}

impl LibraryManager {
    pub fn new(libraries: LibraryStorageHandle, content: ContentStorageHandle) -> Self {
        Self { libraries, content, locks: Mutex::default() }
    }

    pub fn storage(&self) -> &LibraryStorageHandle {
        &self.libraries
    }

    pub(crate) async fn lock(&self, name: &LibraryName) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().await.entry(name.clone()).or_default().clone();
        lock.lock_owned().await
    }

    /// The installed library with identity `name`.
    pub async fn get(&self, name: &LibraryName) -> Result<InstalledLibrary> {
        match self.libraries.get_library(name).await {
            Ok(library) => Ok(library),
            Err(err) if matches!(&*err, StorageErrorKind::LibraryNotFound(_)) => {
                exn::bail!(ErrorKind::NotInstalled(name.clone()))
            },
            Err(err) => Err(err).or_raise(|| ErrorKind::Storage),
        }
    }

    /// Installed libraries grouped by machine name, each group in upgrade
    /// ordering (lowest version first).
    pub async fn installed(&self, machine_names: Option<&[String]>) -> Result<BTreeMap<String, Vec<InstalledLibrary>>> {
        let libraries = self.libraries.installed_libraries(machine_names).await.or_raise(|| ErrorKind::Storage)?;
        let mut grouped: BTreeMap<String, Vec<InstalledLibrary>> = BTreeMap::new();
        for library in libraries {
            grouped.entry(library.machine_name.clone()).or_default().push(library);
        }
        for group in grouped.values_mut() {
            group.sort_by_key(|library| library.version());
        }
        Ok(grouped)
    }

    /// Runnable libraries in display ordering.
    pub async fn display_list(&self) -> Result<Vec<InstalledLibrary>> {
        let mut libraries: Vec<_> = self
            .libraries
            .installed_libraries(None)
            .await
            .or_raise(|| ErrorKind::Storage)?
            .into_iter()
            .filter(|library| library.runnable)
            .collect();
        libraries.sort_by(InstalledLibrary::display_cmp);
        Ok(libraries)
    }

    /// Remove a library nothing depends on any more.
    ///
    /// Refused with [`ErrorKind::InUse`] while any content uses it or any
    /// installed library lists it as a dependency; the library then stays
    /// installed untouched.
    #[instrument(skip(self), fields(library = %name))]
    pub async fn delete_library(&self, name: &LibraryName) -> Result<()> {
        let _guard = self.lock(name).await;
        self.get(name).await?;
        let usage = self.content.usage(name).await.or_raise(|| ErrorKind::Storage)?;
        let dependents = self.libraries.dependents_count(name).await.or_raise(|| ErrorKind::Storage)?;
        if !usage.is_unused() || dependents > 0 {
            let content = usage.as_main_library + usage.as_dependency;
            tracing::info!(content, dependents, "refusing to delete library in use");
            exn::bail!(ErrorKind::InUse { library: name.clone(), content, dependents });
        }
        self.libraries.delete_library(name).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!("library deleted");
        Ok(())
    }

    /// Check that every file the descriptor preloads was actually stored.
    pub async fn check_consistency(&self, name: &LibraryName) -> Result<()> {
        let library = self.get(name).await?;
        let files = self.libraries.list_files(name).await.or_raise(|| ErrorKind::Storage)?;
        let missing: Vec<String> = library
            .preloaded_files()
            .filter(|file| !files.iter().any(|stored| stored == file))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            exn::bail!(ErrorKind::MissingFiles { library: name.clone(), files: missing });
        }
        Ok(())
    }

    /// Installed machine names for which `catalog` offers a strictly higher
    /// `(major, minor, patch)` than the highest installed version.
    pub async fn upgrades_available(&self, catalog: &[HubContentType]) -> Result<Vec<Upgrade>> {
        let installed = self.installed(None).await?;
        Ok(installed
            .into_iter()
            .filter_map(|(machine_name, group)| {
                let highest = group.iter().map(|library| library.version()).max()?;
                let available = catalog
                    .iter()
                    .filter(|entry| entry.id == machine_name)
                    .map(HubContentType::version)
                    .max()
                    .filter(|available| *available > highest)?;
                Some(Upgrade { machine_name, installed: highest, available })
            })
            .collect())
    }

    pub async fn is_upgrade_available(&self, machine_name: &str, catalog: &[HubContentType]) -> Result<bool> {
        let upgrades = self.upgrades_available(catalog).await?;
        Ok(upgrades.iter().any(|upgrade| upgrade.machine_name == machine_name))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parcel_model::{ContentManifest, LibraryMetadata, User};
    use parcel_storage::backend::MockBackend;
    use parcel_storage::{BackendContentStorage, BackendLibraryStorage, ContentStorage};

    pub(crate) fn descriptor(machine_name: &str, version: (u32, u32, u32), dependencies: &[(&str, u32, u32)]) -> String {
        let dependencies: Vec<_> = dependencies
            .iter()
            .map(|(name, major, minor)| {
                serde_json::json!({ "machineName": name, "majorVersion": major, "minorVersion": minor })
            })
            .collect();
        serde_json::json!({
            "title": machine_name.trim_start_matches("H5P."),
            "machineName": machine_name,
            "majorVersion": version.0,
            "minorVersion": version.1,
            "patchVersion": version.2,
            "runnable": 1,
            "preloadedJs": [{ "path": "main.js" }],
            "preloadedDependencies": dependencies,
        })
        .to_string()
    }

    pub(crate) fn metadata(machine_name: &str, version: (u32, u32, u32), dependencies: &[(&str, u32, u32)]) -> LibraryMetadata {
        LibraryMetadata::from_json(descriptor(machine_name, version, dependencies).as_bytes()).unwrap()
    }

    pub(crate) fn manager() -> (LibraryManager, Arc<BackendContentStorage>) {
        let backend = Arc::new(MockBackend::default());
        let content = Arc::new(BackendContentStorage::new(backend.clone()));
        let libraries = Arc::new(BackendLibraryStorage::new(backend));
        (LibraryManager::new(libraries, content.clone()), content)
    }

    pub(crate) async fn add(manager: &LibraryManager, metadata: &LibraryMetadata) {
        manager.libraries.add_library(metadata, false).await.unwrap();
        manager.libraries.add_file(&metadata.name(), "main.js", b"").await.unwrap();
    }

    fn hub_entry(id: &str, version: (u32, u32, u32)) -> HubContentType {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "version": { "major": version.0, "minor": version.1, "patch": version.2 },
            "coreApiVersionNeeded": { "major": 1, "minor": 19 },
            "title": id,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_installed_groups_in_upgrade_order() {
        let (manager, _) = manager();
        add(&manager, &metadata("H5P.Foo", (1, 1, 0), &[])).await;
        add(&manager, &metadata("H5P.Foo", (1, 0, 4), &[])).await;
        add(&manager, &metadata("H5P.Bar", (2, 0, 0), &[])).await;
        let installed = manager.installed(None).await.unwrap();
        assert_eq!(installed.keys().collect::<Vec<_>>(), ["H5P.Bar", "H5P.Foo"]);
        let versions: Vec<_> = installed["H5P.Foo"].iter().map(|l| l.version()).collect();
        assert_eq!(versions, [LibraryVersion::new(1, 0, 4), LibraryVersion::new(1, 1, 0)]);
    }

    #[tokio::test]
    async fn test_display_list_orders_by_title() {
        let (manager, _) = manager();
        add(&manager, &metadata("H5P.Zebra", (1, 0, 0), &[])).await;
        add(&manager, &metadata("H5P.Apple", (2, 0, 0), &[])).await;
        add(&manager, &metadata("H5P.Apple", (1, 5, 0), &[])).await;
        let titles: Vec<_> = manager
            .display_list()
            .await
            .unwrap()
            .iter()
            .map(|l| format!("{} {}.{}", l.title, l.major_version, l.minor_version))
            .collect();
        assert_eq!(titles, ["Apple 1.5", "Apple 2.0", "Zebra 1.0"]);
    }

    #[tokio::test]
    async fn test_upgrades_available() {
        let (manager, _) = manager();
        add(&manager, &metadata("H5P.Foo", (1, 0, 2), &[])).await;
        add(&manager, &metadata("H5P.Bar", (1, 0, 0), &[])).await;
        let catalog = [hub_entry("H5P.Foo", (1, 0, 3)), hub_entry("H5P.Bar", (1, 0, 0)), hub_entry("H5P.New", (1, 0, 0))];
        let upgrades = manager.upgrades_available(&catalog).await.unwrap();
        assert_eq!(
            upgrades,
            [Upgrade {
                machine_name: "H5P.Foo".to_string(),
                installed: LibraryVersion::new(1, 0, 2),
                available: LibraryVersion::new(1, 0, 3),
            }]
        );
        assert!(manager.is_upgrade_available("H5P.Foo", &catalog).await.unwrap());
        assert!(!manager.is_upgrade_available("H5P.Bar", &catalog).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_library_in_use_by_content() {
        let (manager, content) = manager();
        let foo = metadata("H5P.Foo", (1, 0, 2), &[]);
        add(&manager, &foo).await;
        let manifest: ContentManifest = serde_json::from_value(serde_json::json!({
            "title": "Uses Foo",
            "mainLibrary": "H5P.Foo",
            "preloadedDependencies": [{ "machineName": "H5P.Foo", "majorVersion": 1, "minorVersion": 0 }],
        }))
        .unwrap();
        let id = content.create_content(&manifest, &serde_json::json!({}), &User::administrator("1"), None).await.unwrap();

        let err = manager.delete_library(&foo.name()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InUse { content: 1, dependents: 0, .. }));
        assert!(manager.libraries.is_installed(&foo.name()).await.unwrap());

        content.delete_content(&id).await.unwrap();
        manager.delete_library(&foo.name()).await.unwrap();
        assert!(!manager.libraries.is_installed(&foo.name()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_library_with_dependents() {
        let (manager, _) = manager();
        add(&manager, &metadata("H5P.Foo", (1, 0, 0), &[])).await;
        add(&manager, &metadata("H5P.Bar", (1, 0, 0), &[("H5P.Foo", 1, 0)])).await;
        let err = manager.delete_library(&LibraryName::new("H5P.Foo", 1, 0)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InUse { dependents: 1, .. }));
        let err = manager.delete_library(&LibraryName::new("H5P.Nope", 1, 0)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotInstalled(_)));
    }

    #[tokio::test]
    async fn test_check_consistency() {
        let (manager, _) = manager();
        let foo = metadata("H5P.Foo", (1, 0, 0), &[]);
        manager.libraries.add_library(&foo, false).await.unwrap();
        let err = manager.check_consistency(&foo.name()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingFiles { files, .. } if files == &["main.js"]));
        manager.libraries.add_file(&foo.name(), "main.js", b"").await.unwrap();
        manager.check_consistency(&foo.name()).await.unwrap();
    }
}
