use async_trait::async_trait;
use parcel_archive::{Archive, ArchiveWriter};
use parcel_library::LibraryManager;
use parcel_library::error::ErrorKind as LibraryErrorKind;
use parcel_model::{LibraryName, User};
use parcel_package::{
    AllowAll, ErrorKind, ImportOptions, PackageExporter, PackageImporter, PermissionChecker,
};
use parcel_storage::backend::MockBackend;
use parcel_storage::{BackendContentStorage, BackendLibraryStorage, ContentId, ContentStorage};
use parcel_validate::{Config, Problem};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const MANIFEST: &str = r#"{
    "title": "Quiz",
    "mainLibrary": "H5P.Quiz",
    "language": "en",
    "preloadedDependencies": [{ "machineName": "H5P.Quiz", "majorVersion": 1, "minorVersion": 0 }]
}"#;

const QUIZ: &str = r#"{
    "title": "Quiz", "machineName": "H5P.Quiz",
    "majorVersion": 1, "minorVersion": 0, "patchVersion": 3, "runnable": 1,
    "coreApi": { "majorVersion": 1, "minorVersion": 19 },
    "preloadedJs": [{ "path": "quiz.js" }],
    "preloadedDependencies": [{ "machineName": "H5P.Helper", "majorVersion": 2, "minorVersion": 1 }]
}"#;

const HELPER: &str = r#"{
    "title": "Helper", "machineName": "H5P.Helper",
    "majorVersion": 2, "minorVersion": 1, "patchVersion": 0, "runnable": 0,
    "preloadedCss": [{ "path": "styles/helper.css" }]
}"#;

struct Platform {
    libraries: Arc<LibraryManager>,
    content: Arc<BackendContentStorage>,
    importer: PackageImporter,
}

fn platform() -> Platform {
    let backend = Arc::new(MockBackend::default());
    let content = Arc::new(BackendContentStorage::new(backend.clone()));
    let libraries = Arc::new(LibraryManager::new(Arc::new(BackendLibraryStorage::new(backend)), content.clone()));
    let importer = PackageImporter::new(libraries.clone(), content.clone(), Config::default());
    Platform { libraries, content, importer }
}

impl Platform {
    fn exporter(&self, permissions: Arc<dyn PermissionChecker>) -> PackageExporter {
        PackageExporter::new(self.libraries.clone(), self.content.clone(), permissions)
    }
}

fn package(dir: &TempDir, files: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.path().join("quiz.h5p");
    let mut writer = ArchiveWriter::new(File::create(&path).unwrap());
    for (name, data) in files {
        writer.add_bytes(name, data).unwrap();
    }
    writer.finish().unwrap();
    path
}

fn quiz_package(dir: &TempDir) -> PathBuf {
    package(
        dir,
        &[
            ("h5p.json", MANIFEST.as_bytes()),
            ("content/content.json", br#"{"question": "?", "answers": ["a", "b"], "a": 1}"#),
            ("content/images/a.png", &[0x89, b'P', b'N', b'G']),
            ("H5P.Quiz-1.0/library.json", QUIZ.as_bytes()),
            ("H5P.Quiz-1.0/quiz.js", b"// quiz"),
            ("H5P.Helper/library.json", HELPER.as_bytes()),
            ("H5P.Helper/styles/helper.css", b"body {}"),
            ("H5P.Helper/language/nb.json", b"{}"),
        ],
    )
}

fn admin() -> User {
    User::administrator("admin")
}

fn author() -> User {
    User { id: "author".to_string(), name: "Author".to_string(), ..User::default() }
}

async fn closure(platform: &Platform, id: &ContentId) -> Vec<LibraryName> {
    let manifest = platform.content.get_metadata(id).await.unwrap();
    let graph = platform.libraries.resolve_dependencies(manifest.dependencies()).await.unwrap();
    let mut names = graph.names().to_vec();
    names.sort();
    names
}

struct DenyAll;

#[async_trait]
impl PermissionChecker for DenyAll {
    async fn can_download(&self, _user: &User, _content: &ContentId) -> bool {
        false
    }
}

#[tokio::test]
async fn test_export_then_import_is_byte_stable() {
    let dir = TempDir::new().unwrap();
    let first = platform();
    let report = first.importer.import(&quiz_package(&dir), &admin(), ImportOptions::default(), None).await.unwrap();
    assert!(report.installs.is_complete());
    assert_eq!(report.installs.installs.len(), 2);
    let original = report.content.unwrap();

    let exported = dir.path().join("export.h5p");
    let summary = first.exporter(Arc::new(AllowAll)).export(&original, &admin(), &exported).await.unwrap();
    assert_eq!(summary.libraries, [LibraryName::new("H5P.Helper", 2, 1), LibraryName::new("H5P.Quiz", 1, 0)]);

    let second = platform();
    let report = second.importer.import(&exported, &admin(), ImportOptions::default(), None).await.unwrap();
    let imported = report.content.unwrap();

    assert_eq!(
        first.content.get_parameters_raw(&original).await.unwrap(),
        second.content.get_parameters_raw(&imported).await.unwrap(),
    );
    assert_eq!(closure(&first, &original).await, closure(&second, &imported).await);
    assert_eq!(second.content.list_files(&imported).await.unwrap(), ["images/a.png"]);
    let quiz = second.libraries.get(&LibraryName::new("H5P.Quiz", 1, 0)).await.unwrap();
    assert_eq!(quiz.patch_version, 3);
}

#[tokio::test]
async fn test_export_writes_entries_in_dependency_order() {
    let dir = TempDir::new().unwrap();
    let platform = platform();
    let report = platform.importer.import(&quiz_package(&dir), &admin(), ImportOptions::default(), None).await.unwrap();
    let exported = dir.path().join("export.h5p");
    let summary = platform.exporter(Arc::new(AllowAll)).export(&report.content.unwrap(), &admin(), &exported).await.unwrap();

    let names: Vec<_> = Archive::open(&exported).unwrap().entries().unwrap().into_iter().map(|entry| entry.name).collect();
    assert_eq!(
        names,
        [
            "h5p.json",
            "content/content.json",
            "content/images/a.png",
            "H5P.Helper-2.1/language/nb.json",
            "H5P.Helper-2.1/library.json",
            "H5P.Helper-2.1/styles/helper.css",
            "H5P.Quiz-1.0/library.json",
            "H5P.Quiz-1.0/quiz.js",
        ]
    );
    assert_eq!(summary.entries, names.len());
}

#[tokio::test]
async fn test_deleting_main_library_is_refused() {
    let dir = TempDir::new().unwrap();
    let platform = platform();
    platform.importer.import(&quiz_package(&dir), &admin(), ImportOptions::default(), None).await.unwrap();

    let quiz = LibraryName::new("H5P.Quiz", 1, 0);
    let err = platform.libraries.delete_library(&quiz).await.unwrap_err();
    assert!(matches!(&*err, LibraryErrorKind::InUse { content: 1, .. }));
    assert!(platform.libraries.get(&quiz).await.is_ok());

    let helper = LibraryName::new("H5P.Helper", 2, 1);
    let err = platform.libraries.delete_library(&helper).await.unwrap_err();
    assert!(matches!(&*err, LibraryErrorKind::InUse { content: 0, dependents: 1, .. }));
}

#[tokio::test]
async fn test_invalid_package_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let path = package(&dir, &[("content/content.json", b"{}"), ("H5P.Helper/library.json", HELPER.as_bytes())]);
    let platform = platform();
    let err = platform.importer.import(&path, &admin(), ImportOptions::default(), None).await.unwrap_err();
    let problems = err.problems().unwrap();
    assert_eq!(problems.problems(), [Problem::MissingManifest]);
    assert!(platform.libraries.installed(None).await.unwrap().is_empty());
    assert!(platform.content.list_content().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_installing_requires_privilege() {
    let dir = TempDir::new().unwrap();
    let path = quiz_package(&dir);
    let platform = platform();

    let err = platform.importer.import(&path, &author(), ImportOptions::default(), None).await.unwrap_err();
    let problems = err.problems().unwrap();
    assert_eq!(problems.len(), 2);
    assert!(problems.iter().all(|problem| matches!(problem, Problem::InstallNotPermitted { .. })));

    // Content alone needs no library privilege.
    let options = ImportOptions { install_libraries: false, copy_content: true };
    let report = platform.importer.import(&path, &author(), options, None).await.unwrap();
    assert!(report.content.is_some());
    assert!(report.installs.installs.is_empty());
}

#[tokio::test]
async fn test_reimport_installs_nothing() {
    let dir = TempDir::new().unwrap();
    let path = quiz_package(&dir);
    let platform = platform();
    let first = platform.importer.import(&path, &admin(), ImportOptions::default(), None).await.unwrap();

    // Nothing would change, so no install privilege is needed.
    let second = platform.importer.import(&path, &author(), ImportOptions::default(), None).await.unwrap();
    assert!(second.installs.installs.is_empty());
    assert_ne!(first.content, second.content);
    assert_eq!(platform.content.list_content().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_libraries_only_import() {
    let dir = TempDir::new().unwrap();
    let platform = platform();
    let options = ImportOptions { install_libraries: true, copy_content: false };
    let report = platform.importer.import(&quiz_package(&dir), &admin(), options, None).await.unwrap();
    assert_eq!(report.content, None);
    assert_eq!(report.installs.installs.len(), 2);
    assert!(platform.content.list_content().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_import_with_supplied_id() {
    let dir = TempDir::new().unwrap();
    let path = quiz_package(&dir);
    let platform = platform();
    let id: ContentId = "quiz-1".parse().unwrap();
    let report = platform.importer.import(&path, &admin(), ImportOptions::default(), Some(id.clone())).await.unwrap();
    assert_eq!(report.content, Some(id.clone()));
    platform.content.add_file(&id, "images/stale.png", b"old").await.unwrap();

    let revised_dir = TempDir::new().unwrap();
    let revised = package(
        &revised_dir,
        &[
            ("h5p.json", MANIFEST.as_bytes()),
            ("content/content.json", br#"{"question": "Revised?"}"#),
            ("content/images/a.png", &[0x89, b'P', b'N', b'G']),
            ("H5P.Quiz-1.0/library.json", QUIZ.as_bytes()),
            ("H5P.Quiz-1.0/quiz.js", b"// quiz"),
            ("H5P.Helper/library.json", HELPER.as_bytes()),
            ("H5P.Helper/styles/helper.css", b"body {}"),
        ],
    );
    let report = platform.importer.import(&revised, &admin(), ImportOptions::default(), Some(id.clone())).await.unwrap();
    assert_eq!(report.content, Some(id.clone()));
    assert!(report.installs.installs.iter().all(|(_, install)| !install.changed()));
    assert_eq!(platform.content.list_content().await.unwrap(), [id.clone()]);
    assert_eq!(platform.content.get_parameters(&id).await.unwrap(), serde_json::json!({ "question": "Revised?" }));
    assert_eq!(platform.content.list_files(&id).await.unwrap(), ["images/a.png"]);
}

#[tokio::test]
async fn test_export_checks_existence_then_permission() {
    let dir = TempDir::new().unwrap();
    let platform = platform();
    let report = platform.importer.import(&quiz_package(&dir), &admin(), ImportOptions::default(), None).await.unwrap();
    let destination = dir.path().join("out.h5p");

    let missing: ContentId = "missing".parse().unwrap();
    let err = platform.exporter(Arc::new(DenyAll)).export(&missing, &admin(), &destination).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::ContentNotFound(_)));

    let id = report.content.unwrap();
    let err = platform.exporter(Arc::new(DenyAll)).export(&id, &admin(), &destination).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::Forbidden(_)));
    assert!(!destination.exists());
}
