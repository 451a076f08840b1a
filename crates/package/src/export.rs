//! Exporting content as a package.
//!
//! Files are streamed into the archive: the async side opens readers from
//! storage several at a time and hands them, in archive order, over a bounded
//! channel to a blocking task that owns the archive writer.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use parcel_archive::ArchiveWriter;
use parcel_library::{DependencyGraph, LibraryManager};
use parcel_model::manifest::{CONTENT_DIRECTORY, MANIFEST_FILE, PARAMETERS_FILE};
use parcel_model::{ContentManifest, LibraryName, User};
use parcel_storage::{BoxSyncRead, ContentId, ContentStorageHandle};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{Sender, channel};
use tracing::instrument;

/// Number of opened readers waiting for the archive writer.
const PENDING_ENTRIES: usize = 8;
/// Number of storage files being opened at once.
const OPEN_AHEAD: usize = 8;

/// Decides whether a user may download a content item.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn can_download(&self, user: &User, content: &ContentId) -> bool;
}

/// Lets everyone download everything.
pub struct AllowAll;

#[async_trait]
impl PermissionChecker for AllowAll {
    async fn can_download(&self, _user: &User, _content: &ContentId) -> bool {
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSummary {
    /// Entries written to the archive.
    pub entries: usize,
    /// Libraries included, dependencies first.
    pub libraries: Vec<LibraryName>,
}

pub struct PackageExporter {
    libraries: Arc<LibraryManager>,
    content: ContentStorageHandle,
    permissions: Arc<dyn PermissionChecker>,
}
impl PackageExporter {
    pub fn new(
        libraries: Arc<LibraryManager>,
        content: ContentStorageHandle,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self { libraries, content, permissions }
    }

    /// Write content `id` and every library it needs to `destination`.
    ///
    /// A partially written archive is removed when the export fails.
    #[instrument(skip(self, user, destination), fields(user = %user.id, destination = %destination.display()))]
    pub async fn export(&self, id: &ContentId, user: &User, destination: &Path) -> Result<ExportSummary> {
        if !self.content.content_exists(id).await.or_raise(|| ErrorKind::Storage)? {
            exn::bail!(ErrorKind::ContentNotFound(id.to_string()));
        }
        if !self.permissions.can_download(user, id).await {
            exn::bail!(ErrorKind::Forbidden(id.to_string()));
        }
        let manifest = self.content.get_metadata(id).await.or_raise(|| ErrorKind::Storage)?;
        let graph = self
            .libraries
            .resolve_dependencies(manifest.dependencies())
            .await
            .or_raise(|| ErrorKind::Dependencies)?;

        let file = tokio::fs::File::create(destination).await.or_raise(|| ErrorKind::Io)?.into_std().await;
        let (sender, mut receiver) = channel::<(String, BoxSyncRead)>(PENDING_ENTRIES);
        let span = tracing::Span::current();
        let writer = tokio::task::spawn_blocking(move || {
            span.in_scope(|| {
                let mut archive = ArchiveWriter::new(file);
                while let Some((name, mut reader)) = receiver.blocking_recv() {
                    archive.add_reader(&name, &mut reader)?;
                }
                let entries = archive.entries();
                archive.finish()?;
                Ok::<_, parcel_archive::error::Error>(entries)
            })
        });
        let sent = self.send_entries(&sender, id, &manifest, &graph).await;
        drop(sender);
        let written = writer.await.or_raise(|| ErrorKind::Task)?.or_raise(|| ErrorKind::Archive);

        let entries = match (sent, written) {
            (Ok(()), Ok(entries)) => entries,
            (_, Err(err)) | (Err(err), _) => {
                if let Err(cleanup) = tokio::fs::remove_file(destination).await {
                    tracing::warn!(error = %cleanup, "unable to remove partial export");
                }
                return Err(err);
            },
        };
        let libraries: Vec<_> = graph.dependencies_first().into_iter().map(|library| library.name()).collect();
        tracing::info!(content = %id, entries, libraries = libraries.len(), "content exported");
        Ok(ExportSummary { entries, libraries })
    }

    async fn send_entries(
        &self,
        sender: &Sender<(String, BoxSyncRead)>,
        id: &ContentId,
        manifest: &ContentManifest,
        graph: &DependencyGraph,
    ) -> Result<()> {
        let manifest = serde_json::to_vec_pretty(manifest).or_raise(|| ErrorKind::Storage)?;
        send(sender, MANIFEST_FILE.to_string(), Box::new(Cursor::new(manifest))).await?;

        let parameters = self.content.get_parameters_raw(id).await.or_raise(|| ErrorKind::Storage)?;
        let name = format!("{CONTENT_DIRECTORY}/{PARAMETERS_FILE}");
        send(sender, name, Box::new(Cursor::new(parameters))).await?;

        let mut opening: Vec<BoxFuture<'_, Result<(String, BoxSyncRead)>>> = Vec::new();
        for file in self.content.list_files(id).await.or_raise(|| ErrorKind::Storage)? {
            opening.push(
                async move {
                    let reader = self.content.file_reader(id, &file).await.or_raise(|| ErrorKind::Storage)?;
                    Ok((format!("{CONTENT_DIRECTORY}/{file}"), reader))
                }
                .boxed(),
            );
        }
        let storage = self.libraries.storage();
        for library in graph.dependencies_first() {
            let name = library.name();
            for file in storage.list_files(&name).await.or_raise(|| ErrorKind::Storage)? {
                let name = name.clone();
                opening.push(
                    async move {
                        let reader = storage.file_reader(&name, &file).await.or_raise(|| ErrorKind::Storage)?;
                        Ok((format!("{}/{file}", name.ubername()), reader))
                    }
                    .boxed(),
                );
            }
        }

        // Opened concurrently, written in order.
        let mut readers = futures::stream::iter(opening).buffered(OPEN_AHEAD);
        while let Some(opened) = readers.next().await {
            let (entry, reader) = opened?;
            send(sender, entry, reader).await?;
        }
        Ok(())
    }
}

async fn send(sender: &Sender<(String, BoxSyncRead)>, name: String, reader: BoxSyncRead) -> Result<()> {
    if sender.send((name, reader)).await.is_err() {
        exn::bail!(ErrorKind::Archive);
    }
    Ok(())
}
