//! Writing packages.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{self, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builds a package one entry at a time.
///
/// Entries are compressed straight into the underlying writer, so only the
/// entry currently being written is ever in flight.
pub struct ArchiveWriter<W: Write + Seek> {
    inner: ZipWriter<W>,
    options: SimpleFileOptions,
    entries: usize,
}
impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: ZipWriter::new(writer),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            entries: 0,
        }
    }

    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.start(name)?;
        self.inner.write_all(data).or_raise(|| ErrorKind::Io)?;
        Ok(())
    }

    /// Copy everything `reader` yields into a new entry.
    pub fn add_reader(&mut self, name: &str, reader: &mut impl Read) -> Result<u64> {
        self.start(name)?;
        io::copy(reader, &mut self.inner).or_raise(|| ErrorKind::Io)
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Write the central directory and hand back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.inner.finish().or_raise(|| ErrorKind::Io)
    }

    fn start(&mut self, name: &str) -> Result<()> {
        if name.starts_with('/') || name.split('/').any(|part| part == "..") {
            exn::bail!(ErrorKind::UnsafePath(name.to_string()));
        }
        self.inner.start_file(name, self.options).or_raise(|| ErrorKind::Io)?;
        self.entries += 1;
        Ok(())
    }
}
