//! Provides a general interface to a physical OPC package (ZIP file).
//!
//! The package layer talks to the container only through [`ArchiveStore`]:
//! fetch a member, replace a member, and serialize the whole container once
//! composition is done. [`ZipStore`] is the in-memory implementation backed by
//! the `zip` crate.

use crate::ooxml::opc::error::{OpcError, Result};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Named-member container consumed by [`crate::ooxml::opc::Package`].
///
/// Member names carry no leading slash ("ppt/slides/slide1.xml").
#[allow(async_fn_in_trait)]
pub trait ArchiveStore {
    /// Bytes of a member. Fails with `PartNotFound` when absent.
    async fn get(&self, name: &str) -> Result<Bytes>;

    /// Create or replace a member.
    async fn set(&mut self, name: &str, data: Bytes) -> Result<()>;

    /// Drop a member. Returns whether it existed.
    async fn remove(&mut self, name: &str) -> Result<bool>;

    fn contains(&self, name: &str) -> bool;

    /// Member names in container order.
    fn names(&self) -> Vec<String>;

    /// Serialize the container.
    async fn finalize(self) -> Result<Vec<u8>>;
}

/// ZIP container held fully in memory.
///
/// Entries keep the order they had in the source archive; new entries are
/// appended. `[Content_Types].xml` stays wherever the source put it, which
/// is first for every Office-written package.
#[derive(Debug, Clone, Default)]
pub struct ZipStore {
    entries: Vec<(String, Bytes)>,
    index: HashMap<String, usize>,
    deflate: bool,
}

impl ZipStore {
    /// Create an empty store that writes deflated entries.
    pub fn new() -> Self {
        Self {
            deflate: true,
            ..Self::default()
        }
    }

    /// Read every member of a ZIP archive held in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;
        let mut store = Self::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)?;
            store.insert(file.name().to_string(), Bytes::from(buf));
        }
        Ok(store)
    }

    /// Open an OPC package from a file path.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OpcError::PartNotFound(path.display().to_string())
            } else {
                OpcError::Io(e)
            }
        })?;
        Self::from_bytes(&data)
    }

    /// Whether `finalize` compresses entries (Deflate) or stores them as-is.
    pub fn with_deflate(mut self, deflate: bool) -> Self {
        self.deflate = deflate;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, name: String, data: Bytes) {
        match self.index.get(&name) {
            Some(&pos) => self.entries[pos].1 = data,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, data));
            },
        }
    }

    fn write_archive(&self) -> Result<Vec<u8>> {
        let method = if self.deflate {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        let options = SimpleFileOptions::default().compression_method(method);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in &self.entries {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(data)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Serialize and write the container to `path`.
    pub async fn save<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let data = self.finalize().await?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }
}

impl ArchiveStore for ZipStore {
    async fn get(&self, name: &str) -> Result<Bytes> {
        self.index
            .get(name)
            .map(|&pos| self.entries[pos].1.clone())
            .ok_or_else(|| OpcError::PartNotFound(name.to_string()))
    }

    async fn set(&mut self, name: &str, data: Bytes) -> Result<()> {
        self.insert(name.to_string(), data);
        Ok(())
    }

    async fn remove(&mut self, name: &str) -> Result<bool> {
        let Some(pos) = self.index.remove(name) else {
            return Ok(false);
        };
        self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Ok(true)
    }

    fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    async fn finalize(self) -> Result<Vec<u8>> {
        self.write_archive()
    }
}
