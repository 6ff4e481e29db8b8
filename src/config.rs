use crate::{
    directory::DIRECTORY_SIZE,
    node::{NODE_SIZE, NULL_REF},
    prelude::*,
    sync::*,
};
/// Configuration of the page catalog
use std::path::{Path, PathBuf};

/// Size of the serial RAM the catalog was laid out for
pub const DEFAULT_STORE_CAPACITY: u32 = 32 * 1024;

#[derive(Clone, Debug, Default)]
pub struct Config(Arc<ConfigInner>);

impl Config {
    pub fn new(inner: ConfigInner) -> Self {
        Self(Arc::new(inner))
    }

    /// Offset of the first node record, right after the directory
    pub fn pool_base(&self) -> IResult<u32> {
        self.directory_base.checked_add(DIRECTORY_SIZE).ok_or_else(|| {
            Error::Layout(format!("directory at {} overflows the address space", self.directory_base))
        })
    }

    /// Number of usable node records
    pub fn node_capacity(&self) -> u16 {
        if let Some(n) = self.max_nodes {
            return n
        }

        let base = match self.pool_base() {
            Ok(base) => base,
            Err(_) => return 0,
        };
        let room = self.store_capacity.saturating_sub(base) / NODE_SIZE as u32;
        room.min(NULL_REF.index() as u32 - 1) as u16
    }

    pub fn validate(&self) -> IResult<()> {
        let base = self.pool_base()?;
        if self.node_capacity() >= NULL_REF.index() {
            return Err(Error::Layout(format!(
                "max_nodes {} collides with the null reference",
                self.node_capacity()
            )))
        }

        let end = base as u64 + self.node_capacity() as u64 * NODE_SIZE as u64;
        if end > self.store_capacity as u64 {
            return Err(Error::Layout(format!(
                "directory and {} nodes need {} bytes, store holds {}",
                self.node_capacity(),
                end,
                self.store_capacity
            )))
        }

        Ok(())
    }
}

impl std::ops::Deref for Config {
    type Target = ConfigInner;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Clone, Debug)]
pub struct ConfigInner {
    /// Path to the ordered page index
    pub index_path: PathBuf,
    /// Path to the page content store
    pub content_path: PathBuf,
    /// Bytes available in the backing store
    pub store_capacity: u32,
    /// Offset of the directory region
    pub directory_base: u32,
    /// Pool size, derived from `store_capacity` when unset
    pub max_nodes: Option<u16>,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("onair/pages.idx"),
            content_path: PathBuf::from("onair/pages.all"),
            store_capacity: DEFAULT_STORE_CAPACITY,
            directory_base: 0,
            max_nodes: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    inner: ConfigInner,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for `pages.idx` and `pages.all` under `dir`
    pub fn path<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.inner.index_path = dir.as_ref().join("pages.idx");
        self.inner.content_path = dir.as_ref().join("pages.all");
        self
    }

    pub fn index_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.inner.index_path = path.into();
        self
    }

    pub fn content_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.inner.content_path = path.into();
        self
    }

    pub fn store_capacity(mut self, bytes: u32) -> Self {
        self.inner.store_capacity = bytes;
        self
    }

    pub fn directory_base(mut self, offset: u32) -> Self {
        self.inner.directory_base = offset;
        self
    }

    pub fn max_nodes(mut self, nodes: u16) -> Self {
        self.inner.max_nodes = Some(nodes);
        self
    }

    pub fn build(self) -> Config {
        Config::new(self.inner)
    }
}
