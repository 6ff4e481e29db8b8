pub mod prelude {
    pub use serde::{Deserialize, Serialize};

    pub use super::{Error, StoreKind};

    pub use super::{
        catalog::{Catalog, PageEntry, SharedCatalog},
        config::{Config, ConfigBuilder},
        header::{HeaderParser, PageHeader, TtiParser},
        index::{IndexReader, IndexRecord},
        ingest::ScanReport,
        node::{Node, NodeRef, NULL_REF},
        store::{BackingStore, FileStore, MemStore},
    };

    /// Channel (magazine) number, 1..8
    pub type Channel = u8;
    /// Page number inside a channel, 0x00..0xFF
    pub type PageNo = u8;
    /// Subpage number, 0..99
    pub type Subpage = u8;
    /// Ordinal position of a page in the index store
    pub type PageIndex = u16;
    pub type IResult<T> = Result<T, Error>;
}

mod sync {
    pub use parking_lot::Mutex;
    pub use std::sync::Arc;
}

mod catalog;
mod config;
mod directory;
mod header;
mod index;
mod ingest;
mod node;
mod pool;
mod store;

pub use catalog::{Catalog, SharedCatalog};
pub use ingest::{init_catalog, scan_catalog_from_index};

use node::NodeRef;

/// Which external store an error came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Index,
    Content,
    Backing,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{store:?} store unavailable: {source}")]
    StoreUnavailable {
        store: StoreKind,
        #[source]
        source: std::io::Error,
    },
    #[error("node pool exhausted")]
    PoolExhausted,
    #[error("no valid header for page #{page_index} at offset {offset}")]
    MalformedHeader { page_index: u16, offset: u32 },
    #[error("access of {len} bytes at {offset} is out of bounds")]
    OutOfBounds { offset: u32, len: usize },
    #[error("node reference {0:?} is outside the pool")]
    BadRef(NodeRef),
    #[error("corrupted: {0}")]
    Corrupted(String),
    #[error("bad layout: {0}")]
    Layout(String),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] bincode::Error),
}

impl Error {
    pub(crate) fn unavailable(store: StoreKind, source: std::io::Error) -> Self {
        Error::StoreUnavailable { store, source }
    }
}
