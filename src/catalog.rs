use crate::{
    directory::{Directory, DIRECTORY_SIZE},
    ingest::{self, ScanReport},
    pool::NodePool,
    prelude::*,
    sync::*,
};

/// A catalogued page, as read back from its node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageEntry {
    pub node: NodeRef,
    pub page_index: PageIndex,
    pub subpage: Subpage,
}

/// The display list: directory plus node pool over one backing store.
///
/// Every chain is reachable from exactly one directory slot, every other
/// node is on the free list.
#[derive(Debug)]
pub struct Catalog<S: BackingStore> {
    config: Config,
    store: S,
    pool: NodePool,
    directory: Directory,
    ready: bool,
}

impl<S: BackingStore> Catalog<S> {
    /// Wrap a store. Nothing is read or written until `format` or `init`.
    pub fn new(config: Config, store: S) -> IResult<Self> {
        config.validate()?;

        let base = config.pool_base()?;
        let needed = base as u64
            + config.node_capacity() as u64 * crate::node::NODE_SIZE as u64;
        if needed > store.capacity() as u64 {
            return Err(Error::Layout(format!(
                "catalog needs {} bytes, backing store holds {}",
                needed,
                store.capacity()
            )))
        }

        let pool = NodePool::new(base, config.node_capacity());
        let directory = Directory::new(config.directory_base);
        Ok(Self { config, store, pool, directory, ready: false })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// True once a full rebuild has succeeded since the last format
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn set_ready(&mut self) {
        self.ready = true;
    }

    /// Rebuild the free list and null every directory slot.
    pub fn format(&mut self) -> IResult<()> {
        self.ready = false;
        self.directory.clear(&mut self.store)?;
        self.pool.format(&mut self.store)?;
        log::info!(
            "catalog formatted: directory {} bytes at {}, {} nodes",
            DIRECTORY_SIZE,
            self.config.directory_base,
            self.pool.capacity()
        );
        Ok(())
    }

    /// Format, then ingest the configured index and content stores.
    pub fn init(&mut self) -> IResult<ScanReport> {
        let config = self.config.clone();
        ingest::init_catalog(self, &config)
    }

    pub fn lookup(&mut self, channel: Channel, page: PageNo) -> IResult<NodeRef> {
        self.directory.lookup(&mut self.store, channel, page)
    }

    pub fn node(&mut self, node: NodeRef) -> IResult<Node> {
        self.pool.read(&mut self.store, node)
    }

    /// Head entry for the key, if the key is catalogued
    pub fn entry(&mut self, channel: Channel, page: PageNo) -> IResult<Option<PageEntry>> {
        let head = self.lookup(channel, page)?;
        if head.is_null() {
            return Ok(None)
        }
        self.occupied(head).map(|(entry, _)| Some(entry))
    }

    /// Every entry in the key's chain, head first
    pub fn chain(&mut self, channel: Channel, page: PageNo) -> IResult<Vec<PageEntry>> {
        let mut entries = Vec::new();
        let mut cursor = self.lookup(channel, page)?;

        while !cursor.is_null() {
            if entries.len() >= self.pool.capacity() as usize {
                return Err(Error::Corrupted(format!("chain of {}/{:02X} loops", channel, page)))
            }
            let (entry, next) = self.occupied(cursor)?;
            entries.push(entry);
            cursor = next;
        }

        Ok(entries)
    }

    /// Transmission order of one channel: catalogued pages by page number
    pub fn channel_pages(&mut self, channel: Channel) -> IResult<Vec<(PageNo, PageEntry)>> {
        let mut pages = Vec::new();
        for page in 0..=PageNo::MAX {
            if let Some(entry) = self.entry(channel, page)? {
                pages.push((page, entry));
            }
        }
        Ok(pages)
    }

    /// Insert a page, replacing whatever the key held before.
    ///
    /// The displaced chain is unbound and returned to the free list before the
    /// new node is allocated, so an overwrite never leaks and a failed
    /// allocation leaves the catalog untouched.
    pub fn link_page(
        &mut self,
        channel: Channel,
        page: PageNo,
        subpage: Subpage,
        page_index: PageIndex,
    ) -> IResult<NodeRef> {
        self.link_page_inner(channel, page, subpage, page_index).map(|(node, _)| node)
    }

    pub(crate) fn link_page_inner(
        &mut self,
        channel: Channel,
        page: PageNo,
        subpage: Subpage,
        page_index: PageIndex,
    ) -> IResult<(NodeRef, bool)> {
        if subpage > crate::node::MAX_SUBPAGE {
            return Err(Error::Corrupted(format!("subpage {} out of range", subpage)))
        }

        let old = self.lookup(channel, page)?;
        let replaced = !old.is_null();
        if replaced {
            // multiple subpages are not rotated, the newest one wins
            log::warn!(
                "page {}{:02X} already catalogued, replacing it with #{}",
                channel,
                page,
                page_index
            );
            self.directory.bind(&mut self.store, channel, page, NULL_REF)?;
            self.release_chain(old)?;
        }

        let node = self.pool.allocate(&mut self.store)?;
        self.pool.write(
            &mut self.store,
            node,
            &Node::Occupied { page_index, subpage, next: NULL_REF },
        )?;
        self.directory.bind(&mut self.store, channel, page, node)?;

        log::debug!(
            "linked {}{:02X}/{:02} #{} at {:?}",
            channel,
            page,
            subpage,
            page_index,
            node
        );
        Ok((node, replaced))
    }

    /// Drop a key from the catalog, returning its nodes to the pool
    pub fn remove_page(&mut self, channel: Channel, page: PageNo) -> IResult<bool> {
        let head = self.lookup(channel, page)?;
        if head.is_null() {
            return Ok(false)
        }

        self.directory.bind(&mut self.store, channel, page, NULL_REF)?;
        self.release_chain(head)?;
        log::debug!("removed {}{:02X}", channel, page);
        Ok(true)
    }

    /// Release an already unbound chain
    fn release_chain(&mut self, head: NodeRef) -> IResult<()> {
        let mut nodes = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            if nodes.len() >= self.pool.capacity() as usize {
                return Err(Error::Corrupted(format!("chain at {:?} loops", head)))
            }
            let (_, next) = self.occupied(cursor)?;
            nodes.push(cursor);
            cursor = next;
        }

        for node in nodes.iter() {
            self.pool.release(&mut self.store, *node)?;
        }
        log::debug!("released {} nodes from {:?}", nodes.len(), head);
        Ok(())
    }

    fn occupied(&mut self, node: NodeRef) -> IResult<(PageEntry, NodeRef)> {
        match self.pool.read(&mut self.store, node)? {
            Node::Occupied { page_index, subpage, next } => {
                Ok((PageEntry { node, page_index, subpage }, next))
            }
            Node::Free { .. } => {
                Err(Error::Corrupted(format!("{:?} is linked but on the free list", node)))
            }
        }
    }

    pub fn free_list(&mut self) -> IResult<Vec<NodeRef>> {
        self.pool.free_list(&mut self.store)
    }

    pub fn free_count(&mut self) -> IResult<usize> {
        self.free_list().map(|list| list.len())
    }

    pub fn capacity(&self) -> u16 {
        self.pool.capacity()
    }

    /// Log the first few nodes and directory slots
    pub fn dump(&mut self) -> IResult<()> {
        log::debug!("free list head {:?}", self.pool.free_head());
        for i in 0..self.pool.capacity().min(10) {
            let node = NodeRef::new(i);
            log::debug!("node {:?}: {:?}", node, self.node(node)?);
        }
        for page in 0..10 {
            log::debug!("slot 1{:02X}: {:?}", page, self.lookup(1, page)?);
        }
        Ok(())
    }
}

/// A catalog behind one lock, so a reader never sees a half-built directory.
pub struct SharedCatalog<S: BackingStore>(Arc<Mutex<Catalog<S>>>);

impl<S: BackingStore> Clone for SharedCatalog<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: BackingStore> SharedCatalog<S> {
    pub fn new(catalog: Catalog<S>) -> Self {
        Self(Arc::new(Mutex::new(catalog)))
    }

    /// Rebuild from the configured stores while holding the lock
    pub fn rebuild(&self) -> IResult<ScanReport> {
        self.0.lock().init()
    }

    /// Head entry of a key, or `None` when there is no usable catalog
    pub fn entry(&self, channel: Channel, page: PageNo) -> IResult<Option<PageEntry>> {
        let mut catalog = self.0.lock();
        if !catalog.is_ready() {
            return Ok(None)
        }
        catalog.entry(channel, page)
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut Catalog<S>) -> T) -> T {
        f(&mut self.0.lock())
    }
}
