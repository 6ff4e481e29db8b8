/// Fixed-size node records threaded through a free list
use crate::{
    node::{Node, NODE_SIZE},
    prelude::*,
};

/// The allocator over the node region of a backing store.
///
/// Holds only the layout and the free-list head; the records live in the store.
#[derive(Debug)]
pub(crate) struct NodePool {
    base: u32,
    capacity: u16,
    free_head: NodeRef,
}

impl NodePool {
    pub fn new(base: u32, capacity: u16) -> Self {
        Self { base, capacity, free_head: NULL_REF }
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn free_head(&self) -> NodeRef {
        self.free_head
    }

    fn offset(&self, node: NodeRef) -> IResult<u32> {
        if node.index() >= self.capacity {
            return Err(Error::BadRef(node))
        }
        Ok(self.base + node.index() as u32 * NODE_SIZE as u32)
    }

    pub fn read<S: BackingStore>(&self, store: &mut S, node: NodeRef) -> IResult<Node> {
        let mut buf = [0u8; NODE_SIZE];
        store.read_at(self.offset(node)?, &mut buf)?;
        Node::decode(&buf)
    }

    pub fn write<S: BackingStore>(&self, store: &mut S, node: NodeRef, value: &Node) -> IResult<()> {
        store.write_at(self.offset(node)?, &value.encode()?)
    }

    /// Thread every record into the free list, ascending.
    ///
    /// Destroys whatever chains were in the region.
    pub fn format<S: BackingStore>(&mut self, store: &mut S) -> IResult<()> {
        let mut region = Vec::with_capacity(self.capacity as usize * NODE_SIZE);
        for i in 0..self.capacity {
            let next = if i + 1 < self.capacity { NodeRef::new(i + 1) } else { NULL_REF };
            region.extend(Node::Free { next }.encode()?);
        }
        store.write_at(self.base, &region)?;

        self.free_head = if self.capacity > 0 { NodeRef::new(0) } else { NULL_REF };
        log::info!("node pool formatted: {} nodes at {}", self.capacity, self.base);
        Ok(())
    }

    /// Pop the free-list head.
    ///
    /// The record is left as it was; the caller writes it before linking it anywhere.
    pub fn allocate<S: BackingStore>(&mut self, store: &mut S) -> IResult<NodeRef> {
        let head = self.free_head;
        if head.is_null() {
            return Err(Error::PoolExhausted)
        }

        match self.read(store, head)? {
            Node::Free { next } => {
                self.free_head = next;
                log::trace!("allocated {:?}, free head {:?}", head, next);
                Ok(head)
            }
            Node::Occupied { .. } => {
                Err(Error::Corrupted(format!("free list head {:?} is occupied", head)))
            }
        }
    }

    /// Push `node` onto the free list.
    ///
    /// `node` must already be unlinked from every catalog chain.
    pub fn release<S: BackingStore>(&mut self, store: &mut S, node: NodeRef) -> IResult<()> {
        self.write(store, node, &Node::Free { next: self.free_head })?;
        self.free_head = node;
        Ok(())
    }

    /// References on the free list, head first
    pub fn free_list<S: BackingStore>(&self, store: &mut S) -> IResult<Vec<NodeRef>> {
        let mut refs = Vec::new();
        let mut cursor = self.free_head;

        while !cursor.is_null() {
            if refs.len() >= self.capacity as usize {
                return Err(Error::Corrupted("free list has a cycle".to_string()))
            }
            refs.push(cursor);
            cursor = match self.read(store, cursor)? {
                Node::Free { next } => next,
                Node::Occupied { .. } => {
                    return Err(Error::Corrupted(format!("{:?} on the free list is occupied", cursor)))
                }
            };
        }

        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::HashSet;

    const CAP: u16 = 64;

    fn pool() -> (NodePool, MemStore) {
        crate::test_log::init();
        let mut store = MemStore::new(CAP as u32 * NODE_SIZE as u32);
        let mut pool = NodePool::new(0, CAP);
        pool.format(&mut store).unwrap();
        (pool, store)
    }

    #[test]
    fn test_format_closes_free_list() {
        let (pool, mut store) = pool();

        let mut seen = HashSet::new();
        let mut cursor = pool.free_head();
        for _ in 0..CAP {
            assert!(seen.insert(cursor), "{:?} visited twice", cursor);
            cursor = match pool.read(&mut store, cursor).unwrap() {
                Node::Free { next } => next,
                node => panic!("unexpected {:?}", node),
            };
        }

        assert_eq!(cursor, NULL_REF);
        assert_eq!(seen.len(), CAP as usize);
        // last record carries the end mark on the medium
        assert_eq!(store.snapshot()[CAP as usize * NODE_SIZE - 1], crate::node::END_MARK);
    }

    #[test]
    fn test_exhaustion() {
        let (mut pool, mut store) = pool();

        for i in 0..CAP {
            assert_eq!(pool.allocate(&mut store).unwrap(), NodeRef::new(i));
        }
        assert!(matches!(pool.allocate(&mut store), Err(Error::PoolExhausted)));
        assert!(pool.free_list(&mut store).unwrap().is_empty());

        pool.release(&mut store, NodeRef::new(9)).unwrap();
        assert_eq!(pool.allocate(&mut store).unwrap(), NodeRef::new(9));
        assert!(matches!(pool.allocate(&mut store), Err(Error::PoolExhausted)));
    }

    #[test]
    fn test_release_is_lifo() {
        let (mut pool, mut store) = pool();

        let a = pool.allocate(&mut store).unwrap();
        let b = pool.allocate(&mut store).unwrap();
        pool.release(&mut store, a).unwrap();
        pool.release(&mut store, b).unwrap();

        assert_eq!(pool.read(&mut store, b).unwrap(), Node::Free { next: a });
        assert_eq!(pool.allocate(&mut store).unwrap(), b);
        assert_eq!(pool.allocate(&mut store).unwrap(), a);
    }

    #[test]
    fn test_bad_ref() {
        let (mut pool, mut store) = pool();
        assert!(matches!(
            pool.release(&mut store, NodeRef::new(CAP)),
            Err(Error::BadRef(_))
        ));
        assert!(matches!(pool.read(&mut store, NULL_REF), Err(Error::BadRef(_))));
    }

    #[test]
    fn test_allocated_disjoint_from_free() {
        let (mut pool, mut store) = pool();
        let mut rng = StdRng::seed_from_u64(0x7e1e7e47);
        let mut allocated: Vec<NodeRef> = Vec::new();

        for _ in 0..2000 {
            if allocated.is_empty() || rng.gen_bool(0.55) {
                match pool.allocate(&mut store) {
                    Ok(node) => {
                        assert!(!allocated.contains(&node), "{:?} handed out twice", node);
                        pool.write(
                            &mut store,
                            node,
                            &Node::Occupied { page_index: 1, subpage: 0, next: NULL_REF },
                        )
                        .unwrap();
                        allocated.push(node);
                    }
                    Err(Error::PoolExhausted) => assert_eq!(allocated.len(), CAP as usize),
                    Err(e) => panic!("{:?}", e),
                }
            } else {
                let node = allocated.swap_remove(rng.gen_range(0..allocated.len()));
                pool.release(&mut store, node).unwrap();
            }

            let free: HashSet<_> = pool.free_list(&mut store).unwrap().into_iter().collect();
            assert_eq!(free.len() + allocated.len(), CAP as usize);
            assert!(allocated.iter().all(|node| !free.contains(node)));
        }
    }

    #[test]
    fn test_occupied_head_detected() {
        let (mut pool, mut store) = pool();
        pool.write(
            &mut store,
            pool.free_head(),
            &Node::Occupied { page_index: 3, subpage: 1, next: NULL_REF },
        )
        .unwrap();
        assert!(matches!(pool.allocate(&mut store), Err(Error::Corrupted(_))));
    }
}
