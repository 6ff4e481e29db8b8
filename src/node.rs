use crate::prelude::*;
use bincode::Options;
use std::fmt;

/// Encoded size of a node record
pub const NODE_SIZE: usize = 5;
/// Encoded size of a node reference
pub const REF_SIZE: usize = 2;

/// Subpage byte of a free node that has a successor
pub const FREE_MARK: u8 = 0xFF;
/// Subpage byte of the free node that terminates the free list
pub const END_MARK: u8 = 0xFE;
/// Largest real subpage number
pub const MAX_SUBPAGE: Subpage = 99;

pub const NULL_REF: NodeRef = NodeRef(0xFFFF);

/// Index of a record in the node pool, never a memory address
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct NodeRef(u16);

impl NodeRef {
    pub const fn new(index: u16) -> Self {
        NodeRef(index)
    }

    pub fn index(self) -> u16 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self == NULL_REF
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("NodeRef(null)")
        } else {
            write!(f, "NodeRef({})", self.0)
        }
    }
}

/// A node record as the catalog sees it.
///
/// The medium packs the state into the subpage byte; nothing above the
/// codec ever sees a mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    /// Owned by the free list, `next` is `NULL_REF` on the last one
    Free { next: NodeRef },
    /// Owned by exactly one catalog chain
    Occupied { page_index: PageIndex, subpage: Subpage, next: NodeRef },
}

impl Node {
    pub fn next(&self) -> NodeRef {
        match *self {
            Node::Free { next } | Node::Occupied { next, .. } => next,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Node::Free { .. })
    }

    pub(crate) fn encode(&self) -> IResult<Vec<u8>> {
        let raw = match *self {
            Node::Free { next } => RawNode {
                page_index: 0,
                next,
                subpage: if next.is_null() { END_MARK } else { FREE_MARK },
            },
            Node::Occupied { page_index, subpage, next } => {
                if subpage > MAX_SUBPAGE {
                    return Err(Error::Corrupted(format!("subpage {} out of range", subpage)))
                }
                RawNode { page_index, next, subpage }
            }
        };
        Ok(codec().serialize(&raw)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> IResult<Self> {
        let raw: RawNode = codec().deserialize(bytes)?;
        match raw.subpage {
            FREE_MARK => Ok(Node::Free { next: raw.next }),
            END_MARK => Ok(Node::Free { next: NULL_REF }),
            subpage if subpage <= MAX_SUBPAGE => Ok(Node::Occupied {
                page_index: raw.page_index,
                subpage,
                next: raw.next,
            }),
            other => Err(Error::Corrupted(format!("unknown subpage mark {:#04x}", other))),
        }
    }
}

/// On-medium layout of a node record
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
struct RawNode {
    page_index: u16,
    next: NodeRef,
    subpage: u8,
}

impl Default for NodeRef {
    fn default() -> Self {
        NULL_REF
    }
}

/// Fixed-width little-endian encoding shared by every on-medium record
pub(crate) fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

pub(crate) fn encode_ref(node: NodeRef) -> IResult<Vec<u8>> {
    Ok(codec().serialize(&node)?)
}

pub(crate) fn decode_ref(bytes: &[u8]) -> IResult<NodeRef> {
    Ok(codec().deserialize(bytes)?)
}
