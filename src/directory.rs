/// (channel, page) -> chain head
use crate::{
    node::{decode_ref, encode_ref, REF_SIZE},
    prelude::*,
};

pub const CHANNELS: u32 = 8;
pub const PAGES_PER_CHANNEL: u32 = 256;
/// Bytes taken by the directory region
pub const DIRECTORY_SIZE: u32 = CHANNELS * PAGES_PER_CHANNEL * REF_SIZE as u32;

#[derive(Debug)]
pub(crate) struct Directory {
    base: u32,
}

impl Directory {
    pub fn new(base: u32) -> Self {
        Self { base }
    }

    /// Channels 1..8 land on slots 0..7, anything else wraps modulo 8
    pub fn slot(channel: Channel, page: PageNo) -> u32 {
        let channel = channel.wrapping_sub(1) as u32 & (CHANNELS - 1);
        (channel << 8) + page as u32
    }

    fn offset(&self, channel: Channel, page: PageNo) -> u32 {
        self.base + Self::slot(channel, page) * REF_SIZE as u32
    }

    pub fn lookup<S: BackingStore>(&self, store: &mut S, channel: Channel, page: PageNo) -> IResult<NodeRef> {
        let mut buf = [0u8; REF_SIZE];
        store.read_at(self.offset(channel, page), &mut buf)?;
        decode_ref(&buf)
    }

    /// Overwrite the slot. The displaced chain is the caller's business.
    pub fn bind<S: BackingStore>(
        &self,
        store: &mut S,
        channel: Channel,
        page: PageNo,
        node: NodeRef,
    ) -> IResult<()> {
        store.write_at(self.offset(channel, page), &encode_ref(node)?)
    }

    /// Null every slot
    pub fn clear<S: BackingStore>(&self, store: &mut S) -> IResult<()> {
        let null = encode_ref(NULL_REF)?;
        let region = null.repeat((CHANNELS * PAGES_PER_CHANNEL) as usize);
        store.write_at(self.base, &region)
    }
}
