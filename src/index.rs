/// Reader for the ordered page index
use crate::{node::codec, prelude::*};
use bincode::Options;
use std::io::{self, ErrorKind, Read};

pub const INDEX_RECORD_SIZE: usize = 6;

/// Where one page lives in the content store
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexRecord {
    pub seek_offset: u32,
    pub record_size: u16,
}

impl IndexRecord {
    pub fn new(seek_offset: u32, record_size: u16) -> Self {
        Self { seek_offset, record_size }
    }

    pub fn to_bytes(&self) -> IResult<Vec<u8>> {
        Ok(codec().serialize(self)?)
    }
}

/// Yields index records in arrival order
pub struct IndexReader<R> {
    inner: R,
    done: bool,
}

impl<R: Read> IndexReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    /// Fill `buf`, returning how many bytes arrived before end of stream
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn next_inner(&mut self) -> IResult<Option<IndexRecord>> {
        let mut buf = [0u8; INDEX_RECORD_SIZE];
        let filled = self.fill(&mut buf).map_err(|e| Error::unavailable(StoreKind::Index, e))?;

        match filled {
            0 => Ok(None),
            INDEX_RECORD_SIZE => Ok(Some(codec().deserialize(&buf)?)),
            n => Err(Error::unavailable(
                StoreKind::Index,
                io::Error::new(ErrorKind::UnexpectedEof, format!("trailing {} byte record", n)),
            )),
        }
    }
}

impl<R: Read> Iterator for IndexReader<R> {
    type Item = IResult<IndexRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None
        }

        let next = self.next_inner().transpose();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}
