/// Rebuilding the catalog from the page index and content store
use crate::{
    header::{HeaderParser, PageHeader, TtiParser},
    index::{IndexReader, IndexRecord},
    prelude::*,
};
use std::{
    convert::TryFrom,
    fs::File,
    io::{BufRead, BufReader, Read, Seek, SeekFrom},
};

/// What a rebuild did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Index records consumed
    pub pages: usize,
    /// Records that displaced an earlier page with the same key
    pub replaced: usize,
}

/// Open the configured stores, then format and rebuild `catalog`.
///
/// Nothing is formatted when either store cannot be opened.
pub fn init_catalog<S: BackingStore>(catalog: &mut Catalog<S>, config: &Config) -> IResult<ScanReport> {
    log::info!("initialising catalog from {:?}", config.index_path);

    let index = File::open(&config.index_path)
        .map_err(|e| Error::unavailable(StoreKind::Index, e))?;
    let content = File::open(&config.content_path)
        .map_err(|e| Error::unavailable(StoreKind::Content, e))?;

    scan_catalog_from_index(catalog, BufReader::new(index), content, &TtiParser)
}

/// Format `catalog` and link every page of `index`, in index order.
///
/// The first failure aborts the scan and leaves the catalog not ready.
pub fn scan_catalog_from_index<S, I, C, P>(
    catalog: &mut Catalog<S>,
    index: I,
    mut content: C,
    parser: &P,
) -> IResult<ScanReport>
where
    S: BackingStore,
    I: Read,
    C: Read + Seek,
    P: HeaderParser,
{
    catalog.format()?;

    let mut report = ScanReport::default();
    for (position, record) in IndexReader::new(index).enumerate() {
        let record = record?;
        let page_index = PageIndex::try_from(position).map_err(|_| {
            Error::Corrupted(format!("index holds more than {} pages", PageIndex::MAX as usize + 1))
        })?;

        let header = read_header(&mut content, &record, page_index, parser)?;
        let (_, replaced) =
            catalog.link_page_inner(header.channel, header.page, header.subpage, page_index)?;

        report.pages += 1;
        if replaced {
            report.replaced += 1;
        }
    }

    catalog.set_ready();
    log::info!(
        "catalog built: {} pages, {} replaced, {} nodes free",
        report.pages,
        report.replaced,
        catalog.free_count()?
    );
    Ok(report)
}

/// Parse lines of one record until a header turns up, never reading past the record.
fn read_header<C, P>(
    content: &mut C,
    record: &IndexRecord,
    page_index: PageIndex,
    parser: &P,
) -> IResult<PageHeader>
where
    C: Read + Seek,
    P: HeaderParser,
{
    let unavailable = |e| Error::unavailable(StoreKind::Content, e);

    content.seek(SeekFrom::Start(record.seek_offset as u64)).map_err(unavailable)?;
    let mut page = BufReader::new(content.take(record.record_size as u64));

    let mut header = PageHeader::unparsed();
    let mut line = Vec::new();
    while !header.is_parsed() {
        line.clear();
        if page.read_until(b'\n', &mut line).map_err(unavailable)? == 0 {
            return Err(Error::MalformedHeader { page_index, offset: record.seek_offset })
        }
        parser.parse_line(&String::from_utf8_lossy(&line), &mut header);
    }

    log::debug!(
        "#{} at {}: {}{:02X}/{:02}",
        page_index,
        record.seek_offset,
        header.channel,
        header.page,
        header.subpage
    );
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Content and index stores for pages given as (PN value, padded size)
    fn stores(pages: &[(&str, usize)]) -> (Vec<u8>, Vec<u8>) {
        let mut content = Vec::new();
        let mut index = Vec::new();

        for (pn, size) in pages {
            let mut page = format!("DE,fixture\r\nPN,{}\r\nSC,0000\r\nOL,1,hello\r\n", pn).into_bytes();
            while page.len() < *size {
                page.push(b' ');
            }
            index.extend(IndexRecord::new(content.len() as u32, page.len() as u16).to_bytes().unwrap());
            content.extend(page);
        }

        (content, index)
    }

    fn catalog(max_nodes: u16) -> Catalog<MemStore> {
        crate::test_log::init();
        let config = ConfigBuilder::new().max_nodes(max_nodes).build();
        let store = MemStore::new(config.store_capacity);
        Catalog::new(config, store).unwrap()
    }

    fn scan(catalog: &mut Catalog<MemStore>, stores: (Vec<u8>, Vec<u8>)) -> IResult<ScanReport> {
        let (content, index) = stores;
        scan_catalog_from_index(catalog, Cursor::new(index), Cursor::new(content), &TtiParser)
    }

    #[test]
    fn test_same_key_last_record_wins() {
        let mut catalog = catalog(16);
        let (content, index) = stores(&[("31000", 200), ("31001", 0)]);
        assert_eq!(&index[6..10], &200u32.to_le_bytes());

        let report = scan(&mut catalog, (content, index)).unwrap();
        assert_eq!(report, ScanReport { pages: 2, replaced: 1 });

        let entry = catalog.entry(3, 0x10).unwrap().unwrap();
        assert_eq!(entry.page_index, 1);
        assert_eq!(entry.subpage, 1);
        assert_eq!(catalog.free_count().unwrap(), 15);
        assert!(catalog.is_ready());
    }

    #[test]
    fn test_distinct_keys_round_trip() {
        let mut catalog = catalog(64);
        let keys: Vec<String> = (0..40)
            .map(|i| format!("{}{:02X}{:02}", i % 8 + 1, i * 5, i % 3))
            .collect();
        let pages: Vec<_> = keys.iter().map(|pn| (pn.as_str(), 0)).collect();

        let report = scan(&mut catalog, stores(&pages)).unwrap();
        assert_eq!(report.pages, 40);
        assert_eq!(report.replaced, 0);

        for i in 0..40u16 {
            let channel = (i % 8 + 1) as u8;
            let page = (i * 5) as u8;
            let entry = catalog.entry(channel, page).unwrap().unwrap();
            assert_eq!(entry.page_index, i);
            assert_eq!(entry.subpage, (i % 3) as u8);
        }
    }

    #[test]
    fn test_header_scan_stops_at_record_end() {
        let mut catalog = catalog(16);
        let mut content = b"DE,no page number here\r\n".to_vec();
        let first = content.len() as u16;
        content.extend(b"PN,20000\r\n");

        let mut index = IndexRecord::new(0, first).to_bytes().unwrap();
        index.extend(IndexRecord::new(first as u32, 10).to_bytes().unwrap());

        assert!(matches!(
            scan(&mut catalog, (content, index)),
            Err(Error::MalformedHeader { page_index: 0, offset: 0 })
        ));
        assert!(!catalog.is_ready());
    }

    #[test]
    fn test_header_past_end_of_content() {
        let mut catalog = catalog(16);
        let (content, _) = stores(&[("10000", 0)]);
        let index = IndexRecord::new(content.len() as u32 + 10, 50).to_bytes().unwrap();
        assert!(matches!(
            scan(&mut catalog, (content, index)),
            Err(Error::MalformedHeader { page_index: 0, .. })
        ));
    }

    #[test]
    fn test_pool_exhausted_aborts() {
        let mut catalog = catalog(2);
        let result = scan(&mut catalog, stores(&[("10000", 0), ("10100", 0), ("10200", 0)]));
        assert!(matches!(result, Err(Error::PoolExhausted)));
        assert!(!catalog.is_ready());
    }

    #[test]
    fn test_index_over_page_index_range() {
        let mut catalog = catalog(1);
        let (content, _) = stores(&[("10000", 0)]);
        let record = IndexRecord::new(0, content.len() as u16).to_bytes().unwrap();
        let index = record.repeat(PageIndex::MAX as usize + 2);

        assert!(matches!(scan(&mut catalog, (content, index)), Err(Error::Corrupted(_))));
        assert!(!catalog.is_ready());
        // every record up to the limit was linked over the same key
        assert_eq!(catalog.entry(1, 0x00).unwrap().unwrap().page_index, PageIndex::MAX);
    }

    #[test]
    fn test_rescan_starts_from_scratch() {
        let mut catalog = catalog(8);
        scan(&mut catalog, stores(&[("10000", 0), ("10100", 0)])).unwrap();
        scan(&mut catalog, stores(&[("20000", 0)])).unwrap();

        assert_eq!(catalog.entry(1, 0x00).unwrap(), None);
        assert_eq!(catalog.entry(2, 0x00).unwrap().unwrap().page_index, 0);
        assert_eq!(catalog.free_count().unwrap(), 7);
    }

    #[test]
    fn test_missing_stores_leave_catalog_unformatted() {
        let mut catalog = catalog(8);
        let dir = std::env::temp_dir().join(format!("pagelist-missing-{}", std::process::id()));
        let config = ConfigBuilder::new().path(&dir).build();

        assert!(matches!(
            init_catalog(&mut catalog, &config),
            Err(Error::StoreUnavailable { store: StoreKind::Index, .. })
        ));
        assert!(catalog.store().snapshot().iter().all(|b| *b == 0));

        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("pages.idx"), b"").unwrap();
        assert!(matches!(
            init_catalog(&mut catalog, &config),
            Err(Error::StoreUnavailable { store: StoreKind::Content, .. })
        ));
        assert!(catalog.store().snapshot().iter().all(|b| *b == 0));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_init_from_files_through_shared_catalog() {
        crate::test_log::init();
        let dir = std::env::temp_dir().join(format!("pagelist-onair-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let (content, index) = stores(&[("10000", 0), ("8FF05", 0), ("10000", 0)]);
        std::fs::write(dir.join("pages.all"), content).unwrap();
        std::fs::write(dir.join("pages.idx"), index).unwrap();

        let config = ConfigBuilder::new().path(&dir).max_nodes(32).build();
        let store = FileStore::open(dir.join("serial.ram"), config.store_capacity).unwrap();
        let shared = SharedCatalog::new(Catalog::new(config, store).unwrap());

        assert_eq!(shared.entry(1, 0x00).unwrap(), None, "not ready before rebuild");
        let report = shared.rebuild().unwrap();
        assert_eq!(report, ScanReport { pages: 3, replaced: 1 });

        assert_eq!(shared.entry(1, 0x00).unwrap().unwrap().page_index, 2);
        assert_eq!(shared.entry(8, 0xFF).unwrap().unwrap().subpage, 5);
        assert_eq!(shared.with(|catalog| catalog.free_count()).unwrap(), 30);

        drop(shared);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
