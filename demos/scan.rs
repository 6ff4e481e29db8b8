use pagelist::prelude::*;
use std::{env, path::PathBuf};

fn main() -> IResult<()> {
    env_logger::init();

    // usage: scan [onair dir] [backing file]
    let mut args = env::args().skip(1);
    let dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("onair"));
    let ram = args.next().map(PathBuf::from).unwrap_or_else(|| dir.join("serial.ram"));

    let config = ConfigBuilder::new().path(&dir).build();
    let store = FileStore::open(&ram, config.store_capacity)?;
    let mut catalog = Catalog::new(config, store)?;

    let report = catalog.init()?;
    println!("{} pages, {} replaced", report.pages, report.replaced);

    for channel in 1..=8 {
        for (page, entry) in catalog.channel_pages(channel)? {
            println!("{}{:02X}/{:02} -> #{}", channel, page, entry.subpage, entry.page_index);
        }
    }
    println!("{} of {} nodes free", catalog.free_count()?, catalog.capacity());

    catalog.dump()
}
