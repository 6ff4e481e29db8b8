/// Page header extraction from the content store
use crate::prelude::*;

/// Channel value meaning "no header parsed yet"
pub const UNPARSED_CHANNEL: Channel = 9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageHeader {
    pub channel: Channel,
    pub page: PageNo,
    pub subpage: Subpage,
}

impl PageHeader {
    pub fn unparsed() -> Self {
        Self { channel: UNPARSED_CHANNEL, page: 0, subpage: 0 }
    }

    pub fn is_parsed(&self) -> bool {
        (1..=8).contains(&self.channel)
    }
}

impl Default for PageHeader {
    fn default() -> Self {
        Self::unparsed()
    }
}

/// Folds one text line of a page into its header.
///
/// Lines that carry no header information leave `header` as it was.
pub trait HeaderParser {
    fn parse_line(&self, line: &str, header: &mut PageHeader);
}

/// Parser for TTI page files, where the `PN,mppss` line names the page.
#[derive(Clone, Copy, Debug, Default)]
pub struct TtiParser;

impl TtiParser {
    fn page_number(value: &str) -> Option<PageHeader> {
        let value = value.trim();
        if !value.bytes().all(|b| b.is_ascii_hexdigit()) || value.len() < 3 || value.len() > 5 {
            return None
        }

        let channel = value[..1].parse::<Channel>().ok().filter(|m| (1..=8).contains(m))?;
        let page = u8::from_str_radix(&value[1..3], 16).ok()?;
        let subpage = match &value[3..] {
            "" => 0,
            ss => ss.parse::<Subpage>().ok().filter(|ss| *ss <= crate::node::MAX_SUBPAGE)?,
        };

        Some(PageHeader { channel, page, subpage })
    }
}

impl HeaderParser for TtiParser {
    fn parse_line(&self, line: &str, header: &mut PageHeader) {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let value = match line.strip_prefix("PN,") {
            Some(value) => value,
            None => return,
        };

        match Self::page_number(value) {
            Some(parsed) => {
                log::trace!("header {:?} from {:?}", parsed, line);
                *header = parsed;
            }
            None => log::warn!("ignoring bad page number {:?}", line),
        }
    }
}
