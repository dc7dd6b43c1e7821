//! VTODO document generation and parsing.
//!
//! This module reads and writes task documents according to RFC 5545.
//! The bridge talks to it through [`Codec`] so a backend can plug in its own
//! serializer.

mod generate;
mod parse;

use crate::config::BridgeConfig;
use crate::error::DavResult;
use crate::model::{Collection, Item};

pub use generate::generate_ics;
pub use parse::parse_todo;

pub const CONTENT_TYPE: &str = "text/calendar; charset=utf-8; component=vtodo";

/// Converts between task documents and items.
pub trait Codec: Send + Sync {
    /// Parse a single-task document. Fails on documents without a VTODO or UID.
    fn parse_document(&self, content: &str) -> DavResult<Item>;

    /// Render `items` as one calendar, named after `collection` if given.
    fn render_document(&self, collection: Option<&Collection>, items: &[Item]) -> String;
}

/// The RFC 5545 codec.
#[derive(Debug, Clone)]
pub struct IcsCodec {
    prodid: String,
}

impl IcsCodec {
    pub fn new(config: &BridgeConfig) -> Self {
        IcsCodec {
            prodid: config.prodid.clone(),
        }
    }
}

impl Default for IcsCodec {
    fn default() -> Self {
        IcsCodec::new(&BridgeConfig::default())
    }
}

impl Codec for IcsCodec {
    fn parse_document(&self, content: &str) -> DavResult<Item> {
        parse_todo(content)
    }

    fn render_document(&self, collection: Option<&Collection>, items: &[Item]) -> String {
        generate_ics(&self.prodid, collection.map(|c| c.title.as_str()), items)
    }
}
