//! Supplier feed acquisition and parsing.
//!
//! Feeds are XML documents with repeated `<item>` elements. Parsing is
//! streaming so multi-hundred-MB feeds never load into memory: the parser
//! yields one [`RawProductRecord`] per item as it walks the document.

mod fetch;
mod text;

pub use fetch::{feed_checksum, FeedFetcher};
pub use text::{decode_html_entities, fix_mojibake, normalize};

use crate::error::{Error, Result};
use crate::models::{Category, RawProductRecord};
use quick_xml::events::Event;
use quick_xml::Reader;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Streaming XML feed parser yielding one record per `<item>`.
pub struct FeedParser<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    parsed: u64,
    done: bool,
}

impl FeedParser<BufReader<File>> {
    /// Open a feed file for streaming.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> FeedParser<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            parsed: 0,
            done: false,
        }
    }

    /// Records yielded so far.
    pub fn records_parsed(&self) -> u64 {
        self.parsed
    }

    /// Parse one `<item>` body. Returns `None` for items without a feed id.
    fn read_item(&mut self) -> Result<Option<RawProductRecord>> {
        let mut rec = RawProductRecord::default();
        let mut text = String::new();

        // <category> and <additional_field> open nested contexts that
        // commit on their closing tag.
        let mut in_category = false;
        let mut category_id: Option<String> = None;
        let mut category_name: Option<String> = None;
        let mut in_field = false;
        let mut field_name: Option<String> = None;
        let mut field_value: Option<String> = None;

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => {
                    text.clear();
                    match e.local_name().as_ref() {
                        b"category" => {
                            in_category = true;
                            category_id = None;
                            category_name = None;
                        }
                        b"additional_field" => {
                            in_field = true;
                            field_name = None;
                            field_value = None;
                        }
                        _ => {}
                    }
                }
                Ok(Event::Text(t)) => {
                    let decoded = t
                        .unescape()
                        .map_err(|e| Error::Feed(format!("bad XML text: {}", e)))?;
                    text.push_str(&decoded);
                }
                Ok(Event::CData(t)) => {
                    text.push_str(&String::from_utf8_lossy(&t));
                }
                Ok(Event::End(e)) => {
                    let value = text.trim();
                    match e.local_name().as_ref() {
                        b"item" => {
                            if rec.feed_id.is_empty() {
                                debug!("Skipping product without feed id");
                                return Ok(None);
                            }
                            return Ok(Some(rec));
                        }
                        b"id" => rec.feed_id = value.to_string(),
                        b"sku" => rec.sku = opt_text(value),
                        b"gtin" => rec.gtin = opt_text(value),
                        b"title" => rec.title = opt_normalized(value),
                        b"description" => rec.description = opt_normalized(value),
                        b"link" => rec.link = opt_text(value),
                        b"price" => rec.price_retail = parse_price(value),
                        b"purchase_price" => rec.price_purchase = parse_price(value),
                        b"weight" => rec.weight_grams = parse_weight(value),
                        b"availability" => rec.availability = opt_text(value),
                        b"condition" => rec.condition = opt_text(value),
                        b"image_link" | b"additional_image_link" => rec.add_image(value),
                        b"category" => {
                            if category_id.is_some() || category_name.is_some() {
                                rec.categories.push(Category {
                                    id: category_id.take(),
                                    name: category_name.take(),
                                });
                            }
                            in_category = false;
                        }
                        b"category_id" if in_category => category_id = opt_text(value),
                        b"category_name" if in_category => category_name = opt_normalized(value),
                        b"name" | b"n" if in_field => field_name = opt_normalized(value),
                        b"value" if in_field => field_value = opt_text(value),
                        b"additional_field" => {
                            if let (Some(name), Some(val)) = (field_name.take(), field_value.take())
                            {
                                rec.add_attribute(&name, &val);
                            }
                            in_field = false;
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => {
                    return Err(Error::Feed(
                        "unexpected end of feed inside <item>".to_string(),
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::Feed(format!(
                        "XML error at position {}: {}",
                        self.reader.error_position(),
                        e
                    )));
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for FeedParser<R> {
    type Item = Result<RawProductRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => {
                    if e.local_name().as_ref() == b"item" {
                        match self.read_item() {
                            Ok(Some(record)) => {
                                self.parsed += 1;
                                if self.parsed % 500 == 0 {
                                    debug!("Parsed {} products", self.parsed);
                                }
                                return Some(Ok(record));
                            }
                            Ok(None) => continue,
                            Err(e) => {
                                self.done = true;
                                return Some(Err(e));
                            }
                        }
                    }
                }
                Ok(Event::Eof) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::Feed(format!(
                        "XML error at position {}: {}",
                        self.reader.error_position(),
                        e
                    ))));
                }
            }
        }
    }
}

fn opt_text(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn opt_normalized(value: &str) -> Option<String> {
    let cleaned = normalize(value);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Parse a price like "11.931 EUR". Blank is silently absent.
fn parse_price(value: &str) -> Option<Decimal> {
    if value.trim().is_empty() {
        return None;
    }
    let cleaned = value.replace("EUR", "");
    match cleaned.trim().parse::<Decimal>() {
        Ok(price) => Some(price),
        Err(_) => {
            warn!("Cannot parse price: {}", value);
            None
        }
    }
}

/// Parse a weight like "450.00g" into whole grams.
fn parse_weight(value: &str) -> Option<i64> {
    if value.trim().is_empty() {
        return None;
    }
    let cleaned = value.to_lowercase().replace('g', "");
    match cleaned.trim().parse::<f64>() {
        Ok(grams) => Some(grams.round() as i64),
        Err(_) => {
            warn!("Cannot parse weight: {}", value);
            None
        }
    }
}
