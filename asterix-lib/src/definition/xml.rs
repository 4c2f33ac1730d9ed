use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::trace;

use super::{BitsField, Category, DataItem, DefinitionParser, Encoding, ItemFormat, Uap};
use crate::{Error, Result};

/// Parser for the ASTERIX XML category definition dialect.
///
/// Only the elements needed to slice records and name fields are interpreted: `Category`,
/// `DataItem`, `DataItemName`, the item formats, `Bits` and the first `UAP` of each category.
/// Everything else (descriptions, value tables, notes) is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlParser;

impl DefinitionParser for XmlParser {
    fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<Category>> {
        let mut xml = Reader::from_reader(reader);
        let mut state = State::default();
        let mut buf = Vec::new();

        loop {
            match xml.read_event_into(&mut buf)? {
                Event::Start(e) => state.start(&e)?,
                Event::Empty(e) => {
                    state.start(&e)?;
                    state.end(e.name().as_ref())?;
                }
                Event::End(e) => state.end(e.name().as_ref())?,
                Event::Text(t) => {
                    if state.collecting.is_some() {
                        state.text.push_str(&t.unescape()?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(cat) = state.category {
            return Err(Error::Definition(format!(
                "category {} is not terminated",
                cat.id
            )));
        }
        if state.categories.is_empty() {
            return Err(Error::Definition("no categories found".to_string()));
        }
        Ok(state.categories)
    }
}

/// Element whose text content is being collected.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Collect {
    ItemName,
    BitsShortName,
    BitsName,
    UapItem,
}

/// A format element that has been opened but not closed.
#[derive(Debug)]
enum Node {
    Fixed { length: usize, bits: Vec<BitsField> },
    Variable(Vec<ItemFormat>),
    Repetitive(Option<ItemFormat>),
    Explicit(Option<ItemFormat>),
    Compound(Vec<ItemFormat>),
    Bds,
}

impl Node {
    fn finish(self) -> Result<ItemFormat> {
        Ok(match self {
            Node::Fixed { length, bits } => ItemFormat::Fixed { length, bits },
            Node::Variable(parts) => {
                if parts.is_empty() {
                    return Err(Error::Definition("variable item without parts".into()));
                }
                ItemFormat::Variable(parts)
            }
            Node::Repetitive(Some(inner)) => ItemFormat::Repetitive(Box::new(inner)),
            Node::Repetitive(None) => {
                return Err(Error::Definition("repetitive item without element".into()))
            }
            Node::Explicit(inner) => ItemFormat::Explicit(inner.map(Box::new)),
            Node::Compound(mut children) => {
                if children.is_empty() {
                    return Err(Error::Definition("compound item without subfields".into()));
                }
                let primary = children.remove(0);
                ItemFormat::Compound(Box::new(primary), children)
            }
            Node::Bds => ItemFormat::Bds,
        })
    }

    fn attach(&mut self, child: ItemFormat) -> Result<()> {
        match self {
            Node::Variable(parts) | Node::Compound(parts) => parts.push(child),
            Node::Repetitive(inner) | Node::Explicit(inner) => *inner = Some(child),
            Node::Fixed { .. } | Node::Bds => {
                return Err(Error::Definition(
                    "fixed length formats cannot contain other formats".into(),
                ))
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct State {
    categories: Vec<Category>,
    category: Option<Category>,
    item: Option<(String, String, Option<ItemFormat>)>,
    nodes: Vec<Node>,
    bits: Option<BitsField>,
    // Only the first UAP of a category is used
    uap_seen: bool,
    in_uap: bool,
    uap_frn: Option<usize>,
    collecting: Option<Collect>,
    text: String,
}

impl State {
    fn start(&mut self, e: &BytesStart) -> Result<()> {
        match e.name().as_ref() {
            b"Category" => {
                let id = attr(e, b"id")?
                    .ok_or_else(|| Error::Definition("category without id".into()))?;
                let id = id
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| Error::Definition(format!("invalid category id {id:?}")))?;
                trace!(category = id, "parsing category");
                self.category = Some(Category {
                    id,
                    name: attr(e, b"name")?.unwrap_or_default(),
                    version: attr(e, b"ver")?.unwrap_or_default(),
                    items: Vec::new(),
                    uap: Uap::default(),
                });
                self.uap_seen = false;
            }
            b"DataItem" => {
                let id = attr(e, b"id")?
                    .ok_or_else(|| Error::Definition("data item without id".into()))?;
                self.item = Some((id, String::new(), None));
            }
            b"DataItemName" => self.collect(Collect::ItemName),
            b"Fixed" => {
                let length = attr(e, b"length")?
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .ok_or_else(|| Error::Definition("fixed format without length".into()))?;
                self.nodes.push(Node::Fixed {
                    length,
                    bits: Vec::new(),
                });
            }
            b"Variable" => self.nodes.push(Node::Variable(Vec::new())),
            b"Repetitive" => self.nodes.push(Node::Repetitive(None)),
            b"Explicit" => self.nodes.push(Node::Explicit(None)),
            b"Compound" => self.nodes.push(Node::Compound(Vec::new())),
            b"BDS" => self.nodes.push(Node::Bds),
            b"Bits" => {
                let (from, to) = match attr(e, b"bit")? {
                    Some(bit) => {
                        let bit = parse_bit(&bit)?;
                        (bit, bit)
                    }
                    None => {
                        let from = attr(e, b"from")?.ok_or_else(|| {
                            Error::Definition("bits without bit or from attribute".into())
                        })?;
                        let to = attr(e, b"to")?.ok_or_else(|| {
                            Error::Definition("bits without to attribute".into())
                        })?;
                        (parse_bit(&from)?, parse_bit(&to)?)
                    }
                };
                let encoding = attr(e, b"encode")?
                    .map(|v| Encoding::from_attr(v.trim()))
                    .unwrap_or_default();
                self.bits = Some(BitsField {
                    short_name: String::new(),
                    name: String::new(),
                    from,
                    to,
                    encoding,
                    scale: None,
                });
            }
            b"BitsShortName" => self.collect(Collect::BitsShortName),
            b"BitsName" => self.collect(Collect::BitsName),
            b"BitsUnit" => {
                let scale = attr(e, b"scale")?.and_then(|v| v.trim().parse::<f64>().ok());
                if let Some(bits) = self.bits.as_mut() {
                    bits.scale = scale;
                }
            }
            b"UAP" => {
                self.in_uap = !self.uap_seen;
                self.uap_seen = true;
            }
            b"UAPItem" if self.in_uap => {
                self.uap_frn = attr(e, b"frn")?.and_then(|v| v.trim().parse::<usize>().ok());
                self.collect(Collect::UapItem);
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) -> Result<()> {
        match name {
            b"Category" => {
                if let Some(cat) = self.category.take() {
                    self.categories.push(cat);
                }
            }
            b"DataItem" => {
                let Some((id, name, format)) = self.item.take() else {
                    return Ok(());
                };
                let Some(cat) = self.category.as_mut() else {
                    return Err(Error::Definition(format!("item {id} outside a category")));
                };
                let format = format.ok_or_else(|| {
                    Error::Definition(format!("item {id} of category {} has no format", cat.id))
                })?;
                cat.items.push(DataItem { id, name, format });
            }
            b"DataItemName" => {
                let text = self.take_text();
                if let Some(item) = self.item.as_mut() {
                    item.1 = text;
                }
            }
            b"Fixed" | b"Variable" | b"Repetitive" | b"Explicit" | b"Compound" | b"BDS" => {
                let Some(node) = self.nodes.pop() else {
                    return Ok(());
                };
                let format = node.finish()?;
                match self.nodes.last_mut() {
                    Some(parent) => parent.attach(format)?,
                    None => {
                        if let Some(item) = self.item.as_mut() {
                            item.2.get_or_insert(format);
                        }
                    }
                }
            }
            b"Bits" => {
                if let (Some(bits), Some(Node::Fixed { bits: fields, .. })) =
                    (self.bits.take(), self.nodes.last_mut())
                {
                    fields.push(bits);
                }
            }
            b"BitsShortName" => {
                let text = self.take_text();
                if let Some(bits) = self.bits.as_mut() {
                    bits.short_name = text;
                }
            }
            b"BitsName" => {
                let text = self.take_text();
                if let Some(bits) = self.bits.as_mut() {
                    bits.name = text;
                }
            }
            b"UAP" => self.in_uap = false,
            b"UAPItem" if self.in_uap => {
                let text = self.take_text();
                if let (Some(frn), Some(cat)) = (self.uap_frn.take(), self.category.as_mut()) {
                    let id = match text.as_str() {
                        "" | "-" | "FX" | "spare" => None,
                        _ => Some(text),
                    };
                    cat.uap.set(frn, id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn collect(&mut self, what: Collect) {
        self.collecting = Some(what);
        self.text.clear();
    }

    fn take_text(&mut self) -> String {
        self.collecting = None;
        let text = self.text.trim().to_string();
        self.text.clear();
        text
    }
}

fn attr(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for a in e.attributes() {
        let a = a.map_err(quick_xml::Error::from)?;
        if a.key.as_ref() == name {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_bit(value: &str) -> Result<usize> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|b| *b > 0)
        .ok_or_else(|| Error::Definition(format!("invalid bit number {value:?}")))
}
