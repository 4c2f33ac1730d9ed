//! ASTERIX category definitions.
//!
//! A [Definition] aggregates the categories read from any number of definition files. Each
//! category describes its data items and the User Application Profile (UAP) mapping FSPEC
//! bits to items.
mod xml;

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use tracing::debug;

pub use xml::XmlParser;

use crate::Result;

/// Parses one definition file into categories.
pub trait DefinitionParser: Send + Sync {
    /// Parse every category in `reader`.
    ///
    /// # Errors
    /// If the content cannot be read or is not a valid definition.
    fn parse(&self, reader: &mut dyn BufRead) -> Result<Vec<Category>>;
}

/// Aggregate of all loaded categories.
#[derive(Debug, Default, Clone)]
pub struct Definition {
    categories: BTreeMap<u8, Category>,
    sources: Vec<PathBuf>,
}

impl Definition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge categories parsed from `source`. A category already present is replaced.
    pub fn merge<P: AsRef<Path>>(&mut self, source: P, categories: Vec<Category>) {
        let source = source.as_ref();
        for cat in categories {
            if let Some(old) = self.categories.insert(cat.id, cat) {
                debug!(category = old.id, ?source, "replacing category definition");
            }
        }
        self.sources.push(source.to_path_buf());
    }

    #[must_use]
    pub fn category(&self, id: u8) -> Option<&Category> {
        self.categories.get(&id)
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// Files that contributed to this definition, in load order.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: u8,
    pub name: String,
    pub version: String,
    pub items: Vec<DataItem>,
    pub uap: Uap,
}

impl Category {
    /// Data item for the provided id, e.g., `"010"`.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&DataItem> {
        self.items.iter().find(|i| i.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataItem {
    pub id: String,
    pub name: String,
    pub format: ItemFormat,
}

/// Layout of a data item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemFormat {
    Fixed { length: usize, bits: Vec<BitsField> },
    /// Fixed length parts chained by the FX bit in the last octet of each part.
    Variable(Vec<ItemFormat>),
    /// A one octet repetition factor followed by that many elements.
    Repetitive(Box<ItemFormat>),
    /// A one octet length, including itself, followed by the content, which is opaque when
    /// not described.
    Explicit(Option<Box<ItemFormat>>),
    /// Primary subfield indicator followed by the present subfields.
    Compound(Box<ItemFormat>, Vec<ItemFormat>),
    /// Mode S comm-B data buffer register.
    Bds,
}

impl ItemFormat {
    /// Length of a comm-B register.
    pub const BDS_LEN: usize = 8;

    /// Fixed length of this format, if it has one.
    #[must_use]
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            ItemFormat::Fixed { length, .. } => Some(*length),
            ItemFormat::Bds => Some(Self::BDS_LEN),
            _ => None,
        }
    }
}

/// How the bits of a field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Unsigned,
    Signed,
    Octal,
    /// ICAO 6-bit characters.
    SixBitChar,
    Ascii,
    Hex,
}

impl Encoding {
    /// Encoding for an XML `encode` attribute value. Unknown values are unsigned.
    #[must_use]
    pub fn from_attr(value: &str) -> Self {
        match value {
            "signed" => Encoding::Signed,
            "octal" => Encoding::Octal,
            "6bitschar" => Encoding::SixBitChar,
            "ascii" => Encoding::Ascii,
            "hex" => Encoding::Hex,
            _ => Encoding::Unsigned,
        }
    }
}

/// A named bit range within a fixed length part.
///
/// Bits are numbered from 1 (the LSB of the last octet) up to `8 * length` (the MSB of the
/// first octet), as in the ASTERIX documents.
#[derive(Debug, Clone, PartialEq)]
pub struct BitsField {
    pub short_name: String,
    pub name: String,
    pub from: usize,
    pub to: usize,
    pub encoding: Encoding,
    pub scale: Option<f64>,
}

impl BitsField {
    /// Number of bits in this field.
    #[must_use]
    pub fn width(&self) -> usize {
        self.from.abs_diff(self.to) + 1
    }

    /// True for the field extension indicator of a variable part.
    #[must_use]
    pub fn is_fx(&self) -> bool {
        self.short_name.eq_ignore_ascii_case("FX")
    }
}

/// User Application Profile: `slots[frn - 1]` is the item id for field reference number
/// `frn`, or `None` for spare slots.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Uap {
    pub slots: Vec<Option<String>>,
}

impl Uap {
    /// Item id for a 1-based field reference number.
    #[must_use]
    pub fn item_id(&self, frn: usize) -> Option<&str> {
        self.slots.get(frn.checked_sub(1)?)?.as_deref()
    }

    pub(crate) fn set(&mut self, frn: usize, id: Option<String>) {
        if frn == 0 {
            return;
        }
        if self.slots.len() < frn {
            self.slots.resize(frn, None);
        }
        self.slots[frn - 1] = id;
    }
}
