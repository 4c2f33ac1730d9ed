//! ASTERIX data blocks and records.
//!
//! A data block is a one octet category, a two octet big-endian length that includes the
//! three header octets, and one or more records. Each record starts with a field
//! specification (FSPEC) whose bits select the items present, in User Application Profile
//! order.
use std::fmt::Display;

use tracing::debug;

use crate::definition::{BitsField, Category, Definition, Encoding, ItemFormat};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataBlock {
    pub category: u8,
    /// All block bytes, including the header.
    pub data: Vec<u8>,
    /// Decoded records. Empty when the category has no definition.
    pub records: Vec<Record>,
}

impl DataBlock {
    /// Length of the category and length header.
    pub const HEADER_LEN: usize = 3;

    /// Split `dat` into blocks without decoding their records.
    ///
    /// # Errors
    /// If a declared length is shorter than the header or longer than the remaining data.
    pub fn split(dat: &[u8]) -> Result<Vec<(u8, &[u8])>> {
        let mut blocks = Vec::new();
        let mut rest = dat;
        while !rest.is_empty() {
            if rest.len() < Self::HEADER_LEN {
                return Err(Error::NotEnoughData {
                    actual: rest.len(),
                    minimum: Self::HEADER_LEN,
                });
            }
            let len = usize::from(u16::from_be_bytes([rest[1], rest[2]]));
            if len < Self::HEADER_LEN {
                return Err(Error::InvalidLength {
                    what: "data block",
                    length: len,
                });
            }
            if len > rest.len() {
                return Err(Error::NotEnoughData {
                    actual: rest.len(),
                    minimum: len,
                });
            }
            let (block, tail) = rest.split_at(len);
            blocks.push((block[0], block));
            rest = tail;
        }
        Ok(blocks)
    }

    /// Decode a single block, including its records when `def` knows the category.
    ///
    /// # Errors
    /// If the block is truncated or a record does not match its definition.
    pub fn decode(def: &Definition, block: &[u8]) -> Result<Self> {
        let category = *block.first().ok_or(Error::NotEnoughData {
            actual: 0,
            minimum: Self::HEADER_LEN,
        })?;
        let Some(cat) = def.category(category) else {
            debug!(category, "no definition for category; records not decoded");
            return Ok(DataBlock {
                category,
                data: block.to_vec(),
                records: Vec::new(),
            });
        };

        let mut records = Vec::new();
        let mut offset = Self::HEADER_LEN;
        while offset < block.len() {
            let (record, len) = decode_record(cat, &block[offset..])?;
            records.push(record);
            offset += len;
        }

        Ok(DataBlock {
            category,
            data: block.to_vec(),
            records,
        })
    }

    /// Total length of the block in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= Self::HEADER_LEN
    }
}

/// Decode every data block in `dat`.
///
/// # Errors
/// If any block cannot be decoded.
pub fn decode_blocks(def: &Definition, dat: &[u8]) -> Result<Vec<DataBlock>> {
    DataBlock::split(dat)?
        .into_iter()
        .map(|(_, block)| DataBlock::decode(def, block))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Record {
    pub category: u8,
    pub fspec: Vec<u8>,
    pub items: Vec<Item>,
    /// All record bytes, including the FSPEC.
    pub data: Vec<u8>,
}

impl Record {
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    /// First field with the given short name in any item, ignoring ASCII case.
    #[must_use]
    pub fn field(&self, short_name: &str) -> Option<&Field> {
        self.items
            .iter()
            .flat_map(|i| i.fields.iter())
            .find(|f| f.short_name.eq_ignore_ascii_case(short_name))
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Item {
    pub id: String,
    pub name: String,
    pub data: Vec<u8>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Field {
    pub short_name: String,
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    /// Value after applying the unit scale factor.
    Real(f64),
    Text(String),
}

impl Value {
    /// Numeric value, if any.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Unsigned(v) => Some(*v as f64),
            Value::Signed(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Unsigned(v) => Some(*v),
            Value::Signed(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unsigned(v) => write!(f, "{v}"),
            Value::Signed(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

fn take(dat: &[u8], len: usize) -> Result<&[u8]> {
    dat.get(..len).ok_or(Error::NotEnoughData {
        actual: dat.len(),
        minimum: len,
    })
}

/// Octets of an FX-chained sequence, i.e., a FSPEC or compound primary subfield.
fn fx_chain(dat: &[u8]) -> Result<&[u8]> {
    match dat.iter().position(|b| b & 0x01 == 0) {
        Some(idx) => Ok(&dat[..=idx]),
        None => Err(Error::NotEnoughData {
            actual: dat.len(),
            minimum: dat.len() + 1,
        }),
    }
}

/// Zero-based indexes of the bits set in an FX-chained sequence, 7 per octet, MSB first.
fn present(chain: &[u8]) -> impl Iterator<Item = usize> + '_ {
    chain.iter().enumerate().flat_map(|(i, b)| {
        (0..7usize)
            .filter(move |j| b & (0x80 >> j) != 0)
            .map(move |j| i * 7 + j)
    })
}

fn decode_record(cat: &Category, dat: &[u8]) -> Result<(Record, usize)> {
    let fspec = fx_chain(dat)?;
    let mut offset = fspec.len();
    let mut items = Vec::new();

    for idx in present(fspec) {
        let frn = idx + 1;
        let id = cat.uap.item_id(frn).ok_or_else(|| {
            Error::Malformed(format!(
                "category {} FRN {frn} is not a data item in the UAP",
                cat.id
            ))
        })?;
        let def = cat.item(id).ok_or_else(|| {
            Error::Definition(format!("category {} has no item {id}", cat.id))
        })?;
        let (len, fields) = decode_item(&def.format, &dat[offset..])?;
        items.push(Item {
            id: def.id.clone(),
            name: def.name.clone(),
            data: dat[offset..offset + len].to_vec(),
            fields,
        });
        offset += len;
    }

    Ok((
        Record {
            category: cat.id,
            fspec: fspec.to_vec(),
            items,
            data: dat[..offset].to_vec(),
        },
        offset,
    ))
}

/// Length of an item encoded with `format` at the start of `dat`, and its decoded fields.
fn decode_item(format: &ItemFormat, dat: &[u8]) -> Result<(usize, Vec<Field>)> {
    match format {
        ItemFormat::Fixed { length, bits } => {
            let part = take(dat, *length)?;
            Ok((*length, decode_fields(bits, part)))
        }
        ItemFormat::Bds => {
            take(dat, ItemFormat::BDS_LEN)?;
            Ok((ItemFormat::BDS_LEN, Vec::new()))
        }
        ItemFormat::Variable(parts) => {
            let mut offset = 0;
            let mut fields = Vec::new();
            for idx in 0.. {
                // Chains longer than described reuse the last part's layout
                let Some(part) = parts.get(idx).or(parts.last()) else {
                    return Err(Error::Definition("variable item without parts".into()));
                };
                let (len, part_fields) = decode_item(part, &dat[offset..])?;
                if len == 0 {
                    return Err(Error::Definition("zero length variable part".into()));
                }
                fields.extend(part_fields);
                offset += len;
                if dat[offset - 1] & 0x01 == 0 {
                    break;
                }
            }
            Ok((offset, fields))
        }
        ItemFormat::Repetitive(inner) => {
            let rep = usize::from(*take(dat, 1)?.first().unwrap_or(&0));
            let mut offset = 1;
            let mut fields = Vec::new();
            for _ in 0..rep {
                let (len, element_fields) = decode_item(inner, &dat[offset..])?;
                fields.extend(element_fields);
                offset += len;
            }
            Ok((offset, fields))
        }
        ItemFormat::Explicit(inner) => {
            let len = usize::from(*take(dat, 1)?.first().unwrap_or(&0));
            if len == 0 {
                return Err(Error::InvalidLength {
                    what: "explicit item",
                    length: len,
                });
            }
            let content = &take(dat, len)?[1..];
            let fields = match inner {
                Some(inner) => decode_item(inner, content)
                    .map(|(_, fields)| fields)
                    .unwrap_or_default(),
                None => Vec::new(),
            };
            Ok((len, fields))
        }
        ItemFormat::Compound(_, subfields) => {
            let primary = fx_chain(dat)?;
            let mut offset = primary.len();
            let mut fields = Vec::new();
            for idx in present(primary) {
                let sub = subfields.get(idx).ok_or_else(|| {
                    Error::Malformed(format!("compound subfield {} is not defined", idx + 1))
                })?;
                let (len, sub_fields) = decode_item(sub, &dat[offset..])?;
                fields.extend(sub_fields);
                offset += len;
            }
            Ok((offset, fields))
        }
    }
}

fn decode_fields(bits: &[BitsField], part: &[u8]) -> Vec<Field> {
    bits.iter()
        .filter(|b| !b.is_fx() && !b.short_name.is_empty() && b.short_name != "spare")
        .filter_map(|b| {
            let value = field_value(b, part)?;
            Some(Field {
                short_name: b.short_name.clone(),
                name: b.name.clone(),
                value,
            })
        })
        .collect()
}

/// Raw unsigned value of bits `hi..=lo` (1-based, counted from the LSB of the last octet).
fn extract(part: &[u8], hi: usize, lo: usize) -> Option<u128> {
    let total = part.len() * 8;
    if hi > total || lo == 0 || hi - lo >= 128 {
        return None;
    }
    let mut raw: u128 = 0;
    for bit in (lo..=hi).rev() {
        let byte = part[part.len() - 1 - (bit - 1) / 8];
        raw = (raw << 1) | u128::from((byte >> ((bit - 1) % 8)) & 0x01);
    }
    Some(raw)
}

fn field_value(b: &BitsField, part: &[u8]) -> Option<Value> {
    let (hi, lo) = (b.from.max(b.to), b.from.min(b.to));
    let width = b.width();
    let raw = extract(part, hi, lo)?;

    let value = match b.encoding {
        Encoding::Unsigned => match b.scale {
            Some(scale) => Value::Real(raw as f64 * scale),
            None => Value::Unsigned(u64::try_from(raw).ok()?),
        },
        Encoding::Signed => {
            let signed = if width < 128 && raw & (1 << (width - 1)) != 0 {
                raw as i128 - (1i128 << width)
            } else {
                raw as i128
            };
            match b.scale {
                Some(scale) => Value::Real(signed as f64 * scale),
                None => Value::Signed(i64::try_from(signed).ok()?),
            }
        }
        Encoding::Octal => Value::Text(format!("{:0w$o}", raw, w = width.div_ceil(3))),
        Encoding::Hex => Value::Text(format!("{:0w$X}", raw, w = width.div_ceil(4))),
        Encoding::SixBitChar => {
            let s: String = (0..width / 6)
                .rev()
                .map(|i| icao_char(((raw >> (i * 6)) & 0x3f) as u8))
                .collect();
            Value::Text(s.trim_end().to_string())
        }
        Encoding::Ascii => {
            let s: String = (0..width / 8)
                .rev()
                .map(|i| char::from(((raw >> (i * 8)) & 0xff) as u8))
                .collect();
            Value::Text(s.trim_end_matches(['\0', ' ']).to_string())
        }
    };
    Some(value)
}

/// ICAO 6-bit character set used for aircraft identification.
fn icao_char(code: u8) -> char {
    match code {
        1..=26 => char::from(b'A' + code - 1),
        32 => ' ',
        48..=57 => char::from(code),
        _ => '?',
    }
}
