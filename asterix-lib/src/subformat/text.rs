use std::fmt::Write;

use super::{emit, Outcome, Subformat, Unit};
use crate::descriptor::FormatDescriptor;
use crate::Channel;

/// Verbose listing of every block, record, item and field.
#[derive(Debug, Default)]
pub struct TextFormat {
    num_blocks: usize,
}

impl TextFormat {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn render(&mut self, unit: &Unit) -> String {
        let mut s = String::new();
        let timestamp = unit.timestamp_or_now();
        for block in &unit.blocks {
            self.num_blocks += 1;
            let _ = writeln!(s, "Data Block {}", self.num_blocks);
            let _ = writeln!(s, "Timestamp: {}", timestamp.to_rfc3339());
            let _ = writeln!(s, "Category: {}", block.category);
            let _ = writeln!(s, "Length: {}", block.len());
            let _ = writeln!(s, "Data: {}", hex(&block.data));
            if block.records.is_empty() {
                let _ = writeln!(s, "  (no definition for category {})", block.category);
            }
            for (idx, record) in block.records.iter().enumerate() {
                let _ = writeln!(s, "  Record {} FSPEC {}", idx + 1, hex(&record.fspec));
                for item in &record.items {
                    let _ = writeln!(
                        s,
                        "    Item {:03}/{} {} [{}]",
                        record.category,
                        item.id,
                        item.name,
                        hex(&item.data)
                    );
                    for field in &item.fields {
                        let _ = writeln!(
                            s,
                            "      {} ({}): {}",
                            field.short_name, field.name, field.value
                        );
                    }
                }
            }
            s.push('\n');
        }
        s
    }
}

pub(crate) fn hex(dat: &[u8]) -> String {
    dat.iter().fold(String::with_capacity(dat.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

impl Subformat for TextFormat {
    fn write_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        if unit.blocks.is_empty() {
            return Outcome::Discarded;
        }
        let text = self.render(unit);
        emit(ch, text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::record::tests::{test_definition, BLOCK};
    use crate::subformat::decode_payload;
    use crate::WriteChannel;

    #[test]
    fn lists_blocks_items_and_fields() {
        let ctx = FormatDescriptor::new(test_definition());
        let mut unit = Unit::new();
        unit.set(&BLOCK, Utc::now());
        assert_eq!(decode_payload(&ctx, &mut unit), Outcome::Consumed);

        let mut out = WriteChannel::new(Vec::new());
        let mut fmt = TextFormat::new();
        assert_eq!(fmt.write_unit(&ctx, &mut out, &mut unit), Outcome::Consumed);

        let text = String::from_utf8(out.into_inner().unwrap()).unwrap();
        assert!(text.starts_with("Data Block 1\n"), "{text}");
        assert!(text.contains("Category: 48\n"));
        assert!(text.contains("Item 048/010 Data Source Identifier [190a]"));
        assert!(text.contains("SAC (): 25\n"));
        assert!(text.contains("TRN (): 1234\n"));
    }

    #[test]
    fn nothing_decoded_is_discarded() {
        let ctx = FormatDescriptor::new(test_definition());
        let mut out = WriteChannel::new(Vec::new());
        let mut fmt = TextFormat::new();
        assert_eq!(
            fmt.write_unit(&ctx, &mut out, &mut Unit::new()),
            Outcome::Discarded
        );
    }

    #[test]
    fn read_and_decode_are_unsupported() {
        let ctx = FormatDescriptor::new(test_definition());
        let mut ch = WriteChannel::new(Vec::new());
        let mut unit = Unit::new();
        unit.set(&BLOCK, Utc::now());
        let mut fmt = TextFormat::new();

        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::Unsupported);
        assert_eq!(fmt.decode_unit(&ctx, &mut ch, &mut unit), Outcome::Unsupported);
        assert!(unit.blocks.is_empty());
        assert!(!fmt.heartbeat(&ctx, &mut ch));
    }
}
