use std::fmt::Write;

use super::{emit, Outcome, Subformat, Unit};
use crate::descriptor::FormatDescriptor;
use crate::Channel;

/// One line per record: timestamp, category and every field as `item.field=value`.
#[derive(Debug, Default)]
pub struct OutFormat;

impl OutFormat {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Subformat for OutFormat {
    fn write_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        let timestamp = unit.timestamp_or_now().to_rfc3339();
        let mut s = String::new();
        for record in unit.records() {
            let _ = write!(s, "{timestamp} CAT{:03}", record.category);
            for item in &record.items {
                for field in &item.fields {
                    let _ = write!(s, " {}.{}={}", item.id, field.short_name, field.value);
                }
            }
            s.push('\n');
        }
        if s.is_empty() {
            return Outcome::Discarded;
        }
        emit(ch, s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::record::tests::{test_definition, BLOCK};
    use crate::subformat::decode_payload;
    use crate::WriteChannel;

    #[test]
    fn one_line_per_record() {
        let ctx = FormatDescriptor::new(test_definition());
        let mut unit = Unit::new();
        unit.set(&BLOCK, DateTime::from_timestamp(0, 0).unwrap());
        assert_eq!(decode_payload(&ctx, &mut unit), Outcome::Consumed);

        let mut out = WriteChannel::new(Vec::new());
        assert_eq!(
            OutFormat::new().write_unit(&ctx, &mut out, &mut unit),
            Outcome::Consumed
        );

        let text = String::from_utf8(out.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "1970-01-01T00:00:00+00:00 CAT048 010.SAC=25 010.SIC=10 020.TYP=2 020.TST=1 161.TRN=1234"
        );
        assert_eq!(lines[1], "1970-01-01T00:00:00+00:00 CAT048");
    }
}
