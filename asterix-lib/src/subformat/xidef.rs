use std::fmt::Write;

use quick_xml::escape::escape;

use super::text::hex;
use super::{emit, flush, Outcome, Subformat, Unit};
use crate::descriptor::FormatDescriptor;
use crate::Channel;

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<XIDEF>\n";
const FOOTER: &str = "</XIDEF>\n";

/// XIDEF XML interchange, one `ASTERIX` element per record.
#[derive(Debug, Default)]
pub struct XidefFormat {
    started: bool,
}

impl XidefFormat {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Subformat for XidefFormat {
    fn write_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        let time = unit.timestamp_or_now().to_rfc3339();
        let mut s = String::new();
        for record in unit.records() {
            let _ = writeln!(
                s,
                "<ASTERIX cat=\"{:03}\" time=\"{time}\">",
                record.category
            );
            for item in &record.items {
                let _ = writeln!(
                    s,
                    "<Item id=\"{}\" name=\"{}\" data=\"{}\">",
                    escape(&item.id),
                    escape(&item.name),
                    hex(&item.data)
                );
                for field in &item.fields {
                    let _ = writeln!(
                        s,
                        "<Field name=\"{}\">{}</Field>",
                        escape(&field.short_name),
                        escape(&field.value.to_string())
                    );
                }
                s.push_str("</Item>\n");
            }
            s.push_str("</ASTERIX>\n");
        }
        if s.is_empty() {
            return Outcome::Discarded;
        }

        if !self.started {
            s.insert_str(0, HEADER);
        }
        let outcome = emit(ch, s.as_bytes());
        if outcome == Outcome::Consumed {
            self.started = true;
        }
        outcome
    }

    fn finish(&mut self, _ctx: &FormatDescriptor, ch: &mut dyn Channel) -> bool {
        if !self.started {
            return false;
        }
        self.started = false;
        let outcome = emit(ch, FOOTER.as_bytes());
        flush(ch);
        outcome == Outcome::Consumed
    }
}
