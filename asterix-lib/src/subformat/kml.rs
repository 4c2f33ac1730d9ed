use std::fmt::Write;

use quick_xml::escape::escape;

use super::{emit, flush, Outcome, Subformat, Unit};
use crate::descriptor::FormatDescriptor;
use crate::record::Record;
use crate::Channel;

const HEADER: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n",
    "<Document>\n",
    "<name>ASTERIX</name>\n",
);
const FOOTER: &str = "</Document>\n</kml>\n";

/// Position in degrees from the WGS-84 latitude and longitude fields of a record.
pub(crate) fn position(record: &Record) -> Option<(f64, f64)> {
    let lat = record
        .field("Lat")
        .or_else(|| record.field("Latitude"))?
        .value
        .as_f64()?;
    let lon = record
        .field("Lon")
        .or_else(|| record.field("Longitude"))?
        .value
        .as_f64()?;
    Some((lat, lon))
}

/// Identification for a record: the callsign if present, otherwise the track number.
pub(crate) fn label(record: &Record) -> Option<String> {
    ["TId", "Callsign", "TRN", "TrkN"]
        .iter()
        .find_map(|name| record.field(name))
        .map(|f| f.value.to_string())
}

/// KML document with one placemark per positioned record.
#[derive(Debug, Default)]
pub struct KmlFormat {
    started: bool,
    placemarks: usize,
}

impl KmlFormat {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of placemarks written so far.
    #[must_use]
    pub fn placemarks(&self) -> usize {
        self.placemarks
    }
}

impl Subformat for KmlFormat {
    fn write_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        let when = unit.timestamp_or_now().to_rfc3339();
        let mut s = String::new();
        let mut count = 0;
        for record in unit.records() {
            let Some((lat, lon)) = position(record) else {
                continue;
            };
            let name = label(record).unwrap_or_else(|| format!("CAT{:03}", record.category));
            let _ = write!(
                s,
                "<Placemark><name>{}</name><TimeStamp><when>{when}</when></TimeStamp>\
                 <Point><coordinates>{lon:.6},{lat:.6}</coordinates></Point></Placemark>\n",
                escape(&name)
            );
            count += 1;
        }
        if count == 0 {
            return Outcome::Discarded;
        }

        if !self.started {
            s.insert_str(0, HEADER);
        }
        let outcome = emit(ch, s.as_bytes());
        if outcome == Outcome::Consumed {
            self.started = true;
            self.placemarks += count;
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
