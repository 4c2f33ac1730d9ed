use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use super::{decode_payload, emit, flush, Convention, IdleMonitor, Outcome, Subformat, Unit};
use crate::bytes::Bytes;
use crate::descriptor::FormatDescriptor;
use crate::record::DataBlock;
use crate::Channel;

/// Back-to-back data blocks, optionally grouped behind Oradis headers.
///
/// With [Convention::Standard] each unit is a single data block. With [Convention::Oradis]
/// each unit is an Oradis header followed by the data blocks it covers. The Oradis
/// timestamp is seconds since the Unix epoch.
#[derive(Debug, Default)]
pub struct RawFormat {
    convention: Convention,
    bytes: Bytes,
    idle: IdleMonitor,
}

impl RawFormat {
    #[must_use]
    pub fn new(convention: Convention) -> Self {
        Self {
            convention,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle = IdleMonitor::new(timeout);
        self
    }

    #[must_use]
    pub fn convention(&self) -> Convention {
        self.convention
    }

    fn name(&self) -> &'static str {
        match self.convention {
            Convention::Standard => "ASTERIX_RAW",
            Convention::Oradis => "ASTERIX_ORADIS_RAW",
        }
    }

    /// Read exactly `buf.len()` bytes. `Err` carries the outcome to report when that is not
    /// possible; `started` tells whether a partial unit has already been consumed.
    fn read_exact(
        &mut self,
        ch: &mut dyn Channel,
        buf: &mut [u8],
        started: bool,
    ) -> std::result::Result<(), Outcome> {
        match self.bytes.fill(ch, buf) {
            Ok(n) if n == buf.len() => Ok(()),
            Ok(0) if !started => {
                debug!(format = self.name(), offset = self.bytes.offset(), "end of stream");
                Err(Outcome::EndOfStream)
            }
            Ok(n) => {
                warn!(
                    format = self.name(),
                    offset = self.bytes.offset(),
                    expected = buf.len(),
                    got = n,
                    "end of stream mid-unit"
                );
                Err(Outcome::EndOfStream)
            }
            Err(err) => {
                error!(format = self.name(), %err, "failed to read channel");
                Err(Outcome::EndOfStream)
            }
        }
    }

    fn read_standard(&mut self, ch: &mut dyn Channel, unit: &mut Unit) -> Outcome {
        let mut header = [0u8; DataBlock::HEADER_LEN];
        if let Err(outcome) = self.read_exact(ch, &mut header, false) {
            return outcome;
        }
        let len = usize::from(u16::from_be_bytes([header[1], header[2]]));
        if len < DataBlock::HEADER_LEN {
            error!(
                format = self.name(),
                offset = self.bytes.offset(),
                len,
                "invalid data block length; framing lost"
            );
            return Outcome::EndOfStream;
        }

        let mut block = vec![0u8; len];
        block[..DataBlock::HEADER_LEN].copy_from_slice(&header);
        if let Err(outcome) = self.read_exact(ch, &mut block[DataBlock::HEADER_LEN..], true) {
            return outcome;
        }
        unit.set(&block, Utc::now());
        Outcome::Consumed
    }

    fn read_oradis(&mut self, ch: &mut dyn Channel, unit: &mut Unit) -> Outcome {
        let mut header = [0u8; Convention::ORADIS_HEADER_LEN];
        if let Err(outcome) = self.read_exact(ch, &mut header, false) {
            return outcome;
        }
        let (len, timestamp) = parse_oradis_header(&header);
        if len < Convention::ORADIS_HEADER_LEN {
            error!(
                format = self.name(),
                offset = self.bytes.offset(),
                len,
                "invalid Oradis length; framing lost"
            );
            return Outcome::EndOfStream;
        }

        let mut payload = vec![0u8; len - Convention::ORADIS_HEADER_LEN];
        if let Err(outcome) = self.read_exact(ch, &mut payload, true) {
            return outcome;
        }
        if payload.is_empty() {
            debug!(format = self.name(), "empty Oradis unit");
            return Outcome::Discarded;
        }
        unit.set(&payload, timestamp.unwrap_or_else(Utc::now));
        Outcome::Consumed
    }
}

/// Total length and timestamp from an Oradis header.
pub(crate) fn parse_oradis_header(
    header: &[u8; Convention::ORADIS_HEADER_LEN],
) -> (usize, Option<DateTime<Utc>>) {
    let len = usize::from(u16::from_be_bytes([header[0], header[1]]));
    let secs = u32::from_be_bytes([header[2], header[3], header[4], header[5]]);
    (len, DateTime::from_timestamp(i64::from(secs), 0))
}

/// Oradis header for a payload of `len` bytes, or `None` if it does not fit the length field.
pub(crate) fn oradis_header(
    len: usize,
    timestamp: DateTime<Utc>,
) -> Option<[u8; Convention::ORADIS_HEADER_LEN]> {
    let total = u16::try_from(len + Convention::ORADIS_HEADER_LEN).ok()?;
    let secs = u32::try_from(timestamp.timestamp()).unwrap_or_default();
    let mut header = [0u8; Convention::ORADIS_HEADER_LEN];
    header[..2].copy_from_slice(&total.to_be_bytes());
    header[2..].copy_from_slice(&secs.to_be_bytes());
    Some(header)
}

impl Subformat for RawFormat {
    fn read_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        let outcome = match self.convention {
            Convention::Standard => self.read_standard(ch, unit),
            Convention::Oradis => self.read_oradis(ch, unit),
        };
        if outcome == Outcome::Consumed {
            self.idle.touch();
        }
        outcome
    }

    fn decode_unit(
        &mut self,
        ctx: &FormatDescriptor,
        _ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        decode_payload(ctx, unit)
    }

    fn write_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        let payload: Vec<u8> = unit
            .blocks
            .iter()
            .flat_map(|b| b.data.iter().copied())
            .collect();
        if payload.is_empty() {
            return Outcome::Discarded;
        }

        let mut dat = Vec::with_capacity(payload.len() + Convention::ORADIS_HEADER_LEN);
        if self.convention == Convention::Oradis {
            let Some(header) = oradis_header(payload.len(), unit.timestamp_or_now()) else {
                warn!(len = payload.len(), "unit too large for an Oradis header");
                return Outcome::Discarded;
            };
            dat.extend_from_slice(&header);
        }
        dat.extend_from_slice(&payload);
        emit(ch, &dat)
    }

    fn heartbeat(&mut self, _ctx: &FormatDescriptor, ch: &mut dyn Channel) -> bool {
        flush(ch);
        self.idle.check(self.name());
        true
    }
}
