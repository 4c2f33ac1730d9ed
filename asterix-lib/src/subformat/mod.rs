//! Framing and rendering variants behind each [FormatId](crate::FormatId).
//!
//! Input formats ([RawFormat], [PcapFormat], [HdlcFormat]) frame units out of a channel and
//! decode their ASTERIX payload. Output formats render decoded units into another
//! representation. Every variant implements [Subformat]; operations a variant does not
//! support report [Outcome::Unsupported].
mod hdlc;
mod kml;
mod out;
mod pcap;
mod raw;
mod terminal;
mod text;
mod tracks;
mod xidef;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::descriptor::FormatDescriptor;
use crate::record::{decode_blocks, DataBlock, Record};
use crate::Channel;

pub use hdlc::HdlcFormat;
pub use kml::KmlFormat;
pub use out::OutFormat;
pub use pcap::PcapFormat;
pub use raw::RawFormat;
pub use terminal::TerminalFormat;
pub use text::TextFormat;
pub use tracks::TracksFormat;
pub use xidef::XidefFormat;

/// Result of a single subformat operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    /// The unit was handled.
    Consumed,
    /// Valid framing that carries nothing to process. Later phases must be skipped.
    Discarded,
    /// The stream is exhausted or can no longer be framed.
    EndOfStream,
    /// The format does not implement this operation.
    Unsupported,
}

/// Header convention used by the raw and capture file framers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Convention {
    #[default]
    Standard,
    /// Each unit is preceded by a 6 octet Oradis header.
    Oradis,
}

impl Convention {
    /// Length of the Oradis header: 2 octet total length and a 4 octet timestamp.
    pub const ORADIS_HEADER_LEN: usize = 6;
}

/// Work buffer passed between the phases of a pipeline pass.
#[derive(Debug, Clone, Default)]
pub struct Unit {
    /// ASTERIX payload of the last framed unit, without any container headers.
    pub data: Vec<u8>,
    /// Capture or receipt time of the unit.
    pub timestamp: Option<DateTime<Utc>>,
    /// Blocks decoded from `data`.
    pub blocks: Vec<DataBlock>,
}

impl Unit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.timestamp = None;
        self.blocks.clear();
    }

    /// Replace the contents with a freshly framed payload.
    pub fn set(&mut self, data: &[u8], timestamp: DateTime<Utc>) {
        self.clear();
        self.data.extend_from_slice(data);
        self.timestamp = Some(timestamp);
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.blocks.iter().flat_map(|b| b.records.iter())
    }

    /// Unit timestamp, or the current time when the unit has none.
    #[must_use]
    pub fn timestamp_or_now(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }
}

/// Operations every format variant provides. Defaults report the operation as unsupported.
pub trait Subformat {
    /// Frame the next unit from `ch` into `unit`.
    fn read_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        _ch: &mut dyn Channel,
        _unit: &mut Unit,
    ) -> Outcome {
        Outcome::Unsupported
    }

    /// Decode the payload in `unit` into data blocks.
    fn decode_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        _ch: &mut dyn Channel,
        _unit: &mut Unit,
    ) -> Outcome {
        Outcome::Unsupported
    }

    /// Render the decoded `unit` and write it to `ch`.
    fn write_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        _ch: &mut dyn Channel,
        _unit: &mut Unit,
    ) -> Outcome {
        Outcome::Unsupported
    }

    /// Periodic housekeeping. Returns false if the format has none.
    fn heartbeat(&mut self, _ctx: &FormatDescriptor, _ch: &mut dyn Channel) -> bool {
        false
    }

    /// Called once after the last unit of a pass. Returns false if the format has nothing
    /// to complete.
    fn finish(&mut self, _ctx: &FormatDescriptor, _ch: &mut dyn Channel) -> bool {
        false
    }
}

/// Decode `unit.data` into `unit.blocks`. Undecodable payloads are discarded.
pub(crate) fn decode_payload(ctx: &FormatDescriptor, unit: &mut Unit) -> Outcome {
    unit.blocks.clear();
    match decode_blocks(ctx.definition(), &unit.data) {
        Ok(blocks) => {
            unit.blocks = blocks;
            Outcome::Consumed
        }
        Err(err) => {
            warn!(%err, len = unit.data.len(), "failed to decode unit");
            Outcome::Discarded
        }
    }
}

/// Write rendered output, mapping failures of the channel to end of stream.
pub(crate) fn emit(ch: &mut dyn Channel, dat: &[u8]) -> Outcome {
    match ch.write_all(dat) {
        Ok(()) => Outcome::Consumed,
        Err(err) => {
            error!(%err, "failed to write to output channel");
            Outcome::EndOfStream
        }
    }
}

pub(crate) fn flush(ch: &mut dyn Channel) {
    if let Err(err) = ch.flush() {
        warn!(%err, "failed to flush channel");
    }
}

/// Tracks time since the last framed unit so a stalled input is reported once.
#[derive(Debug)]
pub(crate) struct IdleMonitor {
    timeout: Duration,
    last: Instant,
    warned: bool,
}

impl IdleMonitor {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last: Instant::now(),
            warned: false,
        }
    }

    pub fn touch(&mut self) {
        self.last = Instant::now();
        self.warned = false;
    }

    /// Returns true the first time the input has been idle longer than the timeout.
    pub fn check(&mut self, format: &str) -> bool {
        let idle = self.last.elapsed();
        if self.warned || idle < self.timeout {
            return false;
        }
        warn!(format, idle = ?idle, "no data received");
        self.warned = true;
        true
    }
}

impl Default for IdleMonitor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}
