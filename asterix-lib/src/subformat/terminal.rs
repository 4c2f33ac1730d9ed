use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::warn;

use super::{emit, flush, Outcome, Subformat, Unit};
use crate::descriptor::FormatDescriptor;
use crate::Channel;

/// Octets before the block: length, board, line, recording day and time of day.
const HEADER_LEN: usize = 8;
const TRAILER: [u8; 4] = [0xa5; 4];

/// Legacy FINAL terminal records, one per data block.
///
/// Each record is a 2 octet big-endian length covering the whole record, the board and line
/// numbers, the recording day of month, the time of day in 10 ms units as a 3 octet
/// big-endian value, the data block and a `A5A5A5A5` trailer.
#[derive(Debug, Default)]
pub struct TerminalFormat {
    board: u8,
    line: u8,
}

impl TerminalFormat {
    #[must_use]
    pub fn new(board: u8, line: u8) -> Self {
        Self { board, line }
    }

    fn record(&self, block: &[u8], timestamp: DateTime<Utc>) -> Option<Vec<u8>> {
        let len = u16::try_from(HEADER_LEN + block.len() + TRAILER.len()).ok()?;
        let centis = timestamp.num_seconds_from_midnight() * 100
            + timestamp.timestamp_subsec_millis() / 10;

        let mut rec = Vec::with_capacity(usize::from(len));
        rec.extend_from_slice(&len.to_be_bytes());
        rec.push(self.board);
        rec.push(self.line);
        rec.push(u8::try_from(timestamp.day()).unwrap_or_default());
        rec.extend_from_slice(&centis.to_be_bytes()[1..]);
        rec.extend_from_slice(block);
        rec.extend_from_slice(&TRAILER);
        Some(rec)
    }
}

impl Subformat for TerminalFormat {
    fn write_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        let timestamp = unit.timestamp_or_now();
        let mut dat = Vec::new();
        for block in &unit.blocks {
            match self.record(&block.data, timestamp) {
                Some(rec) => dat.extend(rec),
                None => warn!(len = block.len(), "block too large for a FINAL record"),
            }
        }
        if dat.is_empty() {
            return Outcome::Discarded;
        }
        emit(ch, &dat)
    }

    fn heartbeat(&mut self, _ctx: &FormatDescriptor, ch: &mut dyn Channel) -> bool {
        flush(ch);
        true
    }
}
