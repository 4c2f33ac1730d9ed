use std::time::Duration;

use chrono::Utc;
use crc::{Crc, CRC_16_IBM_SDLC};
use tracing::{debug, error, trace, warn};

use super::{decode_payload, flush, IdleMonitor, Outcome, Subformat, Unit};
use crate::bytes::Bytes;
use crate::descriptor::FormatDescriptor;
use crate::Channel;

pub(crate) const FLAG: u8 = 0x7e;
pub(crate) const ESCAPE: u8 = 0x7d;

/// CRC-16/X.25 frame check sequence.
pub(crate) const FCS: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Address, control and two FCS octets.
const MIN_FRAME_LEN: usize = 4;

/// Largest unescaped frame accepted; an information field holds at most one maximum length
/// data block.
const MAX_FRAME_LEN: usize = u16::MAX as usize + MIN_FRAME_LEN;

/// HDLC framed link whose information fields carry ASTERIX data blocks.
#[derive(Debug, Default)]
pub struct HdlcFormat {
    bytes: Bytes,
    idle: IdleMonitor,
}

impl HdlcFormat {
    const NAME: &'static str = "ASTERIX_HDLC";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle = IdleMonitor::new(timeout);
        self
    }

    /// Next unescaped frame between flags. `Err` carries the outcome when no complete frame
    /// is available.
    fn next_frame(&mut self, ch: &mut dyn Channel) -> Result<Vec<u8>, Outcome> {
        // Skip to the opening flag, then past any repeated flags
        let mut skipped = 0usize;
        loop {
            match self.next_byte(ch)? {
                None => return Err(Outcome::EndOfStream),
                Some(FLAG) => break,
                Some(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(format = Self::NAME, skipped, "skipped bytes before frame");
        }

        let mut frame = Vec::new();
        loop {
            if frame.len() > MAX_FRAME_LEN {
                warn!(
                    format = Self::NAME,
                    offset = self.bytes.offset(),
                    max = MAX_FRAME_LEN,
                    "frame too long"
                );
                return Err(Outcome::Discarded);
            }
            match self.next_byte(ch)? {
                None => {
                    if !frame.is_empty() {
                        warn!(
                            format = Self::NAME,
                            offset = self.bytes.offset(),
                            "end of stream mid-frame"
                        );
                    }
                    return Err(Outcome::EndOfStream);
                }
                Some(FLAG) if frame.is_empty() => continue,
                Some(FLAG) => {
                    // The closing flag may also open the next frame
                    self.bytes.push(&[FLAG]);
                    return Ok(frame);
                }
                Some(ESCAPE) => match self.next_byte(ch)? {
                    Some(b) => frame.push(b ^ 0x20),
                    None => {
                        warn!(format = Self::NAME, "end of stream after escape");
                        return Err(Outcome::EndOfStream);
                    }
                },
                Some(b) => frame.push(b),
            }
        }
    }

    fn next_byte(&mut self, ch: &mut dyn Channel) -> Result<Option<u8>, Outcome> {
        self.bytes.next(ch).map_err(|err| {
            error!(format = Self::NAME, %err, "failed to read channel");
            Outcome::EndOfStream
        })
    }
}

impl Subformat for HdlcFormat {
    fn read_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        let frame = match self.next_frame(ch) {
            Ok(frame) => frame,
            Err(outcome) => return outcome,
        };
        if frame.len() <= MIN_FRAME_LEN {
            trace!(format = Self::NAME, len = frame.len(), "frame without information");
            return Outcome::Discarded;
        }

        let (body, fcs) = frame.split_at(frame.len() - 2);
        let expected = u16::from_le_bytes([fcs[0], fcs[1]]);
        let actual = FCS.checksum(body);
        if actual != expected {
            debug!(
                format = Self::NAME,
                expected,
                actual,
                "bad frame check sequence"
            );
            return Outcome::Discarded;
        }

        unit.set(&body[2..], Utc::now());
        self.idle.touch();
        Outcome::Consumed
    }

    fn decode_unit(
        &mut self,
        ctx: &FormatDescriptor,
        _ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        decode_payload(ctx, unit)
    }

    fn heartbeat(&mut self, _ctx: &FormatDescriptor, ch: &mut dyn Channel) -> bool {
        flush(ch);
        self.idle.check(Self::NAME);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{test_definition, BLOCK};
    use crate::ReadChannel;

    /// Flag delimited, escaped frame with address 0x03 and control 0x13.
    fn frame(info: &[u8]) -> Vec<u8> {
        let mut body = vec![0x03, 0x13];
        body.extend_from_slice(info);
        body.extend_from_slice(&FCS.checksum(&body).to_le_bytes());

        let mut dat = vec![FLAG];
        for b in body {
            if b == FLAG || b == ESCAPE {
                dat.extend_from_slice(&[ESCAPE, b ^ 0x20]);
            } else {
                dat.push(b);
            }
        }
        dat.push(FLAG);
        dat
    }

    fn ctx() -> FormatDescriptor {
        FormatDescriptor::new(test_definition())
    }

    #[test]
    fn fcs_check_value() {
        assert_eq!(FCS.checksum(b"123456789"), 0x906e);
    }

    #[test]
    fn reads_frames() {
        let mut dat = vec![0xaa, 0xbb];
        dat.extend(frame(&BLOCK));
        dat.extend(frame(&[0x3e, 0x00, 0x03]));
        let mut ch = ReadChannel::new(&dat[..]);
        let mut fmt = HdlcFormat::new();
        let mut unit = Unit::new();
        let ctx = ctx();

        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::Consumed);
        assert_eq!(unit.data, BLOCK.to_vec());
        assert_eq!(fmt.decode_unit(&ctx, &mut ch, &mut unit), Outcome::Consumed);
        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::Consumed);
        assert_eq!(unit.data, vec![0x3e, 0x00, 0x03]);
        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::EndOfStream);
    }

    #[test]
    fn unescapes_flag_and_escape_octets() {
        let info = [0x30, 0x00, 0x05, FLAG, ESCAPE];
        let dat = frame(&info);
        assert!(dat.windows(2).any(|w| w == [ESCAPE, 0x5e]));
        let mut ch = ReadChannel::new(&dat[..]);
        let mut fmt = HdlcFormat::new();
        let mut unit = Unit::new();

        assert_eq!(fmt.read_unit(&ctx(), &mut ch, &mut unit), Outcome::Consumed);
        assert_eq!(unit.data, info.to_vec());
    }

    #[test]
    fn bad_fcs_is_discarded() {
        let mut dat = frame(&BLOCK);
        dat[5] ^= 0xff;
        let mut ch = ReadChannel::new(&dat[..]);
        let mut fmt = HdlcFormat::new();
        let mut unit = Unit::new();

        assert_eq!(fmt.read_unit(&ctx(), &mut ch, &mut unit), Outcome::Discarded);
    }

    #[test]
    fn short_frame_is_discarded() {
        let dat = [FLAG, 0x03, 0x13, 0x00, FLAG];
        let mut ch = ReadChannel::new(&dat[..]);
        let mut fmt = HdlcFormat::new();
        let mut unit = Unit::new();

        assert_eq!(fmt.read_unit(&ctx(), &mut ch, &mut unit), Outcome::Discarded);
    }

    #[test]
    fn oversized_frame_is_discarded() {
        let mut dat = vec![FLAG];
        dat.resize(MAX_FRAME_LEN + 2, 0x00);
        dat.extend(frame(&BLOCK));
        let mut ch = ReadChannel::new(&dat[..]);
        let mut fmt = HdlcFormat::new();
        let mut unit = Unit::new();
        let ctx = ctx();

        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::Discarded);
        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::Consumed);
        assert_eq!(unit.data, BLOCK.to_vec());
    }

    #[test]
    fn mid_frame_eof_ends_stream() {
        let dat = frame(&BLOCK);
        let mut ch = ReadChannel::new(&dat[..dat.len() - 3]);
        let mut fmt = HdlcFormat::new();
        let mut unit = Unit::new();

        assert_eq!(
            fmt.read_unit(&ctx(), &mut ch, &mut unit),
            Outcome::EndOfStream
        );
    }
}
