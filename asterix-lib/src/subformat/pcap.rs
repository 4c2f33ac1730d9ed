use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, trace, warn};

use super::raw::parse_oradis_header;
use super::{decode_payload, flush, Convention, IdleMonitor, Outcome, Subformat, Unit};
use crate::bytes::Bytes;
use crate::descriptor::FormatDescriptor;
use crate::Channel;

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;
/// Largest record accepted before the file is considered corrupt.
const MAX_RECORD_LEN: usize = 256 * 1024;

const LINKTYPE_NULL: u32 = 0;
const LINKTYPE_ETHERNET: u32 = 1;
const LINKTYPE_RAW: u32 = 101;
const LINKTYPE_LINUX_SLL: u32 = 113;
const LINKTYPE_IPV4: u32 = 228;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;
const IPPROTO_UDP: u8 = 17;

/// libpcap global header fields needed to read records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GlobalHeader {
    big_endian: bool,
    nanos: bool,
    linktype: u32,
}

impl GlobalHeader {
    fn parse(dat: &[u8; GLOBAL_HEADER_LEN]) -> Option<Self> {
        let magic = u32::from_le_bytes([dat[0], dat[1], dat[2], dat[3]]);
        let (big_endian, nanos) = match magic {
            0xa1b2_c3d4 => (false, false),
            0xa1b2_3c4d => (false, true),
            0xd4c3_b2a1 => (true, false),
            0x4d3c_b2a1 => (true, true),
            _ => return None,
        };
        let header = GlobalHeader {
            big_endian,
            nanos,
            linktype: 0,
        };
        Some(GlobalHeader {
            linktype: header.u32(&dat[20..24]),
            ..header
        })
    }

    fn u32(&self, dat: &[u8]) -> u32 {
        let b = [dat[0], dat[1], dat[2], dat[3]];
        if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        }
    }
}

/// UDP datagrams from a libpcap capture file.
///
/// Datagrams that are not IPv4/UDP are discarded. With [Convention::Oradis] every datagram
/// starts with an Oradis header which is removed.
#[derive(Debug, Default)]
pub struct PcapFormat {
    convention: Convention,
    bytes: Bytes,
    header: Option<GlobalHeader>,
    idle: IdleMonitor,
}

impl PcapFormat {
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

    fn name(&self) -> &'static str {
        match self.convention {
            Convention::Standard => "ASTERIX_PCAP",
            Convention::Oradis => "ASTERIX_ORADIS_PCAP",
        }
    }

    fn fill(&mut self, ch: &mut dyn Channel, buf: &mut [u8], started: bool) -> Option<Outcome> {
        match self.bytes.fill(ch, buf) {
            Ok(n) if n == buf.len() => None,
            Ok(0) if !started => Some(Outcome::EndOfStream),
            Ok(n) => {
                warn!(
                    format = self.name(),
                    offset = self.bytes.offset(),
                    expected = buf.len(),
                    got = n,
                    "end of stream mid-record"
                );
                Some(Outcome::EndOfStream)
            }
            Err(err) => {
                error!(format = self.name(), %err, "failed to read channel");
                Some(Outcome::EndOfStream)
            }
        }
    }

    fn global_header(&mut self, ch: &mut dyn Channel) -> Result<GlobalHeader, Outcome> {
        if let Some(header) = self.header {
            return Ok(header);
        }
        let mut dat = [0u8; GLOBAL_HEADER_LEN];
        if let Some(outcome) = self.fill(ch, &mut dat, false) {
            return Err(outcome);
        }
        let Some(header) = GlobalHeader::parse(&dat) else {
            error!(format = self.name(), "not a libpcap capture file");
            return Err(Outcome::EndOfStream);
        };
        debug!(format = self.name(), ?header, "capture file header");
        self.header = Some(header);
        Ok(header)
    }

    fn read_record(&mut self, ch: &mut dyn Channel, unit: &mut Unit) -> Outcome {
        let header = match self.global_header(ch) {
            Ok(header) => header,
            Err(outcome) => return outcome,
        };

        let mut rec = [0u8; RECORD_HEADER_LEN];
        if let Some(outcome) = self.fill(ch, &mut rec, false) {
            return outcome;
        }
        let secs = header.u32(&rec[0..4]);
        let frac = header.u32(&rec[4..8]);
        let incl_len = header.u32(&rec[8..12]) as usize;
        if incl_len > MAX_RECORD_LEN {
            error!(
                format = self.name(),
                offset = self.bytes.offset(),
                incl_len,
                "capture record too large; framing lost"
            );
            return Outcome::EndOfStream;
        }

        let mut frame = vec![0u8; incl_len];
        if let Some(outcome) = self.fill(ch, &mut frame, true) {
            return outcome;
        }

        let nanos = if header.nanos { frac } else { frac.saturating_mul(1000) };
        let timestamp = DateTime::from_timestamp(i64::from(secs), nanos).unwrap_or_else(Utc::now);

        let Some(payload) = udp_payload(header.linktype, &frame) else {
            trace!(format = self.name(), len = frame.len(), "not an IPv4/UDP datagram");
            return Outcome::Discarded;
        };

        match self.convention {
            Convention::Standard => unit.set(payload, timestamp),
            Convention::Oradis => {
                let Some(oradis) = payload.first_chunk::<{ Convention::ORADIS_HEADER_LEN }>()
                else {
                    debug!(format = self.name(), "datagram shorter than Oradis header");
                    return Outcome::Discarded;
                };
                let (len, _) = parse_oradis_header(oradis);
                let end = len.clamp(Convention::ORADIS_HEADER_LEN, payload.len());
                unit.set(&payload[Convention::ORADIS_HEADER_LEN..end], timestamp);
            }
        }
        if unit.data.is_empty() {
            return Outcome::Discarded;
        }
        Outcome::Consumed
    }
}

/// UDP payload of a captured link layer frame, if it carries an unfragmented IPv4/UDP
/// datagram.
fn udp_payload(linktype: u32, frame: &[u8]) -> Option<&[u8]> {
    let ip = match linktype {
        LINKTYPE_ETHERNET => {
            let mut offset = 12;
            let mut ethertype = u16::from_be_bytes([*frame.get(offset)?, *frame.get(offset + 1)?]);
            while ethertype == ETHERTYPE_VLAN || ethertype == ETHERTYPE_QINQ {
                offset += 4;
                ethertype = u16::from_be_bytes([*frame.get(offset)?, *frame.get(offset + 1)?]);
            }
            if ethertype != ETHERTYPE_IPV4 {
                return None;
            }
            frame.get(offset + 2..)?
        }
        LINKTYPE_LINUX_SLL => {
            if u16::from_be_bytes([*frame.get(14)?, *frame.get(15)?]) != ETHERTYPE_IPV4 {
                return None;
            }
            frame.get(16..)?
        }
        LINKTYPE_NULL => {
            // Address family in the byte order of the capturing host
            let family = frame.get(..4)?;
            if family != [2, 0, 0, 0] && family != [0, 0, 0, 2] {
                return None;
            }
            &frame[4..]
        }
        LINKTYPE_RAW | LINKTYPE_IPV4 => frame,
        _ => return None,
    };
    ipv4_udp_payload(ip)
}

fn ipv4_udp_payload(ip: &[u8]) -> Option<&[u8]> {
    let first = *ip.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let ihl = usize::from(first & 0x0f) * 4;
    if ihl < 20 || *ip.get(9)? != IPPROTO_UDP {
        return None;
    }
    let flags_frag = u16::from_be_bytes([*ip.get(6)?, *ip.get(7)?]);
    // More fragments set or non-zero fragment offset
    if flags_frag & 0x3fff != 0 {
        return None;
    }
    let total = usize::from(u16::from_be_bytes([*ip.get(2)?, *ip.get(3)?])).min(ip.len());
    let udp = ip.get(ihl..total)?;
    let udp_len = usize::from(u16::from_be_bytes([*udp.get(4)?, *udp.get(5)?]));
    if udp_len < 8 {
        return None;
    }
    udp.get(8..udp_len.min(udp.len()))
}

impl Subformat for PcapFormat {
    fn read_unit(
        &mut self,
        _ctx: &FormatDescriptor,
        ch: &mut dyn Channel,
        unit: &mut Unit,
    ) -> Outcome {
        let outcome = self.read_record(ch, unit);
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

    fn heartbeat(&mut self, _ctx: &FormatDescriptor, ch: &mut dyn Channel) -> bool {
        flush(ch);
        self.idle.check(self.name());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{test_definition, BLOCK};
    use crate::{ReadChannel, WriteChannel};

    /// Little-endian microsecond capture file header for Ethernet.
    fn global_header() -> Vec<u8> {
        let mut dat = Vec::new();
        dat.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        dat.extend_from_slice(&2u16.to_le_bytes());
        dat.extend_from_slice(&4u16.to_le_bytes());
        dat.extend_from_slice(&[0u8; 8]);
        dat.extend_from_slice(&65535u32.to_le_bytes());
        dat.extend_from_slice(&LINKTYPE_ETHERNET.to_le_bytes());
        dat
    }

    /// Ethernet/IPv4/UDP frame carrying `payload`, wrapped in a capture record.
    fn udp_record(secs: u32, payload: &[u8], proto: u8) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        let total = u16::try_from(20 + 8 + payload.len()).unwrap();
        frame.extend_from_slice(&[0x45, 0x00]);
        frame.extend_from_slice(&total.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00, 0x40, 0x00, 0x40, proto, 0x00, 0x00]);
        frame.extend_from_slice(&[10, 0, 0, 1, 239, 0, 0, 1]);
        frame.extend_from_slice(&8600u16.to_be_bytes());
        frame.extend_from_slice(&8600u16.to_be_bytes());
        frame.extend_from_slice(&u16::try_from(8 + payload.len()).unwrap().to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(payload);

        let mut rec = Vec::new();
        rec.extend_from_slice(&secs.to_le_bytes());
        rec.extend_from_slice(&500_000u32.to_le_bytes());
        let len = u32::try_from(frame.len()).unwrap();
        rec.extend_from_slice(&len.to_le_bytes());
        rec.extend_from_slice(&len.to_le_bytes());
        rec.extend_from_slice(&frame);
        rec
    }

    fn ctx() -> FormatDescriptor {
        FormatDescriptor::new(test_definition())
    }

    #[test]
    fn reads_udp_payloads() {
        let mut dat = global_header();
        dat.extend(udp_record(1_700_000_000, &BLOCK, IPPROTO_UDP));
        dat.extend(udp_record(1_700_000_001, &[0x3e, 0x00, 0x03], IPPROTO_UDP));
        let mut ch = ReadChannel::new(&dat[..]);
        let mut fmt = PcapFormat::new(Convention::Standard);
        let mut unit = Unit::new();
        let ctx = ctx();

        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::Consumed);
        assert_eq!(unit.data, BLOCK.to_vec());
        let ts = unit.timestamp.unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_micros(), 500_000);
        assert_eq!(fmt.decode_unit(&ctx, &mut ch, &mut unit), Outcome::Consumed);

        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::Consumed);
        assert_eq!(unit.data, vec![0x3e, 0x00, 0x03]);
        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::EndOfStream);
    }

    #[test]
    fn non_udp_traffic_is_discarded() {
        let mut dat = global_header();
        // TCP
        dat.extend(udp_record(1, &BLOCK, 6));
        dat.extend(udp_record(2, &BLOCK, IPPROTO_UDP));
        let mut ch = ReadChannel::new(&dat[..]);
        let mut fmt = PcapFormat::new(Convention::Standard);
        let mut unit = Unit::new();
        let ctx = ctx();

        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::Discarded);
        assert_eq!(fmt.read_unit(&ctx, &mut ch, &mut unit), Outcome::Consumed);
    }

    #[test]
    fn oradis_header_is_stripped() {
        let mut payload = vec![0x00, 0x13, 0x00, 0x00, 0x00, 0x01];
        payload.extend_from_slice(&BLOCK);
        let mut dat = global_header();
        dat.extend(udp_record(1, &payload, IPPROTO_UDP));
        let mut ch = ReadChannel::new(&dat[..]);
        let mut fmt = PcapFormat::new(Convention::Oradis);
        let mut unit = Unit::new();

        assert_eq!(fmt.read_unit(&ctx(), &mut ch, &mut unit), Outcome::Consumed);
        assert_eq!(unit.data, BLOCK.to_vec());
    }

    #[test]
    fn bad_magic_ends_stream() {
        let src = [0u8; 40];
        let mut ch = ReadChannel::new(&src[..]);
        let mut fmt = PcapFormat::new(Convention::Standard);
        let mut unit = Unit::new();

        assert_eq!(
            fmt.read_unit(&ctx(), &mut ch, &mut unit),
            Outcome::EndOfStream
        );
    }

    #[test]
    fn truncated_record_ends_stream() {
        let mut dat = global_header();
        let rec = udp_record(1, &BLOCK, IPPROTO_UDP);
        dat.extend_from_slice(&rec[..rec.len() - 4]);
        let mut ch = ReadChannel::new(&dat[..]);
        let mut fmt = PcapFormat::new(Convention::Standard);
        let mut unit = Unit::new();

        assert_eq!(
            fmt.read_unit(&ctx(), &mut ch, &mut unit),
            Outcome::EndOfStream
        );
    }

    #[test]
    fn big_endian_nanosecond_header() {
        let mut dat = [0u8; GLOBAL_HEADER_LEN];
        dat[..4].copy_from_slice(&0xa1b2_3c4du32.to_be_bytes());
        dat[20..].copy_from_slice(&LINKTYPE_RAW.to_be_bytes());
        let header = GlobalHeader::parse(&dat).unwrap();
        assert!(header.big_endian);
        assert!(header.nanos);
        assert_eq!(header.linktype, LINKTYPE_RAW);
    }

    #[test]
    fn vlan_tagged_and_cooked_frames() {
        let rec = udp_record(1, &BLOCK, IPPROTO_UDP);
        let frame = &rec[RECORD_HEADER_LEN..];

        let mut tagged = frame[..12].to_vec();
        tagged.extend_from_slice(&[0x81, 0x00, 0x00, 0x0a]);
        tagged.extend_from_slice(&frame[12..]);
        assert_eq!(udp_payload(LINKTYPE_ETHERNET, &tagged), Some(&BLOCK[..]));

        let mut cooked = vec![0u8; 14];
        cooked.extend_from_slice(&frame[12..]);
        assert_eq!(udp_payload(LINKTYPE_LINUX_SLL, &cooked), Some(&BLOCK[..]));

        let mut null = vec![2, 0, 0, 0];
        null.extend_from_slice(&frame[14..]);
        assert_eq!(udp_payload(LINKTYPE_NULL, &null), Some(&BLOCK[..]));
        assert_eq!(udp_payload(LINKTYPE_RAW, &frame[14..]), Some(&BLOCK[..]));
        assert_eq!(udp_payload(147, &frame[14..]), None);
    }

    #[test]
    fn write_is_unsupported() {
        let mut out = WriteChannel::new(Vec::new());
        let mut fmt = PcapFormat::new(Convention::Standard);
        let mut unit = Unit::new();
        assert_eq!(
            fmt.write_unit(&ctx(), &mut out, &mut unit),
            Outcome::Unsupported
        );
    }
}
