#![allow(dead_code)]
use std::path::PathBuf;

use crc::{Crc, CRC_16_IBM_SDLC};

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path =
        PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

/// Category 062 block with one track: SAC/SIC 25/10, time of track 128s, position 45N 15E,
/// track number 42 and callsign KLM123.
pub fn cat062_block() -> Vec<u8> {
    let mut dat = vec![0x3e, 0x00, 0x00];
    dat.extend_from_slice(&[0x99, 0x09, 0x80]);
    dat.extend_from_slice(&[0x19, 0x0a]);
    dat.extend_from_slice(&[0x00, 0x40, 0x00]);
    dat.extend_from_slice(&8_388_608i32.to_be_bytes());
    dat.extend_from_slice(&2_796_203i32.to_be_bytes());
    dat.extend_from_slice(&[0x00, 0x2a]);
    dat.push(0x40);
    dat.extend_from_slice(b"KLM123 ");
    dat[2] = u8::try_from(dat.len()).unwrap();
    dat
}

/// Category 048 block with one plot: SAC/SIC 25/10, Mode 3/A 7000 and track number 1234.
pub fn cat048_block() -> Vec<u8> {
    let mut dat = vec![0x30, 0x00, 0x00];
    dat.extend_from_slice(&[0x89, 0x10]);
    dat.extend_from_slice(&[0x19, 0x0a]);
    dat.extend_from_slice(&[0x0e, 0x00]);
    dat.extend_from_slice(&[0x04, 0xd2]);
    dat[2] = u8::try_from(dat.len()).unwrap();
    dat
}

/// Little-endian microsecond Ethernet capture file with one UDP datagram per payload.
pub fn pcap(payloads: &[&[u8]]) -> Vec<u8> {
    let mut dat = Vec::new();
    dat.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    dat.extend_from_slice(&2u16.to_le_bytes());
    dat.extend_from_slice(&4u16.to_le_bytes());
    dat.extend_from_slice(&[0u8; 8]);
    dat.extend_from_slice(&65535u32.to_le_bytes());
    dat.extend_from_slice(&1u32.to_le_bytes());

    for (idx, payload) in payloads.iter().enumerate() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x08, 0x00]);
        let total = u16::try_from(28 + payload.len()).unwrap();
        frame.extend_from_slice(&[0x45, 0x00]);
        frame.extend_from_slice(&total.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00, 0x40, 0x00, 0x40, 17, 0x00, 0x00]);
        frame.extend_from_slice(&[10, 0, 0, 1, 239, 0, 0, 1]);
        frame.extend_from_slice(&8600u16.to_be_bytes());
        frame.extend_from_slice(&8600u16.to_be_bytes());
        frame.extend_from_slice(&u16::try_from(8 + payload.len()).unwrap().to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(payload);

        let secs = 1_700_000_000 + u32::try_from(idx).unwrap();
        dat.extend_from_slice(&secs.to_le_bytes());
        dat.extend_from_slice(&0u32.to_le_bytes());
        let len = u32::try_from(frame.len()).unwrap();
        dat.extend_from_slice(&len.to_le_bytes());
        dat.extend_from_slice(&len.to_le_bytes());
        dat.extend_from_slice(&frame);
    }
    dat
}

/// Flag delimited HDLC frame with an escaped body and CRC-16/X.25 FCS.
pub fn hdlc(info: &[u8]) -> Vec<u8> {
    let fcs = Crc::<u16>::new(&CRC_16_IBM_SDLC);
    let mut body = vec![0x03, 0x13];
    body.extend_from_slice(info);
    body.extend_from_slice(&fcs.checksum(&body).to_le_bytes());

    let mut dat = vec![0x7e];
    for b in body {
        if b == 0x7e || b == 0x7d {
            dat.extend_from_slice(&[0x7d, b ^ 0x20]);
        } else {
            dat.push(b);
        }
    }
    dat.push(0x7e);
    dat
}
