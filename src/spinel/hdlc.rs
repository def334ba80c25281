//! HDLC-lite framing for Spinel over UART
//!
//! Spinel frames on a serial link are byte-stuffed between `0x7E` flags and
//! carry a CRC-16/X.25 frame check sequence (little-endian) after the payload.
//! We implement a simple incremental decoder and encoder.

use bytes::{BufMut, BytesMut};
use crc::{Crc, CRC_16_IBM_SDLC};

pub const FLAG: u8 = 0x7E;
pub const ESCAPE: u8 = 0x7D;
pub const XON: u8 = 0x11;
pub const XOFF: u8 = 0x13;
pub const VENDOR: u8 = 0xF8;
const ESCAPE_XOR: u8 = 0x20;

/// Maximum decoded frame (payload + FCS) we are willing to buffer.
const MAX_FRAME_SIZE: usize = 2048;

const FCS: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

fn needs_escape(b: u8) -> bool {
    matches!(b, FLAG | ESCAPE | XON | XOFF | VENDOR)
}

/// Outcome of feeding bytes into the decoder.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Frames whose FCS verified, with the FCS stripped.
    pub frames: Vec<Vec<u8>>,
    /// Frames dropped for a bad FCS, a bad escape or an oversize body.
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct HdlcDecoder {
    buf: BytesMut,
    esc: bool,
    poisoned: bool,
}

impl HdlcDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            esc: false,
            poisoned: false,
        }
    }

    /// Push bytes, returning any completed frames.
    pub fn push(&mut self, data: &[u8]) -> Decoded {
        let mut out = Decoded::default();
        for &b in data {
            if b == FLAG {
                self.end_frame(&mut out);
                continue;
            }
            if self.poisoned {
                continue;
            }
            if self.esc {
                self.esc = false;
                self.buf.put_u8(b ^ ESCAPE_XOR);
            } else if b == ESCAPE {
                self.esc = true;
                continue;
            } else {
                self.buf.put_u8(b);
            }
            if self.buf.len() > MAX_FRAME_SIZE {
                // oversize: discard until the next flag
                self.poisoned = true;
                self.buf.clear();
            }
        }
        out
    }

    fn end_frame(&mut self, out: &mut Decoded) {
        let body = self.buf.split();
        let had_escape = std::mem::replace(&mut self.esc, false);
        if std::mem::replace(&mut self.poisoned, false) || had_escape {
            out.dropped += 1;
            return;
        }
        if body.is_empty() {
            // back-to-back flags
            return;
        }
        if body.len() < 3 {
            out.dropped += 1;
            return;
        }
        let (payload, fcs) = body.split_at(body.len() - 2);
        let expected = u16::from_le_bytes([fcs[0], fcs[1]]);
        if FCS.checksum(payload) != expected {
            out.dropped += 1;
            return;
        }
        out.frames.push(payload.to_vec());
    }
}

fn push_escaped(out: &mut Vec<u8>, b: u8) {
    if needs_escape(b) {
        out.push(ESCAPE);
        out.push(b ^ ESCAPE_XOR);
    } else {
        out.push(b);
    }
}

pub fn hdlc_encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 6);
    out.push(FLAG); // leading flag flushes any line noise on the NCP side
    for &b in payload {
        push_escaped(&mut out, b);
    }
    for b in FCS.checksum(payload).to_le_bytes() {
        push_escaped(&mut out, b);
    }
    out.push(FLAG);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fcs_matches_x25_check_value() {
        assert_eq!(FCS.checksum(b"123456789"), 0x906E);
    }

    #[test]
    fn encode_escapes_reserved_bytes() {
        let framed = hdlc_encode(&[0x81, FLAG, 0x02, ESCAPE, XON]);
        assert_eq!(framed[0], FLAG);
        assert_eq!(*framed.last().unwrap(), FLAG);
        assert_eq!(&framed[1..8], &[0x81, ESCAPE, 0x5E, 0x02, ESCAPE, 0x5D, ESCAPE]);
        // no bare flag inside the body
        assert!(!framed[1..framed.len() - 1].contains(&FLAG));
    }

    #[test]
    fn decoder_handles_split_input_and_noise() {
        let framed = hdlc_encode(&[0x81, 0x06, 0x00, 0x00]);
        let mut dec = HdlcDecoder::new();
        let (a, b) = framed.split_at(4);
        assert!(dec.push(&[0x55, 0x66]).frames.is_empty());
        // the line noise before the first flag is dropped as a runt frame
        let first = dec.push(a);
        assert!(first.frames.is_empty());
        assert_eq!(first.dropped, 1);
        let out = dec.push(b);
        assert_eq!(out.frames, vec![vec![0x81, 0x06, 0x00, 0x00]]);
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn decoder_drops_corrupted_frame_and_recovers() {
        let mut bad = hdlc_encode(&[0x81, 0x06, 0x00, 0x01]);
        bad[2] ^= 0x01;
        let good = hdlc_encode(&[0x80, 0x06, 0x00, 0x70]);
        let mut dec = HdlcDecoder::new();
        let mut stream = bad;
        stream.extend_from_slice(&good);
        let out = dec.push(&stream);
        assert_eq!(out.dropped, 1);
        assert_eq!(out.frames, vec![vec![0x80, 0x06, 0x00, 0x70]]);
    }
}
