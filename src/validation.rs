//! Argument parsing for the control surface and the CLI.
//!
//! Hex data arguments may carry a `0x` prefix and `:`/`-`/space separators
//! between bytes. Values shorter than their field are zero-padded on the
//! right, as the address tools do.

use std::net::Ipv6Addr;

/// Argument validation errors with helpful messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    #[error("{what}: empty value")]
    Empty { what: &'static str },

    #[error("{what}: invalid character '{ch}'")]
    InvalidCharacter { what: &'static str, ch: char },

    #[error("{what}: odd number of hex digits")]
    OddLength { what: &'static str },

    #[error("{what}: {len} bytes given, maximum is {max}")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("bad IPv6 address \"{0}\"")]
    BadAddress(String),

    #[error("bad channel \"{0}\" (expected 0-255 or a range like 11-26)")]
    BadChannel(String),

    #[error("bad property id \"{0}\"")]
    BadProperty(String),
}

/// Parse hex data of at most `max` bytes.
pub fn parse_hex_data(what: &'static str, input: &str, max: usize) -> Result<Vec<u8>, ArgumentError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let mut nibbles = Vec::with_capacity(digits.len());
    for ch in digits.chars() {
        match ch {
            ':' | '-' | ' ' => continue,
            c => match c.to_digit(16) {
                Some(n) => nibbles.push(n as u8),
                None => return Err(ArgumentError::InvalidCharacter { what, ch: c }),
            },
        }
    }
    if nibbles.is_empty() {
        return Err(ArgumentError::Empty { what });
    }
    if nibbles.len() % 2 != 0 {
        return Err(ArgumentError::OddLength { what });
    }
    let bytes: Vec<u8> = nibbles.chunks(2).map(|p| (p[0] << 4) | p[1]).collect();
    if bytes.len() > max {
        return Err(ArgumentError::TooLong {
            what,
            len: bytes.len(),
            max,
        });
    }
    Ok(bytes)
}

fn padded<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

/// Endpoint identifier: an IPv6 address when the argument contains `:`,
/// otherwise up to 16 bytes of hex data.
pub fn parse_eid(input: &str) -> Result<[u8; 16], ArgumentError> {
    let trimmed = input.trim();
    if trimmed.contains(':') {
        return trimmed
            .parse::<Ipv6Addr>()
            .map(|addr| addr.octets())
            .map_err(|_| ArgumentError::BadAddress(trimmed.to_string()));
    }
    parse_hex_data("EID", trimmed, 16).map(|b| padded::<16>(&b))
}

/// Mesh-local interface identifier, up to 8 bytes of hex data.
pub fn parse_mliid(input: &str) -> Result<[u8; 8], ArgumentError> {
    parse_hex_data("MLIID", input, 8).map(|b| padded::<8>(&b))
}

/// RLOC16, up to 2 bytes of hex data read big-endian.
pub fn parse_rloc16(input: &str) -> Result<u16, ArgumentError> {
    let bytes = parse_hex_data("RLOC16", input, 2)?;
    Ok(u16::from_be_bytes(padded(&bytes)))
}

/// Channel list such as `11,15,20` or `11-14,26`.
pub fn parse_channel_list(input: &str) -> Result<Vec<u8>, ArgumentError> {
    let mut channels = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let bad = || ArgumentError::BadChannel(part.to_string());
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u8 = lo.trim().parse().map_err(|_| bad())?;
                let hi: u8 = hi.trim().parse().map_err(|_| bad())?;
                if lo > hi {
                    return Err(bad());
                }
                channels.extend(lo..=hi);
            }
            None => channels.push(part.parse().map_err(|_| bad())?),
        }
    }
    if channels.is_empty() {
        return Err(ArgumentError::Empty { what: "channel list" });
    }
    channels.sort_unstable();
    channels.dedup();
    Ok(channels)
}

/// Property id in decimal or `0x` hex, or one of the names the engine knows.
pub fn parse_property(input: &str) -> Result<u32, ArgumentError> {
    use crate::spinel::prop;

    let trimmed = input.trim();
    let bad = || ArgumentError::BadProperty(trimmed.to_string());
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u32::from_str_radix(hex, 16).map_err(|_| bad());
    }
    if let Ok(id) = trimmed.parse::<u32>() {
        return Ok(id);
    }
    let wanted = trimmed.to_ascii_uppercase();
    let known = [
        prop::PROTOCOL_VERSION,
        prop::NCP_VERSION,
        prop::INTERFACE_TYPE,
        prop::VENDOR_ID,
        prop::CAPS,
        prop::HWADDR,
        prop::PHY_CHAN,
        prop::PHY_RSSI,
        prop::MAC_15_4_PANID,
        prop::NET_ROLE,
        prop::NET_NETWORK_NAME,
        prop::NET_XPANID,
        prop::THREAD_ADDRESS_CACHE_TABLE,
    ];
    known
        .into_iter()
        .find(|p| prop::name(*p) == wanted)
        .ok_or_else(bad)
}
