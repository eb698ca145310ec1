//! Checksums used on the wire: the Ethernet FCS and the IPv4/UDP
//! ones'-complement sum.

/// CRC-32 generator polynomial in reflected (LSB-first) form.
const POLY: u32 = 0x04C1_1DB7u32.reverse_bits();
/// Initial register value (all ones, reflection is a no-op).
const INIT: u32 = u32::MAX.reverse_bits();

/// Computes the Ethernet frame check sequence of `data`.
///
/// The register is shifted one bit at a time, least significant bit of each
/// byte first. The complemented register is returned byte-reversed so that
/// writing it big-endian after the frame puts the standard FCS on the wire.
///
/// Running this over a frame that already carries its FCS yields the
/// constant residue `0x1CDF4421`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = INIT;
    for &byte in data {
        for bit in 0..8 {
            crc ^= u32::from((byte >> bit) & 1);
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ POLY
            } else {
                crc >> 1
            };
        }
    }
    (!crc).swap_bytes()
}

/// Computes the internet checksum (RFC 1071) of `data`.
///
/// Callers assemble the exact byte sequence to cover: the IPv4 header with
/// its checksum field zeroed, or the UDP pseudo-header followed by the UDP
/// header (checksum zeroed) and payload.
pub fn ip_checksum(data: &[u8]) -> u16 {
    let mut chunks = data.chunks_exact(2);
    let mut sum: u32 = chunks
        .by_ref()
        .map(|word| u32::from(u16::from_be_bytes([word[0], word[1]])))
        .sum();
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
