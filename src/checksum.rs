// SPDX-License-Identifier: Apache-2.0

//! Internet checksum (RFC 1071) accumulator.
//!
//! Each header checksum is one session: create a fresh [`Checksum`], feed it
//! every span covered by the checksum and call [`Checksum::finish()`].

use std::net::Ipv4Addr;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Checksum {
    sum: u32,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum the span as 16-bit big-endian words. An odd trailing byte is
    /// padded with zero.
    pub fn add_bytes(&mut self, data: &[u8]) -> &mut Self {
        let mut chunks = data.chunks_exact(2);
        for chunk in &mut chunks {
            self.add_u16(u16::from_be_bytes([chunk[0], chunk[1]]));
        }
        if let [last] = chunks.remainder() {
            self.add_u16(u16::from_be_bytes([*last, 0]));
        }
        self
    }

    pub fn add_u16(&mut self, value: u16) -> &mut Self {
        self.sum += u32::from(value);
        // Keep the carry folded so very long spans never overflow.
        if self.sum > 0xffff_0000 {
            self.sum = fold(self.sum);
        }
        self
    }

    /// TCP/UDP pseudo-header: source, destination, protocol and the length
    /// of the transport header plus payload.
    pub fn add_pseudo_header(
        &mut self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: u8,
        length: u16,
    ) -> &mut Self {
        self.add_bytes(&src.octets());
        self.add_bytes(&dst.octets());
        self.add_u16(u16::from(protocol));
        self.add_u16(length)
    }

    /// Folded ones' complement of the running sum, ready to be transmitted.
    pub fn finish(&self) -> u16 {
        !(fold(self.sum) as u16)
    }
}

fn fold(mut sum: u32) -> u32 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum
}

/// One-shot checksum over a single span.
pub fn checksum(data: &[u8]) -> u16 {
    Checksum::new().add_bytes(data).finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1071_example() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), !0xddf2);
    }

    #[test]
    fn test_odd_length_padded() {
        assert_eq!(checksum(&[0x12, 0x34, 0x56]), checksum(&[0x12, 0x34, 0x56, 0]));
    }

    #[test]
    fn test_round_trip_sums_to_zero() {
        let samples: [&[u8]; 4] = [
            &[0x45, 0x00, 0x00, 0x3c, 0x1c, 0x46, 0x40, 0x00, 0x40, 0x06],
            &[0u8; 12],
            &[0xff; 20],
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09],
        ];
        for sample in samples {
            // Reserve an even aligned checksum slot in front of the data
            let mut data = vec![0u8, 0u8];
            data.extend_from_slice(sample);
            let sum = checksum(&data);
            data[..2].copy_from_slice(&sum.to_be_bytes());
            // 0x0000 and 0xffff are the same value in ones' complement
            let verify = checksum(&data);
            assert!(verify == 0 || verify == 0xffff, "{sample:?} -> {verify}");
        }
    }

    #[test]
    fn test_multiple_spans_share_accumulator() {
        let mut sum = Checksum::new();
        sum.add_bytes(&[0x45, 0x00]).add_bytes(&[0x00, 0x1c]);
        assert_eq!(sum.finish(), checksum(&[0x45, 0x00, 0x00, 0x1c]));
    }

    #[test]
    fn test_long_span_does_not_overflow() {
        let data = vec![0xffu8; 64 * 1024];
        assert_eq!(checksum(&data), 0);
    }
}
