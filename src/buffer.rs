// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use crate::{mac::MacAddr, ErrorKind, NetError};

/// Bounds-checked big-endian reader over a received frame.
#[derive(Debug)]
pub(crate) struct Buffer<'a> {
    index: usize,
    data: &'a [u8],
}

impl<'a> Buffer<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { index: 0, data }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remain_len() == 0
    }

    pub(crate) fn remain_len(&self) -> usize {
        self.data.len().saturating_sub(self.index)
    }

    fn not_enough(&self, what: &str, len: usize) -> NetError {
        NetError::new(
            ErrorKind::InvalidPacket,
            format!(
                "Remain buffer({} bytes) not enough for getting {what} of {len} \
                 bytes",
                self.remain_len()
            ),
        )
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8, NetError> {
        if self.is_empty() {
            return Err(self.not_enough("u8", 1));
        }
        let ret = self.data[self.index];
        self.index += 1;
        Ok(ret)
    }

    pub(crate) fn get_u16_be(&mut self) -> Result<u16, NetError> {
        let raw = self.get_bytes(2).map_err(|_| self.not_enough("u16", 2))?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    pub(crate) fn get_u32_be(&mut self) -> Result<u32, NetError> {
        let raw = self.get_bytes(4).map_err(|_| self.not_enough("u32", 4))?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub(crate) fn get_bytes(&mut self, len: usize) -> Result<&'a [u8], NetError> {
        if self.remain_len() < len {
            return Err(self.not_enough("bytes array", len));
        }
        let ret = &self.data[self.index..self.index + len];
        self.index += len;
        Ok(ret)
    }

    pub(crate) fn get_ipv4(&mut self) -> Result<Ipv4Addr, NetError> {
        let raw = self
            .get_bytes(4)
            .map_err(|_| self.not_enough("IPv4 address", 4))?;
        Ok(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))
    }

    pub(crate) fn get_mac(&mut self) -> Result<MacAddr, NetError> {
        let raw = self
            .get_bytes(6)
            .map_err(|_| self.not_enough("MAC address", 6))?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(raw);
        Ok(MacAddr(mac))
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), NetError> {
        self.get_bytes(len).map(|_| ())
    }

    pub(crate) fn get_remains(&mut self) -> &'a [u8] {
        if self.index > self.data.len() {
            &[]
        } else {
            let ret = &self.data[self.index..];
            self.index = self.data.len();
            ret
        }
    }
}

/// Frame writer refusing to grow past a fixed capacity.
#[derive(Debug)]
pub(crate) struct BufferMut {
    pub(crate) data: Vec<u8>,
    capacity: usize,
}

impl BufferMut {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    fn reserve_checked(&self, len: usize) -> Result<(), NetError> {
        if self.data.len() + len > self.capacity {
            let e = NetError::new(
                ErrorKind::CapacityExceeded,
                format!(
                    "Writing {len} bytes at offset {} exceeds the {} bytes \
                     buffer",
                    self.data.len(),
                    self.capacity
                ),
            );
            log::error!("{e}");
            Err(e)
        } else {
            Ok(())
        }
    }

    pub(crate) fn write_u8(&mut self, value: u8) -> Result<(), NetError> {
        self.reserve_checked(1)?;
        self.data.push(value);
        Ok(())
    }

    pub(crate) fn write_u16_be(&mut self, value: u16) -> Result<(), NetError> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub(crate) fn write_u32_be(&mut self, value: u32) -> Result<(), NetError> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        self.reserve_checked(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn write_zeros(&mut self, len: usize) -> Result<(), NetError> {
        self.reserve_checked(len)?;
        self.data.resize(self.data.len() + len, 0);
        Ok(())
    }

    pub(crate) fn write_ipv4(&mut self, addr: Ipv4Addr) -> Result<(), NetError> {
        self.write_bytes(&addr.octets())
    }

    pub(crate) fn write_mac(&mut self, mac: MacAddr) -> Result<(), NetError> {
        self.write_bytes(&mac.0)
    }

    /// Overwrite an already written big-endian u16, used for checksums and
    /// length fields known only after the payload is in place.
    pub(crate) fn set_u16_be(
        &mut self,
        offset: usize,
        value: u16,
    ) -> Result<(), NetError> {
        if offset + 2 > self.data.len() {
            return Err(NetError::new(
                ErrorKind::Bug,
                format!(
                    "Patching u16 at offset {offset} beyond written length {}",
                    self.data.len()
                ),
            ));
        }
        self.data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_short_read() {
        let mut buf = Buffer::new(&[1, 2, 3]);
        assert_eq!(buf.get_u16_be().unwrap(), 0x0102);
        let e = buf.get_u32_be().unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidPacket);
        assert_eq!(buf.get_u8().unwrap(), 3);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_buffer_mut_capacity() {
        let mut buf = BufferMut::new(4);
        buf.write_u16_be(0xabcd).unwrap();
        assert_eq!(
            buf.write_u32_be(1).unwrap_err().kind(),
            ErrorKind::CapacityExceeded
        );
        buf.write_u8(1).unwrap();
        buf.set_u16_be(0, 0x1234).unwrap();
        assert_eq!(buf.data, vec![0x12, 0x34, 1]);
        assert!(buf.set_u16_be(2, 0).is_err());
    }
}
