//! Little-endian read/write helpers for the cache file format.

use std::io::{Read, Write};

use crate::Result;

pub trait WriteLeExt: Write {
    fn write_u32_le(&mut self, v: u32) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u64_le(&mut self, v: u64) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_zeroes(&mut self, len: usize) -> Result<()> {
        const ZEROES: [u8; 32] = [0; 32];
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(ZEROES.len());
            self.write_all(&ZEROES[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }
}

impl<T: Write + ?Sized> WriteLeExt for T {}

pub trait ReadLeExt: Read {
    fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64_le(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        let mut buf = [0u8; 32];
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(buf.len());
            self.read_exact(&mut buf[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }
}

impl<T: Read + ?Sized> ReadLeExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_preserves_values_and_widths() {
        let mut buf = Vec::new();
        buf.write_u64_le(0x0102_0304_0506_0708).unwrap();
        buf.write_u32_le(0xAABB_CCDD).unwrap();
        buf.write_zeroes(5).unwrap();
        assert_eq!(buf.len(), 17);

        let mut cursor = Cursor::new(buf);
        assert_eq!(cursor.read_u64_le().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(cursor.read_u32_le().unwrap(), 0xAABB_CCDD);
        cursor.skip(5).unwrap();
        assert!(cursor.read_u32_le().is_err());
    }
}
