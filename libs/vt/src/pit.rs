// This file is part of Nitrogen.
//
// Nitrogen is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Nitrogen is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Nitrogen.  If not, see <http://www.gnu.org/licenses/>.
//
// Page Info Table: one byte per absolute page. Low nibble holds flag
// bits (Stored/Cached); high nibble holds the LOD of the nearest coarser
// page that actually exists on disk.
bitflags::bitflags! {
    pub struct PageFlags: u8 {
        const CACHED = 0b0000_0001;
        const STORED = 0b0000_1000;
    }
}

pub struct PageInfoTable {
    bytes: Vec<u8>,
}

impl PageInfoTable {
    pub fn new(total_pages: u32) -> Self {
        Self {
            bytes: vec![0u8; total_pages as usize],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn flags(&self, abs: u32) -> PageFlags {
        PageFlags::from_bits_truncate(self.bytes[abs as usize] & 0x0F)
    }

    pub fn max_lod(&self, abs: u32) -> u8 {
        self.bytes[abs as usize] >> 4
    }

    pub fn set(&mut self, abs: u32, flags: PageFlags, max_lod: u8) {
        self.bytes[abs as usize] = flags.bits() | (max_lod << 4);
    }

    pub fn set_cached(&mut self, abs: u32, cached: bool) {
        let byte = &mut self.bytes[abs as usize];
        if cached {
            *byte |= PageFlags::CACHED.bits();
        } else {
            *byte &= !PageFlags::CACHED.bits();
        }
    }

    pub fn is_cached(&self, abs: u32) -> bool {
        self.flags(abs).contains(PageFlags::CACHED)
    }

    pub fn is_stored(&self, abs: u32) -> bool {
        self.flags(abs).contains(PageFlags::STORED)
    }

    /// Deserialise from the VT file's `write_pages:u32` + raw byte form
    /// (§6.4). `None` on truncated input.
    pub fn parse(bytes: &[u8]) -> Option<(Self, usize)> {
        let write_pages = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?) as usize;
        let body = bytes.get(4..4 + write_pages)?;
        Some((
            Self {
                bytes: body.to_vec(),
            },
            4 + write_pages,
        ))
    }

    /// Serialise back to `write_pages:u32` + raw bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.bytes.len());
        out.extend_from_slice(&(self.bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serialize_round_trip() {
        let mut pit = PageInfoTable::new(16);
        pit.set(3, PageFlags::STORED, 2);
        pit.set(7, PageFlags::STORED | PageFlags::CACHED, 0);

        let bytes = pit.serialize();
        let (parsed, consumed) = PageInfoTable::parse(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.len(), pit.len());
        for i in 0..pit.len() as u32 {
            assert_eq!(parsed.flags(i), pit.flags(i));
            assert_eq!(parsed.max_lod(i), pit.max_lod(i));
        }
    }

    #[test]
    fn zero_stored_lods_serialises_empty() {
        let pit = PageInfoTable::new(0);
        let bytes = pit.serialize();
        assert_eq!(&bytes[0..4], &0u32.to_le_bytes());
    }

    #[test]
    fn set_cached_toggles_only_that_bit() {
        let mut pit = PageInfoTable::new(4);
        pit.set(0, PageFlags::STORED, 1);
        pit.set_cached(0, true);
        assert!(pit.is_cached(0));
        assert!(pit.is_stored(0));
        pit.set_cached(0, false);
        assert!(!pit.is_cached(0));
        assert!(pit.is_stored(0));
    }
}
