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
// Byte-exact VT file reader (§6.4). Header, PIT, address table, then a
// dense page stream whose per-page payload is the concatenation of each
// layer's fixed-size bytes.
use crate::address_table::AddressTable;
use crate::pit::PageInfoTable;
use anyhow::{anyhow, bail, Result};

/// `'V' | 'T' << 8 | version << 16`; version pinned at 1.
pub const VT_FILE_ID: u32 = (b'V' as u32) | ((b'T' as u32) << 8) | (1 << 16);

/// Border width padded on every side of a stored page, plus 4x4 corners
/// copied from neighbours by the authoring tool (§3.2/§10.6). Fixed, not
/// configurable.
pub const VT_PAGE_BORDER_WIDTH: u32 = 4;

/// Maximum layers a single VT file may declare (diffuse/normal/etc., §10.6).
pub const VT_MAX_LAYERS: u8 = 8;

#[derive(Copy, Clone, Debug)]
pub struct LayerDescriptor {
    pub size_in_bytes: u32,
    pub page_format: u32,
}

pub struct VtFileHeader {
    pub layers: Vec<LayerDescriptor>,
    pub page_resolution_with_borders: u16,
    pub pit: PageInfoTable,
    pub address_table: AddressTable,
    /// Byte offset in the source file where the page stream begins.
    pub page_stream_offset: u64,
}

impl VtFileHeader {
    pub fn page_byte_size(&self) -> u32 {
        self.layers.iter().map(|l| l.size_in_bytes).sum()
    }

    /// Parse the header (magic through address table) from `bytes`,
    /// leaving `page_stream_offset` pointing past it. Malformed input
    /// (`§7 FormatMismatch`) is a construction-time error, unlike the
    /// rest of the subsystem's steady-state `Invalid`/`false` policy —
    /// this only runs once, at `create_texture`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0usize;
        let magic = read_u32(bytes, &mut offset)?;
        if magic != VT_FILE_ID {
            bail!("VT file magic mismatch: expected {VT_FILE_ID:#x}, got {magic:#x}");
        }
        let layer_count = *bytes.get(offset).ok_or_else(eof)?;
        if layer_count > VT_MAX_LAYERS {
            bail!("VT file declares {layer_count} layers, over the {VT_MAX_LAYERS} cap");
        }
        offset += 1;
        let mut layers = Vec::with_capacity(layer_count as usize);
        for _ in 0..layer_count {
            let size_in_bytes = read_u32(bytes, &mut offset)?;
            let page_format = read_u32(bytes, &mut offset)?;
            layers.push(LayerDescriptor {
                size_in_bytes,
                page_format,
            });
        }
        let page_resolution_with_borders = read_u16(bytes, &mut offset)?;

        let (pit, pit_len) = PageInfoTable::parse(bytes.get(offset..).ok_or_else(eof)?)
            .ok_or_else(|| anyhow!("truncated PIT"))?;
        offset += pit_len;

        let total_pages = pit.len() as u32;
        let rest = bytes.get(offset..).ok_or_else(eof)?;
        let num_lods = *rest.first().ok_or_else(eof)?;
        let (address_table, at_len) = AddressTable::parse(rest, total_pages)
            .ok_or_else(|| anyhow!("truncated address table"))?;
        debug_assert_eq!(address_table.num_lods(), num_lods);
        offset += at_len;

        Ok(Self {
            layers,
            page_resolution_with_borders,
            pit,
            address_table,
            page_stream_offset: offset as u64,
        })
    }
}

fn eof() -> anyhow::Error {
    anyhow!("unexpected end of VT file")
}

fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32> {
    let v = bytes
        .get(*offset..*offset + 4)
        .ok_or_else(eof)?
        .try_into()
        .unwrap();
    *offset += 4;
    Ok(u32::from_le_bytes(v))
}

fn read_u16(bytes: &[u8], offset: &mut usize) -> Result<u16> {
    let v = bytes
        .get(*offset..*offset + 2)
        .ok_or_else(eof)?
        .try_into()
        .unwrap();
    *offset += 2;
    Ok(u16::from_le_bytes(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_table::AddressTable;
    use crate::pit::{PageFlags, PageInfoTable};

    fn build_minimal_file() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&VT_FILE_ID.to_le_bytes());
        bytes.push(1); // layer_count
        bytes.extend_from_slice(&64u32.to_le_bytes()); // size_in_bytes
        bytes.extend_from_slice(&0u32.to_le_bytes()); // page_format
        bytes.extend_from_slice(&16u16.to_le_bytes()); // page_resolution_with_borders

        let mut pit = PageInfoTable::new(1);
        pit.set(0, PageFlags::STORED, 0);
        bytes.extend_from_slice(&pit.serialize());

        let at = AddressTable::new(1, 1);
        bytes.extend_from_slice(&at.serialize());

        bytes.extend_from_slice(&[0xAAu8; 64]); // one page's payload
        bytes
    }

    #[test]
    fn parses_minimal_file() {
        let bytes = build_minimal_file();
        let header = VtFileHeader::parse(&bytes).unwrap();
        assert_eq!(header.layers.len(), 1);
        assert_eq!(header.layers[0].size_in_bytes, 64);
        assert_eq!(header.page_resolution_with_borders, 16);
        assert_eq!(header.pit.len(), 1);
        assert!(header.pit.is_stored(0));
        assert_eq!(header.page_byte_size(), 64);
        assert_eq!(
            &bytes[header.page_stream_offset as usize..],
            &[0xAAu8; 64][..]
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = build_minimal_file();
        bytes[0] = 0;
        assert!(VtFileHeader::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_layer_count_over_cap() {
        let mut bytes = build_minimal_file();
        bytes[4] = VT_MAX_LAYERS + 1;
        assert!(VtFileHeader::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_file() {
        let bytes = build_minimal_file();
        let truncated = &bytes[..bytes.len() - 60];
        assert!(VtFileHeader::parse(truncated).is_err());
    }
}
