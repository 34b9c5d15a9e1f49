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
// Two-part map from absolute page index to physical file page offset
// (§3.2). LODs 0-3 (85 pages) are a dense byte_offsets array; LODs >= 4
// are addressed through a coarse 16x16-block table plus single-byte
// offsets within each block.
use crate::quadtree::QuadTreeTable;

const DENSE_LODS: u32 = 4;
pub const DENSE_PAGE_COUNT: usize = 85; // sum(4^k) for k in 0..4

pub struct AddressTable {
    num_lods: u8,
    /// One byte per absolute page across the whole tree (offset within
    /// its containing block, in whole pages).
    byte_offsets: Vec<u8>,
    /// Coarse per-block table, present only when `num_lods > 4`.
    table: Vec<u32>,
}

impl AddressTable {
    pub fn new(num_lods: u8, total_pages: u32) -> Self {
        let table_len = if num_lods as u32 > DENSE_LODS {
            crate::quadtree::lod_nodes(num_lods as u32 - DENSE_LODS) as usize
        } else {
            0
        };
        Self {
            num_lods,
            byte_offsets: vec![0u8; total_pages as usize],
            table: vec![0u32; table_len],
        }
    }

    pub fn num_lods(&self) -> u8 {
        self.num_lods
    }

    pub fn set_byte_offset(&mut self, abs: u32, offset: u8) {
        self.byte_offsets[abs as usize] = offset;
    }

    pub fn set_block(&mut self, block_index: u32, value: u32) {
        self.table[block_index as usize] = value;
    }

    /// Final physical byte offset of `abs`'s first layer (§3.2).
    pub fn physical_offset(
        &self,
        quadtree: &QuadTreeTable,
        abs: u32,
        page_size: u32,
        header_size: u64,
    ) -> u64 {
        let lod = quadtree.lod_of(abs).expect("absolute index out of range");
        let block = if lod >= DENSE_LODS {
            let rel = quadtree.absolute_to_relative(abs, lod);
            let (x, y) = crate::quadtree::xy_from_relative(rel, lod);
            let block_lod = lod - DENSE_LODS;
            let block_rel = crate::quadtree::relative_from_xy(x >> 4, y >> 4, block_lod);
            self.table[quadtree.relative_to_absolute(block_rel, block_lod) as usize]
        } else {
            0
        };
        (block as u64 + self.byte_offsets[abs as usize] as u64) * page_size as u64 + header_size
    }

    /// Serialise per §6.4: `num_lods:u8`, `total_pages` bytes
    /// (`byte_offsets`), then (if `num_lods > 4`) `quadtree_nodes(num_lods
    /// - 4)` `u32` values (`table`).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.byte_offsets.len() + self.table.len() * 4);
        out.push(self.num_lods);
        out.extend_from_slice(&self.byte_offsets);
        for v in &self.table {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn parse(bytes: &[u8], total_pages: u32) -> Option<(Self, usize)> {
        let num_lods = *bytes.first()?;
        let mut offset = 1usize;
        let byte_offsets = bytes.get(offset..offset + total_pages as usize)?.to_vec();
        offset += total_pages as usize;
        let table_len = if num_lods as u32 > DENSE_LODS {
            crate::quadtree::QuadTreeTable::new()
                .total_pages(num_lods as u32 - DENSE_LODS) as usize
        } else {
            0
        };
        let mut table = Vec::with_capacity(table_len);
        for _ in 0..table_len {
            table.push(u32::from_le_bytes(
                bytes.get(offset..offset + 4)?.try_into().ok()?,
            ));
            offset += 4;
        }
        Some((
            Self {
                num_lods,
                byte_offsets,
                table,
            },
            offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serialize_round_trip_dense_only() {
        let quadtree = QuadTreeTable::new();
        let total = quadtree.total_pages(4);
        let mut at = AddressTable::new(4, total);
        for abs in 0..total {
            at.set_byte_offset(abs, (abs % 251) as u8);
        }
        let bytes = at.serialize();
        let (parsed, consumed) = AddressTable::parse(&bytes, total).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed.num_lods(), 4);
        for abs in 0..total {
            assert_eq!(
                parsed.physical_offset(&quadtree, abs, 1, 0),
                at.physical_offset(&quadtree, abs, 1, 0)
            );
        }
    }

    #[test]
    fn parse_serialize_round_trip_with_coarse_table() {
        let quadtree = QuadTreeTable::new();
        let num_lods = 6u8;
        let total = quadtree.total_pages(num_lods as u32);
        let mut at = AddressTable::new(num_lods, total);
        for abs in 0..total {
            at.set_byte_offset(abs, (abs % 200) as u8);
        }
        let block_count = crate::quadtree::lod_nodes(num_lods as u32 - DENSE_LODS);
        for b in 0..block_count {
            at.set_block(b, b * 17);
        }
        let bytes = at.serialize();
        let (parsed, consumed) = AddressTable::parse(&bytes, total).unwrap();
        assert_eq!(consumed, bytes.len());
        for abs in 0..total {
            assert_eq!(
                parsed.physical_offset(&quadtree, abs, 1, 0),
                at.physical_offset(&quadtree, abs, 1, 0)
            );
        }
    }
}
