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
// A fixed-size, fixed-slot-size CPU-side staging ring. The original engine
// backs page transfers with a GL persistent-coherent mapped buffer so a
// background thread can write bytes with no driver synchronization; wgpu
// has no equivalent persistent mapping, so the producer (stream thread)
// writes into this plain `Vec<u8>` ring instead, and the consumer (main
// thread) uploads a slot's bytes with `Queue::write_texture` when it
// commits a transfer. Slot exclusivity is guaranteed by the transfer ring's
// SPSC alloc/free protocol (see `vt::transfer`), not by this type.
pub struct PersistentStagingBuffer {
    bytes: Vec<u8>,
    slot_size: usize,
    slot_count: usize,
}

impl PersistentStagingBuffer {
    pub fn new(slot_size: usize, slot_count: usize) -> Self {
        Self {
            bytes: vec![0u8; slot_size * slot_count],
            slot_size,
            slot_count,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn slot(&self, index: usize) -> &[u8] {
        let start = index * self.slot_size;
        &self.bytes[start..start + self.slot_size]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let start = index * self.slot_size;
        &mut self.bytes[start..start + self.slot_size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_disjoint() {
        let mut ring = PersistentStagingBuffer::new(4, 3);
        ring.slot_mut(0).copy_from_slice(&[1, 1, 1, 1]);
        ring.slot_mut(1).copy_from_slice(&[2, 2, 2, 2]);
        ring.slot_mut(2).copy_from_slice(&[3, 3, 3, 3]);
        assert_eq!(ring.slot(0), &[1, 1, 1, 1]);
        assert_eq!(ring.slot(1), &[2, 2, 2, 2]);
        assert_eq!(ring.slot(2), &[3, 3, 3, 3]);
    }
}
