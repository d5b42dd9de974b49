//! The emulated heap
//!
//! [`BasicHeap`] hands out chunks of bit-vector storage by virtual address;
//! it knows nothing about types. [`ManagedObjectHeap`] layers the object
//! model on top: it sizes allocations through the
//! [`crate::types::ValueFactory`], stamps array/string length fields, and
//! remembers the runtime type of every live object.
//!
//! There is no garbage collector - chunks live until they are explicitly
//! freed - and no thread safety: one heap belongs to one execution.

mod managed;

pub use managed::*;

use crate::bits::{BitSlice, BitVector, BitVectorSpan};
use crate::Error;
use std::collections::BTreeMap;

/// Half-open range of virtual addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: u64,
    pub end: u64,
}

impl AddressRange {
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Fixed-capacity chunk allocator
///
/// Chunks are placed first-fit into the lowest gap that holds them, keyed by
/// their offset from the heap's base address. Addresses are stable until the
/// chunk is freed. [`BasicHeap::rebase`] moves the whole heap to a new base
/// without disturbing chunk contents - offsets stay put, reported addresses
/// change.
pub struct BasicHeap {
    base: u64,
    capacity: u32,
    chunks: BTreeMap<u32, BitVector>,
}

impl BasicHeap {
    /// New empty heap of `capacity` bytes starting at address 0
    pub fn new(capacity: u32) -> BasicHeap {
        BasicHeap {
            base: 0,
            capacity,
            chunks: BTreeMap::new(),
        }
    }

    /// The range of addresses this heap may ever hand out
    pub fn range(&self) -> AddressRange {
        AddressRange {
            start: self.base,
            end: self.base + u64::from(self.capacity),
        }
    }

    /// Move the heap's reported range to start at `base`
    ///
    /// Live chunks keep their contents and their offsets; only the addresses
    /// under which they are reachable change.
    pub fn rebase(&mut self, base: u64) {
        self.base = base;
    }

    /// Allocate a chunk of exactly `size` bytes
    ///
    /// An initialized chunk is known-zero throughout; an uninitialized one
    /// has unspecified bits, all unknown.
    pub fn allocate(&mut self, size: u32, initialize: bool) -> Result<u64, Error> {
        if size == 0 {
            return Err(Error::InvalidArgument(String::from(
                "zero-size allocation",
            )));
        }

        let offset = self
            .find_gap(size)
            .ok_or(Error::OutOfMemory { requested: size })?;

        let storage = if initialize {
            BitVector::zeroed(size as usize * 8)
        } else {
            BitVector::unknown(size as usize * 8)
        };
        self.chunks.insert(offset, storage);

        let address = self.base + u64::from(offset);
        log::debug!("allocated {} bytes at {:#x}", size, address);
        Ok(address)
    }

    /// Release the chunk based at `address`
    pub fn free(&mut self, address: u64) -> Result<(), Error> {
        let offset = self.base_offset(address)?;
        match self.chunks.remove(&offset) {
            Some(_) => {
                log::debug!("freed chunk at {:#x}", address);
                Ok(())
            }
            None => Err(Error::InvalidArgument(format!(
                "{:#x} is not the base of a live chunk",
                address
            ))),
        }
    }

    /// Is `address` the base of a live chunk?
    pub fn is_valid_address(&self, address: u64) -> bool {
        match self.base_offset(address) {
            Ok(offset) => self.chunks.contains_key(&offset),
            Err(_) => false,
        }
    }

    /// Size in bytes of the chunk based at `address`
    pub fn chunk_size(&self, address: u64) -> Result<u32, Error> {
        let offset = self.base_offset(address)?;
        let chunk = self.chunks.get(&offset).ok_or(Error::InvalidArgument(
            format!("{:#x} is not the base of a live chunk", address),
        ))?;
        Ok(chunk.byte_len() as u32)
    }

    /// Mutable view over the whole chunk based at `address`
    pub fn chunk_span(&mut self, address: u64) -> Result<BitVectorSpan<'_>, Error> {
        let offset = self.base_offset(address)?;
        let chunk = self
            .chunks
            .get_mut(&offset)
            .ok_or(Error::InvalidArgument(format!(
                "{:#x} is not the base of a live chunk",
                address
            )))?;
        Ok(chunk.as_span())
    }

    /// Read-only view over the whole chunk based at `address`
    pub fn chunk_slice(&self, address: u64) -> Result<BitSlice<'_>, Error> {
        let offset = self.base_offset(address)?;
        let chunk = self.chunks.get(&offset).ok_or(Error::InvalidArgument(
            format!("{:#x} is not the base of a live chunk", address),
        ))?;
        Ok(chunk.as_slice())
    }

    /// Snapshot of the address ranges of all live chunks, in address order
    pub fn allocated_chunks(&self) -> Vec<AddressRange> {
        self.chunks
            .iter()
            .map(|(offset, chunk)| AddressRange {
                start: self.base + u64::from(*offset),
                end: self.base + u64::from(*offset) + chunk.byte_len() as u64,
            })
            .collect()
    }

    /// Copy `buffer.len()` data bytes starting at `address`, which may point
    /// anywhere inside a chunk
    ///
    /// Only data bits are copied; consult [`Self::chunk_slice`] when the
    /// known-bit mask matters.
    pub fn read(&self, address: u64, buffer: &mut [u8]) -> Result<(), Error> {
        let (chunk, offset) = self.chunk_containing(address, buffer.len())?;
        let bytes = chunk.as_slice().bytes();
        buffer.copy_from_slice(&bytes[offset..offset + buffer.len()]);
        Ok(())
    }

    /// Write fully-known bytes starting at `address`, which may point
    /// anywhere inside a chunk
    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<(), Error> {
        let length = bytes.len();
        let (chunk, offset) = self.chunk_containing_mut(address, length)?;
        chunk
            .as_span()
            .slice(offset, length)
            .write_known_bytes(bytes);
        Ok(())
    }

    /// Offset of `address` from the heap base, if it is in range
    fn base_offset(&self, address: u64) -> Result<u32, Error> {
        address
            .checked_sub(self.base)
            .and_then(|offset| u32::try_from(offset).ok())
            .filter(|offset| *offset < self.capacity)
            .ok_or(Error::AccessViolation { address, length: 0 })
    }

    /// Lowest gap of at least `size` free bytes
    fn find_gap(&self, size: u32) -> Option<u32> {
        let mut cursor = 0u32;
        for (&offset, chunk) in &self.chunks {
            if offset - cursor >= size {
                return Some(cursor);
            }
            cursor = offset + chunk.byte_len() as u32;
        }
        if self.capacity - cursor >= size {
            Some(cursor)
        } else {
            None
        }
    }

    /// The chunk containing `[address, address + length)` and the offset of
    /// `address` within it
    fn chunk_containing(&self, address: u64, length: usize) -> Result<(&BitVector, usize), Error> {
        let offset = self.base_offset(address)?;
        let violation = Error::AccessViolation { address, length };
        let (start, chunk) = self
            .chunks
            .range(..=offset)
            .next_back()
            .ok_or(violation)?;
        let within = (offset - start) as usize;
        if within + length > chunk.byte_len() {
            return Err(Error::AccessViolation { address, length });
        }
        Ok((chunk, within))
    }

    fn chunk_containing_mut(
        &mut self,
        address: u64,
        length: usize,
    ) -> Result<(&mut BitVector, usize), Error> {
        let offset = self.base_offset(address)?;
        let violation = Error::AccessViolation { address, length };
        let (start, chunk) = self
            .chunks
            .range_mut(..=offset)
            .next_back()
            .ok_or(violation)?;
        let within = (offset - start) as usize;
        if within + length > chunk.byte_len() {
            return Err(Error::AccessViolation { address, length });
        }
        Ok((chunk, within))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allocations_do_not_overlap() {
        let mut heap = BasicHeap::new(64);
        let first = heap.allocate(16, true).unwrap();
        let second = heap.allocate(16, true).unwrap();
        let third = heap.allocate(8, false).unwrap();

        let ranges = heap.allocated_chunks();
        assert_eq!(ranges.len(), 3);
        for (index, range) in ranges.iter().enumerate() {
            for other in &ranges[index + 1..] {
                assert!(
                    range.end <= other.start || other.end <= range.start,
                    "live chunks must be disjoint: {:?} vs {:?}",
                    range,
                    other
                );
            }
        }
        assert!(heap.is_valid_address(first));
        assert!(heap.is_valid_address(second));
        assert!(heap.is_valid_address(third));
    }

    #[test]
    fn freed_space_is_reused() {
        let mut heap = BasicHeap::new(32);
        let first = heap.allocate(16, true).unwrap();
        let _second = heap.allocate(16, true).unwrap();
        assert!(matches!(
            heap.allocate(8, true),
            Err(Error::OutOfMemory { requested: 8 })
        ));

        heap.free(first).unwrap();
        assert!(!heap.is_valid_address(first));
        let again = heap.allocate(8, true).unwrap();
        assert_eq!(again, first, "first fit lands in the freed gap");
    }

    #[test]
    fn freeing_a_non_base_address_is_rejected() {
        let mut heap = BasicHeap::new(64);
        let chunk = heap.allocate(16, true).unwrap();
        assert!(heap.free(chunk + 1).is_err());
        assert!(heap.free(chunk).is_ok());
        assert!(heap.free(chunk).is_err(), "double free is rejected");
    }

    #[test]
    fn initialization_controls_knownness() {
        let mut heap = BasicHeap::new(64);
        let known = heap.allocate(8, true).unwrap();
        let unknown = heap.allocate(8, false).unwrap();

        assert!(heap.chunk_slice(known).unwrap().is_fully_known());
        assert!(heap.chunk_slice(unknown).unwrap().is_fully_unknown());
    }

    #[test]
    fn interior_reads_and_writes() {
        let mut heap = BasicHeap::new(64);
        let chunk = heap.allocate(16, true).unwrap();

        heap.write(chunk + 4, &[1, 2, 3, 4]).unwrap();
        let mut buffer = [0u8; 2];
        heap.read(chunk + 5, &mut buffer).unwrap();
        assert_eq!(buffer, [2, 3]);

        assert!(
            heap.write(chunk + 14, &[0; 4]).is_err(),
            "write crossing the chunk end is a violation"
        );
        assert!(heap.read(chunk + 16, &mut buffer).is_err());
    }

    #[test]
    fn rebase_remaps_addresses_consistently() {
        let mut heap = BasicHeap::new(64);
        let chunk = heap.allocate(8, true).unwrap();
        heap.write(chunk, &[0xab; 8]).unwrap();

        heap.rebase(0x1000);
        assert_eq!(heap.range().start, 0x1000);
        assert!(!heap.is_valid_address(chunk));
        assert!(heap.is_valid_address(0x1000 + chunk));

        let mut buffer = [0u8; 1];
        heap.read(0x1000 + chunk, &mut buffer).unwrap();
        assert_eq!(buffer[0], 0xab, "contents survive a rebase");
    }
}
