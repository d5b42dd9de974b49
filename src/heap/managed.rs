use super::BasicHeap;
use crate::types::{CoreTypes, TypeId, ValueFactory};
use crate::Error;
use std::collections::HashMap;

/// Typed facade over a [`BasicHeap`]
///
/// Allocations go through the layout engine, header fields are stamped at
/// birth, and the runtime type of every live object is remembered so cast
/// handlers can interrogate concrete references.
pub struct ManagedObjectHeap<'g> {
    raw: BasicHeap,
    core: CoreTypes<'g>,
    object_types: HashMap<u64, TypeId<'g>>,
}

impl<'g> ManagedObjectHeap<'g> {
    /// New empty heap of `capacity` bytes
    pub fn new(capacity: u32, core: CoreTypes<'g>) -> ManagedObjectHeap<'g> {
        ManagedObjectHeap {
            raw: BasicHeap::new(capacity),
            core,
            object_types: HashMap::new(),
        }
    }

    /// The untyped heap underneath
    pub fn raw(&self) -> &BasicHeap {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut BasicHeap {
        &mut self.raw
    }

    /// The runtime type recorded for the object based at `address`
    pub fn type_of(&self, address: u64) -> Option<TypeId<'g>> {
        self.object_types.get(&address).copied()
    }

    /// Allocate a plain object of `ty`
    ///
    /// Arrays and strings are rejected here - their sizes depend on instance
    /// data, so they go through [`Self::allocate_sz_array`] and
    /// [`Self::allocate_string`].
    pub fn allocate_object(
        &mut self,
        factory: &ValueFactory<'g>,
        ty: TypeId<'g>,
        initialize: bool,
    ) -> Result<u64, Error> {
        let size = factory.object_size(ty)?;
        let address = self.raw.allocate(size, initialize)?;
        self.object_types.insert(address, ty);
        Ok(address)
    }

    /// Allocate a single-dimension array of `length` elements of `element`
    ///
    /// The length field is written through the layout engine's slice and is
    /// fully known even in an uninitialized array.
    pub fn allocate_sz_array(
        &mut self,
        factory: &ValueFactory<'g>,
        element: TypeId<'g>,
        length: i64,
        initialize: bool,
    ) -> Result<u64, Error> {
        let size = factory.array_object_size(element, length)?;
        let address = self.raw.allocate(size, initialize)?;

        let chunk = self.raw.chunk_span(address)?;
        let mut length_slot = factory.slice_array_length(chunk);
        length_slot.write_uint(length as u64);

        self.object_types
            .insert(address, factory.graph().sz_array_of(element));
        Ok(address)
    }

    /// Allocate a string of `length` code units without content
    ///
    /// The length field (always 32-bit) is written fully known; the code
    /// units are zeroed or unknown according to `initialize`.
    pub fn allocate_string_of_length(
        &mut self,
        factory: &ValueFactory<'g>,
        length: i64,
        initialize: bool,
    ) -> Result<u64, Error> {
        let size = factory.string_object_size(length)?;
        let address = self.raw.allocate(size, initialize)?;

        let chunk = self.raw.chunk_span(address)?;
        let mut length_slot = factory.slice_string_length(chunk);
        length_slot.write_uint(length as u64);

        self.object_types.insert(address, self.core.string);
        Ok(address)
    }

    /// Allocate a string holding `value`, UTF-16 encoded
    pub fn allocate_string(
        &mut self,
        factory: &ValueFactory<'g>,
        value: &str,
    ) -> Result<u64, Error> {
        let units: Vec<u16> = value.encode_utf16().collect();
        let address = self.allocate_string_of_length(factory, units.len() as i64, true)?;

        let mut encoded = Vec::with_capacity(units.len() * 2);
        for unit in units {
            encoded.extend_from_slice(&unit.to_le_bytes());
        }

        let chunk = self.raw.chunk_span(address)?;
        let mut data = factory.slice_string_data(chunk);
        data.write_known_bytes(&encoded);
        Ok(address)
    }

    /// Release the object based at `address`
    pub fn free(&mut self, address: u64) -> Result<(), Error> {
        self.raw.free(address)?;
        self.object_types.remove(&address);
        Ok(())
    }

    /// Move the heap's reported range to start at `base`, remapping the
    /// recorded object types along with it
    pub fn rebase(&mut self, base: u64) {
        let old_base = self.raw.range().start;
        self.raw.rebase(base);
        self.object_types = std::mem::take(&mut self.object_types)
            .into_iter()
            .map(|(address, ty)| (address - old_base + base, ty))
            .collect();
    }
}
