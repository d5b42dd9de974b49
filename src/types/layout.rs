use super::{GenericContext, PrimitiveKind, TypeGraph, TypeId, TypeKind};
use crate::bits::BitVectorSpan;
use crate::util::RefId;
use crate::Error;

/// Width of machine pointers in the emulated process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    W32,
    W64,
}

impl PointerWidth {
    pub fn bytes(self) -> u32 {
        match self {
            PointerWidth::W32 => 4,
            PointerWidth::W64 => 8,
        }
    }
}

/// Configuration of the layout engine
pub struct LayoutSettings {
    /// Pointer width of the emulated process
    pub pointer_width: PointerWidth,

    /// Bytes of header at the start of every heap object
    pub object_header_size: u32,
}

impl Default for LayoutSettings {
    fn default() -> LayoutSettings {
        LayoutSettings {
            pointer_width: PointerWidth::W64,
            object_header_size: 8,
        }
    }
}

/// Decides how values and objects are laid out in memory
///
/// The factory is the single authority on sizes and offsets: the header every
/// object starts with, where each field lives, how arrays and strings place
/// their length and data. It holds no mutable state; all answers are derived
/// from the [`LayoutSettings`] and the type graph.
///
/// Object layouts produced here:
///
/// ```text
/// object:  [header][fields...]
/// szarray: [header][length: pointer-width][elements...]
/// string:  [header][length: 4 bytes][utf-16 code units...]
/// ```
pub struct ValueFactory<'g> {
    graph: &'g TypeGraph<'g>,
    settings: LayoutSettings,
}

impl<'g> ValueFactory<'g> {
    pub fn new(graph: &'g TypeGraph<'g>, settings: LayoutSettings) -> ValueFactory<'g> {
        ValueFactory { graph, settings }
    }

    pub fn graph(&self) -> &'g TypeGraph<'g> {
        self.graph
    }

    pub fn is_32bit(&self) -> bool {
        self.settings.pointer_width == PointerWidth::W32
    }

    pub fn pointer_size(&self) -> u32 {
        self.settings.pointer_width.bytes()
    }

    pub fn object_header_size(&self) -> u32 {
        self.settings.object_header_size
    }

    /// Natural size of a primitive value
    pub fn primitive_size(&self, kind: PrimitiveKind) -> u32 {
        match kind {
            PrimitiveKind::Bool | PrimitiveKind::I1 | PrimitiveKind::U1 => 1,
            PrimitiveKind::Char | PrimitiveKind::I2 | PrimitiveKind::U2 => 2,
            PrimitiveKind::I4 | PrimitiveKind::U4 | PrimitiveKind::R4 => 4,
            PrimitiveKind::I8 | PrimitiveKind::U8 | PrimitiveKind::R8 => 8,
            PrimitiveKind::NativeInt | PrimitiveKind::NativeUInt => self.pointer_size(),
        }
    }

    /// Size of a value of `ty` when embedded in a field or array element
    ///
    /// Reference types contribute a pointer; value types contribute their
    /// packed field size.
    pub fn type_size(&self, ty: TypeId<'g>) -> Result<u32, Error> {
        match &ty.kind {
            TypeKind::Primitive(kind) => Ok(self.primitive_size(*kind)),
            TypeKind::ValueType => self.instance_fields_size(ty),
            TypeKind::GenericInstance { definition, .. } => {
                if definition.is_reference_type() {
                    Ok(self.pointer_size())
                } else {
                    self.instance_fields_size(ty)
                }
            }
            TypeKind::Object
            | TypeKind::String
            | TypeKind::SzArray(_)
            | TypeKind::Array { .. } => Ok(self.pointer_size()),
            TypeKind::GenericParameter { .. } => {
                Err(Error::InvalidOperation("layout of an unresolved generic parameter"))
            }
        }
    }

    /// Natural alignment of a value of `ty`
    pub fn type_alignment(&self, ty: TypeId<'g>) -> Result<u32, Error> {
        match &ty.kind {
            TypeKind::Primitive(kind) => Ok(self.primitive_size(*kind)),
            TypeKind::ValueType => self.max_field_alignment(ty),
            TypeKind::GenericInstance { definition, .. } => {
                if definition.is_reference_type() {
                    Ok(self.pointer_size())
                } else {
                    self.max_field_alignment(ty)
                }
            }
            TypeKind::Object
            | TypeKind::String
            | TypeKind::SzArray(_)
            | TypeKind::Array { .. } => Ok(self.pointer_size()),
            TypeKind::GenericParameter { .. } => {
                Err(Error::InvalidOperation("layout of an unresolved generic parameter"))
            }
        }
    }

    /// Distance between consecutive array elements of `element`
    pub fn element_stride(&self, element: TypeId<'g>) -> Result<u32, Error> {
        let size = self.type_size(element)?;
        let alignment = self.type_alignment(element)?;
        Ok(align_up(size, alignment))
    }

    /// Heap size of an instance of `ty`, header included
    ///
    /// Arrays and strings have no static instance size - their footprint
    /// depends on instance data - so asking for one is an error; use
    /// [`Self::array_object_size`] or [`Self::string_object_size`].
    pub fn object_size(&self, ty: TypeId<'g>) -> Result<u32, Error> {
        match &ty.kind {
            TypeKind::String | TypeKind::SzArray(_) | TypeKind::Array { .. } => Err(
                Error::InvalidOperation("instance size depends on instance data"),
            ),
            TypeKind::GenericParameter { .. } => {
                Err(Error::InvalidOperation("layout of an unresolved generic parameter"))
            }
            TypeKind::Primitive(kind) => Ok(self.object_header_size() + self.primitive_size(*kind)),
            TypeKind::Object | TypeKind::ValueType | TypeKind::GenericInstance { .. } => {
                Ok(self.object_header_size() + self.instance_fields_size(ty)?)
            }
        }
    }

    /// Heap size of a single-dimension array of `length` elements
    pub fn array_object_size(&self, element: TypeId<'g>, length: i64) -> Result<u32, Error> {
        if length < 0 {
            return Err(Error::InvalidArgument(format!(
                "negative array length {}",
                length
            )));
        }
        let stride = u64::from(self.element_stride(element)?);
        let total = u64::from(self.object_header_size())
            + u64::from(self.pointer_size())
            + stride * (length as u64);
        u32::try_from(total)
            .map_err(|_| Error::InvalidArgument(format!("array of {} elements is too large", length)))
    }

    /// Heap size of a string of `length` UTF-16 code units
    pub fn string_object_size(&self, length: i64) -> Result<u32, Error> {
        if length < 0 {
            return Err(Error::InvalidArgument(format!(
                "negative string length {}",
                length
            )));
        }
        let total = u64::from(self.object_header_size()) + 4 + 2 * (length as u64);
        u32::try_from(total)
            .map_err(|_| Error::InvalidArgument(format!("string of {} code units is too large", length)))
    }

    /// Offset of a field from the start of its containing instance
    ///
    /// For reference types the offset includes the object header; for value
    /// types it is relative to the struct's first byte.
    pub fn field_offset(&self, field: super::FieldId<'g>) -> Result<u32, Error> {
        let owner = field.owner;
        let (fields, context) = self.layout_fields(owner);
        let base = if owner.is_reference_type() {
            self.object_header_size()
        } else {
            0
        };

        let mut offset = 0u32;
        for candidate in fields {
            let candidate = RefId(candidate);
            let field_type = context.resolve_type(self.graph, candidate.field_type)?;
            offset = align_up(offset, self.type_alignment(field_type)?);
            if candidate == field {
                return Ok(base + offset);
            }
            offset += self.type_size(field_type)?;
        }

        Err(Error::InvalidArgument(format!(
            "field {} is not declared by {}",
            field.name, owner.name
        )))
    }

    /// Offset of the length slot inside an array chunk
    pub fn array_length_offset(&self) -> u32 {
        self.object_header_size()
    }

    /// Offset of the length slot inside a string chunk
    pub fn string_length_offset(&self) -> u32 {
        self.object_header_size()
    }

    /// Offset of the first UTF-16 code unit inside a string chunk
    pub fn string_data_offset(&self) -> u32 {
        self.object_header_size() + 4
    }

    /// View of an array chunk's length slot (pointer-width)
    pub fn slice_array_length<'a>(&self, chunk: BitVectorSpan<'a>) -> BitVectorSpan<'a> {
        chunk.slice(
            self.array_length_offset() as usize,
            self.pointer_size() as usize,
        )
    }

    /// View of a string chunk's length slot (always 32-bit)
    pub fn slice_string_length<'a>(&self, chunk: BitVectorSpan<'a>) -> BitVectorSpan<'a> {
        chunk.slice(self.string_length_offset() as usize, 4)
    }

    /// View of a string chunk's code-unit data
    pub fn slice_string_data<'a>(&self, chunk: BitVectorSpan<'a>) -> BitVectorSpan<'a> {
        let offset = self.string_data_offset() as usize;
        let remaining = chunk.byte_len() - offset;
        chunk.slice(offset, remaining)
    }

    /// Packed size of an instance's fields, without the header
    fn instance_fields_size(&self, ty: TypeId<'g>) -> Result<u32, Error> {
        let (fields, context) = self.layout_fields(ty);
        let mut offset = 0u32;
        for field in fields {
            let field = RefId(field);
            let field_type = context.resolve_type(self.graph, field.field_type)?;
            offset = align_up(offset, self.type_alignment(field_type)?);
            offset += self.type_size(field_type)?;
        }
        Ok(offset)
    }

    fn max_field_alignment(&self, ty: TypeId<'g>) -> Result<u32, Error> {
        let (fields, context) = self.layout_fields(ty);
        let mut alignment = 1u32;
        for field in fields {
            let field = RefId(field);
            let field_type = context.resolve_type(self.graph, field.field_type)?;
            alignment = alignment.max(self.type_alignment(field_type)?);
        }
        Ok(alignment)
    }

    /// The field list an instance lays out, together with the context its
    /// field types resolve under
    ///
    /// A generic instance with no fields of its own lays out its definition's
    /// fields under the instance's arguments.
    fn layout_fields(
        &self,
        ty: TypeId<'g>,
    ) -> (&'g elsa::FrozenVec<super::FieldId<'g>>, GenericContext<'g>) {
        match &ty.kind {
            TypeKind::GenericInstance { definition, .. } if ty.fields.len() == 0 => {
                (&definition.0.fields, GenericContext::for_type(ty))
            }
            TypeKind::GenericInstance { .. } => (&ty.0.fields, GenericContext::for_type(ty)),
            _ => (&ty.0.fields, GenericContext::empty()),
        }
    }
}

fn align_up(offset: u32, alignment: u32) -> u32 {
    debug_assert!(alignment > 0);
    offset.div_ceil(alignment) * alignment
}
