use crate::bits::BitVector;
use crate::util::Trilean;
use crate::Error;

/// Coarse classification of an evaluation-stack slot
///
/// The hint is a dispatch aid, not a semantic type: it decides whether
/// `add`/`sub`/`mul`/`div` mean integer or IEEE-754 arithmetic, and whether
/// the slot participates in reference semantics. The precise type of the
/// value, where one exists, lives in the type graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeHint {
    Integer,
    Float,
    Ref,
    Struct,
}

/// One evaluation-stack entry: a bit-vector payload with a type hint
///
/// Reference slots hold a pointer-width address. The three-valued truth of
/// "is this reference null" falls out of the payload's known bits: an
/// all-known zero is definitely null, any known set bit is definitely
/// non-null, anything else is unknown.
#[derive(Debug, Clone)]
pub struct StackSlot {
    pub contents: BitVector,
    pub type_hint: TypeHint,
}

impl StackSlot {
    pub fn integer(contents: BitVector) -> StackSlot {
        StackSlot {
            contents,
            type_hint: TypeHint::Integer,
        }
    }

    pub fn float(contents: BitVector) -> StackSlot {
        StackSlot {
            contents,
            type_hint: TypeHint::Float,
        }
    }

    pub fn structure(contents: BitVector) -> StackSlot {
        StackSlot {
            contents,
            type_hint: TypeHint::Struct,
        }
    }

    pub fn from_i32(value: i32) -> StackSlot {
        StackSlot::integer(BitVector::from_i32(value))
    }

    pub fn from_i64(value: i64) -> StackSlot {
        StackSlot::integer(BitVector::from_i64(value))
    }

    pub fn from_f32(value: f32) -> StackSlot {
        StackSlot::float(BitVector::from_f32(value))
    }

    pub fn from_f64(value: f64) -> StackSlot {
        StackSlot::float(BitVector::from_f64(value))
    }

    /// Known reference to `address`
    pub fn reference(address: u64, pointer_size: u32) -> StackSlot {
        StackSlot {
            contents: BitVector::from_uint(address, pointer_size as usize * 8),
            type_hint: TypeHint::Ref,
        }
    }

    /// Known null reference
    pub fn null_reference(pointer_size: u32) -> StackSlot {
        StackSlot::reference(0, pointer_size)
    }

    /// Reference about which nothing is known
    pub fn unknown_reference(pointer_size: u32) -> StackSlot {
        StackSlot {
            contents: BitVector::unknown(pointer_size as usize * 8),
            type_hint: TypeHint::Ref,
        }
    }

    /// Integer of `byte_size` bytes about which nothing is known
    pub fn unknown_integer(byte_size: u32) -> StackSlot {
        StackSlot::integer(BitVector::unknown(byte_size as usize * 8))
    }

    pub fn unknown_float(byte_size: u32) -> StackSlot {
        StackSlot::float(BitVector::unknown(byte_size as usize * 8))
    }

    /// Size of the slot's payload in bytes
    pub fn size(&self) -> usize {
        self.contents.byte_len()
    }

    pub fn is_reference(&self) -> bool {
        self.type_hint == TypeHint::Ref
    }

    /// Three-valued "is this reference null"; meaningful for `Ref` slots
    pub fn is_null(&self) -> Trilean {
        self.contents.as_slice().is_zero()
    }

    /// Fully-known reference address, if there is one
    pub fn as_address(&self) -> Option<u64> {
        if self.type_hint != TypeHint::Ref {
            return None;
        }
        self.contents.as_slice().le_u64()
    }

    /// Fully-known floating-point value, widened to `f64`
    pub fn float_value(&self) -> Option<f64> {
        if self.type_hint != TypeHint::Float {
            return None;
        }
        let raw = self.contents.as_slice().le_uint()?;
        match self.contents.bit_len() {
            32 => Some(f64::from(f32::from_bits(raw as u32))),
            64 => Some(f64::from_bits(raw as u64)),
            _ => None,
        }
    }

    /// Three-valued "is the slot's value zero"
    pub fn is_zero(&self) -> Trilean {
        match self.type_hint {
            TypeHint::Integer | TypeHint::Ref | TypeHint::Struct => {
                self.contents.as_slice().is_zero()
            }
            TypeHint::Float => match self.float_value() {
                Some(value) => Trilean::from(value == 0.0),
                None => Trilean::Unknown,
            },
        }
    }

    /// Three-valued "is the slot's value non-zero"
    pub fn is_nonzero(&self) -> Trilean {
        !self.is_zero()
    }

    /// Three-valued "is the slot's value strictly positive"
    ///
    /// A reference is never positive in the numeric sense: when its nullness
    /// is decided the answer is a definite no, and only an entirely unknown
    /// reference leaves the question open.
    pub fn is_positive(&self) -> Trilean {
        match self.type_hint {
            TypeHint::Ref => match self.is_null() {
                Trilean::Unknown => Trilean::Unknown,
                _ => Trilean::False,
            },
            TypeHint::Integer | TypeHint::Struct => {
                let slice = self.contents.as_slice();
                (!slice.sign_bit()).and(!slice.is_zero())
            }
            TypeHint::Float => match self.float_value() {
                Some(value) => Trilean::from(value > 0.0),
                None => Trilean::Unknown,
            },
        }
    }

    /// Three-valued "is the slot's value negative"; references never are
    pub fn is_negative(&self) -> Trilean {
        match self.type_hint {
            TypeHint::Ref => Trilean::False,
            TypeHint::Integer | TypeHint::Struct => self.contents.as_slice().sign_bit(),
            TypeHint::Float => match self.float_value() {
                Some(value) => Trilean::from(value < 0.0),
                None => Trilean::Unknown,
            },
        }
    }

    /// Reinterpret a reference as an integer of `byte_width` bytes
    ///
    /// The numeric value of an object address is an implementation detail of
    /// the virtual heap, so the bits are only known when the reference is
    /// known null (they are then a known zero); any other reference
    /// reinterprets as a fully unknown integer.
    pub fn reinterpret_reference(&self, byte_width: u32) -> Result<BitVector, Error> {
        if self.type_hint != TypeHint::Ref {
            return Err(Error::InvalidOperation(
                "reinterpreting a non-reference slot as a reference",
            ));
        }
        let bit_len = byte_width as usize * 8;
        match self.is_null() {
            Trilean::True => Ok(BitVector::zeroed(bit_len)),
            _ => Ok(BitVector::unknown(bit_len)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reference_nullness() {
        assert_eq!(StackSlot::null_reference(8).is_null(), Trilean::True);
        assert_eq!(StackSlot::reference(0x40, 8).is_null(), Trilean::False);
        assert_eq!(StackSlot::unknown_reference(8).is_null(), Trilean::Unknown);
    }

    #[test]
    fn reference_sign_predicates() {
        let null = StackSlot::null_reference(8);
        let live = StackSlot::reference(0x40, 8);
        let unknown = StackSlot::unknown_reference(8);

        assert_eq!(null.is_positive(), Trilean::False);
        assert_eq!(live.is_positive(), Trilean::False);
        assert_eq!(unknown.is_positive(), Trilean::Unknown);

        assert_eq!(null.is_negative(), Trilean::False);
        assert_eq!(live.is_negative(), Trilean::False);
        assert_eq!(unknown.is_negative(), Trilean::False);
    }

    #[test]
    fn integer_sign_predicates() {
        assert_eq!(StackSlot::from_i32(5).is_positive(), Trilean::True);
        assert_eq!(StackSlot::from_i32(-5).is_positive(), Trilean::False);
        assert_eq!(StackSlot::from_i32(-5).is_negative(), Trilean::True);
        assert_eq!(StackSlot::from_i32(0).is_positive(), Trilean::False);
        assert_eq!(StackSlot::unknown_integer(4).is_positive(), Trilean::Unknown);
    }

    #[test]
    fn reinterpreting_references() {
        let null = StackSlot::null_reference(8);
        let reinterpreted = null.reinterpret_reference(4).unwrap();
        assert!(reinterpreted.is_fully_known());
        assert_eq!(reinterpreted.as_slice().le_u32(), Some(0));

        let live = StackSlot::reference(0x40, 8);
        let reinterpreted = live.reinterpret_reference(8).unwrap();
        assert!(
            reinterpreted.as_slice().is_fully_unknown(),
            "a concrete address never leaks into integer space"
        );

        assert!(StackSlot::from_i32(1).reinterpret_reference(4).is_err());
    }

    #[test]
    fn float_truth() {
        assert_eq!(StackSlot::from_f64(0.0).is_zero(), Trilean::True);
        assert_eq!(StackSlot::from_f64(-0.0).is_zero(), Trilean::True);
        assert_eq!(StackSlot::from_f32(2.5).is_positive(), Trilean::True);
        assert_eq!(StackSlot::from_f32(-2.5).is_negative(), Trilean::True);
        assert_eq!(StackSlot::unknown_float(8).is_zero(), Trilean::Unknown);
    }
}
