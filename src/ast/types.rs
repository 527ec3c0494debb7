//! Type categories the analysis needs from the host front end

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-width integer type
///
/// Values are carried as `i128` everywhere in the crate; [`IntType::wrap`]
/// truncates a value to this width with two's-complement semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntType {
    /// Width in bits (8, 16, 32, 64 or 128)
    pub bits: u32,
    /// Signedness
    pub signed: bool,
}

impl IntType {
    /// `signed char`
    pub const I8: IntType = IntType::new(8, true);
    /// `short`
    pub const I16: IntType = IntType::new(16, true);
    /// `unsigned short`
    pub const U16: IntType = IntType::new(16, false);
    /// `int`
    pub const I32: IntType = IntType::new(32, true);
    /// `unsigned int`
    pub const U32: IntType = IntType::new(32, false);
    /// `long long`
    pub const I64: IntType = IntType::new(64, true);
    /// `unsigned long long`
    pub const U64: IntType = IntType::new(64, false);
    /// `__int128`
    pub const I128: IntType = IntType::new(128, true);

    /// Creates an integer type of the given width and signedness.
    pub const fn new(bits: u32, signed: bool) -> Self {
        IntType { bits, signed }
    }

    /// Smallest representable value
    pub fn min_value(self) -> i128 {
        if !self.signed {
            0
        } else if self.bits >= 128 {
            i128::MIN
        } else {
            -(1i128 << (self.bits - 1))
        }
    }

    /// Largest representable value (saturates at `i128::MAX` for 128 bits)
    pub fn max_value(self) -> i128 {
        match (self.bits, self.signed) {
            (b, _) if b >= 128 => i128::MAX,
            (b, true) => (1i128 << (b - 1)) - 1,
            (b, false) => (1i128 << b) - 1,
        }
    }

    /// Returns true if `value` is representable without wrapping.
    pub fn fits(self, value: i128) -> bool {
        value >= self.min_value() && value <= self.max_value()
    }

    /// Truncates `value` to this width.
    pub fn wrap(self, value: i128) -> i128 {
        if self.bits >= 128 {
            return value;
        }
        let modulus = 1i128 << self.bits;
        let raw = value.rem_euclid(modulus);
        if self.signed && raw > self.max_value() {
            raw - modulus
        } else {
            raw
        }
    }

    /// Integer promotion: anything narrower than `int` becomes `int`.
    pub fn promoted(self) -> IntType {
        if self.bits < 32 {
            IntType::I32
        } else {
            self
        }
    }

    /// Usual arithmetic conversion of two integer operands: both are
    /// promoted, then the wider type wins; at equal width unsigned wins.
    pub fn common(self, other: IntType) -> IntType {
        let (a, b) = (self.promoted(), other.promoted());
        match a.bits.cmp(&b.bits) {
            std::cmp::Ordering::Greater => a,
            std::cmp::Ordering::Less => b,
            std::cmp::Ordering::Equal => IntType::new(a.bits, a.signed && b.signed),
        }
    }

    /// Same signedness, different width.
    pub fn with_bits(self, bits: u32) -> IntType {
        IntType::new(bits, self.signed)
    }
}

impl fmt::Display for IntType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", if self.signed { "i" } else { "u" }, self.bits)
    }
}

/// Type category of a variable or expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarType {
    /// Integer of a given width
    Integer(IntType),
    /// Data pointer; arithmetic is in element units
    Pointer,
    /// Fixed-size array
    Array {
        /// Number of elements
        len: u64,
    },
    /// Floating point
    Float,
    /// Class or struct type
    Class {
        /// Whether any field is declared `mutable`
        has_mutable_fields: bool,
    },
}

impl VarType {
    /// `int`
    pub const INT: VarType = VarType::Integer(IntType::I32);

    /// Integer view used for loop arithmetic. Pointers map to the 64-bit
    /// signed difference type; other categories have no integer view.
    pub fn arithmetic(self) -> Option<IntType> {
        match self {
            VarType::Integer(ty) => Some(ty),
            VarType::Pointer => Some(IntType::I64),
            _ => None,
        }
    }

    /// Integer or pointer
    pub fn is_loop_capable(self) -> bool {
        matches!(self, VarType::Integer(_) | VarType::Pointer)
    }

    /// Returns true for class types carrying `mutable` fields.
    pub fn has_mutable_fields(self) -> bool {
        matches!(
            self,
            VarType::Class {
                has_mutable_fields: true
            }
        )
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Integer(ty) => write!(f, "{}", ty),
            VarType::Pointer => write!(f, "pointer"),
            VarType::Array { len } => write!(f, "array[{}]", len),
            VarType::Float => write!(f, "float"),
            VarType::Class { .. } => write!(f, "class"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_signed_and_unsigned() {
        assert_eq!(IntType::I8.wrap(127), 127);
        assert_eq!(IntType::I8.wrap(128), -128);
        assert_eq!(IntType::I8.wrap(-129), 127);
        assert_eq!(IntType::U32.wrap(-1), u32::MAX as i128);
        assert_eq!(IntType::I32.wrap(u32::MAX as i128), -1);
        assert_eq!(IntType::I128.wrap(i128::MIN), i128::MIN);
    }

    #[test]
    fn test_common_type() {
        assert_eq!(IntType::I32.common(IntType::I64), IntType::I64);
        assert_eq!(IntType::U32.common(IntType::I32), IntType::U32);
        assert_eq!(IntType::U32.common(IntType::I64), IntType::I64);
        assert_eq!(IntType::I16.common(IntType::I16), IntType::I32);
        assert_eq!(IntType::U16.common(IntType::I8), IntType::I32);
        assert_eq!(IntType::U16.common(IntType::U32), IntType::U32);
    }

    #[test]
    fn test_ranges() {
        assert_eq!(IntType::I32.min_value(), i32::MIN as i128);
        assert_eq!(IntType::U64.max_value(), u64::MAX as i128);
        assert!(IntType::U32.fits(4_000_000_000));
        assert!(!IntType::I32.fits(4_000_000_000));
    }

    #[test]
    fn test_arithmetic_view() {
        assert_eq!(VarType::INT.arithmetic(), Some(IntType::I32));
        assert_eq!(VarType::Pointer.arithmetic(), Some(IntType::I64));
        assert_eq!(VarType::Float.arithmetic(), None);
        assert!(!VarType::Array { len: 4 }.is_loop_capable());
    }
}
