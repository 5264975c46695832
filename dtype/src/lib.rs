//! Element types a SIMD kernel can be instantiated for.
//!
//! Every generated kernel is specialized to exactly one [`ElemType`]. The type decides the
//! C storage type used in pointer signatures, the short suffix used in function and helper
//! names, and whether arithmetic runs natively or through f32 promotion.

pub mod ext;

#[cfg(any(test, feature = "proptest"))]
pub mod proptest_gen;


/// Scalar element types supported by the code generator.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::EnumString, strum::Display)]
#[derive(enumset::EnumSetType)]
#[cfg_attr(feature = "proptest", derive(proptest_derive::Arbitrary))]
pub enum ElemType {
    #[strum(to_string = "float32")]
    Float32,
    #[strum(to_string = "float64")]
    Float64,

    // Reduced precision: storage is 16 bits, math is promoted to f32.
    #[strum(to_string = "float16", serialize = "hwy.Float16")]
    Float16,
    #[strum(to_string = "bfloat16", serialize = "hwy.BFloat16")]
    BFloat16,

    #[strum(to_string = "int32")]
    Int32,
    #[strum(to_string = "int64")]
    Int64,
    #[strum(to_string = "uint8")]
    UInt8,
    #[strum(to_string = "uint32")]
    UInt32,
    #[strum(to_string = "uint64")]
    UInt64,
}

impl ElemType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::Float16 | Self::BFloat16 => 2,
            Self::Float32 | Self::Int32 | Self::UInt32 => 4,
            Self::Float64 | Self::Int64 | Self::UInt64 => 8,
        }
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64 | Self::Float16 | Self::BFloat16)
    }

    /// Half-width floats that have no wide native arithmetic on most targets.
    pub const fn is_reduced_precision(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    pub const fn is_int(&self) -> bool {
        !self.is_float()
    }

    /// Short type suffix used in generated function and helper names (`f32`, `bf16`, `s64`, ...).
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Float32 => "f32",
            Self::Float64 => "f64",
            Self::Float16 => "f16",
            Self::BFloat16 => "bf16",
            Self::Int32 => "s32",
            Self::Int64 => "s64",
            Self::UInt8 => "u8",
            Self::UInt32 => "u32",
            Self::UInt64 => "u64",
        }
    }

    /// C storage type for one element, as it appears in pointer signatures.
    pub const fn c_style(&self) -> &'static str {
        match self {
            Self::Float32 => "float",
            Self::Float64 => "double",
            Self::Float16 | Self::BFloat16 => "unsigned short",
            Self::Int32 => "int",
            Self::Int64 => "long",
            Self::UInt8 => "unsigned char",
            Self::UInt32 => "unsigned int",
            Self::UInt64 => "unsigned long",
        }
    }

    /// C literal for zero in this type's arithmetic domain.
    pub const fn c_zero(&self) -> &'static str {
        match self {
            Self::Float32 | Self::Float16 | Self::BFloat16 => "0.0f",
            Self::Float64 => "0.0",
            _ => "0",
        }
    }
}
