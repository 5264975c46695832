use super::*;

/// Maps a Rust scalar type to the element type a kernel would be instantiated with.
pub trait HasElemType {
    const ELEM: ElemType;
}

macro_rules! impl_elem_ext {
    ($($ty:ty => $elem:expr),* $(,)?) => {
        $(impl HasElemType for $ty { const ELEM: ElemType = $elem; })*
    };
}

impl_elem_ext! {
    f32 => ElemType::Float32, f64 => ElemType::Float64,
    i32 => ElemType::Int32, i64 => ElemType::Int64,
    u8 => ElemType::UInt8, u32 => ElemType::UInt32, u64 => ElemType::UInt64,
}
