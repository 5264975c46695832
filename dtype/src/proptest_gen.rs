use crate::*;
use proptest::prelude::*;

#[rustfmt::skip]
impl ElemType {
    pub fn float_generator() -> impl Strategy<Value = Self> {
        prop_oneof![
            Just(ElemType::Float32), Just(ElemType::Float64),
            Just(ElemType::Float16), Just(ElemType::BFloat16)
        ]
    }

    pub fn int_generator() -> impl Strategy<Value = Self> {
        prop_oneof![
            Just(ElemType::Int32), Just(ElemType::Int64),
            Just(ElemType::UInt8), Just(ElemType::UInt32), Just(ElemType::UInt64)
        ]
    }
}
