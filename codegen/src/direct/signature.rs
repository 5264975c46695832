//! Calling convention of generated functions.
//!
//! Every scalar is passed by pointer and dereferenced at the top of the body:
//!
//! ```c
//! void dot_c_f32_neon(float *a, float *b, long *plen_a, float *pout_result) {
//!   long len_a = *plen_a;
//!   ...
//! }
//! ```
//!
//! When the function has no integer parameter, the first slice's length stands in for
//! every `len(x)`; otherwise each slice whose length is read gets its own `plen_<name>`.
//! Struct parameters become typedefs whose fields are discovered from the methods the
//! body calls on them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;

use simdgen_dtype::ElemType;

use super::ast::{Expr, FuncDecl, TypeRef, visit_exprs};
use crate::emit::Emit;
use crate::ir::out_type;
use crate::profile::Profile;
use crate::promote;
use crate::types::entry_point_name;

/// How a source-level variable is reached inside the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Pointer to elements of the given type.
    Slice(TypeRef),
    Int,
    /// Scalar in the tail arithmetic type.
    Scalar,
    /// Pointer to a generated struct typedef.
    Struct(String),
}

/// Fields of one struct typedef, discovered from method calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructShape {
    /// Zero-argument methods: one `long` field each, named after the method.
    pub scalars: BTreeSet<String>,
    /// Whether a one-argument method addresses rows (`data` + `stride`).
    pub strided: bool,
}

/// Result of mapping the parameter list.
#[derive(Debug, Clone)]
pub struct Signature {
    pub entry_point: String,
    pub header: String,
    /// Pointer dereferences at the top of the body.
    pub prologue: Vec<Emit>,
    /// Struct typedefs, emitted before the function.
    pub typedefs: Vec<Emit>,
    pub bindings: HashMap<String, Binding>,
    /// `len(x)` for each slice `x` resolves to this variable.
    pub lengths: HashMap<String, String>,
    /// Output pointer names for each returned value, in order.
    pub outputs: Vec<String>,
    /// Struct parameter -> typedef shape.
    pub structs: BTreeMap<String, StructShape>,
}

/// Two-letter tag used in typedef names.
pub fn elem_tag(elem: ElemType) -> &'static str {
    match elem {
        ElemType::Float32 => "F32",
        ElemType::Float64 => "F64",
        ElemType::Float16 => "F16",
        ElemType::BFloat16 => "BF16",
        ElemType::Int32 => "I32",
        ElemType::Int64 => "I64",
        ElemType::UInt8 => "U8",
        ElemType::UInt32 => "U32",
        ElemType::UInt64 => "U64",
    }
}

fn slice_elem_type(profile: &Profile, inner: &TypeRef) -> Option<&'static str> {
    match inner {
        TypeRef::Elem => Some(profile.c_type),
        TypeRef::Float32 => Some("float"),
        TypeRef::Float64 => Some("double"),
        TypeRef::Int => Some("long"),
        _ => None,
    }
}

fn return_type(profile: &Profile, ty: &TypeRef) -> Option<&'static str> {
    match ty {
        TypeRef::Elem => Some(out_type(profile)),
        TypeRef::Float32 => Some("float"),
        TypeRef::Float64 => Some("double"),
        TypeRef::Int | TypeRef::Bool => Some("long"),
        _ => None,
    }
}

/// Map parameters and returns, collecting every construct the convention cannot express.
pub fn map_signature(decl: &FuncDecl, profile: &Profile) -> Result<Signature, Vec<String>> {
    let mut errors = Vec::new();
    let mut params = Vec::new();
    let mut prologue = Vec::new();
    let mut bindings = HashMap::new();

    let len_reads = {
        let mut reads = BTreeSet::new();
        visit_exprs(&decl.body, &mut |e| {
            if let Expr::Len(name) = e {
                reads.insert(name.clone());
            }
        });
        reads
    };
    let structs = discover_structs(decl);

    let has_int_param = decl.params.iter().any(|p| p.ty == TypeRef::Int);
    let first_slice = decl.params.iter().find(|p| matches!(p.ty, TypeRef::Slice(_))).map(|p| p.name.clone());
    let mut lengths = HashMap::new();
    let mut length_params = Vec::new();

    for p in &decl.params {
        match &p.ty {
            TypeRef::Slice(inner) => match slice_elem_type(profile, inner) {
                Some(ty) => {
                    params.push(format!("{ty} *{}", p.name));
                    bindings.insert(p.name.clone(), Binding::Slice((**inner).clone()));
                }
                None => errors.push(format!("parameter {}: unsupported slice element type {inner}", p.name)),
            },
            TypeRef::Int => {
                params.push(format!("long *p{}", p.name));
                prologue.push(Emit::stmt(format!("long {0} = *p{0}", p.name)));
                bindings.insert(p.name.clone(), Binding::Int);
            }
            TypeRef::Float32 | TypeRef::Float64 => {
                let ty = if p.ty == TypeRef::Float64 { "double" } else { "float" };
                params.push(format!("{ty} *p{}", p.name));
                prologue.push(Emit::stmt(format!("{ty} {0} = *p{0}", p.name)));
                bindings.insert(p.name.clone(), Binding::Scalar);
            }
            TypeRef::Elem => {
                params.push(format!("{} *p{}", profile.c_type, p.name));
                let value = promote::scalar_promote(profile, &format!("*p{}", p.name));
                prologue.push(Emit::stmt(format!("{} {} = {value}", promote::scalar_temp_type(profile), p.name)));
                bindings.insert(p.name.clone(), Binding::Scalar);
            }
            TypeRef::Struct(name) => {
                let typedef = format!("{name}{}", elem_tag(profile.elem));
                params.push(format!("{typedef} *{}", p.name));
                bindings.insert(p.name.clone(), Binding::Struct(typedef));
            }
            other => errors.push(format!("parameter {}: unsupported type {other}", p.name)),
        }
    }

    // Length parameters follow the slices they describe.
    match (&first_slice, has_int_param) {
        (Some(first), false) => {
            let var = format!("len_{first}");
            length_params.push(format!("long *plen_{first}"));
            prologue.push(Emit::stmt(format!("long {var} = *plen_{first}")));
            for p in decl.params.iter().filter(|p| matches!(p.ty, TypeRef::Slice(_))) {
                lengths.insert(p.name.clone(), var.clone());
            }
        }
        _ => {
            for p in decl.params.iter().filter(|p| matches!(p.ty, TypeRef::Slice(_)) && len_reads.contains(&p.name)) {
                let var = format!("len_{}", p.name);
                length_params.push(format!("long *plen_{}", p.name));
                prologue.push(Emit::stmt(format!("long {var} = *plen_{}", p.name)));
                lengths.insert(p.name.clone(), var);
            }
        }
    }
    for name in len_reads.iter().filter(|n| !lengths.contains_key(*n)) {
        errors.push(format!("len({name}): not a slice parameter"));
    }

    let mut outputs = Vec::new();
    for (i, r) in decl.returns.iter().enumerate() {
        let name = match (&r.name, i) {
            (Some(name), _) => name.clone(),
            (None, 0) => "result".to_string(),
            (None, i) => format!("result{i}"),
        };
        match return_type(profile, &r.ty) {
            Some(ty) => {
                length_params.push(format!("{ty} *pout_{name}"));
                outputs.push(format!("pout_{name}"));
            }
            None => errors.push(format!("return {name}: unsupported type {}", r.ty)),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let entry_point = entry_point_name(&decl.name, profile.elem, profile.target);
    let params = params.into_iter().chain(length_params).join(", ");
    let header = match profile.func_attrs {
        Some(attrs) => format!("void {entry_point}({params}) {attrs}"),
        None => format!("void {entry_point}({params})"),
    };

    let typedefs = decl
        .params
        .iter()
        .filter_map(|p| match (&p.ty, bindings.get(&p.name)) {
            (TypeRef::Struct(_), Some(Binding::Struct(typedef))) => {
                Some(struct_typedef(profile, typedef, structs.get(&p.name).cloned().unwrap_or_default()))
            }
            _ => None,
        })
        .flatten()
        .collect();

    Ok(Signature { entry_point, header, prologue, typedefs, bindings, lengths, outputs, structs })
}

fn discover_structs(decl: &FuncDecl) -> BTreeMap<String, StructShape> {
    let struct_params: BTreeSet<&str> =
        decl.params.iter().filter(|p| matches!(p.ty, TypeRef::Struct(_))).map(|p| p.name.as_str()).collect();

    let mut shapes: BTreeMap<String, StructShape> = BTreeMap::new();
    visit_exprs(&decl.body, &mut |e| {
        if let Expr::Method { recv, method, args } = e
            && struct_params.contains(recv.as_str())
        {
            let shape = shapes.entry(recv.clone()).or_default();
            match args.len() {
                0 => {
                    shape.scalars.insert(method.to_lowercase());
                }
                _ => shape.strided = true,
            }
        }
    });
    shapes
}

fn struct_typedef(profile: &Profile, name: &str, shape: StructShape) -> Vec<Emit> {
    let mut fields = vec![Emit::stmt(format!("{} *data", profile.c_type))];
    let mut longs = shape.scalars;
    if shape.strided {
        longs.insert("stride".to_string());
    }
    fields.extend(longs.into_iter().map(|f| Emit::stmt(format!("long {f}"))));

    let mut out = vec![Emit::open("typedef struct")];
    out.extend(fields);
    out.push(Emit::CloseAs(name.to_string()));
    out.push(Emit::Blank);
    out
}
