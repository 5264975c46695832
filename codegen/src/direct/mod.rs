//! Direct translation of the statement subset to C.
//!
//! A [`FuncDecl`] is walked statement by statement. Vector operations are leaf calls
//! lowered through the profile's [`Selector`]; everything else (integer arithmetic,
//! loops, branches) maps onto the equivalent C construct. Every local is typed by the
//! [`Kind`] of the value that initializes it.
//!
//! Two accumulator shapes are recognized up front, before any code is emitted:
//!
//! - `acc := Zero()` only ever updated as `acc = MulAdd(a, b, acc)` or `acc = Add(acc, v)`
//!   becomes a widened `(lo, hi)` f32 pair on profiles that widen; every read demotes
//!   and recombines the halves inline;
//! - `acc := Zero()` only ever updated as `acc = DotAccumulate(a, b, acc)` is declared in
//!   the profile's dot-product accumulator type.

pub mod ast;
pub mod signature;

use std::collections::{BTreeSet, HashMap, HashSet};

use smallvec::{SmallVec, smallvec};
use tracing::{debug, trace};

use simdgen_dtype::ElemType;
use simdgen_ir::{OpCategory, VecOp};

use self::ast::{BinOp, Expr, FuncDecl, Stmt, TypeRef, UnOp};
use self::signature::{Binding, Signature, map_signature};
use crate::config::CodegenConfig;
use crate::emit::{Emit, Unsupported, call, group, serialize};
use crate::error::{Error, Result, UnknownVariableSnafu, UnsupportedConstructsSnafu};
use crate::ir::{LANES_VAR, preamble};
use crate::profile::{Profile, Target};
use crate::promote::{self, WidenedAccumulator};
use crate::select::{self, PREDICATE_VAR, Selector};
use crate::tile::{Tile, TileEmitter};
use crate::{RenderedKernel, Renderer};

/// Translates [`FuncDecl`]s for one profile.
pub struct Translator<'p> {
    profile: &'p Profile,
    config: CodegenConfig,
}

/// Structured output of one translation.
#[derive(Debug, Clone)]
pub struct Translation {
    pub items: Vec<Emit>,
    pub entry_point: String,
    pub helpers: BTreeSet<String>,
}

impl<'p> Translator<'p> {
    pub fn new(profile: &'p Profile, config: CodegenConfig) -> Self {
        Self { profile, config }
    }

    /// Translate `decl` to structured C.
    ///
    /// Fails when the signature has constructs the calling convention cannot express
    /// (all of them are reported together) or when the body names an undeclared variable.
    /// Operations the profile cannot lower become `#error` markers instead.
    pub fn translate(&self, decl: &FuncDecl) -> Result<Translation> {
        let sig = map_signature(decl, self.profile).map_err(|errors| UnsupportedConstructsSnafu { errors }.build())?;

        let mut body = BodyEmitter::new(self.profile, &sig, &decl.body);
        body.block(&decl.body)?;

        let mut helpers = body.sel.helpers().clone();
        if let Some(half) = &body.half {
            helpers.extend(half.helpers().iter().cloned());
        }

        let mut out = sig.typedefs.clone();
        if body.uses_tiles {
            match TileEmitter::new(&mut body.sel).typedef() {
                Ok(items) => out.extend(items),
                Err(gap) => out.push(gap.into()),
            }
            out.push(Emit::Blank);
        }

        out.push(Emit::open(sig.header.clone()));
        out.extend(sig.prologue.iter().cloned());
        if let Some(pred) = self.profile.predicate {
            out.push(Emit::stmt(format!("svbool_t {PREDICATE_VAR} = {}", pred.all_true)));
        }
        if body.uses_lanes {
            out.push(Emit::stmt(format!("const long {LANES_VAR} = {}", self.profile.primary().lanes_expr())));
        }
        out.append(&mut body.out);
        out.push(Emit::Close);

        let mut items = preamble(self.profile, &self.config, &helpers, &serialize(&out));
        items.append(&mut out);
        Ok(Translation { items, entry_point: sig.entry_point, helpers })
    }
}

impl Renderer for Translator<'_> {
    type Input = FuncDecl;

    fn render(&self, decl: &FuncDecl) -> Result<RenderedKernel> {
        let Translation { items, entry_point, helpers } = self.translate(decl)?;
        debug!(entry = %entry_point, helpers = helpers.len(), "translated function");
        Ok(RenderedKernel::new(serialize(&items), entry_point, decl.name.clone(), self.profile.target, self.profile.elem)
            .with_helpers(helpers))
    }

    fn target(&self) -> Target {
        self.profile.target
    }

    fn supports_op(&self, op: VecOp) -> bool {
        select::supports(self.profile, op)
    }
}

// ============================================================================
// Values
// ============================================================================

/// What a local or intermediate value is, and therefore its C type.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Vector,
    Mask,
    /// Element-typed scalar, in the scalar arithmetic type.
    Scalar,
    Int,
    Bool,
    /// Pointer to elements of the given type.
    Slice(TypeRef),
    /// Pointer to the named struct typedef.
    Struct(String),
    Tile,
    /// One f32 half of a promoted vector.
    Half,
    DotAcc,
    /// Widened accumulator, held as f32 halves for the whole function.
    Widened,
    /// No value; also stands in for locals whose definition failed to lower.
    Void,
}

impl Kind {
    fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar | Self::Int | Self::Bool)
    }

    fn is_vector(&self) -> bool {
        matches!(self, Self::Vector | Self::Mask | Self::Half)
    }
}

/// Why a statement could not be lowered.
enum Failure {
    /// Profile gap: becomes an `#error` marker and translation continues.
    Gap(Unsupported),
    Fatal(Error),
}

impl From<Unsupported> for Failure {
    fn from(gap: Unsupported) -> Self {
        Self::Gap(gap)
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::Fatal(err)
    }
}

type Lowering<T> = std::result::Result<T, Failure>;
type Operands = SmallVec<[(String, Kind); 3]>;

fn gap(reason: impl Into<String>) -> Failure {
    Failure::Gap(Unsupported(reason.into()))
}

// ============================================================================
// Accumulator discovery
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Update {
    MulAdd,
    Add,
    Dot,
    Other,
}

fn is_zero(value: &Expr) -> bool {
    matches!(value, Expr::Op { op: VecOp::Zero, args } if args.is_empty())
}

fn classify_update(name: &str, value: &Expr) -> Update {
    let is_acc = |e: &Expr| e.as_ident() == Some(name);
    match value {
        Expr::Op { op: VecOp::MulAdd, args } if args.len() == 3 && is_acc(&args[2]) => Update::MulAdd,
        Expr::Op { op: VecOp::Add, args } if args.len() == 2 && (is_acc(&args[0]) || is_acc(&args[1])) => Update::Add,
        Expr::Binary { op: BinOp::Add, lhs, rhs } if is_acc(&**lhs) || is_acc(&**rhs) => Update::Add,
        Expr::Op { op: VecOp::DotAccumulate, args } if args.len() == 3 && is_acc(&args[2]) => Update::Dot,
        _ => Update::Other,
    }
}

/// Names eligible for a widened accumulator and for a dot-product accumulator.
fn find_accumulators(profile: &Profile, body: &[Stmt]) -> (HashSet<String>, HashSet<String>) {
    let mut zeroed = HashSet::new();
    let mut updates: HashMap<String, BTreeSet<Update>> = HashMap::new();
    let mut record = |name: &str, update: Update| {
        updates.entry(name.to_string()).or_default().insert(update);
    };

    for stmt in body {
        stmt.visit(&mut |s| match s {
            Stmt::Define { name, value } if is_zero(value) => {
                zeroed.insert(name.clone());
            }
            Stmt::Assign { target: Expr::Ident(name), value } => record(name, classify_update(name, value)),
            Stmt::Compound { target: Expr::Ident(name), op, .. } => {
                record(name, if *op == BinOp::Add { Update::Add } else { Update::Other })
            }
            _ => {}
        });
    }

    let only = |name: &String, allowed: &[Update]| {
        updates.get(name).is_some_and(|u| u.iter().all(|x| allowed.contains(x)))
    };
    let widened = match profile.widened {
        Some(_) => zeroed.iter().filter(|n| only(n, &[Update::MulAdd, Update::Add])).cloned().collect(),
        None => HashSet::new(),
    };
    let dot = match profile.dot_acc {
        Some(_) => zeroed.iter().filter(|n| only(n, &[Update::Dot])).cloned().collect(),
        None => HashSet::new(),
    };
    (widened, dot)
}

// ============================================================================
// Function body
// ============================================================================

struct BodyEmitter<'s, 'p> {
    profile: &'p Profile,
    sig: &'s Signature,
    sel: Selector<'p>,
    /// f32 selector of the same target, for promoted halves.
    half: Option<Selector<'static>>,
    vars: HashMap<String, Kind>,
    widened_names: HashSet<String>,
    dot_names: HashSet<String>,
    widened: HashMap<String, WidenedAccumulator>,
    tiles: HashMap<String, Tile>,
    uses_lanes: bool,
    uses_tiles: bool,
    out: Vec<Emit>,
}

impl<'s, 'p> BodyEmitter<'s, 'p> {
    fn new(profile: &'p Profile, sig: &'s Signature, body: &[Stmt]) -> Self {
        let vars = sig
            .bindings
            .iter()
            .map(|(name, binding)| {
                let kind = match binding {
                    Binding::Slice(inner) => Kind::Slice(inner.clone()),
                    Binding::Int => Kind::Int,
                    Binding::Scalar => Kind::Scalar,
                    Binding::Struct(typedef) => Kind::Struct(typedef.clone()),
                };
                (name.clone(), kind)
            })
            .collect();
        let half = profile
            .promotion
            .and_then(|_| crate::profile::profile(profile.target, ElemType::Float32).ok())
            .map(Selector::new);
        let (widened_names, dot_names) = find_accumulators(profile, body);
        if !widened_names.is_empty() || !dot_names.is_empty() {
            trace!(widened = ?widened_names, dot = ?dot_names, "accumulators");
        }

        Self {
            profile,
            sig,
            sel: Selector::new(profile),
            half,
            vars,
            widened_names,
            dot_names,
            widened: HashMap::new(),
            tiles: HashMap::new(),
            uses_lanes: false,
            uses_tiles: false,
            out: Vec::new(),
        }
    }

    fn block(&mut self, body: &[Stmt]) -> Result<()> {
        body.iter().try_for_each(|s| self.stmt(s))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match self.lower_stmt(stmt) {
            Ok(()) => Ok(()),
            Err(Failure::Fatal(err)) => Err(err),
            Err(Failure::Gap(gap)) => {
                if let Stmt::Define { name, .. } | Stmt::Declare { name, .. } = stmt {
                    self.vars.entry(name.clone()).or_insert(Kind::Void);
                }
                self.out.push(gap.into());
                Ok(())
            }
        }
    }

    fn var(&self, name: &str) -> Lowering<&Kind> {
        self.vars.get(name).ok_or_else(|| Failure::Fatal(UnknownVariableSnafu { name }.build()))
    }

    fn half_sel(&mut self) -> Result<&mut Selector<'static>, Unsupported> {
        let (target, elem) = (self.profile.target, self.profile.elem);
        self.half.as_mut().ok_or_else(|| Unsupported(format!("promoted halves on {target} {elem}")))
    }

    fn c_type(&self, kind: &Kind) -> Result<String, Unsupported> {
        Ok(match kind {
            Kind::Vector => self.sel.vec_type().to_string(),
            Kind::Mask => self.sel.mask_type().to_string(),
            Kind::Scalar => promote::scalar_temp_type(self.profile).to_string(),
            Kind::Int => "long".to_string(),
            Kind::Bool => "int".to_string(),
            Kind::Slice(inner) => format!("{} *", self.slice_elem(inner)?),
            Kind::Struct(typedef) => format!("{typedef} *"),
            Kind::Half => match self.profile.promotion {
                Some(p) => p.promoted_vec_type().to_string(),
                None => return Err(Unsupported("promoted half without a promotion".to_string())),
            },
            Kind::DotAcc => match self.profile.dot_acc {
                Some(dot) => dot.acc_type.to_string(),
                None => return Err(Unsupported("dot accumulator without a wide type".to_string())),
            },
            other => return Err(Unsupported(format!("local of kind {other:?}"))),
        })
    }

    fn slice_elem(&self, inner: &TypeRef) -> Result<&'static str, Unsupported> {
        match inner {
            TypeRef::Elem => Ok(self.profile.c_type),
            TypeRef::Float32 => Ok("float"),
            TypeRef::Float64 => Ok("double"),
            TypeRef::Int => Ok("long"),
            other => Err(Unsupported(format!("pointer to {other}"))),
        }
    }

    fn float_literal(&self, f: f64) -> String {
        let text = if f.is_finite() && f.fract() == 0.0 { format!("{f:.1}") } else { format!("{f}") };
        if self.profile.elem == ElemType::Float64 { text } else { format!("{text}f") }
    }

    /// A vector operand: scalars are broadcast.
    fn vectorize(&mut self, text: String, kind: &Kind) -> Result<String, Unsupported> {
        match kind {
            Kind::Vector | Kind::Mask => Ok(text),
            k if k.is_scalar() => self.sel.dup(&text),
            other => Err(Unsupported(format!("{text} ({other:?}) used as a vector"))),
        }
    }

    // ===== Statements =====

    fn lower_stmt(&mut self, stmt: &Stmt) -> Lowering<()> {
        match stmt {
            Stmt::Define { name, value } => self.define(name, value),
            Stmt::DefineMulti { names, value } => self.define_multi(names, value),
            Stmt::Declare { name, ty } => self.declare(name, ty),
            Stmt::Assign { target, value } => self.assign(target, value),
            Stmt::Compound { target, op, value } => self.compound(target, *op, value),
            Stmt::Incr(name) => {
                self.var(name)?;
                self.out.push(Emit::stmt(format!("{name}++")));
                Ok(())
            }
            Stmt::For { init, cond, post, body } => {
                let init = init.as_deref().map(|s| self.inline_stmt(s)).transpose()?.unwrap_or_default();
                let cond = cond.as_ref().map(|c| self.expr(c).map(|(text, _)| text)).transpose()?.unwrap_or_default();
                let post = post.as_deref().map(|s| self.inline_stmt(s)).transpose()?.unwrap_or_default();
                self.out.push(Emit::open(format!("for ({init}; {cond}; {post})")));
                self.block(body)?;
                self.out.push(Emit::Close);
                Ok(())
            }
            Stmt::Range { var, count, body } => {
                let (count, _) = self.expr(count)?;
                self.vars.insert(var.clone(), Kind::Int);
                self.out.push(Emit::open(format!("for (long {var} = 0; {var} < {count}; {var}++)")));
                self.block(body)?;
                self.out.push(Emit::Close);
                Ok(())
            }
            Stmt::If { cond, then, otherwise } => {
                let (text, kind) = self.expr(cond)?;
                if kind.is_vector() {
                    return Err(gap(format!("branch on a vector condition {text}")));
                }
                self.out.push(Emit::open(format!("if ({text})")));
                self.block(then)?;
                self.out.push(Emit::Close);
                if !otherwise.is_empty() {
                    self.out.push(Emit::open("else"));
                    self.block(otherwise)?;
                    self.out.push(Emit::Close);
                }
                Ok(())
            }
            Stmt::Return(values) => self.ret(values),
            Stmt::Expr(expr) => self.expr_stmt(expr),
            Stmt::Break => {
                self.out.push(Emit::stmt("break"));
                Ok(())
            }
            Stmt::Continue => {
                self.out.push(Emit::stmt("continue"));
                Ok(())
            }
        }
    }

    fn define(&mut self, name: &str, value: &Expr) -> Lowering<()> {
        if is_zero(value) {
            if self.widened_names.contains(name)
                && let Some(w) = WidenedAccumulator::new(self.profile, name)
            {
                self.out.extend(w.declare());
                self.widened.insert(name.to_string(), w);
                self.vars.insert(name.to_string(), Kind::Widened);
                return Ok(());
            }
            if self.dot_names.contains(name)
                && let Some(dot) = self.profile.dot_acc
            {
                self.out.push(Emit::stmt(format!("{} {name} = {}", dot.acc_type, dot.zero)));
                self.vars.insert(name.to_string(), Kind::DotAcc);
                return Ok(());
            }
        }

        let (text, kind) = self.expr(value)?;
        let ty = self.c_type(&kind)?;
        let sep = if ty.ends_with('*') { "" } else { " " };
        self.out.push(Emit::stmt(format!("{ty}{sep}{name} = {text}")));
        self.vars.insert(name.to_string(), kind);
        Ok(())
    }

    fn define_multi(&mut self, names: &[String], value: &Expr) -> Lowering<()> {
        let (Expr::Op { op: VecOp::PromoteSplit, args }, [lo, hi]) = (value, names) else {
            return Err(gap(format!("multi-value definition of {}", names.join(", "))));
        };
        let [arg] = args.as_slice() else {
            return Err(gap(format!("{} takes one operand", VecOp::PromoteSplit)));
        };
        let (text, kind) = self.expr(arg)?;
        let v = self.vectorize(text, &kind)?;
        let (lo_value, hi_value) = promote::split(self.profile, &v)?;
        let ty = self.c_type(&Kind::Half)?;
        self.out.push(Emit::stmt(format!("{ty} {lo} = {lo_value}")));
        self.out.push(Emit::stmt(format!("{ty} {hi} = {hi_value}")));
        self.vars.insert(lo.clone(), Kind::Half);
        self.vars.insert(hi.clone(), Kind::Half);
        Ok(())
    }

    fn declare(&mut self, name: &str, ty: &TypeRef) -> Lowering<()> {
        let (kind, init) = match ty {
            TypeRef::Tile => {
                let (tile, decl) = TileEmitter::new(&mut self.sel).declare(name)?;
                self.out.push(decl);
                self.tiles.insert(name.to_string(), tile);
                self.vars.insert(name.to_string(), Kind::Tile);
                self.uses_tiles = true;
                return Ok(());
            }
            TypeRef::Vec => (Kind::Vector, self.sel.zero()?),
            TypeRef::Int => (Kind::Int, "0".to_string()),
            TypeRef::Bool => (Kind::Bool, "0".to_string()),
            TypeRef::Elem | TypeRef::Float32 | TypeRef::Float64 => (Kind::Scalar, self.float_literal(0.0)),
            other => return Err(gap(format!("declaration of {name} as {other}"))),
        };
        let c_type = match ty {
            TypeRef::Float32 => "float".to_string(),
            TypeRef::Float64 => "double".to_string(),
            _ => self.c_type(&kind)?,
        };
        self.out.push(Emit::stmt(format!("{c_type} {name} = {init}")));
        self.vars.insert(name.to_string(), kind);
        Ok(())
    }

    fn assign(&mut self, target: &Expr, value: &Expr) -> Lowering<()> {
        match target {
            Expr::Ident(name) if self.widened.contains_key(name) => self.widened_update(name, value),
            Expr::Ident(name) if matches!(self.vars.get(name), Some(Kind::DotAcc)) => {
                let Expr::Op { op: VecOp::DotAccumulate, args } = value else {
                    return Err(gap(format!("dot accumulator {name} is only updated by {}", VecOp::DotAccumulate)));
                };
                let [a, b, _] = args.as_slice() else {
                    return Err(gap(format!("{} takes three operands", VecOp::DotAccumulate)));
                };
                let (a, ka) = self.expr(a)?;
                let (b, kb) = self.expr(b)?;
                let (a, b) = (self.vectorize(a, &ka)?, self.vectorize(b, &kb)?);
                let value = self.sel.dot_accumulate(&a, &b, name)?;
                self.out.push(Emit::stmt(format!("{name} = {value}")));
                Ok(())
            }
            Expr::Ident(name) => {
                let var_kind = self.var(name)?.clone();
                let (text, kind) = self.expr(value)?;
                let text = if var_kind == Kind::Vector && kind.is_scalar() { self.sel.dup(&text)? } else { text };
                self.out.push(Emit::stmt(format!("{name} = {text}")));
                Ok(())
            }
            Expr::Index { base, index } => {
                let (ptr, inner) = self.pointer(base)?;
                let (index, _) = self.expr(index)?;
                let (text, kind) = self.expr(value)?;
                if kind.is_vector() {
                    return Err(gap(format!("vector stored into element {ptr}[{index}]")));
                }
                let text = if inner == TypeRef::Elem { promote::scalar_demote(self.profile, &text) } else { text };
                self.out.push(Emit::stmt(format!("{ptr}[{index}] = {text}")));
                Ok(())
            }
            other => Err(gap(format!("assignment to {other:?}"))),
        }
    }

    /// `acc = MulAdd(a, b, acc)` / `acc = Add(acc, v)` on the f32 halves.
    fn widened_update(&mut self, name: &str, value: &Expr) -> Lowering<()> {
        let Some(w) = self.widened.get(name).cloned() else {
            return Err(gap(format!("{name} is not a widened accumulator")));
        };
        let items = match classify_update(name, value) {
            Update::MulAdd => {
                let Expr::Op { args, .. } = value else { return Err(gap(format!("update of {name}"))) };
                let (a, ka) = self.expr(&args[0])?;
                let (b, kb) = self.expr(&args[1])?;
                let (a, b) = (self.vectorize(a, &ka)?, self.vectorize(b, &kb)?);
                w.mul_add(self.profile, &a, &b)?
            }
            Update::Add => {
                let operand = match value {
                    Expr::Op { args, .. } => args.iter().find(|a| a.as_ident() != Some(name)),
                    Expr::Binary { lhs, rhs, .. } => [lhs.as_ref(), rhs.as_ref()].into_iter().find(|a| a.as_ident() != Some(name)),
                    _ => None,
                };
                let Some(operand) = operand else { return Err(gap(format!("{name} added to itself"))) };
                let (v, kind) = self.expr(operand)?;
                let v = self.vectorize(v, &kind)?;
                w.add(self.profile, &v)?
            }
            Update::Dot | Update::Other => {
                return Err(gap(format!("widened accumulator {name} is only updated by MulAdd or Add")));
            }
        };
        self.out.extend(items);
        Ok(())
    }

    fn compound(&mut self, target: &Expr, op: BinOp, value: &Expr) -> Lowering<()> {
        if let Expr::Ident(name) = target
            && self.widened.contains_key(name)
        {
            let sum = Expr::binary(op, target.clone(), value.clone());
            return self.widened_update(name, &sum);
        }
        if let Expr::Ident(name) = target
            && self.var(name)?.is_vector()
        {
            let (rhs, kind) = self.expr(value)?;
            let rhs = self.vectorize(rhs, &kind)?;
            let vop = op.vec_op().ok_or_else(|| gap(format!("vector {}=", op.c_operator())))?;
            let updated = self.sel.binary(vop, name, &rhs)?;
            self.out.push(Emit::stmt(format!("{name} = {updated}")));
            return Ok(());
        }
        if let Expr::Index { base, .. } = target {
            let (_, inner) = self.pointer(base)?;
            if inner == TypeRef::Elem && self.profile.scalar_promotion.is_some() {
                // Narrow elements round-trip through the arithmetic type.
                let sum = Expr::binary(op, target.clone(), value.clone());
                return self.assign(target, &sum);
            }
        }
        let (lhs, _) = self.expr(target)?;
        let (rhs, _) = self.expr(value)?;
        self.out.push(Emit::stmt(format!("{lhs} {}= {rhs}", op.c_operator())));
        Ok(())
    }

    /// Statement text for a `for` header clause.
    fn inline_stmt(&mut self, stmt: &Stmt) -> Lowering<String> {
        match stmt {
            Stmt::Define { name, value } => {
                let (text, kind) = self.expr(value)?;
                if !kind.is_scalar() {
                    return Err(gap(format!("loop variable {name} of kind {kind:?}")));
                }
                let ty = self.c_type(&kind)?;
                self.vars.insert(name.clone(), kind);
                Ok(format!("{ty} {name} = {text}"))
            }
            Stmt::Assign { target, value } => {
                let (lhs, _) = self.expr(target)?;
                let (rhs, _) = self.expr(value)?;
                Ok(format!("{lhs} = {rhs}"))
            }
            Stmt::Compound { target, op, value } => {
                let (lhs, _) = self.expr(target)?;
                let (rhs, _) = self.expr(value)?;
                Ok(format!("{lhs} {}= {rhs}", op.c_operator()))
            }
            Stmt::Incr(name) => {
                self.var(name)?;
                Ok(format!("{name}++"))
            }
            other => Err(gap(format!("loop clause {other:?}"))),
        }
    }

    fn ret(&mut self, values: &[Expr]) -> Lowering<()> {
        if values.len() != self.sig.outputs.len() {
            return Err(gap(format!("return of {} values, signature has {}", values.len(), self.sig.outputs.len())));
        }
        let outputs = self.sig.outputs.clone();
        for (value, out) in values.iter().zip(outputs) {
            let (text, kind) = self.expr(value)?;
            if !kind.is_scalar() {
                return Err(gap(format!("returned {text} is a {kind:?}, not a scalar")));
            }
            self.out.push(Emit::stmt(format!("*{out} = {text}")));
        }
        self.out.push(Emit::stmt("return"));
        Ok(())
    }

    fn expr_stmt(&mut self, expr: &Expr) -> Lowering<()> {
        if let Expr::Op { op, args } = expr
            && op.category() == OpCategory::Tile
            && *op != VecOp::ReadRow
        {
            let (tile, rest) = self.tile_operands(*op, args)?;
            let items = TileEmitter::new(&mut self.sel).apply(*op, &tile, &rest)?;
            self.out.extend(items);
            return Ok(());
        }
        let (text, _) = self.expr(expr)?;
        self.out.push(Emit::stmt(text));
        Ok(())
    }

    fn tile_operands(&mut self, op: VecOp, args: &[Expr]) -> Lowering<(Tile, Vec<String>)> {
        let Some((first, rest)) = args.split_first() else {
            return Err(gap(format!("{op} without a tile")));
        };
        let name = first.as_ident().ok_or_else(|| gap(format!("{op} on a non-variable tile")))?;
        self.var(name)?;
        let tile = self.tiles.get(name).cloned().ok_or_else(|| gap(format!("{name} is not a tile")))?;

        let mut operands = Vec::with_capacity(rest.len());
        for arg in rest {
            let (text, kind) = self.expr(arg)?;
            operands.push(match kind {
                Kind::Slice(_) | Kind::Int | Kind::Vector => text,
                other => self.vectorize(text, &other)?,
            });
        }
        Ok((tile, operands))
    }

    // ===== Expressions =====

    fn expr(&mut self, expr: &Expr) -> Lowering<(String, Kind)> {
        match expr {
            Expr::Ident(name) => {
                let kind = self.var(name)?.clone();
                if kind == Kind::Widened {
                    return Ok((self.widened_read(name)?, Kind::Vector));
                }
                Ok((name.clone(), kind))
            }
            Expr::Int(i) => Ok((i.to_string(), Kind::Int)),
            Expr::Float(f) => Ok((self.float_literal(*f), Kind::Scalar)),
            Expr::Lanes => {
                self.uses_lanes = true;
                Ok((LANES_VAR.to_string(), Kind::Int))
            }
            Expr::Len(name) => {
                self.var(name)?;
                let len = self.sig.lengths.get(name).ok_or_else(|| gap(format!("len({name}) of a non-slice")))?;
                Ok((len.clone(), Kind::Int))
            }
            Expr::Unary { op, expr: inner } => {
                let (text, kind) = self.expr(inner)?;
                match (op, &kind) {
                    (UnOp::Neg, Kind::Vector) => Ok((self.sel.unary(VecOp::Neg, &text)?, Kind::Vector)),
                    (UnOp::Neg, k) if k.is_scalar() => Ok((format!("-{}", group(&text)), k.clone())),
                    (UnOp::Not, k) if k.is_scalar() => Ok((format!("!{}", group(&text)), Kind::Bool)),
                    _ => Err(gap(format!("{op:?} on {kind:?}"))),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
            Expr::Index { base, index } => {
                let (ptr, inner) = self.pointer(base)?;
                let (index, _) = self.expr(index)?;
                let element = format!("{ptr}[{index}]");
                Ok(match inner {
                    TypeRef::Elem => (promote::scalar_promote(self.profile, &element), Kind::Scalar),
                    TypeRef::Int => (element, Kind::Int),
                    _ => (element, Kind::Scalar),
                })
            }
            Expr::SliceFrom { .. } => {
                let (text, inner) = self.pointer(expr)?;
                Ok((text, Kind::Slice(inner)))
            }
            Expr::Method { recv, method, args } => {
                let Kind::Struct(_) = self.var(recv)? else {
                    return Err(gap(format!("method {method} on non-struct {recv}")));
                };
                match args.as_slice() {
                    [] => Ok((format!("{recv}->{}", method.to_lowercase()), Kind::Int)),
                    [index] => {
                        let (index, _) = self.expr(index)?;
                        Ok((format!("({recv}->data + ({index}) * {recv}->stride)"), Kind::Slice(TypeRef::Elem)))
                    }
                    _ => Err(gap(format!("method {recv}.{method} with {} arguments", args.len()))),
                }
            }
            Expr::Op { op, args } => self.op(*op, args),
        }
    }

    /// Narrow view of a widened accumulator; the halves stay widened.
    fn widened_read(&self, name: &str) -> Lowering<String> {
        let w = self.widened.get(name).ok_or_else(|| gap(format!("{name} is not a widened accumulator")))?;
        trace!(name, "reading widened accumulator");
        Ok(w.combined(self.profile)?)
    }

    /// Base pointer text and element type of a slice-valued expression.
    fn pointer(&mut self, expr: &Expr) -> Lowering<(String, TypeRef)> {
        match expr {
            Expr::Ident(name) => match self.var(name)? {
                Kind::Slice(inner) => Ok((name.clone(), inner.clone())),
                other => Err(gap(format!("{name} ({other:?}) is not a slice"))),
            },
            Expr::SliceFrom { base, lo } => {
                let (ptr, inner) = self.pointer(base)?;
                let (lo, _) = self.expr(lo)?;
                Ok((format!("({ptr} + {lo})"), inner))
            }
            Expr::Method { .. } => match self.expr(expr)? {
                (text, Kind::Slice(inner)) => Ok((text, inner)),
                (text, other) => Err(gap(format!("{text} ({other:?}) is not a slice"))),
            },
            other => Err(gap(format!("{other:?} is not a slice"))),
        }
    }

    /// Load/store address of a slice expression, with the profile's pointer cast.
    fn address(&mut self, expr: &Expr) -> Lowering<String> {
        let (base, offset) = match expr {
            Expr::SliceFrom { base, lo } => {
                let (ptr, inner) = self.pointer(base)?;
                self.check_vector_elem(&inner)?;
                (ptr, self.expr(lo)?.0)
            }
            other => {
                let (ptr, inner) = self.pointer(other)?;
                self.check_vector_elem(&inner)?;
                (ptr, "0".to_string())
            }
        };
        Ok(self.sel.address(&base, &offset))
    }

    fn check_vector_elem(&self, inner: &TypeRef) -> Result<(), Unsupported> {
        let matches = match inner {
            TypeRef::Elem => true,
            TypeRef::Float32 => self.profile.elem == ElemType::Float32,
            TypeRef::Float64 => self.profile.elem == ElemType::Float64,
            _ => false,
        };
        if matches {
            Ok(())
        } else {
            Err(Unsupported(format!("vector access to []{inner} in a {} kernel", self.profile.elem)))
        }
    }

    fn binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Lowering<(String, Kind)> {
        let (l, lk) = self.expr(lhs)?;
        let (r, rk) = self.expr(rhs)?;

        if lk.is_vector() || rk.is_vector() {
            let masks = lk == Kind::Mask && rk == Kind::Mask;
            let (vop, swap) = match op {
                BinOp::And if masks => (VecOp::MaskAnd, false),
                BinOp::Or if masks => (VecOp::MaskOr, false),
                BinOp::Lt => (VecOp::LessThan, false),
                BinOp::Gt => (VecOp::GreaterThan, false),
                BinOp::Ge => (VecOp::GreaterEqual, false),
                BinOp::Le => (VecOp::GreaterEqual, true),
                BinOp::Eq => (VecOp::Equal, false),
                _ => (op.vec_op().ok_or_else(|| gap(format!("vector operator {}", op.c_operator())))?, false),
            };
            let operands: Operands = if swap { smallvec![(r, rk), (l, lk)] } else { smallvec![(l, lk), (r, rk)] };
            return self.apply(vop, operands);
        }

        let kind = if op.is_comparison() {
            Kind::Bool
        } else if lk == Kind::Scalar || rk == Kind::Scalar {
            Kind::Scalar
        } else {
            Kind::Int
        };
        Ok((format!("{} {} {}", group(&l), op.c_operator(), group(&r)), kind))
    }

    fn op(&mut self, op: VecOp, args: &[Expr]) -> Lowering<(String, Kind)> {
        match (op, args) {
            (VecOp::Load, [src]) => {
                let addr = self.address(src)?;
                Ok((self.sel.load(&addr)?, Kind::Vector))
            }
            (VecOp::Store, [value, dst]) => {
                let (v, kind) = self.expr(value)?;
                let v = self.vectorize(v, &kind)?;
                let addr = self.address(dst)?;
                Ok((self.sel.store(&addr, &v)?, Kind::Void))
            }
            (VecOp::Zero, []) => Ok((self.sel.zero()?, Kind::Vector)),
            (VecOp::Set, [x]) => {
                let (x, _) = self.expr(x)?;
                Ok((self.sel.dup(&x)?, Kind::Vector))
            }
            (VecOp::ReadRow, [tile, index]) => {
                let (tile, _) = self.tile_operands(op, std::slice::from_ref(tile))?;
                let (index, _) = self.expr(index)?;
                Ok((TileEmitter::new(&mut self.sel).read_row(&tile, &index), Kind::Vector))
            }
            (VecOp::PromoteSplit, _) => Err(gap(format!("{op} yields two values; bind them with a two-name definition"))),
            (VecOp::DemoteCombine, [lo, hi]) => {
                let (lo, _) = self.expr(lo)?;
                let (hi, _) = self.expr(hi)?;
                Ok((promote::demote_combine(self.profile, &lo, &hi)?, Kind::Vector))
            }
            (VecOp::DotAccumulate, [a, b, acc]) => {
                let (acc, acc_kind) = self.expr(acc)?;
                if acc_kind != Kind::DotAcc {
                    return Err(gap(format!("{op} into {acc}, which is not a dot accumulator")));
                }
                let (a, ka) = self.expr(a)?;
                let (b, kb) = self.expr(b)?;
                let (a, b) = (self.vectorize(a, &ka)?, self.vectorize(b, &kb)?);
                Ok((self.sel.dot_accumulate(&a, &b, &acc)?, Kind::DotAcc))
            }
            _ if op.category() == OpCategory::Tile => Err(gap(format!("{op} is a statement"))),
            _ => {
                let operands = args.iter().map(|a| self.expr(a)).collect::<Lowering<Operands>>()?;
                self.apply(op, operands)
            }
        }
    }

    /// Lower `op` on already-lowered operands, picking the vector, half or scalar form.
    fn apply(&mut self, op: VecOp, operands: Operands) -> Lowering<(String, Kind)> {
        if operands.len() != op.arity() {
            return Err(gap(format!("{op} takes {} operands, got {}", op.arity(), operands.len())));
        }

        if op == VecOp::ReduceSum
            && let [(acc, Kind::DotAcc)] = operands.as_slice()
        {
            let dot = self.profile.dot_acc.ok_or_else(|| gap(format!("{op} of a dot accumulator")))?;
            return Ok((call(dot.reduce, std::slice::from_ref(acc)), Kind::Scalar));
        }
        if operands.iter().any(|(_, k)| *k == Kind::Half) {
            return self.apply_half(op, operands);
        }
        if operands.iter().all(|(_, k)| k.is_scalar()) {
            let texts: SmallVec<[String; 3]> = operands.into_iter().map(|(t, _)| t).collect();
            let kind = match op.category() {
                OpCategory::Compare | OpCategory::Mask => Kind::Bool,
                _ => Kind::Scalar,
            };
            return Ok((self.sel.scalar(op, &texts)?, kind));
        }

        let mut texts: SmallVec<[String; 3]> = SmallVec::with_capacity(operands.len());
        for (i, (text, kind)) in operands.into_iter().enumerate() {
            // The lane index of GetLane stays an integer.
            texts.push(if op == VecOp::GetLane && i == 1 { text } else { self.vectorize(text, &kind)? });
        }
        let value = self.sel.apply(op, &texts)?;
        let kind = match op.category() {
            OpCategory::Compare | OpCategory::Mask => Kind::Mask,
            _ if op.is_horizontal() => Kind::Scalar,
            _ => Kind::Vector,
        };
        Ok((value, kind))
    }

    /// Ops on promoted f32 halves, through the f32 selector of the same target.
    fn apply_half(&mut self, op: VecOp, operands: Operands) -> Lowering<(String, Kind)> {
        let allowed = matches!(op.category(), OpCategory::Arith | OpCategory::Math | OpCategory::Reduce);
        if !allowed || matches!(op, VecOp::ReduceMin | VecOp::ReduceMax) {
            return Err(gap(format!("{op} on promoted halves")));
        }
        let half = self.half_sel()?;
        let mut texts: SmallVec<[String; 3]> = SmallVec::with_capacity(operands.len());
        for (text, kind) in operands {
            texts.push(match kind {
                Kind::Half => text,
                k if k.is_scalar() => half.dup(&text)?,
                other => return Err(gap(format!("{text} ({other:?}) mixed with promoted halves"))),
            });
        }
        let value = half.apply(op, &texts)?;
        Ok((value, if op.is_horizontal() { Kind::Scalar } else { Kind::Half }))
    }
}
