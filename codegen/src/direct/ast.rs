//! The statement subset accepted by the direct translator.
//!
//! Frontends lower a host-language function into a [`FuncDecl`]. Vector operations are
//! leaf calls into the closed [`VecOp`] vocabulary; everything else is plain scalar C
//! arithmetic, loops and branches.

use std::fmt;

use simdgen_ir::VecOp;

/// Parameter and return types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// The kernel's generic element type `T`.
    Elem,
    Int,
    Float32,
    Float64,
    Bool,
    Slice(Box<TypeRef>),
    Vec,
    Mask,
    Tile,
    /// Pointer to a generic struct instantiated on `T`, e.g. `*Matrix[T]`.
    Struct(String),
    /// Any other named type; not expressible in the calling convention.
    Named(String),
}

impl TypeRef {
    pub fn slice_of(elem: TypeRef) -> Self {
        Self::Slice(Box::new(elem))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elem => write!(f, "T"),
            Self::Int => write!(f, "int"),
            Self::Float32 => write!(f, "float32"),
            Self::Float64 => write!(f, "float64"),
            Self::Bool => write!(f, "bool"),
            Self::Slice(inner) => write!(f, "[]{inner}"),
            Self::Vec => write!(f, "Vec[T]"),
            Self::Mask => write!(f, "Mask[T]"),
            Self::Tile => write!(f, "Tile[T]"),
            Self::Struct(name) => write!(f, "*{name}[T]"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self { name: name.into(), ty }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    /// Named results keep their name; unnamed ones become `result`, `result1`, ...
    pub name: Option<String>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Vec<Return>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub const fn c_operator(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }

    pub const fn is_comparison(&self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne | Self::And | Self::Or)
    }

    /// Vector op with the same lane-wise meaning, for operators applied to vectors.
    pub const fn vec_op(&self) -> Option<VecOp> {
        match self {
            Self::Add => Some(VecOp::Add),
            Self::Sub => Some(VecOp::Sub),
            Self::Mul => Some(VecOp::Mul),
            Self::Div => Some(VecOp::Div),
            Self::BitAnd => Some(VecOp::And),
            Self::BitOr => Some(VecOp::Or),
            Self::BitXor => Some(VecOp::Xor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Int(i64),
    Float(f64),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnOp, expr: Box<Expr> },
    /// `base[index]`, one element.
    Index { base: Box<Expr>, index: Box<Expr> },
    /// `base[lo:]`, a sub-slice starting at `lo`.
    SliceFrom { base: Box<Expr>, lo: Box<Expr> },
    /// `len(x)`.
    Len(String),
    /// Vector width of the kernel's element type.
    Lanes,
    /// Leaf call into the vector vocabulary.
    ///
    /// Operands follow the op's abstract order, except `Store(value, dst)` and tile ops,
    /// whose first operand is the tile.
    Op { op: VecOp, args: Vec<Expr> },
    /// Method on a struct parameter: `m.Rows()`, `m.Row(i)`.
    Method { recv: String, method: String, args: Vec<Expr> },
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Ident(name.into())
    }

    pub fn op(op: VecOp, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::Op { op, args: args.into_iter().collect() }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Self::Index { base: Box::new(base), index: Box::new(index) }
    }

    pub fn slice_from(base: Expr, lo: Expr) -> Self {
        Self::SliceFrom { base: Box::new(base), lo: Box::new(lo) }
    }

    pub fn method(recv: impl Into<String>, method: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::Method { recv: recv.into(), method: method.into(), args: args.into_iter().collect() }
    }

    /// Pre-order walk over this expression and its operands.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Self::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Self::Unary { expr, .. } => expr.visit(f),
            Self::Index { base, index } => {
                base.visit(f);
                index.visit(f);
            }
            Self::SliceFrom { base, lo } => {
                base.visit(f);
                lo.visit(f);
            }
            Self::Op { args, .. } | Self::Method { args, .. } => args.iter().for_each(|a| a.visit(f)),
            Self::Ident(_) | Self::Int(_) | Self::Float(_) | Self::Len(_) | Self::Lanes => {}
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Self::Ident(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `name := value`.
    Define { name: String, value: Expr },
    /// `a, b := value` for multi-result ops (`PromoteSplit`).
    DefineMulti { names: Vec<String>, value: Expr },
    /// `var name T`, zero-initialized.
    Declare { name: String, ty: TypeRef },
    /// `target = value`; the target is an identifier or an element.
    Assign { target: Expr, value: Expr },
    /// `target op= value`.
    Compound { target: Expr, op: BinOp, value: Expr },
    /// `name++`.
    Incr(String),
    /// C-style loop.
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, post: Option<Box<Stmt>>, body: Vec<Stmt> },
    /// `for var := range count`.
    Range { var: String, count: Expr, body: Vec<Stmt> },
    If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    Return(Vec<Expr>),
    Expr(Expr),
    Break,
    Continue,
}

impl Stmt {
    pub fn define(name: impl Into<String>, value: Expr) -> Self {
        Self::Define { name: name.into(), value }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::Assign { target, value }
    }

    /// Pre-order walk over every statement, nested bodies included.
    pub fn visit(&self, f: &mut impl FnMut(&Stmt)) {
        f(self);
        match self {
            Self::For { init, post, body, .. } => {
                if let Some(init) = init {
                    init.visit(f);
                }
                if let Some(post) = post {
                    post.visit(f);
                }
                body.iter().for_each(|s| s.visit(f));
            }
            Self::Range { body, .. } => body.iter().for_each(|s| s.visit(f)),
            Self::If { then, otherwise, .. } => {
                then.iter().chain(otherwise).for_each(|s| s.visit(f));
            }
            _ => {}
        }
    }

    /// Expressions held directly by this statement (not by nested statements).
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Self::Define { value, .. } | Self::DefineMulti { value, .. } => vec![value],
            Self::Assign { target, value } | Self::Compound { target, value, .. } => vec![target, value],
            Self::For { cond, .. } => cond.iter().collect(),
            Self::Range { count, .. } => vec![count],
            Self::If { cond, .. } => vec![cond],
            Self::Return(values) => values.iter().collect(),
            Self::Expr(e) => vec![e],
            Self::Declare { .. } | Self::Incr(_) | Self::Break | Self::Continue => vec![],
        }
    }
}

/// Visit every expression in `body`, nested ones included.
pub fn visit_exprs(body: &[Stmt], f: &mut impl FnMut(&Expr)) {
    for stmt in body {
        stmt.visit(&mut |s| s.exprs().into_iter().for_each(|e| e.visit(f)));
    }
}
