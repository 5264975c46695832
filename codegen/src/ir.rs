//! C emission for fused IR functions.
//!
//! Walks the top-level operations of an [`IRFunction`] in program order:
//!
//! - allocations become stack arrays, unless a fusion group eliminated them;
//! - top-level reductions over a slice get their own vector loop, over `[0, n)` of the
//!   first integer parameter when they carry no range;
//! - range-less top-level elementwise nodes are scalar statements between passes;
//! - loops become a vector loop of `lanes`-wide steps followed by a scalar tail;
//! - the two loops of a `SoftmaxFusion` group are emitted as one loop at the consumer's
//!   position, with the eliminated buffer's stores dropped and its loads forwarded.
//!
//! Every op goes through the profile's [`Selector`]; ops the profile cannot lower become
//! `#error` markers at the point of use. Inline helpers the function calls are defined
//! after the includes.

use std::collections::{BTreeSet, HashMap, HashSet};

use itertools::Itertools;
use tracing::{debug, trace};

use simdgen_dtype::ElemType;
use simdgen_ir::fusion::SOFTMAX_FUSION;
use simdgen_ir::{IRFunction, IRNode, LoopRange, NodeId, OpCategory, OpKind, ParamKind, VecOp};

use crate::config::CodegenConfig;
use crate::emit::{Emit, Unsupported, group, serialize};
use crate::profile::{Profile, Target};
use crate::promote::{self, WidenedAccumulator};
use crate::select::{self, PREDICATE_VAR, Selector};
use crate::types::entry_point_name;
use crate::{RenderedKernel, Renderer, Result};

/// Name of the lane-count constant declared in every vectorized function.
pub const LANES_VAR: &str = "lanes";

/// Renders [`IRFunction`]s for one profile.
pub struct IrEmitter<'p> {
    profile: &'p Profile,
    config: CodegenConfig,
}

impl<'p> IrEmitter<'p> {
    pub fn new(profile: &'p Profile, config: CodegenConfig) -> Self {
        Self { profile, config }
    }

    /// Emit the function as structured C.
    pub fn emit(&self, func: &IRFunction) -> (Vec<Emit>, BTreeSet<String>) {
        let mut emitter = FunctionEmitter::new(func, self.profile, &self.config);
        let body = emitter.body();
        let helpers = emitter.sel.into_helpers();

        let mut function = Vec::with_capacity(body.len() + 2);
        function.push(Emit::open(self.signature(func)));
        function.extend(body);
        function.push(Emit::Close);

        let mut out = preamble(self.profile, &self.config, &helpers, &serialize(&function));
        out.append(&mut function);
        (out, helpers)
    }

    fn signature(&self, func: &IRFunction) -> String {
        let params = func
            .params
            .iter()
            .map(|p| match p.kind {
                ParamKind::Slice(_) => format!("{} *{}", self.profile.c_type, p.name),
                ParamKind::Int => format!("long *p{}", p.name),
                ParamKind::Scalar(elem) => format!("{} *p{}", scalar_param_type(elem), p.name),
            })
            .chain(func.returns.iter().map(|r| format!("{} *pout_{r}", out_type(self.profile))))
            .join(", ");

        let name = entry_point_name(&func.name, self.profile.elem, self.profile.target);
        match self.profile.func_attrs {
            Some(attrs) => format!("void {name}({params}) {attrs}"),
            None => format!("void {name}({params})"),
        }
    }
}

impl Renderer for IrEmitter<'_> {
    type Input = IRFunction;

    fn render(&self, func: &IRFunction) -> Result<RenderedKernel> {
        let (items, helpers) = self.emit(func);
        let entry = entry_point_name(&func.name, self.profile.elem, self.profile.target);
        debug!(entry = %entry, helpers = helpers.len(), "rendered IR function");
        Ok(RenderedKernel::new(serialize(&items), entry, func.name.clone(), self.profile.target, self.profile.elem)
            .with_helpers(helpers))
    }

    fn target(&self) -> Target {
        self.profile.target
    }

    fn supports_op(&self, op: VecOp) -> bool {
        select::supports(self.profile, op)
    }
}

fn scalar_param_type(elem: ElemType) -> &'static str {
    if elem == ElemType::Float64 { "double" } else { "float" }
}

/// Element type of `pout_` return pointers.
pub(crate) fn out_type(profile: &Profile) -> &'static str {
    match profile.elem {
        ElemType::Float64 => "double",
        e if e.is_float() => "float",
        _ => "long",
    }
}

/// Includes, then the inline helpers `code` calls, then math helper prototypes if enabled.
pub(crate) fn preamble(profile: &Profile, config: &CodegenConfig, helpers: &BTreeSet<String>, code: &str) -> Vec<Emit> {
    let mut out = vec![Emit::Raw(profile.include.to_string()), Emit::Raw("#include <math.h>".to_string()), Emit::Blank];
    for helper in profile.inline_helpers_for(code) {
        trace!(helper = helper.name, "defining inline helper");
        out.push(Emit::Raw(helper.definition.to_string()));
        out.push(Emit::Blank);
    }
    if config.helper_prototypes && !helpers.is_empty() {
        out.extend(helpers.iter().map(|h| Emit::Raw(helper_prototype(profile, h))));
        out.push(Emit::Blank);
    }
    out
}

/// Prototype for a recorded math helper.
pub fn helper_prototype(profile: &Profile, helper: &str) -> String {
    let binary = helper.contains("_pow_");
    if let Some(rest) = helper.strip_prefix("_s_") {
        let ty = if rest.ends_with("f64") { "double" } else { "float" };
        let args = if binary { format!("{ty} x, {ty} y") } else { format!("{ty} x") };
        return format!("{ty} {helper}({args});");
    }

    let vec = profile.primary().vec_type;
    if helper.starts_with("_v_reduce_") {
        return format!("{} {helper}({vec} v);", promote::scalar_temp_type(profile));
    }
    let ty = match (&profile.promotion, profile.is_promoted()) {
        (Some(p), true) => p.promoted_vec_type(),
        _ => vec,
    };
    let args = if binary { format!("{ty} x, {ty} y") } else { format!("{ty} x") };
    format!("{ty} {helper}({args});")
}

// ============================================================================
// Function body
// ============================================================================

struct FunctionEmitter<'a, 'p> {
    func: &'a IRFunction,
    profile: &'p Profile,
    config: &'a CodegenConfig,
    sel: Selector<'p>,
    /// Names bound to scalars: scalar params and reduction results.
    scalars: HashSet<String>,
    /// Buffers whose allocation a fusion group removed.
    eliminated: HashSet<String>,
    out: Vec<Emit>,
}

/// Values visible inside one loop body.
#[derive(Default)]
struct Scope {
    locals: HashSet<String>,
    /// Node outputs that are another value under a different name.
    aliases: HashMap<String, String>,
    /// Eliminated buffer -> value last stored into it this iteration.
    forwarded: HashMap<String, String>,
}

impl Scope {
    fn resolve(&self, name: &str) -> String {
        let mut name = name;
        while let Some(next) = self.aliases.get(name) {
            name = next;
        }
        name.to_string()
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.contains(name) || self.aliases.contains_key(name)
    }
}

/// A loop-carried horizontal reduction.
struct Accumulator {
    op: VecOp,
    /// Scalar the reduction writes.
    target: String,
    /// Vector accumulator carried across the vector loop.
    name: String,
    widened: Option<WidenedAccumulator>,
}

impl Accumulator {
    fn new(profile: &Profile, op: VecOp, target: &str) -> Self {
        let name = format!("acc_{target}");
        let widened = (op == VecOp::ReduceSum).then(|| WidenedAccumulator::new(profile, name.clone())).flatten();
        Self { op, target: target.to_string(), name, widened }
    }

    fn declare(&self, sel: &mut Selector<'_>) -> Result<Vec<Emit>, Unsupported> {
        if let Some(w) = &self.widened {
            return Ok(w.declare());
        }
        let init = match self.op {
            VecOp::ReduceSum => sel.zero()?,
            VecOp::ReduceMin | VecOp::ReduceMax => {
                ensure_float(sel.profile(), self.op)?;
                let inf = if self.op == VecOp::ReduceMin { "INFINITY" } else { "-INFINITY" };
                sel.dup(inf)?
            }
            other => return Err(Unsupported(format!("{other} is not a reduction"))),
        };
        Ok(vec![Emit::stmt(format!("{} {} = {init}", sel.vec_type(), self.name))])
    }

    fn update(&self, sel: &mut Selector<'_>, v: &str) -> Result<Vec<Emit>, Unsupported> {
        if let Some(w) = &self.widened {
            return w.add(sel.profile(), v);
        }
        let step = match self.op {
            VecOp::ReduceMin => VecOp::Min,
            VecOp::ReduceMax => VecOp::Max,
            _ => VecOp::Add,
        };
        let value = sel.binary(step, &self.name, v)?;
        Ok(vec![Emit::stmt(format!("{} = {value}", self.name))])
    }

    fn finish(&self, sel: &mut Selector<'_>) -> Result<Vec<Emit>, Unsupported> {
        let mut out = Vec::new();
        if let Some(w) = &self.widened {
            out.push(w.materialize(sel.profile(), &self.name)?);
        }
        out.push(Emit::stmt(format!("{} = {}", self.target, sel.reduce(self.op, &self.name)?)));
        Ok(out)
    }

    /// Scalar tail step on the already-reduced target.
    fn tail_update(&self, v: &str) -> Emit {
        let t = &self.target;
        let v = group(v);
        Emit::stmt(match self.op {
            VecOp::ReduceMin => format!("{t} = {v} < {t} ? {v} : {t}"),
            VecOp::ReduceMax => format!("{t} = {v} > {t} ? {v} : {t}"),
            _ => format!("{t} += {v}"),
        })
    }

    fn identity(&self, profile: &Profile) -> &'static str {
        match self.op {
            VecOp::ReduceMin => "INFINITY",
            VecOp::ReduceMax => "-INFINITY",
            _ if profile.elem.is_float() => "0.0f",
            _ => "0",
        }
    }
}

fn ensure_float(profile: &Profile, op: VecOp) -> Result<(), Unsupported> {
    if profile.elem.is_float() {
        Ok(())
    } else {
        Err(Unsupported(format!("{op} over {} needs an identity value", profile.elem)))
    }
}

fn push_lowered(out: &mut Vec<Emit>, lowered: Result<Vec<Emit>, Unsupported>) {
    match lowered {
        Ok(items) => out.extend(items),
        Err(e) => out.push(e.into()),
    }
}

impl<'a, 'p> FunctionEmitter<'a, 'p> {
    fn new(func: &'a IRFunction, profile: &'p Profile, config: &'a CodegenConfig) -> Self {
        let scalars = func.params.iter().filter(|p| !p.is_slice()).map(|p| p.name.clone()).collect();
        let eliminated = func
            .fusion_groups
            .iter()
            .flat_map(|g| g.eliminated_allocs.iter())
            .filter_map(|&a| func[a].output())
            .map(str::to_string)
            .collect();
        Self { func, profile, config, sel: Selector::new(profile), scalars, eliminated, out: Vec::new() }
    }

    fn body(&mut self) -> Vec<Emit> {
        let func = self.func;

        for p in &func.params {
            match p.kind {
                ParamKind::Int => self.out.push(Emit::stmt(format!("long {0} = *p{0}", p.name))),
                ParamKind::Scalar(elem) => {
                    self.out.push(Emit::stmt(format!("{} {1} = *p{1}", scalar_param_type(elem), p.name)))
                }
                ParamKind::Slice(_) => {}
            }
        }
        if let Some(pred) = self.profile.predicate {
            self.out.push(Emit::stmt(format!("svbool_t {PREDICATE_VAR} = {}", pred.all_true)));
        }
        let vectorized = func.all_nodes().iter().any(|n| n.loop_range.as_ref().is_some_and(|r| r.is_vectorized));
        let whole = func.top_level(OpKind::Reduction).any(|n| n.loop_range.is_none()) && self.whole_range().is_some();
        if vectorized || whole {
            self.out.push(Emit::stmt(format!("const long {LANES_VAR} = {}", self.profile.primary().lanes_expr())));
        }

        for &id in &func.operations {
            let node = &func[id];
            match node.kind {
                OpKind::Alloc => self.alloc(node),
                OpKind::Reduction => self.slice_reduction(node),
                OpKind::Loop => self.top_loop(node),
                OpKind::Elementwise if node.loop_range.is_none() => self.scalar_statement(node),
                other => self.out.push(Emit::unsupported(format!("top-level {other} {} outside a loop", node.op))),
            }
        }

        for r in &func.returns {
            if self.scalars.contains(r) {
                self.out.push(Emit::stmt(format!("*pout_{r} = {r}")));
            } else {
                self.out.push(Emit::unsupported(format!("return value {r} is never computed")));
            }
        }

        std::mem::take(&mut self.out)
    }

    fn alloc(&mut self, node: &IRNode) {
        let Some(name) = node.output() else {
            self.out.push(Emit::unsupported(format!("allocation {} has no name", node.id)));
            return;
        };
        if self.eliminated.contains(name) {
            trace!(alloc = %node.id, name, "skipping eliminated allocation");
            return;
        }
        let size = node.alloc_size.as_deref().unwrap_or("0");
        self.out.push(Emit::stmt(format!("{} {name}[{size}]", self.profile.c_type)));
    }

    fn group_comments(&mut self, ids: &[NodeId]) {
        let func = self.func;
        let groups = ids
            .iter()
            .flat_map(|&id| std::iter::once(id).chain(func[id].children.iter().copied()))
            .filter_map(|id| func[id].fusion_group)
            .unique()
            .sorted();
        for gid in groups {
            let Some(group) = func.group(gid) else { continue };
            let members = group.members.iter().map(|m| m.to_string()).join(" ");
            let mut line = format!("{} {gid}: {members}", group.pattern);
            let eliminated = group.eliminated_allocs.iter().filter_map(|&a| func[a].output()).join(", ");
            if !eliminated.is_empty() {
                line.push_str(&format!(" (eliminates {eliminated})"));
            }
            self.out.push(Emit::Comment(line));
        }
    }

    // ===== Top-level reductions =====

    /// `out = reduce(slice[start..end])` with its own loop.
    fn slice_reduction(&mut self, node: &IRNode) {
        let (Some(op), Some(target), Some(slice)) = (node.op.vec_op(), node.output(), node.input_names.first()) else {
            self.out.push(Emit::unsupported(format!("reduction {} needs a slice operand and an output", node.id)));
            return;
        };
        let Some(range) = node.loop_range.clone().or_else(|| self.whole_range()) else {
            self.out.push(Emit::unsupported(format!("reduction {} over {slice} has no range and no length parameter", node.id)));
            return;
        };

        self.group_comments(&[node.id]);
        let temp = promote::scalar_temp_type(self.profile);
        self.out.push(Emit::stmt(format!("{temp} {target}")));
        self.scalars.insert(target.to_string());

        let acc = Accumulator::new(self.profile, op, target);
        let var = range.loop_var.clone();
        let element = format!("{slice}_{var}");

        self.out.push(Emit::open(""));
        self.out.push(Emit::stmt(format!("long {var} = {}", range.start)));
        if range.is_vectorized {
            let declared = acc.declare(&mut self.sel);
            push_lowered(&mut self.out, declared);
            self.out.push(Emit::open(vector_header(&range)));
            let step = self.vector_load(slice, &var).and_then(|load| {
                let mut items = vec![Emit::stmt(format!("{} {element} = {load}", self.sel.vec_type()))];
                items.extend(acc.update(&mut self.sel, &element)?);
                Ok(items)
            });
            push_lowered(&mut self.out, step);
            self.out.push(Emit::Close);
            let finished = acc.finish(&mut self.sel);
            push_lowered(&mut self.out, finished);
        } else {
            self.out.push(Emit::stmt(format!("{target} = {}", acc.identity(self.profile))));
        }
        if !range.is_vectorized || self.config.scalar_tail {
            self.out.push(Emit::open(scalar_header(&range)));
            let raw = format!("{slice}[{var}]");
            self.out.push(Emit::stmt(format!("{temp} {element} = {}", promote::scalar_promote(self.profile, &raw))));
            self.out.push(acc.tail_update(&element));
            self.out.push(Emit::Close);
        }
        self.out.push(Emit::Close);
    }

    /// `[0, n)` over the first integer parameter, for reductions that carry no range.
    fn whole_range(&self) -> Option<LoopRange> {
        let n = self.func.params.iter().find(|p| p.kind == ParamKind::Int)?;
        Some(LoopRange::vectorized("i", &n.name, self.profile.primary().lanes))
    }

    /// Scalar op between passes, e.g. `invSum = 1.0f / expSum`.
    fn scalar_statement(&mut self, node: &IRNode) {
        let lowered = self.scalar_value(node);
        match lowered {
            Ok((out, value)) => {
                let temp = promote::scalar_temp_type(self.profile);
                self.out.push(Emit::stmt(format!("{temp} {out} = {value}")));
                self.scalars.insert(out.to_string());
            }
            Err(gap) => self.out.push(gap.into()),
        }
    }

    fn scalar_value<'n>(&mut self, node: &'n IRNode) -> Result<(&'n str, String), Unsupported> {
        let op = vec_op(node)?;
        let out = output(node)?;
        let func = self.func;
        let names = node
            .inputs
            .iter()
            .map(|&id| func[id].output().ok_or_else(|| Unsupported(format!("{id} produces no value"))))
            .chain(node.input_names.iter().map(|n| Ok(n.as_str())));
        let mut args = Vec::with_capacity(op.arity());
        for name in names {
            let name = name?;
            if !self.scalars.contains(name) && !is_literal(name) {
                return Err(Unsupported(format!("top-level {op} reads {name}, which is not a computed scalar")));
            }
            args.push(name.to_string());
        }
        Ok((out, self.sel.scalar(op, &args)?))
    }

    // ===== Loops =====

    fn top_loop(&mut self, node: &IRNode) {
        let func = self.func;
        let merged = func.group_of(node.id).filter(|g| g.pattern == SOFTMAX_FUSION);

        let (loops, range) = match merged {
            // Emitted in one piece at the consumer's position.
            Some(group) if group.root != node.id => {
                trace!(loop_id = %node.id, root = %group.root, "deferring loop to fused root");
                return;
            }
            Some(group) => {
                let loops = group.members.iter().copied().filter(|&m| func[m].kind == OpKind::Loop).sorted().collect_vec();
                (loops, group.loop_range.clone().or_else(|| node.loop_range.clone()))
            }
            None => (vec![node.id], node.loop_range.clone()),
        };
        let Some(range) = range else {
            self.out.push(Emit::unsupported(format!("loop {} has no range", node.id)));
            return;
        };
        if loops.len() > 1 {
            debug!(loops = ?loops, "emitting fused loops as one pass");
        }

        self.group_comments(&loops);
        let children = loops.iter().flat_map(|&l| func[l].children.iter().copied()).collect_vec();
        self.emit_loop(&children, &range);
    }

    fn emit_loop(&mut self, children: &[NodeId], range: &LoopRange) {
        let func = self.func;
        let temp = promote::scalar_temp_type(self.profile);

        let accs: HashMap<NodeId, Accumulator> = children
            .iter()
            .map(|&c| &func[c])
            .filter(|n| n.kind == OpKind::Reduction)
            .filter_map(|n| Some((n.id, Accumulator::new(self.profile, n.op.vec_op()?, n.output()?))))
            .collect();
        let ordered = children.iter().filter_map(|c| accs.get(c)).collect_vec();

        for acc in &ordered {
            self.out.push(Emit::stmt(format!("{temp} {}", acc.target)));
        }

        let var = &range.loop_var;
        self.out.push(Emit::open(""));
        self.out.push(Emit::stmt(format!("long {var} = {}", range.start)));

        if range.is_vectorized {
            for acc in &ordered {
                let declared = acc.declare(&mut self.sel);
                push_lowered(&mut self.out, declared);
            }
            self.out.push(Emit::open(vector_header(range)));
            let mut scope = Scope::default();
            for &c in children {
                let lowered = self.vector_node(&func[c], var, &accs, &mut scope);
                push_lowered(&mut self.out, lowered);
            }
            self.out.push(Emit::Close);
            for acc in &ordered {
                let finished = acc.finish(&mut self.sel);
                push_lowered(&mut self.out, finished);
            }
        } else {
            for acc in &ordered {
                self.out.push(Emit::stmt(format!("{} = {}", acc.target, acc.identity(self.profile))));
            }
        }

        if !range.is_vectorized || self.config.scalar_tail {
            self.out.push(Emit::open(scalar_header(range)));
            let mut scope = Scope::default();
            for &c in children {
                let lowered = self.scalar_node(&func[c], var, &accs, &mut scope);
                push_lowered(&mut self.out, lowered);
            }
            self.out.push(Emit::Close);
        }
        self.out.push(Emit::Close);

        self.scalars.extend(ordered.iter().map(|a| a.target.clone()));
    }

    // ===== Vector bodies =====

    fn vector_load(&mut self, buffer: &str, index: &str) -> Result<String, Unsupported> {
        let addr = self.sel.address(buffer, index);
        self.sel.load(&addr)
    }

    fn vector_operand(&mut self, name: &str, scope: &Scope) -> Result<String, Unsupported> {
        if scope.is_local(name) {
            Ok(scope.resolve(name))
        } else if self.scalars.contains(name) || is_literal(name) {
            self.sel.dup(name)
        } else {
            Err(Unsupported(format!("unknown operand {name}")))
        }
    }

    fn node_value(&self, id: NodeId, scope: &Scope) -> Result<String, Unsupported> {
        self.func[id]
            .output()
            .map(|name| scope.resolve(name))
            .ok_or_else(|| Unsupported(format!("{id} produces no value")))
    }

    fn vector_node(
        &mut self,
        node: &IRNode,
        loop_var: &str,
        accs: &HashMap<NodeId, Accumulator>,
        scope: &mut Scope,
    ) -> Result<Vec<Emit>, Unsupported> {
        let index = element_index(self.func, node, loop_var);
        match node.kind {
            OpKind::Load => {
                let (buffer, out) = buffer_and_output(node)?;
                if self.eliminated.contains(buffer) {
                    let value = forwarded(scope, buffer)?;
                    scope.aliases.insert(out.to_string(), value);
                    return Ok(vec![]);
                }
                let load = self.vector_load(buffer, index)?;
                scope.locals.insert(out.to_string());
                Ok(vec![Emit::stmt(format!("{} {out} = {load}", self.sel.vec_type()))])
            }
            OpKind::Store => {
                let buffer = node.input_names.first().ok_or_else(|| Unsupported(format!("store {} has no buffer", node.id)))?;
                let value = self.stored_value(node, scope)?;
                if self.eliminated.contains(buffer) {
                    scope.forwarded.insert(buffer.clone(), value);
                    return Ok(vec![]);
                }
                let addr = self.sel.address(buffer, index);
                Ok(vec![Emit::stmt(self.sel.store(&addr, &value)?)])
            }
            OpKind::Broadcast => {
                let out = output(node)?;
                let source = match (node.inputs.first(), node.input_names.first()) {
                    (Some(&id), _) => self.node_value(id, scope)?,
                    (None, Some(name)) => name.clone(),
                    (None, None) => return Err(Unsupported(format!("broadcast {} has no source", node.id))),
                };
                let value = self.sel.dup(&source)?;
                scope.locals.insert(out.to_string());
                Ok(vec![Emit::stmt(format!("{} {out} = {value}", self.sel.vec_type()))])
            }
            OpKind::Elementwise => {
                let op = vec_op(node)?;
                let out = output(node)?;
                let mut args = Vec::with_capacity(op.arity());
                for &id in &node.inputs {
                    args.push(self.node_value(id, scope)?);
                }
                for name in &node.input_names {
                    args.push(self.vector_operand(name, scope)?);
                }
                let value = self.sel.apply(op, &args)?;
                let ty = match op.category() {
                    OpCategory::Compare | OpCategory::Mask => self.sel.mask_type(),
                    _ if op.is_horizontal() => promote::scalar_temp_type(self.profile),
                    _ => self.sel.vec_type(),
                };
                scope.locals.insert(out.to_string());
                Ok(vec![Emit::stmt(format!("{ty} {out} = {value}"))])
            }
            OpKind::Reduction => {
                let acc = accs.get(&node.id).ok_or_else(|| Unsupported(format!("reduction {} has no output", node.id)))?;
                let input = node.inputs.first().ok_or_else(|| Unsupported(format!("reduction {} has no input", node.id)))?;
                let v = self.node_value(*input, scope)?;
                acc.update(&mut self.sel, &v)
            }
            OpKind::Loop | OpKind::Alloc => Err(Unsupported(format!("nested {} {}", node.kind, node.id))),
        }
    }

    fn stored_value(&self, node: &IRNode, scope: &Scope) -> Result<String, Unsupported> {
        match node.inputs.first() {
            Some(&id) => self.node_value(id, scope),
            None => node
                .input_names
                .get(2)
                .map(|name| scope.resolve(name))
                .ok_or_else(|| Unsupported(format!("store {} has no value", node.id))),
        }
    }

    // ===== Scalar tails =====

    fn scalar_operand(&self, name: &str, scope: &Scope) -> Result<String, Unsupported> {
        if scope.is_local(name) {
            Ok(scope.resolve(name))
        } else if self.scalars.contains(name) || is_literal(name) {
            Ok(name.to_string())
        } else {
            Err(Unsupported(format!("unknown operand {name}")))
        }
    }

    fn scalar_node(
        &mut self,
        node: &IRNode,
        loop_var: &str,
        accs: &HashMap<NodeId, Accumulator>,
        scope: &mut Scope,
    ) -> Result<Vec<Emit>, Unsupported> {
        let temp = promote::scalar_temp_type(self.profile);
        let index = element_index(self.func, node, loop_var);
        match node.kind {
            OpKind::Load => {
                let (buffer, out) = buffer_and_output(node)?;
                if self.eliminated.contains(buffer) {
                    let value = forwarded(scope, buffer)?;
                    scope.aliases.insert(out.to_string(), value);
                    return Ok(vec![]);
                }
                scope.locals.insert(out.to_string());
                let value = promote::scalar_promote(self.profile, &format!("{buffer}[{index}]"));
                Ok(vec![Emit::stmt(format!("{temp} {out} = {value}"))])
            }
            OpKind::Store => {
                let buffer = node.input_names.first().ok_or_else(|| Unsupported(format!("store {} has no buffer", node.id)))?;
                let value = self.stored_value(node, scope)?;
                if self.eliminated.contains(buffer) {
                    scope.forwarded.insert(buffer.clone(), value);
                    return Ok(vec![]);
                }
                Ok(vec![Emit::stmt(format!("{buffer}[{index}] = {}", promote::scalar_demote(self.profile, &value)))])
            }
            OpKind::Broadcast => {
                let out = output(node)?;
                let source = match (node.inputs.first(), node.input_names.first()) {
                    (Some(&id), _) => self.node_value(id, scope)?,
                    (None, Some(name)) => self.scalar_operand(name, scope)?,
                    (None, None) => return Err(Unsupported(format!("broadcast {} has no source", node.id))),
                };
                scope.aliases.insert(out.to_string(), source);
                Ok(vec![])
            }
            OpKind::Elementwise => {
                let op = vec_op(node)?;
                let out = output(node)?;
                let mut args = Vec::with_capacity(op.arity());
                for &id in &node.inputs {
                    args.push(self.node_value(id, scope)?);
                }
                for name in &node.input_names {
                    args.push(self.scalar_operand(name, scope)?);
                }
                let value = self.sel.scalar(op, &args)?;
                let ty = if matches!(op.category(), OpCategory::Compare | OpCategory::Mask) { "int" } else { temp };
                scope.locals.insert(out.to_string());
                Ok(vec![Emit::stmt(format!("{ty} {out} = {value}"))])
            }
            OpKind::Reduction => {
                let acc = accs.get(&node.id).ok_or_else(|| Unsupported(format!("reduction {} has no output", node.id)))?;
                let input = node.inputs.first().ok_or_else(|| Unsupported(format!("reduction {} has no input", node.id)))?;
                let v = self.node_value(*input, scope)?;
                Ok(vec![acc.tail_update(&v)])
            }
            OpKind::Loop | OpKind::Alloc => Err(Unsupported(format!("nested {} {}", node.kind, node.id))),
        }
    }
}

/// Index operand of a load or store inside a loop.
///
/// The enclosing loop's own variable becomes `loop_var`, so loops merged under another
/// loop's variable index with the variable actually declared.
fn element_index<'n>(func: &IRFunction, node: &'n IRNode, loop_var: &'n str) -> &'n str {
    let own = node.parent.and_then(|p| func[p].loop_range.as_ref()).map(|r| r.loop_var.as_str());
    match node.input_names.get(1) {
        Some(index) if Some(index.as_str()) != own => index,
        _ => loop_var,
    }
}

fn vector_header(range: &LoopRange) -> String {
    let var = &range.loop_var;
    format!("for (; {var} + {LANES_VAR} <= {}; {var} += {LANES_VAR})", range.end)
}

fn scalar_header(range: &LoopRange) -> String {
    let var = &range.loop_var;
    format!("for (; {var} < {}; {var}++)", range.end)
}

fn is_literal(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') || name.ends_with("INFINITY")
}

fn vec_op(node: &IRNode) -> Result<VecOp, Unsupported> {
    node.op.vec_op().ok_or_else(|| Unsupported(format!("{} {} is not a vector op", node.kind, node.id)))
}

fn output(node: &IRNode) -> Result<&str, Unsupported> {
    node.output().ok_or_else(|| Unsupported(format!("{} {} writes no value", node.kind, node.id)))
}

fn buffer_and_output(node: &IRNode) -> Result<(&str, &str), Unsupported> {
    let buffer = node.input_names.first().ok_or_else(|| Unsupported(format!("load {} has no buffer", node.id)))?;
    Ok((buffer.as_str(), output(node)?))
}

fn forwarded(scope: &Scope, buffer: &str) -> Result<String, Unsupported> {
    scope
        .forwarded
        .get(buffer)
        .cloned()
        .ok_or_else(|| Unsupported(format!("read of eliminated buffer {buffer} before it is written")))
}
