//! Rule-based fusion engine.
//!
//! Fusion groups producer/consumer pairs that can share a single memory pass.
//!
//! # Algorithm
//!
//! 1. Run [`analyze`] so edges reflect the current graph.
//! 2. Sweep candidate pairs in producer-id, then consumer-id order. The first rule (by
//!    descending priority, declaration order breaking ties) whose `matches` and `can_fuse`
//!    both hold commits a group, and the sweep restarts from scratch.
//! 3. A sweep that commits nothing ends the fixpoint.
//! 4. Every group is then extended with unfused elementwise/reduction neighbours that run
//!    over the same range.
//!
//! Cross-loop allocation elimination is a separate narrow pass, see [`eliminate_allocations`].

mod alloc;
mod rules;

use std::cmp::Reverse;

use itertools::Itertools;
use tracing::{debug, trace};

use crate::analysis::analyze;
use crate::{GroupId, IRFunction, IRNode, LoopRange, NodeId, OpKind, ranges_compatible};

pub use alloc::{SOFTMAX_FUSION, eliminate_allocations};
pub use rules::{AllocElim, ElemElem, ElemReduce, ElemStore, LoadElem};

/// A set of nodes emitted as one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionGroup {
    pub id: GroupId,
    /// The member that materializes the group's result.
    pub root: NodeId,
    /// Members in the order they joined.
    pub members: Vec<NodeId>,
    /// Name of the rule or pass that created the group.
    pub pattern: &'static str,
    pub loop_range: Option<LoopRange>,
    pub eliminated_allocs: Vec<NodeId>,
}

impl FusionGroup {
    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    pub fn eliminates(&self, id: NodeId) -> bool {
        self.eliminated_allocs.contains(&id)
    }
}

/// What a rule wants committed. The engine assigns the id and pattern name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionPlan {
    pub root: NodeId,
    pub members: Vec<NodeId>,
    pub loop_range: Option<LoopRange>,
    pub eliminated_allocs: Vec<NodeId>,
}

/// A pairwise fusion rule.
///
/// Rules are stateless and shared across translations.
pub trait FusionRule: Sync {
    fn name(&self) -> &'static str;

    /// Higher priorities are tried first.
    fn priority(&self) -> u32;

    /// Structural check on the node kinds.
    fn matches(&self, producer: &IRNode, consumer: &IRNode) -> bool;

    /// Legality check, run only after `matches` succeeds.
    fn can_fuse(&self, producer: &IRNode, consumer: &IRNode) -> bool;

    /// Build the group rooted at the consumer.
    fn apply(&self, producer: &IRNode, consumer: &IRNode) -> FusionPlan {
        FusionPlan {
            root: consumer.id,
            members: vec![producer.id, consumer.id],
            loop_range: producer.loop_range.clone().or_else(|| consumer.loop_range.clone()),
            eliminated_allocs: Vec::new(),
        }
    }
}

static BUILTIN_RULES: &[&dyn FusionRule] = &[&ElemElem, &ElemReduce, &AllocElim, &LoadElem, &ElemStore];

/// The default rule set, in declaration order.
pub fn builtin_rules() -> &'static [&'static dyn FusionRule] {
    BUILTIN_RULES
}

/// Producer/consumer pairs, in producer-id then consumer-id order.
pub fn find_fusion_candidates(func: &IRFunction) -> Vec<(NodeId, NodeId)> {
    func.all_nodes().iter().flat_map(|n| n.consumers.iter().map(move |&c| (n.id, c))).collect()
}

/// Run the fusion fixpoint and group extension with the built-in rules.
pub fn apply_fusion_rules(func: &mut IRFunction) {
    apply_rules(func, builtin_rules());
}

/// Run the fusion fixpoint and group extension with a custom rule set.
pub fn apply_rules(func: &mut IRFunction, rules: &[&dyn FusionRule]) {
    analyze(func);

    let rules = rules.iter().copied().sorted_by_key(|r| Reverse(r.priority())).collect_vec();

    let mut sweeps = 0usize;
    while let Some((rule, plan)) = first_applicable(func, &rules) {
        sweeps += 1;
        commit(func, rule.name(), plan);
    }
    trace!(sweeps, groups = func.fusion_groups.len(), "fusion fixpoint reached");

    extend_groups(func);
}

fn first_applicable<'r>(func: &IRFunction, rules: &[&'r dyn FusionRule]) -> Option<(&'r dyn FusionRule, FusionPlan)> {
    for (p, c) in find_fusion_candidates(func) {
        let (producer, consumer) = (&func[p], &func[c]);
        if producer.is_fused() || consumer.is_fused() {
            continue;
        }

        if let Some(rule) = rules.iter().find(|r| r.matches(producer, consumer) && r.can_fuse(producer, consumer)) {
            return Some((*rule, rule.apply(producer, consumer)));
        }
    }
    None
}

/// Register a plan as the next sequential group.
pub(crate) fn commit(func: &mut IRFunction, pattern: &'static str, plan: FusionPlan) -> GroupId {
    let id = GroupId(func.fusion_groups.len());

    for &member in &plan.members {
        func[member].fusion_group = Some(id);
    }
    func[plan.root].is_fusion_root = true;

    debug!(group = %id, pattern, root = %plan.root, members = ?plan.members, "fusion group created");

    func.fusion_groups.push(FusionGroup {
        id,
        root: plan.root,
        members: plan.members,
        pattern,
        loop_range: plan.loop_range,
        eliminated_allocs: plan.eliminated_allocs,
    });
    id
}

fn can_extend(group: &FusionGroup, node: &IRNode) -> bool {
    matches!(node.kind, OpKind::Elementwise | OpKind::Reduction)
        && !node.is_fused()
        && ranges_compatible(group.loop_range.as_ref(), node.loop_range.as_ref())
}

fn extend_groups(func: &mut IRFunction) {
    for gi in 0..func.fusion_groups.len() {
        loop {
            let f: &IRFunction = func;
            let group = &f.fusion_groups[gi];
            let joiner = group
                .members
                .iter()
                .flat_map(move |&m| f[m].producers.iter().chain(&f[m].consumers))
                .copied()
                .find(|&n| can_extend(group, &f[n]));

            let Some(joiner) = joiner else { break };
            absorb(func, gi, joiner);
        }
    }
}

fn absorb(func: &mut IRFunction, gi: usize, joiner: NodeId) {
    let id = func.fusion_groups[gi].id;
    let old_root = func.fusion_groups[gi].root;

    func[joiner].fusion_group = Some(id);
    func.fusion_groups[gi].members.push(joiner);

    if joiner > old_root {
        func[old_root].is_fusion_root = false;
        func[joiner].is_fusion_root = true;
        func.fusion_groups[gi].root = joiner;
    }

    debug!(group = %id, node = %joiner, root = %func.fusion_groups[gi].root, "fusion group extended");
}
