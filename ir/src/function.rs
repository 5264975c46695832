//! Node arena and builder API.
//!
//! An [`IRFunction`] owns every node of one kernel instantiation in a flat `Vec`.
//! Nodes reference each other by [`NodeId`], so the graph has no ownership cycles even
//! though producer/consumer edges point both ways.

use std::ops::{Index, IndexMut};

use smallvec::SmallVec;
use snafu::{OptionExt, ensure};

use simdgen_dtype::ElemType;

use crate::error::{MissingLoopRangeSnafu, NotAContainerSnafu, Result, UnknownNodeSnafu};
use crate::fusion::FusionGroup;
use crate::{GroupId, IRParam, LoopRange, NodeId, NodeOp, OpKind};

/// One operation in the dataflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct IRNode {
    pub id: NodeId,
    pub kind: OpKind,
    pub op: NodeOp,

    /// Explicit producer references, in operand order.
    pub inputs: SmallVec<[NodeId; 2]>,
    /// Symbolic operands resolved by name (buffers, scalars, loop variables, earlier results).
    pub input_names: SmallVec<[String; 2]>,
    /// Symbolic names of the values this node defines.
    pub outputs: SmallVec<[String; 1]>,

    pub loop_range: Option<LoopRange>,
    pub children: Vec<NodeId>,
    /// Enclosing loop or allocation, if nested.
    pub parent: Option<NodeId>,

    /// Element count expression, only for allocations.
    pub alloc_size: Option<String>,
    pub alloc_elem_type: Option<ElemType>,

    // Populated by `analyze`.
    pub producers: Vec<NodeId>,
    pub consumers: Vec<NodeId>,

    pub fusion_group: Option<GroupId>,
    pub is_fusion_root: bool,
}

impl IRNode {
    fn new(id: NodeId, kind: OpKind, op: NodeOp) -> Self {
        Self {
            id,
            kind,
            op,
            inputs: SmallVec::new(),
            input_names: SmallVec::new(),
            outputs: SmallVec::new(),
            loop_range: None,
            children: Vec::new(),
            parent: None,
            alloc_size: None,
            alloc_elem_type: None,
            producers: Vec::new(),
            consumers: Vec::new(),
            fusion_group: None,
            is_fusion_root: false,
        }
    }

    pub fn has_single_consumer(&self) -> bool {
        self.consumers.len() == 1
    }

    pub fn is_fused(&self) -> bool {
        self.fusion_group.is_some()
    }

    /// Group id in the textual form used by diagnostics: `-1` when unfused.
    pub fn fusion_group_index(&self) -> i64 {
        self.fusion_group.map_or(-1, |g| g.0 as i64)
    }

    /// First output name, if any.
    pub fn output(&self) -> Option<&str> {
        self.outputs.first().map(String::as_str)
    }
}

/// Top-level container for one kernel instantiation.
#[derive(Debug, Clone, PartialEq)]
pub struct IRFunction {
    pub name: String,
    pub elem_type: ElemType,
    pub params: Vec<IRParam>,
    /// Scalar results handed back through output pointers.
    pub returns: Vec<String>,
    /// Top-level statements, in program order.
    pub operations: Vec<NodeId>,
    pub fusion_groups: Vec<FusionGroup>,
    nodes: Vec<IRNode>,
}

impl IRFunction {
    pub fn new(name: impl Into<String>, elem_type: ElemType) -> Self {
        Self {
            name: name.into(),
            elem_type,
            params: Vec::new(),
            returns: Vec::new(),
            operations: Vec::new(),
            fusion_groups: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = IRParam>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_returns<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.returns.extend(names.into_iter().map(Into::into));
        self
    }

    /// Every node of the function in id order, including nested children.
    pub fn all_nodes(&self) -> &[IRNode] {
        &self.nodes
    }

    pub(crate) fn all_nodes_mut(&mut self) -> &mut [IRNode] {
        &mut self.nodes
    }

    pub fn get(&self, id: NodeId) -> Option<&IRNode> {
        self.nodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut IRNode> {
        self.nodes.get_mut(id.index())
    }

    pub fn param(&self, name: &str) -> Option<&IRParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Append a top-level node.
    pub fn add_node(&mut self, kind: OpKind, op: impl Into<NodeOp>) -> NodeBuilder<'_> {
        let id = self.push(kind, op.into());
        self.operations.push(id);
        NodeBuilder { func: self, id }
    }

    /// Append a node nested under a loop or allocation.
    pub fn add_child(&mut self, parent: NodeId, kind: OpKind, op: impl Into<NodeOp>) -> Result<NodeBuilder<'_>> {
        let parent_kind = self.get(parent).map(|n| n.kind).context(UnknownNodeSnafu { id: parent })?;
        ensure!(parent_kind.is_container(), NotAContainerSnafu { id: parent, kind: parent_kind });

        let id = self.push(kind, op.into());
        self.nodes[id.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(id);
        Ok(NodeBuilder { func: self, id })
    }

    /// Every loop must carry a well-formed range.
    pub fn validate(&self) -> Result<()> {
        for node in self.nodes.iter().filter(|n| n.kind == OpKind::Loop) {
            node.loop_range.as_ref().context(MissingLoopRangeSnafu { id: node.id })?.validate()?;
        }
        Ok(())
    }

    fn push(&mut self, kind: OpKind, op: NodeOp) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(IRNode::new(id, kind, op));
        id
    }

    /// Number of nodes of the given kind, nested ones included.
    pub fn count_kind(&self, kind: OpKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    /// Top-level nodes of the given kind, in program order.
    pub fn top_level(&self, kind: OpKind) -> impl Iterator<Item = &IRNode> {
        self.operations.iter().map(|&id| &self.nodes[id.index()]).filter(move |n| n.kind == kind)
    }

    pub fn group(&self, id: GroupId) -> Option<&FusionGroup> {
        self.fusion_groups.get(id.0)
    }

    /// Group containing the node, if fused.
    pub fn group_of(&self, id: NodeId) -> Option<&FusionGroup> {
        self.get(id).and_then(|n| n.fusion_group).and_then(|g| self.group(g))
    }
}

impl Index<NodeId> for IRFunction {
    type Output = IRNode;

    fn index(&self, id: NodeId) -> &IRNode {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for IRFunction {
    fn index_mut(&mut self, id: NodeId) -> &mut IRNode {
        &mut self.nodes[id.index()]
    }
}

/// Fluent setter over a freshly added node.
pub struct NodeBuilder<'a> {
    func: &'a mut IRFunction,
    id: NodeId,
}

impl NodeBuilder<'_> {
    pub fn inputs(self, inputs: impl IntoIterator<Item = NodeId>) -> Self {
        self.func[self.id].inputs.extend(inputs);
        self
    }

    pub fn reads<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.func[self.id].input_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn writes<S: Into<String>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.func[self.id].outputs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn range(self, range: &LoopRange) -> Self {
        self.func[self.id].loop_range = Some(range.clone());
        self
    }

    pub fn alloc(self, size: impl Into<String>, elem: ElemType) -> Self {
        let node = &mut self.func[self.id];
        node.alloc_size = Some(size.into());
        node.alloc_elem_type = Some(elem);
        self
    }

    pub fn id(self) -> NodeId {
        self.id
    }
}
