//! Retained visual node tree the renderer walks each frame.

use std::fmt;

use glam::Vec2;
use lagom_core::Transform;

use crate::component::{Component, ComponentContext};

/// Generational handle to a visual node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}v{})", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
pub struct VisualNode {
    pub label: String,
    pub transform: Transform,
    pub visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl VisualNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Default)]
struct NodeSlot {
    generation: u32,
    node: Option<VisualNode>,
}

#[derive(Debug, Default)]
pub struct VisualTree {
    slots: Vec<NodeSlot>,
    free: Vec<u32>,
    len: usize,
}

impl VisualTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached node.
    pub fn create(&mut self, label: impl Into<String>, transform: Transform) -> NodeId {
        let node = VisualNode {
            label: label.into(),
            transform,
            visible: true,
            parent: None,
            children: Vec::new(),
        };
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(NodeSlot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&VisualNode> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut VisualNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(VisualNode::children).unwrap_or(&[])
    }

    /// Reparent `child` under `parent`. Fails if either is missing or the
    /// move would create a cycle.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.contains(parent) || !self.contains(child) {
            return false;
        }
        let mut cursor = Some(parent);
        while let Some(node) = cursor {
            if node == child {
                return false;
            }
            cursor = self.get(node).and_then(VisualNode::parent);
        }

        self.detach(child);
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.get_mut(parent) {
            node.children.push(child);
        }
        true
    }

    pub fn detach(&mut self, child: NodeId) -> bool {
        let Some(parent) = self.get_mut(child).and_then(|node| node.parent.take()) else {
            return false;
        };
        if let Some(node) = self.get_mut(parent) {
            node.children.retain(|c| *c != child);
        }
        true
    }

    /// Remove a node and its whole subtree.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.detach(id);
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let slot = &mut self.slots[next.index as usize];
            if let Some(node) = slot.node.take() {
                slot.generation += 1;
                self.free.push(next.index);
                self.len -= 1;
                stack.extend(node.children);
            }
        }
        true
    }

    /// Position of the node's origin in root space.
    pub fn global_position(&self, id: NodeId) -> Option<Vec2> {
        let mut node = self.get(id)?;
        let mut point = node.transform.position;
        while let Some(parent) = node.parent.and_then(|p| self.get(p)) {
            point = parent.transform.apply(point);
            node = parent;
        }
        Some(point)
    }

    /// Visible nodes under `root` in paint order: pre-order, siblings
    /// sorted by depth (stable, so equal depths keep insertion order).
    pub fn draw_order(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        self.collect_draw_order(root, &mut order);
        order
    }

    fn collect_draw_order(&self, id: NodeId, order: &mut Vec<NodeId>) {
        let Some(node) = self.get(id) else {
            return;
        };
        if !node.visible {
            return;
        }
        order.push(id);
        let mut children = node.children.clone();
        children.sort_by_key(|c| self.get(*c).map_or(0, |n| n.transform.depth));
        for child in children {
            self.collect_draw_order(child, order);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Component that owns a visual node parented to its entity's node.
#[derive(Debug, Clone)]
pub struct Renderable {
    pub label: String,
    pub transform: Transform,
    node: Option<NodeId>,
}

impl Renderable {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            transform: Transform::default(),
            node: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Set once the component is attached to a live entity.
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }
}

impl Component for Renderable {
    fn on_added(&mut self, ctx: &mut ComponentContext<'_>) {
        let node = ctx.visuals.create(self.label.clone(), self.transform);
        ctx.visuals.attach(ctx.node, node);
        self.node = Some(node);
    }

    fn on_removed(&mut self, ctx: &mut ComponentContext<'_>) {
        if let Some(node) = self.node.take() {
            ctx.visuals.remove(node);
        }
    }
}
