//! Presentation seam. The loop hands the finished visual tree to a
//! [`Renderer`] once per frame.

use lagom_core::Color;
use lagom_ecs::{NodeId, VisualTree};
use tracing::trace;

pub trait Renderer {
    /// Draw everything reachable from `stage`.
    fn render(&mut self, visuals: &VisualTree, stage: NodeId, background: Color);
}

/// Headless renderer. Walks the draw order and counts what it would draw.
#[derive(Debug, Default, Clone)]
pub struct NullRenderer {
    frames: u64,
    last_node_count: usize,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Visible nodes in the last frame, stage included.
    pub fn last_node_count(&self) -> usize {
        self.last_node_count
    }
}

impl Renderer for NullRenderer {
    fn render(&mut self, visuals: &VisualTree, stage: NodeId, _background: Color) {
        self.frames += 1;
        self.last_node_count = visuals.draw_order(stage).len();
        trace!(frame = self.frames, nodes = self.last_node_count, "frame rendered");
    }
}
