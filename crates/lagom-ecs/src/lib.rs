//! Lagom ECS - Entity Component System
//!
//! Entities form a tree under two scene roots and own their components
//! exclusively. Systems declare the component types they need and the scene
//! keeps a reactive index per system, updated on every entity and component
//! change, so no system scans the population per frame.

mod camera;
mod component;
mod entity;
mod error;
mod global_system;
mod index;
mod resource;
mod scene;
mod system;
mod visual;

pub use camera::Camera;
pub use component::{
    AsAny, Component, ComponentContext, ComponentId, ComponentMap, ComponentRef, ComponentSet,
    ComponentType,
};
pub use entity::{ChildEvent, ComponentEvent, Entity, EntityHook, EntityId};
pub use error::{EcsError, SceneConfigError};
pub use global_system::{GlobalMatches, GlobalSystem};
pub use resource::Resources;
pub use scene::{Scene, SceneConfig, SceneDiagnostics};
pub use system::{FnSystem, Matched, System, SystemId};
pub use visual::{NodeId, Renderable, VisualNode, VisualTree};
