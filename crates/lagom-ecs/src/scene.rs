use std::time::{Duration, Instant};

use glam::Vec2;
use lagom_core::{LifecycleState, Observable, Transform};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::camera::Camera;
use crate::component::{
    Component, ComponentContext, ComponentId, ComponentRef, ComponentSet, ComponentType,
};
use crate::entity::{ChildEvent, ComponentEvent, Entity, EntityArena, EntityId, EntityNode};
use crate::error::{EcsError, SceneConfigError};
use crate::global_system::{AnyGlobalSystem, GlobalIndex, GlobalMatches, GlobalSystem};
use crate::index::ReactiveIndex;
use crate::resource::Resources;
use crate::system::{AnySystem, FnSystem, Matched, System, SystemId};
use crate::visual::{NodeId, VisualTree};

/// Scene tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// A single system call slower than this logs a warning.
    pub update_warn_threshold_ms: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            update_warn_threshold_ms: 5.0,
        }
    }
}

impl SceneConfig {
    pub fn validate(&self) -> Result<(), SceneConfigError> {
        let ms = self.update_warn_threshold_ms;
        if !(ms.is_finite() && ms >= 0.0) {
            return Err(SceneConfigError::InvalidWarnThreshold(ms));
        }
        Ok(())
    }

    /// The threshold as a duration. Values that don't fit saturate.
    pub fn update_warn_threshold(&self) -> Duration {
        let ms = self.update_warn_threshold_ms;
        if ms.is_nan() {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
    }
}

/// Counters collected while the scene runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneDiagnostics {
    pub system_calls: u64,
    pub slow_system_calls: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Update,
    Fixed,
}

#[derive(Debug, Clone, Copy)]
enum SceneEvent {
    EntityAdded(EntityId),
    EntityRemoved(EntityId),
    ComponentAdded(ComponentEvent),
    ComponentRemoved(ComponentEvent),
}

struct SystemSlot {
    id: SystemId,
    name: &'static str,
    index: ReactiveIndex,
    /// Taken out while the system runs.
    behavior: Option<Box<dyn AnySystem>>,
    /// Removal requested while running; finished when the run completes.
    retired: bool,
}

struct GlobalSystemSlot {
    id: SystemId,
    name: &'static str,
    index: GlobalIndex,
    behavior: Option<Box<dyn AnyGlobalSystem>>,
    retired: bool,
}

/// The entity tree, system registries and camera for one level or screen.
///
/// Every entity hangs off one of two roots: the world root, which the camera
/// offsets, and the GUI root, which it does not. All entity and component
/// changes propagate to every system index before the call that made them
/// returns.
pub struct Scene {
    entities: EntityArena<EntityNode>,
    world_root: EntityId,
    gui_root: EntityId,
    visuals: VisualTree,
    stage: NodeId,
    systems: Vec<SystemSlot>,
    global_systems: Vec<GlobalSystemSlot>,
    camera: Camera,
    resources: Resources,
    entity_added: Observable<EntityId>,
    entity_removed: Observable<EntityId>,
    config: SceneConfig,
    warn_threshold: Duration,
    diagnostics: SceneDiagnostics,
    game_over_requested: bool,
}

impl Scene {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        let mut visuals = VisualTree::new();
        let stage = visuals.create("stage", Transform::default());
        let world_node = visuals.create("SceneNode", Transform::default());
        let gui_node = visuals.create("GUINode", Transform::from_position_depth(Vec2::ZERO, 1));
        visuals.attach(stage, world_node);
        visuals.attach(stage, gui_node);

        let mut entities = EntityArena::new();
        let world_root = entities.allocate(EntityNode::root("SceneNode", world_node));
        let gui_root = entities.allocate(EntityNode::root("GUINode", gui_node));

        Self {
            entities,
            world_root,
            gui_root,
            visuals,
            stage,
            systems: Vec::new(),
            global_systems: Vec::new(),
            camera: Camera::new(),
            resources: Resources::new(),
            entity_added: Observable::new(),
            entity_removed: Observable::new(),
            warn_threshold: config.update_warn_threshold(),
            config,
            diagnostics: SceneDiagnostics::default(),
            game_over_requested: false,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> SceneDiagnostics {
        self.diagnostics
    }

    // ---- entity tree ----

    pub fn world_root(&self) -> EntityId {
        self.world_root
    }

    pub fn gui_root(&self) -> EntityId {
        self.gui_root
    }

    /// Attach under the world root.
    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        self.attach(self.world_root, entity)
    }

    /// Attach under the GUI root, which the camera never moves.
    pub fn add_gui_entity(&mut self, entity: Entity) -> EntityId {
        self.attach(self.gui_root, entity)
    }

    pub fn remove_entity(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.remove_child(self.world_root, entity)
    }

    pub fn remove_gui_entity(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.remove_child(self.gui_root, entity)
    }

    pub fn add_child(&mut self, parent: EntityId, child: Entity) -> Result<EntityId, EcsError> {
        match self.entities.get(parent) {
            None => Err(EcsError::EntityNotFound(parent)),
            Some(node) if !node.state.is_live() => Err(EcsError::AlreadyRemoving(parent)),
            Some(_) => Ok(self.attach(parent, child)),
        }
    }

    /// Destroy `child` and its subtree.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), EcsError> {
        let node = self
            .entities
            .get(child)
            .ok_or(EcsError::EntityNotFound(child))?;
        if node.parent != Some(parent) {
            return Err(EcsError::NotAChild { parent, child });
        }
        self.destroy(child)
    }

    /// `parent` must be live.
    fn attach(&mut self, parent: EntityId, entity: Entity) -> EntityId {
        let Entity {
            name,
            transform,
            components,
            children,
            on_added,
            on_removed,
        } = entity;

        let visual = self.visuals.create(name.clone(), transform);
        if let Some(parent_visual) = self.entities.get(parent).map(|p| p.visual) {
            self.visuals.attach(parent_visual, visual);
        }

        debug!(name = %name, "adding entity");
        let mut node = EntityNode::new(name, Some(parent), visual, on_removed);
        let mut added = Vec::with_capacity(components.len());
        for (ty, value) in components {
            let id = ComponentId::next();
            node.components.insert(id, ty, value);
            added.push(id);
        }
        let id = self.entities.allocate(node);

        if let Some(parent_node) = self.entities.get_mut(parent) {
            parent_node.children.push(id);
            parent_node
                .child_added
                .trigger(&ChildEvent { parent, child: id });
        }
        self.entity_added.trigger(&id);
        self.publish(SceneEvent::EntityAdded(id));

        for component in added {
            self.run_added_hook(id, component);
        }
        for hook in on_added {
            hook(self, id);
        }
        for child in children {
            if let Err(err) = self.add_child(id, child) {
                warn!(%err, "parent removed before its prefab children were attached");
            }
        }
        id
    }

    /// Destroy an entity: children first, then its own hooks, then its
    /// components. A second call for the same entity is an error.
    pub fn destroy(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let Some(node) = self.entities.get(entity) else {
            warn!(%entity, "destroy called for an entity that is not in the scene");
            return Err(EcsError::EntityNotFound(entity));
        };
        if node.root {
            return Err(EcsError::RootEntity(entity));
        }
        if node.state == LifecycleState::Removing {
            warn!(%entity, name = %node.name, "entity destroyed twice");
            return Err(EcsError::AlreadyRemoving(entity));
        }
        self.destroy_subtree(entity);
        Ok(())
    }

    fn destroy_subtree(&mut self, entity: EntityId) {
        let children = match self.entities.get_mut(entity) {
            Some(node) if node.state.is_live() => {
                node.state = LifecycleState::Removing;
                node.children.clone()
            }
            _ => return,
        };
        for child in children {
            self.destroy_subtree(child);
        }

        let hooks = self
            .entities
            .get_mut(entity)
            .map(|node| std::mem::take(&mut node.on_removed))
            .unwrap_or_default();
        for hook in hooks {
            hook(self, entity);
        }

        let Some(node) = self.entities.get(entity) else {
            return;
        };
        debug!(name = %node.name, "removing entity");
        if let Some(parent) = node.parent {
            if let Some(parent_node) = self.entities.get_mut(parent) {
                parent_node.children.retain(|c| *c != entity);
                parent_node
                    .child_removed
                    .trigger(&ChildEvent { parent, child: entity });
            }
        }
        self.entity_removed.trigger(&entity);
        self.publish(SceneEvent::EntityRemoved(entity));

        let components = self
            .entities
            .get(entity)
            .map(|node| node.components.ids())
            .unwrap_or_default();
        for component in components {
            if let Err(err) = self.remove_component(entity, component) {
                trace!(%err, "component already gone during teardown");
            }
        }

        if let Some(mut node) = self.entities.deallocate(entity) {
            node.release_observers();
            self.visuals.remove(node.visual);
        }
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|node| node.state.is_live())
    }

    pub fn name(&self, entity: EntityId) -> Option<&str> {
        self.entities.get(entity).map(|node| node.name.as_str())
    }

    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.entities.get(entity).and_then(|node| node.parent)
    }

    pub fn children(&self, entity: EntityId) -> &[EntityId] {
        self.entities
            .get(entity)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Number of live entities, roots excluded.
    pub fn entity_count(&self) -> usize {
        self.entities
            .iter()
            .filter(|(_, node)| node.is_registered())
            .count()
    }

    /// Ids of every live entity, roots excluded.
    pub fn entities(&self) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, node)| node.is_registered())
            .map(|(id, _)| id)
            .collect()
    }

    /// Depth-first search below `entity`: direct children first, then each
    /// child's subtree in turn.
    pub fn find_child_with_name(&self, entity: EntityId, name: &str) -> Option<EntityId> {
        let children = self.children(entity);
        if let Some(found) = children
            .iter()
            .copied()
            .find(|child| self.name(*child) == Some(name))
        {
            return Some(found);
        }
        children
            .iter()
            .find_map(|child| self.find_child_with_name(*child, name))
    }

    /// First entity called `name`, searching the world root before the GUI root.
    pub fn get_entity_with_name(&self, name: &str) -> Option<EntityId> {
        self.find_child_with_name(self.world_root, name)
            .or_else(|| self.find_child_with_name(self.gui_root, name))
    }

    // ---- components ----

    pub fn add_component<T: Component>(
        &mut self,
        entity: EntityId,
        component: T,
    ) -> Result<ComponentId, EcsError> {
        self.add_boxed(entity, ComponentType::of::<T>(), Box::new(component))
    }

    fn add_boxed(
        &mut self,
        entity: EntityId,
        ty: ComponentType,
        value: Box<dyn Component>,
    ) -> Result<ComponentId, EcsError> {
        let node = self
            .entities
            .get_mut(entity)
            .ok_or(EcsError::EntityNotFound(entity))?;
        if node.root {
            return Err(EcsError::RootEntity(entity));
        }

        let id = ComponentId::next();
        node.components.insert(id, ty, value);
        trace!(%entity, component = ty.name(), "component added");
        let event = ComponentEvent {
            entity,
            component: id,
            ty,
        };
        node.component_added.trigger(&event);
        self.publish(SceneEvent::ComponentAdded(event));
        self.run_added_hook(entity, id);
        Ok(id)
    }

    /// Detach a component and hand it back.
    pub fn remove_component(
        &mut self,
        entity: EntityId,
        component: ComponentId,
    ) -> Result<Box<dyn Component>, EcsError> {
        let Some(node) = self.entities.get_mut(entity) else {
            warn!(%entity, "removing component from an entity that is not in the scene");
            return Err(EcsError::EntityNotFound(entity));
        };
        let Some(mut entry) = node.components.remove(component) else {
            warn!(%entity, %component, "removing component the entity does not own");
            return Err(EcsError::ComponentNotOwned { entity, component });
        };

        trace!(%entity, component = entry.ty.name(), "component removed");
        let event = ComponentEvent {
            entity,
            component,
            ty: entry.ty,
        };
        node.component_removed.trigger(&event);
        let visual = node.visual;
        self.publish(SceneEvent::ComponentRemoved(event));

        let mut ctx = ComponentContext {
            entity,
            node: visual,
            visuals: &mut self.visuals,
        };
        entry.value.on_removed(&mut ctx);
        Ok(entry.value)
    }

    /// Remove the first component of type `T`. Returns whether one existed.
    pub fn remove_component_of<T: Component>(&mut self, entity: EntityId) -> Result<bool, EcsError> {
        match self.get_component_id::<T>(entity) {
            Some(id) => self.remove_component(entity, id).map(|_| true),
            None if self.entities.get(entity).is_some() => Ok(false),
            None => Err(EcsError::EntityNotFound(entity)),
        }
    }

    fn run_added_hook(&mut self, entity: EntityId, component: ComponentId) {
        let Scene {
            entities, visuals, ..
        } = self;
        let Some(node) = entities.get_mut(entity) else {
            return;
        };
        let visual = node.visual;
        if let Some(value) = node.components.get_mut(component) {
            let mut ctx = ComponentContext {
                entity,
                node: visual,
                visuals,
            };
            value.on_added(&mut ctx);
        }
    }

    /// First component of type `T` on the entity.
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let node = self.entities.get(entity)?;
        let id = node.components.first_of(ComponentType::of::<T>())?;
        node.components.get(id)?.downcast_ref::<T>()
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let node = self.entities.get_mut(entity)?;
        let id = node.components.first_of(ComponentType::of::<T>())?;
        node.components.get_mut(id)?.downcast_mut::<T>()
    }

    pub fn get_component_id<T: Component>(&self, entity: EntityId) -> Option<ComponentId> {
        self.entities
            .get(entity)?
            .components
            .first_of(ComponentType::of::<T>())
    }

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.get_component_id::<T>(entity).is_some()
    }

    /// First `T` on the entity, created with `creator` if there is none.
    ///
    /// A created component reaches every index before this returns, but a
    /// system pass already in progress keeps the entity list it started with.
    pub fn get_or_add_component<T: Component>(
        &mut self,
        entity: EntityId,
        creator: impl FnOnce() -> T,
    ) -> Result<&mut T, EcsError> {
        let id = match self.get_component_id::<T>(entity) {
            Some(id) => id,
            None => self.add_component(entity, creator())?,
        };
        self.entities
            .get_mut(entity)
            .and_then(|node| node.components.get_mut(id))
            .and_then(|c| c.downcast_mut::<T>())
            .ok_or(EcsError::ComponentNotOwned {
                entity,
                component: id,
            })
    }

    /// Every `T` on the entity, and on its whole subtree when `recurse` is set.
    pub fn get_components_of_type<T: Component>(&self, entity: EntityId, recurse: bool) -> Vec<&T> {
        let mut found = Vec::new();
        self.collect_components(entity, recurse, &mut found);
        found
    }

    fn collect_components<'a, T: Component>(
        &'a self,
        entity: EntityId,
        recurse: bool,
        found: &mut Vec<&'a T>,
    ) {
        let Some(node) = self.entities.get(entity) else {
            return;
        };
        found.extend(
            node.components
                .ids_of(ComponentType::of::<T>())
                .filter_map(|id| node.components.get(id)?.downcast_ref::<T>()),
        );
        if recurse {
            for child in &node.children {
                self.collect_components(*child, true, found);
            }
        }
    }

    /// First component of each type, in order. `None` unless every type matches.
    pub fn find_components(
        &self,
        entity: EntityId,
        types: &[ComponentType],
    ) -> Option<Vec<ComponentId>> {
        self.entities.get(entity)?.components.find(types)
    }

    pub fn component<T: Component>(&self, component: ComponentRef) -> Option<&T> {
        self.entities
            .get(component.entity)?
            .components
            .get(component.component)?
            .downcast_ref::<T>()
    }

    pub fn component_mut<T: Component>(&mut self, component: ComponentRef) -> Option<&mut T> {
        self.entities
            .get_mut(component.entity)?
            .components
            .get_mut(component.component)?
            .downcast_mut::<T>()
    }

    pub(crate) fn fetch<S: ComponentSet>(
        &self,
        entity: EntityId,
        ids: &[ComponentId],
    ) -> Option<S::Refs<'_>> {
        S::fetch(&self.entities.get(entity)?.components, ids)
    }

    pub(crate) fn fetch_mut<S: ComponentSet>(
        &mut self,
        entity: EntityId,
        ids: &[ComponentId],
    ) -> Option<S::RefsMut<'_>> {
        S::fetch_mut(&mut self.entities.get_mut(entity)?.components, ids)
    }

    // ---- notifications ----

    pub fn entity_added_event(&mut self) -> &mut Observable<EntityId> {
        &mut self.entity_added
    }

    pub fn entity_removed_event(&mut self) -> &mut Observable<EntityId> {
        &mut self.entity_removed
    }

    pub fn component_added_event(
        &mut self,
        entity: EntityId,
    ) -> Option<&mut Observable<ComponentEvent>> {
        self.entities
            .get_mut(entity)
            .map(|node| &mut node.component_added)
    }

    pub fn component_removed_event(
        &mut self,
        entity: EntityId,
    ) -> Option<&mut Observable<ComponentEvent>> {
        self.entities
            .get_mut(entity)
            .map(|node| &mut node.component_removed)
    }

    pub fn child_added_event(&mut self, entity: EntityId) -> Option<&mut Observable<ChildEvent>> {
        self.entities.get_mut(entity).map(|node| &mut node.child_added)
    }

    pub fn child_removed_event(&mut self, entity: EntityId) -> Option<&mut Observable<ChildEvent>> {
        self.entities
            .get_mut(entity)
            .map(|node| &mut node.child_removed)
    }

    fn publish(&mut self, event: SceneEvent) {
        let Scene {
            entities,
            systems,
            global_systems,
            ..
        } = self;
        let systems = systems.iter_mut().filter(|s| !s.retired);
        let global_systems = global_systems.iter_mut().filter(|s| !s.retired);

        match event {
            SceneEvent::EntityAdded(entity) => {
                let Some(node) = entities.get(entity) else {
                    return;
                };
                for slot in systems {
                    slot.index.on_entity_added(entity, &node.components);
                }
                for slot in global_systems {
                    for (component, ty) in node.components.iter() {
                        slot.index
                            .on_component_added(ComponentRef { entity, component }, ty);
                    }
                }
            }
            SceneEvent::EntityRemoved(entity) => {
                for slot in systems {
                    slot.index.on_entity_removed(entity);
                }
            }
            SceneEvent::ComponentAdded(event) => {
                let Some(node) = entities.get(event.entity) else {
                    return;
                };
                if node.state.is_live() {
                    for slot in systems {
                        slot.index
                            .on_component_added(event.entity, event.ty, &node.components);
                    }
                }
                for slot in global_systems {
                    slot.index.on_component_added(
                        ComponentRef {
                            entity: event.entity,
                            component: event.component,
                        },
                        event.ty,
                    );
                }
            }
            SceneEvent::ComponentRemoved(event) => {
                if let Some(node) = entities.get(event.entity) {
                    for slot in systems {
                        slot.index
                            .on_component_removed(event.entity, event.ty, &node.components);
                    }
                }
                for slot in global_systems {
                    slot.index.on_component_removed(
                        ComponentRef {
                            entity: event.entity,
                            component: event.component,
                        },
                        event.ty,
                    );
                }
            }
        }
    }

    // ---- transforms ----

    pub fn visual_node(&self, entity: EntityId) -> Option<NodeId> {
        self.entities.get(entity).map(|node| node.visual)
    }

    pub fn transform(&self, entity: EntityId) -> Option<&Transform> {
        let visual = self.entities.get(entity)?.visual;
        self.visuals.get(visual).map(|node| &node.transform)
    }

    pub fn transform_mut(&mut self, entity: EntityId) -> Option<&mut Transform> {
        let visual = self.entities.get(entity)?.visual;
        self.visuals.get_mut(visual).map(|node| &mut node.transform)
    }

    pub fn set_position(&mut self, entity: EntityId, position: Vec2) {
        if let Some(transform) = self.transform_mut(entity) {
            transform.position = position;
        }
    }

    pub fn set_depth(&mut self, entity: EntityId, depth: i32) {
        if let Some(transform) = self.transform_mut(entity) {
            transform.depth = depth;
        }
    }

    /// Position in stage space, camera included for world entities.
    pub fn global_position(&self, entity: EntityId) -> Option<Vec2> {
        self.visuals.global_position(self.entities.get(entity)?.visual)
    }

    pub fn visuals(&self) -> &VisualTree {
        &self.visuals
    }

    pub fn visuals_mut(&mut self) -> &mut VisualTree {
        &mut self.visuals
    }

    /// Root of the visual tree the renderer draws.
    pub fn stage(&self) -> NodeId {
        self.stage
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    fn apply_camera(&mut self) {
        let view = self.camera.view_transform();
        let Some(world_node) = self.entities.get(self.world_root).map(|n| n.visual) else {
            return;
        };
        if let Some(node) = self.visuals.get_mut(world_node) {
            node.transform = view;
        }
    }

    // ---- systems ----

    /// Register a system, index every live entity for it, then run its
    /// `on_added`.
    pub fn add_system<S: System>(&mut self, system: S) -> SystemId {
        let id = SystemId::next();
        let name = System::name(&system);
        let mut index = ReactiveIndex::new(S::Components::types());
        for (entity, node) in self.entities.iter() {
            if node.is_registered() {
                index.on_entity_added(entity, &node.components);
            }
        }
        debug!(system = name, entities = index.len(), "system added");
        self.systems.push(SystemSlot {
            id,
            name,
            index,
            behavior: Some(Box::new(system)),
            retired: false,
        });

        if let Some(mut behavior) = self.take_system(id) {
            behavior.attached(self);
            self.restore_system(id, behavior);
        }
        id
    }

    /// Register a closure as a system over `S`.
    pub fn add_fn_system<S, F>(&mut self, run: F) -> SystemId
    where
        S: ComponentSet,
        F: FnMut(&mut Scene, f32, EntityId, Matched<'_, S>) + 'static,
    {
        self.add_system(FnSystem::<S, F>::new(run))
    }

    pub fn add_global_system<G: GlobalSystem>(&mut self, system: G) -> SystemId {
        let id = SystemId::next();
        let name = GlobalSystem::name(&system);
        let mut index = GlobalIndex::new(G::Components::types(), name);
        for (entity, node) in self.entities.iter() {
            if node.is_registered() {
                for (component, ty) in node.components.iter() {
                    index.on_component_added(ComponentRef { entity, component }, ty);
                }
            }
        }
        debug!(system = name, components = index.matches().len(), "global system added");
        self.global_systems.push(GlobalSystemSlot {
            id,
            name,
            index,
            behavior: Some(Box::new(system)),
            retired: false,
        });

        if let Some(mut behavior) = self.take_global_system(id) {
            behavior.attached(self);
            self.restore_global_system(id, behavior);
        }
        id
    }

    /// Unregister a system, clear its index and run its `on_removed`.
    /// A system removing itself mid-run is detached once its run finishes.
    pub fn remove_system(&mut self, id: SystemId) -> bool {
        let Some(pos) = self.systems.iter().position(|s| s.id == id && !s.retired) else {
            return false;
        };
        debug!(system = self.systems[pos].name, "system removed");
        if self.systems[pos].behavior.is_none() {
            let slot = &mut self.systems[pos];
            slot.retired = true;
            slot.index.clear();
            return true;
        }
        let mut slot = self.systems.remove(pos);
        if let Some(mut behavior) = slot.behavior.take() {
            behavior.detached(self);
        }
        true
    }

    pub fn remove_global_system(&mut self, id: SystemId) -> bool {
        let Some(pos) = self
            .global_systems
            .iter()
            .position(|s| s.id == id && !s.retired)
        else {
            return false;
        };
        debug!(system = self.global_systems[pos].name, "global system removed");
        if self.global_systems[pos].behavior.is_none() {
            let slot = &mut self.global_systems[pos];
            slot.retired = true;
            slot.index.clear();
            return true;
        }
        let mut slot = self.global_systems.remove(pos);
        if let Some(mut behavior) = slot.behavior.take() {
            behavior.detached(self);
        }
        true
    }

    /// First registered system of type `S`. `None` while it is running.
    pub fn get_system<S: System>(&self) -> Option<&S> {
        self.systems
            .iter()
            .filter(|slot| !slot.retired)
            .find_map(|slot| slot.behavior.as_deref()?.as_any().downcast_ref::<S>())
    }

    pub fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems
            .iter_mut()
            .filter(|slot| !slot.retired)
            .find_map(|slot| {
                slot.behavior
                    .as_deref_mut()?
                    .as_any_mut()
                    .downcast_mut::<S>()
            })
    }

    pub fn get_global_system<G: GlobalSystem>(&self) -> Option<&G> {
        self.global_systems
            .iter()
            .filter(|slot| !slot.retired)
            .find_map(|slot| slot.behavior.as_deref()?.as_any().downcast_ref::<G>())
    }

    pub fn get_global_system_mut<G: GlobalSystem>(&mut self) -> Option<&mut G> {
        self.global_systems
            .iter_mut()
            .filter(|slot| !slot.retired)
            .find_map(|slot| {
                slot.behavior
                    .as_deref_mut()?
                    .as_any_mut()
                    .downcast_mut::<G>()
            })
    }

    /// Entities currently indexed by a system.
    pub fn system_entities(&self, id: SystemId) -> &[EntityId] {
        self.systems
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| slot.index.entities())
            .unwrap_or(&[])
    }

    /// Matched component ids a system holds for an entity.
    pub fn system_components(&self, id: SystemId, entity: EntityId) -> Option<&[ComponentId]> {
        self.systems
            .iter()
            .find(|slot| slot.id == id)?
            .index
            .get(entity)
    }

    /// Current component lists of a global system.
    pub fn global_system_matches(&self, id: SystemId) -> Option<&GlobalMatches> {
        self.global_systems
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| slot.index.matches())
    }

    pub fn system_count(&self) -> usize {
        self.systems.iter().filter(|s| !s.retired).count()
    }

    pub fn global_system_count(&self) -> usize {
        self.global_systems.iter().filter(|s| !s.retired).count()
    }

    fn take_system(&mut self, id: SystemId) -> Option<Box<dyn AnySystem>> {
        self.systems
            .iter_mut()
            .find(|slot| slot.id == id && !slot.retired)?
            .behavior
            .take()
    }

    fn restore_system(&mut self, id: SystemId, mut behavior: Box<dyn AnySystem>) {
        let Some(pos) = self.systems.iter().position(|slot| slot.id == id) else {
            return;
        };
        if self.systems[pos].retired {
            self.systems.remove(pos);
            behavior.detached(self);
        } else {
            self.systems[pos].behavior = Some(behavior);
        }
    }

    fn take_global_system(&mut self, id: SystemId) -> Option<Box<dyn AnyGlobalSystem>> {
        self.global_systems
            .iter_mut()
            .find(|slot| slot.id == id && !slot.retired)?
            .behavior
            .take()
    }

    fn restore_global_system(&mut self, id: SystemId, mut behavior: Box<dyn AnyGlobalSystem>) {
        let Some(pos) = self.global_systems.iter().position(|slot| slot.id == id) else {
            return;
        };
        if self.global_systems[pos].retired {
            self.global_systems.remove(pos);
            behavior.detached(self);
        } else {
            self.global_systems[pos].behavior = Some(behavior);
        }
    }

    // ---- update passes ----

    /// Variable-rate pass: every global system, then every system, each in
    /// registration order.
    pub fn update(&mut self, delta: f32) {
        self.apply_camera();
        self.run_pass(delta, Pass::Update);
    }

    /// Fixed-rate pass, same ordering as [`Scene::update`].
    pub fn fixed_update(&mut self, delta: f32) {
        self.run_pass(delta, Pass::Fixed);
    }

    fn run_pass(&mut self, delta: f32, pass: Pass) {
        let globals: Vec<SystemId> = self
            .global_systems
            .iter()
            .filter(|s| !s.retired)
            .map(|s| s.id)
            .collect();
        for id in globals {
            self.run_global_system(id, delta, pass);
        }

        let systems: Vec<SystemId> = self
            .systems
            .iter()
            .filter(|s| !s.retired)
            .map(|s| s.id)
            .collect();
        for id in systems {
            self.run_system(id, delta, pass);
        }
    }

    fn run_global_system(&mut self, id: SystemId, delta: f32, pass: Pass) {
        let Some(slot) = self
            .global_systems
            .iter_mut()
            .find(|slot| slot.id == id && !slot.retired)
        else {
            return;
        };
        let Some(mut behavior) = slot.behavior.take() else {
            return;
        };
        let matches = slot.index.snapshot();
        let name = slot.name;

        let started = Instant::now();
        behavior.run(self, delta, &matches, pass == Pass::Fixed);
        self.record_call(name, pass, started.elapsed());
        self.restore_global_system(id, behavior);
    }

    fn run_system(&mut self, id: SystemId, delta: f32, pass: Pass) {
        let Some(slot) = self
            .systems
            .iter_mut()
            .find(|slot| slot.id == id && !slot.retired)
        else {
            return;
        };
        let Some(mut behavior) = slot.behavior.take() else {
            return;
        };
        let entities = slot.index.entities().to_vec();
        let name = slot.name;

        let started = Instant::now();
        if pass == Pass::Update {
            behavior.begin_pass(self, delta);
        }
        for entity in entities {
            // Entities evicted earlier in this pass are skipped; refreshed
            // tuples are picked up.
            let Some(ids) = self
                .systems
                .iter()
                .find(|slot| slot.id == id)
                .and_then(|slot| slot.index.get(entity))
                .map(<[ComponentId]>::to_vec)
            else {
                continue;
            };
            behavior.run_entity(self, delta, entity, &ids, pass == Pass::Fixed);
        }
        self.record_call(name, pass, started.elapsed());
        self.restore_system(id, behavior);
    }

    fn record_call(&mut self, name: &'static str, pass: Pass, elapsed: Duration) {
        self.diagnostics.system_calls += 1;
        if elapsed > self.warn_threshold {
            self.diagnostics.slow_system_calls += 1;
            warn!(
                system = name,
                pass = ?pass,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "system update exceeded warning threshold"
            );
        }
    }

    // ---- resources and control ----

    pub fn insert_resource<T: 'static>(&mut self, value: T) {
        self.resources.insert(value);
    }

    pub fn resource<T: 'static>(&self) -> Option<&T> {
        self.resources.get::<T>()
    }

    pub fn resource_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.resources.get_mut::<T>()
    }

    pub fn remove_resource<T: 'static>(&mut self) -> Option<T> {
        self.resources.remove::<T>()
    }

    /// Ask the owning game to end after the current frame.
    pub fn request_game_over(&mut self) {
        self.game_over_requested = true;
    }

    pub fn game_over_requested(&self) -> bool {
        self.game_over_requested
    }

    pub fn take_game_over_request(&mut self) -> bool {
        std::mem::take(&mut self.game_over_requested)
    }

    /// Remove every system and destroy every entity. The scene is empty but
    /// usable afterwards.
    pub fn teardown(&mut self) {
        let globals: Vec<SystemId> = self.global_systems.iter().map(|s| s.id).collect();
        for id in globals {
            self.remove_global_system(id);
        }
        let systems: Vec<SystemId> = self.systems.iter().map(|s| s.id).collect();
        for id in systems {
            self.remove_system(id);
        }
        for root in [self.world_root, self.gui_root] {
            let children = self.children(root).to_vec();
            for child in children {
                if let Err(err) = self.destroy(child) {
                    trace!(%err, "entity already gone during teardown");
                }
            }
            if let Some(node) = self.entities.get_mut(root) {
                node.release_observers();
            }
        }
        self.entity_added.release_all();
        self.entity_removed.release_all();
        self.resources.clear();
        debug!("scene torn down");
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    struct A(u32);
    impl Component for A {}

    #[derive(Debug, Clone, PartialEq)]
    struct B(u32);
    impl Component for B {}

    #[derive(Debug, Clone, PartialEq)]
    struct C(u32);
    impl Component for C {}

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every (entity, a, b) it is run with.
    struct RecordAB {
        seen: Rc<RefCell<Vec<(EntityId, u32, u32)>>>,
    }

    impl System for RecordAB {
        type Components = (A, B);

        fn run_on_entities(
            &mut self,
            scene: &mut Scene,
            _delta: f32,
            entity: EntityId,
            matched: Matched<'_, (A, B)>,
        ) {
            if let Some((a, b)) = matched.get(scene) {
                self.seen.borrow_mut().push((entity, a.0, b.0));
            }
        }
    }

    struct Named {
        label: &'static str,
        log: Log,
    }

    impl System for Named {
        type Components = ();

        fn before_update(&mut self, _scene: &mut Scene, _delta: f32) {
            self.log.borrow_mut().push(self.label.to_string());
        }

        fn run_on_entities(&mut self, _: &mut Scene, _: f32, _: EntityId, _: Matched<'_, ()>) {}
    }

    struct NamedGlobal {
        label: &'static str,
        log: Log,
    }

    impl GlobalSystem for NamedGlobal {
        type Components = ();

        fn update(&mut self, _scene: &mut Scene, _delta: f32, _components: &GlobalMatches) {
            self.log.borrow_mut().push(self.label.to_string());
        }

        fn fixed_update(&mut self, _scene: &mut Scene, _delta: f32, _components: &GlobalMatches) {
            self.log.borrow_mut().push(format!("{}-fixed", self.label));
        }
    }

    struct CollectAB;

    impl GlobalSystem for CollectAB {
        type Components = (A, B);

        fn update(&mut self, _: &mut Scene, _: f32, _: &GlobalMatches) {}
    }

    #[test]
    fn backfill_indexes_existing_entities_in_declared_order() {
        let mut scene = Scene::new();
        let e = scene.add_entity(Entity::new("e").with(B(2)).with(A(1)));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let id = scene.add_system(RecordAB { seen: seen.clone() });

        let a = scene.get_component_id::<A>(e).unwrap();
        let b = scene.get_component_id::<B>(e).unwrap();
        assert_eq!(scene.system_components(id, e), Some(&[a, b][..]));

        scene.update(0.016);
        assert_eq!(*seen.borrow(), vec![(e, 1, 2)]);
    }

    #[test]
    fn system_registered_first_sees_new_entities() {
        let mut scene = Scene::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let id = scene.add_system(RecordAB { seen: seen.clone() });
        let e = scene.add_entity(Entity::new("e").with(A(1)).with(B(2)));
        let partial = scene.add_entity(Entity::new("partial").with(A(3)));

        assert_eq!(scene.system_entities(id), &[e]);
        scene.add_component(partial, B(4)).unwrap();
        assert_eq!(scene.system_entities(id).len(), 2);
    }

    #[test]
    fn component_removal_evicts_immediately() {
        let mut scene = Scene::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let system = scene.add_system(RecordAB { seen: seen.clone() });
        let global = scene.add_global_system(CollectAB);
        let e = scene.add_entity(Entity::new("e").with(A(1)).with(B(2)));
        assert_eq!(scene.global_system_matches(global).map(GlobalMatches::len), Some(2));

        let b = scene.get_component_id::<B>(e).unwrap();
        let removed = scene.remove_component(e, b).unwrap();
        assert_eq!(removed.downcast_ref::<B>(), Some(&B(2)));

        assert!(scene.system_entities(system).is_empty());
        let matches = scene.global_system_matches(global).unwrap();
        assert!(matches.of::<B>().is_empty());
        assert_eq!(matches.of::<A>().len(), 1);

        scene.update(0.016);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn removing_unowned_component_is_an_error() {
        let mut scene = Scene::new();
        let owner = scene.add_entity(Entity::new("owner").with(A(1)));
        let other = scene.add_entity(Entity::new("other"));
        let a = scene.get_component_id::<A>(owner).unwrap();

        assert_eq!(
            scene.remove_component(other, a).err(),
            Some(EcsError::ComponentNotOwned {
                entity: other,
                component: a
            })
        );
        assert_eq!(scene.get_component::<A>(owner), Some(&A(1)));
    }

    #[test]
    fn destroy_evicts_entity_and_its_components() {
        let mut scene = Scene::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let system = scene.add_system(RecordAB { seen: seen.clone() });
        let global = scene.add_global_system(CollectAB);
        let keep = scene.add_entity(Entity::new("keep").with(A(1)).with(B(1)));
        let gone = scene.add_entity(Entity::new("gone").with(A(2)).with(B(2)));

        scene.destroy(gone).unwrap();
        assert!(!scene.is_alive(gone));
        assert_eq!(scene.system_entities(system), &[keep]);
        assert_eq!(scene.global_system_matches(global).map(GlobalMatches::len), Some(2));

        scene.update(0.016);
        assert_eq!(*seen.borrow(), vec![(keep, 1, 1)]);
    }

    #[test]
    fn destroy_guards_against_misuse() {
        let mut scene = Scene::new();
        let e = scene.add_entity(Entity::new("e"));
        scene.destroy(e).unwrap();
        assert_eq!(scene.destroy(e), Err(EcsError::EntityNotFound(e)));
        let root = scene.world_root();
        assert_eq!(scene.destroy(root), Err(EcsError::RootEntity(root)));
        assert_eq!(
            scene.add_component(root, A(1)),
            Err(EcsError::RootEntity(root))
        );
    }

    #[test]
    fn destroy_twice_from_removal_hook_is_rejected() {
        let mut scene = Scene::new();
        let result = Rc::new(RefCell::new(None));
        let r = result.clone();
        let e = scene.add_entity(Entity::new("e").on_removed(move |scene, id| {
            *r.borrow_mut() = Some(scene.destroy(id));
        }));
        scene.destroy(e).unwrap();
        assert_eq!(*result.borrow(), Some(Err(EcsError::AlreadyRemoving(e))));
    }

    #[test]
    fn subtree_is_destroyed_children_first() {
        let mut scene = Scene::new();
        let log: Log = Rc::default();
        let hook = |label: &'static str, log: &Log| {
            let log = log.clone();
            move |_: &mut Scene, _: EntityId| log.borrow_mut().push(label.to_string())
        };
        let parent = scene.add_entity(
            Entity::new("parent")
                .on_removed(hook("parent", &log))
                .with_child(
                    Entity::new("child")
                        .on_removed(hook("child", &log))
                        .with_child(Entity::new("grandchild").on_removed(hook("grandchild", &log))),
                ),
        );
        assert_eq!(scene.entity_count(), 3);

        scene.remove_entity(parent).unwrap();
        assert_eq!(*log.borrow(), vec!["grandchild", "child", "parent"]);
        assert_eq!(scene.entity_count(), 0);
        assert!(scene.children(scene.world_root()).is_empty());
    }

    #[test]
    fn remove_entity_rejects_wrong_parent() {
        let mut scene = Scene::new();
        let gui = scene.add_gui_entity(Entity::new("hud"));
        assert_eq!(
            scene.remove_entity(gui),
            Err(EcsError::NotAChild {
                parent: scene.world_root(),
                child: gui
            })
        );
        scene.remove_gui_entity(gui).unwrap();
    }

    #[test]
    fn global_systems_run_before_systems_in_registration_order() {
        let mut scene = Scene::new();
        let log: Log = Rc::default();
        scene.add_system(Named { label: "s1", log: log.clone() });
        scene.add_global_system(NamedGlobal { label: "g1", log: log.clone() });
        scene.add_system(Named { label: "s2", log: log.clone() });
        scene.add_global_system(NamedGlobal { label: "g2", log: log.clone() });

        scene.update(0.016);
        assert_eq!(*log.borrow(), vec!["g1", "g2", "s1", "s2"]);

        log.borrow_mut().clear();
        scene.fixed_update(1.0 / 60.0);
        assert_eq!(*log.borrow(), vec!["g1-fixed", "g2-fixed"]);
    }

    #[test]
    fn global_index_covers_nested_and_gui_entities() {
        let mut scene = Scene::new();
        scene.add_entity(Entity::new("parent").with(A(1)).with_child(Entity::new("child").with(A(2))));
        scene.add_gui_entity(Entity::new("hud").with(B(3)));
        let global = scene.add_global_system(CollectAB);

        let matches = scene.global_system_matches(global).unwrap();
        assert_eq!(matches.of::<A>().len(), 2);
        assert_eq!(matches.of::<B>().len(), 1);
        let hud_b = matches.of::<B>()[0];
        assert_eq!(scene.component::<B>(hud_b), Some(&B(3)));
    }

    #[test]
    fn entities_destroyed_mid_pass_are_skipped() {
        struct Destroyer {
            victim: EntityId,
            visited: Rc<RefCell<Vec<EntityId>>>,
        }

        impl System for Destroyer {
            type Components = (A,);

            fn run_on_entities(
                &mut self,
                scene: &mut Scene,
                _: f32,
                entity: EntityId,
                _: Matched<'_, (A,)>,
            ) {
                self.visited.borrow_mut().push(entity);
                if entity != self.victim && scene.is_alive(self.victim) {
                    scene.destroy(self.victim).unwrap();
                }
            }
        }

        let mut scene = Scene::new();
        let first = scene.add_entity(Entity::new("first").with(A(0)));
        let second = scene.add_entity(Entity::new("second").with(A(1)));
        let visited = Rc::new(RefCell::new(Vec::new()));
        scene.add_system(Destroyer {
            victim: second,
            visited: visited.clone(),
        });

        scene.update(0.016);
        assert_eq!(*visited.borrow(), vec![first]);
        assert!(!scene.is_alive(second));
    }

    #[test]
    fn entities_added_mid_pass_run_next_tick() {
        let mut scene = Scene::new();
        scene.add_entity(Entity::new("spawner").with(A(0)));
        let visits = Rc::new(RefCell::new(0));
        let v = visits.clone();
        scene.add_fn_system::<(A,), _>(move |scene, _, _, matched| {
            *v.borrow_mut() += 1;
            let spawned = matched.get(scene).map(|(a,)| a.0 == 0).unwrap_or(false);
            if spawned && scene.entity_count() == 1 {
                scene.add_entity(Entity::new("spawned").with(A(1)));
            }
        });

        scene.update(0.016);
        assert_eq!(*visits.borrow(), 1);
        scene.update(0.016);
        assert_eq!(*visits.borrow(), 3);
    }

    #[test]
    fn get_or_add_component_is_visible_to_later_systems_this_tick() {
        let mut scene = Scene::new();
        let e = scene.add_entity(Entity::new("e").with(A(1)));
        scene.add_fn_system::<(A,), _>(|scene, _, entity, _| {
            scene.get_or_add_component(entity, || B(9)).unwrap().0 += 1;
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        scene.add_system(RecordAB { seen: seen.clone() });

        scene.update(0.016);
        assert_eq!(*seen.borrow(), vec![(e, 1, 10)]);
        assert_eq!(scene.get_components_of_type::<B>(e, false).len(), 1);
    }

    #[test]
    fn components_of_type_recurse_into_children() {
        let mut scene = Scene::new();
        let root = scene.add_entity(
            Entity::new("root")
                .with(A(1))
                .with(A(2))
                .with_child(Entity::new("child").with(A(3)).with_child(Entity::new("leaf").with(A(4)))),
        );
        let own: Vec<u32> = scene.get_components_of_type::<A>(root, false).iter().map(|a| a.0).collect();
        assert_eq!(own, vec![1, 2]);
        let mut all: Vec<u32> = scene.get_components_of_type::<A>(root, true).iter().map(|a| a.0).collect();
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4]);
        assert_eq!(scene.get_component::<A>(root), Some(&A(1)));
    }

    #[test]
    fn name_lookup_prefers_world_then_direct_children() {
        let mut scene = Scene::new();
        let gui = scene.add_gui_entity(Entity::new("target"));
        assert_eq!(scene.get_entity_with_name("target"), Some(gui));

        let outer = scene.add_entity(
            Entity::new("outer").with_child(Entity::new("inner").with_child(Entity::new("target"))),
        );
        let direct = scene.add_child(outer, Entity::new("target")).unwrap();
        assert_eq!(scene.find_child_with_name(outer, "target"), Some(direct));

        let world_target = scene.get_entity_with_name("target").unwrap();
        assert_ne!(world_target, gui);
        assert_eq!(scene.get_entity_with_name("missing"), None);
    }

    #[test]
    fn notifications_fire_for_children_and_components() {
        let mut scene = Scene::new();
        let log: Log = Rc::default();
        let l = log.clone();
        scene.entity_added_event().register(move |_| l.borrow_mut().push("entity+".into()));
        let l = log.clone();
        scene.entity_removed_event().register(move |_| l.borrow_mut().push("entity-".into()));

        let parent = scene.add_entity(Entity::new("parent"));
        let l = log.clone();
        scene
            .child_added_event(parent)
            .unwrap()
            .register(move |_| l.borrow_mut().push("child+".into()));
        let l = log.clone();
        scene
            .component_added_event(parent)
            .unwrap()
            .register(move |ev| l.borrow_mut().push(format!("component+ {}", ev.ty.name().rsplit("::").next().unwrap_or(""))));

        scene.add_child(parent, Entity::new("child")).unwrap();
        scene.add_component(parent, C(0)).unwrap();
        scene.destroy(parent).unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["entity+", "child+", "entity+", "component+ C", "entity-", "entity-"]
        );
    }

    #[test]
    fn empty_requirement_system_sees_every_entity() {
        let mut scene = Scene::new();
        let log: Log = Rc::default();
        let id = scene.add_system(Named { label: "all", log });
        scene.add_entity(Entity::new("a"));
        scene.add_gui_entity(Entity::new("b").with_child(Entity::new("c")));
        assert_eq!(scene.system_entities(id).len(), 3);
    }

    #[test]
    fn remove_system_stops_updates_and_runs_hook() {
        struct Removable {
            runs: Rc<RefCell<u32>>,
            removed: Rc<RefCell<bool>>,
        }

        impl System for Removable {
            type Components = (A,);

            fn run_on_entities(&mut self, _: &mut Scene, _: f32, _: EntityId, _: Matched<'_, (A,)>) {
                *self.runs.borrow_mut() += 1;
            }

            fn on_removed(&mut self, _scene: &mut Scene) {
                *self.removed.borrow_mut() = true;
            }
        }

        let mut scene = Scene::new();
        scene.add_entity(Entity::new("e").with(A(0)));
        let runs = Rc::new(RefCell::new(0));
        let removed = Rc::new(RefCell::new(false));
        let id = scene.add_system(Removable {
            runs: runs.clone(),
            removed: removed.clone(),
        });
        assert!(scene.get_system::<Removable>().is_some());

        scene.update(0.016);
        assert!(scene.remove_system(id));
        assert!(!scene.remove_system(id));
        scene.update(0.016);
        assert_eq!(*runs.borrow(), 1);
        assert!(*removed.borrow());
        assert!(scene.get_system::<Removable>().is_none());
    }

    #[test]
    fn system_removing_itself_finishes_its_pass() {
        struct SelfRemoving {
            id: Option<SystemId>,
            runs: u32,
        }

        impl System for SelfRemoving {
            type Components = (A,);

            fn run_on_entities(&mut self, scene: &mut Scene, _: f32, _: EntityId, _: Matched<'_, (A,)>) {
                self.runs += 1;
                if let Some(id) = self.id.take() {
                    assert!(scene.remove_system(id));
                }
            }
        }

        let mut scene = Scene::new();
        scene.add_entity(Entity::new("a").with(A(0)));
        scene.add_entity(Entity::new("b").with(A(1)));
        let id = scene.add_system(SelfRemoving { id: None, runs: 0 });
        if let Some(system) = scene.get_system_mut::<SelfRemoving>() {
            system.id = Some(id);
        }

        scene.update(0.016);
        assert_eq!(scene.system_count(), 0);
        assert!(scene.system_entities(id).is_empty());
    }

    #[test]
    fn slow_systems_are_counted_not_throttled() {
        let mut scene = Scene::with_config(SceneConfig {
            update_warn_threshold_ms: 0.0,
        });
        scene.add_entity(Entity::new("e").with(A(0)));
        scene.add_fn_system::<(A,), _>(|scene, _, _, matched| {
            std::thread::sleep(Duration::from_millis(1));
            if let Some((a,)) = matched.get_mut(scene) {
                a.0 += 1;
            }
        });

        scene.update(0.016);
        let diagnostics = scene.diagnostics();
        assert_eq!(diagnostics.system_calls, 1);
        assert_eq!(diagnostics.slow_system_calls, 1);
        let e = scene.get_entity_with_name("e").unwrap();
        assert_eq!(scene.get_component::<A>(e), Some(&A(1)));
    }

    #[test]
    fn repeated_type_hands_out_both_components() {
        let mut scene = Scene::new();
        let e = scene.add_entity(Entity::new("pair").with(A(1)).with(A(10)));
        let lone = scene.add_entity(Entity::new("lone").with(A(5)));
        let system = scene.add_fn_system::<(A, A), _>(|scene, _, _, matched| {
            if let Some((first, second)) = matched.get_mut(scene) {
                first.0 += second.0;
            }
        });
        assert_eq!(scene.system_entities(system), &[e]);

        scene.update(0.016);
        assert_eq!(scene.get_component::<A>(e), Some(&A(11)));
        assert_eq!(scene.get_component::<A>(lone), Some(&A(5)));
    }

    #[test]
    fn unbounded_warn_threshold_is_rejected_but_never_panics() {
        let config = SceneConfig {
            update_warn_threshold_ms: f64::INFINITY,
        };
        assert_eq!(
            config.validate(),
            Err(SceneConfigError::InvalidWarnThreshold(f64::INFINITY))
        );
        assert_eq!(config.update_warn_threshold(), Duration::MAX);

        let mut scene = Scene::with_config(config);
        scene.add_entity(Entity::new("e").with(A(0)));
        scene.add_fn_system::<(A,), _>(|_, _, _, _| {});
        scene.update(0.016);
        assert_eq!(scene.diagnostics().system_calls, 1);
        assert_eq!(scene.diagnostics().slow_system_calls, 0);

        assert!(SceneConfig::default().validate().is_ok());
        assert!(SceneConfig {
            update_warn_threshold_ms: -1.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn camera_offsets_world_root_only() {
        let mut scene = Scene::new();
        let world = scene.add_entity(Entity::new("w").at(10.0, 10.0));
        let gui = scene.add_gui_entity(Entity::new("g").at(10.0, 10.0));
        scene.camera_mut().move_to(Vec2::new(10.0, 0.0));
        scene.update(0.016);

        assert_eq!(scene.global_position(world), Some(Vec2::new(0.0, 10.0)));
        assert_eq!(scene.global_position(gui), Some(Vec2::new(10.0, 10.0)));
    }

    #[test]
    fn teardown_empties_scene() {
        let mut scene = Scene::new();
        let log: Log = Rc::default();
        scene.add_system(Named { label: "s", log: log.clone() });
        scene.add_global_system(NamedGlobal { label: "g", log });
        scene.add_entity(Entity::new("a").with(A(0)));
        scene.add_gui_entity(Entity::new("b"));
        scene.insert_resource(5u32);

        scene.teardown();
        assert_eq!(scene.entity_count(), 0);
        assert_eq!(scene.system_count(), 0);
        assert_eq!(scene.global_system_count(), 0);
        assert!(scene.resource::<u32>().is_none());
        assert!(scene.entity_added_event().is_empty());
    }

    #[test]
    fn game_over_request_is_taken_once() {
        let mut scene = Scene::new();
        scene.request_game_over();
        assert!(scene.game_over_requested());
        assert!(scene.take_game_over_request());
        assert!(!scene.take_game_over_request());
    }

    /// Random add/remove sequences keep every index equal to a brute-force
    /// recomputation of the population.
    #[test]
    fn indexes_match_brute_force_under_random_churn() {
        let mut rng = StdRng::seed_from_u64(0x1a90);
        let mut scene = Scene::new();
        let ab = scene.add_system(RecordAB {
            seen: Rc::default(),
        });
        let bc = scene.add_fn_system::<(B, C), _>(|_, _, _, _| {});
        let global = scene.add_global_system(CollectAB);

        let entities: Vec<EntityId> = (0..6)
            .map(|i| scene.add_entity(Entity::new(format!("e{i}"))))
            .collect();
        // (entity, type tag, id) of every live component.
        let mut live: Vec<(EntityId, u8, ComponentId)> = Vec::new();

        for step in 0..400 {
            let entity = entities[rng.gen_range(0..entities.len())];
            if live.is_empty() || rng.gen_bool(0.55) {
                let tag = rng.gen_range(0..3u8);
                let id = match tag {
                    0 => scene.add_component(entity, A(step)),
                    1 => scene.add_component(entity, B(step)),
                    _ => scene.add_component(entity, C(step)),
                }
                .unwrap();
                live.push((entity, tag, id));
            } else {
                let (entity, _, id) = live.swap_remove(rng.gen_range(0..live.len()));
                scene.remove_component(entity, id).unwrap();
            }

            let first = |entity: EntityId, tag: u8| {
                live.iter()
                    .filter(|(e, t, _)| *e == entity && *t == tag)
                    .map(|(_, _, id)| *id)
                    .min()
            };
            for &entity in &entities {
                let expect_ab = first(entity, 0).zip(first(entity, 1)).map(|(a, b)| vec![a, b]);
                let expect_bc = first(entity, 1).zip(first(entity, 2)).map(|(b, c)| vec![b, c]);
                assert_eq!(scene.system_components(ab, entity).map(<[_]>::to_vec), expect_ab);
                assert_eq!(scene.system_components(bc, entity).map(<[_]>::to_vec), expect_bc);
            }

            let matches = scene.global_system_matches(global).unwrap();
            let mut expect_a: Vec<_> = live.iter().filter(|(_, t, _)| *t == 0).map(|(_, _, id)| *id).collect();
            let mut got_a: Vec<_> = matches.of::<A>().iter().map(|r| r.component).collect();
            expect_a.sort();
            got_a.sort();
            assert_eq!(got_a, expect_a);
            let b_count = live.iter().filter(|(_, t, _)| *t == 1).count();
            assert_eq!(matches.of::<B>().len(), b_count);
        }
    }
}
