use std::fmt;

use glam::Vec2;
use lagom_core::{LifecycleState, Observable, Transform};

use crate::component::{Component, ComponentId, ComponentMap, ComponentType};
use crate::scene::Scene;
use crate::visual::NodeId;

/// A generational entity handle. Uses compact u32 index + generation so a
/// stale handle never aliases a newer entity in a reused slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl EntityId {
    /// Create an id from raw parts (mainly for testing).
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Generational slot storage keyed by [`EntityId`].
pub(crate) struct EntityArena<T> {
    generations: Vec<u32>,
    slots: Vec<Option<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> EntityArena<T> {
    pub fn new() -> Self {
        Self {
            generations: Vec::new(),
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Store a value, reusing a freed slot if available.
    pub fn allocate(&mut self, value: T) -> EntityId {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = Some(value);
            EntityId {
                index,
                generation: self.generations[index as usize],
            }
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            self.slots.push(Some(value));
            EntityId {
                index,
                generation: 0,
            }
        }
    }

    /// Free a slot and hand back its value. `None` for stale or unknown ids.
    pub fn deallocate(&mut self, id: EntityId) -> Option<T> {
        if !self.is_alive(id) {
            return None;
        }
        let idx = id.index as usize;
        self.generations[idx] += 1;
        self.free_list.push(id.index);
        self.len -= 1;
        self.slots[idx].take()
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        let idx = id.index as usize;
        idx < self.slots.len() && self.slots[idx].is_some() && self.generations[idx] == id.generation
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        if self.generations.get(id.index as usize) != Some(&id.generation) {
            return None;
        }
        self.slots.get(id.index as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        if self.generations.get(id.index as usize) != Some(&id.generation) {
            return None;
        }
        self.slots.get_mut(id.index as usize)?.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.as_ref()?;
            let id = EntityId {
                index: index as u32,
                generation: self.generations[index],
            };
            Some((id, value))
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl<T> Default for EntityArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Deferred work run against the scene with the entity's id.
pub type EntityHook = Box<dyn FnOnce(&mut Scene, EntityId)>;

/// A detached entity: a named bundle of components, children and hooks that
/// becomes live when attached to a scene.
///
/// ```ignore
/// let player = Entity::new("player")
///     .at(100.0, 50.0)
///     .with_depth(2)
///     .with(Velocity::default())
///     .with_child(Entity::new("shadow"));
/// let id = scene.add_entity(player);
/// ```
pub struct Entity {
    pub(crate) name: String,
    pub(crate) transform: Transform,
    pub(crate) components: Vec<(ComponentType, Box<dyn Component>)>,
    pub(crate) children: Vec<Entity>,
    pub(crate) on_added: Vec<EntityHook>,
    pub(crate) on_removed: Vec<EntityHook>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            components: Vec::new(),
            children: Vec::new(),
            on_added: Vec::new(),
            on_removed: Vec::new(),
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.transform.position = Vec2::new(x, y);
        self
    }

    /// Higher depth draws on top of lower depth among siblings.
    pub fn with_depth(mut self, depth: i32) -> Self {
        self.transform.depth = depth;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with<T: Component>(mut self, component: T) -> Self {
        self.add_component(component);
        self
    }

    pub fn add_component<T: Component>(&mut self, component: T) {
        self.components
            .push((ComponentType::of::<T>(), Box::new(component)));
    }

    pub fn with_child(mut self, child: Entity) -> Self {
        self.children.push(child);
        self
    }

    /// Runs once the entity and its components are live, before its
    /// children are attached.
    pub fn on_added(mut self, hook: impl FnOnce(&mut Scene, EntityId) + 'static) -> Self {
        self.on_added.push(Box::new(hook));
        self
    }

    /// Runs at the start of the entity's teardown, after its children are gone.
    pub fn on_removed(mut self, hook: impl FnOnce(&mut Scene, EntityId) + 'static) -> Self {
        self.on_removed.push(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("components", &self.components.len())
            .field("children", &self.children)
            .finish()
    }
}

/// Payload of component added/removed notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentEvent {
    pub entity: EntityId,
    pub component: ComponentId,
    pub ty: ComponentType,
}

/// Payload of child added/removed notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildEvent {
    pub parent: EntityId,
    pub child: EntityId,
}

/// A live entity inside a scene.
pub(crate) struct EntityNode {
    pub name: String,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub visual: NodeId,
    pub components: ComponentMap,
    pub state: LifecycleState,
    pub root: bool,
    pub on_removed: Vec<EntityHook>,
    pub component_added: Observable<ComponentEvent>,
    pub component_removed: Observable<ComponentEvent>,
    pub child_added: Observable<ChildEvent>,
    pub child_removed: Observable<ChildEvent>,
}

impl EntityNode {
    pub fn new(
        name: String,
        parent: Option<EntityId>,
        visual: NodeId,
        on_removed: Vec<EntityHook>,
    ) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            visual,
            components: ComponentMap::new(),
            state: LifecycleState::Live,
            root: false,
            on_removed,
            component_added: Observable::new(),
            component_removed: Observable::new(),
            child_added: Observable::new(),
            child_removed: Observable::new(),
        }
    }

    pub fn root(name: &str, visual: NodeId) -> Self {
        let mut node = Self::new(name.to_string(), None, visual, Vec::new());
        node.root = true;
        node
    }

    /// Live, non-root entities are the ones systems see.
    pub fn is_registered(&self) -> bool {
        !self.root && self.state.is_live()
    }

    pub fn release_observers(&mut self) {
        self.component_added.release_all();
        self.component_removed.release_all();
        self.child_added.release_all();
        self.child_removed.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_sequential() {
        let mut arena = EntityArena::new();
        let e0 = arena.allocate("a");
        let e1 = arena.allocate("b");
        assert_eq!(e0.index, 0);
        assert_eq!(e1.index, 1);
        assert_eq!(e0.generation, 0);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn deallocate_and_reuse() {
        let mut arena = EntityArena::new();
        let e0 = arena.allocate("a");
        assert_eq!(arena.deallocate(e0), Some("a"));
        let e0_reused = arena.allocate("b");
        assert_eq!(e0_reused.index, 0);
        assert_eq!(e0_reused.generation, 1);
        assert_ne!(e0, e0_reused);
        assert_eq!(arena.get(e0), None);
        assert_eq!(arena.get(e0_reused), Some(&"b"));
    }

    #[test]
    fn double_deallocate_fails() {
        let mut arena = EntityArena::new();
        let e = arena.allocate(1);
        assert!(arena.deallocate(e).is_some());
        assert!(arena.deallocate(e).is_none());
        assert!(!arena.is_alive(e));
    }

    #[test]
    fn iter_skips_free_slots() {
        let mut arena = EntityArena::new();
        let a = arena.allocate(1);
        let b = arena.allocate(2);
        let c = arena.allocate(3);
        arena.deallocate(b);
        let seen: Vec<_> = arena.iter().map(|(id, v)| (id, *v)).collect();
        assert_eq!(seen, vec![(a, 1), (c, 3)]);
    }

    #[test]
    fn display_format() {
        let e = EntityId::from_raw(5, 3);
        assert_eq!(format!("{e}"), "5v3");
        assert_eq!(format!("{e:?}"), "Entity(5v3)");
    }

    #[test]
    fn prefab_builder_collects_parts() {
        struct Tag;
        impl Component for Tag {}

        let prefab = Entity::new("root")
            .at(3.0, 4.0)
            .with_depth(2)
            .with(Tag)
            .with_child(Entity::new("child"));
        assert_eq!(prefab.name(), "root");
        assert_eq!(prefab.transform().position, Vec2::new(3.0, 4.0));
        assert_eq!(prefab.transform().depth, 2);
        assert_eq!(prefab.components.len(), 1);
        assert_eq!(prefab.children.len(), 1);
    }
}
