use std::fmt;
use std::marker::PhantomData;

use lagom_core::ObjectId;

use crate::component::{AsAny, ComponentId, ComponentRef, ComponentSet};
use crate::entity::EntityId;
use crate::scene::Scene;

/// Registration handle for systems and global systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(ObjectId);

impl SystemId {
    pub(crate) fn next() -> Self {
        Self(ObjectId::next())
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system{}", self.0)
    }
}

/// The components an indexed entity matched, one per required type.
///
/// Holds ids rather than borrows, so the scene stays free for mutation until
/// [`Matched::get_mut`] is called.
pub struct Matched<'a, S: ComponentSet> {
    entity: EntityId,
    ids: &'a [ComponentId],
    _marker: PhantomData<fn() -> S>,
}

impl<'a, S: ComponentSet> Matched<'a, S> {
    pub(crate) fn new(entity: EntityId, ids: &'a [ComponentId]) -> Self {
        Self {
            entity,
            ids,
            _marker: PhantomData,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn ids(&self) -> &'a [ComponentId] {
        self.ids
    }

    /// Reference to the `i`th matched component.
    pub fn component_ref(&self, i: usize) -> Option<ComponentRef> {
        self.ids.get(i).map(|component| ComponentRef {
            entity: self.entity,
            component: *component,
        })
    }

    /// `None` once any matched component has been removed.
    pub fn get<'s>(&self, scene: &'s Scene) -> Option<S::Refs<'s>> {
        scene.fetch::<S>(self.entity, self.ids)
    }

    pub fn get_mut<'s>(&self, scene: &'s mut Scene) -> Option<S::RefsMut<'s>> {
        scene.fetch_mut::<S>(self.entity, self.ids)
    }
}

impl<S: ComponentSet> Clone for Matched<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ComponentSet> Copy for Matched<'_, S> {}

impl<S: ComponentSet> fmt::Debug for Matched<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matched")
            .field("entity", &self.entity)
            .field("ids", &self.ids)
            .finish()
    }
}

/// Per-entity behavior over every entity that owns all of `Components`.
///
/// The scene keeps each system's index current as entities and components
/// come and go, so a system never scans the population itself.
pub trait System: 'static {
    type Components: ComponentSet;

    fn run_on_entities(
        &mut self,
        scene: &mut Scene,
        delta: f32,
        entity: EntityId,
        matched: Matched<'_, Self::Components>,
    );

    fn run_on_entities_fixed(
        &mut self,
        _scene: &mut Scene,
        _delta: f32,
        _entity: EntityId,
        _matched: Matched<'_, Self::Components>,
    ) {
    }

    /// Runs once per update pass before the first entity.
    fn before_update(&mut self, _scene: &mut Scene, _delta: f32) {}

    fn on_added(&mut self, _scene: &mut Scene) {}

    fn on_removed(&mut self, _scene: &mut Scene) {}

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Object-safe face of [`System`] stored by the scene.
pub(crate) trait AnySystem: AsAny + 'static {
    fn label(&self) -> &'static str;
    fn begin_pass(&mut self, scene: &mut Scene, delta: f32);
    fn run_entity(
        &mut self,
        scene: &mut Scene,
        delta: f32,
        entity: EntityId,
        ids: &[ComponentId],
        fixed: bool,
    );
    fn attached(&mut self, scene: &mut Scene);
    fn detached(&mut self, scene: &mut Scene);
}

impl<S: System> AnySystem for S {
    fn label(&self) -> &'static str {
        System::name(self)
    }

    fn begin_pass(&mut self, scene: &mut Scene, delta: f32) {
        System::before_update(self, scene, delta);
    }

    fn run_entity(
        &mut self,
        scene: &mut Scene,
        delta: f32,
        entity: EntityId,
        ids: &[ComponentId],
        fixed: bool,
    ) {
        let matched = Matched::new(entity, ids);
        if fixed {
            self.run_on_entities_fixed(scene, delta, entity, matched);
        } else {
            self.run_on_entities(scene, delta, entity, matched);
        }
    }

    fn attached(&mut self, scene: &mut Scene) {
        System::on_added(self, scene);
    }

    fn detached(&mut self, scene: &mut Scene) {
        System::on_removed(self, scene);
    }
}

/// A system built from a closure. See [`Scene::add_fn_system`].
pub struct FnSystem<S, F> {
    name: &'static str,
    run: F,
    _marker: PhantomData<fn() -> S>,
}

impl<S, F> FnSystem<S, F>
where
    S: ComponentSet,
    F: FnMut(&mut Scene, f32, EntityId, Matched<'_, S>) + 'static,
{
    pub fn new(run: F) -> Self {
        Self {
            name: std::any::type_name::<F>(),
            run,
            _marker: PhantomData,
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<S, F> System for FnSystem<S, F>
where
    S: ComponentSet,
    F: FnMut(&mut Scene, f32, EntityId, Matched<'_, S>) + 'static,
{
    type Components = S;

    fn run_on_entities(
        &mut self,
        scene: &mut Scene,
        delta: f32,
        entity: EntityId,
        matched: Matched<'_, S>,
    ) {
        (self.run)(scene, delta, entity, matched);
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
