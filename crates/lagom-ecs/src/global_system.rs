use tracing::warn;

use crate::component::{AsAny, Component, ComponentRef, ComponentSet, ComponentType};
use crate::scene::Scene;

/// Behavior over whole populations of component types, without requiring
/// them to share an entity.
pub trait GlobalSystem: 'static {
    type Components: ComponentSet;

    fn update(&mut self, scene: &mut Scene, delta: f32, components: &GlobalMatches);

    fn fixed_update(&mut self, _scene: &mut Scene, _delta: f32, _components: &GlobalMatches) {}

    fn on_added(&mut self, _scene: &mut Scene) {}

    fn on_removed(&mut self, _scene: &mut Scene) {}

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// One list of live components per declared type, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct GlobalMatches {
    types: Vec<ComponentType>,
    lists: Vec<Vec<ComponentRef>>,
}

impl GlobalMatches {
    /// Components of type `T`. Empty if `T` was not declared.
    pub fn of<T: Component>(&self) -> &[ComponentRef] {
        let ty = ComponentType::of::<T>();
        self.types
            .iter()
            .position(|t| *t == ty)
            .map(|pos| self.lists[pos].as_slice())
            .unwrap_or(&[])
    }

    /// The list for the `i`th declared type.
    pub fn list(&self, i: usize) -> &[ComponentRef] {
        self.lists.get(i).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn types(&self) -> &[ComponentType] {
        &self.types
    }

    /// Total number of components across every list.
    pub fn len(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) struct GlobalIndex {
    matches: GlobalMatches,
}

impl GlobalIndex {
    /// Duplicate declarations collapse onto the first occurrence.
    pub fn new(declared: Vec<ComponentType>, system: &str) -> Self {
        let mut types: Vec<ComponentType> = Vec::with_capacity(declared.len());
        for ty in declared {
            if types.contains(&ty) {
                warn!(system, component = ty.name(), "component type declared twice");
                continue;
            }
            types.push(ty);
        }
        let lists = vec![Vec::new(); types.len()];
        Self {
            matches: GlobalMatches { types, lists },
        }
    }

    fn position(&self, ty: ComponentType) -> Option<usize> {
        self.matches.types.iter().position(|t| *t == ty)
    }

    pub fn on_component_added(&mut self, component: ComponentRef, ty: ComponentType) {
        if let Some(pos) = self.position(ty) {
            self.matches.lists[pos].push(component);
        }
    }

    pub fn on_component_removed(&mut self, component: ComponentRef, ty: ComponentType) {
        if let Some(pos) = self.position(ty) {
            let list = &mut self.matches.lists[pos];
            if let Some(i) = list.iter().position(|c| *c == component) {
                list.remove(i);
            }
        }
    }

    pub fn matches(&self) -> &GlobalMatches {
        &self.matches
    }

    pub fn snapshot(&self) -> GlobalMatches {
        self.matches.clone()
    }

    pub fn clear(&mut self) {
        for list in &mut self.matches.lists {
            list.clear();
        }
    }
}

/// Object-safe face of [`GlobalSystem`] stored by the scene.
pub(crate) trait AnyGlobalSystem: AsAny + 'static {
    fn label(&self) -> &'static str;
    fn run(&mut self, scene: &mut Scene, delta: f32, components: &GlobalMatches, fixed: bool);
    fn attached(&mut self, scene: &mut Scene);
    fn detached(&mut self, scene: &mut Scene);
}

impl<G: GlobalSystem> AnyGlobalSystem for G {
    fn label(&self) -> &'static str {
        GlobalSystem::name(self)
    }

    fn run(&mut self, scene: &mut Scene, delta: f32, components: &GlobalMatches, fixed: bool) {
        if fixed {
            self.fixed_update(scene, delta, components);
        } else {
            self.update(scene, delta, components);
        }
    }

    fn attached(&mut self, scene: &mut Scene) {
        GlobalSystem::on_added(self, scene);
    }

    fn detached(&mut self, scene: &mut Scene) {
        GlobalSystem::on_removed(self, scene);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentId;
    use crate::entity::EntityId;

    struct A;
    impl Component for A {}
    struct B;
    impl Component for B {}
    struct C;
    impl Component for C {}

    fn component_ref() -> ComponentRef {
        ComponentRef {
            entity: EntityId::from_raw(0, 0),
            component: ComponentId::next(),
        }
    }

    #[test]
    fn lists_follow_declaration_order() {
        let mut index = GlobalIndex::new(<(B, A)>::types(), "test");
        let a = component_ref();
        let b = component_ref();
        index.on_component_added(a, ComponentType::of::<A>());
        index.on_component_added(b, ComponentType::of::<B>());
        index.on_component_added(component_ref(), ComponentType::of::<C>());

        let matches = index.matches();
        assert_eq!(matches.list(0), &[b]);
        assert_eq!(matches.list(1), &[a]);
        assert_eq!(matches.of::<A>(), &[a]);
        assert!(matches.of::<C>().is_empty());
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn removal_is_by_identity() {
        let mut index = GlobalIndex::new(<(A,)>::types(), "test");
        let first = component_ref();
        let second = component_ref();
        index.on_component_added(first, ComponentType::of::<A>());
        index.on_component_added(second, ComponentType::of::<A>());
        index.on_component_removed(first, ComponentType::of::<A>());
        assert_eq!(index.matches().of::<A>(), &[second]);
    }

    #[test]
    fn duplicate_declarations_collapse() {
        let index = GlobalIndex::new(<(A, B, A)>::types(), "test");
        assert_eq!(index.matches().types().len(), 2);
    }

    #[test]
    fn snapshot_is_detached_from_index() {
        let mut index = GlobalIndex::new(<(A,)>::types(), "test");
        let snapshot = index.snapshot();
        index.on_component_added(component_ref(), ComponentType::of::<A>());
        assert!(snapshot.is_empty());
        assert_eq!(index.matches().len(), 1);
    }
}
