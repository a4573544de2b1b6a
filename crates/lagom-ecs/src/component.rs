use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;

use lagom_core::ObjectId;

use crate::entity::EntityId;
use crate::visual::{NodeId, VisualTree};

/// Upcasting helpers for trait objects. Implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of state owned by exactly one entity.
///
/// The hooks run after the component-added notification and after the
/// component-removed notification respectively.
pub trait Component: AsAny + 'static {
    fn on_added(&mut self, _ctx: &mut ComponentContext<'_>) {}

    fn on_removed(&mut self, _ctx: &mut ComponentContext<'_>) {}
}

impl dyn Component {
    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// What a component sees of its owner while a lifecycle hook runs.
pub struct ComponentContext<'a> {
    /// The owning entity.
    pub entity: EntityId,
    /// The owning entity's visual node. Rendering components parent their own
    /// nodes here.
    pub node: NodeId,
    pub visuals: &'a mut VisualTree,
}

/// Capability tag used to match components against system requirements.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentType {
    id: TypeId,
    name: &'static str,
}

impl ComponentType {
    pub fn of<T: Component>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({})", self.name)
    }
}

/// Unique id of a component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(ObjectId);

impl ComponentId {
    pub(crate) fn next() -> Self {
        Self(ObjectId::next())
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A component addressed through its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentRef {
    pub entity: EntityId,
    pub component: ComponentId,
}

pub(crate) struct ComponentEntry {
    pub ty: ComponentType,
    pub value: Box<dyn Component>,
}

/// The components owned by one entity.
///
/// Ids are allocated in increasing order, so iteration follows insertion
/// order and "first component of a type" is the oldest one.
#[derive(Default)]
pub struct ComponentMap {
    entries: BTreeMap<ComponentId, ComponentEntry>,
}

impl ComponentMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: ComponentId, ty: ComponentType, value: Box<dyn Component>) {
        self.entries.insert(id, ComponentEntry { ty, value });
    }

    pub(crate) fn remove(&mut self, id: ComponentId) -> Option<ComponentEntry> {
        self.entries.remove(&id)
    }

    pub(crate) fn get(&self, id: ComponentId) -> Option<&dyn Component> {
        self.entries.get(&id).map(|entry| &*entry.value)
    }

    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Option<&mut dyn Component> {
        self.entries.get_mut(&id).map(|entry| &mut *entry.value)
    }

    pub(crate) fn first_of(&self, ty: ComponentType) -> Option<ComponentId> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.ty == ty)
            .map(|(id, _)| *id)
    }

    pub(crate) fn ids_of(&self, ty: ComponentType) -> impl Iterator<Item = ComponentId> + '_ {
        self.entries
            .iter()
            .filter(move |(_, entry)| entry.ty == ty)
            .map(|(id, _)| *id)
    }

    /// First component of each requested type, in the requested order.
    /// A type listed twice takes the next component of that type, so every id
    /// in the result is distinct. `None` if any slot cannot be filled.
    pub(crate) fn find(&self, types: &[ComponentType]) -> Option<Vec<ComponentId>> {
        let mut found: Vec<ComponentId> = Vec::with_capacity(types.len());
        for ty in types {
            let id = self.ids_of(*ty).find(|id| !found.contains(id))?;
            found.push(id);
        }
        Some(found)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ComponentId, ComponentType)> + '_ {
        self.entries.iter().map(|(id, entry)| (*id, entry.ty))
    }

    pub(crate) fn ids(&self) -> Vec<ComponentId> {
        self.entries.keys().copied().collect()
    }

    /// Mutable access to several distinct components at once, in `ids` order.
    pub(crate) fn disjoint_mut(&mut self, ids: &[ComponentId]) -> Option<Vec<&mut dyn Component>> {
        let mut found: Vec<Option<&mut dyn Component>> = ids.iter().map(|_| None).collect();
        for (id, entry) in self.entries.iter_mut() {
            if let Some(pos) = ids.iter().position(|wanted| wanted == id) {
                found[pos] = Some(&mut *entry.value);
            }
        }
        found.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An ordered tuple of required component types.
///
/// Implemented for `()` and tuples of up to six components. The declared order
/// is the order of the matched references handed to systems. Repeating a type,
/// as in `(A, A)`, asks for that many distinct components of it.
pub trait ComponentSet: 'static {
    type Refs<'a>;
    type RefsMut<'a>;

    fn types() -> Vec<ComponentType>;

    #[doc(hidden)]
    fn fetch<'a>(components: &'a ComponentMap, ids: &[ComponentId]) -> Option<Self::Refs<'a>>;

    #[doc(hidden)]
    fn fetch_mut<'a>(
        components: &'a mut ComponentMap,
        ids: &[ComponentId],
    ) -> Option<Self::RefsMut<'a>>;
}

impl ComponentSet for () {
    type Refs<'a> = ();
    type RefsMut<'a> = ();

    fn types() -> Vec<ComponentType> {
        Vec::new()
    }

    fn fetch<'a>(_: &'a ComponentMap, _: &[ComponentId]) -> Option<Self::Refs<'a>> {
        Some(())
    }

    fn fetch_mut<'a>(_: &'a mut ComponentMap, _: &[ComponentId]) -> Option<Self::RefsMut<'a>> {
        Some(())
    }
}

fn downcast_mut<T: Component>(component: &mut dyn Component) -> Option<&mut T> {
    component.as_any_mut().downcast_mut::<T>()
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            type Refs<'a> = ($(&'a $name,)+);
            type RefsMut<'a> = ($(&'a mut $name,)+);

            fn types() -> Vec<ComponentType> {
                vec![$(ComponentType::of::<$name>()),+]
            }

            fn fetch<'a>(
                components: &'a ComponentMap,
                ids: &[ComponentId],
            ) -> Option<Self::Refs<'a>> {
                let mut ids = ids.iter();
                Some(($(components.get(*ids.next()?)?.downcast_ref::<$name>()?,)+))
            }

            fn fetch_mut<'a>(
                components: &'a mut ComponentMap,
                ids: &[ComponentId],
            ) -> Option<Self::RefsMut<'a>> {
                let mut slots = components.disjoint_mut(ids)?.into_iter();
                Some(($(downcast_mut::<$name>(slots.next()?)?,)+))
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
