use crate::component::{ComponentId, ComponentMap, ComponentType};
use crate::entity::EntityId;

/// Reactive entity index for one system: exactly the live entities that own
/// every required type, each with its matched component ids in declared order.
///
/// Sparse-set layout keyed by entity slot index, with the generation checked
/// on lookup. Removal swap-removes, so iteration order is not stable.
pub(crate) struct ReactiveIndex {
    types: Vec<ComponentType>,
    /// Maps entity index -> dense index.
    sparse: Vec<Option<usize>>,
    dense: Vec<Vec<ComponentId>>,
    entities: Vec<EntityId>,
}

impl ReactiveIndex {
    pub fn new(types: Vec<ComponentType>) -> Self {
        Self {
            types,
            sparse: Vec::new(),
            dense: Vec::new(),
            entities: Vec::new(),
        }
    }

    pub fn types(&self) -> &[ComponentType] {
        &self.types
    }

    pub fn requires(&self, ty: ComponentType) -> bool {
        self.types.contains(&ty)
    }

    pub fn get(&self, entity: EntityId) -> Option<&[ComponentId]> {
        let dense_idx = (*self.sparse.get(entity.index as usize)?)?;
        if self.entities[dense_idx] != entity {
            return None;
        }
        Some(&self.dense[dense_idx])
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.get(entity).is_some()
    }

    /// Insert or refresh the matched ids for an entity.
    pub fn insert(&mut self, entity: EntityId, ids: Vec<ComponentId>) {
        let idx = entity.index as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        if let Some(dense_idx) = self.sparse[idx] {
            self.dense[dense_idx] = ids;
            self.entities[dense_idx] = entity;
        } else {
            let dense_idx = self.dense.len();
            self.sparse[idx] = Some(dense_idx);
            self.dense.push(ids);
            self.entities.push(entity);
        }
    }

    /// Evict an entity. Returns `false` if it was not indexed.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        if !self.contains(entity) {
            return false;
        }
        let idx = entity.index as usize;
        let Some(dense_idx) = self.sparse[idx].take() else {
            return false;
        };

        let last = self.dense.len() - 1;
        if dense_idx != last {
            // Swap-remove: move the last element into the removed slot.
            self.dense.swap(dense_idx, last);
            self.entities.swap(dense_idx, last);
            let moved = self.entities[dense_idx];
            self.sparse[moved.index as usize] = Some(dense_idx);
        }
        self.dense.pop();
        self.entities.pop();
        true
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.entities.clear();
    }

    /// Backfill or attach: index the entity if it matches.
    pub fn on_entity_added(&mut self, entity: EntityId, components: &ComponentMap) {
        if let Some(ids) = components.find(&self.types) {
            self.insert(entity, ids);
        }
    }

    pub fn on_entity_removed(&mut self, entity: EntityId) {
        self.remove(entity);
    }

    /// `components` already contains the added component.
    pub fn on_component_added(
        &mut self,
        entity: EntityId,
        ty: ComponentType,
        components: &ComponentMap,
    ) {
        if !self.requires(ty) || self.contains(entity) {
            return;
        }
        self.on_entity_added(entity, components);
    }

    /// `components` no longer contains the removed component. A duplicate of
    /// the same type may take its place in the matched tuple.
    pub fn on_component_removed(
        &mut self,
        entity: EntityId,
        ty: ComponentType,
        components: &ComponentMap,
    ) {
        if !self.requires(ty) || !self.contains(entity) {
            return;
        }
        match components.find(&self.types) {
            Some(ids) => self.insert(entity, ids),
            None => {
                self.remove(entity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;

    struct A;
    impl Component for A {}
    struct B;
    impl Component for B {}
    struct C;
    impl Component for C {}

    fn add<T: Component>(map: &mut ComponentMap, value: T) -> ComponentId {
        let id = ComponentId::next();
        map.insert(id, ComponentType::of::<T>(), Box::new(value));
        id
    }

    fn ab_index() -> ReactiveIndex {
        ReactiveIndex::new(vec![ComponentType::of::<A>(), ComponentType::of::<B>()])
    }

    #[test]
    fn indexes_only_full_matches() {
        let e = EntityId::from_raw(0, 0);
        let mut map = ComponentMap::new();
        let mut index = ab_index();

        let a = add(&mut map, A);
        index.on_component_added(e, ComponentType::of::<A>(), &map);
        assert!(!index.contains(e));

        let b = add(&mut map, B);
        index.on_component_added(e, ComponentType::of::<B>(), &map);
        assert_eq!(index.get(e), Some(&[a, b][..]));
    }

    #[test]
    fn removal_of_required_type_evicts() {
        let e = EntityId::from_raw(2, 0);
        let mut map = ComponentMap::new();
        let mut index = ab_index();
        add(&mut map, A);
        let b = add(&mut map, B);
        index.on_entity_added(e, &map);
        assert!(index.contains(e));

        map.remove(b);
        index.on_component_removed(e, ComponentType::of::<B>(), &map);
        assert!(!index.contains(e));
        assert!(index.entities().is_empty());
    }

    #[test]
    fn removal_falls_back_to_duplicate() {
        let e = EntityId::from_raw(0, 0);
        let mut map = ComponentMap::new();
        let mut index = ab_index();
        let a = add(&mut map, A);
        let b1 = add(&mut map, B);
        let b2 = add(&mut map, B);
        index.on_entity_added(e, &map);
        assert_eq!(index.get(e), Some(&[a, b1][..]));

        map.remove(b1);
        index.on_component_removed(e, ComponentType::of::<B>(), &map);
        assert_eq!(index.get(e), Some(&[a, b2][..]));
    }

    #[test]
    fn repeated_type_needs_distinct_components() {
        let e = EntityId::from_raw(0, 0);
        let mut map = ComponentMap::new();
        let mut index = ReactiveIndex::new(vec![ComponentType::of::<A>(), ComponentType::of::<A>()]);

        let a1 = add(&mut map, A);
        index.on_component_added(e, ComponentType::of::<A>(), &map);
        assert!(!index.contains(e));

        let a2 = add(&mut map, A);
        index.on_component_added(e, ComponentType::of::<A>(), &map);
        assert_eq!(index.get(e), Some(&[a1, a2][..]));

        map.remove(a1);
        index.on_component_removed(e, ComponentType::of::<A>(), &map);
        assert!(!index.contains(e));
    }

    #[test]
    fn unrelated_types_are_ignored() {
        let e = EntityId::from_raw(0, 0);
        let mut map = ComponentMap::new();
        let mut index = ab_index();
        add(&mut map, C);
        index.on_component_added(e, ComponentType::of::<C>(), &map);
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn stale_generation_is_not_found() {
        let mut index = ReactiveIndex::new(Vec::new());
        let old = EntityId::from_raw(1, 0);
        index.insert(old, Vec::new());
        assert!(!index.contains(EntityId::from_raw(1, 1)));
        assert!(!index.remove(EntityId::from_raw(1, 1)));
        assert!(index.remove(old));
    }

    #[test]
    fn swap_remove_keeps_lookups_valid() {
        let mut index = ReactiveIndex::new(Vec::new());
        let ids: Vec<_> = (0..4).map(|i| EntityId::from_raw(i, 0)).collect();
        for id in &ids {
            index.insert(*id, Vec::new());
        }
        assert!(index.remove(ids[0]));
        assert!(index.remove(ids[2]));
        assert_eq!(index.len(), 2);
        assert!(index.contains(ids[1]));
        assert!(index.contains(ids[3]));
        assert!(!index.contains(ids[0]));
    }

    #[test]
    fn empty_requirement_matches_everything() {
        let mut index = ReactiveIndex::new(Vec::new());
        let map = ComponentMap::new();
        let e = EntityId::from_raw(0, 0);
        index.on_entity_added(e, &map);
        assert_eq!(index.get(e), Some(&[][..]));
    }
}
