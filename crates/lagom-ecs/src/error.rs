use crate::component::ComponentId;
use crate::entity::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("entity {0} is not in the scene")]
    EntityNotFound(EntityId),

    #[error("entity {0} is already being removed")]
    AlreadyRemoving(EntityId),

    #[error("entity {0} is a scene root")]
    RootEntity(EntityId),

    #[error("component {component} is not owned by entity {entity}")]
    ComponentNotOwned {
        entity: EntityId,
        component: ComponentId,
    },

    #[error("entity {child} is not a child of {parent}")]
    NotAChild { parent: EntityId, child: EntityId },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneConfigError {
    #[error("update warning threshold must be zero or more milliseconds, got {0}")]
    InvalidWarnThreshold(f64),
}
