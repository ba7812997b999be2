//! Entity persisters and the coordinators that turn entity-level
//! insert/update/delete requests into table mutations.

pub mod coordinator;
pub mod delete;
pub mod entity;
pub mod insert;
pub mod update;

pub use coordinator::{DeleteRequest, InsertRequest, UpdateRequest};
pub use delete::DeleteCoordinator;
pub use entity::{
    AttributeMapping, AttributeNature, BooleanConverter, ColumnMapping, EntityPersister,
    EntityPersisterBuilder, IdGeneration, OptimisticLockStyle,
};
pub use insert::InsertCoordinator;
pub use update::UpdateCoordinator;
