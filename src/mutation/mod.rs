pub mod binding;
pub mod builder;
pub mod group;
pub mod operation;
pub mod table;

pub use binding::{BindingRole, ColumnValueBinding, ParameterUsage};
pub use builder::{MutationGroupBuilder, StandardTableMutationBuilder, TableMutationBuilder};
pub use group::{BatchKey, MutationOperationGroup, OperationSlot};
pub use operation::{MutationOperation, MutationType, ParameterSlot, RowIdentity, TableMutation};
pub use table::{Expectation, MutationDetails, RowOutcome, TableMapping, TableMappingBuilder};
