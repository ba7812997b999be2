pub mod error;
pub mod types;
pub mod value;

pub use error::{ConstraintKind, PersistError, Result};
pub use types::{JdbcType, Size};
pub use value::Value;
