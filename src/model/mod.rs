//! Declarative model consumed by the engine: tables, columns, joins, values and
//! the metadata cache.

pub mod column;
pub mod join;
pub mod login;
pub mod metadata;
pub mod operator;
pub mod table;
pub mod value;

pub use column::{Column, ColumnMeta, Nullability};
pub use join::{Join, JoinKind};
pub use login::Login;
pub use metadata::{ColumnMetadataCache, TableMetadata};
pub use operator::CompareOp;
pub use table::{ServerKey, Table};
pub use value::{BindValue, SqlType, SqlValue};
