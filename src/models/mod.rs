mod query;
mod schema;

pub use query::{QueryRequest, QueryResponse, ResultValidationResult, ReturnType};
pub use schema::{ColumnInfo, DatabaseSchema, TableInfo};
