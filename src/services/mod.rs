mod executor;
mod generator;
mod result_validator;
mod schema_cache;

pub use executor::{PgSqlExecutor, SqlExecutor};
pub use generator::{GeminiSqlGenerator, SqlGenerator};
pub use result_validator::{GeminiResultValidator, ResultValidator};
pub use schema_cache::{InMemorySchemaCache, PgSchemaCache, SchemaCache};
