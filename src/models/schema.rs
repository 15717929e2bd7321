use serde::{Deserialize, Serialize};

/// A single column, adapted from the teacher's `db::schema::ColumnInfo`
/// but trimmed to what the SQL generator/validator actually consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub foreign_key_table: Option<String>,
    #[serde(default)]
    pub foreign_key_column: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, is_nullable: bool) -> Self {
        ColumnInfo {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable,
            is_primary_key: false,
            is_foreign_key: false,
            foreign_key_table: None,
            foreign_key_column: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }
}

/// One table's shape as surfaced to the SQL generator prompt and to the
/// validator's blocked-table/blocked-column checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
}

/// The full schema snapshot for one configured database, as returned by a
/// `SchemaCache`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub database_name: String,
    pub tables: Vec<TableInfo>,
    pub version: String,
}
