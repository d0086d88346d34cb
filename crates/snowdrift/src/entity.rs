//! Entity model: one configured file-pattern-to-table mapping.

use std::fmt;

use crate::config::EntityConfig;

/// Normalize an identifier the way every warehouse object name is written:
/// spaces and hyphens become underscores and the result is upper-cased.
///
/// Idempotent, so it is safe to apply wherever a name crosses from
/// configuration into a statement.
pub fn normalize_identifier(name: &str) -> String {
    name.replace([' ', '-'], "_").to_uppercase()
}

/// Map a symbolic delimiter name to its character; anything else passes through.
pub fn map_delimiter(symbol: &str) -> String {
    match symbol.to_ascii_uppercase().as_str() {
        "COMMA" => ",".to_string(),
        "PIPE" => "|".to_string(),
        _ => symbol.to_string(),
    }
}

/// Split a comma-separated column list, dropping blanks and normalizing names.
pub fn parse_cluster_columns<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    columns
        .iter()
        .flat_map(|raw| raw.as_ref().split(','))
        .map(str::trim)
        .filter(|col| !col.is_empty())
        .map(normalize_identifier)
        .collect()
}

/// Fully qualified table identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl TableKey {
    pub fn new(database: &str, schema: &str, table: &str) -> Self {
        Self {
            database: normalize_identifier(database),
            schema: normalize_identifier(schema),
            table: normalize_identifier(table),
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// One row of load configuration, normalized.
///
/// `file_format_name` is filled in by the planner and `has_non_empty_file`
/// by the table-creation phase; nothing else changes after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Regex matched against object keys relative to the source root.
    pub file_pattern: String,
    pub file_type: String,
    pub delimiter: String,
    pub has_header: bool,
    pub target: TableKey,
    pub cluster_by: Vec<String>,
    pub file_format_name: Option<String>,
    pub has_non_empty_file: bool,
}

impl Entity {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_pattern: &str,
        file_type: &str,
        delimiter: &str,
        has_header: bool,
        database: &str,
        schema: &str,
        table: &str,
        cluster_by: &[&str],
    ) -> Self {
        Self {
            file_pattern: file_pattern.to_string(),
            file_type: file_type.to_string(),
            delimiter: map_delimiter(delimiter),
            has_header,
            target: TableKey::new(database, schema, table),
            cluster_by: parse_cluster_columns(cluster_by),
            file_format_name: None,
            has_non_empty_file: false,
        }
    }

    pub fn database(&self) -> &str {
        &self.target.database
    }

    pub fn schema(&self) -> &str {
        &self.target.schema
    }

    pub fn table(&self) -> &str {
        &self.target.table
    }

    /// Whether clustering should be applied for this entity's table.
    pub fn wants_clustering(&self) -> bool {
        !self.cluster_by.is_empty() && self.has_non_empty_file
    }
}

impl From<&EntityConfig> for Entity {
    fn from(config: &EntityConfig) -> Self {
        Self {
            file_pattern: config.file_pattern.clone(),
            file_type: config.file_type.clone(),
            delimiter: map_delimiter(&config.delimiter),
            has_header: config.has_header,
            target: TableKey::new(&config.database, &config.schema, &config.table),
            cluster_by: parse_cluster_columns(&config.cluster_by),
            file_format_name: None,
            has_non_empty_file: false,
        }
    }
}

/// Column names for a table whose files carry no header row: `col 1`, `col 2`, ...
pub fn positional_columns(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("col {i}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("my table-1"), "MY_TABLE_1");
        assert_eq!(normalize_identifier("MY_TABLE_1"), "MY_TABLE_1");
        assert_eq!(normalize_identifier("Sales Data"), "SALES_DATA");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in ["a b-c", "Already_OK", "x--y  z", ""] {
            let once = normalize_identifier(name);
            assert_eq!(normalize_identifier(&once), once);
        }
    }

    #[test]
    fn test_delimiter_mapping() {
        assert_eq!(map_delimiter("COMMA"), ",");
        assert_eq!(map_delimiter("comma"), ",");
        assert_eq!(map_delimiter("PIPE"), "|");
        assert_eq!(map_delimiter(";"), ";");
        assert_eq!(map_delimiter("\\t"), "\\t");
    }

    #[test]
    fn test_cluster_columns_split_and_normalized() {
        assert_eq!(
            parse_cluster_columns(&["order date, region,,"]),
            vec!["ORDER_DATE", "REGION"]
        );
        assert_eq!(
            parse_cluster_columns(&["customer-id", "day"]),
            vec!["CUSTOMER_ID", "DAY"]
        );
        assert!(parse_cluster_columns::<&str>(&[]).is_empty());
        assert!(parse_cluster_columns(&[""]).is_empty());
    }

    #[test]
    fn test_entity_new_normalizes() {
        let entity = Entity::new("orders_.*", "csv", "PIPE", true, "raw db", "sales-eu", "orders", &["id"]);
        assert_eq!(entity.delimiter, "|");
        assert_eq!(entity.target.to_string(), "RAW_DB.SALES_EU.ORDERS");
        assert_eq!(entity.cluster_by, vec!["ID"]);
        assert_eq!(entity.file_format_name, None);
        assert!(!entity.has_non_empty_file);
        assert!(!entity.wants_clustering());
    }

    #[test]
    fn test_positional_columns() {
        assert_eq!(positional_columns(4), vec!["col 1", "col 2", "col 3", "col 4"]);
        assert!(positional_columns(0).is_empty());
    }
}
