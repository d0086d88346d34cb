//! Derives the set of warehouse objects a list of entities needs.
//!
//! Databases, schemas and file formats are deduplicated in first-seen order
//! so that the statements issued for them come out the same way every run.

use indexmap::{IndexMap, IndexSet};

use crate::config::ControlObjects;
use crate::entity::{Entity, normalize_identifier};

/// A schema, qualified by its database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaKey {
    pub database: String,
    pub schema: String,
}

/// Everything that makes two file formats interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileFormatKey {
    pub database: String,
    pub schema: String,
    pub file_type: String,
    pub has_header: bool,
    pub delimiter: String,
}

impl FileFormatKey {
    pub fn for_entity(entity: &Entity) -> Self {
        Self {
            database: entity.database().to_string(),
            schema: entity.schema().to_string(),
            file_type: entity.file_type.clone(),
            has_header: entity.has_header,
            delimiter: entity.delimiter.clone(),
        }
    }
}

/// Objects to create before any table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPlan {
    /// Databases to create; never includes the control database.
    pub databases: IndexSet<String>,
    pub schemas: IndexSet<SchemaKey>,
    /// File formats with their 1-based ids.
    pub file_formats: IndexMap<FileFormatKey, u32>,
}

impl ObjectPlan {
    /// Plan objects for `entities` and write each entity's file format name.
    pub fn build(entities: &mut [Entity], control: &ControlObjects) -> Self {
        let control_database = control.control_database_name();
        let mut plan = Self::default();

        for entity in entities.iter() {
            let database = normalize_identifier(entity.database());
            if database != control_database {
                plan.databases.insert(database);
            }

            plan.schemas.insert(SchemaKey {
                database: entity.database().to_string(),
                schema: entity.schema().to_string(),
            });

            let next_id = plan.file_formats.len() as u32 + 1;
            plan.file_formats
                .entry(FileFormatKey::for_entity(entity))
                .or_insert(next_id);
        }

        for entity in entities.iter_mut() {
            let id = plan.file_formats[&FileFormatKey::for_entity(entity)];
            entity.file_format_name = Some(control.file_format_name(id));
        }

        plan
    }

    /// File formats with their assigned names, in creation order.
    pub fn named_file_formats<'a>(
        &'a self,
        control: &'a ControlObjects,
    ) -> impl Iterator<Item = (&'a FileFormatKey, String)> + 'a {
        self.file_formats
            .iter()
            .map(|(key, id)| (key, control.file_format_name(*id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(pattern: &str, header: bool, delimiter: &str, db: &str, table: &str) -> Entity {
        Entity::new(pattern, "csv", delimiter, header, db, "sales", table, &[])
    }

    #[test]
    fn test_shared_format_for_identical_entities() {
        let mut entities = vec![
            entity("a.*", true, "COMMA", "raw", "a"),
            entity("b.*", true, ",", "raw", "b"),
        ];
        let plan = ObjectPlan::build(&mut entities, &ControlObjects::default());

        assert_eq!(plan.databases.len(), 1);
        assert_eq!(plan.schemas.len(), 1);
        assert_eq!(plan.file_formats.len(), 1);
        assert_eq!(entities[0].file_format_name.as_deref(), Some("FL_FF_1"));
        assert_eq!(entities[1].file_format_name.as_deref(), Some("FL_FF_1"));
    }

    #[test]
    fn test_format_ids_in_first_seen_order() {
        let mut entities = vec![
            entity("a.*", true, "COMMA", "raw", "a"),
            entity("b.*", false, "COMMA", "raw", "b"),
            entity("c.*", true, "PIPE", "raw", "c"),
            entity("d.*", false, "COMMA", "raw", "d"),
            entity("e.*", true, "COMMA", "stage", "e"),
        ];
        let plan = ObjectPlan::build(&mut entities, &ControlObjects::default());

        let names: Vec<_> = entities
            .iter()
            .map(|e| e.file_format_name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["FL_FF_1", "FL_FF_2", "FL_FF_3", "FL_FF_2", "FL_FF_4"]);
        assert_eq!(plan.file_formats.values().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(
            plan.databases.iter().cloned().collect::<Vec<_>>(),
            vec!["RAW", "STAGE"]
        );
    }

    #[test]
    fn test_control_database_excluded() {
        let mut entities = vec![
            entity("a.*", true, "COMMA", "file_loader_master_db", "a"),
            entity("b.*", true, "COMMA", "raw", "b"),
        ];
        let plan = ObjectPlan::build(&mut entities, &ControlObjects::default());

        assert_eq!(plan.databases.iter().collect::<Vec<_>>(), vec!["RAW"]);
        // Schemas inside the control database are still created.
        assert_eq!(plan.schemas.len(), 2);
    }

    #[test]
    fn test_named_file_formats() {
        let mut entities = vec![entity("a.*", true, "PIPE", "raw", "a")];
        let control = ControlObjects::default();
        let plan = ObjectPlan::build(&mut entities, &control);

        let named: Vec<_> = plan.named_file_formats(&control).collect();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].0.delimiter, "|");
        assert_eq!(named[0].1, "FL_FF_1");
    }
}
