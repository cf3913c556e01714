//! Field-name to field-type mapping for the active index.

use std::collections::HashMap;

use soc_protocol::FieldType;
use soc_protocol::Schema;
use soc_protocol::SchemaField;

/// Holds the schema of exactly one index. Never edited in place: an index
/// change swaps in a whole new schema and bumps [`SchemaCatalog::generation`]
/// so holders of an older generation can tell their view is stale.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    index: Option<String>,
    fields: Vec<SchemaField>,
    by_name: HashMap<String, FieldType>,
    generation: u64,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schema(schema: Schema) -> Self {
        let mut catalog = Self::new();
        catalog.replace(schema);
        catalog
    }

    /// Swap in the schema for a (possibly different) index.
    pub fn replace(&mut self, schema: Schema) {
        self.by_name = schema
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.field_type))
            .collect();
        self.fields = schema.fields;
        self.index = Some(schema.index);
        self.generation = self.generation.wrapping_add(1);
        tracing::debug!(
            "schema catalog now holds {} fields for {:?} (generation {})",
            self.fields.len(),
            self.index,
            self.generation
        );
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.by_name.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<SchemaField> {
        self.field_type(name)
            .map(|field_type| SchemaField::new(name, field_type))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
