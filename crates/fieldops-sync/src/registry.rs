// File: fieldops-sync/src/registry.rs
// Purpose: Entity type registry mapping names to storage accessors and schemas

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::models::Payload;
use crate::store::EntityStore;

/// Kind of a declared payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any JSON value; replaced wholesale on merge
    Scalar,
    /// String field; mergeable text fields participate in operational transform
    Text,
    /// Array field; mergeable list fields participate in operational transform
    List,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub mergeable: bool,
}

/// Declared payload shape for one entity type. Deltas are validated against
/// this at the boundary, before any payload reaches the detector or resolver.
#[derive(Debug, Clone, Default)]
pub struct EntitySchema {
    fields: HashMap<String, FieldSpec>,
}

impl EntitySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(mut self, name: &str) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldSpec {
                kind: FieldKind::Scalar,
                mergeable: false,
            },
        );
        self
    }

    pub fn text(mut self, name: &str) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldSpec {
                kind: FieldKind::Text,
                mergeable: false,
            },
        );
        self
    }

    /// Free-text field merged via operational transform on conflict
    pub fn mergeable_text(mut self, name: &str) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldSpec {
                kind: FieldKind::Text,
                mergeable: true,
            },
        );
        self
    }

    pub fn list(mut self, name: &str) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldSpec {
                kind: FieldKind::List,
                mergeable: false,
            },
        );
        self
    }

    /// Ordered list field merged via operational transform on conflict
    pub fn mergeable_list(mut self, name: &str) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldSpec {
                kind: FieldKind::List,
                mergeable: true,
            },
        );
        self
    }

    pub fn is_mergeable_text(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|f| f.mergeable && f.kind == FieldKind::Text)
    }

    pub fn is_mergeable_list(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|f| f.mergeable && f.kind == FieldKind::List)
    }

    /// Validate a delta payload: unknown fields and kind mismatches are
    /// rejected before the payload reaches merge logic.
    pub fn validate(&self, data: &Payload) -> Result<()> {
        for (name, value) in data {
            let spec = self
                .fields
                .get(name)
                .ok_or_else(|| SyncError::validation(format!("unknown field: {name}")))?;

            let ok = match spec.kind {
                FieldKind::Scalar => true,
                FieldKind::Text => matches!(value, Value::String(_) | Value::Null),
                FieldKind::List => matches!(value, Value::Array(_) | Value::Null),
            };

            if !ok {
                return Err(SyncError::validation(format!(
                    "field {name} has the wrong kind"
                )));
            }
        }

        Ok(())
    }
}

/// One registered entity type.
pub struct RegisteredEntity {
    pub store: Arc<dyn EntityStore>,
    pub schema: EntitySchema,
}

impl std::fmt::Debug for RegisteredEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredEntity")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Registry of entity types, built once at startup and injected explicitly.
/// No runtime mutation: callers move it behind an `Arc` after registration.
#[derive(Default)]
pub struct EntityRegistry {
    entries: HashMap<String, RegisteredEntity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        store: Arc<dyn EntityStore>,
        schema: EntitySchema,
    ) {
        self.entries
            .insert(name.into(), RegisteredEntity { store, schema });
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredEntity> {
        self.entries
            .get(name)
            .ok_or_else(|| SyncError::not_found(format!("unknown entity type: {name}")))
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
