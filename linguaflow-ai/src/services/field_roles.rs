//! Front/back field role resolution
//!
//! Note types name their fields freely ("Front", "Question", "Inglês", ...).
//! The resolver picks which positions play the front and back roles from two
//! ordered candidate tables.

use std::collections::HashMap;

use crate::backend::SchemaId;

/// Field names that mark the front (prompt) side
pub const FRONT_CANDIDATES: [&str; 8] = [
    "front",
    "text",
    "question",
    "word",
    "expression",
    "english",
    "inglês",
    "ingles",
];

/// Field names that mark the back (answer) side
pub const BACK_CANDIDATES: [&str; 6] = [
    "back",
    "answer",
    "meaning",
    "translation",
    "portuguese",
    "português",
];

/// Resolved field positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRoles {
    pub front: usize,
    pub back: usize,
}

/// Map a schema's field names to front/back indices
///
/// Whenever two or more fields exist the two indices differ. A single-field
/// schema uses that field for both roles.
pub fn resolve_field_roles<S: AsRef<str>>(field_names: &[S]) -> FieldRoles {
    let names: Vec<String> = field_names
        .iter()
        .map(|name| name.as_ref().to_lowercase())
        .collect();
    let count = names.len();

    let front = names
        .iter()
        .position(|name| FRONT_CANDIDATES.contains(&name.as_str()))
        .unwrap_or(0);

    let back = names
        .iter()
        .enumerate()
        .find(|(index, name)| *index != front && BACK_CANDIDATES.contains(&name.as_str()))
        .map(|(index, _)| index)
        .unwrap_or(if count >= 2 { 1 } else { front });

    let back = if back == front && count >= 2 {
        if front == 0 {
            1
        } else {
            0
        }
    } else {
        back
    };

    FieldRoles { front, back }
}

/// Per-invocation memo of resolved roles, keyed by schema id
#[derive(Debug, Default)]
pub struct FieldRoleCache {
    roles: HashMap<SchemaId, FieldRoles>,
}

impl FieldRoleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, schema_id: SchemaId) -> Option<FieldRoles> {
        self.roles.get(&schema_id).copied()
    }

    pub fn insert(&mut self, schema_id: SchemaId, roles: FieldRoles) {
        self.roles.insert(schema_id, roles);
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
