//! Create-versus-update decisions from a composite unique key.

use bridge_traits::lists::{FieldMap, RemoteItem};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::chunker::Operation;
use crate::model::{Row, UniqueKey, TITLE_FIELD};

/// Unique key value → remote item id.
///
/// Keys shared by more than one remote item are left out, so rows carrying
/// them fall back to Create instead of overwriting an arbitrary record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingIndex {
    items: HashMap<String, String>,
    ambiguous: HashSet<String>,
}

impl ExistingIndex {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ambiguous(&self) -> &HashSet<String> {
        &self.ambiguous
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.items
    }
}

/// Operations produced for a row set plus the rows that were rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub operations: Vec<Operation>,
    /// `(position in the input slice, reason)`
    pub rejected: Vec<(usize, String)>,
}

impl Resolution {
    pub fn creates(&self) -> usize {
        self.count(crate::chunker::OperationKind::Create)
    }

    pub fn updates(&self) -> usize {
        self.count(crate::chunker::OperationKind::Update)
    }

    fn count(&self, kind: crate::chunker::OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind() == kind).count()
    }
}

pub struct UpsertResolver<'a> {
    key: &'a UniqueKey,
}

impl<'a> UpsertResolver<'a> {
    pub fn new(key: &'a UniqueKey) -> Self {
        Self { key }
    }

    /// Builds the key index of a list snapshot.
    ///
    /// Items missing any key part are ignored.
    pub fn index_existing(&self, items: &[RemoteItem]) -> ExistingIndex {
        let mut index = ExistingIndex::default();

        for item in items {
            let Some(key) = self.key.value_for_fields(&item.fields) else {
                continue;
            };

            if index.ambiguous.contains(&key) {
                continue;
            }

            if index.items.remove(&key).is_some() {
                warn!(key = %key, "Unique key matches several remote items, rows will be created");
                index.ambiguous.insert(key);
                continue;
            }

            index.items.insert(key, item.id.clone());
        }

        debug!(
            keys = index.items.len(),
            ambiguous = index.ambiguous.len(),
            "Indexed existing items"
        );
        index
    }

    /// Emits Update for rows whose key is in `existing`, Create otherwise.
    ///
    /// Rows missing a key part are rejected and produce no operation.
    pub fn resolve(&self, existing: &HashMap<String, String>, rows: &[Row]) -> Resolution {
        let mut resolution = Resolution::default();

        for (position, row) in rows.iter().enumerate() {
            let key = match self.key.value_for_row(row) {
                Ok(key) => key,
                Err(missing) => {
                    resolution.rejected.push((
                        position,
                        format!("missing unique key field(s): {}", missing.join(", ")),
                    ));
                    continue;
                }
            };

            let fields = payload(row, Some(&key));
            let operation = match existing.get(&key) {
                Some(item_id) => Operation::update(item_id.clone(), fields),
                None => Operation::create(fields),
            };
            resolution.operations.push(operation);
        }

        resolution
    }
}

/// Row payload with `Title` synthesized from the key when the row has none.
pub(crate) fn payload(row: &Row, key_value: Option<&str>) -> FieldMap {
    let mut fields = row.to_field_map();
    if row.title().is_none() {
        if let Some(key) = key_value {
            fields.insert(TITLE_FIELD.to_string(), Value::String(key.to_string()));
        }
    }
    fields
}
