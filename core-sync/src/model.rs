//! # Sync Data Model
//!
//! Declarative description of a target list and the rows written into it.
//!
//! - [`ListDefinition`]: display name, [`ColumnDef`]s and optional [`UniqueKey`]
//! - [`Row`]: ordered column → scalar mapping produced by callers
//! - [`ListRef`]: a list resolved on the remote store
//!
//! Rows are validated against the declared columns before any operation is
//! built from them, so malformed data is rejected locally instead of at the
//! remote store.

use bridge_traits::lists::{ColumnSpec, FieldMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::error::{Result, SyncError};

pub use bridge_traits::lists::ColumnKind;

/// Built-in housekeeping column present on every generic list.
pub const TITLE_FIELD: &str = "Title";

/// Separator between unique key parts, e.g. `A|01|2024`.
pub const KEY_SEPARATOR: &str = "|";

/// Identifies a resolved remote list. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListRef {
    pub site_id: String,
    pub list_id: String,
    pub display_name: String,
}

impl fmt::Display for ListRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({})", self.display_name, self.list_id)
    }
}

/// Declared column of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    /// Rows must carry a non-empty value for this column
    #[serde(default)]
    pub required: bool,
}

impl ColumnDef {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Text,
            required: false,
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Number,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn to_spec(&self) -> ColumnSpec {
        ColumnSpec {
            name: self.name.clone(),
            display_name: None,
            kind: self.kind,
        }
    }
}

/// Scalar cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Converts a JSON scalar. Booleans, nulls, arrays and objects yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }

    /// True for blank text; numbers are never empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    /// Canonical text used inside unique keys. Integral numbers print
    /// without a fractional part so `2024` and `2024.0` produce the same key.
    pub fn key_part(&self) -> String {
        match self {
            FieldValue::Text(s) => s.trim().to_string(),
            FieldValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            FieldValue::Number(n) => n.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Number(_) => write!(f, "{}", self.key_part()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Number(f64::from(value))
    }
}

/// One row of caller data.
///
/// Field order is preserved. The title is kept apart from business fields
/// because the engine may synthesize it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    fields: Vec<(String, FieldValue)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    /// Remote item id, set on rows read back from the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    item_id: Option<String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Row::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets a field, replacing an existing value in place.
    ///
    /// A field named `Title` sets the title instead.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();

        if name == TITLE_FIELD {
            self.title = Some(value.to_string());
            return;
        }

        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    /// Payload sent to the store: every field plus `Title` when set.
    pub fn to_field_map(&self) -> FieldMap {
        let mut map = FieldMap::new();
        if let Some(title) = &self.title {
            map.insert(TITLE_FIELD.to_string(), Value::String(title.clone()));
        }
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        map
    }

    /// Builds a row from a JSON object. Non-scalar values are rejected.
    pub fn from_json_object(object: &FieldMap) -> Result<Self> {
        let mut row = Row::new();
        for (name, value) in object {
            let value = FieldValue::from_json(value).ok_or_else(|| {
                SyncError::InvalidInput(format!(
                    "Field '{}' must be a string or a number, got {}",
                    name, value
                ))
            })?;
            row.set(name.clone(), value);
        }
        Ok(row)
    }

    /// Builds a row from a remote item's fields.
    ///
    /// Fields listed in `skip` and non-scalar values are dropped.
    pub(crate) fn from_remote(item_id: &str, fields: &FieldMap, skip: &dyn Fn(&str) -> bool) -> Self {
        let mut row = Row {
            item_id: Some(item_id.to_string()),
            ..Row::default()
        };

        for (name, value) in fields {
            if skip(name) {
                continue;
            }
            if let Some(value) = FieldValue::from_json(value) {
                row.set(name.clone(), value);
            }
        }
        row
    }
}

/// Ordered column names whose joined values identify one logical row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueKey(Vec<String>);

impl UniqueKey {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    /// Key value of a local row.
    ///
    /// # Errors
    ///
    /// Returns the names of key columns that are absent or blank.
    pub fn value_for_row(&self, row: &Row) -> std::result::Result<String, Vec<String>> {
        let mut parts = Vec::with_capacity(self.0.len());
        let mut missing = Vec::new();

        for column in &self.0 {
            let value = if column == TITLE_FIELD {
                row.title().map(|t| FieldValue::Text(t.to_string()))
            } else {
                row.get(column).cloned()
            };

            match value {
                Some(value) if !value.is_empty() => parts.push(value.key_part()),
                _ => missing.push(column.clone()),
            }
        }

        if missing.is_empty() {
            Ok(parts.join(KEY_SEPARATOR))
        } else {
            Err(missing)
        }
    }

    /// Key value of a remote item, `None` when any part is missing.
    pub fn value_for_fields(&self, fields: &FieldMap) -> Option<String> {
        let parts = self
            .0
            .iter()
            .map(|column| {
                fields
                    .get(column)
                    .and_then(FieldValue::from_json)
                    .filter(|value| !value.is_empty())
                    .map(|value| value.key_part())
            })
            .collect::<Option<Vec<_>>>()?;

        Some(parts.join(KEY_SEPARATOR))
    }
}

/// Declarative description of a target list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDefinition {
    pub display_name: String,
    pub columns: Vec<ColumnDef>,
    /// Required for upsert; absent for lists synced by full replace
    #[serde(default)]
    pub unique_key: Option<UniqueKey>,
}

impl ListDefinition {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            columns: Vec::new(),
            unique_key: None,
        }
    }

    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_unique_key(mut self, key: UniqueKey) -> Self {
        self.unique_key = Some(key);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Checks the definition itself.
    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(SyncError::InvalidInput(
                "List display name cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.name.trim().is_empty() {
                return Err(SyncError::InvalidInput(format!(
                    "List '{}' declares a column with an empty name",
                    self.display_name
                )));
            }
            if column.name == TITLE_FIELD {
                return Err(SyncError::InvalidInput(format!(
                    "'{}' is built in and cannot be declared",
                    TITLE_FIELD
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(SyncError::InvalidInput(format!(
                    "Column '{}' is declared twice",
                    column.name
                )));
            }
        }

        if let Some(key) = &self.unique_key {
            if key.columns().is_empty() {
                return Err(SyncError::InvalidInput(
                    "Unique key must name at least one column".to_string(),
                ));
            }
            for column in key.columns() {
                if column != TITLE_FIELD && self.column(column).is_none() {
                    return Err(SyncError::InvalidInput(format!(
                        "Unique key column '{}' is not declared on list '{}'",
                        column, self.display_name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Validates a row against the declared columns.
    ///
    /// Returns the row with numeric strings in `Number` columns coerced to
    /// numbers and numbers in `Text` columns rendered as text, or a
    /// human-readable rejection reason. NaN and infinities are rejected
    /// since they cannot be sent as JSON numbers.
    pub fn validate_row(&self, row: &Row) -> std::result::Result<Row, String> {
        let mut checked = Row {
            fields: Vec::with_capacity(row.len()),
            title: row.title.clone(),
            item_id: row.item_id.clone(),
        };

        for (name, value) in row.fields() {
            let column = self
                .column(name)
                .ok_or_else(|| format!("unknown column '{}'", name))?;

            let value = match (column.kind, value) {
                // Blank cells are left out of the payload
                (ColumnKind::Number, FieldValue::Text(text)) if text.trim().is_empty() => {
                    continue;
                }
                (ColumnKind::Number, FieldValue::Text(text)) => {
                    match text.trim().parse::<f64>() {
                        Ok(parsed) if parsed.is_finite() => FieldValue::Number(parsed),
                        _ => {
                            return Err(format!(
                                "column '{}' expects a number, got '{}'",
                                name, text
                            ))
                        }
                    }
                }
                (ColumnKind::Number, FieldValue::Number(n)) if !n.is_finite() => {
                    return Err(format!("column '{}' expects a number, got '{}'", name, n));
                }
                (ColumnKind::Text, FieldValue::Number(_)) => FieldValue::Text(value.key_part()),
                _ => value.clone(),
            };

            checked.fields.push((name.to_string(), value));
        }

        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.required)
            .filter(|c| checked.get(&c.name).map_or(true, FieldValue::is_empty))
            .map(|c| c.name.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(format!("missing required column(s): {}", missing.join(", ")));
        }

        Ok(checked)
    }

    pub(crate) fn column_specs(&self) -> Vec<ColumnSpec> {
        self.columns.iter().map(ColumnDef::to_spec).collect()
    }
}
