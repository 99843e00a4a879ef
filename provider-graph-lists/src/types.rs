//! Graph list API wire types
//!
//! Data structures for the list, column, item and `$batch` payloads.

use bridge_traits::lists::{ColumnKind, ColumnSpec, FieldMap, RemoteColumn, RemoteItem, RemoteList};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Collection envelope returned by every list endpoint
#[derive(Debug, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,

    /// Absolute URL of the next page, absent on the last page
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// List resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResource {
    pub id: String,

    #[serde(default)]
    pub display_name: String,
}

impl From<ListResource> for RemoteList {
    fn from(list: ListResource) -> Self {
        RemoteList {
            id: list.id,
            display_name: list.display_name,
        }
    }
}

/// Body of `POST /lists`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListRequest {
    pub display_name: String,
    pub columns: Vec<ColumnDefinition>,
    pub list: ListTemplate,
}

#[derive(Debug, Serialize)]
pub struct ListTemplate {
    pub template: String,
}

impl Default for ListTemplate {
    fn default() -> Self {
        Self {
            template: "genericList".to_string(),
        }
    }
}

/// Marker facet for text columns (`"text": {}`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextColumn {}

/// Marker facet for number columns (`"number": {}`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumberColumn {}

/// Column definition resource
///
/// The column type is expressed by which facet is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextColumn>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<NumberColumn>,
}

impl ColumnDefinition {
    pub fn kind(&self) -> Option<ColumnKind> {
        if self.number.is_some() {
            Some(ColumnKind::Number)
        } else if self.text.is_some() {
            Some(ColumnKind::Text)
        } else {
            None
        }
    }
}

impl From<&ColumnSpec> for ColumnDefinition {
    fn from(spec: &ColumnSpec) -> Self {
        let (text, number) = match spec.kind {
            ColumnKind::Text => (Some(TextColumn {}), None),
            ColumnKind::Number => (None, Some(NumberColumn {})),
        };

        ColumnDefinition {
            name: spec.name.clone(),
            display_name: Some(
                spec.display_name
                    .clone()
                    .unwrap_or_else(|| spec.name.clone()),
            ),
            text,
            number,
        }
    }
}

impl From<ColumnDefinition> for RemoteColumn {
    fn from(column: ColumnDefinition) -> Self {
        let kind = column.kind();
        RemoteColumn {
            name: column.name,
            display_name: column.display_name,
            kind,
        }
    }
}

/// List item resource with expanded fields
#[derive(Debug, Clone, Deserialize)]
pub struct ItemResource {
    pub id: String,

    #[serde(default)]
    pub fields: FieldMap,
}

impl From<ItemResource> for RemoteItem {
    fn from(item: ItemResource) -> Self {
        RemoteItem {
            id: item.id,
            fields: item.fields,
        }
    }
}

/// Body of `POST /$batch`
#[derive(Debug, Serialize)]
pub struct BatchRequest {
    pub requests: Vec<BatchRequestEntry>,
}

/// One sub-request; `url` is relative to the API version root
#[derive(Debug, Serialize)]
pub struct BatchRequestEntry {
    pub id: String,
    pub method: String,
    pub url: String,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// `$batch` response envelope
#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub responses: Vec<BatchResponseEntry>,
}

#[derive(Debug, Deserialize)]
pub struct BatchResponseEntry {
    pub id: String,
    pub status: u16,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body: Option<Value>,
}

impl BatchResponseEntry {
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
            .and_then(|(_, value)| value.trim().parse().ok())
    }

    /// `error.message` from the sub-response body, if present
    pub fn error_message(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|body| body.pointer("/error/message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Error envelope of a failed API call
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_with_next_link() {
        let json = json!({
            "value": [{ "id": "1", "fields": { "Title": "A" } }],
            "@odata.nextLink": "https://graph.example/next"
        });

        let page: Collection<ItemResource> = serde_json::from_value(json).unwrap();
        assert_eq!(page.value.len(), 1);
        assert_eq!(page.value[0].fields["Title"], "A");
        assert_eq!(page.next_link.as_deref(), Some("https://graph.example/next"));
    }

    #[test]
    fn test_column_definition_facets() {
        let spec = ColumnSpec {
            name: "Value".to_string(),
            display_name: None,
            kind: ColumnKind::Number,
        };

        let json = serde_json::to_value(ColumnDefinition::from(&spec)).unwrap();
        assert_eq!(
            json,
            json!({ "name": "Value", "displayName": "Value", "number": {} })
        );
    }

    #[test]
    fn test_unknown_column_type_has_no_kind() {
        let column: ColumnDefinition = serde_json::from_value(json!({
            "name": "Created",
            "displayName": "Created",
            "dateTime": { "format": "dateTime" }
        }))
        .unwrap();

        let remote = RemoteColumn::from(column);
        assert_eq!(remote.kind, None);
        assert!(remote.matches("Created"));
    }

    #[test]
    fn test_batch_response_entry_error_details() {
        let entry: BatchResponseEntry = serde_json::from_value(json!({
            "id": "2",
            "status": 429,
            "headers": { "Retry-After": "3" },
            "body": { "error": { "code": "tooManyRequests", "message": "Slow down" } }
        }))
        .unwrap();

        assert_eq!(entry.retry_after_secs(), Some(3));
        assert_eq!(entry.error_message().as_deref(), Some("Slow down"));
    }
}
