//! Write operations and their grouping into composite batches.

use bridge_traits::lists::{FieldMap, ItemWrite, MAX_COMPOSITE_REQUESTS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

/// One intended write.
///
/// Constructors enforce that creates never carry an item id and that
/// updates and deletes always do.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    kind: OperationKind,
    item_id: Option<String>,
    fields: FieldMap,
}

impl Operation {
    pub fn create(fields: FieldMap) -> Self {
        Self {
            kind: OperationKind::Create,
            item_id: None,
            fields,
        }
    }

    pub fn update(item_id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            kind: OperationKind::Update,
            item_id: Some(item_id.into()),
            fields,
        }
    }

    pub fn delete(item_id: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            item_id: Some(item_id.into()),
            fields: FieldMap::new(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub(crate) fn to_write(&self) -> ItemWrite {
        match (&self.kind, &self.item_id) {
            (OperationKind::Update, Some(item_id)) => ItemWrite::Update {
                item_id: item_id.clone(),
                fields: self.fields.clone(),
            },
            (OperationKind::Delete, Some(item_id)) => ItemWrite::Delete {
                item_id: item_id.clone(),
            },
            _ => ItemWrite::Create {
                fields: self.fields.clone(),
            },
        }
    }
}

/// Ordered, size-bounded group of operations submitted as one composite call.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub id: String,
    pub ops: Vec<Operation>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Splits `ops` into `ceil(len / size)` batches, preserving order.
///
/// `max_size` is clamped to `1..=MAX_COMPOSITE_REQUESTS`. Empty input yields
/// no batches.
///
/// ```
/// use core_sync::{chunk, Operation};
///
/// let ops = (0..45).map(|i| Operation::delete(i.to_string())).collect();
/// let batches = chunk(ops, 20);
/// let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
/// assert_eq!(sizes, vec![20, 20, 5]);
/// ```
pub fn chunk(ops: Vec<Operation>, max_size: usize) -> Vec<Batch> {
    chunk_as(ops, max_size, "batch")
}

/// Like [`chunk`], with batch ids of the form `{prefix}-N`.
///
/// Passes of the same job use distinct prefixes so their ids never collide
/// in logs or reports.
pub fn chunk_as(ops: Vec<Operation>, max_size: usize, prefix: &str) -> Vec<Batch> {
    let size = max_size.clamp(1, MAX_COMPOSITE_REQUESTS);
    let mut batches = Vec::with_capacity(ops.len().div_ceil(size));
    let mut ops = ops.into_iter().peekable();

    while ops.peek().is_some() {
        let batch_ops: Vec<Operation> = ops.by_ref().take(size).collect();
        batches.push(Batch {
            id: format!("{}-{}", prefix, batches.len() + 1),
            ops: batch_ops,
        });
    }

    batches
}
