//! # Schema Reconciliation
//!
//! Makes sure a target list exists and carries every declared column.
//!
//! ## Steps
//!
//! 1. Look the list up by display name, creating it when absent.
//! 2. Read its current columns.
//! 3. Create each declared column that is not present under either its
//!    internal or its display name.
//!
//! Steps 1 and 2 are fatal on failure: writing rows into an unknown schema
//! risks silent field loss. Column creation in step 3 is retried a fixed
//! number of times with a fixed pause; a column that still cannot be created
//! is logged and skipped so the remaining columns are still reconciled. Later
//! writes to that field are dropped by the store.
//!
//! Running the reconciler twice with the same definition creates nothing the
//! second time.

use bridge_traits::error::BridgeError;
use bridge_traits::lists::{ListStore, RemoteColumn};
use bridge_traits::time::Sleeper;
use core_runtime::config::EngineConfig;
use core_runtime::events::LogSink;
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::model::{ListDefinition, ListRef};

/// Result of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredList {
    pub list_ref: ListRef,
    /// The list did not exist and was created by this run
    pub created: bool,
    /// Columns added by this run
    pub created_columns: Vec<String>,
    /// Declared columns that could not be created
    pub missing_columns: Vec<String>,
}

impl EnsuredList {
    pub fn is_complete(&self) -> bool {
        self.missing_columns.is_empty()
    }
}

pub struct SchemaReconciler<'a> {
    store: &'a dyn ListStore,
    sleeper: &'a dyn Sleeper,
    site_id: &'a str,
    attempts: u32,
    delay: Duration,
}

impl<'a> SchemaReconciler<'a> {
    pub fn new(
        store: &'a dyn ListStore,
        sleeper: &'a dyn Sleeper,
        site_id: &'a str,
        attempts: u32,
        delay: Duration,
    ) -> Self {
        Self {
            store,
            sleeper,
            site_id,
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(
        store: &'a dyn ListStore,
        sleeper: &'a dyn Sleeper,
        config: &'a EngineConfig,
    ) -> Self {
        Self::new(
            store,
            sleeper,
            &config.site_id,
            config.column_retry_attempts,
            config.column_retry_delay,
        )
    }

    #[instrument(skip(self, token, definition, log), fields(list = %definition.display_name))]
    pub async fn ensure(
        &self,
        token: &str,
        definition: &ListDefinition,
        log: &dyn LogSink,
    ) -> Result<EnsuredList> {
        let name = definition.display_name.as_str();

        let existing = self
            .store
            .find_list(token, name)
            .await
            .map_err(|e| schema_error(name, "lookup failed", e))?;

        let (list, created) = match existing {
            Some(list) => (list, false),
            None => {
                log.on_log(&format!("List '{}' not found, creating it", name));
                let specs = definition.column_specs();
                let list = self
                    .retry_fixed(&format!("create list '{}'", name), || {
                        self.store.create_list(token, name, &specs)
                    })
                    .await
                    .map_err(|e| schema_error(name, "creation failed", e))?;
                info!(list_id = %list.id, "List created");
                (list, true)
            }
        };

        let remote_columns = self
            .store
            .list_columns(token, &list.id)
            .await
            .map_err(|e| schema_error(name, "column listing failed", e))?;

        let mut created_columns = Vec::new();
        let mut missing_columns = Vec::new();

        for column in &definition.columns {
            if is_present(&remote_columns, &column.name) {
                continue;
            }

            let spec = column.to_spec();
            let outcome = self
                .retry_fixed(&format!("create column '{}'", column.name), || {
                    self.store.create_column(token, &list.id, &spec)
                })
                .await;

            match outcome {
                Ok(_) => {
                    log.on_log(&format!("Created column '{}' on '{}'", column.name, name));
                    created_columns.push(column.name.clone());
                }
                Err(e) => {
                    let error = SyncError::Schema {
                        list: name.to_string(),
                        message: format!("column '{}' could not be created: {}", column.name, e),
                    };
                    warn!(column = %column.name, "{}", error);
                    log.on_log(&format!(
                        "Warning: {}; values for this column will be dropped",
                        error
                    ));
                    missing_columns.push(column.name.clone());
                }
            }
        }

        Ok(EnsuredList {
            list_ref: ListRef {
                site_id: self.site_id.to_string(),
                list_id: list.id,
                display_name: list.display_name,
            },
            created,
            created_columns,
            missing_columns,
        })
    }

    /// Runs `op` up to `self.attempts` times with a fixed pause in between.
    async fn retry_fixed<T, F, Fut>(&self, what: &str, mut op: F) -> std::result::Result<T, BridgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, BridgeError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts => {
                    warn!(attempt, max = self.attempts, error = %e, "{} failed, retrying", what);
                    self.sleeper.sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_present(remote: &[RemoteColumn], name: &str) -> bool {
    remote.iter().any(|column| column.matches(name))
}

fn schema_error(list: &str, what: &str, error: BridgeError) -> SyncError {
    SyncError::Schema {
        list: list.to_string(),
        message: format!("{}: {}", what, error),
    }
}
