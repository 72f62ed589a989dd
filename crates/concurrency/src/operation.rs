//! Operations carried by tracked transactions
//!
//! The tracker only cares about an operation's kind and the size of its
//! encoded request. Execution is abstracted behind the `Operation` trait so
//! write and schema-change logic can live with the rest of the tablet.
//!
//! ## Format
//!
//! Requests are encoded with MessagePack (`rmp-serde`). The encoded length is
//! the basis for the transaction's memory footprint.

use serde::{Deserialize, Serialize};
use tablet_core::{TabletError, TabletResult, TxnKind};

/// Unit of work executed by a transaction driver
pub trait Operation: Send + Sync {
    /// Class of operation, fixed for the operation's lifetime
    fn kind(&self) -> TxnKind;

    /// Validate and acquire whatever the operation needs before applying
    fn prepare(&self) -> TabletResult<()>;

    /// Apply the operation
    fn apply(&self) -> TabletResult<()>;

    /// One-line description for diagnostics
    fn describe(&self) -> String;

    /// Encoded request, used to estimate the memory footprint
    fn encoded_request(&self) -> TabletResult<Vec<u8>>;
}

fn encode<T: Serialize>(request: &T) -> TabletResult<Vec<u8>> {
    rmp_serde::to_vec(request).map_err(|e| TabletError::serialization(e.to_string()))
}

/// A single row mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOperation {
    /// Insert a new row
    Insert {
        /// Encoded primary key
        key: Vec<u8>,
        /// Encoded row value
        value: Vec<u8>,
    },
    /// Overwrite an existing row
    Update {
        /// Encoded primary key
        key: Vec<u8>,
        /// Encoded row value
        value: Vec<u8>,
    },
    /// Remove a row
    Delete {
        /// Encoded primary key
        key: Vec<u8>,
    },
}

/// Request body of a write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Target table
    pub table: String,
    /// Row mutations, applied in order
    pub rows: Vec<RowOperation>,
}

/// Batch of row mutations
#[derive(Debug, Clone)]
pub struct WriteOperation {
    request: WriteRequest,
}

impl WriteOperation {
    /// Create a write against `table`
    pub fn new(table: impl Into<String>, rows: Vec<RowOperation>) -> Self {
        WriteOperation {
            request: WriteRequest {
                table: table.into(),
                rows,
            },
        }
    }

    /// Request body
    pub fn request(&self) -> &WriteRequest {
        &self.request
    }
}

impl Operation for WriteOperation {
    fn kind(&self) -> TxnKind {
        TxnKind::Write
    }

    fn prepare(&self) -> TabletResult<()> {
        if self.request.rows.is_empty() {
            return Err(TabletError::invalid_input(format!(
                "write to table '{}' has no row operations",
                self.request.table
            )));
        }
        Ok(())
    }

    fn apply(&self) -> TabletResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "WriteOperation(table={}, rows={})",
            self.request.table,
            self.request.rows.len()
        )
    }

    fn encoded_request(&self) -> TabletResult<Vec<u8>> {
        encode(&self.request)
    }
}

/// A column change within a schema alteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnChange {
    /// Add a nullable column
    Add {
        /// Column name
        name: String,
        /// Column type name
        data_type: String,
    },
    /// Drop a column
    Drop {
        /// Column name
        name: String,
    },
    /// Rename a column
    Rename {
        /// Existing name
        from: String,
        /// New name
        to: String,
    },
}

/// Request body of a schema alteration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterSchemaRequest {
    /// Target table
    pub table: String,
    /// Schema version the change produces
    pub schema_version: u32,
    /// Column changes, applied in order
    pub changes: Vec<ColumnChange>,
}

/// Schema change
#[derive(Debug, Clone)]
pub struct AlterSchemaOperation {
    request: AlterSchemaRequest,
    current_version: u32,
}

impl AlterSchemaOperation {
    /// Create a schema change moving `table` from `current_version` to `schema_version`
    pub fn new(
        table: impl Into<String>,
        current_version: u32,
        schema_version: u32,
        changes: Vec<ColumnChange>,
    ) -> Self {
        AlterSchemaOperation {
            request: AlterSchemaRequest {
                table: table.into(),
                schema_version,
                changes,
            },
            current_version,
        }
    }

    /// Request body
    pub fn request(&self) -> &AlterSchemaRequest {
        &self.request
    }
}

impl Operation for AlterSchemaOperation {
    fn kind(&self) -> TxnKind {
        TxnKind::AlterSchema
    }

    fn prepare(&self) -> TabletResult<()> {
        if self.request.schema_version <= self.current_version {
            return Err(TabletError::aborted(format!(
                "schema version {} is not newer than current version {}",
                self.request.schema_version, self.current_version
            )));
        }
        Ok(())
    }

    fn apply(&self) -> TabletResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "AlterSchemaOperation(table={}, version={}->{}, changes={})",
            self.request.table,
            self.current_version,
            self.request.schema_version,
            self.request.changes.len()
        )
    }

    fn encoded_request(&self) -> TabletResult<Vec<u8>> {
        encode(&self.request)
    }
}

/// Operation that does nothing
///
/// Carries an empty request, so its footprint is the base overhead plus a
/// few bytes of encoding.
#[derive(Debug, Clone, Copy)]
pub struct NoOpOperation {
    kind: TxnKind,
}

impl NoOpOperation {
    /// No-op reported under `kind`
    pub fn new(kind: TxnKind) -> Self {
        NoOpOperation { kind }
    }
}

impl Default for NoOpOperation {
    fn default() -> Self {
        NoOpOperation::new(TxnKind::Write)
    }
}

impl Operation for NoOpOperation {
    fn kind(&self) -> TxnKind {
        self.kind
    }

    fn prepare(&self) -> TabletResult<()> {
        Ok(())
    }

    fn apply(&self) -> TabletResult<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "NoOp".to_string()
    }

    fn encoded_request(&self) -> TabletResult<Vec<u8>> {
        encode(&())
    }
}
