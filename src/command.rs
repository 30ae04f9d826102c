//! Commands a statement can put on the wire.
//!
//! Each statement carries one [`Command`]. The state machine never looks
//! inside it beyond [`Command::reply_shape`] and [`Command::is_noop`]; turning
//! it into bytes is the transport's business.

/// Opaque argument value for a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
}

/// A schema-qualified collection or table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub schema: Option<String>,
    pub name: String,
    /// True for a table, false for a document collection
    pub is_table: bool,
}

impl Target {
    pub fn collection(schema: &str, name: &str) -> Self {
        Self {
            schema: Some(schema.to_string()),
            name: name.to_string(),
            is_table: false,
        }
    }

    pub fn table(schema: &str, name: &str) -> Self {
        Self {
            schema: Some(schema.to_string()),
            name: name.to_string(),
            is_table: true,
        }
    }
}

/// View DDL action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    Create,
    Modify,
    Drop,
}

/// Transaction control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOp {
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    ReleaseSavepoint(String),
    RollbackTo(String),
}

/// A protocol command.
///
/// Criteria and projections are carried as already-built expression text.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `Sql.StmtExecute`
    Sql { stmt: String, args: Vec<Scalar> },
    /// `Crud.Find`
    Find {
        target: Target,
        criteria: Option<String>,
        projection: Vec<String>,
        limit: Option<u64>,
        args: Vec<Scalar>,
    },
    /// `Crud.Insert`. Documents are single-column rows.
    Insert {
        target: Target,
        columns: Vec<String>,
        rows: Vec<Vec<Scalar>>,
        upsert: bool,
    },
    /// `Crud.Update`
    Update {
        target: Target,
        criteria: Option<String>,
        operations: Vec<(String, Scalar)>,
        args: Vec<Scalar>,
    },
    /// `Crud.Delete`
    Delete {
        target: Target,
        criteria: Option<String>,
        limit: Option<u64>,
        args: Vec<Scalar>,
    },
    /// `Crud.CreateView` / `ModifyView` / `DropView`
    View {
        action: ViewAction,
        target: Target,
        definition: Option<Box<Command>>,
    },
    /// `Prepare.Execute`
    PreparedExecute { stmt_id: u32, args: Vec<Scalar> },
    /// `Prepare.Deallocate`
    PrepareDeallocate { stmt_id: u32 },
    /// Transaction control statement
    Transaction(TransactionOp),
    /// Admin command (`list_objects`, `create_collection`, ...)
    Admin {
        name: String,
        args: Vec<(String, Scalar)>,
    },
}

/// Which reply phase follows a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Plain OK or error
    Ok,
    /// Metadata, rows and a closing OK, possibly repeated; a pure OK is
    /// also accepted
    ResultSet,
}

impl Command {
    /// Shorthand for an argument-less SQL statement.
    pub fn sql(stmt: impl Into<String>) -> Self {
        Command::Sql {
            stmt: stmt.into(),
            args: Vec::new(),
        }
    }

    pub fn reply_shape(&self) -> ReplyShape {
        match self {
            Command::Sql { .. }
            | Command::Find { .. }
            | Command::PreparedExecute { .. }
            | Command::Admin { .. } => ReplyShape::ResultSet,
            Command::Insert { .. }
            | Command::Update { .. }
            | Command::Delete { .. }
            | Command::View { .. }
            | Command::PrepareDeallocate { .. }
            | Command::Transaction(_) => ReplyShape::Ok,
        }
    }

    /// Returns true if there is nothing to send.
    pub fn is_noop(&self) -> bool {
        match self {
            Command::Insert { rows, .. } => rows.is_empty(),
            _ => false,
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Sql { .. } => "sql",
            Command::Find { .. } => "find",
            Command::Insert { .. } => "insert",
            Command::Update { .. } => "update",
            Command::Delete { .. } => "delete",
            Command::View { .. } => "view",
            Command::PreparedExecute { .. } => "prepared-execute",
            Command::PrepareDeallocate { .. } => "prepare-deallocate",
            Command::Transaction(_) => "transaction",
            Command::Admin { .. } => "admin",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_shapes() {
        assert_eq!(Command::sql("SELECT 1").reply_shape(), ReplyShape::ResultSet);
        assert_eq!(
            Command::Transaction(TransactionOp::Commit).reply_shape(),
            ReplyShape::Ok
        );
        assert_eq!(
            Command::PrepareDeallocate { stmt_id: 3 }.reply_shape(),
            ReplyShape::Ok
        );
    }

    #[test]
    fn empty_insert_is_noop() {
        let insert = Command::Insert {
            target: Target::collection("test", "docs"),
            columns: Vec::new(),
            rows: Vec::new(),
            upsert: false,
        };
        assert!(insert.is_noop());
        assert!(!Command::sql("DO 1").is_noop());
    }
}
