use tabula_schema::SchemaError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::migrations::LogError;
use crate::plan::PlanError;

/// A filter or query that does not fit the schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("model `{model}` has no field `{field}`")]
    FieldNotFound { model: String, field: String },

    #[error("cannot filter `{model}.{field}`: {reason}")]
    TypeMismatch {
        model: String,
        field: String,
        reason: String,
    },

    #[error("unknown model `{0}`")]
    UnknownModel(String),

    #[error("malformed filter: {0}")]
    MalformedFilter(String),
}

/// Record data the executor refused, or a write that hit the wrong number of rows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("missing required field `{model}.{field}`")]
    MissingField { model: String, field: String },

    #[error("no `{model}` record matches the filter")]
    RecordNotFound { model: String },

    #[error("{matched} `{model}` records match a filter that must target exactly one")]
    AmbiguousTarget { model: String, matched: usize },

    #[error("model `{model}` has no field `{field}`")]
    UnknownField { model: String, field: String },

    #[error("invalid value for `{model}.{field}`: {reason}")]
    InvalidValue {
        model: String,
        field: String,
        reason: String,
    },
}

/// Failures reported by a store. Never retried.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("constraint `{constraint}` violated: {message}")]
    ConstraintViolation { constraint: String, message: String },

    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("table `{table}` has no column `{column}`")]
    UnknownColumn { table: String, column: String },

    #[error("cannot decode column `{column}`: {message}")]
    Decode { column: String, message: String },

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// Classify a Postgres error: integrity violations become
    /// [`StoreError::ConstraintViolation`], everything else stays as is.
    pub fn from_postgres(err: tokio_postgres::Error) -> Self {
        use tokio_postgres::error::SqlState;

        let Some(db) = err.as_db_error() else {
            return StoreError::Postgres(err);
        };
        let code = db.code();
        let integrity = [
            SqlState::UNIQUE_VIOLATION,
            SqlState::FOREIGN_KEY_VIOLATION,
            SqlState::NOT_NULL_VIOLATION,
            SqlState::CHECK_VIOLATION,
        ];
        if !integrity.contains(code) {
            return StoreError::Postgres(err);
        }
        let constraint = db
            .constraint()
            .map(str::to_string)
            .or_else(|| db.column().map(|c| format!("{c} NOT NULL")))
            .unwrap_or_default();
        StoreError::ConstraintViolation {
            constraint,
            message: db.message().to_string(),
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A migration step failed; the whole migration was rolled back.
    #[error("migration {version} failed at step {index} ({step}): {source}")]
    Migration {
        version: String,
        index: usize,
        step: String,
        #[source]
        source: StoreError,
    },

    /// An item of a transactional `create_many` failed; nothing was written.
    #[error("create_many item {index} failed: {source}")]
    CreateMany {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// The store error underneath, if any.
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            Error::Store(err) => Some(err),
            Error::Migration { source, .. } => Some(source),
            Error::CreateMany { source, .. } => source.as_store_error(),
            _ => None,
        }
    }

    /// The data error underneath, if any.
    pub fn as_data_error(&self) -> Option<&DataError> {
        match self {
            Error::Data(err) => Some(err),
            Error::CreateMany { source, .. } => source.as_data_error(),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
