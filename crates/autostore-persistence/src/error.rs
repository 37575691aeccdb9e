//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas del dominio de persistencia.

use autostore_core::{IdentityError, StoreError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation on {constraint}: {message}")]
    UniqueViolation { constraint: String, message: String },
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("identity conflict: {0}")]
    IdentityConflict(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

/// Restricciones cuya violación puede venir de un duplicado concurrente benigno
/// (otro escritor insertó la misma geometría / el mismo cálculo).
pub const DEDUP_CONSTRAINTS: [&str; 3] = ["geometry_hash_key",
                                          "calculation_hash_name_value_key",
                                          "calculation_hash_calculation_name_key"];

impl PersistenceError {
    /// ¿Violación de unicidad sobre una clave de deduplicación?
    pub fn is_dedup_race(&self) -> bool {
        matches!(self, Self::UniqueViolation { constraint, .. } if DEDUP_CONSTRAINTS.contains(&constraint.as_str()))
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation { constraint: info.constraint_name().unwrap_or("unknown").to_string(),
                                                                              message: info.message().to_string() },
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Unknown(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::AlreadyInTransaction => Self::Unknown("already in transaction".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::QueryBuilderError(e) => Self::Unknown(format!("query builder: {e}")),
            DieselError::InvalidCString(e) => Self::Unknown(format!("invalid cstring: {e}")),
            DieselError::RollbackTransaction => Self::Unknown("rollback transaction".into()),
            DieselError::NotInTransaction => Self::Unknown("not in transaction".into()),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Identity(IdentityError::Serialization(e.to_string()))
    }
}

impl From<StoreError> for PersistenceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Identity(inner) => Self::Identity(inner),
            StoreError::IdentityConflict(msg) => Self::IdentityConflict(msg),
            StoreError::Backend(msg) => Self::Unknown(msg),
        }
    }
}

/// Frontera con el contrato del core: las violaciones de unicidad que no se
/// recuperaron localmente son conflictos de identidad.
impl From<PersistenceError> for StoreError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Identity(inner) => Self::Identity(inner),
            PersistenceError::IdentityConflict(msg) => Self::IdentityConflict(msg),
            unique @ PersistenceError::UniqueViolation { .. } => Self::IdentityConflict(unique.to_string()),
            other => Self::Backend(other.to_string()),
        }
    }
}
