use autostore_core::{IdentityError, StoreError};
use autostore_persistence::PersistenceError;
use thiserror::Error;

/// Errores de la fachada.
#[derive(Debug, Error)]
pub enum AutostoreError {
    #[error("Resultado sin energía: {0}")]
    MissingEnergy(String),
    #[error("Resultado fallido: {0}")]
    FailedResult(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Error de serialización: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AutostoreError {
    pub fn is_identity_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_identity_conflict())
    }

    pub fn is_unknown_variant(&self) -> bool {
        matches!(self, Self::Identity(IdentityError::UnknownVariant(_)))
        || matches!(self, Self::Store(e) if e.is_unknown_variant())
    }
}
