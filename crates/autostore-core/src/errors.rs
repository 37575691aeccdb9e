//! Errores del core de identidad y del contrato de almacenamiento.

use thiserror::Error;

/// Fallos de canonicalización, hashing y registro de variantes.
///
/// `Shape`, `NonFiniteCoordinate` y `CoordinateOutOfRange` se detectan antes
/// de hashear. `UnknownVariant` no se reintenta y `DuplicateName` es fatal
/// durante la inicialización.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum IdentityError {
    #[error("shape error: {symbols} symbols vs {coordinates} coordinate triples")]
    Shape { symbols: usize, coordinates: usize },
    #[error("non-finite coordinate at atom {atom}")]
    NonFiniteCoordinate { atom: usize },
    #[error("coordinate at atom {atom} exceeds the fixed-point range of the canonical form")]
    CoordinateOutOfRange { atom: usize },
    #[error("unknown hash variant: {0}")]
    UnknownVariant(String),
    #[error("hash variant '{0}' already registered with a different implementation")]
    DuplicateName(String),
    #[error("unsupported input kind: {0}")]
    UnsupportedInputKind(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for IdentityError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Errores expuestos por cualquier implementación de `EnergyStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("identity conflict: {0}")]
    IdentityConflict(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Atajo para tests y para el CLI: ¿es un `UnknownVariant`?
    pub fn is_unknown_variant(&self) -> bool {
        matches!(self, Self::Identity(IdentityError::UnknownVariant(_)))
    }

    pub fn is_identity_conflict(&self) -> bool {
        matches!(self, Self::IdentityConflict(_))
    }
}
