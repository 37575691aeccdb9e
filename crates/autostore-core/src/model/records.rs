//! Registros en vuelo (antes/después de persistir) para geometrías, cálculos y
//! energías. Los backends los construyen al cargar filas y el protocolo de
//! población los completa antes del commit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::IdentityError;
use crate::identity::geometry_hash;
use crate::model::{Calculation, Geometry};

pub type GeometryId = i64;
pub type CalculationId = i64;

/// Fila de geometría. El hash se fija una vez, justo antes de la primera
/// inserción, y nunca se recalcula.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub id: Option<GeometryId>,
    pub geometry: Geometry,
    hash: Option<String>,
}

impl GeometryRecord {
    pub fn new(geometry: Geometry) -> Self {
        Self { id: None, geometry, hash: None }
    }

    /// Rehidrata una fila ya persistida con su hash almacenado.
    pub fn stored(id: GeometryId, geometry: Geometry, hash: String) -> Self {
        Self { id: Some(id), geometry, hash: Some(hash) }
    }

    pub fn hash(&self) -> Option<&str> { self.hash.as_deref() }

    /// Calcula el hash si aún no existe; si ya existe lo devuelve tal cual.
    pub fn ensure_hash(&mut self) -> Result<&str, IdentityError> {
        let hash = match self.hash.take() {
            Some(h) => h,
            None => geometry_hash(&self.geometry)?,
        };
        Ok(self.hash.insert(hash).as_str())
    }
}

/// Fila de cálculo con sus hashes por variante (`name -> value`).
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationRecord {
    pub id: Option<CalculationId>,
    pub calculation: Calculation,
    pub hashes: BTreeMap<String, String>,
}

impl CalculationRecord {
    pub fn new(calculation: Calculation) -> Self {
        Self { id: None, calculation, hashes: BTreeMap::new() }
    }

    pub fn stored(id: CalculationId, calculation: Calculation, hashes: BTreeMap<String, String>) -> Self {
        Self { id: Some(id), calculation, hashes }
    }
}

/// Clave compuesta de una energía.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnergyKey {
    pub geometry_id: GeometryId,
    pub calculation_id: CalculationId,
}
