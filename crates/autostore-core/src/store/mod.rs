//! Contrato de almacenamiento de energías y la ruta de lookup.
//!
//! Los backends (`InMemoryStore`, Postgres en `autostore-persistence`)
//! implementan primitivas; la ruta de lookup (`read_energy`,
//! `find_calculations`) y la regla de resolución de cálculos viven aquí para
//! que todos los backends se comporten igual.

mod memory;

use std::collections::BTreeMap;

use crate::errors::StoreError;
use crate::identity::{calculation_hash, geometry_hash};
use crate::model::{Calculation, CalculationId, EnergyKey, Geometry, GeometryId};
use crate::population::PopulationReport;
use crate::registry::{self, SharedRegistry};

pub use memory::InMemoryStore;

/// Almacén de geometrías, cálculos (con hashes por variante) y energías.
pub trait EnergyStore {
    /// Registro de variantes que usa este store.
    fn registry(&self) -> &SharedRegistry;

    /// Persiste geometría + cálculo + energía en una sola transacción.
    ///
    /// - Geometría: insert-or-fetch por hash.
    /// - Cálculo: se reutiliza si coincide (ver `resolve_calculation`), si no
    ///   se inserta y se pueblan sus hashes antes del commit.
    /// - Energía: una segunda energía para el mismo par es
    ///   `StoreError::IdentityConflict`.
    fn write_energy(&self, geometry: &Geometry, calculation: &Calculation, energy: f64) -> Result<EnergyKey, StoreError>;

    /// Geometría por hash de contenido.
    fn find_geometry_by_hash(&self, hash: &str) -> Result<Option<GeometryId>, StoreError>;

    /// Cálculos con un hash `(name, value)`.
    fn find_calculations_by_hash(&self, name: &str, value: &str) -> Result<Vec<CalculationId>, StoreError>;

    fn energy(&self, key: EnergyKey) -> Result<Option<f64>, StoreError>;

    /// Hashes almacenados de un cálculo (`name -> value`).
    fn calculation_hashes(&self, id: CalculationId) -> Result<BTreeMap<String, String>, StoreError>;

    /// Borra el cálculo; sus hashes y energías caen en cascada.
    fn delete_calculation(&self, id: CalculationId) -> Result<bool, StoreError>;

    /// Mantenimiento explícito: completa variantes registradas después de que
    /// los cálculos fueron insertados. Nunca corre en la ruta de escritura.
    fn backfill_hashes(&self) -> Result<PopulationReport, StoreError>;

    fn find_geometry(&self, geometry: &Geometry) -> Result<Option<GeometryId>, StoreError> {
        self.find_geometry_by_hash(&geometry_hash(geometry)?)
    }

    /// Cálculos que coinciden con `calculation` bajo la variante `hash_name`.
    fn find_calculations(&self, calculation: &Calculation, hash_name: &str) -> Result<Vec<CalculationId>, StoreError> {
        let value = {
            let guard = registry::read(self.registry());
            calculation_hash(&guard, calculation, hash_name)?
        };
        self.find_calculations_by_hash(hash_name, &value)
    }

    /// Lookup: geometría → cálculo(s) bajo `hash_name` → energía.
    ///
    /// La ausencia en cualquier etapa es `Ok(None)`; una variante no
    /// registrada es `IdentityError::UnknownVariant`.
    fn read_energy(&self, geometry: &Geometry, calculation: &Calculation, hash_name: &str) -> Result<Option<f64>, StoreError> {
        // la variante se valida aunque la geometría no exista
        let calculation_ids = self.find_calculations(calculation, hash_name)?;
        let Some(geometry_id) = self.find_geometry(geometry)? else {
            return Ok(None);
        };
        for calculation_id in calculation_ids {
            if let Some(value) = self.energy(EnergyKey { geometry_id, calculation_id })? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Resultado de comparar un cálculo nuevo con los almacenados.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    New,
    Existing(CalculationId),
}

/// Decide si un cálculo con hashes `ours` ya existe.
///
/// `candidates` son los cálculos almacenados que comparten al menos un
/// `(name, value)` con `ours`, cada uno con todos sus hashes almacenados.
/// - Sin candidatos: `New`.
/// - Un candidato que coincide en cada variante que tiene almacenada:
///   `Existing` (las variantes que le falten no se rellenan aquí).
/// - Cualquier otro caso violaría la unicidad de `(name, value)`:
///   `IdentityConflict`.
pub fn resolve_calculation(ours: &BTreeMap<String, String>,
                           candidates: &BTreeMap<CalculationId, BTreeMap<String, String>>)
                           -> Result<Resolution, StoreError> {
    let mut iter = candidates.iter();
    match (iter.next(), iter.next()) {
        (None, _) => Ok(Resolution::New),
        (Some((id, stored)), None) => {
            let disagreeing: Vec<&str> = stored.iter()
                                               .filter(|(name, value)| ours.get(*name).is_some_and(|v| v != *value))
                                               .map(|(name, _)| name.as_str())
                                               .collect();
            if disagreeing.is_empty() {
                Ok(Resolution::Existing(*id))
            } else {
                Err(StoreError::IdentityConflict(format!("calculation {id} matches partially; differs under {}",
                                                         disagreeing.join(","))))
            }
        }
        _ => {
            let ids: Vec<&CalculationId> = candidates.keys().collect();
            Err(StoreError::IdentityConflict(format!("calculation matches several stored calculations: {ids:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn no_candidates_is_new() {
        assert_eq!(resolve_calculation(&hashes(&[("minimal", "a")]), &BTreeMap::new()).expect("ok"),
                   Resolution::New);
    }

    #[test]
    fn agreeing_candidate_is_reused() {
        let ours = hashes(&[("minimal", "a"), ("strict", "b")]);
        // almacenado bajo un snapshot anterior: sólo tiene minimal
        let candidates = BTreeMap::from([(3, hashes(&[("minimal", "a")]))]);
        assert_eq!(resolve_calculation(&ours, &candidates).expect("ok"), Resolution::Existing(3));
    }

    #[test]
    fn partial_match_is_conflict() {
        let ours = hashes(&[("minimal", "a"), ("strict", "b")]);
        let candidates = BTreeMap::from([(3, hashes(&[("minimal", "a"), ("strict", "other")]))]);
        assert!(resolve_calculation(&ours, &candidates).unwrap_err().is_identity_conflict());
    }

    #[test]
    fn several_candidates_is_conflict() {
        let ours = hashes(&[("minimal", "a"), ("strict", "b")]);
        let candidates = BTreeMap::from([(3, hashes(&[("minimal", "a")])), (4, hashes(&[("strict", "b")]))]);
        assert!(resolve_calculation(&ours, &candidates).unwrap_err().is_identity_conflict());
    }
}
