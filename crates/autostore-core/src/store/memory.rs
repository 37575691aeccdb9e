use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::errors::StoreError;
use crate::model::{Calculation, CalculationId, CalculationRecord, EnergyKey, Geometry, GeometryId, GeometryRecord};
use crate::population::{populate_hashes, prepare_write, PopulationReport};
use crate::registry::{self, SharedRegistry};

use super::{resolve_calculation, EnergyStore, Resolution};

/// Backend en memoria con paridad 1:1 respecto al de Postgres.
///
/// Las escrituras se serializan con un único `Mutex` (transacción de un solo
/// escritor). Todo lo que puede fallar se evalúa antes de mutar las tablas,
/// así una escritura fallida no deja rastro.
pub struct InMemoryStore {
    registry: SharedRegistry,
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    geometries: BTreeMap<GeometryId, GeometryRecord>,
    geometry_by_hash: HashMap<String, GeometryId>,
    calculations: BTreeMap<CalculationId, CalculationRecord>,
    // (name, value) -> calculation
    hash_index: HashMap<(String, String), CalculationId>,
    energies: BTreeMap<EnergyKey, f64>,
    next_geometry_id: GeometryId,
    next_calculation_id: CalculationId,
}

impl Default for InMemoryStore {
    fn default() -> Self { Self::new(registry::global()) }
}

impl InMemoryStore {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry, tables: Mutex::new(Tables::default()) }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn geometry_count(&self) -> usize { self.tables().geometries.len() }
    pub fn calculation_count(&self) -> usize { self.tables().calculations.len() }
    pub fn energy_count(&self) -> usize { self.tables().energies.len() }

    /// Filas de hash almacenadas (todas las variantes).
    pub fn hash_row_count(&self) -> usize { self.tables().hash_index.len() }

    pub fn calculation(&self, id: CalculationId) -> Option<CalculationRecord> {
        self.tables().calculations.get(&id).cloned()
    }
}

impl Tables {
    fn candidates(&self, hashes: &BTreeMap<String, String>) -> BTreeMap<CalculationId, BTreeMap<String, String>> {
        hashes.iter()
              .filter_map(|(name, value)| self.hash_index.get(&(name.clone(), value.clone())))
              .filter_map(|id| self.calculations.get(id).map(|rec| (*id, rec.hashes.clone())))
              .collect()
    }
}

impl EnergyStore for InMemoryStore {
    fn registry(&self) -> &SharedRegistry { &self.registry }

    fn write_energy(&self, geometry: &Geometry, calculation: &Calculation, energy: f64) -> Result<EnergyKey, StoreError> {
        // hashes fijados antes de tomar las tablas
        let (mut geometry_record, mut calculation_record) = prepare_write(&self.registry, geometry, calculation)?;
        let geometry_hash = geometry_record.ensure_hash()?.to_string();
        let mut tables = self.tables();

        // 1. geometría: insert-or-fetch por hash
        let existing_geometry = tables.geometry_by_hash.get(&geometry_hash).copied();

        // 2. cálculo: comparado contra los almacenados
        let resolution = resolve_calculation(&calculation_record.hashes, &tables.candidates(&calculation_record.hashes))?;

        // 3. energía: conflicto sólo posible si ambos ya existen
        if let (Some(geometry_id), Resolution::Existing(calculation_id)) = (existing_geometry, resolution) {
            let key = EnergyKey { geometry_id, calculation_id };
            if tables.energies.contains_key(&key) {
                return Err(StoreError::IdentityConflict(format!("energy already stored for geometry {geometry_id} and calculation {calculation_id}")));
            }
        }

        // commit
        let geometry_id = match existing_geometry {
            Some(id) => id,
            None => {
                tables.next_geometry_id += 1;
                let id = tables.next_geometry_id;
                geometry_record.id = Some(id);
                tables.geometry_by_hash.insert(geometry_hash, id);
                tables.geometries.insert(id, geometry_record);
                id
            }
        };
        let calculation_id = match resolution {
            Resolution::Existing(id) => id,
            Resolution::New => {
                tables.next_calculation_id += 1;
                let id = tables.next_calculation_id;
                calculation_record.id = Some(id);
                for (name, value) in &calculation_record.hashes {
                    tables.hash_index.insert((name.clone(), value.clone()), id);
                }
                tables.calculations.insert(id, calculation_record);
                id
            }
        };
        let key = EnergyKey { geometry_id, calculation_id };
        tables.energies.insert(key, energy);
        debug!("write_energy:done geometry_id={geometry_id} calculation_id={calculation_id}");
        Ok(key)
    }

    fn find_geometry_by_hash(&self, hash: &str) -> Result<Option<GeometryId>, StoreError> {
        Ok(self.tables().geometry_by_hash.get(hash).copied())
    }

    fn find_calculations_by_hash(&self, name: &str, value: &str) -> Result<Vec<CalculationId>, StoreError> {
        Ok(self.tables()
               .hash_index
               .get(&(name.to_string(), value.to_string()))
               .copied()
               .into_iter()
               .collect())
    }

    fn energy(&self, key: EnergyKey) -> Result<Option<f64>, StoreError> {
        Ok(self.tables().energies.get(&key).copied())
    }

    fn calculation_hashes(&self, id: CalculationId) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.tables().calculations.get(&id).map(|r| r.hashes.clone()).unwrap_or_default())
    }

    fn delete_calculation(&self, id: CalculationId) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let Some(record) = tables.calculations.remove(&id) else {
            return Ok(false);
        };
        for (name, value) in record.hashes {
            tables.hash_index.remove(&(name, value));
        }
        tables.energies.retain(|key, _| key.calculation_id != id);
        Ok(true)
    }

    fn backfill_hashes(&self) -> Result<PopulationReport, StoreError> {
        let variants = registry::read(&self.registry);
        let mut tables = self.tables();
        let mut batch: Vec<CalculationRecord> = tables.calculations.values().cloned().collect();
        let report = populate_hashes(&variants, &mut batch)?;

        // validar unicidad de los hashes nuevos antes de aplicar nada
        let mut staged: HashMap<(String, String), CalculationId> = HashMap::new();
        for record in &batch {
            let Some(id) = record.id else { continue };
            let Some(stored) = tables.calculations.get(&id).map(|r| &r.hashes) else { continue };
            for (name, value) in record.hashes.iter().filter(|(name, _)| !stored.contains_key(*name)) {
                let key = (name.clone(), value.clone());
                if tables.hash_index.contains_key(&key) || staged.insert(key, id).is_some() {
                    return Err(StoreError::IdentityConflict(format!("backfill of '{name}' for calculation {id} collides with an existing hash")));
                }
            }
        }
        tables.hash_index.extend(staged);
        for record in batch {
            if let Some(id) = record.id {
                tables.calculations.insert(id, record);
            }
        }
        debug!("backfill_hashes: touched={} added={}", report.records_touched, report.hashes_added);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{shared, HashRegistry, STRICT};
    use serde_json::json;

    fn water() -> Geometry {
        Geometry::new(["O", "H", "H"],
                      vec![[0.0, 0.0, 0.0], [1.8897, 0.0, 0.0], [0.0, 1.8897, 0.0]],
                      0,
                      0).expect("water")
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new(shared(HashRegistry::with_builtins()))
    }

    #[test]
    fn write_then_read_minimal() {
        let store = store();
        store.write_energy(&water(), &Calculation::new("crest", "gfn2"), -5.0623).expect("write");
        let e = store.read_energy(&water(), &Calculation::new("crest", "gfn2"), "minimal").expect("read");
        assert_eq!(e, Some(-5.0623));
        assert_eq!(store.hash_row_count(), 1);
    }

    #[test]
    fn second_energy_same_pair_is_conflict() {
        let store = store();
        let calc = Calculation::new("crest", "gfn2");
        store.write_energy(&water(), &calc, -5.0623).expect("write");
        let err = store.write_energy(&water(), &calc, -5.1).unwrap_err();
        assert!(err.is_identity_conflict());
        assert_eq!(store.read_energy(&water(), &calc, "minimal").expect("read"), Some(-5.0623));
        assert_eq!(store.energy_count(), 1);
    }

    #[test]
    fn same_geometry_two_calculations_shares_row() {
        let store = store();
        store.write_energy(&water(), &Calculation::new("crest", "gfn2"), -5.0).expect("w1");
        store.write_energy(&water(), &Calculation::new("crest", "gfn1"), -4.9).expect("w2");
        assert_eq!(store.geometry_count(), 1);
        assert_eq!(store.calculation_count(), 2);
    }

    #[test]
    fn provenance_difference_reuses_calculation() {
        let store = store();
        let mut rerun = Calculation::new("crest", "gfn2");
        rerun.provenance.hostname = Some("other-node".into());
        let he = Geometry::new(["He"], vec![[0.0; 3]], 0, 0).expect("he");
        let k1 = store.write_energy(&water(), &Calculation::new("crest", "gfn2"), -5.0).expect("w1");
        let k2 = store.write_energy(&he, &rerun, -2.9).expect("w2");
        assert_eq!(k1.calculation_id, k2.calculation_id);
        assert_eq!(store.calculation_count(), 1);
    }

    #[test]
    fn delete_cascades_hashes_and_energies() {
        let store = store();
        let key = store.write_energy(&water(), &Calculation::new("crest", "gfn2"), -5.0).expect("write");
        assert!(store.delete_calculation(key.calculation_id).expect("delete"));
        assert_eq!(store.hash_row_count(), 0);
        assert_eq!(store.energy_count(), 0);
        assert_eq!(store.geometry_count(), 1);
        assert!(!store.delete_calculation(key.calculation_id).expect("delete twice"));
    }

    #[test]
    fn new_variant_is_not_retroactive_until_backfill() {
        let reg = shared(HashRegistry::with_builtins());
        let store = InMemoryStore::new(reg.clone());
        let key = store.write_energy(&water(), &Calculation::new("crest", "gfn2"), -5.0).expect("write");
        registry::register_in(&reg, STRICT, crate::registry::FieldSubsetHash::strict()).expect("strict");

        assert_eq!(store.calculation_hashes(key.calculation_id).expect("hashes").len(), 1);
        // un cálculo nuevo sí recibe ambas variantes
        let fresh = store.write_energy(&water(), &Calculation::new("psi4", "hf"), -75.9).expect("fresh");
        assert_eq!(store.calculation_hashes(fresh.calculation_id).expect("hashes").len(), 2);
        // coincide en minimal con el primero, que no tiene strict: se reutiliza
        let he = Geometry::new(["He"], vec![[0.0; 3]], 0, 0).expect("he");
        let tuned = Calculation::new("crest", "gfn2").with_keyword("gbsa", json!("water"));
        let reused = store.write_energy(&he, &tuned, -2.9).expect("reuse");
        assert_eq!(reused.calculation_id, key.calculation_id);

        let report = store.backfill_hashes().expect("backfill");
        assert_eq!(report.hashes_added, 1);
        assert_eq!(store.calculation_hashes(key.calculation_id).expect("hashes").len(), 2);
        assert_eq!(store.backfill_hashes().expect("again").hashes_added, 0);
    }
}
