//! Población de hashes en el límite pre-commit.
//!
//! El backend que posee la transacción junta los registros nuevos del lote y
//! llama a `populate_hashes` antes de confirmar. Por registro:
//! `faltantes = registry.available() - hashes presentes`; se calculan todos
//! los faltantes del lote (en paralelo) y se adjuntan sólo si ninguno falló.
//! Si algo falla el lote queda intacto y el llamador debe hacer rollback.
//!
//! No hay rehash retroactivo: un registro completo para un snapshot anterior
//! del registro sigue así hasta un backfill explícito.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use rayon::prelude::*;

use crate::canonical::canonical_calculation;
use crate::errors::IdentityError;
use crate::model::{Calculation, CalculationRecord, Geometry, GeometryRecord};
use crate::registry::{self, HashRegistry, SharedRegistry};

/// Estado de un registro relativo al registro de variantes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashState {
    Unhashed,
    /// Transitorio; no debería observarse persistido.
    PartiallyHashed,
    FullyHashed,
}

pub fn hash_state(record: &CalculationRecord, available: &BTreeSet<String>) -> HashState {
    if available.iter().all(|name| record.hashes.contains_key(name)) {
        HashState::FullyHashed
    } else if record.hashes.is_empty() {
        HashState::Unhashed
    } else {
        HashState::PartiallyHashed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulationReport {
    /// Registros que recibieron al menos un hash.
    pub records_touched: usize,
    pub hashes_added: usize,
}

/// Completa los hashes faltantes de cada registro del lote (todo o nada).
pub fn populate_hashes(registry: &HashRegistry, batch: &mut [CalculationRecord]) -> Result<PopulationReport, IdentityError> {
    let available = registry.available();
    let computed: Vec<BTreeMap<String, String>> =
        batch.par_iter()
             .map(|record| missing_hashes(registry, &available, record))
             .collect::<Result<_, _>>()?;

    let mut report = PopulationReport::default();
    for (record, added) in batch.iter_mut().zip(computed) {
        if added.is_empty() {
            continue;
        }
        report.records_touched += 1;
        report.hashes_added += added.len();
        record.hashes.extend(added);
    }
    debug!("populate_hashes: batch={} touched={} added={}",
           batch.len(),
           report.records_touched,
           report.hashes_added);
    Ok(report)
}

fn missing_hashes(registry: &HashRegistry,
                  available: &BTreeSet<String>,
                  record: &CalculationRecord)
                  -> Result<BTreeMap<String, String>, IdentityError> {
    let missing: Vec<&String> = available.iter().filter(|name| !record.hashes.contains_key(*name)).collect();
    if missing.is_empty() {
        return Ok(BTreeMap::new());
    }
    let canonical = canonical_calculation(&record.calculation);
    missing.into_iter()
           .map(|name| registry.compute(name, &canonical).map(|value| (name.clone(), value)))
           .collect()
}

/// Fija el hash de cada geometría nueva del lote (todo o nada).
pub fn populate_geometry_hashes(batch: &mut [GeometryRecord]) -> Result<usize, IdentityError> {
    let pending: Vec<usize> = batch.iter()
                                   .enumerate()
                                   .filter(|(_, r)| r.hash().is_none())
                                   .map(|(i, _)| i)
                                   .collect();
    // Primero se valida todo el lote sobre copias; luego se fija.
    let mut staged: Vec<GeometryRecord> = pending.iter().map(|&i| batch[i].clone()).collect();
    staged.par_iter_mut()
          .map(|r| r.ensure_hash().map(|_| ()))
          .collect::<Result<Vec<()>, _>>()?;
    let count = staged.len();
    for (i, record) in pending.into_iter().zip(staged) {
        batch[i] = record;
    }
    Ok(count)
}

/// Registros de una escritura con todos sus hashes fijados: la geometría
/// con su hash de contenido y el cálculo con cada variante registrada.
///
/// El guard de lectura del registro vive sólo mientras se calculan los
/// hashes; el llamador abre su transacción después, sin bloquear a
/// `register_in`. Un fallo no deja registros a medio poblar.
pub fn prepare_write(variants: &SharedRegistry,
                     geometry: &Geometry,
                     calculation: &Calculation)
                     -> Result<(GeometryRecord, CalculationRecord), IdentityError> {
    let mut geometries = [GeometryRecord::new(geometry.clone())];
    populate_geometry_hashes(&mut geometries)?;
    let mut calculations = [CalculationRecord::new(calculation.clone())];
    {
        let guard = registry::read(variants);
        populate_hashes(&guard, &mut calculations)?;
    }
    let [geometry_record] = geometries;
    let [calculation_record] = calculations;
    Ok((geometry_record, calculation_record))
}
