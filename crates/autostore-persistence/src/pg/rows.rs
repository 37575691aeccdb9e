//! Mapeo dominio ↔ filas de DB.

use std::path::PathBuf;

use autostore_core::{Calculation, Geometry, GeometryRecord, Provenance};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use crate::error::PersistenceError;
use crate::schema::{calculation, calculation_hash, energy, geometry};

/// Fila para insertar en `geometry`. `hash` fijado antes del insert.
#[derive(Insertable, Debug)]
#[diesel(table_name = geometry)]
pub struct NewGeometryRow<'a> {
    pub symbols: Value,
    pub coordinates: Value,
    pub charge: i32,
    pub spin: i32,
    pub hash: &'a str,
}

impl<'a> NewGeometryRow<'a> {
    pub fn new(geometry: &Geometry, hash: &'a str) -> Result<Self, PersistenceError> {
        Ok(Self { symbols: serde_json::to_value(geometry.symbols())?,
                  coordinates: serde_json::to_value(geometry.coordinates())?,
                  charge: geometry.charge(),
                  spin: geometry.spin(),
                  hash })
    }
}

/// Fila mapeada de la tabla `geometry` para lecturas.
#[derive(Queryable, Debug)]
pub struct GeometryRow {
    pub id: i64,
    pub symbols: Value,
    pub coordinates: Value,
    pub charge: i32,
    pub spin: i32,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<GeometryRow> for GeometryRecord {
    type Error = PersistenceError;

    fn try_from(row: GeometryRow) -> Result<Self, Self::Error> {
        let symbols: Vec<String> = serde_json::from_value(row.symbols)?;
        let coordinates: Vec<[f64; 3]> = serde_json::from_value(row.coordinates)?;
        let geometry = Geometry::new(symbols, coordinates, row.charge, row.spin)?;
        Ok(GeometryRecord::stored(row.id, geometry, row.hash))
    }
}

/// Fila para insertar en `calculation`. Identidad + procedencia; los hashes
/// van a `calculation_hash`.
#[derive(Insertable, Debug)]
#[diesel(table_name = calculation)]
pub struct NewCalculationRow<'a> {
    pub program: &'a str,
    pub method: &'a str,
    pub basis: Option<&'a str>,
    pub input: Option<&'a str>,
    pub keywords: Value,
    pub cmdline_args: Value,
    pub files: Value,
    pub calctype: Option<&'a str>,
    pub program_version: Option<&'a str>,
    pub scratch_dir: Option<String>,
    pub wall_time: Option<f64>,
    pub hostname: Option<&'a str>,
    pub hostcpus: Option<i32>,
    pub hostmem: Option<i64>,
    pub extras: Value,
}

impl<'a> NewCalculationRow<'a> {
    pub fn new(calc: &'a Calculation) -> Result<Self, PersistenceError> {
        let prov = &calc.provenance;
        Ok(Self { program: &calc.program,
                  method: &calc.method,
                  basis: calc.basis.as_deref(),
                  input: calc.input.as_deref(),
                  keywords: serde_json::to_value(&calc.keywords)?,
                  cmdline_args: serde_json::to_value(&calc.cmdline_args)?,
                  files: serde_json::to_value(&calc.files)?,
                  calctype: calc.calctype.as_deref(),
                  program_version: calc.program_version.as_deref(),
                  scratch_dir: prov.scratch_dir.as_ref().map(|p| p.to_string_lossy().into_owned()),
                  wall_time: prov.wall_time,
                  hostname: prov.hostname.as_deref(),
                  hostcpus: prov.hostcpus,
                  hostmem: prov.hostmem,
                  extras: serde_json::to_value(&calc.extras)? })
    }
}

/// Fila mapeada de la tabla `calculation` (orden de columnas del esquema).
#[derive(Queryable, Debug)]
pub struct CalculationRow {
    pub id: i64,
    pub program: String,
    pub method: String,
    pub basis: Option<String>,
    pub input: Option<String>,
    pub keywords: Value,
    pub cmdline_args: Value,
    pub files: Value,
    pub calctype: Option<String>,
    pub program_version: Option<String>,
    pub scratch_dir: Option<String>,
    pub wall_time: Option<f64>,
    pub hostname: Option<String>,
    pub hostcpus: Option<i32>,
    pub hostmem: Option<i64>,
    pub extras: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CalculationRow> for Calculation {
    type Error = PersistenceError;

    fn try_from(row: CalculationRow) -> Result<Self, Self::Error> {
        Ok(Calculation { program: row.program,
                         method: row.method,
                         basis: row.basis,
                         input: row.input,
                         keywords: serde_json::from_value(row.keywords)?,
                         cmdline_args: serde_json::from_value(row.cmdline_args)?,
                         files: serde_json::from_value(row.files)?,
                         calctype: row.calctype,
                         program_version: row.program_version,
                         provenance: Provenance { scratch_dir: row.scratch_dir.map(PathBuf::from),
                                                  wall_time: row.wall_time,
                                                  hostname: row.hostname,
                                                  hostcpus: row.hostcpus,
                                                  hostmem: row.hostmem },
                         extras: serde_json::from_value(row.extras)? })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = calculation_hash)]
pub struct NewHashRow<'a> {
    pub calculation_id: i64,
    pub name: &'a str,
    pub value: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = energy)]
pub struct NewEnergyRow {
    pub geometry_id: i64,
    pub calculation_id: i64,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn calculation_row_roundtrip_keeps_identity_and_provenance() {
        let calc = Calculation::new("psi4", "b3lyp").with_basis("def2-svp")
                                                    .with_keyword("maxiter", json!(100))
                                                    .with_provenance(Provenance { scratch_dir: Some("/tmp/run".into()),
                                                                                  hostcpus: Some(8),
                                                                                  ..Default::default() });
        let new_row = NewCalculationRow::new(&calc).expect("row");
        let row = CalculationRow { id: 1,
                                   program: new_row.program.into(),
                                   method: new_row.method.into(),
                                   basis: new_row.basis.map(Into::into),
                                   input: None,
                                   keywords: new_row.keywords.clone(),
                                   cmdline_args: new_row.cmdline_args.clone(),
                                   files: new_row.files.clone(),
                                   calctype: None,
                                   program_version: None,
                                   scratch_dir: new_row.scratch_dir.clone(),
                                   wall_time: None,
                                   hostname: None,
                                   hostcpus: new_row.hostcpus,
                                   hostmem: None,
                                   extras: new_row.extras.clone(),
                                   created_at: Utc::now() };
        assert_eq!(Calculation::try_from(row).expect("calc"), calc);
    }

    #[test]
    fn geometry_row_rejects_corrupt_shape() {
        let row = GeometryRow { id: 1,
                                symbols: json!(["O", "H"]),
                                coordinates: json!([[0.0, 0.0, 0.0]]),
                                charge: 0,
                                spin: 0,
                                hash: "x".repeat(64),
                                created_at: Utc::now() };
        assert!(matches!(GeometryRecord::try_from(row), Err(PersistenceError::Identity(_))));
    }
}
