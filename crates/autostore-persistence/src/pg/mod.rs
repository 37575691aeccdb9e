//! Implementación Postgres (Diesel) de `EnergyStore`.
//!
//! - Paridad 1:1 con `InMemoryStore`: la regla de resolución de cálculos y la
//!   ruta de lookup vienen del core.
//! - Una escritura es una transacción `read_write`: geometría (insert-or-fetch),
//!   cálculo + hashes poblados antes del commit, energía.
//! - Las carreras entre escritores concurrentes sobre las claves de
//!   deduplicación se resuelven re-ejecutando la transacción una vez; una
//!   segunda violación se reporta como conflicto de identidad.
//! - Errores transitorios: reintento con backoff corto.

mod rows;

use std::collections::{BTreeMap, BTreeSet};

use autostore_core::registry::{self, SharedRegistry};
use autostore_core::{populate_hashes, prepare_write, resolve_calculation, Calculation, CalculationId, CalculationRecord,
                     EnergyKey, EnergyStore, Geometry, GeometryId, GeometryRecord, HashRegistry, PopulationReport,
                     Resolution, StoreError};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};

use crate::config::DbConfig;
use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{calculation, calculation_hash, energy, geometry};

pub use rows::{CalculationRow, GeometryRow, NewCalculationRow, NewEnergyRow, NewGeometryRow, NewHashRow};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Al construirlo se corre el set de migraciones pendientes (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Contrato: devuelve una conexión válida o `PersistenceError::TransientIo`.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Implementación de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}
impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Determina si un error es transitorio (reintentar con backoff).
///
/// Cubre conflictos de serialización, IO de pool/conexión y mensajes comunes
/// de desconexión/timeout detectados por texto (best-effort).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry con backoff lineal corto (hasta 3 reintentos: 15ms, 30ms, 45ms).
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Re-ejecuta `f` una vez si perdió una carrera de deduplicación.
fn with_dedup_rerun<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    match f() {
        Err(e) if e.is_dedup_race() => {
            warn!("dedup race: {e}; re-running transaction once");
            f()
        }
        r => r,
    }
}

/// Cálculos almacenados que comparten algún `(name, value)` con `hashes`,
/// cada uno con todos sus hashes almacenados.
fn load_candidates(conn: &mut PgConnection,
                   hashes: &BTreeMap<String, String>)
                   -> Result<BTreeMap<CalculationId, BTreeMap<String, String>>, PersistenceError> {
    let mut ids = BTreeSet::new();
    for (name, value) in hashes {
        let found: Vec<i64> = calculation_hash::table.filter(calculation_hash::name.eq(name.as_str()))
                                                     .filter(calculation_hash::value.eq(value.as_str()))
                                                     .select(calculation_hash::calculation_id)
                                                     .load(conn)?;
        ids.extend(found);
    }
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }
    let ids: Vec<i64> = ids.into_iter().collect();
    let stored: Vec<(i64, String, String)> =
        calculation_hash::table.filter(calculation_hash::calculation_id.eq_any(ids))
                               .select((calculation_hash::calculation_id, calculation_hash::name, calculation_hash::value))
                               .load(conn)?;
    let mut candidates: BTreeMap<CalculationId, BTreeMap<String, String>> = BTreeMap::new();
    for (id, name, value) in stored {
        candidates.entry(id).or_default().insert(name, value);
    }
    Ok(candidates)
}

/// Una escritura completa dentro de la transacción abierta.
fn write_in_tx(conn: &mut PgConnection,
               geometry_row: &NewGeometryRow<'_>,
               calculation_row: &NewCalculationRow<'_>,
               hashes: &BTreeMap<String, String>,
               value: f64)
               -> Result<EnergyKey, PersistenceError> {
    // Paso 1: geometría, insert-or-fetch por hash
    let inserted: Option<i64> = diesel::insert_into(geometry::table).values(geometry_row)
                                                                    .on_conflict_do_nothing()
                                                                    .returning(geometry::id)
                                                                    .get_result(conn)
                                                                    .optional()?;
    let geometry_id = match inserted {
        Some(id) => id,
        None => geometry::table.filter(geometry::hash.eq(geometry_row.hash))
                               .select(geometry::id)
                               .first(conn)?,
    };

    // Paso 2: cálculo, reutilizado o insertado con sus hashes
    let calculation_id = match resolve_calculation(hashes, &load_candidates(conn, hashes)?)? {
        Resolution::Existing(id) => id,
        Resolution::New => {
            let id: i64 = diesel::insert_into(calculation::table).values(calculation_row)
                                                                 .returning(calculation::id)
                                                                 .get_result(conn)?;
            let hash_rows: Vec<NewHashRow<'_>> = hashes.iter()
                                                       .map(|(name, value)| NewHashRow { calculation_id: id, name, value })
                                                       .collect();
            diesel::insert_into(calculation_hash::table).values(&hash_rows).execute(conn)?;
            id
        }
    };

    // Paso 3: energía, nunca se sobreescribe
    let existing: Option<f64> = energy::table.find((geometry_id, calculation_id))
                                             .select(energy::value)
                                             .first(conn)
                                             .optional()?;
    if existing.is_some() {
        return Err(PersistenceError::IdentityConflict(format!("energy already stored for geometry {geometry_id} and calculation {calculation_id}")));
    }
    diesel::insert_into(energy::table).values(NewEnergyRow { geometry_id, calculation_id, value })
                                      .execute(conn)?;
    Ok(EnergyKey { geometry_id, calculation_id })
}

/// Implementación Postgres de `EnergyStore`.
pub struct PgEnergyStore<P: ConnectionProvider> {
    pub provider: P,
    registry: SharedRegistry,
}

impl<P: ConnectionProvider> PgEnergyStore<P> {
    pub fn new(provider: P, registry: SharedRegistry) -> Self {
        Self { provider, registry }
    }

    /// Geometría almacenada por id (con su hash persistido).
    pub fn geometry(&self, id: GeometryId) -> Result<Option<GeometryRecord>, StoreError> {
        let row: Option<GeometryRow> = with_retry(|| {
                                           let mut conn = self.provider.connection()?;
                                           geometry::table.find(id)
                                                          .first(&mut conn)
                                                          .optional()
                                                          .map_err(PersistenceError::from)
                                       })?;
        Ok(row.map(GeometryRecord::try_from).transpose()?)
    }
}

impl PgEnergyStore<PoolProvider> {
    /// Store listo para usar desde el entorno: pool migrado y variantes extra
    /// de `AUTOSTORE_HASH_VARIANTS` registradas en el registro global.
    pub fn from_env() -> Result<Self, PersistenceError> {
        let cfg = DbConfig::from_env()?;
        let registry = registry::global();
        cfg.apply_hash_variants(&registry)?;
        let pool = build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)?;
        Ok(Self::new(PoolProvider { pool }, registry))
    }
}

fn load_calculation_records(conn: &mut PgConnection) -> Result<Vec<CalculationRecord>, PersistenceError> {
    let rows: Vec<CalculationRow> = calculation::table.order(calculation::id.asc()).load(conn)?;
    let stored: Vec<(i64, String, String)> =
        calculation_hash::table.select((calculation_hash::calculation_id, calculation_hash::name, calculation_hash::value))
                               .load(conn)?;
    let mut hashes: BTreeMap<CalculationId, BTreeMap<String, String>> = BTreeMap::new();
    for (id, name, value) in stored {
        hashes.entry(id).or_default().insert(name, value);
    }
    rows.into_iter()
        .map(|row| {
            let id = row.id;
            let calc = Calculation::try_from(row)?;
            Ok(CalculationRecord::stored(id, calc, hashes.remove(&id).unwrap_or_default()))
        })
        .collect()
}

/// Inserta los hashes que `populated` tiene y `stored` no.
fn insert_missing_hashes(conn: &mut PgConnection,
                         populated: &[CalculationRecord],
                         stored: &BTreeMap<CalculationId, BTreeSet<String>>)
                         -> Result<usize, PersistenceError> {
    let empty = BTreeSet::new();
    let mut rows: Vec<NewHashRow<'_>> = Vec::new();
    for record in populated {
        let Some(id) = record.id else { continue };
        let known = stored.get(&id).unwrap_or(&empty);
        rows.extend(record.hashes
                          .iter()
                          .filter(|(name, _)| !known.contains(*name))
                          .map(|(name, value)| NewHashRow { calculation_id: id, name, value }));
    }
    if rows.is_empty() {
        return Ok(0);
    }
    Ok(diesel::insert_into(calculation_hash::table).values(&rows).execute(conn)?)
}

fn backfill_in_tx(conn: &mut PgConnection, variants: &HashRegistry) -> Result<PopulationReport, PersistenceError> {
    let mut batch = load_calculation_records(conn)?;
    let stored: BTreeMap<CalculationId, BTreeSet<String>> =
        batch.iter()
             .filter_map(|r| r.id.map(|id| (id, r.hashes.keys().cloned().collect())))
             .collect();
    let report = populate_hashes(variants, &mut batch)?;
    let inserted = insert_missing_hashes(conn, &batch, &stored)?;
    debug!("backfill: touched={} added={} inserted={inserted}", report.records_touched, report.hashes_added);
    Ok(report)
}

impl<P: ConnectionProvider> EnergyStore for PgEnergyStore<P> {
    fn registry(&self) -> &SharedRegistry { &self.registry }

    fn write_energy(&self, geometry: &Geometry, calculation: &Calculation, energy: f64) -> Result<EnergyKey, StoreError> {
        // hashes fijados antes de abrir la transacción; el registro queda libre
        let (mut geometry_record, calculation_record) = prepare_write(&self.registry, geometry, calculation)?;
        let geometry_hash = geometry_record.ensure_hash()?.to_string();

        let geometry_row = NewGeometryRow::new(geometry, &geometry_hash)?;
        let calculation_row = NewCalculationRow::new(calculation)?;
        debug!("write_energy:start geometry_hash={geometry_hash} variants={}", calculation_record.hashes.len());

        let key = with_dedup_rerun(|| {
                      with_retry(|| {
                          let mut conn = self.provider.connection()?;
                          conn.build_transaction().read_write().run(|tx_conn| {
                                                                   write_in_tx(tx_conn,
                                                                               &geometry_row,
                                                                               &calculation_row,
                                                                               &calculation_record.hashes,
                                                                               energy)
                                                               })
                      })
                  })?;
        debug!("write_energy:done geometry_id={} calculation_id={}", key.geometry_id, key.calculation_id);
        Ok(key)
    }

    fn find_geometry_by_hash(&self, hash: &str) -> Result<Option<GeometryId>, StoreError> {
        let id = with_retry(|| {
                     let mut conn = self.provider.connection()?;
                     geometry::table.filter(geometry::hash.eq(hash))
                                    .select(geometry::id)
                                    .first::<i64>(&mut conn)
                                    .optional()
                                    .map_err(PersistenceError::from)
                 })?;
        Ok(id)
    }

    fn find_calculations_by_hash(&self, name: &str, value: &str) -> Result<Vec<CalculationId>, StoreError> {
        let ids = with_retry(|| {
                      let mut conn = self.provider.connection()?;
                      calculation_hash::table.filter(calculation_hash::name.eq(name))
                                             .filter(calculation_hash::value.eq(value))
                                             .select(calculation_hash::calculation_id)
                                             .load::<i64>(&mut conn)
                                             .map_err(PersistenceError::from)
                  })?;
        Ok(ids)
    }

    fn energy(&self, key: EnergyKey) -> Result<Option<f64>, StoreError> {
        let value = with_retry(|| {
                        let mut conn = self.provider.connection()?;
                        energy::table.find((key.geometry_id, key.calculation_id))
                                     .select(energy::value)
                                     .first::<f64>(&mut conn)
                                     .optional()
                                     .map_err(PersistenceError::from)
                    })?;
        Ok(value)
    }

    fn calculation_hashes(&self, id: CalculationId) -> Result<BTreeMap<String, String>, StoreError> {
        let rows = with_retry(|| {
                       let mut conn = self.provider.connection()?;
                       calculation_hash::table.filter(calculation_hash::calculation_id.eq(id))
                                              .select((calculation_hash::name, calculation_hash::value))
                                              .load::<(String, String)>(&mut conn)
                                              .map_err(PersistenceError::from)
                   })?;
        Ok(rows.into_iter().collect())
    }

    fn delete_calculation(&self, id: CalculationId) -> Result<bool, StoreError> {
        let deleted = with_retry(|| {
                          let mut conn = self.provider.connection()?;
                          diesel::delete(calculation::table.find(id)).execute(&mut conn)
                                                                     .map_err(PersistenceError::from)
                      })?;
        debug!("delete_calculation id={id} deleted={deleted}");
        Ok(deleted > 0)
    }

    fn backfill_hashes(&self) -> Result<PopulationReport, StoreError> {
        let variants = registry::read(&self.registry);
        let report = with_retry(|| {
                         let mut conn = self.provider.connection()?;
                         conn.build_transaction()
                             .read_write()
                             .run(|tx_conn| backfill_in_tx(tx_conn, &variants))
                     })?;
        Ok(report)
    }
}

/// Construye un pool Postgres r2d2 a partir de URL y corre las migraciones.
///
/// Si `min_size > max_size` se usa `min_size = max_size`; tamaños cero se
/// suben a 1.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración y construye un pool
/// ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retry_gives_up_after_three_retries() {
        let calls = Cell::new(0);
        let res: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::SerializationConflict)
        });
        assert!(matches!(res, Err(PersistenceError::SerializationConflict)));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn non_retryable_fails_immediately() {
        let calls = Cell::new(0);
        let res: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::NotFound)
        });
        assert!(res.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn dedup_race_reruns_once() {
        let calls = Cell::new(0);
        let res: Result<(), _> = with_dedup_rerun(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::UniqueViolation { constraint: "calculation_hash_name_value_key".into(),
                                                    message: "dup".into() })
        });
        assert_eq!(calls.get(), 2);
        // la segunda violación se reporta como conflicto de identidad
        assert!(StoreError::from(res.unwrap_err()).is_identity_conflict());
    }

    #[test]
    fn unknown_connection_messages_are_retryable() {
        assert!(is_retryable(&PersistenceError::Unknown("Deadlock detected".into())));
        assert!(!is_retryable(&PersistenceError::Unknown("syntax error".into())));
    }
}
