//! Lectura de energías.

use autostore_core::{Calculation, EnergyStore, Geometry};

use crate::errors::AutostoreError;

/// Energía almacenada para `geometry` + `calculation`, comparando cálculos
/// bajo la variante `hash_name`. `Ok(None)` si no hay coincidencia.
pub fn energy<S: EnergyStore + ?Sized>(geometry: &Geometry,
                                       calculation: &Calculation,
                                       store: &S,
                                       hash_name: &str)
                                       -> Result<Option<f64>, AutostoreError> {
    Ok(store.read_energy(geometry, calculation, hash_name)?)
}
