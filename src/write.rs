//! Escritura de resultados.

use autostore_core::{EnergyKey, EnergyStore, Results};
use log::debug;

use crate::errors::AutostoreError;

/// Persiste la energía de `results`: geometría, cálculo (con hashes de todas
/// las variantes registradas) y energía, en una sola transacción del store.
///
/// # Errores
/// - `FailedResult` si el resultado no terminó con éxito.
/// - `MissingEnergy` si no trae energía.
/// - `IdentityError::UnsupportedInputKind` para descriptores no soportados.
/// - `StoreError::IdentityConflict` si ya hay una energía para el par.
pub fn energy<S: EnergyStore + ?Sized>(results: &Results, store: &S) -> Result<EnergyKey, AutostoreError> {
    let program = results.provenance.program.clone();
    if !results.success {
        return Err(AutostoreError::FailedResult(program));
    }
    let value = results.energy().ok_or_else(|| AutostoreError::MissingEnergy(program))?;
    let geometry = results.to_geometry()?;
    let calculation = results.to_calculation()?;
    let key = store.write_energy(&geometry, &calculation, value)?;
    debug!("write::energy kind={} geometry_id={} calculation_id={}",
           results.kind(),
           key.geometry_id,
           key.calculation_id);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autostore_core::registry::shared;
    use autostore_core::{HashRegistry, InMemoryStore};
    use serde_json::json;

    fn results(success: bool, energy: Option<f64>) -> Results {
        serde_json::from_value(json!({
            "input_data": {
                "structure": {"symbols": ["He"], "geometry": [[0.0, 0.0, 0.0]]},
                "model": {"method": "gfn2"}
            },
            "success": success,
            "data": {"energy": energy},
            "provenance": {"program": "crest"}
        })).expect("results")
    }

    #[test]
    fn failed_result_is_rejected() {
        let store = InMemoryStore::new(shared(HashRegistry::with_builtins()));
        let err = energy(&results(false, Some(-2.9)), &store).unwrap_err();
        assert!(matches!(err, AutostoreError::FailedResult(_)));
        assert_eq!(store.energy_count(), 0);
    }

    #[test]
    fn missing_energy_is_rejected() {
        let store = InMemoryStore::new(shared(HashRegistry::with_builtins()));
        let err = energy(&results(true, None), &store).unwrap_err();
        assert!(matches!(err, AutostoreError::MissingEnergy(_)));
    }

    #[test]
    fn second_write_is_conflict() {
        let store = InMemoryStore::new(shared(HashRegistry::with_builtins()));
        energy(&results(true, Some(-2.9)), &store).expect("first");
        assert!(energy(&results(true, Some(-2.9)), &store).unwrap_err().is_identity_conflict());
    }
}
