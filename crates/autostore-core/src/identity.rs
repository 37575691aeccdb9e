//! Identidad de contenido: hash de geometría (no versionado) y hashes de
//! cálculo por variante registrada.

use std::collections::BTreeMap;

use crate::canonical::{canonical_calculation, canonical_geometry_of};
use crate::errors::IdentityError;
use crate::hashing::sha256_hex;
use crate::model::{Calculation, Geometry};
use crate::registry::HashRegistry;

/// SHA-256 (hex, 64 chars) de la forma canónica de la geometría.
pub fn geometry_hash(geometry: &Geometry) -> Result<String, IdentityError> {
    let canonical = canonical_geometry_of(geometry)?;
    Ok(sha256_hex(canonical.as_str()))
}

/// Hash del cálculo bajo la variante `name`.
pub fn calculation_hash(registry: &HashRegistry, calculation: &Calculation, name: &str) -> Result<String, IdentityError> {
    // falla antes de canonicalizar si la variante no existe
    let function = registry.get(name)?;
    function.hash(&canonical_calculation(calculation))
}

/// Hash del cálculo bajo cada variante disponible.
pub fn calculation_hashes(registry: &HashRegistry, calculation: &Calculation) -> Result<BTreeMap<String, String>, IdentityError> {
    let canonical = canonical_calculation(calculation);
    registry.available()
            .into_iter()
            .map(|name| registry.compute(&name, &canonical).map(|value| (name, value)))
            .collect()
}
