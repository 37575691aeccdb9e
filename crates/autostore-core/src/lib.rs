//! autostore-core: identidad y deduplicación de resultados de química cuántica.
//!
//! - `canonical`: formas canónicas de geometrías y cálculos.
//! - `registry`: variantes de hash de cálculos con nombre (`"minimal"`, ...).
//! - `identity`: hash de geometría y hashes de cálculo por variante.
//! - `population`: población de hashes en el límite pre-commit.
//! - `store`: contrato `EnergyStore`, ruta de lookup y backend en memoria.
//! - `input`: descriptores de entrada soportados (resultados estilo qcio).
pub mod canonical;
pub mod errors;
pub mod hashing;
pub mod identity;
pub mod input;
pub mod model;
pub mod population;
pub mod registry;
pub mod store;

pub use canonical::{canonical_calculation, canonical_geometry, CalculationField, CanonicalCalculation, CanonicalGeometry};
pub use errors::{IdentityError, StoreError};
pub use identity::{calculation_hash, calculation_hashes, geometry_hash};
pub use input::{InputData, InputDescriptor, Results};
pub use model::{Calculation, CalculationId, CalculationRecord, EnergyKey, Geometry, GeometryId, GeometryRecord, Provenance};
pub use population::{hash_state, populate_geometry_hashes, populate_hashes, prepare_write, HashState, PopulationReport};
pub use registry::{FieldSubsetHash, FnHash, HashFunction, HashRegistry, SharedRegistry};
pub use store::{resolve_calculation, EnergyStore, InMemoryStore, Resolution};
