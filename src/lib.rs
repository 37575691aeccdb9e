//! autostore
//!
//! Fachada de alto nivel sobre `autostore-core` y `autostore-persistence`:
//! - `write::energy` persiste la energía de un resultado (`input::Results`).
//! - `read::energy` busca la energía de una geometría + cálculo bajo una
//!   variante de hash con nombre.
//! - `errors` agrupa los errores de ambas capas.
//!
//! Cualquier `EnergyStore` sirve: `InMemoryStore` para tests y procesos
//! efímeros, `PgEnergyStore` para Postgres.

pub mod errors;
pub mod read;
pub mod write;

pub use autostore_core::{registry, Calculation, EnergyKey, EnergyStore, Geometry, InMemoryStore, Results};
pub use autostore_persistence::{PgEnergyStore, PoolProvider};
pub use errors::AutostoreError;
