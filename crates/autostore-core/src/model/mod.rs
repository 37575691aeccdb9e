//! Modelos de datos: geometría, descriptor de cálculo y registros persistibles.

pub mod calculation;
pub mod geometry;
pub mod records;

pub use calculation::{Calculation, Provenance};
pub use geometry::Geometry;
pub use records::{CalculationId, CalculationRecord, EnergyKey, GeometryId, GeometryRecord};
