//! Geometría molecular normalizada (símbolos + coordenadas cartesianas).
//!
//! El orden de los átomos es significativo: el llamador entrega geometrías ya
//! normalizadas en un marco comparable. La única validación es de forma
//! (`symbols.len() == coordinates.len()`) y coordenadas finitas que quepan en
//! el punto fijo de la forma canónica.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::COORDINATE_SCALE;
use crate::errors::IdentityError;

/// Geometría validada. Coordenadas en Angstrom; `spin` = electrones no
/// apareados (2S).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeometry")]
pub struct Geometry {
    symbols: Vec<String>,
    coordinates: Vec<[f64; 3]>,
    charge: i32,
    spin: i32,
}

#[derive(Deserialize)]
struct RawGeometry {
    symbols: Vec<String>,
    coordinates: Vec<[f64; 3]>,
    #[serde(default)]
    charge: i32,
    #[serde(default)]
    spin: i32,
}

impl TryFrom<RawGeometry> for Geometry {
    type Error = IdentityError;

    fn try_from(raw: RawGeometry) -> Result<Self, Self::Error> {
        Geometry::new(raw.symbols, raw.coordinates, raw.charge, raw.spin)
    }
}

impl Geometry {
    /// Construye una geometría validando forma y finitud.
    ///
    /// # Errores
    /// - `IdentityError::Shape` si el número de coordenadas difiere del de símbolos.
    /// - `IdentityError::NonFiniteCoordinate` ante NaN/inf.
    /// - `IdentityError::CoordinateOutOfRange` si `|x| * COORDINATE_SCALE` no cabe en `i64`.
    pub fn new<S>(symbols: impl IntoIterator<Item = S>,
                  coordinates: Vec<[f64; 3]>,
                  charge: i32,
                  spin: i32)
                  -> Result<Self, IdentityError>
        where S: Into<String>
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        validate_shape(&symbols, &coordinates)?;
        Ok(Self { symbols, coordinates, charge, spin })
    }

    pub fn symbols(&self) -> &[String] { &self.symbols }
    pub fn coordinates(&self) -> &[[f64; 3]] { &self.coordinates }
    pub fn charge(&self) -> i32 { self.charge }
    pub fn spin(&self) -> i32 { self.spin }
}

pub(crate) fn validate_shape<S: AsRef<str>>(symbols: &[S], coordinates: &[[f64; 3]]) -> Result<(), IdentityError> {
    if symbols.len() != coordinates.len() {
        return Err(IdentityError::Shape { symbols: symbols.len(),
                                          coordinates: coordinates.len() });
    }
    if let Some(atom) = coordinates.iter().position(|xyz| xyz.iter().any(|c| !c.is_finite())) {
        return Err(IdentityError::NonFiniteCoordinate { atom });
    }
    // i64::MAX como f64 redondea a 2^63, que ya satura.
    let limit = i64::MAX as f64;
    if let Some(atom) = coordinates.iter().position(|xyz| xyz.iter().any(|c| (c * COORDINATE_SCALE).abs() >= limit)) {
        return Err(IdentityError::CoordinateOutOfRange { atom });
    }
    Ok(())
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} charge={} spin={}>", self.symbols.concat(), self.charge, self.spin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_mismatched_shape() {
        let err = Geometry::new(["O", "H", "H"], vec![[0.0; 3], [1.0, 0.0, 0.0]], 0, 0).unwrap_err();
        assert_eq!(err, IdentityError::Shape { symbols: 3, coordinates: 2 });
    }

    #[test]
    fn rejects_nan() {
        let err = Geometry::new(["H", "H"], vec![[0.0; 3], [f64::NAN, 0.0, 0.0]], 0, 0).unwrap_err();
        assert_eq!(err, IdentityError::NonFiniteCoordinate { atom: 1 });
    }

    #[test]
    fn rejects_coordinates_beyond_fixed_point_range() {
        let err = Geometry::new(["H", "H"], vec![[0.0; 3], [0.0, -1.0e11, 0.0]], 0, 0).unwrap_err();
        assert_eq!(err, IdentityError::CoordinateOutOfRange { atom: 1 });
        assert!(Geometry::new(["H"], vec![[5.0e12, 0.0, 0.0]], 0, 0).is_err());
        // por debajo del límite sigue siendo válida
        assert!(Geometry::new(["H"], vec![[9.0e10, 0.0, 0.0]], 0, 0).is_ok());
    }

    #[test]
    fn deserialize_validates_and_defaults() {
        let g: Geometry = serde_json::from_value(json!({
            "symbols": ["O", "H", "H"],
            "coordinates": [[0, 0, 0], [1, 0, 0], [0, 1, 0]]
        })).expect("valid geometry");
        assert_eq!(g.charge(), 0);
        assert_eq!(g.spin(), 0);
        assert_eq!(g.to_string(), "<OHH charge=0 spin=0>");

        let bad = serde_json::from_value::<Geometry>(json!({
            "symbols": ["O", "H", "H"],
            "coordinates": [[0, 0, 0], [1, 0, 0]]
        }));
        assert!(bad.is_err());
    }
}
