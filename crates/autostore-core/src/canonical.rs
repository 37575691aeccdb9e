//! Formas canónicas de geometrías y cálculos (insumo del hashing).
//!
//! Ambas formas se serializan con `hashing::to_canonical_json`, por lo que
//! el orden de inserción de claves en mapas (keywords, files) no afecta el
//! resultado. El orden de átomos y de `cmdline_args` sí es significativo.
//!
//! Coordenadas: se codifican como enteros de punto fijo con resolución
//! `COORDINATE_RESOLUTION` (Å). Así `-0.0` y `0.0` coinciden y una conversión
//! Bohr→Å produce la misma forma que el valor literal en Å.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{json, Map, Value};

use crate::errors::IdentityError;
use crate::hashing::to_canonical_json;
use crate::model::geometry::validate_shape;
use crate::model::{Calculation, Geometry};

/// Resolución de coordenadas en la forma canónica (Å).
pub const COORDINATE_RESOLUTION: f64 = 1e-8;
pub(crate) const COORDINATE_SCALE: f64 = 1e8;

/// Texto canónico de una geometría.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalGeometry(String);

impl CanonicalGeometry {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CanonicalGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

pub fn canonical_geometry<S: AsRef<str>>(symbols: &[S],
                                         coordinates: &[[f64; 3]],
                                         charge: i32,
                                         spin: i32)
                                         -> Result<CanonicalGeometry, IdentityError> {
    validate_shape(symbols, coordinates)?;
    let symbols: Vec<&str> = symbols.iter().map(AsRef::as_ref).collect();
    let coordinates: Vec<[i64; 3]> = coordinates.iter().map(|xyz| xyz.map(quantize)).collect();
    let value = json!({
        "symbols": symbols,
        "coordinates": coordinates,
        "charge": charge,
        "spin": spin,
    });
    Ok(CanonicalGeometry(to_canonical_json(&value)))
}

/// Atajo sobre una `Geometry` ya validada.
pub fn canonical_geometry_of(geometry: &Geometry) -> Result<CanonicalGeometry, IdentityError> {
    canonical_geometry(geometry.symbols(), geometry.coordinates(), geometry.charge(), geometry.spin())
}

fn quantize(x: f64) -> i64 {
    // `validate_shape` ya descartó valores que saturarían; -0.0 queda como 0.
    (x * COORDINATE_SCALE).round() as i64
}

/// Campos de identidad de un cálculo. Una variante de hash elige un
/// subconjunto de ellos; la procedencia no figura aquí.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CalculationField {
    Program,
    Method,
    Basis,
    Input,
    Keywords,
    CmdlineArgs,
    Files,
    Calctype,
    ProgramVersion,
}

impl CalculationField {
    pub const ALL: [CalculationField; 9] = [Self::Program,
                                            Self::Method,
                                            Self::Basis,
                                            Self::Input,
                                            Self::Keywords,
                                            Self::CmdlineArgs,
                                            Self::Files,
                                            Self::Calctype,
                                            Self::ProgramVersion];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Program => "program",
            Self::Method => "method",
            Self::Basis => "basis",
            Self::Input => "input",
            Self::Keywords => "keywords",
            Self::CmdlineArgs => "cmdline_args",
            Self::Files => "files",
            Self::Calctype => "calctype",
            Self::ProgramVersion => "program_version",
        }
    }
}

/// Subconjunto de identidad de un `Calculation`, ya normalizado.
///
/// `program`, `method` y `basis` se normalizan a minúsculas sin espacios en
/// los extremos ("Psi4" y "psi4" son el mismo programa). Los opcionales
/// ausentes quedan como `null` para que una variante distinga "sin basis" de
/// cualquier basis concreta.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalCalculation {
    fields: BTreeMap<CalculationField, Value>,
}

impl CanonicalCalculation {
    pub fn get(&self, field: CalculationField) -> &Value {
        self.fields.get(&field).unwrap_or(&Value::Null)
    }

    /// Texto canónico restringido a `fields`.
    pub fn project(&self, fields: &BTreeSet<CalculationField>) -> String {
        let map: Map<String, Value> = fields.iter()
                                            .map(|f| (f.as_str().to_string(), self.get(*f).clone()))
                                            .collect();
        to_canonical_json(&Value::Object(map))
    }

    /// Texto canónico con todos los campos de identidad.
    pub fn to_canonical_string(&self) -> String {
        self.project(&CalculationField::ALL.into_iter().collect())
    }
}

pub fn canonical_calculation(calculation: &Calculation) -> CanonicalCalculation {
    let mut fields = BTreeMap::new();
    fields.insert(CalculationField::Program, Value::from(normalize(&calculation.program)));
    fields.insert(CalculationField::Method, Value::from(normalize(&calculation.method)));
    fields.insert(CalculationField::Basis, calculation.basis.as_deref().map(normalize).into());
    fields.insert(CalculationField::Input, calculation.input.clone().into());
    fields.insert(CalculationField::Keywords,
                  Value::Object(calculation.keywords.iter().map(|(k, v)| (k.clone(), v.clone())).collect()));
    fields.insert(CalculationField::CmdlineArgs, Value::from(calculation.cmdline_args.clone()));
    fields.insert(CalculationField::Files,
                  Value::Object(calculation.files
                                           .iter()
                                           .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                                           .collect()));
    fields.insert(CalculationField::Calctype, calculation.calctype.clone().into());
    fields.insert(CalculationField::ProgramVersion, calculation.program_version.clone().into());
    CanonicalCalculation { fields }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;

    #[test]
    fn geometry_text_is_fixed_point() {
        let c = canonical_geometry(&["H", "H"], &[[0.0, -0.0, 0.0], [0.74, 0.0, 0.0]], 0, 0).expect("canon");
        assert_eq!(c.as_str(),
                   "{\"charge\":0,\"coordinates\":[[0,0,0],[74000000,0,0]],\"spin\":0,\"symbols\":[\"H\",\"H\"]}");
    }

    #[test]
    fn geometry_shape_error() {
        let err = canonical_geometry(&["O", "H", "H"], &[[0.0; 3], [1.0, 0.0, 0.0]], 0, 0).unwrap_err();
        assert!(matches!(err, IdentityError::Shape { symbols: 3, coordinates: 2 }));
    }

    #[test]
    fn huge_coordinates_do_not_collapse() {
        let err = canonical_geometry(&["H"], &[[1.0e11, 0.0, 0.0]], 0, 0).unwrap_err();
        assert_eq!(err, IdentityError::CoordinateOutOfRange { atom: 0 });
        assert!(canonical_geometry(&["H"], &[[-5.0e12, 0.0, 0.0]], 0, 0).is_err());
    }

    #[test]
    fn keyword_order_is_irrelevant() {
        let a = Calculation::new("psi4", "b3lyp").with_keyword("maxiter", json!(100))
                                                  .with_keyword("scf", json!({"conv": 1e-8, "type": "df"}));
        let b = Calculation::new("psi4", "b3lyp").with_keyword("scf", json!({"type": "df", "conv": 1e-8}))
                                                  .with_keyword("maxiter", json!(100));
        assert_eq!(canonical_calculation(&a), canonical_calculation(&b));
        assert_eq!(canonical_calculation(&a).to_canonical_string(),
                   canonical_calculation(&b).to_canonical_string());
    }

    #[test]
    fn provenance_is_excluded() {
        let a = Calculation::new("crest", "gfn2");
        let b = Calculation::new("crest", "gfn2").with_provenance(Provenance { hostname: Some("node-7".into()),
                                                                              wall_time: Some(12.0),
                                                                              ..Default::default() });
        assert_eq!(canonical_calculation(&a), canonical_calculation(&b));
    }

    #[test]
    fn program_and_method_are_case_normalized() {
        let a = canonical_calculation(&Calculation::new("Psi4", " B3LYP "));
        let b = canonical_calculation(&Calculation::new("psi4", "b3lyp"));
        assert_eq!(a, b);
    }

    #[test]
    fn projection_keeps_null_basis() {
        let c = canonical_calculation(&Calculation::new("crest", "gfn2"));
        let fields: BTreeSet<_> = [CalculationField::Program, CalculationField::Method, CalculationField::Basis].into();
        assert_eq!(c.project(&fields), "{\"basis\":null,\"method\":\"gfn2\",\"program\":\"crest\"}");
    }
}
