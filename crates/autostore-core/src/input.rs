//! Tipos de entrada soportados: resultados al estilo qcio.
//!
//! `InputData` es un conjunto cerrado de descriptores. Cada uno implementa
//! `InputDescriptor`; sólo `ProgramInput` sabe producir geometría y cálculo,
//! el resto falla con `IdentityError::UnsupportedInputKind`.
//!
//! Las geometrías de entrada vienen en Bohr y con multiplicidad; se
//! convierten a Å y a electrones no apareados (`multiplicity - 1`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::errors::IdentityError;
use crate::model::{Calculation, Geometry, Provenance};

/// Å por Bohr (CODATA 2018).
pub const BOHR_TO_ANGSTROM: f64 = 0.529177210903;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Results {
    pub input_data: InputData,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: ResultData,
    pub provenance: ResultProvenance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub energy: Option<f64>,
}

/// Procedencia del resultado; `program` es obligatorio porque forma parte de
/// la identidad del cálculo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultProvenance {
    pub program: String,
    #[serde(default)]
    pub program_version: Option<String>,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub wall_time: Option<f64>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub hostcpus: Option<i32>,
    #[serde(default)]
    pub hostmem: Option<i64>,
}

/// Descriptor de entrada. El orden de variantes importa para `untagged`:
/// `DualProgram` exige `subprogram`, `Program` exige `structure` + `model`,
/// `File` exige `files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputData {
    DualProgram(DualProgramInput),
    Program(ProgramInput),
    File(FileInput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    pub symbols: Vec<String>,
    /// Bohr.
    pub geometry: Vec<[f64; 3]>,
    #[serde(default)]
    pub charge: i32,
    #[serde(default = "default_multiplicity")]
    pub multiplicity: i32,
}

fn default_multiplicity() -> i32 { 1 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub method: String,
    #[serde(default)]
    pub basis: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramInput {
    pub structure: Structure,
    pub model: Model,
    #[serde(default)]
    pub calctype: Option<String>,
    #[serde(default)]
    pub keywords: IndexMap<String, Value>,
    #[serde(default)]
    pub cmdline_args: Vec<String>,
    #[serde(default)]
    pub files: IndexMap<String, String>,
    #[serde(default)]
    pub extras: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualProgramInput {
    pub subprogram: String,
    #[serde(default)]
    pub subprogram_args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInput {
    pub files: IndexMap<String, String>,
    #[serde(default)]
    pub cmdline_args: Vec<String>,
}

/// Capacidad de convertir un descriptor de entrada en los modelos del core.
pub trait InputDescriptor {
    fn kind(&self) -> &'static str;

    fn to_geometry(&self) -> Result<Geometry, IdentityError> {
        Err(IdentityError::UnsupportedInputKind(self.kind().to_string()))
    }

    fn to_calculation(&self, _provenance: &ResultProvenance) -> Result<Calculation, IdentityError> {
        Err(IdentityError::UnsupportedInputKind(self.kind().to_string()))
    }
}

impl InputDescriptor for ProgramInput {
    fn kind(&self) -> &'static str { "ProgramInput" }

    fn to_geometry(&self) -> Result<Geometry, IdentityError> {
        let s = &self.structure;
        let coordinates = s.geometry.iter().map(|xyz| xyz.map(|c| c * BOHR_TO_ANGSTROM)).collect();
        Geometry::new(s.symbols.iter().cloned(), coordinates, s.charge, s.multiplicity - 1)
    }

    fn to_calculation(&self, provenance: &ResultProvenance) -> Result<Calculation, IdentityError> {
        Ok(Calculation { program: provenance.program.clone(),
                         method: self.model.method.clone(),
                         basis: self.model.basis.clone(),
                         input: None,
                         keywords: self.keywords.clone(),
                         cmdline_args: self.cmdline_args.clone(),
                         files: self.files.clone(),
                         calctype: self.calctype.clone(),
                         program_version: provenance.program_version.clone(),
                         provenance: Provenance { scratch_dir: provenance.scratch_dir.clone(),
                                                  wall_time: provenance.wall_time,
                                                  hostname: provenance.hostname.clone(),
                                                  hostcpus: provenance.hostcpus,
                                                  hostmem: provenance.hostmem },
                         extras: self.extras.clone() })
    }
}

impl InputDescriptor for DualProgramInput {
    fn kind(&self) -> &'static str { "DualProgramInput" }
}

impl InputDescriptor for FileInput {
    fn kind(&self) -> &'static str { "FileInput" }
}

impl InputData {
    fn descriptor(&self) -> &dyn InputDescriptor {
        match self {
            Self::DualProgram(d) => d,
            Self::Program(p) => p,
            Self::File(f) => f,
        }
    }
}

impl Results {
    pub fn kind(&self) -> &'static str { self.input_data.descriptor().kind() }

    pub fn to_geometry(&self) -> Result<Geometry, IdentityError> {
        self.input_data.descriptor().to_geometry()
    }

    pub fn to_calculation(&self) -> Result<Calculation, IdentityError> {
        self.input_data.descriptor().to_calculation(&self.provenance)
    }

    pub fn energy(&self) -> Option<f64> { self.data.energy }
}
