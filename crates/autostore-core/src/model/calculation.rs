//! Descriptor de cálculo: campos de identidad + procedencia.
//!
//! Sólo los campos de identidad participan en hashing (ver `canonical`).
//! `provenance` y `extras` describen cómo/dónde corrió el cálculo y pueden
//! diferir entre reproducciones del mismo cálculo lógico.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Calculation {
    pub program: String,
    pub method: String,
    #[serde(default)]
    pub basis: Option<String>,
    /// Texto del archivo de entrada, si el programa usa uno.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub keywords: IndexMap<String, Value>,
    #[serde(default)]
    pub cmdline_args: Vec<String>,
    #[serde(default)]
    pub files: IndexMap<String, String>,
    #[serde(default)]
    pub calctype: Option<String>,
    #[serde(default)]
    pub program_version: Option<String>,
    #[serde(flatten)]
    pub provenance: Provenance,
    /// Metadatos adicionales (no entran al hash).
    #[serde(default)]
    pub extras: IndexMap<String, Value>,
}

/// Procedencia de la ejecución (no entra al hash).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Provenance {
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

impl Calculation {
    pub fn new(program: impl Into<String>, method: impl Into<String>) -> Self {
        Self { program: program.into(),
               method: method.into(),
               ..Default::default() }
    }

    pub fn with_basis(mut self, basis: impl Into<String>) -> Self {
        self.basis = Some(basis.into());
        self
    }

    pub fn with_keyword(mut self, key: impl Into<String>, value: Value) -> Self {
        self.keywords.insert(key.into(), value);
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(name.into(), content.into());
        self
    }

    pub fn with_calctype(mut self, calctype: impl Into<String>) -> Self {
        self.calctype = Some(calctype.into());
        self
    }

    pub fn with_program_version(mut self, version: impl Into<String>) -> Self {
        self.program_version = Some(version.into());
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}
