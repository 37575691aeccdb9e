//! Registro de variantes de hash de cálculos.
//!
//! Cada variante es un nombre (`"minimal"`, `"strict"`, ...) asociado a una
//! implementación de `HashFunction`. Las implementaciones se comparan por su
//! `signature()`: re-registrar un nombre con la misma firma es un no-op y con
//! otra firma falla con `IdentityError::DuplicateName`, para no cambiar en
//! silencio el significado de hashes ya persistidos.
//!
//! Ciclo de vida del registro global (`global()`):
//! 1. Se construye perezosamente con las variantes built-in por defecto.
//! 2. La fase de setup (CLI, tests, aplicación) puede registrar más variantes.
//! 3. Luego es de sólo lectura en la práctica; el `RwLock` cubre el caso de
//!    registro dinámico en runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use log::debug;
use once_cell::sync::Lazy;

use crate::canonical::{CalculationField, CanonicalCalculation};
use crate::errors::IdentityError;
use crate::hashing::hash_str;

pub const MINIMAL: &str = "minimal";
pub const STRICT: &str = "strict";

/// Implementación de una variante de hash.
pub trait HashFunction: Send + Sync {
    fn hash(&self, calculation: &CanonicalCalculation) -> Result<String, IdentityError>;
    /// Identifica la implementación (algoritmo + campos + versión).
    fn signature(&self) -> String;
}

/// Variante declarativa: BLAKE3 del JSON canónico de un subconjunto de campos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSubsetHash {
    fields: BTreeSet<CalculationField>,
}

impl FieldSubsetHash {
    pub fn new(fields: impl IntoIterator<Item = CalculationField>) -> Self {
        Self { fields: fields.into_iter().collect() }
    }

    /// program + method + basis.
    pub fn minimal() -> Self {
        Self::new([CalculationField::Program, CalculationField::Method, CalculationField::Basis])
    }

    /// Todos los campos de identidad.
    pub fn strict() -> Self {
        Self::new(CalculationField::ALL)
    }

    pub fn fields(&self) -> &BTreeSet<CalculationField> { &self.fields }
}

impl HashFunction for FieldSubsetHash {
    fn hash(&self, calculation: &CanonicalCalculation) -> Result<String, IdentityError> {
        Ok(hash_str(&calculation.project(&self.fields)))
    }

    fn signature(&self) -> String {
        let names: Vec<&str> = self.fields.iter().map(|f| f.as_str()).collect();
        format!("blake3:fields={}", names.join(","))
    }
}

/// Variante arbitraria a partir de un closure. La firma la declara quien
/// registra; cambiar el closure sin cambiar la firma es responsabilidad suya.
pub struct FnHash<F> {
    signature: String,
    f: F,
}

impl<F> FnHash<F> where F: Fn(&CanonicalCalculation) -> Result<String, IdentityError> + Send + Sync
{
    pub fn new(signature: impl Into<String>, f: F) -> Self {
        Self { signature: signature.into(), f }
    }
}

impl<F> HashFunction for FnHash<F> where F: Fn(&CanonicalCalculation) -> Result<String, IdentityError> + Send + Sync
{
    fn hash(&self, calculation: &CanonicalCalculation) -> Result<String, IdentityError> {
        (self.f)(calculation)
    }

    fn signature(&self) -> String { self.signature.clone() }
}

/// Variantes built-in conocidas por nombre (registrables desde config).
pub fn builtin(name: &str) -> Option<FieldSubsetHash> {
    match name {
        MINIMAL => Some(FieldSubsetHash::minimal()),
        STRICT => Some(FieldSubsetHash::strict()),
        _ => None,
    }
}

/// Mapa `nombre -> implementación`.
#[derive(Clone, Default)]
pub struct HashRegistry {
    functions: BTreeMap<String, Arc<dyn HashFunction>>,
}

impl HashRegistry {
    /// Registro vacío (útil en tests).
    pub fn empty() -> Self { Self::default() }

    /// Registro con las variantes registradas por defecto (`minimal`).
    pub fn with_builtins() -> Self {
        let mut functions: BTreeMap<String, Arc<dyn HashFunction>> = BTreeMap::new();
        functions.insert(MINIMAL.to_string(), Arc::new(FieldSubsetHash::minimal()));
        Self { functions }
    }

    pub fn register<H>(&mut self, name: impl Into<String>, function: H) -> Result<(), IdentityError>
        where H: HashFunction + 'static
    {
        let name = name.into();
        if let Some(existing) = self.functions.get(&name) {
            if existing.signature() == function.signature() {
                return Ok(());
            }
            return Err(IdentityError::DuplicateName(name));
        }
        debug!("registry:register name={name} signature={}", function.signature());
        self.functions.insert(name, Arc::new(function));
        Ok(())
    }

    /// Registra una variante built-in por nombre.
    pub fn register_builtin(&mut self, name: &str) -> Result<(), IdentityError> {
        let function = builtin(name).ok_or_else(|| IdentityError::UnknownVariant(name.to_string()))?;
        self.register(name, function)
    }

    pub fn available(&self) -> BTreeSet<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn HashFunction>, IdentityError> {
        self.functions.get(name).ok_or_else(|| IdentityError::UnknownVariant(name.to_string()))
    }

    pub fn compute(&self, name: &str, calculation: &CanonicalCalculation) -> Result<String, IdentityError> {
        self.get(name)?.hash(calculation)
    }
}

impl fmt::Debug for HashRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
         .entries(self.functions.iter().map(|(k, v)| (k, v.signature())))
         .finish()
    }
}

/// Registro compartido entre backends y llamadores.
pub type SharedRegistry = Arc<RwLock<HashRegistry>>;

static GLOBAL: Lazy<SharedRegistry> = Lazy::new(|| Arc::new(RwLock::new(HashRegistry::with_builtins())));

/// Registro global del proceso.
pub fn global() -> SharedRegistry {
    GLOBAL.clone()
}

/// Envuelve un registro aislado (tests, herramientas de mantenimiento).
pub fn shared(registry: HashRegistry) -> SharedRegistry {
    Arc::new(RwLock::new(registry))
}

/// Lectura del registro. Las escrituras son inserciones atómicas en el mapa,
/// así que un lock envenenado sigue siendo consistente.
pub fn read(registry: &SharedRegistry) -> RwLockReadGuard<'_, HashRegistry> {
    registry.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn register_in<H>(registry: &SharedRegistry, name: impl Into<String>, function: H) -> Result<(), IdentityError>
    where H: HashFunction + 'static
{
    registry.write().unwrap_or_else(PoisonError::into_inner).register(name, function)
}

/// Registra en el registro global.
pub fn register<H>(name: impl Into<String>, function: H) -> Result<(), IdentityError>
    where H: HashFunction + 'static
{
    register_in(&GLOBAL, name, function)
}

/// Nombres registrados en el registro global.
pub fn available() -> BTreeSet<String> {
    read(&GLOBAL).available()
}
