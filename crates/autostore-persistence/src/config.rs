//! Carga de configuración de conexión desde variables de entorno.
//! Usa convención `DATABASE_URL` y parámetros opcionales de pool; además
//! `AUTOSTORE_HASH_VARIANTS` (lista separada por comas) con variantes
//! built-in extra a registrar durante el setup.

use std::env;

use autostore_core::registry::{self, SharedRegistry};
use dotenvy::dotenv;
use log::debug;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub hash_variants: Vec<String>,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, PersistenceError> {
        // asegura que .env se haya cargado
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL no definido".into()))?;
        let min_connections = env::var("DATABASE_MIN_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(2);
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(16);
        Ok(Self { url, min_connections, max_connections, hash_variants: hash_variants_from_env() })
    }

    /// Registra las variantes extra en `target`. Fase de setup: debe correr
    /// antes de la primera escritura.
    pub fn apply_hash_variants(&self, target: &SharedRegistry) -> Result<(), PersistenceError> {
        register_hash_variants(&self.hash_variants, target)
    }
}

/// Variantes extra pedidas en `AUTOSTORE_HASH_VARIANTS` (no requiere DB).
pub fn hash_variants_from_env() -> Vec<String> {
    Lazy::force(&DOTENV_LOADED);
    env::var("AUTOSTORE_HASH_VARIANTS").map(|v| parse_variant_list(&v)).unwrap_or_default()
}

/// Registra variantes built-in por nombre; un nombre desconocido es error de
/// configuración.
pub fn register_hash_variants(names: &[String], target: &SharedRegistry) -> Result<(), PersistenceError> {
    for name in names {
        let function = registry::builtin(name).ok_or_else(|| PersistenceError::Config(format!("variante de hash desconocida: {name}")))?;
        registry::register_in(target, name.clone(), function)?;
        debug!("config: registered hash variant {name}");
    }
    Ok(())
}

fn parse_variant_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() { Lazy::force(&DOTENV_LOADED); }

#[cfg(test)]
mod tests {
    use super::*;
    use autostore_core::registry::{shared, STRICT};
    use autostore_core::HashRegistry;

    fn config(variants: &[&str]) -> DbConfig {
        DbConfig { url: "postgres://unused".into(),
                   min_connections: 1,
                   max_connections: 1,
                   hash_variants: variants.iter().map(|s| s.to_string()).collect() }
    }

    #[test]
    fn variant_list_parsing() {
        assert_eq!(parse_variant_list(" strict, ,minimal"), vec!["strict".to_string(), "minimal".to_string()]);
        assert!(parse_variant_list("").is_empty());
    }

    #[test]
    fn applies_builtin_variants() {
        let reg = shared(HashRegistry::with_builtins());
        config(&[STRICT]).apply_hash_variants(&reg).expect("apply");
        assert!(registry::read(&reg).contains(STRICT));
    }

    #[test]
    fn unknown_variant_is_config_error() {
        let reg = shared(HashRegistry::with_builtins());
        let err = config(&["bogus"]).apply_hash_variants(&reg).unwrap_err();
        assert!(matches!(err, PersistenceError::Config(_)));
    }
}
