//! CLI de mantenimiento de autostore.
//!
//! - `variants`: variantes de hash registradas.
//! - `hash-geometry` / `hash-calculation`: hashes de archivos JSON.
//! - `write`: persiste la energía de un resultado (JSON estilo qcio).
//! - `read-energy`: lookup geometría + cálculo bajo una variante.
//! - `backfill`: completa variantes registradas después de insertar.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use autostore::AutostoreError;
use autostore_core::registry::{self, SharedRegistry};
use autostore_core::{calculation_hash, calculation_hashes, geometry_hash, Calculation, EnergyStore, Geometry,
                     IdentityError, Results, StoreError};
use autostore_persistence::config::register_hash_variants;
use autostore_persistence::{PersistenceError, PgEnergyStore, PoolProvider};
use clap::{Parser, Subcommand};
use log::debug;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// autostore - almacén deduplicado de energías de química cuántica.
#[derive(Parser, Debug)]
#[command(name = "autostore-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Variantes built-in extra a registrar (además de `minimal`)
    #[arg(long, global = true, value_delimiter = ',', env = "AUTOSTORE_HASH_VARIANTS")]
    variants: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lista las variantes de hash registradas
    Variants,

    /// SHA-256 de una geometría (JSON con symbols/coordinates/charge/spin)
    HashGeometry { file: PathBuf },

    /// Hashes de un cálculo, todas las variantes o sólo `--name`
    HashCalculation {
        file: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Persiste la energía de un resultado en Postgres
    Write { file: PathBuf },

    /// Busca una energía en Postgres
    ReadEnergy {
        #[arg(short, long)]
        geometry: PathBuf,
        #[arg(short, long)]
        calculation: PathBuf,
        #[arg(long, default_value = registry::MINIMAL)]
        hash_name: String,
    },

    /// Completa las variantes faltantes de todos los cálculos almacenados
    Backfill,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("no se pudo leer {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("JSON inválido en {path}: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
    #[error(transparent)]
    Autostore(#[from] AutostoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Io { .. } | Self::Json { .. } => 2,
            Self::Identity(_) => 3,
            Self::Store(e) if e.is_identity_conflict() => 4,
            Self::Autostore(e) if e.is_identity_conflict() => 4,
            Self::Autostore(AutostoreError::Persistence(_)) => 5,
            Self::Autostore(_) => 3,
            Self::Store(_) | Self::Persistence(_) => 5,
        }
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&text).map_err(|source| CliError::Json { path: path.to_path_buf(), source })
}

/// Registro global + variantes de `--variants` (o `AUTOSTORE_HASH_VARIANTS`).
fn setup_registry(extra: &[String]) -> Result<SharedRegistry, CliError> {
    let shared = registry::global();
    let names: Vec<String> = extra.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).map(str::to_string).collect();
    register_hash_variants(&names, &shared)?;
    Ok(shared)
}

/// Store Postgres sobre el mismo registro global que `setup_registry`.
fn pg_store() -> Result<PgEnergyStore<PoolProvider>, CliError> {
    Ok(PgEnergyStore::from_env()?)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let shared = setup_registry(&cli.variants)?;
    match cli.command {
        Commands::Variants => {
            for name in registry::read(&shared).available() {
                println!("{name}");
            }
        }
        Commands::HashGeometry { file } => {
            let geometry: Geometry = load_json(&file)?;
            println!("{}", geometry_hash(&geometry)?);
        }
        Commands::HashCalculation { file, name } => {
            let calculation: Calculation = load_json(&file)?;
            let guard = registry::read(&shared);
            match name {
                Some(name) => println!("{}", calculation_hash(&guard, &calculation, &name)?),
                None => {
                    let hashes: BTreeMap<String, String> = calculation_hashes(&guard, &calculation)?;
                    for (name, value) in hashes {
                        println!("{name}\t{value}");
                    }
                }
            }
        }
        Commands::Write { file } => {
            let results: Results = load_json(&file)?;
            let key = autostore::write::energy(&results, &pg_store()?)?;
            println!("geometry_id={} calculation_id={}", key.geometry_id, key.calculation_id);
        }
        Commands::ReadEnergy { geometry, calculation, hash_name } => {
            let geometry: Geometry = load_json(&geometry)?;
            let calculation: Calculation = load_json(&calculation)?;
            match pg_store()?.read_energy(&geometry, &calculation, &hash_name)? {
                Some(energy) => println!("{energy}"),
                None => println!("not found"),
            }
        }
        Commands::Backfill => {
            let report = pg_store()?.backfill_hashes()?;
            println!("records_touched={} hashes_added={}", report.records_touched, report.hashes_added);
        }
    }
    Ok(())
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    env_logger::init();
    let cli = Cli::parse();
    debug!("cli: {:?}", cli.command);
    if let Err(e) = run(cli) {
        eprintln!("[autostore] {e}");
        std::process::exit(e.exit_code());
    }
}
