//! autostore-persistence
//!
//! Backend Postgres (Diesel) de `EnergyStore` con la misma semántica que el
//! backend en memoria del core.
//!
//! Módulos:
//! - `pg`: `PgEnergyStore`, proveedor de conexiones y pool r2d2.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env / entorno.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgEnergyStore, PgPool, PoolProvider};
