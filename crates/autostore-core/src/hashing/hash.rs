//! Hash helpers – abstracción para permitir cambiar de algoritmo sin tocar resto del core.
//!
//! - `hash_str` (BLAKE3) lo usan las variantes de hash de cálculos.
//! - `sha256_hex` lo usa la identidad de geometrías (columna `geometry.hash`).
//!
//! Ambos producen 64 caracteres hex (256 bits), que es el ancho de las
//! columnas `VARCHAR(64)` del esquema.

use blake3::Hasher;
use sha2::{Digest, Sha256};

/// Largo (en caracteres hex) de todos los digests que persiste el sistema.
pub const DIGEST_HEX_LEN: usize = 64;

/// Hashea un string con BLAKE3 y devuelve hex.
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Hashea un string con SHA-256 y devuelve hex en minúsculas.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
