//! Canonical JSON minimal (sin dependencias de dominio).
//!
//! Serializa un `Value` de JSON a una representación canónica:
//! - Objetos con claves ordenadas (orden de inserción irrelevante).
//! - Arrays en su orden original (el orden sí es significativo).
//! - Sin espacios redundantes.

use serde_json::Value;
use std::collections::BTreeMap;

pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut tree = BTreeMap::new();
            for (k, v) in map {
                tree.insert(k, to_canonical_json(v));
            }
            let items: Vec<String> = tree.into_iter()
                                         .map(|(k, v)| format!("{}:{}", quote(k), v))
                                         .collect();
            format!("{{{}}}", items.join(","))
        }
    }
}

// El Display de `Value` escapa igual que `serde_json::to_string` y no falla.
fn quote(s: &str) -> String {
    Value::from(s).to_string()
}
