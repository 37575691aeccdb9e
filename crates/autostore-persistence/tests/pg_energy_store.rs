
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use autostore_core::registry::{self, shared, STRICT};
use autostore_core::{Calculation, EnergyStore, FieldSubsetHash, Geometry, HashRegistry, SharedRegistry};
use autostore_persistence::pg::{PgEnergyStore, PoolProvider};
use diesel::prelude::*;
use serde_json::json;
use test_support::{unique_tag, with_pool};

fn store(pool: &autostore_persistence::PgPool, reg: SharedRegistry) -> PgEnergyStore<PoolProvider> {
    PgEnergyStore::new(PoolProvider { pool: pool.clone() }, reg)
}

// geometría única por corrida: un átomo desplazado según el tag
fn water(tag: &str) -> Geometry {
    let shift = (tag.len() as f64) * 1e-3 + (chrono::Utc::now().timestamp_subsec_nanos() as f64) * 1e-12;
    Geometry::new(["O", "H", "H"],
                  vec![[0.0, 0.0, shift], [1.8897, 0.0, 0.0], [0.0, 1.8897, 0.0]],
                  0,
                  0).expect("water")
}

#[test]
fn pg_energy_roundtrip_and_unknown_variant() {
    let Some(()) = with_pool(|pool| {
        let store = store(pool, shared(HashRegistry::with_builtins()));
        let tag = unique_tag();
        let geo = water(&tag);
        let calc = Calculation::new("crest", format!("gfn2-{tag}"));
        store.write_energy(&geo, &calc, -5.0623).expect("write");

        assert_eq!(store.read_energy(&geo, &calc, "minimal").expect("read"), Some(-5.0623));
        let err = store.read_energy(&geo, &calc, "not-registered").unwrap_err();
        assert!(err.is_unknown_variant(), "got {err:?}");
        let other = Calculation::new("crest", format!("gfn1-{tag}"));
        assert_eq!(store.read_energy(&geo, &other, "minimal").expect("read"), None);
    }) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
}

#[test]
fn pg_second_energy_is_identity_conflict() {
    let Some(()) = with_pool(|pool| {
        let store = store(pool, shared(HashRegistry::with_builtins()));
        let tag = unique_tag();
        let geo = water(&tag);
        let calc = Calculation::new("crest", format!("conflict-{tag}"));
        let key = store.write_energy(&geo, &calc, -1.0).expect("write");
        let err = store.write_energy(&geo, &calc, -1.0).unwrap_err();
        assert!(err.is_identity_conflict(), "got {err:?}");
        assert_eq!(store.energy(key).expect("energy"), Some(-1.0));
    }) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
}

#[test]
fn pg_calculation_is_reused_across_geometries() {
    let Some(()) = with_pool(|pool| {
        let store = store(pool, shared(HashRegistry::with_builtins()));
        let tag = unique_tag();
        let calc = Calculation::new("psi4", format!("b3lyp-{tag}")).with_basis("def2-svp");
        let a = store.write_energy(&water(&tag), &calc, -76.1).expect("a");
        let he = Geometry::new(["He"], vec![[0.0, 0.0, (a.calculation_id as f64) * 1e-6]], 0, 0).expect("he");
        let b = store.write_energy(&he, &calc, -2.9).expect("b");
        assert_eq!(a.calculation_id, b.calculation_id);
        assert_ne!(a.geometry_id, b.geometry_id);

        let stored = store.geometry(b.geometry_id).expect("geometry").expect("stored");
        assert_eq!(stored.geometry, he);
        assert_eq!(stored.hash().map(str::len), Some(64));
    }) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
}

#[test]
fn pg_delete_cascades_to_hashes_and_energies() {
    let Some(()) = with_pool(|pool| {
        let store = store(pool, shared(HashRegistry::with_builtins()));
        let tag = unique_tag();
        let geo = water(&tag);
        let calc = Calculation::new("crest", format!("delete-{tag}"));
        let key = store.write_energy(&geo, &calc, -3.0).expect("write");
        assert!(store.delete_calculation(key.calculation_id).expect("delete"));
        assert!(store.calculation_hashes(key.calculation_id).expect("hashes").is_empty());
        assert_eq!(store.energy(key).expect("energy"), None);
        // la geometría sobrevive
        assert_eq!(store.find_geometry(&geo).expect("geo"), Some(key.geometry_id));
        assert!(!store.delete_calculation(key.calculation_id).expect("delete again"));
    }) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
}

#[test]
fn pg_backfill_completes_late_variant() {
    let Some(()) = with_pool(|pool| {
        let tag = unique_tag();
        let geo = water(&tag);
        let calc = Calculation::new("crest", format!("backfill-{tag}")).with_keyword("gbsa", json!("water"));
        let minimal_only = store(pool, shared(HashRegistry::with_builtins()));
        let key = minimal_only.write_energy(&geo, &calc, -5.07).expect("write");

        let reg = shared(HashRegistry::with_builtins());
        registry::register_in(&reg, STRICT, FieldSubsetHash::strict()).expect("strict");
        let full = store(pool, reg.clone());
        // no retroactivo: strict no encuentra nada antes del backfill
        assert_eq!(full.read_energy(&geo, &calc, STRICT).expect("read"), None);

        full.backfill_hashes().expect("backfill");
        let names: BTreeSet<String> = full.calculation_hashes(key.calculation_id).expect("hashes").into_keys().collect();
        assert_eq!(names, registry::read(&reg).available());
        assert_eq!(full.read_energy(&geo, &calc, STRICT).expect("read"), Some(-5.07));
    }) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
}

#[test]
fn pg_concurrent_writers_share_geometry_and_calculation() {
    let Some(()) = with_pool(|pool| {
        let tag = unique_tag();
        let store = Arc::new(store(pool, shared(HashRegistry::with_builtins())));
        let calc = Calculation::new("crest", format!("race-{tag}"));
        let handles: Vec<_> = (0..4).map(|i| {
                                        let store = Arc::clone(&store);
                                        let calc = calc.clone();
                                        let geo = Geometry::new(["He"], vec![[i as f64, 0.0, 0.0]], 0, 0).expect("he");
                                        thread::spawn(move || store.write_energy(&geo, &calc, -2.9 - i as f64))
                                    })
                                    .collect();
        let mut calculation_ids = BTreeSet::new();
        for h in handles {
            calculation_ids.insert(h.join().expect("join").expect("write").calculation_id);
        }
        assert_eq!(calculation_ids.len(), 1);

        let mut conn = pool.get().expect("conn");
        let rows: i64 = autostore_persistence::schema::calculation::table
            .filter(autostore_persistence::schema::calculation::method.eq(format!("race-{tag}")))
            .count()
            .get_result(&mut conn)
            .expect("count");
        assert_eq!(rows, 1);
    }) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
}
