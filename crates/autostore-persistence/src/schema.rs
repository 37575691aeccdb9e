//! Esquema Diesel (escrito a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    geometry (id) {
        id -> BigInt,
        symbols -> Jsonb,
        coordinates -> Jsonb,
        charge -> Integer,
        spin -> Integer,
        hash -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    calculation (id) {
        id -> BigInt,
        program -> Text,
        method -> Text,
        basis -> Nullable<Text>,
        input -> Nullable<Text>,
        keywords -> Jsonb,
        cmdline_args -> Jsonb,
        files -> Jsonb,
        calctype -> Nullable<Text>,
        program_version -> Nullable<Text>,
        scratch_dir -> Nullable<Text>,
        wall_time -> Nullable<Double>,
        hostname -> Nullable<Text>,
        hostcpus -> Nullable<Integer>,
        hostmem -> Nullable<BigInt>,
        extras -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    calculation_hash (id) {
        id -> BigInt,
        calculation_id -> BigInt,
        name -> Text,
        value -> Varchar,
    }
}

diesel::table! {
    energy (geometry_id, calculation_id) {
        geometry_id -> BigInt,
        calculation_id -> BigInt,
        value -> Double,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(calculation_hash -> calculation (calculation_id));
diesel::joinable!(energy -> calculation (calculation_id));
diesel::joinable!(energy -> geometry (geometry_id));

diesel::allow_tables_to_appear_in_same_query!(geometry, calculation, calculation_hash, energy,);
