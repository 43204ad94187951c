use sqlx::SqlitePool;

/// Reconstruction ledger plus the ambient temperature cache.
pub const LEDGER_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS pvoutput (
        timestamp INTEGER PRIMARY KEY,
        v1 REAL,
        v2 REAL,
        v3 REAL,
        v4 REAL,
        v5 REAL,
        v6 REAL,
        v7 REAL,
        v8 REAL,
        v9 REAL,
        v10 REAL,
        v11 REAL,
        v12 REAL,
        need_upload INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS need_ul ON pvoutput (need_upload)",
    "CREATE INDEX IF NOT EXISTS has_temp ON pvoutput (v5)",
    r#"
    CREATE TABLE IF NOT EXISTS temperature (
        timestamp INTEGER PRIMARY KEY,
        degC REAL NOT NULL
    )
    "#,
    // Running synthetic export counter. Kept beside `pvoutput` so that table stays
    // readable by existing reporting tools.
    r#"
    CREATE TABLE IF NOT EXISTS synthetic_export (
        timestamp INTEGER PRIMARY KEY,
        wh REAL NOT NULL
    )
    "#,
];

/// Layout written by the utility meter collector. Owned by the collector; this crate
/// only reads it. Kept here for tooling and tests.
pub const METER_LOG_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS metered (timestamp INTEGER NOT NULL, wh_in REAL, wh_out REAL)",
    "CREATE INDEX IF NOT EXISTS metered_ts ON metered (timestamp)",
    "CREATE TABLE IF NOT EXISTS demand (timestamp INTEGER NOT NULL, watts REAL)",
    "CREATE INDEX IF NOT EXISTS demand_ts ON demand (timestamp)",
];

/// Layout written by the solar inverter collector.
pub const SOLAR_LOG_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS system (timestamp INTEGER NOT NULL, wh_gen REAL)",
    "CREATE INDEX IF NOT EXISTS system_ts ON system (timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS panels (
        timestamp INTEGER NOT NULL,
        macrf TEXT NOT NULL,
        Vin_V REAL,
        Tdsp_degC REAL,
        Tmos_degC REAL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS panels_ts ON panels (timestamp)",
];

pub async fn apply(pool: &SqlitePool, statements: &[&str]) -> Result<(), sqlx::Error> {
    for stmt in statements {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
