//! Read-only queries over the collectors' append-only logs.
//!
//! Every lookup returns `Option`: a missing sample is ordinary data, not an error.

use sqlx::SqlitePool;

use crate::domain::{CounterKind, PanelTelemetrySample, RawCounterSample};

/// Latest sample of `kind` with `timestamp <= t`.
pub async fn latest_at_or_before(
    pool: &SqlitePool,
    kind: CounterKind,
    t: i64,
) -> Result<Option<RawCounterSample>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT timestamp, CAST({col} AS REAL)
        FROM {table}
        WHERE timestamp <= ?1
          AND {col} IS NOT NULL
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
        col = kind.column(),
        table = kind.table(),
    );

    let row: Option<(i64, f64)> = sqlx::query_as(&sql).bind(t).fetch_optional(pool).await?;
    Ok(row.map(|(timestamp, value)| RawCounterSample { timestamp, value, kind }))
}

/// Earliest sample of `kind` with `timestamp > t`.
pub async fn earliest_after(
    pool: &SqlitePool,
    kind: CounterKind,
    t: i64,
) -> Result<Option<RawCounterSample>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT timestamp, CAST({col} AS REAL)
        FROM {table}
        WHERE timestamp > ?1
          AND {col} IS NOT NULL
        ORDER BY timestamp ASC
        LIMIT 1
        "#,
        col = kind.column(),
        table = kind.table(),
    );

    let row: Option<(i64, f64)> = sqlx::query_as(&sql).bind(t).fetch_optional(pool).await?;
    Ok(row.map(|(timestamp, value)| RawCounterSample { timestamp, value, kind }))
}

/// Highest value `kind` has reported strictly before `t`.
pub async fn max_before(
    pool: &SqlitePool,
    kind: CounterKind,
    t: i64,
) -> Result<Option<f64>, sqlx::Error> {
    let sql = format!(
        "SELECT CAST(MAX({col}) AS REAL) FROM {table} WHERE timestamp < ?1",
        col = kind.column(),
        table = kind.table(),
    );

    sqlx::query_scalar::<_, Option<f64>>(&sql)
        .bind(t)
        .fetch_one(pool)
        .await
}

/// All panel readings in `[from, to]`, grouped by panel and time-ordered within a panel.
pub async fn panel_samples(
    pool: &SqlitePool,
    from: i64,
    to: i64,
) -> Result<Vec<PanelTelemetrySample>, sqlx::Error> {
    sqlx::query_as::<_, PanelTelemetrySample>(
        r#"
        SELECT
            timestamp,
            CAST(macrf AS TEXT) AS macrf,
            CAST(Vin_V AS REAL) AS Vin_V,
            CAST(Tdsp_degC AS REAL) AS Tdsp_degC,
            CAST(Tmos_degC AS REAL) AS Tmos_degC
        FROM panels
        WHERE timestamp >= ?1
          AND timestamp <= ?2
        ORDER BY macrf, timestamp
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}

/// Mean of the negative net-demand readings in `(from, to]`, in W (so the result is
/// negative). `None` when the house did not export during the window.
pub async fn mean_export_demand(
    pool: &SqlitePool,
    from: i64,
    to: i64,
) -> Result<Option<f64>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<f64>>(
        r#"
        SELECT AVG(watts)
        FROM demand
        WHERE timestamp > ?1
          AND timestamp <= ?2
          AND watts < 0
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
}
