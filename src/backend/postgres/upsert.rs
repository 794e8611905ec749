//! Upsert engine: resolves time-series/geo-point identity and batch-inserts
//! observations, enforcing the validity window and triggering retention.

use super::schema::unique_col_indices;
use super::PostgresBackend;
use crate::errors::{StoreError, StoreResult};
use crate::fields::ts_fields;
use crate::model::{ObsMetadata, ObsTime, Observation, Point, TsMetadata};
use sqlx::{Postgres, Row};
use std::collections::HashMap;

/// One bound value for a `time_series` column, in the order `all_ts_cols()` lists
/// them. Kept as an enum (rather than binding through `dyn Encode`) since sqlx binds
/// are statically typed per call.
#[derive(Debug, Clone, PartialEq)]
enum TsColValue {
    Links(Vec<String>),
    Int64(Option<i64>),
    Str(String),
}

fn ts_col_vals(ts: &TsMetadata) -> Vec<TsColValue> {
    let mut vals = vec![
        TsColValue::Links(ts.links.iter().map(|l| l.href.clone()).collect()),
        TsColValue::Links(ts.links.iter().map(|l| l.rel.clone()).collect()),
        TsColValue::Links(ts.links.iter().map(|l| l.r#type.clone()).collect()),
        TsColValue::Links(ts.links.iter().map(|l| l.hreflang.clone()).collect()),
        TsColValue::Links(ts.links.iter().map(|l| l.title.clone()).collect()),
        TsColValue::Int64(ts.level),
    ];
    for field in ts_fields() {
        if field.name == "level" {
            continue;
        }
        vals.push(TsColValue::Str((field.get)(ts).as_str().unwrap_or("").to_string()));
    }
    vals
}

/// Canonical cache key for a column-value vector. Equal vectors produce equal keys,
/// which is all the per-call cache needs.
fn cache_key(vals: &[TsColValue]) -> String {
    format!("{vals:?}")
}

fn bind_ts_col_vals<'q>(
    mut query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    vals: &[TsColValue],
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    for val in vals {
        query = match val {
            TsColValue::Links(v) => query.bind(v.clone()),
            TsColValue::Int64(v) => query.bind(*v),
            TsColValue::Str(v) => query.bind(v.clone()),
        };
    }
    query
}

/// Resolves the `time_series.id` for `ts`, inserting a row if none matches yet.
/// Checks `cache` first; on a miss, runs the insert-then-select pair inside one
/// transaction using the `WHERE false` row-lock idiom so the subsequent select is
/// guaranteed to find the row even against a concurrent deleter.
async fn get_time_series_id(
    backend: &PostgresBackend,
    ts: &TsMetadata,
    cache: &mut HashMap<String, i64>,
) -> StoreResult<i64> {
    let col_vals = ts_col_vals(ts);
    let key = cache_key(&col_vals);
    if let Some(id) = cache.get(&key) {
        return Ok(*id);
    }

    let mut tx = backend.pool().begin().await?;

    let insert_query = bind_ts_col_vals(sqlx::query(&backend.schema.upsert_insert), &col_vals);
    insert_query.execute(&mut *tx).await?;

    let unique_idxs = unique_col_indices(&backend.schema.all_cols, &backend.schema.unique_cols)?;
    let unique_vals: Vec<TsColValue> = unique_idxs.iter().map(|&i| col_vals[i].clone()).collect();
    let select_query = bind_ts_col_vals(sqlx::query(&backend.schema.upsert_select), &unique_vals);
    let row = select_query.fetch_one(&mut *tx).await?;
    let id: i64 = row.try_get("id")?;

    tx.commit().await?;

    cache.insert(key, id);
    Ok(id)
}

/// Resolves `geo_point.id` for `point`, inserting a row if none matches yet, using
/// the same `WHERE false` guarded insert-then-select idiom.
async fn get_geo_point_id(
    backend: &PostgresBackend,
    point: Point,
    cache: &mut HashMap<String, i64>,
) -> StoreResult<i64> {
    let key = format!("{} {}", point.lon, point.lat);
    if let Some(id) = cache.get(&key) {
        return Ok(*id);
    }

    let mut tx = backend.pool().begin().await?;

    sqlx::query(
        "INSERT INTO geo_point (point) VALUES (ST_MakePoint($1, $2)::geography) \
         ON CONFLICT (point) DO UPDATE SET point = EXCLUDED.point WHERE false",
    )
    .bind(point.lon)
    .bind(point.lat)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query("SELECT id FROM geo_point WHERE point = ST_MakePoint($1, $2)::geography")
        .bind(point.lon)
        .bind(point.lat)
        .fetch_one(&mut *tx)
        .await?;
    let id: i64 = row.try_get("id")?;

    tx.commit().await?;

    cache.insert(key, id);
    Ok(id)
}

struct TsBatch {
    obs_times: Vec<ObsTime>,
    gp_ids: Vec<i64>,
    omds: Vec<ObsMetadata>,
}

/// Batch-inserts every observation collected for one `ts_id` in a single statement,
/// upserting on the `(ts_id, obstime_instant)` primary key.
async fn upsert_obs_for_ts(
    backend: &PostgresBackend,
    ts_id: i64,
    batch: &TsBatch,
) -> StoreResult<()> {
    if batch.obs_times.is_empty() {
        return Ok(());
    }

    let mut vals_expr = Vec::with_capacity(batch.obs_times.len());
    let mut index = 0usize;
    for _ in 0..batch.obs_times.len() {
        vals_expr.push(format!(
            "(${}, to_timestamp(${}), ${}, ${}, to_timestamp(${}), ${}, ${}, ${}, ${}, ${})",
            index + 1,
            index + 2,
            index + 3,
            index + 4,
            index + 5,
            index + 6,
            index + 7,
            index + 8,
            index + 9,
            index + 10,
        ));
        index += 10;
    }

    let sql = format!(
        "INSERT INTO observation (
            ts_id, obstime_instant, id, geo_point_id, pubtime,
            data_id, history, metadata_id, processing_level, value)
         VALUES {}
         ON CONFLICT ON CONSTRAINT observation_pkey DO UPDATE SET
            id = EXCLUDED.id,
            geo_point_id = EXCLUDED.geo_point_id,
            pubtime = EXCLUDED.pubtime,
            data_id = EXCLUDED.data_id,
            history = EXCLUDED.history,
            metadata_id = EXCLUDED.metadata_id,
            processing_level = EXCLUDED.processing_level,
            value = EXCLUDED.value",
        vals_expr.join(",")
    );

    let mut query = sqlx::query(&sql);
    for i in 0..batch.obs_times.len() {
        let pubtime = batch.omds[i].pubtime.unwrap_or(ObsTime::new(0, 0));
        query = query
            .bind(ts_id)
            .bind(batch.obs_times[i].to_f64_secs())
            .bind(batch.omds[i].id.clone())
            .bind(batch.gp_ids[i])
            .bind(pubtime.to_f64_secs())
            .bind(batch.omds[i].data_id.clone())
            .bind(batch.omds[i].history.clone())
            .bind(batch.omds[i].metadata_id.clone())
            .bind(batch.omds[i].processing_level.clone())
            .bind(batch.omds[i].value.clone());
    }

    query.execute(backend.pool()).await?;
    Ok(())
}

pub async fn put_observations(
    backend: &PostgresBackend,
    observations: Vec<Observation>,
) -> StoreResult<()> {
    if observations.len() > backend.put_obs_limit {
        return Err(StoreError::InvalidArgument(format!(
            "batch of {} observations exceeds PUTOBSLIMIT ({})",
            observations.len(),
            backend.put_obs_limit
        )));
    }

    let (lo, hi) = backend.window.current_window();

    let mut ts_id_cache: HashMap<String, i64> = HashMap::new();
    let mut gp_id_cache: HashMap<String, i64> = HashMap::new();
    let mut batches: HashMap<i64, TsBatch> = HashMap::new();

    for obs in observations {
        let obstime = obs.obs_mdata.obstime_instant.ok_or_else(|| {
            StoreError::InvalidArgument("observation is missing obstime_instant".to_string())
        })?;
        let instant = obstime.to_chrono();
        if instant < lo || instant > hi {
            return Err(StoreError::InvalidArgument(format!(
                "obstime_instant {instant} is outside the valid time range [{lo}, {hi}] ({})",
                backend.window.settings_summary()
            )));
        }

        let point = obs.obs_mdata.geo_point.ok_or_else(|| {
            StoreError::InvalidArgument("observation is missing geo_point".to_string())
        })?;

        let ts_id = get_time_series_id(backend, &obs.ts_mdata, &mut ts_id_cache).await?;
        let gp_id = get_geo_point_id(backend, point, &mut gp_id_cache).await?;

        let batch = batches.entry(ts_id).or_insert_with(|| TsBatch {
            obs_times: Vec::new(),
            gp_ids: Vec::new(),
            omds: Vec::new(),
        });
        batch.obs_times.push(obstime);
        batch.gp_ids.push(gp_id);
        batch.omds.push(obs.obs_mdata);
    }

    for (ts_id, batch) in &batches {
        upsert_obs_for_ts(backend, *ts_id, batch).await?;
    }

    if let Err(err) = super::retention::consider_cleanup(backend).await {
        tracing::warn!(error = %err, "retention cleanup failed; write already committed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Link;

    #[test]
    fn cache_key_is_stable_for_equal_vectors() {
        let ts = TsMetadata {
            platform: "stn-01".to_string(),
            ..Default::default()
        };
        let a = ts_col_vals(&ts);
        let b = ts_col_vals(&ts);
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn cache_key_differs_for_different_metadata() {
        let ts1 = TsMetadata {
            platform: "stn-01".to_string(),
            ..Default::default()
        };
        let ts2 = TsMetadata {
            platform: "stn-02".to_string(),
            ..Default::default()
        };
        assert_ne!(cache_key(&ts_col_vals(&ts1)), cache_key(&ts_col_vals(&ts2)));
    }

    #[test]
    fn ts_col_vals_carries_links_as_parallel_arrays() {
        let ts = TsMetadata {
            links: vec![Link {
                href: "http://example.test".to_string(),
                rel: "source".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let vals = ts_col_vals(&ts);
        match &vals[0] {
            TsColValue::Links(hrefs) => assert_eq!(hrefs, &["http://example.test".to_string()]),
            other => panic!("expected Links, got {other:?}"),
        }
    }
}
