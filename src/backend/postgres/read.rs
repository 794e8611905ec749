//! Read engine: assembles the filtered SELECT, applies projection pruning, and
//! scans rows back into typed metadata.

use super::PostgresBackend;
use crate::errors::{StoreError, StoreResult};
use crate::fields::{self, FieldKind, ScalarValue};
use crate::filter::{self, ParamList};
use crate::model::{GetObsRequest, Link, Metadata2, ObsMetadata, ObsTime, TsMetadata};
use sqlx::Row;
use std::collections::HashMap;

const LINK_TAGS: [&str; 5] = ["href", "rel", "type", "hreflang", "title"];

fn is_included(included: &[String], name: &str) -> bool {
    included.is_empty() || included.iter().any(|s| s == name)
}

fn validate_included_fields(included: &[String]) -> StoreResult<()> {
    if included.is_empty() {
        return Ok(());
    }
    let known = fields::all_known_field_names();
    for name in included {
        if !known.contains(&name.as_str()) {
            return Err(StoreError::InvalidArgument(format!(
                "unknown response field '{name}'"
            )));
        }
    }
    Ok(())
}

/// Projects one scalar obs column: the column name if included, `NULL::<cast>`
/// otherwise. The decision is baked into the SQL text (not parameterized) since it
/// depends only on the request, not per-row data.
fn project(included: &[String], name: &str, column: &str, cast: &str) -> String {
    if is_included(included, name) {
        column.to_string()
    } else {
        format!("NULL::{cast}")
    }
}

pub async fn get_observations(
    backend: &PostgresBackend,
    request: GetObsRequest,
) -> StoreResult<Vec<Metadata2>> {
    validate_included_fields(&request.included_response_fields)?;
    let included = &request.included_response_fields;

    let mut params = ParamList::new();
    let (lo, hi) = backend.window.current_window();
    let time_expr = filter::time_filter(
        request.temporal.interval.as_ref(),
        lo,
        hi,
        &mut params,
    );
    let geo_expr_polygon = filter::polygon_filter(request.spatial_polygon.as_ref(), &mut params)?;
    let geo_expr_circle = filter::circle_filter(request.spatial_circle.as_ref(), &mut params)?;
    let geo_expr = filter::and_join(&[geo_expr_polygon, geo_expr_circle]);
    let mdata_expr = filter::mdata_filter(&request.filter, &mut params)?;

    let where_expr = filter::and_join(&[time_expr, geo_expr, mdata_expr]);

    let id_proj = project(included, "id", "observation.id", "text");
    let pubtime_proj = project(included, "pubtime", "pubtime", "timestamptz");
    let data_id_proj = project(included, "data_id", "data_id", "text");
    let history_proj = project(included, "history", "history", "text");
    let metadata_id_proj = project(included, "metadata_id", "metadata_id", "text");
    let processing_level_proj = project(included, "processing_level", "processing_level", "text");
    let value_proj = project(included, "value", "value", "text");

    let distinct_on = if request.temporal.latest {
        "DISTINCT ON (ts_id) "
    } else {
        ""
    };
    let order_dir = if request.temporal.latest { "DESC" } else { "" };

    let sql = format!(
        "SELECT {distinct_on}ts_id, {id_proj}, {pubtime_proj}, {data_id_proj}, {history_proj}, \
         {metadata_id_proj}, obstime_instant, {processing_level_proj}, {value_proj}, \
         ST_X(point::geometry), ST_Y(point::geometry) \
         FROM observation \
         JOIN geo_point gp ON observation.geo_point_id = gp.id \
         JOIN time_series ts ON ts.id = observation.ts_id \
         WHERE {where_expr} \
         ORDER BY ts_id, obstime_instant {order_dir}"
    );

    let query = filter::bind_params(sqlx::query(&sql), &params);
    let rows = query.fetch_all(backend.pool()).await?;

    let include_obstime = is_included(included, "obstime_instant");
    let include_geo_point = is_included(included, "geo_point");

    let mut obs_by_ts: HashMap<i64, Vec<ObsMetadata>> = HashMap::new();
    for row in rows {
        let ts_id: i64 = row.try_get(0)?;
        let id: Option<String> = row.try_get(1)?;
        let pubtime: Option<chrono::DateTime<chrono::Utc>> = row.try_get(2)?;
        let data_id: Option<String> = row.try_get(3)?;
        let history: Option<String> = row.try_get(4)?;
        let metadata_id: Option<String> = row.try_get(5)?;
        let obstime_instant: chrono::DateTime<chrono::Utc> = row.try_get(6)?;
        let processing_level: Option<String> = row.try_get(7)?;
        let value: Option<String> = row.try_get(8)?;
        let lon: f64 = row.try_get(9)?;
        let lat: f64 = row.try_get(10)?;

        let mut obs = ObsMetadata {
            id: id.unwrap_or_default(),
            geo_point: Some(crate::model::Point { lon, lat }),
            obstime_instant: Some(ObsTime::from_chrono(obstime_instant)),
            pubtime: pubtime.map(ObsTime::from_chrono),
            value: value.unwrap_or_default(),
            data_id: data_id.unwrap_or_default(),
            history: history.unwrap_or_default(),
            metadata_id: metadata_id.unwrap_or_default(),
            processing_level: processing_level.unwrap_or_default(),
        };
        if !include_obstime {
            obs.obstime_instant = None;
        }
        if !include_geo_point {
            obs.geo_point = None;
        }

        obs_by_ts.entry(ts_id).or_default().push(obs);
    }

    if obs_by_ts.is_empty() {
        return Ok(Vec::new());
    }

    let ts_ids: Vec<i64> = obs_by_ts.keys().copied().collect();
    let ts_mdata = fetch_ts_metadata(backend, &ts_ids, included).await?;

    let mut result = Vec::with_capacity(obs_by_ts.len());
    for (ts_id, obs_mdata) in obs_by_ts {
        let ts = ts_mdata.get(&ts_id).cloned().unwrap_or_default();
        result.push(Metadata2 {
            ts_mdata: ts,
            obs_mdata,
        });
    }
    Ok(result)
}

/// Fetches and generically scans `TsMetadata` for exactly the referenced ts_ids,
/// applying the same projection-pruning policy as observations.
async fn fetch_ts_metadata(
    backend: &PostgresBackend,
    ts_ids: &[i64],
    included: &[String],
) -> StoreResult<HashMap<i64, TsMetadata>> {
    let links_included = is_included(included, "links");
    let mut select_cols = Vec::new();
    for tag in LINK_TAGS {
        if links_included {
            select_cols.push(format!("link_{tag}"));
        } else {
            select_cols.push("NULL::text[]".to_string());
        }
    }
    for field in fields::ts_fields() {
        let cast = match field.kind {
            FieldKind::Int64 => "bigint",
            FieldKind::Str => "text",
        };
        select_cols.push(project(included, field.name, field.column, cast));
    }

    let sql = format!(
        "SELECT id, {} FROM time_series WHERE id = ANY($1)",
        select_cols.join(",")
    );

    let rows = sqlx::query(&sql)
        .bind(ts_ids)
        .fetch_all(backend.pool())
        .await?;

    let mut result = HashMap::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get(0)?;
        let mut ts = TsMetadata::default();

        let mut link_arrays: Vec<Vec<String>> = Vec::with_capacity(5);
        for i in 0..5 {
            let arr: Option<Vec<String>> = row.try_get(1 + i)?;
            link_arrays.push(arr.unwrap_or_default());
        }
        let link_count = link_arrays.iter().map(|a| a.len()).max().unwrap_or(0);
        for i in 0..link_count {
            ts.links.push(Link {
                href: link_arrays[0].get(i).cloned().unwrap_or_default(),
                rel: link_arrays[1].get(i).cloned().unwrap_or_default(),
                r#type: link_arrays[2].get(i).cloned().unwrap_or_default(),
                hreflang: link_arrays[3].get(i).cloned().unwrap_or_default(),
                title: link_arrays[4].get(i).cloned().unwrap_or_default(),
            });
        }

        let mut col_idx = 6; // id (0) + 5 link columns (1..=5)
        for field in fields::ts_fields() {
            match field.kind {
                FieldKind::Int64 => {
                    // NULL stays NULL (e.g. an unset `level`); `TsMetadata::default()`
                    // already leaves the field as `None`, so only a present value
                    // needs setting.
                    if let Some(v) = row.try_get::<Option<i64>, _>(col_idx)? {
                        (field.set)(&mut ts, ScalarValue::Int64(v));
                    }
                }
                FieldKind::Str => {
                    let v: Option<String> = row.try_get(col_idx)?;
                    (field.set)(&mut ts, ScalarValue::Str(v.unwrap_or_default()));
                }
            }
            col_idx += 1;
        }

        result.insert(id, ts);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_included_treats_empty_set_as_everything() {
        assert!(is_included(&[], "platform"));
    }

    #[test]
    fn is_included_checks_membership() {
        let included = vec!["platform".to_string()];
        assert!(is_included(&included, "platform"));
        assert!(!is_included(&included, "unit"));
    }

    #[test]
    fn validate_included_fields_rejects_unknown_name() {
        let included = vec!["not_a_field".to_string()];
        assert!(validate_included_fields(&included).is_err());
    }

    #[test]
    fn validate_included_fields_accepts_known_name() {
        let included = vec!["platform".to_string()];
        assert!(validate_included_fields(&included).is_ok());
    }

    #[test]
    fn project_emits_null_cast_when_excluded() {
        let included = vec!["platform".to_string()];
        assert_eq!(project(&included, "unit", "unit", "text"), "NULL::text");
        assert_eq!(project(&included, "platform", "platform", "text"), "platform");
    }
}
