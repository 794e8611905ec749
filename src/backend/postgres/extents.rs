//! Extents engine: temporal min/max and spatial bounding box over the filtered
//! observation set, reusing the same time/metadata filters as reads.

use super::PostgresBackend;
use crate::errors::{StoreError, StoreResult};
use crate::filter::{self, ParamList};
use crate::model::{BoundingBox, Extents, GetExtentsRequest, ObsTime, SpatialExtent, TemporalExtent};
use sqlx::Row;

pub async fn get_extents(
    backend: &PostgresBackend,
    request: GetExtentsRequest,
) -> StoreResult<Extents> {
    let mut params = ParamList::new();
    let (lo, hi) = backend.window.current_window();
    let time_expr = filter::time_filter(None, lo, hi, &mut params);
    let mdata_expr = filter::mdata_filter(&request.filter, &mut params)?;
    let where_expr = filter::and_join(&[time_expr, mdata_expr]);

    let sql = format!(
        "SELECT min(obstime_instant), max(obstime_instant), ST_Extent(point::geometry) \
         FROM observation \
         JOIN geo_point gp ON observation.geo_point_id = gp.id \
         JOIN time_series ts ON ts.id = observation.ts_id \
         WHERE {where_expr}"
    );

    let query = filter::bind_params(sqlx::query(&sql), &params);
    let row = query.fetch_one(backend.pool()).await?;

    let start: Option<chrono::DateTime<chrono::Utc>> = row.try_get(0)?;
    let end: Option<chrono::DateTime<chrono::Utc>> = row.try_get(1)?;
    let box2d: Option<String> = row.try_get(2)?;

    let (Some(start), Some(end), Some(box2d)) = (start, end, box2d) else {
        return Err(StoreError::NotFound(
            "no observations matched the given filter".to_string(),
        ));
    };

    let bbox = parse_box2d(&box2d).ok_or_else(|| {
        StoreError::Internal(format!("unexpected ST_Extent() output: '{box2d}'"))
    })?;

    Ok(Extents {
        temporal: TemporalExtent {
            start: ObsTime::from_chrono(start),
            end: ObsTime::from_chrono(end),
        },
        spatial: SpatialExtent { bbox },
    })
}

/// Parses PostGIS's `BOX(left bottom,right top)` textual representation of
/// `ST_Extent`.
fn parse_box2d(s: &str) -> Option<BoundingBox> {
    let open = s.find('(')?;
    let close = s.rfind(')')?;
    let inner = &s[open + 1..close];
    let (lower, upper) = inner.split_once(',')?;
    let mut lower_parts = lower.split_whitespace();
    let mut upper_parts = upper.split_whitespace();
    let left: f64 = lower_parts.next()?.parse().ok()?;
    let bottom: f64 = lower_parts.next()?.parse().ok()?;
    let right: f64 = upper_parts.next()?.parse().ok()?;
    let top: f64 = upper_parts.next()?.parse().ok()?;
    Some(BoundingBox {
        left,
        bottom,
        right,
        top,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_box2d_extracts_four_corners() {
        let bbox = parse_box2d("BOX(10.5 59.9,10.8 60.1)").unwrap();
        assert_eq!(bbox.left, 10.5);
        assert_eq!(bbox.bottom, 59.9);
        assert_eq!(bbox.right, 10.8);
        assert_eq!(bbox.top, 60.1);
    }

    #[test]
    fn parse_box2d_rejects_malformed_input() {
        assert!(parse_box2d("not a box").is_none());
    }
}
