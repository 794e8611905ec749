//! Filter composer: builds parameterized WHERE-clause fragments and
//! accumulates the positional bind values that go with them. Every fragment is
//! self-contained SQL text referencing `$1`-style placeholders whose numbers are
//! assigned from the shared [`ParamList`] the caller threads through a request.

use crate::errors::{StoreError, StoreResult};
use crate::fields::ScalarValue;
use crate::model::{Circle, Point, Polygon};
use regex::Regex;
use std::sync::OnceLock;

/// A positional `$N` bind-value accumulator, shared across every fragment built for
/// one request so placeholder numbers never collide.
#[derive(Debug, Default)]
pub struct ParamList {
    values: Vec<ScalarValue>,
}

impl ParamList {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Appends `value` and returns its 1-based placeholder index.
    pub fn push(&mut self, value: ScalarValue) -> usize {
        self.values.push(value);
        self.values.len()
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }
}

fn int64_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(-?\d+)\s*/\s*(-?\d+)\s*$").unwrap())
}

/// `(lower(col) LIKE lower($i)) OR …`, `*` translated to `%`. An empty pattern set
/// yields `TRUE` (no filtering on this column).
pub fn glob_match_string(column: &str, patterns: &[String], params: &mut ParamList) -> String {
    if patterns.is_empty() {
        return "TRUE".to_string();
    }
    let mut exprs = Vec::with_capacity(patterns.len());
    for ptn in patterns {
        let idx = params.push(ScalarValue::Str(ptn.replace('*', "%")));
        exprs.push(format!("(lower({column}) LIKE lower(${idx}))"));
    }
    format!("({})", exprs.join(" OR "))
}

/// Glob-or-range match on an int64 column. A pattern of the form `N/M` becomes a
/// range predicate `(col >= $i AND col <= $j)`; anything else is cast to text and
/// glob-matched case-insensitively, the same as a string column.
pub fn glob_or_range_match_int64(
    column: &str,
    patterns: &[String],
    params: &mut ParamList,
) -> String {
    if patterns.is_empty() {
        return "TRUE".to_string();
    }
    let mut exprs = Vec::with_capacity(patterns.len());
    for ptn in patterns {
        if let Some(caps) = int64_range_re().captures(ptn) {
            let lo: i64 = caps[1].parse().unwrap();
            let hi: i64 = caps[2].parse().unwrap();
            let lo_idx = params.push(ScalarValue::Int64(lo));
            let hi_idx = params.push(ScalarValue::Int64(hi));
            exprs.push(format!("({column} >= ${lo_idx} AND {column} <= ${hi_idx})"));
        } else {
            let idx = params.push(ScalarValue::Str(ptn.replace('*', "%")));
            exprs.push(format!("(lower({column}::text) LIKE lower(${idx}))"));
        }
    }
    format!("({})", exprs.join(" OR "))
}

/// Polygon intersection: `ST_DWITHIN(point, ST_GeomFromText($i, 4326)::geography,
/// 0.0)`. Absent polygon → `TRUE`. The ring is auto-closed; fewer than 4 points after
/// closure is an `InvalidArgument`.
pub fn polygon_filter(polygon: Option<&Polygon>, params: &mut ParamList) -> StoreResult<String> {
    let Some(polygon) = polygon else {
        return Ok("TRUE".to_string());
    };
    let ring = polygon.closed_ring();
    if ring.len() < 4 {
        return Err(StoreError::InvalidArgument(
            "polygon contains too few points".to_string(),
        ));
    }
    let wkt_points: Vec<String> = ring.iter().map(|p| format!("{} {}", p.lon, p.lat)).collect();
    let wkt = format!("polygon(({}))", wkt_points.join(","));
    let idx = params.push(ScalarValue::Str(wkt));
    Ok(format!(
        "ST_DWITHIN(point, ST_GeomFromText(${idx}, 4326)::geography, 0.0)"
    ))
}

/// Circle intersection: `ST_DWithin(point, ST_SetSRID(ST_MakePoint($lon, $lat))::geography,
/// 4326), $radius_m)`. Absent circle → `TRUE`.
pub fn circle_filter(circle: Option<&Circle>, params: &mut ParamList) -> StoreResult<String> {
    let Some(circle) = circle else {
        return Ok("TRUE".to_string());
    };
    if circle.radius_km < 0.0 {
        return Err(StoreError::InvalidArgument(
            "circle radius must be non-negative".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&circle.center.lat) || !(-180.0..=180.0).contains(&circle.center.lon) {
        return Err(StoreError::InvalidArgument(
            "circle center is out of range".to_string(),
        ));
    }
    let lon_idx = params.push(ScalarValue::F64(circle.center.lon));
    let lat_idx = params.push(ScalarValue::F64(circle.center.lat));
    let radius_idx = params.push(ScalarValue::F64(circle.radius_km * 1000.0));
    Ok(format!(
        "ST_DWithin(point, ST_SetSRID(ST_MakePoint(${lon_idx}, ${lat_idx}), 4326)::geography, ${radius_idx})"
    ))
}

/// Time filter: combines the mandatory validity window `[lo, hi]` with
/// the request's optional `[start, end)` (end exclusive). Absent interval bounds
/// only contribute the window guard.
pub fn time_filter(
    interval: Option<&crate::model::TimeInterval>,
    lo: chrono::DateTime<chrono::Utc>,
    hi: chrono::DateTime<chrono::Utc>,
    params: &mut ParamList,
) -> String {
    let mut exprs = Vec::new();
    if let Some(ti) = interval {
        if let Some(start) = ti.start {
            let idx = params.push(ScalarValue::F64(start.to_f64_secs()));
            exprs.push(format!("obstime_instant >= to_timestamp(${idx})"));
        }
        if let Some(end) = ti.end {
            let idx = params.push(ScalarValue::F64(end.to_f64_secs()));
            exprs.push(format!("obstime_instant < to_timestamp(${idx})"));
        }
    }
    let lo_idx = params.push(ScalarValue::F64(lo.timestamp() as f64));
    exprs.push(format!("obstime_instant >= to_timestamp(${lo_idx})"));
    let hi_idx = params.push(ScalarValue::F64(hi.timestamp() as f64));
    exprs.push(format!("obstime_instant <= to_timestamp(${hi_idx})"));
    format!("({})", exprs.join(" AND "))
}

/// Dispatches a client `filter` map entry to the right primitive: int64
/// glob-or-range for `level`, string glob for every other reflectable field. Unknown
/// field names fail `InvalidArgument`.
pub fn mdata_filter(
    filter: &std::collections::HashMap<String, crate::model::FilterValues>,
    params: &mut ParamList,
) -> StoreResult<String> {
    let mut exprs = Vec::new();
    for (name, values) in filter {
        if let Some(field) = crate::fields::ts_field_by_name(name) {
            let expr = match field.kind {
                crate::fields::FieldKind::Int64 => {
                    glob_or_range_match_int64(field.column, &values.values, params)
                }
                crate::fields::FieldKind::Str => {
                    glob_match_string(field.column, &values.values, params)
                }
            };
            exprs.push(expr);
        } else if let Some(field) = crate::fields::obs_field_by_name(name) {
            exprs.push(glob_match_string(field.column, &values.values, params));
        } else {
            return Err(StoreError::InvalidArgument(format!(
                "unknown metadata field '{name}'"
            )));
        }
    }
    Ok(and_join(&exprs))
}

/// Binds every accumulated [`ParamList`] value onto `query`, in order, so `$1..$N`
/// line up with the fragments [`glob_match_string`]/[`glob_or_range_match_int64`]/
/// [`polygon_filter`]/[`circle_filter`]/[`time_filter`] emitted.
pub fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &ParamList,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for value in params.values() {
        query = match value {
            ScalarValue::Int64(v) => query.bind(*v),
            ScalarValue::Str(v) => query.bind(v.clone()),
            ScalarValue::F64(v) => query.bind(*v),
        };
    }
    query
}

/// AND-joins a sequence of already-built fragments, short-circuiting on `TRUE` to
/// keep the generated SQL readable; an empty sequence is `TRUE`.
pub fn and_join(exprs: &[String]) -> String {
    let nontrivial: Vec<&str> = exprs
        .iter()
        .map(String::as_str)
        .filter(|e| *e != "TRUE")
        .collect();
    if nontrivial.is_empty() {
        "TRUE".to_string()
    } else {
        format!("({})", nontrivial.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn glob_match_string_empty_is_true() {
        let mut params = ParamList::new();
        assert_eq!(glob_match_string("platform", &[], &mut params), "TRUE");
        assert!(params.values().is_empty());
    }

    #[test]
    fn glob_match_string_translates_asterisk_and_binds_param() {
        let mut params = ParamList::new();
        let expr = glob_match_string("platform", &["stn-*".to_string()], &mut params);
        assert_eq!(expr, "(lower(platform) LIKE lower($1))");
        assert_eq!(params.values()[0], ScalarValue::Str("stn-%".to_string()));
    }

    #[test]
    fn glob_match_string_ors_multiple_patterns() {
        let mut params = ParamList::new();
        let expr = glob_match_string(
            "platform",
            &["a".to_string(), "b".to_string()],
            &mut params,
        );
        assert_eq!(
            expr,
            "((lower(platform) LIKE lower($1)) OR (lower(platform) LIKE lower($2)))"
        );
    }

    #[test]
    fn int64_range_pattern_emits_range_predicate() {
        let mut params = ParamList::new();
        let expr = glob_or_range_match_int64("level", &["2/5".to_string()], &mut params);
        assert_eq!(expr, "((level >= $1 AND level <= $2))");
        assert_eq!(params.values()[0], ScalarValue::Int64(2));
        assert_eq!(params.values()[1], ScalarValue::Int64(5));
    }

    #[test]
    fn int64_range_pattern_allows_negative_bounds() {
        let mut params = ParamList::new();
        let expr = glob_or_range_match_int64("level", &["-10/-2".to_string()], &mut params);
        assert_eq!(expr, "((level >= $1 AND level <= $2))");
        assert_eq!(params.values()[0], ScalarValue::Int64(-10));
    }

    #[test]
    fn non_range_int64_pattern_falls_back_to_text_glob() {
        let mut params = ParamList::new();
        let expr = glob_or_range_match_int64("level", &["2*".to_string()], &mut params);
        assert_eq!(expr, "((lower(level::text) LIKE lower($1)))");
        assert_eq!(params.values()[0], ScalarValue::Str("2%".to_string()));
    }

    #[test]
    fn polygon_filter_absent_is_true() {
        let mut params = ParamList::new();
        let expr = polygon_filter(None, &mut params).unwrap();
        assert_eq!(expr, "TRUE");
    }

    #[test]
    fn polygon_filter_rejects_too_few_points() {
        let mut params = ParamList::new();
        let poly = Polygon {
            points: vec![Point { lon: 0.0, lat: 0.0 }, Point { lon: 1.0, lat: 1.0 }],
        };
        let err = polygon_filter(Some(&poly), &mut params).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn polygon_filter_builds_wkt_param() {
        let mut params = ParamList::new();
        let poly = Polygon {
            points: vec![
                Point { lon: 0.0, lat: 0.0 },
                Point { lon: 1.0, lat: 0.0 },
                Point { lon: 1.0, lat: 1.0 },
            ],
        };
        let expr = polygon_filter(Some(&poly), &mut params).unwrap();
        assert_eq!(
            expr,
            "ST_DWITHIN(point, ST_GeomFromText($1, 4326)::geography, 0.0)"
        );
        assert_eq!(params.values().len(), 1);
    }

    #[test]
    fn circle_filter_rejects_negative_radius() {
        let mut params = ParamList::new();
        let circle = Circle {
            center: Point { lon: 0.0, lat: 0.0 },
            radius_km: -1.0,
        };
        let err = circle_filter(Some(&circle), &mut params).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn circle_filter_rejects_out_of_range_center() {
        let mut params = ParamList::new();
        let circle = Circle {
            center: Point { lon: 200.0, lat: 0.0 },
            radius_km: 1.0,
        };
        assert!(circle_filter(Some(&circle), &mut params).is_err());
    }

    #[test]
    fn circle_filter_builds_three_params() {
        let mut params = ParamList::new();
        let circle = Circle {
            center: Point { lon: 10.0, lat: 60.0 },
            radius_km: 5.0,
        };
        let expr = circle_filter(Some(&circle), &mut params).unwrap();
        assert!(expr.starts_with("ST_DWithin(point, ST_SetSRID(ST_MakePoint($1, $2)"));
        assert_eq!(params.values().len(), 3);
    }

    #[test]
    fn and_join_drops_true_fragments() {
        let joined = and_join(&["TRUE".to_string(), "(a = 1)".to_string()]);
        assert_eq!(joined, "(a = 1)");
    }

    #[test]
    fn and_join_of_all_true_is_true() {
        assert_eq!(and_join(&["TRUE".to_string(), "TRUE".to_string()]), "TRUE");
    }

    #[test]
    fn time_filter_always_includes_the_validity_window() {
        let mut params = ParamList::new();
        let lo = chrono::Utc.timestamp_opt(1000, 0).unwrap();
        let hi = chrono::Utc.timestamp_opt(2000, 0).unwrap();
        let expr = time_filter(None, lo, hi, &mut params);
        assert_eq!(
            expr,
            "(obstime_instant >= to_timestamp($1) AND obstime_instant <= to_timestamp($2))"
        );
        assert_eq!(params.values()[0].as_f64(), Some(1000.0));
    }

    #[test]
    fn time_filter_adds_interval_bounds_before_the_window() {
        use crate::model::{ObsTime, TimeInterval};
        let mut params = ParamList::new();
        let interval = TimeInterval {
            start: Some(ObsTime::new(500, 0)),
            end: Some(ObsTime::new(1500, 0)),
        };
        let lo = chrono::Utc.timestamp_opt(1000, 0).unwrap();
        let hi = chrono::Utc.timestamp_opt(2000, 0).unwrap();
        let expr = time_filter(Some(&interval), lo, hi, &mut params);
        assert_eq!(
            expr,
            "(obstime_instant >= to_timestamp($1) AND obstime_instant < to_timestamp($2) AND \
             obstime_instant >= to_timestamp($3) AND obstime_instant <= to_timestamp($4))"
        );
        assert_eq!(params.values().len(), 4);
    }

    #[test]
    fn mdata_filter_rejects_unknown_field() {
        use crate::model::FilterValues;
        let mut filter = std::collections::HashMap::new();
        filter.insert(
            "not_a_field".to_string(),
            FilterValues {
                values: vec!["x".to_string()],
            },
        );
        let mut params = ParamList::new();
        let err = mdata_filter(&filter, &mut params).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn mdata_filter_dispatches_int64_field_to_range_matcher() {
        use crate::model::FilterValues;
        let mut filter = std::collections::HashMap::new();
        filter.insert(
            "level".to_string(),
            FilterValues {
                values: vec!["1/3".to_string()],
            },
        );
        let mut params = ParamList::new();
        let expr = mdata_filter(&filter, &mut params).unwrap();
        assert_eq!(expr, "((level >= $1 AND level <= $2))");
    }

    #[test]
    fn mdata_filter_dispatches_string_field_to_glob_matcher() {
        use crate::model::FilterValues;
        let mut filter = std::collections::HashMap::new();
        filter.insert(
            "platform".to_string(),
            FilterValues {
                values: vec!["stn-*".to_string()],
            },
        );
        let mut params = ParamList::new();
        let expr = mdata_filter(&filter, &mut params).unwrap();
        assert_eq!(expr, "(lower(platform) LIKE lower($1))");
    }
}
