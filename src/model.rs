//! Data model: the value types exchanged across the `StorageBackend` contract.
//!
//! Timestamps are carried internally as `ObsTime { seconds, nanos }` rather than a
//! floating-point or driver-native type; conversion to `f64` seconds happens only
//! at the SQL boundary (see [`ObsTime::to_f64_secs`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A timestamp with nanosecond resolution, encoded as seconds plus fractional nanos,
/// the same shape the wire protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObsTime {
    pub seconds: i64,
    pub nanos: i32,
}

impl ObsTime {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    /// Converts to the double-seconds representation used when composing SQL
    /// (`to_timestamp(seconds + nanos/1e9)`).
    pub fn to_f64_secs(self) -> f64 {
        self.seconds as f64 + (self.nanos as f64) / 1e9
    }

    pub fn from_chrono(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos() as i32,
        }
    }

    pub fn to_chrono(self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(self.seconds, self.nanos.max(0) as u32)
            .unwrap_or_else(|| chrono::DateTime::from_timestamp(self.seconds, 0).unwrap())
    }
}

/// One element of the time-series `links` parallel-array bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
    pub r#type: String,
    pub hreflang: String,
    pub title: String,
}

/// Time-series identifying metadata. `level` is the sole int64 scalar
/// attribute; every other named field is a reflectable string attribute. The
/// uniqueness constraint over a schema-declared subset of these fields defines
/// time-series identity; it is never hard-coded here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TsMetadata {
    pub links: Vec<Link>,

    pub level: Option<i64>,

    pub version: String,
    pub r#type: String,
    pub title: String,
    pub summary: String,
    pub keywords: String,
    pub keywords_vocabulary: String,
    pub license: String,
    pub conventions: String,
    pub naming_authority: String,
    pub creator_type: String,
    pub creator_name: String,
    pub creator_email: String,
    pub creator_url: String,
    pub institution: String,
    pub project: String,
    pub source: String,
    pub platform: String,
    pub platform_vocabulary: String,
    pub standard_name: String,
    pub unit: String,
    pub instrument: String,
    pub instrument_vocabulary: String,
    pub function: String,
    pub period: String,
}

/// A geographic point (lon, lat), WGS84 (SRID 4326).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
}

/// A closed ring of points defining an area of interest. Auto-closed (first point
/// repeated as last) by [`Polygon::closed_ring`] if the caller didn't already close
/// it; must have at least 4 points after closure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
}

/// A circular area of interest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

/// `[start, end)`, `end` is exclusive, both bounds optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: Option<ObsTime>,
    pub end: Option<ObsTime>,
}

/// Observation metadata. `ts_id`/`geo_point_id` are resolved internally by the
/// upsert engine and are not part of the client-facing struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObsMetadata {
    pub id: String,
    pub geo_point: Option<Point>,
    pub obstime_instant: Option<ObsTime>,
    pub pubtime: Option<ObsTime>,
    pub value: String,
    pub data_id: String,
    pub history: String,
    pub metadata_id: String,
    pub processing_level: String,
}

/// One element of a `put_observations` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    pub ts_mdata: TsMetadata,
    pub obs_mdata: ObsMetadata,
}

/// One element of a `get_observations` response: a time-series and all matching
/// observations for it, ordered chronologically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata2 {
    pub ts_mdata: TsMetadata,
    pub obs_mdata: Vec<ObsMetadata>,
}

/// A combination of selected metadata columns, optionally with the full instances
/// that share it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TsMdataGroup {
    pub combo: TsMetadata,
    pub instances: Option<Vec<TsMetadata>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TemporalExtent {
    pub start: ObsTime,
    pub end: ObsTime,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Extents {
    pub temporal: TemporalExtent,
    pub spatial: SpatialExtent,
}

/// Read-mode selector: either a bounded/unbounded interval, or "latest" (at most
/// one, the newest, observation per time-series).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalSpec {
    pub latest: bool,
    pub interval: Option<TimeInterval>,
}

/// Patterns for a single metadata field in a client-supplied filter map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterValues {
    pub values: Vec<String>,
}

/// `get_observations` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetObsRequest {
    pub spatial_polygon: Option<Polygon>,
    pub spatial_circle: Option<Circle>,
    pub temporal: TemporalSpec,
    pub filter: HashMap<String, FilterValues>,
    pub included_response_fields: Vec<String>,
}

/// `get_ts_attr_groups` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetTsAttrGroupsRequest {
    pub attrs: Vec<String>,
    pub include_instances: bool,
}

/// `get_extents` request. Reuses the same string-metadata filter shape as
/// reads; geo/temporal filtering of extents is not part of the contract (extents are
/// always computed over the full matching set, time-windowed by the validity
/// window).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetExtentsRequest {
    pub filter: HashMap<String, FilterValues>,
}

impl Polygon {
    /// Returns the ring closed (first point repeated as last if not already equal).
    pub fn closed_ring(&self) -> Vec<Point> {
        let mut pts = self.points.clone();
        if let (Some(first), Some(last)) = (pts.first().copied(), pts.last().copied()) {
            if (first.lat - last.lat).abs() > f64::EPSILON
                || (first.lon - last.lon).abs() > f64::EPSILON
            {
                pts.push(first);
            }
        }
        pts
    }
}
