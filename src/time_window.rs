//! Validity-window policy: the `[lo, hi]` range within which observations are
//! accepted on write and visible on read, computed either dynamically (relative to
//! wall-clock) or statically (fixed, useful for tests).

use chrono::{DateTime, TimeZone, Utc};
use std::env;

/// Settings read from `DYNAMICTIME`/`LOTIME`/`HITIME`.
#[derive(Debug, Clone)]
pub struct ValidityWindowConfig {
    pub dynamic: bool,
    pub lo_secs: i64,
    pub hi_secs: i64,
}

const DEFAULT_LO_SECS: i64 = 86400;
const DEFAULT_HI_SECS: i64 = -600; // 10 minutes into the future

impl ValidityWindowConfig {
    pub fn from_env() -> Self {
        let dynamic = {
            let raw = env::var("DYNAMICTIME")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase();
            !(raw == "false" || raw == "no" || raw == "0")
        };

        let get_secs = |name: &str, default: i64, allow_iso8601: bool| -> i64 {
            let raw = env::var(name)
                .unwrap_or_else(|_| default.to_string())
                .to_lowercase();
            if let Ok(v) = raw.trim().parse::<i64>() {
                return v;
            }
            if allow_iso8601 {
                if let Some(t) = parse_iso8601(&raw) {
                    return t.timestamp();
                }
                tracing::warn!(
                    "failed to parse {name}={raw:?} as an int64 or ISO-8601 datetime of the \
                     form 2023-10-10T00:00:00Z; falling back to default secs: {default}"
                );
            } else {
                tracing::warn!(
                    "failed to parse {name}={raw:?} as an int64; falling back to default \
                     secs: {default}"
                );
            }
            default
        };

        let (mut lo_secs, mut hi_secs) = if dynamic {
            (
                get_secs("LOTIME", DEFAULT_LO_SECS, false),
                get_secs("HITIME", DEFAULT_HI_SECS, false),
            )
        } else {
            (
                get_secs("LOTIME", DEFAULT_LO_SECS, true),
                get_secs("HITIME", DEFAULT_HI_SECS, true),
            )
        };

        if !dynamic && hi_secs <= lo_secs {
            tracing::warn!(
                "hiTimeSecs ({hi_secs}) <= loTimeSecs ({lo_secs}); setting hiTimeSecs to \
                 loTimeSecs + 1"
            );
            hi_secs = lo_secs + 1;
        }
        // Dynamic mode can legitimately have hi_secs < lo_secs (e.g. default
        // lo=86400, hi=-600 means "from a day ago up to 10 minutes from now"), so the
        // hi<=lo repair only applies to the static case.
        if dynamic {
            // no repair: dynamic bounds are offsets from now, not absolute instants.
            let _ = &mut lo_secs;
        }

        Self {
            dynamic,
            lo_secs,
            hi_secs,
        }
    }

    /// Computes the current `[lo, hi]` validity window.
    pub fn current_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        if self.dynamic {
            let now = Utc::now().timestamp();
            (
                Utc.timestamp_opt(now - self.lo_secs, 0).unwrap(),
                Utc.timestamp_opt(now - self.hi_secs, 0).unwrap(),
            )
        } else {
            (
                Utc.timestamp_opt(self.lo_secs, 0).unwrap(),
                Utc.timestamp_opt(self.hi_secs, 0).unwrap(),
            )
        }
    }

    /// Human-readable settings summary, included in diagnostic write-rejection
    /// error messages so callers can see why an observation fell outside the window.
    pub fn settings_summary(&self) -> String {
        format!(
            "dynamic: {}; lo_secs: {}; hi_secs: {}",
            self.dynamic, self.lo_secs, self.hi_secs
        )
    }
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(&s.to_uppercase(), "%Y-%m-%dT%H:%M:%SZ")
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(&s.to_uppercase(), "%Y-%m-%dT%H:%M:%SZ")
                .ok()
                .map(|t| Utc.from_utc_datetime(&t))
        })
}
