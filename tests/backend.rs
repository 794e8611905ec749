//! Integration tests for the PostgreSQL-backed storage engine. Each test
//! gets a freshly migrated, isolated database via `#[sqlx::test]`, which applies
//! `migrations/0001_init.sql` automatically.

use chrono::{Duration, Utc};
use met_obs_datastore::backend::PostgresBackend;
use met_obs_datastore::config::BackendConfig;
use met_obs_datastore::model::{
    Circle, GetExtentsRequest, GetObsRequest, GetTsAttrGroupsRequest, ObsMetadata, ObsTime,
    Observation, Point, TemporalSpec, TsMetadata,
};
use met_obs_datastore::StorageBackend;
use sqlx::PgPool;

fn test_config() -> BackendConfig {
    BackendConfig {
        db: met_obs_datastore::config::DbConfig {
            host: "unused".to_string(),
            port: 0,
            user: "unused".to_string(),
            password: String::new(),
            dbname: "unused".to_string(),
        },
        cleanup_interval_secs: 86400,
        put_obs_limit: 100000,
    }
}

fn sample_observation(platform: &str, obstime: ObsTime) -> Observation {
    Observation {
        ts_mdata: TsMetadata {
            platform: platform.to_string(),
            standard_name: "air_temperature".to_string(),
            naming_authority: "no.met".to_string(),
            level: Some(0),
            ..Default::default()
        },
        obs_mdata: ObsMetadata {
            id: "obs-1".to_string(),
            geo_point: Some(Point { lon: 10.0, lat: 60.0 }),
            obstime_instant: Some(obstime),
            value: "5.3".to_string(),
            ..Default::default()
        },
    }
}

#[sqlx::test]
async fn put_then_get_observations_round_trips(pool: PgPool) -> sqlx::Result<()> {
    let config = test_config();
    let backend = PostgresBackend::from_pool(pool, &config)
        .await
        .expect("backend construction should succeed against a migrated database");

    let now = ObsTime::from_chrono(Utc::now());
    let obs = sample_observation("stn-01", now);

    backend
        .put_observations(vec![obs])
        .await
        .expect("put_observations should accept a single valid observation");

    let results = backend
        .get_observations(GetObsRequest {
            temporal: TemporalSpec {
                latest: false,
                interval: None,
            },
            ..Default::default()
        })
        .await
        .expect("get_observations should succeed");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].ts_mdata.platform, "stn-01");
    assert_eq!(results[0].obs_mdata.len(), 1);
    assert_eq!(results[0].obs_mdata[0].value, "5.3");

    Ok(())
}

#[sqlx::test]
async fn repeated_writes_for_the_same_time_series_reuse_one_ts_id(pool: PgPool) -> sqlx::Result<()> {
    let config = test_config();
    let backend = PostgresBackend::from_pool(pool, &config).await.unwrap();

    let now = Utc::now();
    let obs_a = sample_observation("stn-02", ObsTime::from_chrono(now));
    let obs_b = sample_observation("stn-02", ObsTime::from_chrono(now - Duration::minutes(5)));

    backend
        .put_observations(vec![obs_a, obs_b])
        .await
        .expect("batched put_observations should succeed");

    let results = backend
        .get_observations(GetObsRequest {
            temporal: TemporalSpec {
                latest: false,
                interval: None,
            },
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 1, "both observations share one time series");
    assert_eq!(results[0].obs_mdata.len(), 2);

    Ok(())
}

#[sqlx::test]
async fn latest_mode_returns_one_row_per_time_series(pool: PgPool) -> sqlx::Result<()> {
    let config = test_config();
    let backend = PostgresBackend::from_pool(pool, &config).await.unwrap();

    let now = Utc::now();
    let newer = ObsTime::from_chrono(now);
    let older = ObsTime::from_chrono(now - Duration::minutes(30));

    backend
        .put_observations(vec![
            sample_observation("stn-03", older),
            sample_observation("stn-03", newer),
        ])
        .await
        .unwrap();

    let results = backend
        .get_observations(GetObsRequest {
            temporal: TemporalSpec {
                latest: true,
                interval: None,
            },
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].obs_mdata.len(), 1);
    assert_eq!(
        results[0].obs_mdata[0].obstime_instant.unwrap().seconds,
        newer.seconds
    );

    Ok(())
}

#[sqlx::test]
async fn put_observations_rejects_obstime_outside_the_validity_window(pool: PgPool) -> sqlx::Result<()> {
    let config = test_config();
    let backend = PostgresBackend::from_pool(pool, &config).await.unwrap();

    let far_future = ObsTime::from_chrono(Utc::now() + Duration::days(365));
    let obs = sample_observation("stn-04", far_future);

    let result = backend.put_observations(vec![obs]).await;
    assert!(result.is_err());

    Ok(())
}

#[sqlx::test]
async fn circle_filter_excludes_points_outside_radius(pool: PgPool) -> sqlx::Result<()> {
    let config = test_config();
    let backend = PostgresBackend::from_pool(pool, &config).await.unwrap();

    let now = ObsTime::from_chrono(Utc::now());
    backend
        .put_observations(vec![sample_observation("stn-05", now)])
        .await
        .unwrap();

    let far_circle = GetObsRequest {
        spatial_circle: Some(Circle {
            center: Point { lon: -10.0, lat: -10.0 },
            radius_km: 1.0,
        }),
        temporal: TemporalSpec {
            latest: false,
            interval: None,
        },
        ..Default::default()
    };
    let results = backend.get_observations(far_circle).await.unwrap();
    assert!(results.is_empty());

    Ok(())
}

#[sqlx::test]
async fn get_extents_reports_not_found_when_nothing_matches(pool: PgPool) -> sqlx::Result<()> {
    let config = test_config();
    let backend = PostgresBackend::from_pool(pool, &config).await.unwrap();

    let result = backend.get_extents(GetExtentsRequest::default()).await;
    assert!(matches!(
        result,
        Err(met_obs_datastore::StoreError::NotFound(_))
    ));

    Ok(())
}

#[sqlx::test]
async fn repeated_writes_with_unset_level_reuse_one_ts_id(pool: PgPool) -> sqlx::Result<()> {
    let config = test_config();
    let backend = PostgresBackend::from_pool(pool, &config).await.unwrap();

    let now = Utc::now();
    let mut obs_a = sample_observation("stn-08", ObsTime::from_chrono(now));
    obs_a.ts_mdata.level = None;
    let mut obs_b = sample_observation("stn-08", ObsTime::from_chrono(now - Duration::minutes(5)));
    obs_b.ts_mdata.level = None;

    backend
        .put_observations(vec![obs_a, obs_b])
        .await
        .expect("an unset level is a valid, dedupable time-series identity");

    let results = backend
        .get_observations(GetObsRequest {
            temporal: TemporalSpec {
                latest: false,
                interval: None,
            },
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(
        results.len(),
        1,
        "both observations share one time series despite level being unset"
    );
    assert_eq!(results[0].ts_mdata.level, None);
    assert_eq!(results[0].obs_mdata.len(), 2);

    Ok(())
}

#[sqlx::test]
async fn attr_groups_distinct_mode_deduplicates_combos(pool: PgPool) -> sqlx::Result<()> {
    let config = test_config();
    let backend = PostgresBackend::from_pool(pool, &config).await.unwrap();

    let now = Utc::now();
    backend
        .put_observations(vec![
            sample_observation("stn-06", ObsTime::from_chrono(now)),
            sample_observation("stn-06", ObsTime::from_chrono(now - Duration::minutes(1))),
            sample_observation("stn-07", ObsTime::from_chrono(now)),
        ])
        .await
        .unwrap();

    let groups = backend
        .get_ts_attr_groups(GetTsAttrGroupsRequest {
            attrs: vec!["platform".to_string()],
            include_instances: false,
        })
        .await
        .unwrap();

    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|g| g.instances.is_none()));

    Ok(())
}
