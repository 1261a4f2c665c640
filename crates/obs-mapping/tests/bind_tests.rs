//! Binding mappings against a SQLite store.

#![cfg(all(feature = "sqlite", not(feature = "postgres")))]

use obs_mapping::{MappingError, ObsMapping, PlatformObsRegistry, SearchFilter};
use xenia_common::{PlatformHandle, TaxonomyLink, XeniaError};
use xenia_storage::{connect, ensure_schema, DatabaseConfig, EntityResolver};

async fn resolver() -> (tempfile::TempDir, EntityResolver) {
    let (dir, path) = test_utils::temp_sqlite_path();
    let pool = connect(&DatabaseConfig::sqlite(&path).unwrap()).await.unwrap();
    ensure_schema(&pool).await.unwrap();
    (dir, EntityResolver::new(pool))
}

#[tokio::test]
async fn test_bind_creates_sensor_and_skips_date() {
    let (_dir, resolver) = resolver().await;
    let handle = PlatformHandle::parse(test_utils::BUOY_HANDLE).unwrap();
    let mut mapping = ObsMapping::from_json_str(test_utils::WIND_MAPPING_JSON).unwrap();

    mapping.bind(&resolver, &handle, true).await.unwrap();

    assert_eq!(mapping.len(), 2);
    let wind = mapping.by_target_name("wind_speed").unwrap();
    let sensor_id = wind.sensor_id.unwrap();
    assert!(wind.m_type_id.is_some());
    assert_eq!(
        resolver
            .sensor_exists("wind_speed", "m_s-1", test_utils::BUOY_HANDLE, 1)
            .await
            .unwrap(),
        Some(sensor_id)
    );

    let date = mapping.date_field().unwrap();
    assert_eq!(date.sensor_id, None);
    assert_eq!(date.m_type_id, None);
}

#[tokio::test]
async fn test_rebinding_reuses_sensors() {
    let (_dir, resolver) = resolver().await;
    let handle = PlatformHandle::parse(test_utils::BUOY_HANDLE).unwrap();

    let mut first = ObsMapping::from_json_str(test_utils::MULTI_SENSOR_MAPPING_JSON).unwrap();
    first.bind(&resolver, &handle, true).await.unwrap();
    let mut second = ObsMapping::from_json_str(test_utils::MULTI_SENSOR_MAPPING_JSON).unwrap();
    second.bind(&resolver, &handle, false).await.unwrap();

    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.sensor_id, b.sensor_id);
    }
    let wspd = first.by_source_name("WSPD").unwrap();
    let wspd2 = first.by_source_name("WSPD2").unwrap();
    assert_ne!(wspd.sensor_id, wspd2.sensor_id);
    assert_eq!(wspd.m_type_id, wspd2.m_type_id);
}

#[tokio::test]
async fn test_bind_without_taxonomy_fails() {
    let (_dir, resolver) = resolver().await;
    let handle = PlatformHandle::parse(test_utils::BUOY_HANDLE).unwrap();
    let mut mapping = ObsMapping::from_json_str(test_utils::WIND_MAPPING_JSON).unwrap();

    let err = mapping.bind(&resolver, &handle, false).await.unwrap_err();
    assert!(matches!(
        err,
        MappingError::Store(XeniaError::MissingTaxonomy {
            link: TaxonomyLink::ObservationType,
            ..
        })
    ));
    assert!(mapping.by_target_name("wind_speed").unwrap().sensor_id.is_none());
    assert!(resolver.observation_type_exists("wind_speed").await.unwrap().is_none());

    // The platform is resolved before the taxonomy check and survives it.
    assert!(resolver.organization_exists("noaa").await.unwrap().is_some());
    assert!(resolver
        .platform_exists(test_utils::BUOY_HANDLE)
        .await
        .unwrap()
        .is_some());
    assert!(resolver
        .sensor_exists("wind_speed", "m_s-1", test_utils::BUOY_HANDLE, 1)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_bind_requires_unit() {
    let (_dir, resolver) = resolver().await;
    let handle = PlatformHandle::parse(test_utils::BUOY_HANDLE).unwrap();
    let json = r#"[{"target_obs": "wind_speed", "header_column": "WSPD"}]"#;
    let mut mapping = ObsMapping::from_json_str(json).unwrap();

    assert!(matches!(
        mapping.bind(&resolver, &handle, true).await,
        Err(MappingError::MissingUnit(obs)) if obs == "wind_speed"
    ));
}

#[tokio::test]
async fn test_registry_of_bound_records() {
    let (_dir, resolver) = resolver().await;
    let handle = PlatformHandle::parse(test_utils::BUOY_HANDLE).unwrap();
    let mut mapping = ObsMapping::from_json_str(test_utils::WIND_MAPPING_JSON).unwrap();
    mapping.bind(&resolver, &handle, true).await.unwrap();

    let mut registry = PlatformObsRegistry::new();
    for record in &mapping {
        assert!(registry.add(handle.as_str(), record.clone()));
    }
    let wind_sensor = mapping.by_source_name("WSPD").unwrap().sensor_id.unwrap();
    assert_eq!(
        registry
            .find(handle.as_str(), SearchFilter::SensorId(wind_sensor))
            .unwrap()
            .target_obs,
        "wind_speed"
    );
    assert!(!registry.add(handle.as_str(), mapping.by_source_name("WSPD").unwrap().clone()));
}
