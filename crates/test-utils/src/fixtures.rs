//! Mapping documents and source data used across the test suite.

/// Platform used by the ingestion scenarios.
pub const BUOY_HANDLE: &str = "noaa.buoy1";

/// Maps the `DATE_UTC` column to the timestamp and `WSPD` to wind speed.
pub const WIND_MAPPING_JSON: &str = r#"[
    {"target_obs": "m_date", "header_column": "DATE_UTC"},
    {"target_obs": "wind_speed", "target_uom": "m_s-1", "header_column": "WSPD", "source_uom": "m_s-1", "s_order": 1}
]"#;

/// Wind speed, air temperature and a second, lower wind sensor.
pub const MULTI_SENSOR_MAPPING_JSON: &str = r#"[
    {"target_obs": "m_date", "header_column": "DATE_UTC"},
    {"target_obs": "wind_speed", "target_uom": "m_s-1", "header_column": "WSPD", "s_order": 1},
    {"target_obs": "wind_speed", "target_uom": "m_s-1", "header_column": "WSPD2", "s_order": 2},
    {"target_obs": "air_temperature", "target_uom": "celsius", "header_column": "ATMP"}
]"#;

/// Three hourly wind speed rows; the second has no value.
pub const WIND_CSV: &str = "\
DATE_UTC,WSPD
2024-03-01T00:00:00Z,4.2
2024-03-01T01:00:00Z,
2024-03-01T02:00:00Z,6.5
";

/// Settings file pointing at an SQLite database, `{path}` to be replaced.
pub const SQLITE_SETTINGS_YAML: &str = "\
Database:
  db_type: sqlite
  file_path: \"{path}\"
records_before_commit: 2
queue_capacity: 16
";

/// Settings text for an SQLite database at `path`.
pub fn sqlite_settings_yaml(path: &std::path::Path) -> String {
    SQLITE_SETTINGS_YAML.replace("{path}", &path.display().to_string())
}
