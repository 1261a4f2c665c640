//! Create-if-missing bootstrap of the xenia tables used by this crate.
//!
//! Reference tables whose ids are allocated by the resolver (`obs_type`,
//! `uom_type`, `m_scalar_type`, `m_type`) carry unique constraints on their
//! natural keys so a conflicting allocation is detected by the store.

use tracing::info;

use xenia_common::{XeniaError, XeniaResult};

use crate::pool::DbPool;

/// Table names in creation order.
pub const TABLES: &[&str] = &[
    "organization",
    "platform_type",
    "platform",
    "obs_type",
    "uom_type",
    "m_scalar_type",
    "m_type",
    "sensor",
    "multi_obs",
];

/// Create all tables and indexes that do not exist yet.
pub async fn ensure_schema(pool: &DbPool) -> XeniaResult<()> {
    // Split SQL statements and execute them individually
    for statement in SCHEMA_SQL.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed)
                .execute(pool)
                .await
                .map_err(|e| XeniaError::Database(format!("Schema creation failed: {}", e)))?;
        }
    }
    info!(tables = TABLES.len(), "Schema verified");
    Ok(())
}

#[cfg(feature = "postgres")]
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS organization (
    row_id BIGSERIAL PRIMARY KEY,
    row_entry_date TIMESTAMP,
    row_update_date TIMESTAMP,
    short_name VARCHAR(50) NOT NULL UNIQUE,
    active INTEGER,
    long_name VARCHAR(200),
    description VARCHAR(1000),
    url VARCHAR(200)
);

CREATE TABLE IF NOT EXISTS platform_type (
    row_id BIGSERIAL PRIMARY KEY,
    type_name VARCHAR(50) NOT NULL UNIQUE,
    description VARCHAR(1000),
    short_name VARCHAR(50)
);

CREATE TABLE IF NOT EXISTS platform (
    row_id BIGSERIAL PRIMARY KEY,
    row_entry_date TIMESTAMP,
    row_update_date TIMESTAMP,
    organization_id BIGINT NOT NULL REFERENCES organization(row_id),
    type_id BIGINT REFERENCES platform_type(row_id),
    short_name VARCHAR(50),
    platform_handle VARCHAR(100) NOT NULL UNIQUE,
    fixed_longitude DOUBLE PRECISION,
    fixed_latitude DOUBLE PRECISION,
    active INTEGER,
    long_name VARCHAR(200),
    description VARCHAR(1000),
    url VARCHAR(200)
);

CREATE TABLE IF NOT EXISTS obs_type (
    row_id BIGINT PRIMARY KEY,
    standard_name VARCHAR(50) NOT NULL UNIQUE,
    definition VARCHAR(1000)
);

CREATE TABLE IF NOT EXISTS uom_type (
    row_id BIGINT PRIMARY KEY,
    standard_name VARCHAR(50) NOT NULL UNIQUE,
    definition VARCHAR(1000),
    display VARCHAR(50)
);

CREATE TABLE IF NOT EXISTS m_scalar_type (
    row_id BIGINT PRIMARY KEY,
    obs_type_id BIGINT NOT NULL REFERENCES obs_type(row_id),
    uom_type_id BIGINT NOT NULL REFERENCES uom_type(row_id),
    UNIQUE (obs_type_id, uom_type_id)
);

CREATE TABLE IF NOT EXISTS m_type (
    row_id BIGINT PRIMARY KEY,
    num_types INTEGER NOT NULL DEFAULT 1,
    description VARCHAR(1000),
    m_scalar_type_id BIGINT NOT NULL REFERENCES m_scalar_type(row_id),
    UNIQUE (m_scalar_type_id, num_types)
);

CREATE TABLE IF NOT EXISTS sensor (
    row_id BIGSERIAL PRIMARY KEY,
    row_entry_date TIMESTAMP,
    row_update_date TIMESTAMP,
    platform_id BIGINT NOT NULL REFERENCES platform(row_id),
    type_id BIGINT,
    short_name VARCHAR(50),
    m_type_id BIGINT NOT NULL REFERENCES m_type(row_id),
    fixed_z DOUBLE PRECISION,
    active INTEGER,
    s_order INTEGER NOT NULL DEFAULT 1,
    UNIQUE (platform_id, m_type_id, s_order)
);

CREATE TABLE IF NOT EXISTS multi_obs (
    row_id BIGSERIAL PRIMARY KEY,
    row_entry_date TIMESTAMP,
    row_update_date TIMESTAMP,
    platform_handle VARCHAR(100) NOT NULL,
    sensor_id BIGINT NOT NULL REFERENCES sensor(row_id),
    m_type_id BIGINT,
    m_date TIMESTAMP NOT NULL,
    m_lon DOUBLE PRECISION,
    m_lat DOUBLE PRECISION,
    m_z DOUBLE PRECISION,
    m_value DOUBLE PRECISION,
    qc_level INTEGER,
    UNIQUE (sensor_id, m_date)
);

CREATE INDEX IF NOT EXISTS idx_multi_obs_platform_date ON multi_obs(platform_handle, m_date);
"#;

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS organization (
    row_id INTEGER PRIMARY KEY,
    row_entry_date TIMESTAMP,
    row_update_date TIMESTAMP,
    short_name VARCHAR(50) NOT NULL UNIQUE,
    active INTEGER,
    long_name VARCHAR(200),
    description VARCHAR(1000),
    url VARCHAR(200)
);

CREATE TABLE IF NOT EXISTS platform_type (
    row_id INTEGER PRIMARY KEY,
    type_name VARCHAR(50) NOT NULL UNIQUE,
    description VARCHAR(1000),
    short_name VARCHAR(50)
);

CREATE TABLE IF NOT EXISTS platform (
    row_id INTEGER PRIMARY KEY,
    row_entry_date TIMESTAMP,
    row_update_date TIMESTAMP,
    organization_id INTEGER NOT NULL REFERENCES organization(row_id),
    type_id INTEGER REFERENCES platform_type(row_id),
    short_name VARCHAR(50),
    platform_handle VARCHAR(100) NOT NULL UNIQUE,
    fixed_longitude REAL,
    fixed_latitude REAL,
    active INTEGER,
    long_name VARCHAR(200),
    description VARCHAR(1000),
    url VARCHAR(200)
);

CREATE TABLE IF NOT EXISTS obs_type (
    row_id INTEGER PRIMARY KEY,
    standard_name VARCHAR(50) NOT NULL UNIQUE,
    definition VARCHAR(1000)
);

CREATE TABLE IF NOT EXISTS uom_type (
    row_id INTEGER PRIMARY KEY,
    standard_name VARCHAR(50) NOT NULL UNIQUE,
    definition VARCHAR(1000),
    display VARCHAR(50)
);

CREATE TABLE IF NOT EXISTS m_scalar_type (
    row_id INTEGER PRIMARY KEY,
    obs_type_id INTEGER NOT NULL REFERENCES obs_type(row_id),
    uom_type_id INTEGER NOT NULL REFERENCES uom_type(row_id),
    UNIQUE (obs_type_id, uom_type_id)
);

CREATE TABLE IF NOT EXISTS m_type (
    row_id INTEGER PRIMARY KEY,
    num_types INTEGER NOT NULL DEFAULT 1,
    description VARCHAR(1000),
    m_scalar_type_id INTEGER NOT NULL REFERENCES m_scalar_type(row_id),
    UNIQUE (m_scalar_type_id, num_types)
);

CREATE TABLE IF NOT EXISTS sensor (
    row_id INTEGER PRIMARY KEY,
    row_entry_date TIMESTAMP,
    row_update_date TIMESTAMP,
    platform_id INTEGER NOT NULL REFERENCES platform(row_id),
    type_id INTEGER,
    short_name VARCHAR(50),
    m_type_id INTEGER NOT NULL REFERENCES m_type(row_id),
    fixed_z REAL,
    active INTEGER,
    s_order INTEGER NOT NULL DEFAULT 1,
    UNIQUE (platform_id, m_type_id, s_order)
);

CREATE TABLE IF NOT EXISTS multi_obs (
    row_id INTEGER PRIMARY KEY,
    row_entry_date TIMESTAMP,
    row_update_date TIMESTAMP,
    platform_handle VARCHAR(100) NOT NULL,
    sensor_id INTEGER NOT NULL REFERENCES sensor(row_id),
    m_type_id INTEGER,
    m_date TIMESTAMP NOT NULL,
    m_lon REAL,
    m_lat REAL,
    m_z REAL,
    m_value REAL,
    qc_level INTEGER,
    UNIQUE (sensor_id, m_date)
);

CREATE INDEX IF NOT EXISTS idx_multi_obs_platform_date ON multi_obs(platform_handle, m_date);
"#;
