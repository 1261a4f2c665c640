//! Ingestion pipeline: mapped source rows to stored observations.

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, error, info, instrument, warn};

use obs_mapping::{ObsMapping, PlatformObsRegistry};
use xenia_common::{parse_obs_time, Observation, PlatformHandle, XeniaError};
use xenia_storage::{
    connect, ensure_schema, EntityResolver, WriterHandle, WriterReport, WriterState,
};

use crate::config::IngesterConfig;
use crate::sources::ObservationSource;

/// Outcome of ingesting one source.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    /// Data rows read
    pub rows: u64,
    /// Rows dropped because their timestamp was missing or invalid
    pub rows_skipped: u64,
    /// Observations handed to the writer
    pub observations: u64,
    /// Cells that could not be read as numbers
    pub bad_values: u64,
    pub writer: WriterReport,
}

/// Main ingestion pipeline.
pub struct IngestionPipeline {
    config: IngesterConfig,
    resolver: EntityResolver,
    registry: PlatformObsRegistry,
}

impl IngestionPipeline {
    /// Connect to the configured store, creating missing tables when
    /// `init_schema` is set.
    pub async fn new(config: &IngesterConfig, init_schema: bool) -> Result<Self> {
        let pool = connect(&config.database)
            .await
            .context("Failed to connect to database")?;

        if init_schema {
            ensure_schema(&pool)
                .await
                .context("Failed to create schema")?;
        }

        Ok(Self {
            config: config.clone(),
            resolver: EntityResolver::new(pool),
            registry: PlatformObsRegistry::new(),
        })
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &PlatformObsRegistry {
        &self.registry
    }

    /// Bind `mapping` to the platform and register it.
    #[instrument(skip(self, mapping), fields(platform = %handle))]
    pub async fn register_platform(
        &mut self,
        handle: &PlatformHandle,
        mut mapping: ObsMapping,
    ) -> Result<()> {
        mapping
            .bind(&self.resolver, handle, self.config.add_missing)
            .await
            .with_context(|| format!("Failed to bind mapping for {}", handle))?;

        let sensors = mapping.iter().filter(|r| r.sensor_id.is_some()).count();
        self.registry.insert(handle.as_str(), mapping);
        info!(sensors, "Registered platform mapping");
        Ok(())
    }

    /// Read every row of `source` and stream its mapped values to a writer.
    #[instrument(skip(self, source), fields(platform = %handle))]
    pub async fn ingest<S: ObservationSource>(
        &self,
        handle: &PlatformHandle,
        source: &mut S,
    ) -> Result<IngestSummary> {
        let mut mapping = self
            .registry
            .get(handle.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("No mapping registered for platform {}", handle))?;
        mapping.index_columns(source.headers())?;

        let date_index = mapping
            .date_field()
            .and_then(|d| d.source_index)
            .ok_or_else(|| anyhow!("Source has no timestamp column"))?;
        let columns: Vec<_> = mapping
            .iter()
            .filter(|r| !r.is_date_field())
            .filter_map(|r| match (r.source_index, r.sensor_id) {
                (Some(index), Some(sensor_id)) => Some((index, sensor_id, r.m_type_id, r)),
                _ => None,
            })
            .collect();
        if columns.is_empty() {
            warn!("No mapped sensor columns present in source");
        }

        let writer = WriterHandle::spawn(self.config.database.clone(), self.config.writer_config()?)?;

        let mut rows = 0u64;
        let mut rows_skipped = 0u64;
        let mut observations = 0u64;
        let mut bad_values = 0u64;
        let mut read_error = None;

        'rows: loop {
            let row = match source.next_row().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            };
            rows += 1;

            let m_date = match row.cell(date_index).map(parse_obs_time) {
                Some(Ok(m_date)) => m_date,
                Some(Err(e)) => {
                    warn!(line = row.line, error = %e, "Skipping row with invalid timestamp");
                    rows_skipped += 1;
                    continue;
                }
                None => {
                    warn!(line = row.line, "Skipping row without timestamp");
                    rows_skipped += 1;
                    continue;
                }
            };

            for &(index, sensor_id, m_type_id, record) in &columns {
                let m_value = match row.cell(index).map(str::parse::<f64>) {
                    Some(Ok(value)) => Some(value),
                    None => None,
                    Some(Err(_)) => {
                        warn!(
                            line = row.line,
                            column = %record.source_obs,
                            "Value is not a number, skipping"
                        );
                        bad_values += 1;
                        continue;
                    }
                };

                let mut obs = Observation::new(sensor_id, handle.as_str(), m_date, m_value);
                obs.m_type_id = m_type_id;
                debug!(sensor_id, m_date = %m_date, obs = %record.target_obs, "Queueing observation");

                match writer.push(obs).await {
                    Ok(()) => observations += 1,
                    Err(XeniaError::WriterClosed) => {
                        error!("Writer closed, stopping ingestion");
                        break 'rows;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let report = writer.shutdown().await?;
        if report.state == WriterState::Failed {
            bail!("Observation writer failed to start");
        }
        if let Some(e) = read_error {
            return Err(e.context(format!(
                "Source read stopped after {} rows; {} records were written",
                rows, report.committed
            )));
        }

        info!(
            rows,
            rows_skipped,
            observations,
            committed = report.committed,
            duplicates = report.duplicates,
            "Ingestion completed"
        );
        Ok(IngestSummary {
            rows,
            rows_skipped,
            observations,
            bad_values,
            writer: report,
        })
    }
}
