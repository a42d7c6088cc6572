use crate::{config::Config, error::AppError, types::ThreatRecord};
use async_trait::async_trait;
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One row in the remote threat log.
#[derive(Debug, Clone, Row, Serialize, Deserialize, PartialEq)]
pub struct ThreatLogEntry {
    pub log_id: String,
    pub timestamp: String,
    pub threat: String,
    pub severity: String,
    pub threat_type: String,
    pub subtype: String,
    pub site: String,
    pub payload: String,
}

impl ThreatLogEntry {
    /// Fields already present on the record win over generated ones.
    pub fn from_record(record: &ThreatRecord) -> Result<Self, AppError> {
        Ok(Self {
            log_id: record
                .log_id()
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timestamp: record
                .timestamp()
                .map(str::to_string)
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            threat: field(record, "threat"),
            severity: field(record, "severity"),
            threat_type: field(record, "type"),
            subtype: field(record, "subtype"),
            site: field(record, "site"),
            payload: serde_json::to_string(record)?,
        })
    }
}

fn field(record: &ThreatRecord, key: &str) -> String {
    record.text(key).unwrap_or_default().to_string()
}

#[async_trait]
pub trait ThreatLogSink: Send + Sync {
    async fn put(&self, entry: &ThreatLogEntry) -> Result<(), AppError>;
}

pub struct ClickHouseThreatLog {
    client: Client,
    table: String,
}

impl ClickHouseThreatLog {
    pub fn new(url: &str, config: &Config) -> Self {
        let mut client = Client::default()
            .with_url(url)
            .with_database(&config.clickhouse_database);
        if let Some(user) = &config.clickhouse_user {
            client = client.with_user(user);
        }
        if let Some(password) = &config.clickhouse_password {
            client = client.with_password(password);
        }

        Self {
            client,
            table: config.threat_log_table.clone(),
        }
    }

    /// Creates the log table if needed. A failure here is only logged.
    pub async fn ensure_table(&self) {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                log_id String,
                timestamp String,
                threat String,
                severity String,
                threat_type String,
                subtype String,
                site String,
                payload String
            ) ENGINE = MergeTree ORDER BY log_id
            "#,
            self.table
        );

        match self.client.query(&ddl).execute().await {
            Ok(()) => info!("ClickHouse threat log table {} ready", self.table),
            Err(e) => warn!("ClickHouse threat log table setup failed: {}", e),
        }
    }
}

#[async_trait]
impl ThreatLogSink for ClickHouseThreatLog {
    async fn put(&self, entry: &ThreatLogEntry) -> Result<(), AppError> {
        let mut insert = self.client.insert::<ThreatLogEntry>(&self.table)?;
        insert.write(entry).await?;
        insert.end().await?;
        debug!("Logged threat {}", entry.log_id);
        Ok(())
    }
}

/// Used when no ClickHouse endpoint is configured.
pub struct DisabledThreatLog;

#[async_trait]
impl ThreatLogSink for DisabledThreatLog {
    async fn put(&self, entry: &ThreatLogEntry) -> Result<(), AppError> {
        debug!("Remote threat log disabled, dropping {}", entry.log_id);
        Ok(())
    }
}

/// Best-effort copy of each record to the sink. Returns how many landed.
pub async fn mirror_records(sink: &dyn ThreatLogSink, records: &[ThreatRecord]) -> usize {
    let mut stored = 0;
    for record in records {
        let result = match ThreatLogEntry::from_record(record) {
            Ok(entry) => sink.put(&entry).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => stored += 1,
            Err(e) => {
                metrics::counter!("threat_log_failures_total").increment(1);
                warn!("Error saving log to remote threat log: {}", e);
            }
        }
    }
    stored
}
