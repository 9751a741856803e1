use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{ProvisionerError, Result};
use crate::state_machine::ClusterStatus;

/// Cluster represents one provisioned infrastructure unit and its lifecycle
/// Maps to the `clusters` table
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub status: ClusterStatus,
    /// Engine configuration submitted by the caller; immutable
    pub config: Vec<u8>,
    /// Engine state snapshot from the last successful apply/destroy
    pub state: Option<Vec<u8>>,
    pub outputs: Vec<ClusterOutput>,
    /// Summary of the last orchestration attempt
    pub message: Option<String>,
    pub destroy_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A value exposed by the engine's outputs section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterOutput {
    pub name: String,
    pub sensitive: bool,
    #[serde(rename = "type")]
    pub output_type: serde_json::Value,
    pub value: serde_json::Value,
}

/// Raw row shape; timestamps are fixed-width RFC 3339 text
#[derive(Debug, FromRow)]
struct ClusterRow {
    id: String,
    name: String,
    status: String,
    config: Vec<u8>,
    state: Option<Vec<u8>>,
    outputs: Option<String>,
    message: Option<String>,
    destroy_attempts: i64,
    created_at: String,
    updated_at: String,
    expires_at: String,
}

const SELECT_COLUMNS: &str = "SELECT id, name, status, config, state, outputs, message, \
     destroy_attempts, created_at, updated_at, expires_at FROM clusters";

/// Fixed-width timestamp encoding so lexicographic order matches time order
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            ProvisionerError::DatabaseError(format!("invalid {column} timestamp '{value}': {e}"))
        })
}

impl TryFrom<ClusterRow> for Cluster {
    type Error = ProvisionerError;

    fn try_from(row: ClusterRow) -> Result<Self> {
        let status = row
            .status
            .parse::<ClusterStatus>()
            .map_err(ProvisionerError::DatabaseError)?;
        let outputs = match row.outputs.as_deref() {
            Some(json) if !json.is_empty() => serde_json::from_str(json)?,
            _ => Vec::new(),
        };

        Ok(Cluster {
            id: row.id,
            name: row.name,
            status,
            config: row.config,
            state: row.state,
            outputs,
            message: row.message,
            destroy_attempts: u32::try_from(row.destroy_attempts).unwrap_or(0),
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
            expires_at: parse_timestamp("expires_at", &row.expires_at)?,
        })
    }
}

impl Cluster {
    /// Build a new record in `requested` status expiring `ttl` from now
    pub fn new(config: Vec<u8>, name: Option<String>, ttl: Duration) -> Self {
        let id = Uuid::new_v4().to_string();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| generate_name(&id));
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);

        Self {
            id,
            name,
            status: ClusterStatus::Requested,
            config,
            state: None,
            outputs: Vec::new(),
            message: None,
            destroy_attempts: 0,
            created_at: now,
            updated_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    fn outputs_json(&self) -> Result<Option<String>> {
        if self.outputs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(serde_json::to_string(&self.outputs)?))
        }
    }

    /// Find a cluster by ID
    pub async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> Result<Cluster> {
        let row = sqlx::query_as::<_, ClusterRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(ProvisionerError::NotFound(format!("cluster {id}"))),
        }
    }

    /// List all clusters, oldest first
    pub async fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Cluster>> {
        let rows = sqlx::query_as::<_, ClusterRow>(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(Cluster::try_from).collect()
    }

    /// Insert a new cluster record
    pub async fn insert(conn: &mut SqliteConnection, cluster: &Cluster) -> Result<()> {
        let outputs = cluster.outputs_json()?;

        sqlx::query(
            r#"
            INSERT INTO clusters
            (id, name, status, config, state, outputs, message, destroy_attempts,
             created_at, updated_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&cluster.id)
        .bind(&cluster.name)
        .bind(cluster.status.as_str())
        .bind(&cluster.config)
        .bind(&cluster.state)
        .bind(outputs)
        .bind(&cluster.message)
        .bind(i64::from(cluster.destroy_attempts))
        .bind(format_timestamp(&cluster.created_at))
        .bind(format_timestamp(&cluster.updated_at))
        .bind(format_timestamp(&cluster.expires_at))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Persist the mutable columns of an existing record.
    /// `id`, `config` and `created_at` never change.
    pub async fn update(conn: &mut SqliteConnection, cluster: &Cluster) -> Result<()> {
        let outputs = cluster.outputs_json()?;

        let result = sqlx::query(
            r#"
            UPDATE clusters
            SET name = ?, status = ?, state = ?, outputs = ?, message = ?,
                destroy_attempts = ?, updated_at = ?, expires_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&cluster.name)
        .bind(cluster.status.as_str())
        .bind(&cluster.state)
        .bind(outputs)
        .bind(&cluster.message)
        .bind(i64::from(cluster.destroy_attempts))
        .bind(format_timestamp(&cluster.updated_at))
        .bind(format_timestamp(&cluster.expires_at))
        .bind(&cluster.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ProvisionerError::NotFound(format!("cluster {}", cluster.id)));
        }

        Ok(())
    }

    /// Physically remove a cluster record
    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Expired clusters that the sweeper should destroy: reapable status and
    /// below the destroy attempt cap. Never returns in-progress records.
    pub async fn find_expired(
        conn: &mut SqliteConnection,
        now: DateTime<Utc>,
        max_destroy_attempts: u32,
    ) -> Result<Vec<Cluster>> {
        let rows = sqlx::query_as::<_, ClusterRow>(&format!(
            "{SELECT_COLUMNS}
             WHERE expires_at <= ?
               AND status IN ('provision_success', 'provision_failed', 'destroy_failed')
               AND NOT (status = 'destroy_failed' AND destroy_attempts >= ?)
             ORDER BY expires_at ASC, rowid ASC"
        ))
        .bind(format_timestamp(&now))
        .bind(i64::from(max_destroy_attempts))
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(Cluster::try_from).collect()
    }

    /// Records eligible for physical removal: destroyed, or destroy_failed
    /// with the attempt cap exhausted
    pub async fn find_reclaimable(
        conn: &mut SqliteConnection,
        max_destroy_attempts: u32,
    ) -> Result<Vec<Cluster>> {
        let rows = sqlx::query_as::<_, ClusterRow>(&format!(
            "{SELECT_COLUMNS}
             WHERE status = 'destroyed'
                OR (status = 'destroy_failed' AND destroy_attempts >= ?)
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(i64::from(max_destroy_attempts))
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(Cluster::try_from).collect()
    }

    /// Records left in an in-progress status, e.g. by a process restart
    pub async fn find_interrupted(conn: &mut SqliteConnection) -> Result<Vec<Cluster>> {
        let rows = sqlx::query_as::<_, ClusterRow>(&format!(
            "{SELECT_COLUMNS}
             WHERE status IN ('requested', 'provisioning', 'destroying')
             ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(Cluster::try_from).collect()
    }
}

/// System-generated display name: `cluster-` plus the first id segment
fn generate_name(id: &str) -> String {
    let short = id.split('-').next().unwrap_or(id);
    format!("cluster-{short}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cluster_defaults() {
        let cluster = Cluster::new(b"{}".to_vec(), None, Duration::from_secs(3600));

        assert_eq!(cluster.status, ClusterStatus::Requested);
        assert!(!cluster.id.is_empty());
        assert!(cluster.name.starts_with("cluster-"));
        assert!(cluster.state.is_none());
        assert!(cluster.outputs.is_empty());
        assert_eq!(
            (cluster.expires_at - cluster.created_at).num_seconds(),
            3600
        );
        assert!(!cluster.is_expired(cluster.created_at));
        assert!(cluster.is_expired(cluster.expires_at));
    }

    #[test]
    fn test_blank_name_is_replaced() {
        let cluster = Cluster::new(b"{}".to_vec(), Some("   ".to_string()), Duration::from_secs(1));
        assert!(cluster.name.starts_with("cluster-"));

        let named = Cluster::new(b"{}".to_vec(), Some(" gke-dev ".to_string()), Duration::from_secs(1));
        assert_eq!(named.name, "gke-dev");
    }

    #[test]
    fn test_timestamp_encoding_is_fixed_width() {
        let early = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2025-01-01T00:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);

        let (a, b) = (format_timestamp(&early), format_timestamp(&later));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_timestamp("t", &a).unwrap(), early);
    }

    #[test]
    fn test_output_serialization_uses_type_key() {
        let output = ClusterOutput {
            name: "endpoint".to_string(),
            sensitive: false,
            output_type: serde_json::json!("string"),
            value: serde_json::json!("10.0.0.1"),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["type"], "string");
    }
}
