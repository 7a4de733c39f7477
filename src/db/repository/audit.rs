use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// One persisted audit row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub timestamp: String,
    pub source: String,
    pub action: String,
    pub entity: String,
    pub patient_id: Option<String>,
}

/// Insert a batch of audit entries into the audit_log table.
pub fn insert_audit_entries(conn: &Connection, entries: &[AuditRecord]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO audit_log (timestamp, source, action, entity, patient_id) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for entry in entries {
        stmt.execute(params![
            entry.timestamp,
            entry.source,
            entry.action,
            entry.entity,
            entry.patient_id
        ])?;
    }
    Ok(())
}

/// Prune audit entries older than the given number of days.
pub fn prune_audit_log(conn: &Connection, retention_days: i64) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_log WHERE timestamp < datetime('now', ?1)",
        params![format!("-{retention_days} days")],
    )?;
    Ok(deleted)
}

/// Audit entries touching a patient, newest first.
pub fn query_audit_by_patient(conn: &Connection, patient_id: &str) -> Result<Vec<AuditRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, source, action, entity, patient_id FROM audit_log
         WHERE patient_id = ?1
         ORDER BY timestamp DESC, id DESC",
    )?;
    let rows = stmt
        .query_map(params![patient_id], |row| {
            Ok(AuditRecord {
                timestamp: row.get(0)?,
                source: row.get(1)?,
                action: row.get(2)?,
                entity: row.get(3)?,
                patient_id: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn record(timestamp: &str, action: &str, patient: Option<&str>) -> AuditRecord {
        AuditRecord {
            timestamp: timestamp.into(),
            source: "api".into(),
            action: action.into(),
            entity: "dose:1".into(),
            patient_id: patient.map(String::from),
        }
    }

    #[test]
    fn insert_and_query_by_patient() {
        let conn = open_memory_database().unwrap();
        insert_audit_entries(
            &conn,
            &[
                record("2026-01-01 08:00:00", "dose.mark", Some("p1")),
                record("2026-01-01 09:00:00", "dose.override", Some("p1")),
                record("2026-01-01 09:30:00", "dose.mark", Some("p2")),
            ],
        )
        .unwrap();

        let rows = query_audit_by_patient(&conn, "p1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].action, "dose.override");
    }

    #[test]
    fn prune_removes_old_entries_only() {
        let conn = open_memory_database().unwrap();
        let recent = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        insert_audit_entries(
            &conn,
            &[
                record("2000-01-01 00:00:00", "old", Some("p1")),
                record(&recent, "new", Some("p1")),
            ],
        )
        .unwrap();

        let deleted = prune_audit_log(&conn, 90).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(query_audit_by_patient(&conn, "p1").unwrap().len(), 1);
    }
}
