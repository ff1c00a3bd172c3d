//! Append-only delivery history. Rows are written once and never mutated;
//! the table exists purely for history display.

use anyhow::Result;
use chrono::Utc;
use rusqlite::params;

use super::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "sent" => DeliveryStatus::Sent,
            _ => DeliveryStatus::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub id: i64,
    pub owner: String,
    pub person_id: String,
    pub recipient: String,
    pub photo_count: i64,
    pub status: DeliveryStatus,
    pub message: Option<String>,
    pub delivered_at: String,
}

impl Database {
    pub fn log_delivery(
        &self,
        owner: &str,
        person_id: &str,
        recipient: &str,
        photo_count: usize,
        status: DeliveryStatus,
        message: &str,
    ) -> Result<i64> {
        let delivered_at = Utc::now().to_rfc3339();
        self.conn.execute(
            r#"
            INSERT INTO delivery_history (owner, person_id, recipient, photo_count, status, message, delivered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                owner,
                person_id,
                recipient,
                photo_count as i64,
                status.as_str(),
                message,
                delivered_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Delivery log for an owner, newest first
    pub fn delivery_history(&self, owner: &str) -> Result<Vec<DeliveryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, owner, person_id, recipient, photo_count, status, message, delivered_at
            FROM delivery_history
            WHERE owner = ?
            ORDER BY delivered_at DESC, id DESC
            "#,
        )?;

        let records = stmt
            .query_map([owner], |row| {
                let status: String = row.get(5)?;
                Ok(DeliveryRecord {
                    id: row.get(0)?,
                    owner: row.get(1)?,
                    person_id: row.get(2)?,
                    recipient: row.get(3)?,
                    photo_count: row.get(4)?,
                    status: DeliveryStatus::parse(&status),
                    message: row.get(6)?,
                    delivered_at: row.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    pub fn count_deliveries(&self, owner: &str) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM delivery_history WHERE owner = ?",
            [owner],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_log_appends_both_outcomes() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        db.log_delivery("u1", "p1", "a@example.com", 3, DeliveryStatus::Sent, "")
            .unwrap();
        db.log_delivery("u1", "p1", "b@example.com", 0, DeliveryStatus::Failed, "smtp refused")
            .unwrap();

        let history = db.delivery_history("u1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(db.count_deliveries("u1").unwrap(), 2);
        assert_eq!(db.count_deliveries("u2").unwrap(), 0);

        let failed = history
            .iter()
            .find(|r| r.status == DeliveryStatus::Failed)
            .unwrap();
        assert_eq!(failed.recipient, "b@example.com");
        assert_eq!(failed.message.as_deref(), Some("smtp refused"));
    }
}
