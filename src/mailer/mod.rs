//! Photo delivery by email.
//!
//! The transport is a trait boundary: composing the outgoing mail, capping
//! attachments, and recording the outcome live here, while the actual SMTP
//! conversation belongs to whatever implements `MailTransport`. Every
//! attempted delivery is recorded in history, success or failure alike;
//! attempts refused before composition (missing group, nothing to send)
//! leave no record.

use anyhow::Result;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::db::{Database, DeliveryStatus};
use crate::groups::GroupManager;

/// A composed message ready for the transport
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

pub trait MailTransport: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// What the caller gets back, shaped for direct display
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub photos_sent: usize,
    pub error: Option<String>,
}

pub struct Mailer<'a> {
    db: &'a Database,
    transport: &'a dyn MailTransport,
    from_address: String,
    max_attachments: usize,
}

impl<'a> Mailer<'a> {
    pub fn new(
        db: &'a Database,
        transport: &'a dyn MailTransport,
        from_address: &str,
        max_attachments: usize,
    ) -> Self {
        Self {
            db,
            transport,
            from_address: from_address.to_string(),
            max_attachments,
        }
    }

    /// Send a group's stored photos to a recipient. The attachment list is
    /// capped at `max_attachments`; the mail body states the full count so
    /// the recipient knows when a cap applied.
    pub fn send_group(
        &self,
        owner: &str,
        groups: &GroupManager,
        person_id: &str,
        recipient: &str,
        custom_message: Option<&str>,
    ) -> Result<DeliveryOutcome> {
        let person = match self.db.find_person(owner, person_id)? {
            Some(p) => p,
            None => {
                return Ok(DeliveryOutcome {
                    success: false,
                    photos_sent: 0,
                    error: Some("Group not found".to_string()),
                })
            }
        };

        let all_photos = groups
            .photos_for_delivery(owner, person_id)?
            .unwrap_or_default();
        if all_photos.is_empty() {
            return Ok(DeliveryOutcome {
                success: false,
                photos_sent: 0,
                error: Some("No photos to send".to_string()),
            });
        }

        let total = all_photos.len();
        let attachments: Vec<PathBuf> =
            all_photos.into_iter().take(self.max_attachments).collect();
        let attached = attachments.len();

        let mut body = match custom_message {
            Some(msg) if !msg.trim().is_empty() => format!("{}\n\n", msg.trim()),
            _ => String::new(),
        };
        body.push_str(&format!(
            "Sharing {} photo(s) from \"{}\".",
            total, person.name
        ));
        if attached < total {
            body.push_str(&format!(
                "\nThe first {} are attached; the rest exceed the attachment limit.",
                attached
            ));
        }

        let mail = OutgoingMail {
            from: self.from_address.clone(),
            to: recipient.to_string(),
            subject: format!("Photos of {}", person.name),
            body,
            attachments,
        };

        match self.transport.send(&mail) {
            Ok(()) => {
                info!(
                    "Delivered {} photo(s) of {} to {}",
                    attached, person.name, recipient
                );
                self.db.log_delivery(
                    owner,
                    person_id,
                    recipient,
                    attached,
                    DeliveryStatus::Sent,
                    "",
                )?;
                Ok(DeliveryOutcome {
                    success: true,
                    photos_sent: attached,
                    error: None,
                })
            }
            Err(e) => {
                warn!("Delivery to {} failed: {}", recipient, e);
                self.db.log_delivery(
                    owner,
                    person_id,
                    recipient,
                    0,
                    DeliveryStatus::Failed,
                    &e.to_string(),
                )?;
                Ok(DeliveryOutcome {
                    success: false,
                    photos_sent: 0,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ImageStore;
    use anyhow::anyhow;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingTransport {
        sent: Mutex<Vec<OutgoingMail>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn ok() -> Self {
            Self { sent: Mutex::new(Vec::new()), fail: false }
        }

        fn failing() -> Self {
            Self { sent: Mutex::new(Vec::new()), fail: true }
        }
    }

    impl MailTransport for RecordingTransport {
        fn send(&self, mail: &OutgoingMail) -> Result<()> {
            if self.fail {
                return Err(anyhow!("connection refused"));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    struct Fixture {
        db: Database,
        store: ImageStore,
        _tmp: TempDir,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let store = ImageStore::new(tmp.path(), vec!["jpg".to_string()]);
        Fixture { db, store, _tmp: tmp }
    }

    fn seed_group(fx: &Fixture, photo_count: usize) -> String {
        let person = fx.db.create_folder("u1", "Beach").unwrap();
        for i in 0..photo_count {
            let filename = format!("{:02}.jpg", i);
            let photo = fx.db.insert_photo("u1", &filename).unwrap();
            fx.db.link_photo(&photo.id, &person.id).unwrap();
            fx.store
                .put("u1", &person.folder_key, &filename, b"bytes")
                .unwrap();
        }
        person.id
    }

    #[test]
    fn test_successful_send_records_history() {
        let fx = fixture();
        let person_id = seed_group(&fx, 3);
        let groups = GroupManager::new(&fx.db, &fx.store);
        let transport = RecordingTransport::ok();
        let mailer = Mailer::new(&fx.db, &transport, "snapsort@localhost", 10);

        let outcome = mailer
            .send_group("u1", &groups, &person_id, "a@example.com", Some("Enjoy!"))
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.photos_sent, 3);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@example.com");
        assert_eq!(sent[0].subject, "Photos of Beach");
        assert!(sent[0].body.starts_with("Enjoy!"));
        assert_eq!(sent[0].attachments.len(), 3);

        let history = fx.db.delivery_history("u1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, DeliveryStatus::Sent);
        assert_eq!(history[0].photo_count, 3);
    }

    #[test]
    fn test_attachments_capped() {
        let fx = fixture();
        let person_id = seed_group(&fx, 5);
        let groups = GroupManager::new(&fx.db, &fx.store);
        let transport = RecordingTransport::ok();
        let mailer = Mailer::new(&fx.db, &transport, "snapsort@localhost", 2);

        let outcome = mailer
            .send_group("u1", &groups, &person_id, "a@example.com", None)
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.photos_sent, 2);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].attachments.len(), 2);
        assert!(sent[0].body.contains("Sharing 5 photo(s)"));
    }

    #[test]
    fn test_transport_failure_records_failed_delivery() {
        let fx = fixture();
        let person_id = seed_group(&fx, 1);
        let groups = GroupManager::new(&fx.db, &fx.store);
        let transport = RecordingTransport::failing();
        let mailer = Mailer::new(&fx.db, &transport, "snapsort@localhost", 10);

        let outcome = mailer
            .send_group("u1", &groups, &person_id, "a@example.com", None)
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("connection refused"));

        let history = fx.db.delivery_history("u1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, DeliveryStatus::Failed);
        assert_eq!(history[0].message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_refusals_leave_no_record() {
        let fx = fixture();
        let groups = GroupManager::new(&fx.db, &fx.store);
        let transport = RecordingTransport::ok();
        let mailer = Mailer::new(&fx.db, &transport, "snapsort@localhost", 10);

        let missing = mailer
            .send_group("u1", &groups, "no-such-group", "a@example.com", None)
            .unwrap();
        assert!(!missing.success);

        let empty_id = seed_group(&fx, 0);
        let empty = mailer
            .send_group("u1", &groups, &empty_id, "a@example.com", None)
            .unwrap();
        assert!(!empty.success);
        assert_eq!(empty.error.as_deref(), Some("No photos to send"));

        assert!(fx.db.delivery_history("u1").unwrap().is_empty());
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
