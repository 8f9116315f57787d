//! Change notifications.
//!
//! Notifications are classified by comparing the old and the new snapshot,
//! never from the update kind alone. A poll that observes a verification
//! flip therefore produces the same notification as the push event would.

use crate::snapshot::UserSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// UI-agnostic notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// The verification flag became `true`.
    VerificationCompleted {
        before: Option<Value>,
        after: Value,
    },
    /// The verification flag was `true` and no longer is.
    VerificationRevoked {
        before: Value,
        after: Option<Value>,
    },
    /// A watched status field changed.
    StatusChanged {
        field: String,
        before: Option<Value>,
        after: Option<Value>,
    },
    /// Any other fields changed.
    ProfileChanged { fields: Vec<String> },
    /// A user-triggered refresh failed and may be retried.
    RefreshFailed { message: String },
}

/// Which fields drive which notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPolicy {
    /// Boolean field holding the verification flag.
    #[serde(default = "default_verification_field")]
    pub verification_field: String,
    /// Fields reported individually as status changes.
    #[serde(default = "default_status_fields")]
    pub status_fields: Vec<String>,
}

fn default_verification_field() -> String {
    "verified".to_string()
}

fn default_status_fields() -> Vec<String> {
    ["status", "approvalStatus", "kycStatus", "payoutStatus"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            verification_field: default_verification_field(),
            status_fields: default_status_fields(),
        }
    }
}

impl NotificationPolicy {
    /// Classify the change from `before` to `after`.
    pub fn classify(&self, before: &UserSnapshot, after: &UserSnapshot) -> Vec<Notification> {
        let mut notifications = Vec::new();
        let mut other_fields = Vec::new();

        for change in before.diff(after) {
            if change.field == self.verification_field {
                let was = change.before.as_ref().and_then(Value::as_bool) == Some(true);
                let is = change.after.as_ref().and_then(Value::as_bool) == Some(true);
                match (was, is, change.before, change.after) {
                    (false, true, before, Some(after)) => {
                        notifications.push(Notification::VerificationCompleted { before, after });
                    }
                    (true, false, Some(before), after) => {
                        notifications.push(Notification::VerificationRevoked { before, after });
                    }
                    // e.g. null -> false
                    _ => other_fields.push(change.field),
                }
            } else if self.status_fields.contains(&change.field) {
                notifications.push(Notification::StatusChanged {
                    field: change.field,
                    before: change.before,
                    after: change.after,
                });
            } else {
                other_fields.push(change.field);
            }
        }

        if !other_fields.is_empty() {
            notifications.push(Notification::ProfileChanged {
                fields: other_fields,
            });
        }

        notifications
    }
}
