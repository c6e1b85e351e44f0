use serde::{Deserialize, Serialize};

use super::numeric_id;

numeric_id! {
    /// Backend notification identifier.
    NotificationId
}

/// A user-scoped notification, polled from `GET /notifications`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    #[serde(default)]
    pub read: bool,
}
