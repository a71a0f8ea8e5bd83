use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::documents;

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Identifiable, Selectable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: String,
    pub storage_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub category: String,
    pub legacy_type: Option<String>,
    pub display_name: String,
    pub purpose: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub uploaded_at: NaiveDateTime,
}

impl Document {
    pub fn parsed_status(&self) -> Result<DocumentStatus, UnknownStatus> {
        self.status.parse()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub owner_id: String,
    pub storage_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub category: String,
    pub legacy_type: Option<String>,
    pub display_name: String,
    pub purpose: String,
    pub status: String,
    pub uploaded_at: NaiveDateTime,
}

/// Single-row changeset applied by status transitions.
///
/// `None` leaves a column untouched; `rejection_reason: Some(None)` clears it.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = documents)]
pub struct ReviewUpdate {
    pub status: String,
    pub rejection_reason: Option<Option<String>>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// A reviewer decision on a pending document.
    Review,
    /// Sends a decided document back to the review queue.
    Reopen,
}

const TRANSITIONS: &[(DocumentStatus, DocumentStatus, TransitionKind)] = &[
    (
        DocumentStatus::Pending,
        DocumentStatus::Approved,
        TransitionKind::Review,
    ),
    (
        DocumentStatus::Pending,
        DocumentStatus::Rejected,
        TransitionKind::Review,
    ),
    (
        DocumentStatus::Approved,
        DocumentStatus::Pending,
        TransitionKind::Reopen,
    ),
    (
        DocumentStatus::Rejected,
        DocumentStatus::Pending,
        TransitionKind::Reopen,
    ),
];

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
        }
    }

    pub fn transition_kind(self, next: DocumentStatus) -> Option<TransitionKind> {
        TRANSITIONS
            .iter()
            .find(|(from, to, _)| *from == self && *to == next)
            .map(|(_, _, kind)| *kind)
    }

    pub fn is_decided(self) -> bool {
        !matches!(self, DocumentStatus::Pending)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for DocumentStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(DocumentStatus::Pending),
            "approved" => Ok(DocumentStatus::Approved),
            "rejected" => Ok(DocumentStatus::Rejected),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}
