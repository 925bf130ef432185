use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    /// Ledger account that receives minted units.
    pub ledger_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
}

impl User {
    pub fn new(draft: NewUser, now: DateTime<Utc>) -> Result<Self> {
        let email = draft.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(PlatformError::ValidationError(format!(
                "Invalid email address: {}",
                draft.email
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            email,
            display_name: draft.display_name,
            ledger_account_id: None,
            created_at: now,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    PendingReview,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PropertyDocument {
    pub name: String,
    /// File id on ledger file storage.
    pub file_id: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Property {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub location: String,
    pub valuation: Decimal,
    pub status: PropertyStatus,
    pub documents: Vec<PropertyDocument>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProperty {
    pub owner_id: Uuid,
    pub title: String,
    pub location: String,
    pub valuation: Decimal,
}

impl Property {
    pub fn new(draft: NewProperty, now: DateTime<Utc>) -> Result<Self> {
        if draft.valuation <= Decimal::ZERO {
            return Err(PlatformError::ValidationError(
                "Valuation must be positive".to_string(),
            ));
        }
        if draft.title.trim().is_empty() {
            return Err(PlatformError::ValidationError(
                "Title is required".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id: draft.owner_id,
            title: draft.title,
            location: draft.location,
            valuation: draft.valuation,
            status: PropertyStatus::PendingReview,
            documents: Vec::new(),
            created_at: now,
        })
    }

    pub fn review(&mut self, approve: bool) -> Result<()> {
        if self.status != PropertyStatus::PendingReview {
            return Err(PlatformError::InvalidState(format!(
                "Property {} was already reviewed",
                self.id
            )));
        }
        self.status = if approve {
            PropertyStatus::Approved
        } else {
            PropertyStatus::Rejected
        };
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: Uuid, title: &str, message: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            message,
            created_at: now,
        }
    }
}

/// Investor membership in a property's discussion room.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ChatMember {
    pub property_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}
