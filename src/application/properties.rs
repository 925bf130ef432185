use crate::domain::ports::{DatabaseRef, LedgerClientRef};
use crate::domain::property::{
    NewProperty, NewUser, Notification, Property, PropertyDocument, User,
};
use crate::error::{PlatformError, Result};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

/// Users, property listings and their documents.
pub struct PropertyService {
    db: DatabaseRef,
    ledger: LedgerClientRef,
}

impl PropertyService {
    pub fn new(db: DatabaseRef, ledger: LedgerClientRef) -> Self {
        Self { db, ledger }
    }

    pub async fn register_user(&self, draft: NewUser, now: DateTime<Utc>) -> Result<User> {
        let user = User::new(draft, now)?;
        self.db.insert_user(user.clone()).await?;
        info!(user = %user.id, "user registered");
        Ok(user)
    }

    pub async fn user(&self, id: Uuid) -> Result<User> {
        self.db
            .get_user(id)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", id))
    }

    pub async fn notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.db.list_notifications(user_id).await
    }

    pub async fn submit(&self, draft: NewProperty, now: DateTime<Utc>) -> Result<Property> {
        let property = Property::new(draft, now)?;
        self.db.insert_property(property.clone()).await?;
        info!(property = %property.id, "property submitted for review");
        Ok(property)
    }

    pub async fn review(&self, id: Uuid, approve: bool) -> Result<Property> {
        let mut property = self.get(id).await?;
        property.review(approve)?;
        self.db.update_property(property.clone()).await?;
        info!(property = %id, status = ?property.status, "property reviewed");
        Ok(property)
    }

    /// Uploads the document to ledger file storage and records its file id.
    pub async fn attach_document(
        &self,
        id: Uuid,
        name: String,
        contents: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<Property> {
        let mut property = self.get(id).await?;
        if contents.is_empty() {
            return Err(PlatformError::ValidationError(
                "Document is empty".to_string(),
            ));
        }
        let file_id = self.ledger.store_file(contents).await?;
        property.documents.push(PropertyDocument {
            name,
            file_id,
            uploaded_at: now,
        });
        self.db.update_property(property.clone()).await?;
        Ok(property)
    }

    pub async fn get(&self, id: Uuid) -> Result<Property> {
        self.db
            .get_property(id)
            .await?
            .ok_or_else(|| PlatformError::not_found("Property", id))
    }
}
