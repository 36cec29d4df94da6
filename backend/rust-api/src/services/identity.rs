use anyhow::anyhow;
use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::Database;

use super::session_store::StoreError;

/// Contract of the identity provider: tokens are issued elsewhere, so this
/// service only needs to check that an owner id resolves to a real player.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve_owner(&self, owner_id: &str) -> Result<bool, StoreError>;
}

pub struct MongoIdentityProvider {
    mongo: Database,
}

impl MongoIdentityProvider {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl IdentityProvider for MongoIdentityProvider {
    async fn resolve_owner(&self, owner_id: &str) -> Result<bool, StoreError> {
        let Ok(object_id) = ObjectId::parse_str(owner_id) else {
            return Ok(false);
        };

        let found = self
            .mongo
            .collection::<Document>("players")
            .find_one(doc! { "_id": object_id })
            .await
            .map_err(|e| {
                StoreError::Unavailable(anyhow!(e).context("mongodb find_one on players failed"))
            })?;

        Ok(found.is_some())
    }
}
