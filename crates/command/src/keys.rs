//! Encryption-key commands: a thin, permission-checked surface over the
//! dedicated key table (not event-sourced).

use idforge_core::{Context, Error, Result};
use idforge_crypto::{EncryptionKey, EncryptionKeyStore};

use crate::permission::PERM_KEY_WRITE;
use crate::Commands;

#[derive(Debug, Clone)]
pub struct AddEncryptionKey {
    pub identifier: String,
    pub algorithm: String,
    /// Already wrapped by the caller; opaque here.
    pub key_material: Vec<u8>,
}

impl Commands {
    pub async fn add_encryption_key(
        &self,
        ctx: &Context,
        request: AddEncryptionKey,
    ) -> Result<String> {
        if request.identifier.trim().is_empty() {
            return Err(Error::invalid_argument("COMMAND-ky01", "key identifier must not be empty"));
        }
        if request.key_material.is_empty() {
            return Err(Error::invalid_argument("COMMAND-ky02", "key material must not be empty"));
        }
        self.check_permission(ctx, PERM_KEY_WRITE, ctx.instance_id.as_str())?;

        let key_id = idforge_core::id::generate();
        self.key_store()
            .add(EncryptionKey {
                instance_id: ctx.instance_id.clone(),
                key_id: key_id.clone(),
                identifier: request.identifier.trim().to_string(),
                algorithm: request.algorithm,
                key_material: request.key_material,
                created_at: ctx.timestamp,
            })
            .await?;
        Ok(key_id)
    }

    pub async fn get_encryption_key(
        &self,
        ctx: &Context,
        id_or_identifier: &str,
    ) -> Result<EncryptionKey> {
        self.check_permission(ctx, PERM_KEY_WRITE, ctx.instance_id.as_str())?;
        self.key_store()
            .get(&ctx.instance_id, id_or_identifier)
            .await?
            .ok_or_else(|| {
                Error::not_found("COMMAND-ky03", "encryption key not found")
                    .with_detail("key", id_or_identifier)
            })
    }

    pub async fn list_encryption_keys(
        &self,
        ctx: &Context,
        algorithm: Option<&str>,
    ) -> Result<Vec<EncryptionKey>> {
        self.check_permission(ctx, PERM_KEY_WRITE, ctx.instance_id.as_str())?;
        self.key_store().list(&ctx.instance_id, algorithm).await
    }

    pub async fn remove_encryption_key(&self, ctx: &Context, key_id: &str) -> Result<()> {
        self.check_permission(ctx, PERM_KEY_WRITE, ctx.instance_id.as_str())?;
        self.key_store().remove(&ctx.instance_id, key_id).await
    }
}
