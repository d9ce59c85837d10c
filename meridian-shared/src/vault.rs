//! Credential Vault: `pgcrypto`-backed symmetric encryption so a linked
//! account's OAuth/API token never passes through application code as
//! plaintext at rest, grounded in `app/services/shopify_client.py`'s
//! `_aload_credentials`.

use secrecy::{ExposeSecret, SecretString};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::models::LinkedAccountStatus;

#[derive(Clone)]
pub struct CredentialVault {
    key: SecretString,
}

impl CredentialVault {
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    /// Upserts a LinkedAccount row. `encrypted_credentials` is produced by
    /// `pgp_sym_encrypt` inside the query — the plaintext token is bound as
    /// a parameter and never materializes as a stored Rust value.
    pub async fn store(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        account_type: &str,
        account_name: &str,
        plaintext_token: &SecretString,
        scopes: &str,
    ) -> Result<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO linked_accounts
                (id, user_id, account_type, account_name, encrypted_credentials, scopes, status, created_at, updated_at)
            VALUES
                (gen_random_uuid(), $1, $2, $3, pgp_sym_encrypt($4, $5), $6, 'active', now(), now())
            ON CONFLICT (user_id, account_type, account_name) DO UPDATE SET
                encrypted_credentials = pgp_sym_encrypt($4, $5),
                scopes = $6,
                status = 'active',
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(account_type)
        .bind(account_name)
        .bind(plaintext_token.expose_secret())
        .bind(self.key.expose_secret())
        .bind(scopes)
        .fetch_one(&mut **tx)
        .await
        .map_err(CoreError::from)?;

        Ok(row.try_get("id").map_err(CoreError::from)?)
    }

    /// Decrypts inline under the caller's tenant-scoped transaction.
    /// Returns `None` if no active linked account matches.
    pub async fn decrypt_for(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        account_name: &str,
    ) -> Result<Option<SecretString>> {
        let row = sqlx::query(
            r#"
            SELECT pgp_sym_decrypt(encrypted_credentials, $3)::text AS token
            FROM linked_accounts
            WHERE user_id = $1 AND account_name = $2 AND status = $4
            "#,
        )
        .bind(user_id)
        .bind(account_name)
        .bind(self.key.expose_secret())
        .bind(LinkedAccountStatus::Active.to_string())
        .fetch_optional(&mut **tx)
        .await
        .map_err(CoreError::from)?;

        match row {
            Some(row) => {
                let token: String = row.try_get("token").map_err(CoreError::from)?;
                Ok(Some(SecretString::from(token)))
            }
            None => Ok(None),
        }
    }

    pub async fn revoke(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        account_name: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE linked_accounts SET status = 'revoked', updated_at = now() WHERE user_id = $1 AND account_name = $2",
        )
        .bind(user_id)
        .bind(account_name)
        .execute(&mut **tx)
        .await
        .map_err(CoreError::from)?;
        Ok(())
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").field("key", &"<redacted>").finish()
    }
}
