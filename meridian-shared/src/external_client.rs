//! Per-tenant external commerce API handle: lazy credential load, inline
//! decryption under the active tenant session, and a cache-fronted read
//! path backed by `CachedExternalData`.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::tenant::with_tenant;
use crate::vault::CredentialVault;

/// Computes `sha256(operation_name || linked_account_id || canonical_args)`.
/// Excludes `db`/session/tenant fields from the hash by construction: only
/// `operation` and caller-supplied `args` feed it.
pub fn cache_key(operation: &str, linked_account_id: Uuid, args: &impl Serialize) -> Result<String> {
    let canonical = serde_json::to_string(args).map_err(|e| CoreError::Parse(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(linked_account_id.as_bytes());
    hasher.update(canonical.as_bytes());
    Ok(format!("{operation}:{linked_account_id}:{:x}", hasher.finalize()))
}

pub struct ExternalApiClient {
    pool: PgPool,
    vault: CredentialVault,
    user_id: Uuid,
    linked_account_id: Uuid,
    account_name: String,
    cache_ttl: Duration,
    token: Mutex<Option<SecretString>>,
}

impl ExternalApiClient {
    pub fn new(
        pool: PgPool,
        vault: CredentialVault,
        user_id: Uuid,
        linked_account_id: Uuid,
        account_name: impl Into<String>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            vault,
            user_id,
            linked_account_id,
            account_name: account_name.into(),
            cache_ttl,
            token: Mutex::new(None),
        }
    }

    /// Loads and decrypts credentials on first call; subsequent calls reuse
    /// the in-memory token for the lifetime of this handle.
    async fn token(&self) -> Result<SecretString> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(SecretString::from(token.expose_secret().to_string()));
        }

        let account_name = self.account_name.clone();
        let vault = self.vault.clone();
        let user_id = self.user_id;
        let token = with_tenant(&self.pool, self.user_id, move |tx: &mut sqlx::Transaction<'_, sqlx::Postgres>| -> std::pin::Pin<Box<dyn Future<Output = Result<SecretString>> + Send + '_>> {
            let account_name = account_name.clone();
            let vault = vault.clone();
            Box::pin(async move {
                vault
                    .decrypt_for(tx, user_id, &account_name)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("no active linked account {account_name}")))
            })
        })
        .await?;

        *guard = Some(SecretString::from(token.expose_secret().to_string()));
        Ok(token)
    }

    /// Routes a read through the cache: hit returns the stored row, miss or
    /// expiry calls `fetch` against the backend and writes a fresh row.
    /// Cache-write failures are logged, not propagated — the read itself
    /// still succeeds.
    pub async fn cached_read<T, F, Fut>(
        &self,
        operation: &str,
        args: &impl Serialize,
        fetch: F,
    ) -> Result<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce(SecretString) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = cache_key(operation, self.linked_account_id, args)?;
        let now = Utc::now();
        let user_id = self.user_id;
        let linked_account_id = self.linked_account_id;

        let hit = with_tenant(&self.pool, self.user_id, |tx: &mut sqlx::Transaction<'_, sqlx::Postgres>| -> std::pin::Pin<Box<dyn Future<Output = Result<Option<serde_json::Value>>> + Send + '_>> {
            let key = key.clone();
            Box::pin(async move {
                let row = sqlx::query(
                    "SELECT data FROM cached_external_data WHERE user_id = $1 AND cache_key = $2 AND expires_at > $3",
                )
                .bind(user_id)
                .bind(&key)
                .bind(now)
                .fetch_optional(&mut **tx)
                .await
                .map_err(CoreError::from)?;
                match row {
                    Some(row) => {
                        let data: serde_json::Value = row.try_get("data").map_err(CoreError::from)?;
                        Ok(Some(data))
                    }
                    None => Ok(None),
                }
            })
        })
        .await?;

        if let Some(data) = hit {
            return serde_json::from_value(data).map_err(|e| CoreError::Parse(e.to_string()));
        }

        let token = self.token().await?;
        let value = fetch(token).await?;

        let data_json = serde_json::to_value(&value).map_err(|e| CoreError::Parse(e.to_string()))?;
        let expires_at = now + chrono::Duration::from_std(self.cache_ttl).unwrap_or(chrono::Duration::seconds(3600));
        let write = with_tenant(&self.pool, self.user_id, |tx: &mut sqlx::Transaction<'_, sqlx::Postgres>| -> std::pin::Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let key = key.clone();
            let data_json = data_json.clone();
            Box::pin(async move {
                sqlx::query(
                    r#"
                    INSERT INTO cached_external_data
                        (id, user_id, linked_account_id, cache_key, data, cached_at, expires_at)
                    VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6)
                    ON CONFLICT (user_id, cache_key) DO UPDATE SET
                        data = $4, cached_at = $5, expires_at = $6
                    "#,
                )
                .bind(user_id)
                .bind(linked_account_id)
                .bind(&key)
                .bind(&data_json)
                .bind(now)
                .bind(expires_at)
                .execute(&mut **tx)
                .await
                .map_err(CoreError::from)?;
                Ok(())
            })
        })
        .await;

        if let Err(err) = write {
            warn!(%err, operation, "failed to write cache row, serving fresh data anyway");
        }

        Ok(value)
    }
}

/// Thin HTTP wrapper over the commerce backend, classifying failures into
/// the three error categories the Action Executor and department workers
/// dispatch on.
#[derive(Debug, Clone)]
pub struct CommerceClient {
    http: reqwest::Client,
    base_url: String,
}

impl CommerceClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    pub async fn get(&self, token: &SecretString, path: &str) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| CoreError::ExternalApi { status: 0, detail: e.to_string() })?;
        self.classify(response).await
    }

    pub async fn put(&self, token: &SecretString, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .http
            .put(format!("{}{}", self.base_url, path))
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::ExternalApi { status: 0, detail: e.to_string() })?;
        self.classify(response).await
    }

    pub async fn post(&self, token: &SecretString, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::ExternalApi { status: 0, detail: e.to_string() })?;
        self.classify(response).await
    }

    async fn classify(&self, response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| CoreError::ExternalApi { status: status.as_u16(), detail: e.to_string() });
        }

        let detail = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => Err(CoreError::ExternalAuth(detail)),
            429 => Err(CoreError::ExternalRateLimit(detail)),
            code => Err(CoreError::ExternalApi { status: code, detail }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Args {
        shop_domain: String,
        window_days: u32,
    }

    #[test]
    fn cache_key_is_stable_for_same_args() {
        let id = Uuid::new_v4();
        let a = Args { shop_domain: "acme.myshopify.com".into(), window_days: 30 };
        let b = Args { shop_domain: "acme.myshopify.com".into(), window_days: 30 };
        assert_eq!(cache_key("orders.summary", id, &a).unwrap(), cache_key("orders.summary", id, &b).unwrap());
    }

    #[test]
    fn cache_key_differs_on_account_or_args() {
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let a = Args { shop_domain: "acme.myshopify.com".into(), window_days: 30 };
        let b = Args { shop_domain: "acme.myshopify.com".into(), window_days: 7 };
        assert_ne!(cache_key("orders.summary", id1, &a).unwrap(), cache_key("orders.summary", id2, &a).unwrap());
        assert_ne!(cache_key("orders.summary", id1, &a).unwrap(), cache_key("orders.summary", id1, &b).unwrap());
    }
}
