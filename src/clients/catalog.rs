//! Reference-data service client.

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{build_client, check_status, join_url};
use crate::collaborators::{Catalog, ResolvedZip};
use crate::config::CollaboratorConfig;
use crate::error::CollaboratorError;
use crate::profile::catalog::ReferenceState;

const SERVICE: &str = "catalog";

pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(config: &CollaboratorConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(SERVICE, config.request_timeout)?,
            base_url: config.catalog_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, CollaboratorError> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| CollaboratorError::request_failed(SERVICE, e))?;
        check_status(SERVICE, resp)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse {
                service: SERVICE.into(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Catalog for HttpCatalogClient {
    async fn reference_states(&self) -> Result<Vec<ReferenceState>, CollaboratorError> {
        let states: Vec<ReferenceState> = self.get_json("reference/states").await?;
        tracing::debug!(count = states.len(), "Fetched reference states");
        Ok(states)
    }

    async fn resolve_zip(&self, zip_code: &str) -> Result<Option<ResolvedZip>, CollaboratorError> {
        let resp = self
            .client
            .get(self.url(&format!("reference/zip-codes/{zip_code}")))
            .send()
            .await
            .map_err(|e| CollaboratorError::request_failed(SERVICE, e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resolved = check_status(SERVICE, resp)
            .await?
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse {
                service: SERVICE.into(),
                reason: e.to_string(),
            })?;
        Ok(Some(resolved))
    }

    async fn brand_codes(&self) -> Result<Vec<String>, CollaboratorError> {
        self.get_json("reference/brands").await
    }
}
