//! xAPI State and Statement resources over HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use course_core::model::Statement;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use storage::repository::{StateKey, StateStore, StatementSink, Storage, StorageError};

use crate::config::LaunchConfig;
use crate::error::RecordStoreError;

const XAPI_VERSION_HEADER: &str = "X-Experience-API-Version";
const XAPI_VERSION: &str = "1.0.3";

/// Client for a learning record store's xAPI endpoint.
#[derive(Clone)]
pub struct HttpRecordStore {
    client: Client,
    endpoint: Url,
    auth: Option<String>,
}

impl HttpRecordStore {
    #[must_use]
    pub fn new(endpoint: Url, auth: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: with_trailing_slash(endpoint),
            auth,
        }
    }

    /// Live record store for a launch, or `None` in dev mode.
    #[must_use]
    pub fn from_config(config: &LaunchConfig) -> Option<Self> {
        if config.is_dev_mode() {
            return None;
        }
        config
            .endpoint
            .clone()
            .map(|endpoint| Self::new(endpoint, config.auth.clone()))
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL of the State resource for a key.
    ///
    /// # Errors
    ///
    /// Returns `RecordStoreError` if the url cannot be built or the agent cannot be encoded.
    pub fn state_url(&self, key: &StateKey) -> Result<Url, RecordStoreError> {
        let mut url = self.endpoint.join("activities/state")?;
        let agent = serde_json::to_string(&key.actor)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("activityId", &key.activity_id)
                .append_pair("agent", &agent)
                .append_pair("stateId", &key.state_id);
            if let Some(registration) = &key.registration {
                query.append_pair("registration", registration);
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(XAPI_VERSION_HEADER, XAPI_VERSION);
        match &self.auth {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, format!("Basic {token}")),
            None => request,
        }
    }

    /// Fetches a state document; `Ok(None)` when the store has none.
    ///
    /// # Errors
    ///
    /// Returns `RecordStoreError` on transport failure, non-success status or invalid JSON.
    pub async fn fetch_state(&self, key: &StateKey) -> Result<Option<Value>, RecordStoreError> {
        let url = self.state_url(key)?;
        let response = self.authorized(self.client.get(url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let body = response.bytes().await?;
                if body.is_empty() {
                    return Ok(None);
                }
                Ok(Some(serde_json::from_slice(&body)?))
            }
            status => Err(RecordStoreError::HttpStatus(status)),
        }
    }

    /// Replaces a state document.
    ///
    /// # Errors
    ///
    /// Returns `RecordStoreError` on transport failure or non-success status.
    pub async fn store_state(&self, key: &StateKey, document: &Value) -> Result<(), RecordStoreError> {
        let url = self.state_url(key)?;
        let response = self
            .authorized(self.client.put(url))
            .json(document)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RecordStoreError::HttpStatus(response.status()));
        }
        debug!(target: "lrs", state_id = %key.state_id, "state document stored");
        Ok(())
    }

    /// Sends one statement under its own id.
    ///
    /// # Errors
    ///
    /// Returns `RecordStoreError` on transport failure or non-success status
    /// (409 for a reused id).
    pub async fn post_statement(&self, statement: &Statement) -> Result<(), RecordStoreError> {
        let mut url = self.endpoint.join("statements")?;
        url.query_pairs_mut()
            .append_pair("statementId", &statement.id.to_string());
        let response = self
            .authorized(self.client.put(url))
            .json(statement)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RecordStoreError::HttpStatus(response.status()));
        }
        Ok(())
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl StateStore for HttpRecordStore {
    async fn get_state(&self, key: &StateKey) -> Result<Option<Value>, StorageError> {
        Ok(self.fetch_state(key).await?)
    }

    async fn put_state(&self, key: &StateKey, document: &Value) -> Result<(), StorageError> {
        Ok(self.store_state(key, document).await?)
    }
}

#[async_trait]
impl StatementSink for HttpRecordStore {
    async fn send_statement(&self, statement: &Statement) -> Result<(), StorageError> {
        Ok(self.post_statement(statement).await?)
    }
}

/// One client serves both the State and Statement resources.
impl From<HttpRecordStore> for Storage {
    fn from(store: HttpRecordStore) -> Self {
        let store = Arc::new(store);
        let states: Arc<dyn StateStore> = store.clone();
        let statements: Arc<dyn StatementSink> = store;
        Self { states, statements }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::Actor;

    #[test]
    fn state_url_carries_xapi_parameters() {
        let store = HttpRecordStore::new(Url::parse("https://lrs.example/xapi").unwrap(), None);
        let key = StateKey::new(
            Actor::with_account("Ada", "https://lms.example", "ada"),
            "https://course.example/au/1",
            "https://course.example/au/1/states/courseAUProgress",
            Some("reg-1".into()),
        );

        let url = store.state_url(&key).unwrap();
        assert_eq!(url.path(), "/xapi/activities/state");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("activityId".into(), "https://course.example/au/1".into()));
        assert_eq!(pairs[2].0, "stateId");
        assert_eq!(pairs[3], ("registration".into(), "reg-1".into()));
        let agent: Actor = serde_json::from_str(&pairs[1].1).unwrap();
        assert_eq!(agent.identity_key(), "https://lms.example|ada");
    }

    #[test]
    fn status_errors_map_onto_storage_errors() {
        let conflict: StorageError = RecordStoreError::HttpStatus(StatusCode::CONFLICT).into();
        assert!(matches!(conflict, StorageError::Conflict));
        let outage: StorageError =
            RecordStoreError::HttpStatus(StatusCode::SERVICE_UNAVAILABLE).into();
        assert!(matches!(outage, StorageError::Unavailable(_)));
    }

    #[test]
    fn dev_launch_has_no_record_store() {
        let config = LaunchConfig::dev("au", Actor::with_account("Ada", "h", "a"));
        assert!(HttpRecordStore::from_config(&config).is_none());
    }
}
