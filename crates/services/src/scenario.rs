//! Provisioning of scenario ranges and console credentials.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::LaunchConfig;
use crate::error::{RetryError, ScenarioError};
use crate::retry::{RetryEvent, RetryPolicy, retry_with_policy};

/// Scenarios deployed for a launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default)]
    pub deployed_scenarios: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "scenarioUUID", default)]
    pub scenario_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The remote range service.
#[async_trait]
pub trait ScenarioBackend: Send + Sync {
    async fn initialize_scenarios(&self, class_id: Option<&str>) -> Result<RangeData, ScenarioError>;
    async fn console_credentials(&self, registration: &str) -> Result<Vec<ConsoleCredentials>, ScenarioError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitScenariosRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    class_id: Option<&'a str>,
}

/// Range service over HTTP, authorized with the launch's basic token.
#[derive(Clone)]
pub struct HttpScenarioBackend {
    client: Client,
    base_url: Url,
    auth: Option<String>,
}

impl HttpScenarioBackend {
    #[must_use]
    pub fn new(base_url: Url, auth: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            auth,
        }
    }

    #[must_use]
    pub fn from_config(config: &LaunchConfig) -> Option<Self> {
        config
            .scenario_api
            .clone()
            .map(|base_url| Self::new(base_url, config.auth.clone()))
    }

    fn url(&self, path: &str) -> Result<Url, ScenarioError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, format!("Basic {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl ScenarioBackend for HttpScenarioBackend {
    async fn initialize_scenarios(&self, class_id: Option<&str>) -> Result<RangeData, ScenarioError> {
        let response = self
            .authorized(self.client.post(self.url("scenarios")?))
            .json(&InitScenariosRequest { class_id })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ScenarioError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn console_credentials(&self, registration: &str) -> Result<Vec<ConsoleCredentials>, ScenarioError> {
        let url = self.url(&format!("registration/{registration}/consoles"))?;
        let response = self.authorized(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(ScenarioError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}

/// Scenario calls wrapped in the bounded retry loop.
///
/// `on_status` receives each learner-facing status line, including the
/// final success or exhaustion message.
#[derive(Clone)]
pub struct ScenarioService {
    backend: Arc<dyn ScenarioBackend>,
    policy: RetryPolicy,
}

impl ScenarioService {
    #[must_use]
    pub fn new(backend: Arc<dyn ScenarioBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    #[must_use]
    pub fn from_config(config: &LaunchConfig) -> Option<Self> {
        let backend: Arc<dyn ScenarioBackend> = Arc::new(HttpScenarioBackend::from_config(config)?);
        Some(Self::new(backend, config.retry))
    }

    /// Starts the scenarios for a class. An empty deployment is retried.
    ///
    /// # Errors
    ///
    /// Returns `RetryError::Exhausted` once every attempt has failed.
    pub async fn initialize_scenarios<S>(
        &self,
        class_id: Option<&str>,
        mut on_status: S,
    ) -> Result<RangeData, RetryError<ScenarioError>>
    where
        S: FnMut(String),
    {
        let backend = &self.backend;
        let range = retry_with_policy(
            self.policy,
            |event: RetryEvent<'_, ScenarioError>| on_status(event.message()),
            || async move {
                let range = backend.initialize_scenarios(class_id).await?;
                if range.deployed_scenarios.is_empty() {
                    return Err(match class_id {
                        Some(class_id) => ScenarioError::NoDeployedScenariosForClass(class_id.to_owned()),
                        None => ScenarioError::NoDeployedScenarios,
                    });
                }
                Ok(range)
            },
        )
        .await?;

        let assigned = range.class_id.as_deref().or(class_id).unwrap_or_default();
        info!(class_id = assigned, scenarios = range.deployed_scenarios.len(), "scenarios initialized");
        on_status(format!("Scenario Initialized! (classId: {assigned})"));
        Ok(range)
    }

    /// Fetches console logins. An empty list or a blank password is retried.
    ///
    /// # Errors
    ///
    /// Returns `RetryError::Exhausted` once every attempt has failed.
    pub async fn console_credentials<S>(
        &self,
        registration: &str,
        mut on_status: S,
    ) -> Result<Vec<ConsoleCredentials>, RetryError<ScenarioError>>
    where
        S: FnMut(String),
    {
        let backend = &self.backend;
        retry_with_policy(
            self.policy,
            |event: RetryEvent<'_, ScenarioError>| on_status(event.message()),
            || async move {
                let credentials = backend.console_credentials(registration).await?;
                match credentials.first() {
                    Some(first) if !first.password.is_empty() => Ok(credentials),
                    _ => Err(ScenarioError::MissingCredentials),
                }
            },
        )
        .await
        .inspect(|credentials| debug!(count = credentials.len(), "console credentials received"))
    }
}

/// Login for the first deployed scenario, falling back to the first entry.
#[must_use]
pub fn credentials_for<'a>(range: &RangeData, credentials: &'a [ConsoleCredentials]) -> Option<&'a ConsoleCredentials> {
    let scenario = range.deployed_scenarios.first();
    credentials
        .iter()
        .find(|creds| creds.scenario_uuid.as_ref() == scenario)
        .or_else(|| credentials.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedBackend {
        ranges: Mutex<VecDeque<RangeData>>,
        consoles: Mutex<VecDeque<Vec<ConsoleCredentials>>>,
    }

    #[async_trait]
    impl ScenarioBackend for ScriptedBackend {
        async fn initialize_scenarios(&self, _class_id: Option<&str>) -> Result<RangeData, ScenarioError> {
            Ok(self.ranges.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn console_credentials(&self, _registration: &str) -> Result<Vec<ConsoleCredentials>, ScenarioError> {
            Ok(self.consoles.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    fn creds(scenario: &str, password: &str) -> ConsoleCredentials {
        ConsoleCredentials {
            username: "learner".into(),
            password: password.into(),
            scenario_uuid: Some(scenario.into()),
            url: None,
        }
    }

    fn service(backend: ScriptedBackend) -> ScenarioService {
        ScenarioService::new(Arc::new(backend), RetryPolicy::new(Duration::from_secs(20), 5))
    }

    #[tokio::test(start_paused = true)]
    async fn empty_deployment_is_retried_with_status_lines() {
        let backend = ScriptedBackend::default();
        backend.ranges.lock().unwrap().extend([
            RangeData::default(),
            RangeData {
                class_id: Some("class-7".into()),
                deployed_scenarios: vec!["s-1".into()],
            },
        ]);
        let mut lines = Vec::new();

        let range = service(backend)
            .initialize_scenarios(Some("class-7"), |line| lines.push(line))
            .await
            .unwrap();

        assert_eq!(range.deployed_scenarios, vec!["s-1"]);
        assert_eq!(
            lines,
            vec![
                "No deployed scenarios found for Class Id class-7. Retrying...1/5",
                "Scenario Initialized! (classId: class-7)",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blank_password_exhausts_the_policy() {
        let backend = ScriptedBackend::default();
        backend
            .consoles
            .lock()
            .unwrap()
            .extend(std::iter::repeat_with(|| vec![creds("s-1", "")]).take(6));
        let mut lines = Vec::new();

        let err = service(backend)
            .console_credentials("reg-1", |line| lines.push(line))
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 6);
        assert!(matches!(err.last_error(), ScenarioError::MissingCredentials));
        assert_eq!(lines.len(), 6);
        assert_eq!(
            lines.last().unwrap(),
            "Error getting console credentials (data not found). Maximum attempts reached."
        );
    }

    #[test]
    fn credentials_match_the_deployed_scenario() {
        let range = RangeData {
            class_id: None,
            deployed_scenarios: vec!["s-2".into()],
        };
        let all = vec![creds("s-1", "a"), creds("s-2", "b")];
        assert_eq!(credentials_for(&range, &all).unwrap().password, "b");
        assert_eq!(credentials_for(&RangeData::default(), &all).unwrap().password, "a");
    }

    #[test]
    fn http_backend_joins_paths_under_the_base() {
        let backend = HttpScenarioBackend::new(Url::parse("https://range.example/api/v1/").unwrap(), None);
        assert_eq!(
            backend.url("registration/r-1/consoles").unwrap().as_str(),
            "https://range.example/api/v1/registration/r-1/consoles"
        );
    }
}
