use std::env;
use std::time::Duration;

use course_core::model::Actor;
use url::Url;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub const ENV_LRS_ENDPOINT: &str = "COURSE_LRS_ENDPOINT";
pub const ENV_LRS_AUTH: &str = "COURSE_LRS_AUTH";
pub const ENV_ACTOR_NAME: &str = "COURSE_ACTOR_NAME";
pub const ENV_ACTOR_ACCOUNT: &str = "COURSE_ACTOR_ACCOUNT";
pub const ENV_ACTOR_HOMEPAGE: &str = "COURSE_ACTOR_HOMEPAGE";
pub const ENV_ACTIVITY_ID: &str = "COURSE_ACTIVITY_ID";
pub const ENV_REGISTRATION: &str = "COURSE_REGISTRATION";
pub const ENV_DEV_MODE: &str = "COURSE_DEV_MODE";
pub const ENV_SCENARIO_API: &str = "COURSE_SCENARIO_API";
pub const ENV_RETRY_DELAY_SECS: &str = "COURSE_RETRY_DELAY_SECS";
pub const ENV_MAX_RETRIES: &str = "COURSE_MAX_RETRIES";

/// Launch parameters of one AU session.
#[derive(Clone, Debug)]
pub struct LaunchConfig {
    pub endpoint: Option<Url>,
    pub auth: Option<String>,
    pub actor: Actor,
    pub activity_id: String,
    pub registration: Option<String>,
    pub dev_mode: bool,
    pub scenario_api: Option<Url>,
    pub retry: RetryPolicy,
}

impl LaunchConfig {
    /// Offline launch used by test harnesses: nothing leaves the process.
    #[must_use]
    pub fn dev(activity_id: impl Into<String>, actor: Actor) -> Self {
        Self {
            endpoint: None,
            auth: None,
            actor,
            activity_id: activity_id.into(),
            registration: None,
            dev_mode: true,
            scenario_api: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Reads the `COURSE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the activity id is missing or a url is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key/value source (launch query, env, test map).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the activity id is missing or a url is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let activity_id = get(ENV_ACTIVITY_ID).ok_or(ConfigError::Missing(ENV_ACTIVITY_ID))?;
        let endpoint = parse_url(ENV_LRS_ENDPOINT, get(ENV_LRS_ENDPOINT))?;
        let scenario_api = parse_url(ENV_SCENARIO_API, get(ENV_SCENARIO_API))?;

        let name = get(ENV_ACTOR_NAME).unwrap_or_else(|| "learner".to_owned());
        let actor = match get(ENV_ACTOR_ACCOUNT) {
            Some(account) => Actor::with_account(
                name,
                get(ENV_ACTOR_HOMEPAGE).unwrap_or_else(|| "urn:course:learner".to_owned()),
                account,
            ),
            None => Actor {
                object_type: "Agent".to_owned(),
                name: Some(name),
                mbox: None,
                account: None,
            },
        };

        let dev_mode = get(ENV_DEV_MODE).is_some_and(|value| is_truthy(&value));

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy::new(
            get(ENV_RETRY_DELAY_SECS)
                .and_then(|value| value.parse().ok())
                .map_or(defaults.delay, Duration::from_secs),
            get(ENV_MAX_RETRIES)
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.max_retries),
        );

        Ok(Self {
            endpoint,
            auth: get(ENV_LRS_AUTH),
            actor,
            activity_id,
            registration: get(ENV_REGISTRATION),
            dev_mode,
            scenario_api,
            retry,
        })
    }

    /// True when the flag is set or no record store endpoint was supplied.
    #[must_use]
    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode || self.endpoint.is_none()
    }
}

fn parse_url(var: &'static str, raw: Option<String>) -> Result<Option<Url>, ConfigError> {
    raw.map(|raw| Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { var, source }))
        .transpose()
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn live_launch_parses_endpoint_and_actor() {
        let config = LaunchConfig::from_lookup(lookup(&[
            (ENV_ACTIVITY_ID, "https://course.example/au/1"),
            (ENV_LRS_ENDPOINT, "https://lrs.example/xapi/"),
            (ENV_LRS_AUTH, "dG9rZW4="),
            (ENV_ACTOR_NAME, "Ada"),
            (ENV_ACTOR_ACCOUNT, "ada-1"),
            (ENV_ACTOR_HOMEPAGE, "https://lms.example"),
            (ENV_REGISTRATION, "reg-1"),
        ]))
        .unwrap();

        assert!(!config.is_dev_mode());
        assert_eq!(config.actor.identity_key(), "https://lms.example|ada-1");
        assert_eq!(config.registration.as_deref(), Some("reg-1"));
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn missing_endpoint_means_dev_mode() {
        let config =
            LaunchConfig::from_lookup(lookup(&[(ENV_ACTIVITY_ID, "au"), (ENV_ACTOR_NAME, "Bo")]))
                .unwrap();
        assert!(config.is_dev_mode());
        assert_eq!(config.actor.account, None);
        assert_eq!(config.actor.name.as_deref(), Some("Bo"));
    }

    #[test]
    fn rejects_bad_input() {
        let missing = LaunchConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(missing, ConfigError::Missing(ENV_ACTIVITY_ID)));

        let bad_url = LaunchConfig::from_lookup(lookup(&[
            (ENV_ACTIVITY_ID, "au"),
            (ENV_LRS_ENDPOINT, "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(
            bad_url,
            ConfigError::InvalidUrl {
                var: ENV_LRS_ENDPOINT,
                ..
            }
        ));
    }
}
