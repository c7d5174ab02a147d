use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::model::{
    ActivityId, ActivityMetadata, ActivityPayload, ActivityType, CompletionRequired, JobePayload,
    QuizPayload, ScenarioPayload,
};
use crate::parser::extract::RawBlock;

/// Fields shared by every activity block.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BlockHeader {
    cmi5_quiz_id: Option<String>,
    completion_required: Option<String>,
    passing_score: Option<f64>,
    title: Option<String>,
    ksats: Vec<Value>,
}

/// Interprets one raw block.
///
/// Returns `None` for unknown tags (silently) and for malformed bodies (with a warning).
pub(crate) fn interpret(block: &RawBlock) -> Option<(ActivityId, ActivityMetadata)> {
    let activity_type = ActivityType::from_block_tag(&block.tag)?;

    let value: Value = match serde_json::from_str(&block.body) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            warn!(target: "content", block = %block.tag, "activity block body is not a JSON object");
            return None;
        }
        Err(err) => {
            warn!(target: "content", block = %block.tag, error = %err, "failed to parse activity block");
            return None;
        }
    };

    let header: BlockHeader = decode(activity_type, &value)?;
    let payload = match activity_type {
        ActivityType::Quiz => ActivityPayload::Quiz(decode::<QuizPayload>(activity_type, &value)?),
        ActivityType::Ctf => ActivityPayload::Ctf(decode::<QuizPayload>(activity_type, &value)?),
        ActivityType::Jobe => ActivityPayload::Jobe(decode::<JobePayload>(activity_type, &value)?),
        ActivityType::Scenario => {
            ActivityPayload::Scenario(decode::<ScenarioPayload>(activity_type, &value)?)
        }
        ActivityType::Consoles => {
            ActivityPayload::Consoles(decode::<ScenarioPayload>(activity_type, &value)?)
        }
        ActivityType::Unknown => ActivityPayload::Unknown,
    };

    let id = resolve_id(&header, &payload, &block.body);
    let completion_required = header
        .completion_required
        .filter(|rule| !rule.is_empty())
        .map_or_else(
            || activity_type.default_completion_required(),
            CompletionRequired::from,
        );
    let passing_score = activity_type
        .fixed_passing_score()
        .or(header.passing_score);

    Some((
        id,
        ActivityMetadata {
            completion_required,
            passing_score,
            ksats: header.ksats,
            payload,
        },
    ))
}

fn decode<T: DeserializeOwned>(activity_type: ActivityType, value: &Value) -> Option<T> {
    serde_json::from_value(value.clone())
        .inspect_err(|err| {
            warn!(target: "content", block = %activity_type, error = %err, "activity block has an unexpected shape");
        })
        .ok()
}

fn resolve_id(header: &BlockHeader, payload: &ActivityPayload, body: &str) -> ActivityId {
    if let Some(id) = non_empty(header.cmi5_quiz_id.as_deref()) {
        return ActivityId::new(id);
    }

    if let ActivityPayload::Scenario(scenario) | ActivityPayload::Consoles(scenario) = payload {
        if let Some(id) =
            non_empty(scenario.uuid.as_deref()).or_else(|| non_empty(scenario.name.as_deref()))
        {
            return ActivityId::new(id);
        }
    }

    let activity_type = payload.activity_type();
    if let Some(slug) = header.title.as_deref().map(slugify).filter(|s| !s.is_empty()) {
        return ActivityId::new(format!("{slug}-{activity_type}"));
    }

    let hashed = match payload {
        ActivityPayload::Jobe(jobe) => jobe.evaluator.as_deref().unwrap_or_default(),
        _ => body,
    };
    ActivityId::new(format!("{activity_type}-activity-{}", short_hash(hashed)))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Lowercases and collapses every run of non-alphanumerics into one `-`.
pub(crate) fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_owned()
}

fn short_hash(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    hex::encode(digest)[..8].to_owned()
}
