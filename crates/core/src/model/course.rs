use serde::{Deserialize, Serialize};

use crate::model::ids::SlideGuid;

//
// ─── MOVE ON ──────────────────────────────────────────────────────────────────
//

/// Rule deciding which combination of slide completion/passing satisfies the AU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MoveOn {
    Completed,
    Passed,
    CompletedAndPassed,
    #[default]
    CompletedOrPassed,
    NotApplicable,
}

impl MoveOn {
    /// Parses the PascalCase form used by course packages (`CompletedOrPassed`).
    #[must_use]
    pub fn from_pascal(value: &str) -> Option<Self> {
        match value {
            "Completed" => Some(Self::Completed),
            "Passed" => Some(Self::Passed),
            "CompletedAndPassed" => Some(Self::CompletedAndPassed),
            "CompletedOrPassed" => Some(Self::CompletedOrPassed),
            "NotApplicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }

    /// Parses the kebab-case form used by authoring tools (`completed-or-passed`).
    #[must_use]
    pub fn from_criteria(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(Self::Completed),
            "passed" => Some(Self::Passed),
            "completed-and-passed" => Some(Self::CompletedAndPassed),
            "completed-or-passed" => Some(Self::CompletedOrPassed),
            "not-applicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }
}

//
// ─── COURSE STRUCTURE ─────────────────────────────────────────────────────────
//

/// Position, stable guid and title of one slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideIdentifier {
    pub index: usize,
    pub guid: SlideGuid,
    pub title: String,
}

/// Ordered slides of one AU plus its `moveOn` rule.
///
/// Built from the content document at session start and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStructure {
    au_id: String,
    au_title: String,
    move_on: MoveOn,
    slides: Vec<SlideIdentifier>,
}

impl CourseStructure {
    #[must_use]
    pub fn new(
        au_id: impl Into<String>,
        au_title: impl Into<String>,
        move_on: MoveOn,
        slides: Vec<SlideIdentifier>,
    ) -> Self {
        Self {
            au_id: au_id.into(),
            au_title: au_title.into(),
            move_on,
            slides,
        }
    }

    #[must_use]
    pub fn au_id(&self) -> &str {
        &self.au_id
    }

    #[must_use]
    pub fn au_title(&self) -> &str {
        &self.au_title
    }

    #[must_use]
    pub fn move_on(&self) -> MoveOn {
        self.move_on
    }

    #[must_use]
    pub fn slides(&self) -> &[SlideIdentifier] {
        &self.slides
    }

    #[must_use]
    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    #[must_use]
    pub fn slide(&self, index: usize) -> Option<&SlideIdentifier> {
        self.slides.get(index)
    }

    #[must_use]
    pub fn find(&self, guid: &SlideGuid) -> Option<&SlideIdentifier> {
        self.slides.iter().find(|slide| &slide.guid == guid)
    }
}

//
// ─── CONTENT DOCUMENT ─────────────────────────────────────────────────────────
//

/// One slide as shipped in the AU content document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideDocument {
    #[serde(default)]
    pub slide_title: Option<String>,
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// AU content document produced upstream by the course build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDocument {
    #[serde(default)]
    pub au_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slides: Vec<SlideDocument>,
    #[serde(default)]
    pub move_on: Option<String>,
    #[serde(default)]
    pub move_on_criteria: Option<String>,
    #[serde(default)]
    pub prompt_class_id: Option<bool>,
    #[serde(default)]
    pub rangeos_scenario_uuid: Option<String>,
}

impl CourseDocument {
    /// `moveOnCriteria` wins over `moveOn`; anything unrecognised falls back to
    /// `CompletedOrPassed`.
    #[must_use]
    pub fn resolved_move_on(&self) -> MoveOn {
        self.move_on_criteria
            .as_deref()
            .and_then(MoveOn::from_criteria)
            .or_else(|| self.move_on.as_deref().and_then(MoveOn::from_pascal))
            .unwrap_or_default()
    }

    /// Guid for the slide at `index`: its filepath, or a positional fallback.
    #[must_use]
    pub fn slide_guid(&self, index: usize) -> SlideGuid {
        self.slides
            .get(index)
            .and_then(|slide| slide.filepath.as_deref())
            .filter(|path| !path.is_empty())
            .map_or_else(|| SlideGuid::positional(index), SlideGuid::new)
    }

    #[must_use]
    pub fn structure(&self) -> CourseStructure {
        let slides = self
            .slides
            .iter()
            .enumerate()
            .map(|(index, slide)| SlideIdentifier {
                index,
                guid: self.slide_guid(index),
                title: slide
                    .slide_title
                    .clone()
                    .filter(|title| !title.is_empty())
                    .unwrap_or_else(|| format!("Slide {}", index + 1)),
            })
            .collect();

        CourseStructure::new(
            self.au_name.clone(),
            self.title.clone(),
            self.resolved_move_on(),
            slides,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(move_on: Option<&str>, criteria: Option<&str>) -> CourseDocument {
        CourseDocument {
            au_name: "au-1".into(),
            title: "Intro".into(),
            slides: vec![
                SlideDocument {
                    slide_title: Some("Welcome".into()),
                    filepath: Some("intro/welcome.md".into()),
                    content: None,
                },
                SlideDocument::default(),
            ],
            move_on: move_on.map(str::to_owned),
            move_on_criteria: criteria.map(str::to_owned),
            ..CourseDocument::default()
        }
    }

    #[test]
    fn criteria_takes_precedence_over_move_on() {
        let doc = document(Some("Passed"), Some("completed-and-passed"));
        assert_eq!(doc.resolved_move_on(), MoveOn::CompletedAndPassed);
    }

    #[test]
    fn unknown_move_on_defaults_to_completed_or_passed() {
        assert_eq!(document(Some("Whatever"), None).resolved_move_on(), MoveOn::CompletedOrPassed);
        assert_eq!(document(None, None).resolved_move_on(), MoveOn::CompletedOrPassed);
        assert_eq!(document(Some("Completed"), None).resolved_move_on(), MoveOn::Completed);
    }

    #[test]
    fn structure_fills_missing_guid_and_title() {
        let structure = document(None, None).structure();
        assert_eq!(structure.slide_count(), 2);
        assert_eq!(structure.slides()[0].guid.as_str(), "intro/welcome.md");
        assert_eq!(structure.slides()[1].guid.as_str(), "slide-1");
        assert_eq!(structure.slides()[1].title, "Slide 2");
    }

    #[test]
    fn document_deserializes_from_camel_case() {
        let json = r#"{
            "auName": "au",
            "title": "T",
            "moveOnCriteria": "passed",
            "slides": [{"slideTitle": "A", "filepath": "a.md", "content": "hi"}]
        }"#;
        let doc: CourseDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.resolved_move_on(), MoveOn::Passed);
        assert_eq!(doc.slides[0].content.as_deref(), Some("hi"));
    }
}
