//! Extraction of activity metadata from slide markdown.
//!
//! Block location is delegated to a [`BlockExtractor`] so the regex and the
//! CommonMark strategies are interchangeable.

mod blocks;
mod extract;

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::ContentError;
use crate::model::{ActivityId, ActivityMetadata, CourseDocument, CourseStructure, SlideGuid};

pub use extract::{BlockExtractor, DirectiveExtractor, MarkdownExtractor, RawBlock};

/// Activities of one slide, keyed by activity id.
pub type SlideActivities = BTreeMap<ActivityId, ActivityMetadata>;

/// Activities of every slide, keyed by slide guid.
pub type ActivitiesMeta = BTreeMap<SlideGuid, SlideActivities>;

/// Structure and activity metadata derived from one content document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCourse {
    pub structure: CourseStructure,
    pub activities: ActivitiesMeta,
}

pub struct ContentParser {
    extractor: Box<dyn BlockExtractor>,
}

impl Default for ContentParser {
    fn default() -> Self {
        Self::new(DirectiveExtractor)
    }
}

impl std::fmt::Debug for ContentParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentParser").finish_non_exhaustive()
    }
}

impl ContentParser {
    #[must_use]
    pub fn new(extractor: impl BlockExtractor + 'static) -> Self {
        Self {
            extractor: Box::new(extractor),
        }
    }

    /// Parser backed by the CommonMark event stream.
    #[must_use]
    pub fn markdown() -> Self {
        Self::new(MarkdownExtractor)
    }

    /// Parses the activity blocks of a single slide. Never fails: malformed
    /// blocks are logged and skipped.
    #[must_use]
    pub fn parse_slide(&self, content: &str) -> SlideActivities {
        let mut activities = SlideActivities::new();
        for block in self.extractor.extract(content) {
            let Some((id, meta)) = blocks::interpret(&block) else {
                continue;
            };
            debug!(
                target: "content",
                activity_id = %id,
                activity_type = %meta.activity_type(),
                completion_required = %meta.completion_required,
                "parsed activity block"
            );
            if activities.insert(id.clone(), meta).is_some() {
                warn!(target: "content", activity_id = %id, "duplicate activity id on slide; keeping the last block");
            }
        }
        activities
    }

    /// Derives the course structure and per-slide activities from a document.
    #[must_use]
    pub fn parse_document(&self, document: &CourseDocument) -> ParsedCourse {
        let structure = document.structure();
        let mut activities = ActivitiesMeta::new();

        for (slide, identifier) in document.slides.iter().zip(structure.slides()) {
            let parsed = slide
                .content
                .as_deref()
                .map(|content| self.parse_slide(content))
                .unwrap_or_default();
            debug!(
                target: "content",
                slide_index = identifier.index,
                slide_guid = %identifier.guid,
                activity_count = parsed.len(),
                "parsed slide"
            );
            activities.insert(identifier.guid.clone(), parsed);
        }

        ParsedCourse {
            structure,
            activities,
        }
    }

    /// Parses a JSON content document.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidDocument` if the JSON cannot be read and
    /// `ContentError::DuplicateSlide` if two slides share a guid.
    pub fn parse_document_json(&self, json: &str) -> Result<ParsedCourse, ContentError> {
        let document: CourseDocument = serde_json::from_str(json)
            .map_err(|err| ContentError::InvalidDocument(err.to_string()))?;

        let mut seen = std::collections::BTreeSet::new();
        for index in 0..document.slides.len() {
            let guid = document.slide_guid(index);
            if !seen.insert(guid.clone()) {
                return Err(ContentError::DuplicateSlide(guid));
            }
        }

        Ok(self.parse_document(&document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActivityType, MoveOn};

    const DOCUMENT: &str = r#"{
        "auName": "networking-101",
        "title": "Networking",
        "moveOnCriteria": "completed-and-passed",
        "slides": [
            {"slideTitle": "Intro", "filepath": "intro.md", "content": "Welcome"},
            {"slideTitle": "Quiz", "filepath": "quiz.md", "content": ":::quiz\n```json\n{\"cmi5QuizId\": \"ports\", \"questions\": []}\n```\n:::\n\n:::jobe\n```json\n{\"title\": \"Echo\"}\n```\n:::"},
            {"slideTitle": "Broken", "filepath": "broken.md", "content": ":::ctf\n```json\n{oops}\n```\n:::"}
        ]
    }"#;

    #[test]
    fn document_parse_groups_activities_by_slide() {
        let parsed = ContentParser::default().parse_document_json(DOCUMENT).unwrap();

        assert_eq!(parsed.structure.move_on(), MoveOn::CompletedAndPassed);
        assert_eq!(parsed.structure.slide_count(), 3);
        assert!(parsed.activities["intro.md"].is_empty());
        assert!(parsed.activities["broken.md"].is_empty());

        let quiz_slide = &parsed.activities["quiz.md"];
        assert_eq!(quiz_slide.len(), 2);
        assert_eq!(quiz_slide["ports"].activity_type(), ActivityType::Quiz);
        assert_eq!(quiz_slide["echo-jobe"].activity_type(), ActivityType::Jobe);
    }

    #[test]
    fn both_extractors_agree_on_document() {
        let regex = ContentParser::default().parse_document_json(DOCUMENT).unwrap();
        let markdown = ContentParser::markdown().parse_document_json(DOCUMENT).unwrap();
        assert_eq!(regex, markdown);
    }

    #[test]
    fn reparsing_is_stable() {
        let parser = ContentParser::default();
        let first = parser.parse_document_json(DOCUMENT).unwrap();
        let second = parser.parse_document_json(DOCUMENT).unwrap();
        assert_eq!(first.activities, second.activities);
    }

    #[test]
    fn invalid_document_is_reported() {
        let err = ContentParser::default().parse_document_json("[]").unwrap_err();
        assert!(matches!(err, ContentError::InvalidDocument(_)));

        let dup = r#"{"slides": [{"filepath": "a.md"}, {"filepath": "a.md"}]}"#;
        let err = ContentParser::default().parse_document_json(dup).unwrap_err();
        assert_eq!(err, ContentError::DuplicateSlide(SlideGuid::new("a.md")));
    }
}
