use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{
    ActivityId, ActivityMetadata, ActivityStatus, CourseStructure, ProgressSnapshot,
    ProgressTracking, SlideGuid, SlideStatus,
};
use crate::parser::{ActivitiesMeta, ParsedCourse, SlideActivities};

/// Schema version written into every snapshot.
pub const PROGRESS_VERSION: &str = "1.0.0";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AggregateError {
    #[error("unknown slide: {0}")]
    UnknownSlide(SlideGuid),

    #[error("activity {0} is not declared on any slide")]
    OrphanActivity(ActivityId),
}

/// Course structure, activity metadata and learner progress for one session.
///
/// Structure and metadata are fixed at initialization; only the progress
/// sub-tree changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressAggregate {
    structure: CourseStructure,
    activities: ActivitiesMeta,
    owners: BTreeMap<ActivityId, SlideGuid>,
    progress: ProgressTracking,
    last_updated: DateTime<Utc>,
    version: String,
}

impl ProgressAggregate {
    /// Builds a fresh aggregate with every slide and activity unvisited.
    #[must_use]
    pub fn initialize(
        structure: CourseStructure,
        activities: ActivitiesMeta,
        now: DateTime<Utc>,
    ) -> Self {
        let mut owners = BTreeMap::new();
        for (guid, slide_activities) in &activities {
            for id in slide_activities.keys() {
                if let Some(previous) = owners.insert(id.clone(), guid.clone()) {
                    warn!(
                        target: "progress",
                        activity_id = %id,
                        first_slide = %previous,
                        second_slide = %guid,
                        "activity id declared on more than one slide"
                    );
                }
            }
        }

        let mut aggregate = Self {
            structure,
            activities,
            owners,
            progress: ProgressTracking::default(),
            last_updated: now,
            version: PROGRESS_VERSION.to_owned(),
        };
        aggregate.progress = aggregate.fresh_progress();

        debug!(
            target: "progress",
            au_id = aggregate.structure.au_id(),
            slides = aggregate.structure.slide_count(),
            activities = aggregate.owners.len(),
            total_progress_steps = aggregate.progress.total_progress_steps,
            "initialized progress aggregate"
        );
        aggregate
    }

    #[must_use]
    pub fn from_parsed(parsed: ParsedCourse, now: DateTime<Utc>) -> Self {
        Self::initialize(parsed.structure, parsed.activities, now)
    }

    fn fresh_progress(&self) -> ProgressTracking {
        let slide_status = self
            .structure
            .slides()
            .iter()
            .map(|slide| (slide.guid.clone(), SlideStatus::default()))
            .collect();

        let activity_status = self
            .owners
            .iter()
            .filter_map(|(id, guid)| {
                let meta = self.activities.get(guid)?.get(id)?;
                Some((id.clone(), self.pending_status(guid, meta)))
            })
            .collect();

        ProgressTracking {
            au_progress: 0,
            au_completed: false,
            au_passed: false,
            total_progress_steps: self.structure.slide_count() + self.gradable_activity_count(),
            slide_status,
            activity_status,
        }
    }

    fn pending_status(&self, guid: &SlideGuid, meta: &ActivityMetadata) -> ActivityStatus {
        let index = self
            .structure
            .find(guid)
            .map_or(0, |slide| slide.index);
        ActivityStatus::pending(meta.activity_type(), index, guid.clone())
    }

    // ─── Accessors ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn structure(&self) -> &CourseStructure {
        &self.structure
    }

    #[must_use]
    pub fn activities(&self) -> &ActivitiesMeta {
        &self.activities
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressTracking {
        &self.progress
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn slide_status(&self, guid: &SlideGuid) -> Option<&SlideStatus> {
        self.progress.slide_status.get(guid)
    }

    #[must_use]
    pub fn activity_status(&self, id: &ActivityId) -> Option<&ActivityStatus> {
        self.progress.activity_status.get(id)
    }

    #[must_use]
    pub fn slide_activities(&self, guid: &SlideGuid) -> Option<&SlideActivities> {
        self.activities.get(guid)
    }

    /// Owning slide and metadata of an activity.
    #[must_use]
    pub fn activity_metadata(&self, id: &ActivityId) -> Option<(&SlideGuid, &ActivityMetadata)> {
        let guid = self.owners.get(id)?;
        let meta = self.activities.get(guid)?.get(id)?;
        Some((guid, meta))
    }

    /// Activities counted in `totalProgressSteps` in addition to slides.
    #[must_use]
    pub fn gradable_activity_count(&self) -> usize {
        self.activities
            .values()
            .flat_map(|slide| slide.values())
            .filter(|meta| meta.is_gradable())
            .count()
    }

    // ─── Mutators ──────────────────────────────────────────────────────────────

    /// Replaces the status of one slide.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError::UnknownSlide` if the slide is not part of the course.
    pub fn set_slide_status(
        &mut self,
        guid: &SlideGuid,
        status: SlideStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AggregateError> {
        let slot = self
            .progress
            .slide_status
            .get_mut(guid)
            .ok_or_else(|| AggregateError::UnknownSlide(guid.clone()))?;
        *slot = status;
        self.last_updated = now;
        Ok(())
    }

    /// Sets `viewed` on a slide and reports whether this was the first view.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError::UnknownSlide` if the slide is not part of the course.
    pub fn mark_viewed(&mut self, guid: &SlideGuid, now: DateTime<Utc>) -> Result<bool, AggregateError> {
        let slot = self
            .progress
            .slide_status
            .get_mut(guid)
            .ok_or_else(|| AggregateError::UnknownSlide(guid.clone()))?;
        let first_view = !slot.viewed;
        slot.viewed = true;
        self.last_updated = now;
        Ok(first_view)
    }

    /// Overwrites the status of one activity.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError::OrphanActivity` if no slide declares the activity.
    pub fn set_activity_status(
        &mut self,
        id: &ActivityId,
        status: ActivityStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AggregateError> {
        if !self.owners.contains_key(id) {
            return Err(AggregateError::OrphanActivity(id.clone()));
        }
        self.progress.activity_status.insert(id.clone(), status);
        self.last_updated = now;
        Ok(())
    }

    /// Stores the AU-level outcome computed by the evaluator.
    pub fn set_au_outcome(&mut self, progress: u8, completed: bool, passed: bool, now: DateTime<Utc>) {
        self.progress.au_progress = progress.min(100);
        self.progress.au_completed = completed;
        self.progress.au_passed = passed;
        self.last_updated = now;
    }

    /// Merges a remote progress tree into this aggregate.
    ///
    /// Structure and metadata stay as parsed from the current content: statuses
    /// for slides or activities that no longer exist are dropped, missing ones are
    /// seeded, and `totalProgressSteps` keeps its locally derived value.
    pub fn replace_progress(&mut self, remote: ProgressTracking, now: DateTime<Utc>) {
        let mut merged = self.fresh_progress();
        merged.au_progress = remote.au_progress.min(100);
        merged.au_completed = remote.au_completed;
        merged.au_passed = remote.au_passed;

        for (guid, status) in remote.slide_status {
            match merged.slide_status.get_mut(&guid) {
                Some(slot) => *slot = status,
                None => {
                    warn!(target: "progress", slide_guid = %guid, "dropping status for slide no longer in the course");
                }
            }
        }

        for (id, mut status) in remote.activity_status {
            let Some(owner) = self.owners.get(&id) else {
                warn!(target: "progress", activity_id = %id, "dropping status for activity no longer in the course");
                continue;
            };
            if let Some(slide) = self.structure.find(owner) {
                status.slide_index = slide.index;
            }
            status.slide_guid = owner.clone();
            merged.activity_status.insert(id, status);
        }

        if remote.total_progress_steps != merged.total_progress_steps {
            debug!(
                target: "progress",
                remote = remote.total_progress_steps,
                local = merged.total_progress_steps,
                "remote progress step count differs; keeping local"
            );
        }

        self.progress = merged;
        self.last_updated = now;
    }

    /// Discards all learner progress.
    pub fn reset_progress(&mut self, now: DateTime<Utc>) {
        self.progress = self.fresh_progress();
        self.last_updated = now;
    }

    /// Persistable view of the progress sub-tree.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            progress: self.progress.clone(),
            last_updated: self.last_updated,
            version: self.version.clone(),
        }
    }
}
