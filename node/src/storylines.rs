// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! StorylineTracker: turns appended events into storyline stages.

use canon_kernel::{CanonEvent, EventType, StampStoryline, StorylineDefinition, StorylineId, StorylineProgression, UserId};
use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::Result;
use crate::store::LedgerStore;
use crate::telemetry::STORYLINE_PROGRESSIONS;

/// Which storylines an event advances.
pub trait StorylineRules: Send + Sync {
    fn matching(&self, event: &CanonEvent) -> Vec<StorylineDefinition>;
}

/// Event-type keyed rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<(EventType, StorylineDefinition)>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Self::empty()
            .with_rule(
                EventType::JobCompleted,
                StorylineDefinition::new(
                    "trusted-hands",
                    "Trusted Hands",
                    "Complete jobs to earn the trust of your neighbourhood.",
                    5,
                ),
            )
            .with_rule(
                EventType::StampUnlock,
                StorylineDefinition::new(
                    "stamp-collector",
                    "Stamp Collector",
                    "Unlock stamps to fill your passport.",
                    3,
                ),
            )
            .with_rule(
                EventType::Milestone,
                StorylineDefinition::new(
                    "milestone-march",
                    "Milestone March",
                    "Every milestone is a step on the march.",
                    4,
                ),
            )
    }

    pub fn with_rule(mut self, event_type: EventType, def: StorylineDefinition) -> Self {
        self.rules.push((event_type, def));
        self
    }
}

impl StorylineRules for RuleSet {
    fn matching(&self, event: &CanonEvent) -> Vec<StorylineDefinition> {
        self.rules
            .iter()
            .filter(|(t, _)| *t == event.event_type)
            .map(|(_, def)| def.clone())
            .collect()
    }
}

pub struct StorylineTracker {
    store: Arc<dyn LedgerStore>,
    rules: Arc<dyn StorylineRules>,
    clock: Arc<dyn Clock>,
}

impl StorylineTracker {
    pub fn new(store: Arc<dyn LedgerStore>, rules: Arc<dyn StorylineRules>, clock: Arc<dyn Clock>) -> Self {
        Self { store, rules, clock }
    }

    /// Advance every matching storyline by one stage. Safe to call again
    /// for the same event: already-counted causes are skipped by the store.
    pub async fn on_event_appended(&self, event: &CanonEvent) -> Result<Vec<StorylineProgression>> {
        let mut advanced = Vec::new();
        for def in self.rules.matching(event) {
            let progression = self
                .store
                .advance_storyline(&event.owner_id, &def, event, self.clock.now())
                .await?;
            if let Some(p) = progression {
                tracing::debug!(
                    "Storyline {} advanced to stage {} by {}",
                    p.storyline_id,
                    p.stage_number,
                    event.id
                );
                metrics::counter!(STORYLINE_PROGRESSIONS, 1);
                advanced.push(p);
            }
        }
        Ok(advanced)
    }

    pub async fn progressions(&self, id: StorylineId) -> Result<Vec<StorylineProgression>> {
        self.store.progressions(id).await
    }

    pub async fn active_storylines(&self, owner: &UserId) -> Result<Vec<StampStoryline>> {
        let all = self.store.storylines_of(owner).await?;
        Ok(all.into_iter().filter(|s| !s.is_complete).collect())
    }

    pub async fn completed_storylines(&self, owner: &UserId) -> Result<Vec<StampStoryline>> {
        let all = self.store.storylines_of(owner).await?;
        Ok(all.into_iter().filter(|s| s.is_complete).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use canon_kernel::{EventDraft, Timestamp};

    #[tokio::test]
    async fn test_redelivery_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let tracker = StorylineTracker::new(
            store.clone(),
            Arc::new(RuleSet::standard()),
            Arc::new(ManualClock::at(1_000)),
        );
        let draft = EventDraft::new("u1", "stamp-unlock", "first").with_stamp("s1").validate().unwrap();
        let event = store.append_event(draft, None, Timestamp(1_000), 60).await.unwrap().event;

        let first = tracker.on_event_appended(&event).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].stage_number, 1);

        // Same signal delivered again.
        let again = tracker.on_event_appended(&event).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(tracker.progressions(first[0].storyline_id).await.unwrap().len(), 1);
        let active = tracker.active_storylines(&event.owner_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].stage, 1);
    }
}
