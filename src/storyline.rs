// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Stamp storylines: per-user, multi-stage progressions advanced by canon events.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::event::CanonEvent;
use crate::types::id::{EventId, ProgressionId, StorylineId, UserId};
use crate::types::time::Timestamp;

/// Template a storyline is opened from. Supplied by the matching rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorylineDefinition {
    pub storyline_type: String,
    pub title: String,
    pub description: String,
    pub total_stages: u32,
}

impl StorylineDefinition {
    pub fn new(storyline_type: &str, title: &str, description: &str, total_stages: u32) -> Self {
        Self {
            storyline_type: storyline_type.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            total_stages,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampStoryline {
    pub id: StorylineId,
    pub owner_id: UserId,
    pub storyline_type: String,
    pub title: String,
    pub description: String,
    pub stage: u32,
    pub total_stages: u32,
    pub is_complete: bool,
    pub completed_at: Option<Timestamp>,
}

impl StampStoryline {
    pub fn open(id: StorylineId, owner_id: UserId, def: &StorylineDefinition) -> Result<Self> {
        if def.total_stages == 0 {
            return Err(KernelError::Validation(format!(
                "storyline '{}' must have at least one stage",
                def.storyline_type
            )));
        }
        Ok(Self {
            id,
            owner_id,
            storyline_type: def.storyline_type.clone(),
            title: def.title.clone(),
            description: def.description.clone(),
            stage: 0,
            total_stages: def.total_stages,
            is_complete: false,
            completed_at: None,
        })
    }

    /// Build the progression `causing` would produce, without applying it.
    ///
    /// Returns `None` once the storyline is complete.
    pub fn next_progression(
        &self,
        progression_id: ProgressionId,
        causing: &CanonEvent,
        now: Timestamp,
    ) -> Option<StorylineProgression> {
        if self.is_complete {
            return None;
        }
        let stage_number = self.stage + 1;
        Some(StorylineProgression {
            id: progression_id,
            storyline_id: self.id,
            causing_event_id: causing.id,
            stage_number,
            narrative_text: narrative_for(stage_number, self.total_stages, &causing.title),
            created_at: now,
        })
    }

    /// Apply a progression. Enforces contiguity and the completion rule.
    pub fn apply_progression(&mut self, progression: &StorylineProgression) -> Result<()> {
        if progression.storyline_id != self.id {
            return Err(KernelError::Invariant(format!(
                "progression {} belongs to {}, not {}",
                progression.id, progression.storyline_id, self.id
            )));
        }
        if self.is_complete {
            return Err(KernelError::Invariant(format!("storyline {} is complete", self.id)));
        }
        if progression.stage_number != self.stage + 1 {
            return Err(KernelError::Invariant(format!(
                "storyline {} expected stage {}, got {}",
                self.id,
                self.stage + 1,
                progression.stage_number
            )));
        }

        self.stage = progression.stage_number;
        if self.stage == self.total_stages {
            self.is_complete = true;
            self.completed_at = Some(progression.created_at);
        }
        Ok(())
    }
}

/// An immutable record of one stage advance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorylineProgression {
    pub id: ProgressionId,
    pub storyline_id: StorylineId,
    pub causing_event_id: EventId,
    pub stage_number: u32,
    pub narrative_text: String,
    pub created_at: Timestamp,
}

pub fn narrative_for(stage: u32, total: u32, event_title: &str) -> String {
    format!("Chapter {} of {}: {}", stage, total, event_title)
}
