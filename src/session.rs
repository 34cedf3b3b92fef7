use rand::prelude::*;
use serde::Serialize;
use std::{collections::BTreeSet, sync::Arc, time::Duration};

use crate::matching;
use crate::models::{Catalog, Country, GameConfig, MAX_HINTS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    NotStarted,
    Playing,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Feedback {
    Correct,
    Incorrect,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum Hint {
    Capital(String),
    FirstLetter(String),
}

/// Work a transition asks the controller to run later. Each variant carries
/// the generations it was issued under and is ignored once they are stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deferred {
    Advance { round: u64 },
    ClearFeedback { round: u64, serial: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    StartTicker { play: u64 },
    Schedule { after: Duration, task: Deferred },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    Review,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub score: usize,
    pub total: usize,
    pub percentage: u32,
    pub rating: Rating,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub target: Option<String>,
    pub guessed: Vec<String>,
    pub score: usize,
    pub total: usize,
    pub hints_remaining: u8,
    pub hint: Option<Hint>,
    pub remaining_seconds: u32,
    pub clock: String,
    pub pending_input: String,
    pub feedback: Option<Feedback>,
    pub solved: bool,
    pub summary: Option<Summary>,
}

/// One play-through of the quiz. Every mutation goes through the methods
/// below; the score is always the size of `guessed`.
#[derive(Clone, Debug)]
pub struct Session {
    catalog: Arc<Catalog>,
    time_budget: u32,
    advance_delay: Duration,
    feedback_clear_delay: Duration,

    phase: Phase,
    target: Option<Country>,
    guessed: BTreeSet<String>,
    hints_used: u8,
    hint: Option<Hint>,
    remaining_seconds: u32,
    pending_input: String,
    feedback: Option<Feedback>,
    solved: bool,

    play: u64,
    round: u64,
    feedback_serial: u64,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>, game: &GameConfig) -> Session {
        Session {
            catalog,
            time_budget: game.time_budget_secs,
            advance_delay: game.advance_delay(),
            feedback_clear_delay: game.feedback_clear_delay(),
            phase: Phase::NotStarted,
            target: None,
            guessed: BTreeSet::new(),
            hints_used: 0,
            hint: None,
            remaining_seconds: game.time_budget_secs,
            pending_input: String::new(),
            feedback: None,
            solved: false,
            play: 0,
            round: 0,
            feedback_serial: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn target(&self) -> Option<&Country> {
        self.target.as_ref()
    }

    pub fn guessed(&self) -> &BTreeSet<String> {
        &self.guessed
    }

    pub fn score(&self) -> usize {
        self.guessed.len()
    }

    pub fn hints_used(&self) -> u8 {
        self.hints_used
    }

    pub fn hint(&self) -> Option<&Hint> {
        self.hint.as_ref()
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn feedback(&self) -> Option<Feedback> {
        self.feedback
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    pub fn start<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Effect> {
        self.play += 1;
        self.phase = Phase::Playing;
        self.guessed.clear();
        self.remaining_seconds = self.time_budget;
        self.select_target(rng);

        if self.phase == Phase::Playing {
            vec![Effect::StartTicker { play: self.play }]
        } else {
            vec![]
        }
    }

    /// Applies one elapsed second. Returns whether the ticker for `play`
    /// should keep running.
    pub fn tick(&mut self, play: u64) -> bool {
        if play != self.play || self.phase != Phase::Playing {
            return false;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.finish();
            return false;
        }

        true
    }

    pub fn set_input(&mut self, text: &str) {
        if self.phase == Phase::Playing {
            self.pending_input = text.into();
        }
    }

    pub fn guess(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Playing || self.solved || self.pending_input.trim().is_empty() {
            return vec![];
        }

        let target = match &self.target {
            None => return vec![],
            Some(target) => target,
        };

        let correct = matching::is_match(&self.pending_input, &target.name);
        let id = target.id.clone();

        self.pending_input.clear();
        self.feedback_serial += 1;

        if correct {
            self.guessed.insert(id);
            self.feedback = Some(Feedback::Correct);

            if self.guessed.len() == self.catalog.len() {
                self.finish();
                return vec![];
            }

            self.solved = true;
            vec![Effect::Schedule {
                after: self.advance_delay,
                task: Deferred::Advance { round: self.round },
            }]
        } else {
            self.feedback = Some(Feedback::Incorrect);
            vec![Effect::Schedule {
                after: self.feedback_clear_delay,
                task: Deferred::ClearFeedback {
                    round: self.round,
                    serial: self.feedback_serial,
                },
            }]
        }
    }

    /// Reveals the next hint tier: the capital first, then the first letter.
    pub fn request_hint(&mut self) -> Option<&Hint> {
        if self.phase != Phase::Playing || self.solved || self.hints_used >= MAX_HINTS {
            return None;
        }
        let target = self.target.as_ref()?;

        let hint = match self.hints_used {
            0 => Hint::Capital(target.capital.clone()),
            _ => Hint::FirstLetter(target.name.chars().take(1).collect()),
        };

        self.hints_used += 1;
        self.hint = Some(hint);
        self.hint.as_ref()
    }

    pub fn skip<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.phase == Phase::Playing && self.target.is_some() {
            self.select_target(rng);
        }
    }

    pub fn fire<R: Rng + ?Sized>(&mut self, task: Deferred, rng: &mut R) {
        match task {
            Deferred::Advance { round } => {
                if self.phase == Phase::Playing && self.solved && round == self.round {
                    self.select_target(rng);
                }
            }
            Deferred::ClearFeedback { round, serial } => {
                if round == self.round && serial == self.feedback_serial {
                    self.feedback = None;
                }
            }
        }
    }

    pub fn clock(&self) -> String {
        format!("{}:{:02}", self.remaining_seconds / 60, self.remaining_seconds % 60)
    }

    pub fn summary(&self) -> Summary {
        let score = self.score();
        let total = self.catalog.len();
        let percentage = ((score * 100 + total / 2) / total) as u32;

        let rating = match percentage {
            80..=100 => Rating::Excellent,
            60..=79 => Rating::Good,
            40..=59 => Rating::Fair,
            _ => Rating::Review,
        };

        Summary {
            score,
            total,
            percentage,
            rating,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            target: self.target.as_ref().map(|target| target.id.clone()),
            guessed: self.guessed.iter().cloned().collect(),
            score: self.score(),
            total: self.catalog.len(),
            hints_remaining: MAX_HINTS - self.hints_used,
            hint: self.hint.clone(),
            remaining_seconds: self.remaining_seconds,
            clock: self.clock(),
            pending_input: self.pending_input.clone(),
            feedback: self.feedback,
            solved: self.solved,
            summary: match self.phase {
                Phase::Finished => Some(self.summary()),
                _ => None,
            },
        }
    }

    fn select_target<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let guessed = &self.guessed;
        let next = self
            .catalog
            .iter()
            .filter(|country| !guessed.contains(&country.id))
            .collect::<Vec<_>>()
            .choose(rng)
            .map(|&country| country.clone());

        match next {
            Some(country) => self.begin_round(country),
            None => self.finish(),
        }
    }

    fn begin_round(&mut self, country: Country) {
        self.target = Some(country);
        self.round += 1;
        self.hints_used = 0;
        self.hint = None;
        self.pending_input.clear();
        self.feedback = None;
        self.solved = false;
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.target = None;
        self.round += 1;
        self.hints_used = 0;
        self.hint = None;
        self.pending_input.clear();
        self.solved = false;
    }
}
