//! In-memory position book and cooldown state.
//!
//! The book is the process's record of every bracket this instance has
//! opened, terminal ones included (the exchange stays the source of
//! truth for in-flight orders — nothing here is persisted). Both live
//! behind the engine's single state lock; the orchestrator writes at
//! creation, the reconciliation loop writes afterwards.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::types::{Position, PositionState};

// ---------------------------------------------------------------------------
// Cooldown
// ---------------------------------------------------------------------------

/// Per-instrument cooldown gate.
///
/// Stamped by the orchestrator on every entry attempt — success or
/// failure — so a decision that is still resolving cannot be re-triggered
/// by the next qualifying tick.
#[derive(Debug, Default, Clone)]
pub struct CooldownState {
    last_action_at: Option<DateTime<Utc>>,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_action_at = Some(now);
    }

    pub fn last_action_at(&self) -> Option<DateTime<Utc>> {
        self.last_action_at
    }

    /// Whether the cooldown window is still running as of `now`.
    pub fn is_active(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_action_at {
            Some(at) => now - at < window,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Position book
// ---------------------------------------------------------------------------

/// Counts for logging and the shutdown summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookSummary {
    pub open: usize,
    pub closed: usize,
    pub failed: usize,
}

/// All positions created by this instance, keyed by id.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: Vec<Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, position: Position) {
        self.positions.push(position);
    }

    /// Positions in OPENING/ACTIVE/CLOSING — the set the risk gate counts
    /// and the reconciliation loop advances.
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|p| p.state.is_open())
            .cloned()
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.positions.iter().filter(|p| p.state.is_open()).count()
    }

    pub fn get(&self, id: Uuid) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    /// Replace a position by id, returning false if it is unknown.
    pub fn commit(&mut self, updated: Position) -> bool {
        match self.positions.iter_mut().find(|p| p.id == updated.id) {
            Some(slot) => {
                *slot = updated;
                true
            }
            None => false,
        }
    }

    pub fn summary(&self) -> BookSummary {
        let mut s = BookSummary {
            open: 0,
            closed: 0,
            failed: 0,
        };
        for p in &self.positions {
            match p.state {
                PositionState::Closed => s.closed += 1,
                PositionState::Failed => s.failed += 1,
                _ => s.open += 1,
            }
        }
        s
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
