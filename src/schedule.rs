// src/schedule.rs
//! Cycle scheduler: which scan tasks run on which tick.
//!
//! The counter is a plain value handed in and returned on every tick, so the
//! whole schedule can be stepped in tests without a clock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn step(self) -> i64 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum CounterPolicy {
    /// Up to `max`, back down to `min`, repeat.
    Triangle { min: u32, max: u32 },
    /// `0, 1, .., period-1, 0, ..`
    Modulo { period: u32 },
}

impl Default for CounterPolicy {
    fn default() -> Self {
        CounterPolicy::Triangle { min: 0, max: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCounter {
    pub position: u32,
    pub direction: Direction,
    pub policy: CounterPolicy,
}

impl CycleCounter {
    /// Counter at the policy's starting point.
    pub fn new(policy: CounterPolicy) -> Self {
        let policy = match policy {
            CounterPolicy::Triangle { min, max } if min > max => {
                CounterPolicy::Triangle { min: max, max: min }
            }
            CounterPolicy::Modulo { period } => CounterPolicy::Modulo {
                period: period.max(1),
            },
            p => p,
        };
        let position = match policy {
            CounterPolicy::Triangle { min, .. } => min,
            CounterPolicy::Modulo { .. } => 0,
        };
        Self {
            position,
            direction: Direction::Up,
            policy,
        }
    }

    /// Exactly one step. Triangle flips direction at either bound before
    /// stepping; a degenerate `min == max` range stays put.
    pub fn advance(self) -> Self {
        match self.policy {
            CounterPolicy::Triangle { min, max } => {
                if min == max {
                    return Self { position: min, ..self };
                }
                let direction = if self.position >= max {
                    Direction::Down
                } else if self.position <= min {
                    Direction::Up
                } else {
                    self.direction
                };
                let next = i64::from(self.position) + direction.step();
                let position = next.clamp(i64::from(min), i64::from(max)) as u32;
                Self {
                    position,
                    direction,
                    policy: self.policy,
                }
            }
            CounterPolicy::Modulo { period } => Self {
                position: (self.position + 1) % period.max(1),
                direction: Direction::Up,
                policy: self.policy,
            },
        }
    }
}

impl Default for CycleCounter {
    fn default() -> Self {
        Self::new(CounterPolicy::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Always,
    At(u32),
}

impl Trigger {
    pub fn fires_at(self, position: u32) -> bool {
        match self {
            Trigger::Always => true,
            Trigger::At(p) => p == position,
        }
    }
}

/// Task bindings, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    bindings: Vec<(TaskId, Trigger)>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, task: impl Into<TaskId>, trigger: Trigger) -> Self {
        self.bindings.push((task.into(), trigger));
        self
    }

    pub fn bindings(&self) -> &[(TaskId, Trigger)] {
        &self.bindings
    }

    /// Tasks for the counter's current position, plus the counter for the
    /// next tick. The counter advances whether or not anything fired.
    pub fn next_tasks(&self, counter: CycleCounter) -> (Vec<TaskId>, CycleCounter) {
        let tasks = self
            .bindings
            .iter()
            .filter(|(_, t)| t.fires_at(counter.position))
            .map(|(id, _)| id.clone())
            .collect();
        (tasks, counter.advance())
    }
}

/// Skip-not-queue guard: at most one tick in flight.
#[derive(Debug, Default)]
pub struct TickGuard {
    running: AtomicBool,
}

impl TickGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another tick holds the permit.
    pub fn try_begin(&self) -> Option<TickPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickPermit { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the guard on drop, including on early return or panic.
#[derive(Debug)]
pub struct TickPermit<'a> {
    guard: &'a TickGuard,
}

impl Drop for TickPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}
