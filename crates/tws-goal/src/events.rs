// events.rs — Goal lifecycle trail and its sinks.
//
// The orchestrator records a GoalEvent at each scheduling step: request,
// start, queue, flush, cancel, completion and rule-event raise. The trail
// numbers them so a JSONL file and an in-memory copy line up entry for
// entry. Sinks cannot influence scheduling.

use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tws_procedure::{ProcResult, ProcedureHandle};

use crate::decision::DecisionId;
use crate::error::GoalError;
use crate::goal::{GoalId, GoalMask};
use crate::rule_events::RuleEvent;

/// Notifications emitted at goal lifecycle points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GoalEvent {
    /// A goal was requested, fresh or re-delivered from the queue.
    GoalRequested {
        goal: GoalId,
        decision: DecisionId,
        redelivered: bool,
        timestamp: DateTime<Utc>,
    },
    /// The goal's procedure or script was started.
    GoalStarted {
        goal: GoalId,
        handle: ProcedureHandle,
        timestamp: DateTime<Utc>,
    },
    /// The goal was parked behind `waiting_on`.
    GoalQueued {
        goal: GoalId,
        waiting_on: GoalMask,
        timestamp: DateTime<Utc>,
    },
    /// A queued request was dropped by a cancelling goal.
    GoalFlushed {
        goal: GoalId,
        decision: DecisionId,
        by: GoalId,
        timestamp: DateTime<Utc>,
    },
    /// Cancellation of an active goal was requested.
    GoalCancelRequested {
        goal: GoalId,
        by: GoalId,
        timestamp: DateTime<Utc>,
    },
    /// The goal finished with `result`.
    GoalCompleted {
        goal: GoalId,
        result: ProcResult,
        timestamp: DateTime<Utc>,
    },
    /// The goal acknowledged its cancellation.
    GoalCancelled {
        goal: GoalId,
        result: ProcResult,
        timestamp: DateTime<Utc>,
    },
    /// A follow-up event was raised into the rules engine.
    RuleEventRaised {
        goal: GoalId,
        event: RuleEvent,
        timestamp: DateTime<Utc>,
    },
}

impl GoalEvent {
    pub fn requested(goal: GoalId, decision: DecisionId, redelivered: bool) -> Self {
        Self::GoalRequested {
            goal,
            decision,
            redelivered,
            timestamp: Utc::now(),
        }
    }

    pub fn started(goal: GoalId, handle: ProcedureHandle) -> Self {
        Self::GoalStarted {
            goal,
            handle,
            timestamp: Utc::now(),
        }
    }

    pub fn queued(goal: GoalId, waiting_on: GoalMask) -> Self {
        Self::GoalQueued {
            goal,
            waiting_on,
            timestamp: Utc::now(),
        }
    }

    pub fn flushed(goal: GoalId, decision: DecisionId, by: GoalId) -> Self {
        Self::GoalFlushed {
            goal,
            decision,
            by,
            timestamp: Utc::now(),
        }
    }

    pub fn cancel_requested(goal: GoalId, by: GoalId) -> Self {
        Self::GoalCancelRequested {
            goal,
            by,
            timestamp: Utc::now(),
        }
    }

    pub fn completed(goal: GoalId, result: ProcResult) -> Self {
        Self::GoalCompleted {
            goal,
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn cancelled(goal: GoalId, result: ProcResult) -> Self {
        Self::GoalCancelled {
            goal,
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn rule_event(goal: GoalId, event: RuleEvent) -> Self {
        Self::RuleEventRaised {
            goal,
            event,
            timestamp: Utc::now(),
        }
    }

    /// The event type as a string (for filtering/display).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::GoalRequested { .. } => "goal_requested",
            Self::GoalStarted { .. } => "goal_started",
            Self::GoalQueued { .. } => "goal_queued",
            Self::GoalFlushed { .. } => "goal_flushed",
            Self::GoalCancelRequested { .. } => "goal_cancel_requested",
            Self::GoalCompleted { .. } => "goal_completed",
            Self::GoalCancelled { .. } => "goal_cancelled",
            Self::RuleEventRaised { .. } => "rule_event_raised",
        }
    }

    pub fn goal(&self) -> GoalId {
        match self {
            Self::GoalRequested { goal, .. }
            | Self::GoalStarted { goal, .. }
            | Self::GoalQueued { goal, .. }
            | Self::GoalFlushed { goal, .. }
            | Self::GoalCancelRequested { goal, .. }
            | Self::GoalCompleted { goal, .. }
            | Self::GoalCancelled { goal, .. }
            | Self::RuleEventRaised { goal, .. } => *goal,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::GoalRequested { timestamp, .. }
            | Self::GoalStarted { timestamp, .. }
            | Self::GoalQueued { timestamp, .. }
            | Self::GoalFlushed { timestamp, .. }
            | Self::GoalCancelRequested { timestamp, .. }
            | Self::GoalCompleted { timestamp, .. }
            | Self::GoalCancelled { timestamp, .. }
            | Self::RuleEventRaised { timestamp, .. } => *timestamp,
        }
    }
}

/// One numbered step of the trail, as sinks receive it. On disk the event's
/// fields sit beside `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailEntry {
    pub seq: u64,
    #[serde(flatten)]
    pub event: GoalEvent,
}

/// Receives trail entries in sequence order.
pub trait TrailSink: Send {
    fn record(&mut self, entry: &TrailEntry) -> Result<(), GoalError>;
}

/// Appends entries as JSON lines to a file opened once, when the trail is
/// set up. Each line is flushed as it is written.
pub struct JsonlTrail {
    path: PathBuf,
    writer: LineWriter<File>,
}

impl JsonlTrail {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GoalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| io_error(&path, source))?;
        Ok(Self {
            path,
            writer: LineWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrailSink for JsonlTrail {
    fn record(&mut self, entry: &TrailEntry) -> Result<(), GoalError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .map_err(|source| io_error(&self.path, source))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> GoalError {
    GoalError::IoError {
        path: path.display().to_string(),
        source,
    }
}

/// Keeps entries in memory. Clones share the same buffer, so one clone can
/// be handed to a trail while another is inspected.
#[derive(Clone, Default)]
pub struct MemoryTrail {
    entries: Arc<Mutex<Vec<TrailEntry>>>,
}

impl MemoryTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TrailEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events(&self) -> Vec<GoalEvent> {
        self.entries().into_iter().map(|entry| entry.event).collect()
    }
}

impl TrailSink for MemoryTrail {
    fn record(&mut self, entry: &TrailEntry) -> Result<(), GoalError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| GoalError::NotificationError(e.to_string()))?;
        entries.push(entry.clone());
        Ok(())
    }
}

/// The orchestrator's record of scheduling steps. Numbers each event and
/// hands it to every sink; a sink that fails is logged and skipped, and the
/// miss is counted.
#[derive(Default)]
pub struct GoalTrail {
    sinks: Vec<Box<dyn TrailSink>>,
    recorded: u64,
    dropped: usize,
}

impl GoalTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl TrailSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn TrailSink>) {
        self.sinks.push(sink);
    }

    /// Events recorded so far, delivered or not.
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Sink deliveries that failed.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn record(&mut self, event: GoalEvent) {
        self.recorded += 1;
        let entry = TrailEntry {
            seq: self.recorded,
            event,
        };
        for sink in &mut self.sinks {
            if let Err(e) = sink.record(&entry) {
                self.dropped += 1;
                tracing::warn!(
                    "trail #{} ({} for {}) not recorded: {}",
                    entry.seq,
                    entry.event.event_type(),
                    entry.event.goal(),
                    e
                );
            }
        }
    }
}
