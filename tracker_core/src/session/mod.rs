//! The active-workout session: one in-progress workout from start to
//! finish or discard.
//!
//! The manager is single-writer: every mutation takes `&mut self` and the
//! session state is never shared. Observers subscribe to watch channels for
//! snapshots and the running clock. Background work (clock ticks, debounced
//! draft writes, the final save) runs on tokio tasks, so a manager must be
//! created and used inside a runtime.
//!
//! Draft writes pass through a gate holding a generation number. Finishing
//! or discarding bumps the generation under the gate before clearing the
//! draft, and a pending write holds the gate until its file write is done,
//! so no snapshot can land after the clear.

mod entry;
mod rest;
mod stopwatch;

pub use entry::{ActiveExerciseEntry, PlanPreview};
pub use rest::RestTimer;
pub use stopwatch::Stopwatch;

use crate::config::SessionConfig;
use crate::draft::{DraftExerciseEntry, DraftStore, WorkoutDraft};
use crate::repository::WorkoutRepository;
use crate::types::to_millis;
use crate::{Error, Exercise, Result, Workout, WorkoutExercise, WorkoutSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NotStarted,
    Running,
    Paused,
    Finished,
    Discarded,
}

impl SessionPhase {
    /// Running or paused
    pub fn is_active(self) -> bool {
        matches!(self, SessionPhase::Running | SessionPhase::Paused)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Finished | SessionPhase::Discarded)
    }
}

/// Where a new session gets its initial state from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOrigin {
    /// Empty session, or the pending draft if there is one
    Fresh,
    /// Continue logging an existing workout; finishing replaces it
    Resume(i64),
    /// Pre-fill ghost entries from a past workout's structure
    Plan(i64),
}

/// Published after every mutation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub start_time: Option<DateTime<Utc>>,
    pub elapsed: Duration,
    pub entries: Vec<ActiveExerciseEntry>,
    pub resumed_from_workout_id: Option<i64>,
}

impl SessionSnapshot {
    fn not_started() -> Self {
        Self {
            phase: SessionPhase::NotStarted,
            start_time: None,
            elapsed: Duration::ZERO,
            entries: Vec::new(),
            resumed_from_workout_id: None,
        }
    }

    pub fn recorded_sets(&self) -> usize {
        self.entries.iter().map(|e| e.sets.len()).sum()
    }
}

/// What finishing or discarding ended up doing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishOutcome {
    Saved { workout_id: i64 },
    Discarded,
}

/// Completion of a finish/discard
///
/// The work runs on its own task and keeps going if this handle is
/// dropped; awaiting [`FinishHandle::wait`] only observes the result.
#[derive(Debug)]
pub struct FinishHandle {
    task: JoinHandle<Result<FinishOutcome>>,
}

impl FinishHandle {
    pub async fn wait(self) -> Result<FinishOutcome> {
        self.task.await?
    }
}

type DraftGate = Arc<Mutex<u64>>;

async fn write_draft(gate: DraftGate, generation: u64, store: DraftStore, draft: WorkoutDraft) -> Result<()> {
    let guard = gate.lock_owned().await;
    if *guard != generation {
        tracing::debug!("Dropping draft write from generation {}", generation);
        return Ok(());
    }
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        store.save_draft(&draft)
    })
    .await?
}

async fn clear_draft(gate: DraftGate, generation: u64, store: DraftStore) -> Result<()> {
    let mut guard = gate.lock_owned().await;
    *guard = generation;
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        store.clear_draft()
    })
    .await?
}

/// State machine for one in-progress workout
pub struct SessionManager {
    workouts: WorkoutRepository,
    drafts: DraftStore,
    config: SessionConfig,

    phase: SessionPhase,
    start_time: Option<DateTime<Utc>>,
    stopwatch: Stopwatch,
    entries: Vec<ActiveExerciseEntry>,
    entry_id_counter: u64,
    resumed_from: Option<i64>,

    state_tx: watch::Sender<SessionSnapshot>,
    elapsed_tx: Arc<watch::Sender<Duration>>,
    ticker: Option<JoinHandle<()>>,
    pending_draft: Option<JoinHandle<()>>,
    draft_gate: DraftGate,
    draft_generation: u64,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("phase", &self.phase)
            .field("entries", &self.entries.len())
            .field("resumed_from", &self.resumed_from)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Open a session from `origin`
    pub async fn open(
        workouts: WorkoutRepository,
        drafts: DraftStore,
        config: SessionConfig,
        origin: SessionOrigin,
    ) -> Result<Self> {
        let (state_tx, _) = watch::channel(SessionSnapshot::not_started());
        let (elapsed_tx, _) = watch::channel(Duration::ZERO);
        let mut session = Self {
            workouts,
            drafts,
            config,
            phase: SessionPhase::NotStarted,
            start_time: None,
            stopwatch: Stopwatch::default(),
            entries: Vec::new(),
            entry_id_counter: 0,
            resumed_from: None,
            state_tx,
            elapsed_tx: Arc::new(elapsed_tx),
            ticker: None,
            pending_draft: None,
            draft_gate: Arc::new(Mutex::new(0)),
            draft_generation: 0,
        };

        match origin {
            SessionOrigin::Resume(id) => {
                let workout = session.load_workout(id).await?;
                session.restore_from_workout(workout);
            }
            SessionOrigin::Plan(id) => {
                let workout = session.load_workout(id).await?;
                session.load_plan(&workout);
            }
            SessionOrigin::Fresh => {
                let drafts = session.drafts.clone();
                if let Some(draft) = tokio::task::spawn_blocking(move || drafts.load_draft()).await? {
                    session.restore_from_draft(draft);
                }
            }
        }

        session.publish();
        Ok(session)
    }

    async fn load_workout(&self, id: i64) -> Result<Workout> {
        let workouts = self.workouts.clone();
        tokio::task::spawn_blocking(move || workouts.get_by_id_with_exercises(id))
            .await??
            .ok_or(Error::NotFound {
                entity: "workout",
                id,
            })
    }

    fn next_entry_id(&mut self) -> u64 {
        self.entry_id_counter += 1;
        self.entry_id_counter
    }

    fn restore_from_workout(&mut self, workout: Workout) {
        self.resumed_from = Some(workout.id);
        self.start_time = Some(workout.start_time);
        self.stopwatch =
            Stopwatch::with_base(Duration::from_secs(workout.duration_seconds.max(0) as u64));
        self.entries = workout
            .exercises
            .into_iter()
            .map(|we| {
                let mut entry = ActiveExerciseEntry::new(self.next_entry_id(), we.exercise);
                entry.sets = we.sets;
                entry
            })
            .collect();
        self.phase = SessionPhase::Paused;
        tracing::info!("Resumed workout {} for editing", workout.id);
    }

    fn load_plan(&mut self, workout: &Workout) {
        self.entries = workout
            .exercises
            .iter()
            .map(|we| {
                let mut entry = ActiveExerciseEntry::new(self.next_entry_id(), we.exercise.clone());
                entry.plan = Some(PlanPreview::from_workout_exercise(we));
                entry
            })
            .collect();
        tracing::info!(
            "Planned session from workout {} ({} exercises)",
            workout.id,
            self.entries.len()
        );
    }

    fn restore_from_draft(&mut self, draft: WorkoutDraft) {
        self.start_time = Some(draft.start_time());
        self.stopwatch =
            Stopwatch::with_base(Duration::from_millis(draft.elapsed_millis.max(0) as u64));
        self.entry_id_counter = draft.entry_id_counter;
        self.resumed_from = draft.resumed_from_workout_id;
        self.entries = draft.exercises.iter().map(ActiveExerciseEntry::from).collect();
        self.phase = SessionPhase::Paused;
        tracing::info!("Restored session from draft ({} entries)", self.entries.len());
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    /// Elapsed time, refreshed every tick while running
    pub fn subscribe_elapsed(&self) -> watch::Receiver<Duration> {
        self.elapsed_tx.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.stopwatch.elapsed()
    }

    pub fn entries(&self) -> &[ActiveExerciseEntry] {
        &self.entries
    }

    pub fn resumed_from(&self) -> Option<i64> {
        self.resumed_from
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            start_time: self.start_time,
            elapsed: self.stopwatch.elapsed(),
            entries: self.entries.clone(),
            resumed_from_workout_id: self.resumed_from,
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
        self.elapsed_tx.send_replace(self.stopwatch.elapsed());
    }

    /// Publish and schedule a draft write after a mutation
    fn changed(&mut self) {
        self.publish();
        self.schedule_draft();
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(Error::Session(format!(
                "Session is already {:?}",
                self.phase
            )));
        }
        Ok(())
    }

    /// Begin a not-yet-started session
    pub fn start(&mut self) -> Result<()> {
        if self.phase != SessionPhase::NotStarted {
            return Err(Error::Session(format!(
                "Cannot start a session that is {:?}",
                self.phase
            )));
        }
        self.start_time = Some(Utc::now());
        self.stopwatch = Stopwatch::default();
        self.stopwatch.resume();
        self.phase = SessionPhase::Running;
        self.start_ticker();
        tracing::info!("Session started");
        self.changed();
        Ok(())
    }

    /// Pause a running session or resume a paused one
    pub fn toggle_pause(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Running => {
                self.stopwatch.pause();
                self.stop_ticker();
                self.phase = SessionPhase::Paused;
                tracing::debug!("Session paused at {:?}", self.stopwatch.elapsed());
            }
            SessionPhase::Paused => {
                self.stopwatch.resume();
                self.phase = SessionPhase::Running;
                self.start_ticker();
                tracing::debug!("Session resumed at {:?}", self.stopwatch.elapsed());
            }
            other => {
                return Err(Error::Session(format!(
                    "Cannot pause or resume a session that is {:?}",
                    other
                )))
            }
        }
        self.changed();
        Ok(())
    }

    fn start_ticker(&mut self) {
        self.stop_ticker();
        let tx = Arc::clone(&self.elapsed_tx);
        let stopwatch = self.stopwatch;
        let period = self.config.tick_interval();
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tx.send_replace(stopwatch.elapsed());
            }
        }));
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    // ------------------------------------------------------------------
    // Entries and sets
    // ------------------------------------------------------------------

    fn entry_mut(&mut self, entry_id: u64) -> Result<&mut ActiveExerciseEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| Error::Session(format!("No exercise entry {}", entry_id)))
    }

    fn position(&self, entry_id: u64) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or_else(|| Error::Session(format!("No exercise entry {}", entry_id)))
    }

    /// Append an exercise; returns the new entry id
    pub fn add_exercise(&mut self, exercise: Exercise) -> Result<u64> {
        self.ensure_open()?;
        let id = self.next_entry_id();
        tracing::debug!("Added entry {} ({})", id, exercise.title);
        self.entries.push(ActiveExerciseEntry::new(id, exercise));
        self.changed();
        Ok(id)
    }

    pub fn remove_exercise(&mut self, entry_id: u64) -> Result<()> {
        self.ensure_open()?;
        let index = self.position(entry_id)?;
        self.entries.remove(index);
        self.changed();
        Ok(())
    }

    /// Remove an entry only if it has no sets and is not a ghost
    ///
    /// Returns whether the entry was removed.
    pub fn remove_exercise_if_empty(&mut self, entry_id: u64) -> Result<bool> {
        self.ensure_open()?;
        let index = self.position(entry_id)?;
        let entry = &self.entries[index];
        if !entry.sets.is_empty() || entry.is_ghost() {
            return Ok(false);
        }
        self.entries.remove(index);
        self.changed();
        Ok(true)
    }

    /// Point an entry at a different exercise, keeping its sets
    pub fn replace_exercise(&mut self, entry_id: u64, exercise: Exercise) -> Result<()> {
        self.ensure_open()?;
        self.entry_mut(entry_id)?.exercise = exercise;
        self.changed();
        Ok(())
    }

    /// Record a set, numbered after the existing ones
    pub fn add_set(&mut self, entry_id: u64, weight_kg: f64, reps: u32) -> Result<WorkoutSet> {
        self.ensure_open()?;
        let set = self.entry_mut(entry_id)?.push_set(weight_kg, reps)?;
        self.changed();
        Ok(set)
    }

    /// Remove the set at zero-based `index`; later sets are renumbered
    pub fn remove_set(&mut self, entry_id: u64, index: usize) -> Result<()> {
        self.ensure_open()?;
        self.entry_mut(entry_id)?.remove_set(index)?;
        self.changed();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------

    fn to_draft(&self) -> WorkoutDraft {
        WorkoutDraft {
            start_time_millis: self.start_time.map(to_millis).unwrap_or_default(),
            elapsed_millis: self.stopwatch.elapsed().as_millis() as i64,
            entry_id_counter: self.entry_id_counter,
            resumed_from_workout_id: self.resumed_from,
            exercises: self.entries.iter().map(DraftExerciseEntry::from).collect(),
        }
    }

    fn cancel_pending_draft(&mut self) {
        if let Some(pending) = self.pending_draft.take() {
            pending.abort();
        }
    }

    /// Replace any pending draft write with a new debounced one
    fn schedule_draft(&mut self) {
        if !self.phase.is_active() {
            return;
        }
        self.cancel_pending_draft();

        let draft = self.to_draft();
        let store = self.drafts.clone();
        let gate = Arc::clone(&self.draft_gate);
        let generation = self.draft_generation;
        let delay = self.config.draft_debounce();
        self.pending_draft = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = write_draft(gate, generation, store, draft).await {
                tracing::warn!("Failed to save workout draft: {}", e);
            }
        }));
    }

    /// Write the draft now instead of waiting for the debounce
    pub async fn flush_draft(&mut self) -> Result<()> {
        self.cancel_pending_draft();
        if !self.phase.is_active() {
            return Ok(());
        }
        write_draft(
            Arc::clone(&self.draft_gate),
            self.draft_generation,
            self.drafts.clone(),
            self.to_draft(),
        )
        .await
    }

    /// Stop background work and open a new draft generation
    fn shut_down(&mut self) -> u64 {
        self.stop_ticker();
        self.cancel_pending_draft();
        self.stopwatch.pause();
        self.draft_generation += 1;
        self.draft_generation
    }

    // ------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------

    /// End the session, saving it if anything was recorded
    ///
    /// Entries without sets are dropped and the rest re-indexed. A resumed
    /// workout is replaced in the same transaction. With no recorded sets at
    /// all this is a silent discard. The draft is cleared once the workout
    /// is stored.
    pub fn finish(&mut self) -> Result<FinishHandle> {
        self.ensure_open()?;
        let generation = self.shut_down();
        let end_time = Utc::now();
        let elapsed = self.stopwatch.elapsed();

        let exercises: Vec<WorkoutExercise> = self
            .entries
            .iter()
            .filter(|entry| !entry.sets.is_empty())
            .enumerate()
            .map(|(index, entry)| WorkoutExercise {
                id: 0,
                workout_id: 0,
                exercise: entry.exercise.clone(),
                order_index: index as u32,
                sets: entry.sets.clone(),
            })
            .collect();

        let workout = if exercises.is_empty() {
            None
        } else {
            Some(Workout {
                id: 0,
                start_time: self.start_time.unwrap_or(end_time),
                end_time: Some(end_time),
                duration_seconds: elapsed.as_secs() as i64,
                notes: String::new(),
                is_finished: true,
                exercises,
            })
        };

        let replaces = self.resumed_from;
        let workouts = self.workouts.clone();
        let store = self.drafts.clone();
        let gate = Arc::clone(&self.draft_gate);

        self.phase = match workout {
            Some(_) => SessionPhase::Finished,
            None => SessionPhase::Discarded,
        };
        self.publish();

        let task = tokio::spawn(async move {
            let outcome = match workout {
                Some(workout) => {
                    let workout_id = tokio::task::spawn_blocking(move || match replaces {
                        Some(old_id) => workouts.replace_workout(old_id, &workout),
                        None => workouts.save_full_workout(&workout),
                    })
                    .await??;
                    FinishOutcome::Saved { workout_id }
                }
                None => {
                    tracing::info!("Finished session with no sets; nothing saved");
                    FinishOutcome::Discarded
                }
            };
            clear_draft(gate, generation, store).await?;
            Ok::<_, Error>(outcome)
        });

        Ok(FinishHandle { task })
    }

    /// Throw the session away and clear the draft
    pub fn discard(&mut self) -> Result<FinishHandle> {
        self.ensure_open()?;
        let generation = self.shut_down();
        self.phase = SessionPhase::Discarded;
        self.entries.clear();
        self.start_time = None;
        self.stopwatch = Stopwatch::default();
        self.publish();
        tracing::info!("Session discarded");

        let store = self.drafts.clone();
        let gate = Arc::clone(&self.draft_gate);
        let task = tokio::spawn(async move {
            clear_draft(gate, generation, store).await?;
            Ok::<_, Error>(FinishOutcome::Discarded)
        });
        Ok(FinishHandle { task })
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_ticker();
        self.cancel_pending_draft();
    }
}
