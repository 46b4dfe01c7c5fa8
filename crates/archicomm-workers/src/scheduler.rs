// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The worker pool scheduler.

use crate::target::{LocalSurface, Placement, QueuedTarget, RenderTarget, TargetSnapshot};
use crate::worker::{ThreadSpawner, WorkerSpawner};
use archicomm_core::error::GovernorError;
use archicomm_core::platform::{Capabilities, Clock};
use archicomm_core::quality::QualityLevel;
use archicomm_core::recommendation::Recommendation;
use archicomm_core::render::{
    FrameReport, FrameRequest, RenderSurface, RenderTargetId, TargetKind,
};
use archicomm_core::worker::{WorkerCommand, WorkerEnvelope, WorkerEvent, WorkerId, WorkerState};
use crossbeam_channel::{Receiver, SendError, Sender};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Configuration of the [`Scheduler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Released workers kept warm for reuse. Beyond this they are terminated.
    pub idle_pool_cap: usize,
    /// How long a worker may take to acknowledge surface initialization.
    pub init_timeout_ms: u64,
    /// How long a terminating worker may take to acknowledge before it is
    /// detached.
    pub termination_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_pool_cap: 10,
            init_timeout_ms: 10_000,
            termination_grace_ms: 100,
        }
    }
}

impl SchedulerConfig {
    /// Initialization acknowledgement timeout.
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// Termination acknowledgement grace period.
    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }
}

/// What [`Scheduler::register`] decided for a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationHandle {
    /// The registered target.
    pub target_id: RenderTargetId,
    /// A worker was bound to the target.
    pub worker_active: bool,
    /// The target waits for a free worker slot.
    pub queued: bool,
}

/// A frame that completed since the last [`Scheduler::pump`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedFrame {
    /// The target the frame belongs to.
    pub target_id: RenderTargetId,
    /// The target's backend kind.
    pub kind: TargetKind,
    /// The frame report.
    pub report: FrameReport,
    /// The resulting fps sample, absent for a target's first frame.
    pub fps: Option<f64>,
    /// When the coordinator observed the completion.
    pub completed_at: Instant,
}

/// Pool occupancy counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Maximum number of bound workers.
    pub capacity: usize,
    /// Workers rendering a target.
    pub active: usize,
    /// Workers waiting for their initialization acknowledgement.
    pub initializing: usize,
    /// Pooled workers.
    pub idle: usize,
    /// Targets waiting for a worker.
    pub queued: usize,
    /// Workers asked to exit that have not acknowledged yet.
    pub terminating: usize,
    /// Workers spawned since creation.
    pub spawned_total: u64,
    /// Worker failures since creation.
    pub failures_total: u64,
}

struct WorkerSlot {
    state: WorkerState,
    commands: Option<Sender<WorkerCommand>>,
    handle: Option<JoinHandle<()>>,
    binding: u64,
    target: Option<RenderTargetId>,
    init_deadline: Option<Instant>,
    terminate_deadline: Option<Instant>,
}

impl WorkerSlot {
    fn new(commands: Sender<WorkerCommand>, handle: JoinHandle<()>) -> Self {
        Self {
            state: WorkerState::Idle,
            commands: Some(commands),
            handle: Some(handle),
            binding: 0,
            target: None,
            init_deadline: None,
            terminate_deadline: None,
        }
    }

    fn transition(&mut self, id: WorkerId, next: WorkerState) {
        if self.state.can_transition_to(next) {
            log::trace!("Scheduler: {id} {:?} -> {:?}", self.state, next);
        } else {
            log::warn!(
                "Scheduler: {id} forced through illegal transition {:?} -> {:?}",
                self.state,
                next
            );
        }
        self.state = next;
    }

    fn send(&self, command: WorkerCommand) -> Result<(), SendError<WorkerCommand>> {
        match &self.commands {
            Some(commands) => commands.send(command),
            None => Err(SendError(command)),
        }
    }
}

/// Assigns render targets to a bounded pool of worker threads.
///
/// Capacity is `max(1, parallelism - 1)` bound workers. Targets beyond that
/// wait in a FIFO queue and render on the coordinating thread meanwhile. A
/// worker is never bound to two targets at once.
pub struct Scheduler {
    config: SchedulerConfig,
    capacity: usize,
    transferable: bool,
    clock: Arc<dyn Clock>,
    spawner: Box<dyn WorkerSpawner>,
    targets: BTreeMap<RenderTargetId, RenderTarget>,
    workers: HashMap<WorkerId, WorkerSlot>,
    idle: VecDeque<WorkerId>,
    queue: VecDeque<QueuedTarget>,
    events_tx: Sender<WorkerEnvelope>,
    events_rx: Receiver<WorkerEnvelope>,
    next_worker: u64,
    next_binding: u64,
    quality: QualityLevel,
    incidents: Vec<Recommendation>,
    completed: Vec<CompletedFrame>,
    spawned_total: u64,
    failures_total: u64,
    shut_down: bool,
}

impl Scheduler {
    /// Creates a scheduler spawning real worker threads.
    pub fn new(config: SchedulerConfig, capabilities: Capabilities, clock: Arc<dyn Clock>) -> Self {
        Self::with_spawner(config, capabilities, clock, Box::new(ThreadSpawner))
    }

    /// Creates a scheduler with a custom worker spawner.
    pub fn with_spawner(
        config: SchedulerConfig,
        capabilities: Capabilities,
        clock: Arc<dyn Clock>,
        spawner: Box<dyn WorkerSpawner>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let capacity = capabilities.worker_capacity();
        log::info!(
            "Scheduler: capacity={} workers, transferable surfaces={}",
            capacity,
            capabilities.transferable_surfaces
        );
        Self {
            config,
            capacity,
            transferable: capabilities.transferable_surfaces,
            clock,
            spawner,
            targets: BTreeMap::new(),
            workers: HashMap::new(),
            idle: VecDeque::new(),
            queue: VecDeque::new(),
            events_tx,
            events_rx,
            next_worker: 1,
            next_binding: 1,
            quality: QualityLevel::default(),
            incidents: Vec::new(),
            completed: Vec::new(),
            spawned_total: 0,
            failures_total: 0,
            shut_down: false,
        }
    }

    /// Maximum number of bound workers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Registers a target, binding a worker when one is available.
    ///
    /// Re-registering an existing id replaces the previous registration.
    pub fn register(
        &mut self,
        target_id: RenderTargetId,
        surface: Box<dyn RenderSurface>,
        kind: TargetKind,
    ) -> RegistrationHandle {
        if self.targets.contains_key(&target_id) {
            log::debug!("Scheduler: re-registering '{target_id}'.");
            self.unregister(&target_id);
        }
        self.targets
            .insert(target_id.clone(), RenderTarget::new(target_id.clone(), kind));

        if !self.transferable || self.shut_down {
            self.place_on_coordinator(&target_id, surface);
        } else if self.busy_count() < self.capacity {
            self.assign(&target_id, surface);
        } else {
            log::info!(
                "Scheduler: pool saturated ({} workers), queueing '{target_id}' at position {}.",
                self.capacity,
                self.queue.len() + 1
            );
            self.queue.push_back(QueuedTarget {
                target_id: target_id.clone(),
                local: LocalSurface::new(surface),
            });
            self.set_placement(&target_id, Placement::Queued);
        }

        let target = self.targets.get(&target_id);
        RegistrationHandle {
            worker_active: target.is_some_and(RenderTarget::worker_active),
            queued: target.is_some_and(RenderTarget::queued),
            target_id,
        }
    }

    /// Removes a target. Unknown ids are ignored.
    pub fn unregister(&mut self, target_id: &RenderTargetId) {
        let Some(mut target) = self.targets.remove(target_id) else {
            log::trace!("Scheduler: unregister of unknown target '{target_id}' ignored.");
            return;
        };
        match target.placement {
            Placement::Worker(worker) => self.release_worker(worker),
            Placement::Queued => {
                if let Some(position) = self.queue.iter().position(|q| &q.target_id == target_id) {
                    if let Some(entry) = self.queue.remove(position) {
                        entry.local.close();
                    }
                }
            }
            Placement::Coordinator | Placement::Lost => {}
        }
        if let Some(local) = target.local.take() {
            local.close();
        }
        log::info!("Scheduler: unregistered '{target_id}'.");
        self.process_queue();
    }

    /// Draws one frame of a target, on its worker or on the calling thread.
    ///
    /// Frames rendered on the calling thread complete immediately and are
    /// returned by the next [`pump`](Self::pump).
    pub fn render(&mut self, target_id: &RenderTargetId, request: FrameRequest) {
        let quality = self.quality;
        let Some(target) = self.targets.get_mut(target_id) else {
            log::trace!("Scheduler: render for unknown target '{target_id}' ignored.");
            return;
        };

        let started = Instant::now();
        let outcome = match target.placement {
            Placement::Worker(worker) => {
                let sent = self
                    .workers
                    .get(&worker)
                    .map(|slot| slot.send(WorkerCommand::Render(request)).is_ok())
                    .unwrap_or(false);
                if !sent {
                    self.handle_failure(worker, "command channel closed");
                }
                return;
            }
            Placement::Queued => self
                .queue
                .iter_mut()
                .find(|q| &q.target_id == target_id)
                .map(|q| q.local.render(&request, quality)),
            Placement::Coordinator => target
                .local
                .as_mut()
                .map(|local| local.render(&request, quality)),
            Placement::Lost => None,
        };

        match outcome {
            Some(Ok(output)) => {
                let report = FrameReport::from_output(request.frame_id, started.elapsed(), output);
                self.complete_frame(target_id, report);
            }
            Some(Err(message)) => {
                log::warn!("Scheduler: '{target_id}' failed on the coordinating thread: {message}");
                self.incidents.push(Recommendation::warning(
                    "Render target failed on the main thread",
                    "Check the surface and re-register the target",
                    format!("{target_id}: {message}"),
                ));
            }
            None => log::debug!("Scheduler: '{target_id}' has no surface, frame dropped."),
        }
    }

    /// Records a frame completed outside the scheduler.
    pub fn report_frame(&mut self, target_id: &RenderTargetId, report: FrameReport) {
        if self.targets.contains_key(target_id) {
            self.complete_frame(target_id, report);
        } else {
            log::trace!("Scheduler: frame report for unknown target '{target_id}' ignored.");
        }
    }

    /// Drains worker events without blocking and enforces deadlines.
    ///
    /// Returns every frame completed since the previous call.
    pub fn pump(&mut self, now: Instant) -> Vec<CompletedFrame> {
        while let Ok(envelope) = self.events_rx.try_recv() {
            self.handle_event(envelope);
        }
        self.enforce_deadlines(now);
        std::mem::take(&mut self.completed)
    }

    /// Sends a new quality level to every bound worker.
    pub fn broadcast_quality(&mut self, level: QualityLevel) {
        self.quality = level;
        let bound: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, slot)| slot.state.is_bound())
            .map(|(id, _)| *id)
            .collect();
        for worker in bound {
            let sent = self
                .workers
                .get(&worker)
                .map(|slot| slot.send(WorkerCommand::SetQuality(level)).is_ok())
                .unwrap_or(false);
            if !sent {
                self.handle_failure(worker, "command channel closed");
            }
        }
    }

    /// The quality level surfaces currently render at.
    pub fn quality(&self) -> QualityLevel {
        self.quality
    }

    /// A registered target.
    pub fn target(&self, target_id: &RenderTargetId) -> Option<&RenderTarget> {
        self.targets.get(target_id)
    }

    /// Every registered target, ordered by id.
    pub fn targets(&self) -> impl Iterator<Item = &RenderTarget> {
        self.targets.values()
    }

    /// Snapshots of every registered target, ordered by id.
    pub fn snapshots(&self) -> Vec<TargetSnapshot> {
        self.targets.values().map(RenderTarget::snapshot).collect()
    }

    /// Queued target ids, first to be admitted first.
    pub fn queue_order(&self) -> Vec<RenderTargetId> {
        self.queue.iter().map(|q| q.target_id.clone()).collect()
    }

    /// Number of workers currently rendering.
    pub fn active_workers(&self) -> usize {
        self.count_state(WorkerState::Active)
    }

    /// Number of live workers (bound or idle).
    pub fn worker_count(&self) -> usize {
        self.workers
            .values()
            .filter(|slot| slot.state != WorkerState::Terminated)
            .count()
    }

    /// Pool occupancy counters.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            capacity: self.capacity,
            active: self.count_state(WorkerState::Active),
            initializing: self.count_state(WorkerState::Initializing),
            idle: self.count_state(WorkerState::Idle),
            queued: self.queue.len(),
            terminating: self.count_state(WorkerState::Terminated),
            spawned_total: self.spawned_total,
            failures_total: self.failures_total,
        }
    }

    /// Takes the recommendations raised by worker incidents.
    pub fn take_incidents(&mut self) -> Vec<Recommendation> {
        std::mem::take(&mut self.incidents)
    }

    /// Terminates every worker and drops queued targets unprocessed.
    ///
    /// Waits at most one termination grace period for acknowledgements.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let dropped = self.queue.len();
        for entry in self.queue.drain(..) {
            entry.local.close();
        }
        for (_, mut target) in std::mem::take(&mut self.targets) {
            if let Some(local) = target.local.take() {
                local.close();
            }
        }
        self.idle.clear();

        let live: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, slot)| slot.state != WorkerState::Terminated)
            .map(|(id, _)| *id)
            .collect();
        for worker in live {
            self.terminate_worker(worker);
        }

        let deadline = Instant::now() + self.config.termination_grace();
        while !self.workers.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.events_rx.recv_timeout(remaining) {
                Ok(WorkerEnvelope {
                    worker,
                    event: WorkerEvent::Terminated,
                    ..
                }) => self.on_terminated(worker),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        let detached = self.workers.len();
        self.workers.clear();
        self.completed.clear();

        log::info!(
            "Scheduler: shut down ({dropped} queued targets dropped, {detached} workers detached)."
        );
    }

    fn busy_count(&self) -> usize {
        self.workers
            .values()
            .filter(|slot| slot.state.is_bound())
            .count()
    }

    fn count_state(&self, state: WorkerState) -> usize {
        self.workers
            .values()
            .filter(|slot| slot.state == state)
            .count()
    }

    fn set_placement(&mut self, target_id: &RenderTargetId, placement: Placement) {
        if let Some(target) = self.targets.get_mut(target_id) {
            target.placement = placement;
        }
    }

    fn place_on_coordinator(&mut self, target_id: &RenderTargetId, surface: Box<dyn RenderSurface>) {
        if let Some(target) = self.targets.get_mut(target_id) {
            target.placement = Placement::Coordinator;
            target.local = Some(LocalSurface::new(surface));
            log::debug!("Scheduler: '{target_id}' renders on the coordinating thread.");
        }
    }

    /// Binds a target to a reused or freshly spawned worker, falling back to
    /// the coordinator when no worker can be obtained.
    fn assign(&mut self, target_id: &RenderTargetId, surface: Box<dyn RenderSurface>) {
        let worker = match self.acquire_worker() {
            Ok(worker) => worker,
            Err(error) => {
                log::error!("Scheduler: {error}; '{target_id}' falls back to the coordinating thread.");
                let kind = self
                    .targets
                    .get(target_id)
                    .map_or("unknown", |t| t.kind.name());
                self.incidents.push(Recommendation::critical(
                    "Render worker could not be started",
                    "The target renders on the main thread; re-register it once resources are available",
                    format!("{target_id} ({kind}): {error}"),
                ));
                self.place_on_coordinator(target_id, surface);
                return;
            }
        };

        if let Err(returned) = self.bind(worker, target_id, surface) {
            self.incidents.push(Recommendation::warning(
                "Render worker became unreachable during binding",
                "The target renders on the main thread; re-register it to retry",
                format!("{target_id}: {}", GovernorError::WorkerDisconnected(worker)),
            ));
            match returned {
                Some(surface) => self.place_on_coordinator(target_id, surface),
                None => self.set_placement(target_id, Placement::Lost),
            }
        }
    }

    fn acquire_worker(&mut self) -> Result<WorkerId, GovernorError> {
        while let Some(worker) = self.idle.pop_front() {
            if self
                .workers
                .get(&worker)
                .is_some_and(|slot| slot.state == WorkerState::Idle)
            {
                log::debug!("Scheduler: reusing idle {worker}.");
                return Ok(worker);
            }
        }

        let worker = WorkerId::new(self.next_worker);
        self.next_worker += 1;
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let handle = self
            .spawner
            .spawn(worker, commands_rx, self.events_tx.clone())?;
        self.spawned_total += 1;
        self.workers.insert(worker, WorkerSlot::new(commands_tx, handle));
        log::info!("Scheduler: spawned {worker}.");
        Ok(worker)
    }

    /// Moves `surface` to `worker`. Hands the surface back if the worker is
    /// unreachable.
    fn bind(
        &mut self,
        worker: WorkerId,
        target_id: &RenderTargetId,
        surface: Box<dyn RenderSurface>,
    ) -> Result<(), Option<Box<dyn RenderSurface>>> {
        let binding = self.next_binding;
        self.next_binding += 1;
        let deadline = self.clock.now() + self.config.init_timeout();
        let quality = self.quality;

        let Some(slot) = self.workers.get_mut(&worker) else {
            return Err(Some(surface));
        };
        let command = WorkerCommand::Init {
            binding,
            surface,
            quality,
        };
        match slot.send(command) {
            Ok(()) => {
                slot.transition(worker, WorkerState::Initializing);
                slot.binding = binding;
                slot.target = Some(target_id.clone());
                slot.init_deadline = Some(deadline);
                self.set_placement(target_id, Placement::Worker(worker));
                log::info!("Scheduler: bound '{target_id}' to {worker} (binding {binding}).");
                Ok(())
            }
            Err(SendError(command)) => {
                log::error!("Scheduler: {worker} is unreachable, discarding it.");
                self.failures_total += 1;
                self.terminate_worker(worker);
                Err(command.into_surface())
            }
        }
    }

    /// Unbinds a worker after its target was unregistered.
    fn release_worker(&mut self, worker: WorkerId) {
        let Some(slot) = self.workers.get_mut(&worker) else {
            return;
        };
        slot.target = None;
        slot.binding = 0;
        slot.init_deadline = None;
        if slot.send(WorkerCommand::Release).is_err() {
            self.terminate_worker(worker);
            return;
        }
        slot.transition(worker, WorkerState::Idle);

        if self.idle.len() < self.config.idle_pool_cap {
            self.idle.push_back(worker);
            log::debug!("Scheduler: {worker} returned to the idle pool.");
        } else {
            log::debug!("Scheduler: idle pool full, terminating {worker}.");
            self.terminate_worker(worker);
        }
    }

    /// Asks a worker to exit and starts its grace period.
    fn terminate_worker(&mut self, worker: WorkerId) {
        let deadline = self.clock.now() + self.config.termination_grace();
        let Some(slot) = self.workers.get_mut(&worker) else {
            return;
        };
        if slot.state == WorkerState::Terminated {
            return;
        }
        let _ = slot.send(WorkerCommand::Terminate);
        // The worker still drains the Terminate already queued.
        slot.commands = None;
        slot.target = None;
        slot.binding = 0;
        slot.init_deadline = None;
        slot.terminate_deadline = Some(deadline);
        slot.transition(worker, WorkerState::Terminated);
        self.idle.retain(|id| *id != worker);
    }

    /// Fails a bound worker: terminate it, strand its target, admit the queue.
    fn handle_failure(&mut self, worker: WorkerId, reason: &str) {
        let Some(slot) = self.workers.get_mut(&worker) else {
            return;
        };
        if slot.state == WorkerState::Terminated {
            return;
        }
        self.failures_total += 1;
        let target = slot.target.take();
        slot.transition(worker, WorkerState::Failed);
        log::warn!("Scheduler: {worker} failed: {reason}");
        self.terminate_worker(worker);

        if let Some(target_id) = target {
            self.set_placement(&target_id, Placement::Lost);
            self.incidents.push(Recommendation::warning(
                "Render worker failed",
                "Re-register the target to retry on a fresh worker",
                format!("{target_id}: {reason}"),
            ));
        }
        self.process_queue();
    }

    /// Admits queued targets in FIFO order while slots are free.
    fn process_queue(&mut self) {
        if self.shut_down {
            return;
        }
        while self.busy_count() < self.capacity {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            if !self.targets.contains_key(&entry.target_id) {
                entry.local.close();
                continue;
            }
            log::info!("Scheduler: admitting '{}' from the queue.", entry.target_id);
            let target_id = entry.target_id.clone();
            self.assign(&target_id, entry.local.into_surface());
        }
    }

    fn complete_frame(&mut self, target_id: &RenderTargetId, report: FrameReport) {
        let completed_at = self.clock.now();
        let Some(target) = self.targets.get_mut(target_id) else {
            return;
        };
        let fps = target.record_frame(&report, completed_at);
        self.completed.push(CompletedFrame {
            target_id: target_id.clone(),
            kind: target.kind,
            report,
            fps,
            completed_at,
        });
    }

    fn handle_event(&mut self, envelope: WorkerEnvelope) {
        let WorkerEnvelope {
            worker,
            binding,
            event,
        } = envelope;
        let Some(slot) = self.workers.get(&worker) else {
            log::trace!("Scheduler: event from retired {worker} ignored.");
            return;
        };
        let current = binding != 0 && binding == slot.binding;

        match event {
            WorkerEvent::Terminated => self.on_terminated(worker),
            WorkerEvent::Released => log::debug!("Scheduler: {worker} released its surface."),
            _ if !current => {
                log::trace!("Scheduler: stale event from {worker} (binding {binding}) ignored.");
            }
            WorkerEvent::Ready => {
                if slot.state == WorkerState::Initializing {
                    if let Some(slot) = self.workers.get_mut(&worker) {
                        slot.transition(worker, WorkerState::Active);
                        slot.init_deadline = None;
                    }
                    log::debug!("Scheduler: {worker} is active.");
                } else {
                    self.handle_failure(worker, "unexpected ready acknowledgement");
                }
            }
            WorkerEvent::RenderComplete(report) => {
                if slot.state == WorkerState::Active {
                    if let Some(target_id) = slot.target.clone() {
                        self.complete_frame(&target_id, report);
                    }
                } else {
                    self.handle_failure(worker, "frame completed before initialization");
                }
            }
            WorkerEvent::Error(message) => self.handle_failure(worker, &message),
        }
    }

    fn on_terminated(&mut self, worker: WorkerId) {
        let Some(slot) = self.workers.remove(&worker) else {
            return;
        };
        self.idle.retain(|id| *id != worker);
        if slot.state != WorkerState::Terminated {
            // Exited on its own while still counted as live.
            log::warn!("Scheduler: {worker} exited unexpectedly.");
            if let Some(target_id) = slot.target {
                self.failures_total += 1;
                self.set_placement(&target_id, Placement::Lost);
                self.incidents.push(Recommendation::warning(
                    "Render worker failed",
                    "Re-register the target to retry on a fresh worker",
                    format!("{target_id}: worker exited"),
                ));
                self.process_queue();
            }
        }
        if let Some(handle) = slot.handle {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
        log::debug!("Scheduler: {worker} terminated.");
    }

    fn enforce_deadlines(&mut self, now: Instant) {
        let timed_out: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, slot)| {
                slot.state == WorkerState::Initializing
                    && slot.init_deadline.is_some_and(|deadline| now >= deadline)
            })
            .map(|(id, _)| *id)
            .collect();
        for worker in timed_out {
            self.handle_failure(worker, "initialization timed out");
        }

        let overdue: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, slot)| {
                slot.state == WorkerState::Terminated
                    && slot.terminate_deadline.is_some_and(|deadline| now >= deadline)
            })
            .map(|(id, _)| *id)
            .collect();
        for worker in overdue {
            // Dropping the handle detaches the thread; its channels are gone.
            self.workers.remove(&worker);
            log::warn!("Scheduler: {worker} did not acknowledge termination, detached.");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("stats", &self.stats())
            .field("targets", &self.targets.len())
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}
