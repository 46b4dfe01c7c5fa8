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

//! The render worker thread and the spawning seam.

use archicomm_core::error::{GovernorError, GovernorResult, SurfaceError};
use archicomm_core::listener::panic_message;
use archicomm_core::quality::QualityLevel;
use archicomm_core::render::{FrameReport, RenderSurface};
use archicomm_core::worker::{WorkerCommand, WorkerEnvelope, WorkerEvent, WorkerId};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Creates worker threads.
///
/// The default [`ThreadSpawner`] starts a real OS thread running
/// [`run_worker`]. Alternative spawners let embedders (and tests) control
/// where workers run or simulate a platform that refuses to spawn.
pub trait WorkerSpawner: Send {
    /// Starts a worker consuming `commands` and reporting on `events`.
    fn spawn(
        &self,
        id: WorkerId,
        commands: Receiver<WorkerCommand>,
        events: Sender<WorkerEnvelope>,
    ) -> GovernorResult<JoinHandle<()>>;
}

/// Spawns each worker on a named OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl WorkerSpawner for ThreadSpawner {
    fn spawn(
        &self,
        id: WorkerId,
        commands: Receiver<WorkerCommand>,
        events: Sender<WorkerEnvelope>,
    ) -> GovernorResult<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("render-worker-{}", id.raw()))
            .spawn(move || run_worker(id, commands, events))
            .map_err(|source| GovernorError::WorkerSpawn { worker: id, source })
    }
}

struct Binding {
    generation: u64,
    surface: Box<dyn RenderSurface>,
    quality: QualityLevel,
}

/// The body of a render worker.
///
/// Processes commands until told to terminate or until either channel is
/// disconnected. Surface failures and panics are reported as
/// [`WorkerEvent::Error`]; they never take the thread down.
pub fn run_worker(id: WorkerId, commands: Receiver<WorkerCommand>, events: Sender<WorkerEnvelope>) {
    let send = |binding: u64, event: WorkerEvent| {
        events
            .send(WorkerEnvelope {
                worker: id,
                binding,
                event,
            })
            .is_ok()
    };

    let mut bound: Option<Binding> = None;
    log::debug!("Scheduler: {id} started.");

    while let Ok(command) = commands.recv() {
        let delivered = match command {
            WorkerCommand::Init {
                binding,
                surface,
                quality,
            } => {
                if let Some(previous) = bound.take() {
                    release_surface(previous.surface);
                }
                let mut next = Binding {
                    generation: binding,
                    surface,
                    quality,
                };
                match guarded(|| next.surface.initialize()) {
                    Ok(()) => {
                        bound = Some(next);
                        send(binding, WorkerEvent::Ready)
                    }
                    Err(message) => send(binding, WorkerEvent::Error(message)),
                }
            }
            WorkerCommand::Render(request) => match bound.as_mut() {
                Some(current) => {
                    let started = Instant::now();
                    let quality = current.quality;
                    let outcome = guarded(|| current.surface.render(&request, quality));
                    let event = match outcome {
                        Ok(output) => WorkerEvent::RenderComplete(FrameReport::from_output(
                            request.frame_id,
                            started.elapsed(),
                            output,
                        )),
                        Err(message) => WorkerEvent::Error(message),
                    };
                    send(current.generation, event)
                }
                None => {
                    log::trace!("Scheduler: {id} dropped frame {} (unbound).", request.frame_id);
                    true
                }
            },
            WorkerCommand::SetQuality(level) => {
                if let Some(current) = bound.as_mut() {
                    current.quality = level;
                }
                true
            }
            WorkerCommand::Release => {
                let generation = bound.as_ref().map_or(0, |b| b.generation);
                if let Some(previous) = bound.take() {
                    release_surface(previous.surface);
                }
                send(generation, WorkerEvent::Released)
            }
            WorkerCommand::Terminate => {
                if let Some(previous) = bound.take() {
                    release_surface(previous.surface);
                }
                send(0, WorkerEvent::Terminated);
                break;
            }
        };

        if !delivered {
            log::debug!("Scheduler: {id} lost its coordinator, exiting.");
            break;
        }
    }

    if let Some(previous) = bound.take() {
        release_surface(previous.surface);
    }
    log::debug!("Scheduler: {id} stopped.");
}

/// Runs a surface call, turning errors and panics into a message.
pub(crate) fn guarded<T>(call: impl FnOnce() -> Result<T, SurfaceError>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(error.to_string()),
        Err(payload) => Err(format!("surface panicked: {}", panic_message(payload.as_ref()))),
    }
}

pub(crate) fn release_surface(mut surface: Box<dyn RenderSurface>) {
    if let Err(message) = guarded(|| {
        surface.release();
        Ok(())
    }) {
        log::warn!("Scheduler: surface release failed: {message}");
    }
}
