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

use archicomm_core::error::{GovernorError, GovernorResult, SurfaceError};
use archicomm_core::platform::{Capabilities, Clock, ManualClock, SystemClock};
use archicomm_core::quality::QualityLevel;
use archicomm_core::recommendation::Severity;
use archicomm_core::render::{FrameOutput, FrameRequest, RenderSurface, RenderTargetId, TargetKind};
use archicomm_core::worker::{WorkerCommand, WorkerEnvelope, WorkerId};
use archicomm_workers::{Placement, Scheduler, SchedulerConfig, WorkerSpawner};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// --- Test surfaces and spawners ---

struct TestSurface {
    fail_on_frame: Option<u64>,
    released: Arc<AtomicUsize>,
}

impl TestSurface {
    fn boxed() -> Box<dyn RenderSurface> {
        Box::new(Self {
            fail_on_frame: None,
            released: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn failing_on(frame: u64) -> Box<dyn RenderSurface> {
        Box::new(Self {
            fail_on_frame: Some(frame),
            released: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl RenderSurface for TestSurface {
    fn render(
        &mut self,
        request: &FrameRequest,
        _quality: QualityLevel,
    ) -> Result<FrameOutput, SurfaceError> {
        if self.fail_on_frame == Some(request.frame_id) {
            return Err(SurfaceError::ContextLost);
        }
        Ok(FrameOutput {
            memory_mb: 5.0,
            complexity: request.complexity,
        })
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

struct RefusingSpawner;

impl WorkerSpawner for RefusingSpawner {
    fn spawn(
        &self,
        id: WorkerId,
        _commands: Receiver<WorkerCommand>,
        _events: Sender<WorkerEnvelope>,
    ) -> GovernorResult<JoinHandle<()>> {
        Err(GovernorError::WorkerSpawn {
            worker: id,
            source: std::io::Error::new(std::io::ErrorKind::Other, "thread limit reached"),
        })
    }
}

/// Starts workers that swallow every command without answering.
struct SilentSpawner;

impl WorkerSpawner for SilentSpawner {
    fn spawn(
        &self,
        _id: WorkerId,
        commands: Receiver<WorkerCommand>,
        events: Sender<WorkerEnvelope>,
    ) -> GovernorResult<JoinHandle<()>> {
        Ok(thread::spawn(move || {
            let _events = events;
            while commands.recv().is_ok() {}
        }))
    }
}

/// Starts workers whose command channel is already closed.
struct DeafSpawner;

impl WorkerSpawner for DeafSpawner {
    fn spawn(
        &self,
        _id: WorkerId,
        commands: Receiver<WorkerCommand>,
        events: Sender<WorkerEnvelope>,
    ) -> GovernorResult<JoinHandle<()>> {
        drop(commands);
        Ok(thread::spawn(move || {
            let _events = events;
        }))
    }
}

fn scheduler(parallelism: usize) -> Scheduler {
    Scheduler::new(
        SchedulerConfig::default(),
        Capabilities::new(parallelism, true),
        Arc::new(SystemClock),
    )
}

fn id(name: &str) -> RenderTargetId {
    RenderTargetId::from(name)
}

/// Pumps until `done` holds, with a bounded number of attempts.
fn pump_until(scheduler: &mut Scheduler, mut done: impl FnMut(&Scheduler) -> bool) -> bool {
    for _ in 0..400 {
        scheduler.pump(Instant::now());
        if done(scheduler) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

// --- Capacity and queueing ---

#[test]
fn test_five_targets_on_four_cores() {
    let mut s = scheduler(4);
    assert_eq!(s.capacity(), 3);

    let handles: Vec<_> = (0..5)
        .map(|i| s.register(id(&format!("t{i}")), TestSurface::boxed(), TargetKind::Canvas2d))
        .collect();
    assert_eq!(handles.iter().filter(|h| h.worker_active).count(), 3);
    assert_eq!(handles.iter().filter(|h| h.queued).count(), 2);
    assert!(pump_until(&mut s, |s| s.stats().active == 3));
    assert_eq!(s.stats().queued, 2);

    s.unregister(&id("t0"));
    assert_eq!(s.stats().queued, 1);
    assert!(s.target(&id("t3")).unwrap().worker_active());
    assert!(pump_until(&mut s, |s| s.stats().active == 3));
    assert!(s.worker_count() <= 3);
}

#[test]
fn test_worker_count_never_exceeds_capacity() {
    let mut s = scheduler(3);
    let capacity = s.capacity();
    for round in 0..4 {
        for i in 0..5 {
            s.register(id(&format!("t{i}")), TestSurface::boxed(), TargetKind::Svg);
            assert!(s.worker_count() <= capacity);
        }
        for i in (0..5).filter(|i| (i + round) % 2 == 0) {
            s.unregister(&id(&format!("t{i}")));
            assert!(s.worker_count() <= capacity);
        }
        s.pump(Instant::now());
        assert!(s.worker_count() <= capacity);
    }
}

#[test]
fn test_queue_admits_in_fifo_order() {
    let mut s = scheduler(2);
    s.register(id("busy"), TestSurface::boxed(), TargetKind::WebGl);
    for name in ["a", "b", "c"] {
        assert!(s.register(id(name), TestSurface::boxed(), TargetKind::WebGl).queued);
    }
    assert_eq!(s.queue_order(), vec![id("a"), id("b"), id("c")]);

    s.unregister(&id("busy"));
    assert!(s.target(&id("a")).unwrap().worker_active());
    assert_eq!(s.queue_order(), vec![id("b"), id("c")]);
}

#[test]
fn test_released_worker_is_reused() {
    let mut s = scheduler(2);
    s.register(id("first"), TestSurface::boxed(), TargetKind::Canvas2d);
    assert!(pump_until(&mut s, |s| s.stats().active == 1));
    s.unregister(&id("first"));
    assert_eq!(s.stats().idle, 1);

    s.register(id("second"), TestSurface::boxed(), TargetKind::Canvas2d);
    assert_eq!(s.stats().spawned_total, 1);
    assert!(pump_until(&mut s, |s| s.stats().active == 1));
}

#[test]
fn test_unregister_unknown_is_noop() {
    let mut s = scheduler(4);
    s.unregister(&id("ghost"));
    s.pump(Instant::now());
    assert!(s.take_incidents().is_empty());
    assert_eq!(s.stats().spawned_total, 0);
}

#[test]
fn test_reregister_replaces_previous_binding() {
    let mut s = scheduler(2);
    s.register(id("main"), TestSurface::boxed(), TargetKind::Canvas2d);
    let handle = s.register(id("main"), TestSurface::boxed(), TargetKind::Svg);
    assert!(handle.worker_active);
    assert_eq!(s.targets().count(), 1);
    assert_eq!(s.target(&id("main")).unwrap().kind(), TargetKind::Svg);
    assert!(s.worker_count() <= s.capacity());
}

// --- Rendering ---

#[test]
fn test_worker_frames_update_metrics() {
    let mut s = scheduler(2);
    s.register(id("canvas"), TestSurface::boxed(), TargetKind::Canvas2d);
    for frame in 0..3 {
        s.render(&id("canvas"), FrameRequest::new(frame, 42));
    }
    assert!(pump_until(&mut s, |s| {
        s.target(&id("canvas")).unwrap().metrics().frames_completed == 3
    }));
    let metrics = *s.target(&id("canvas")).unwrap().metrics();
    assert_eq!(metrics.complexity, 42);
    assert_eq!(metrics.memory_mb, 5.0);
}

#[test]
fn test_without_transferable_surfaces_everything_renders_locally() {
    let mut s = Scheduler::new(
        SchedulerConfig::default(),
        Capabilities::new(8, false),
        Arc::new(SystemClock),
    );
    for i in 0..10 {
        let handle = s.register(id(&format!("t{i}")), TestSurface::boxed(), TargetKind::Svg);
        assert!(!handle.worker_active);
        assert!(!handle.queued);
    }
    s.render(&id("t0"), FrameRequest::new(1, 7));
    let frames = s.pump(Instant::now());
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].report.complexity, 7);
    assert_eq!(s.stats().spawned_total, 0);
    assert!(s.take_incidents().is_empty());
}

#[test]
fn test_queued_target_renders_on_coordinator() {
    let mut s = scheduler(2);
    s.register(id("bound"), TestSurface::boxed(), TargetKind::Canvas2d);
    s.register(id("waiting"), TestSurface::boxed(), TargetKind::Canvas2d);
    assert_eq!(s.target(&id("waiting")).unwrap().placement(), Placement::Queued);

    s.render(&id("waiting"), FrameRequest::new(1, 3));
    let frames = s.pump(Instant::now());
    assert!(frames.iter().any(|f| f.target_id == id("waiting")));
}

#[test]
fn test_report_frame_for_external_targets() {
    let mut s = scheduler(2);
    s.register(id("ext"), TestSurface::boxed(), TargetKind::WebGl);
    s.report_frame(
        &id("ext"),
        archicomm_core::render::FrameReport {
            frame_id: 1,
            render_time: Duration::from_millis(12),
            memory_mb: 80.0,
            complexity: 900,
        },
    );
    s.report_frame(&id("unknown"), Default::default());
    let metrics = *s.target(&id("ext")).unwrap().metrics();
    assert_eq!(metrics.frames_completed, 1);
    assert!((metrics.render_time_ms - 12.0).abs() < 1e-9);
}

// --- Failures ---

#[test]
fn test_spawn_failure_falls_back_to_coordinator() {
    let mut s = Scheduler::with_spawner(
        SchedulerConfig::default(),
        Capabilities::new(4, true),
        Arc::new(SystemClock),
        Box::new(RefusingSpawner),
    );
    let handle = s.register(id("canvas"), TestSurface::boxed(), TargetKind::Canvas2d);
    assert!(!handle.worker_active);
    assert_eq!(s.target(&id("canvas")).unwrap().placement(), Placement::Coordinator);

    let incidents = s.take_incidents();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].severity, Severity::Critical);

    s.render(&id("canvas"), FrameRequest::new(1, 1));
    assert_eq!(s.pump(Instant::now()).len(), 1);
}

#[test]
fn test_unreachable_worker_hands_surface_back_to_coordinator() {
    let mut s = Scheduler::with_spawner(
        SchedulerConfig::default(),
        Capabilities::new(4, true),
        Arc::new(SystemClock),
        Box::new(DeafSpawner),
    );
    let handle = s.register(id("canvas"), TestSurface::boxed(), TargetKind::Canvas2d);
    assert!(!handle.worker_active);
    assert_eq!(s.target(&id("canvas")).unwrap().placement(), Placement::Coordinator);
    assert_eq!(s.stats().failures_total, 1);

    let incidents = s.take_incidents();
    assert!(incidents
        .iter()
        .any(|r| r.message == "Render worker became unreachable during binding"));

    s.render(&id("canvas"), FrameRequest::new(1, 1));
    assert_eq!(s.pump(Instant::now()).len(), 1);
}

#[test]
fn test_runtime_failure_frees_slot_for_queue() {
    let mut s = scheduler(2);
    s.register(id("fragile"), TestSurface::failing_on(2), TargetKind::Canvas2d);
    s.register(id("next"), TestSurface::boxed(), TargetKind::Canvas2d);
    assert_eq!(s.queue_order(), vec![id("next")]);

    s.render(&id("fragile"), FrameRequest::new(2, 1));
    assert!(pump_until(&mut s, |s| s.stats().failures_total == 1));

    let fragile = s.target(&id("fragile")).unwrap();
    assert!(!fragile.worker_active());
    assert_eq!(fragile.placement(), Placement::Lost);
    assert!(s.target(&id("next")).unwrap().worker_active());

    let incidents = s.take_incidents();
    assert!(incidents
        .iter()
        .any(|r| r.severity == Severity::Warning && r.impact.contains("fragile")));
}

#[test]
fn test_init_timeout_is_a_failure() {
    let clock = Arc::new(ManualClock::new());
    let mut s = Scheduler::with_spawner(
        SchedulerConfig::default(),
        Capabilities::new(2, true),
        clock.clone(),
        Box::new(SilentSpawner),
    );
    s.register(id("slow"), TestSurface::boxed(), TargetKind::WebGl);
    s.pump(clock.now());
    assert_eq!(s.stats().initializing, 1);

    clock.advance(Duration::from_secs(10));
    s.pump(clock.now());
    assert_eq!(s.stats().failures_total, 1);
    assert_eq!(s.stats().terminating, 1);
    assert_eq!(s.target(&id("slow")).unwrap().placement(), Placement::Lost);

    // The silent worker never acknowledges termination.
    clock.advance(Duration::from_millis(100));
    s.pump(clock.now());
    assert_eq!(s.stats().terminating, 0);
}

#[test]
fn test_shutdown_drops_queue_and_workers() {
    let mut s = scheduler(2);
    s.register(id("a"), TestSurface::boxed(), TargetKind::Svg);
    s.register(id("b"), TestSurface::boxed(), TargetKind::Svg);
    s.shutdown();
    assert_eq!(s.stats().queued, 0);
    assert_eq!(s.worker_count(), 0);
    assert_eq!(s.targets().count(), 0);

    // Registration after shutdown never spawns.
    let handle = s.register(id("late"), TestSurface::boxed(), TargetKind::Svg);
    assert!(!handle.worker_active);
}

#[test]
fn test_snapshots_serialize_for_reporting() {
    let mut s = Scheduler::new(
        SchedulerConfig::default(),
        Capabilities::new(2, false),
        Arc::new(SystemClock),
    );
    s.register(id("minimap"), TestSurface::boxed(), TargetKind::WebGl);
    s.render(&id("minimap"), FrameRequest::new(1, 40));
    s.pump(Instant::now());

    let json = serde_json::to_string(&s.snapshots()).unwrap();
    assert!(json.contains("\"minimap\""));
    let stats: archicomm_workers::SchedulerStats =
        serde_json::from_str(&serde_json::to_string(&s.stats()).unwrap()).unwrap();
    assert_eq!(stats, s.stats());
}
