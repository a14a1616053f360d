// core/frame_loop.rs
//
// Drives a scene at the configured frame rate on the calling thread. Layer
// steps go to the worker pool; everything else stays here.

use std::thread;
use std::time::{Duration, Instant};

use crate::api::context::RuntimeContext;
use crate::api::error::Result;
use crate::core::pool::{BatchStatus, CancelToken};
use crate::core::scene::Scene;
use crate::renderer::traits::RenderSink;

/// Lifecycle of a [`FrameLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not started yet.
    Idle,
    Running,
    /// Cancelled or failed; waiting for in-flight steps.
    Draining,
    Stopped,
}

/// Counters kept across frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    /// Wall time of the last full frame, pacing sleep included.
    pub last_frame: Duration,
    /// Delta fed to the last step.
    pub last_dt: f32,
}

/// Spiral-of-death guard: never feed more than two target frames of time
/// into one step.
pub fn clamp_frame_delta(target: Duration, measured: Duration) -> Duration {
    measured.min(target * 2)
}

pub struct FrameLoop {
    ctx: RuntimeContext,
    cancel: CancelToken,
    state: LoopState,
    stats: FrameStats,
}

impl FrameLoop {
    pub fn new(ctx: &RuntimeContext) -> Self {
        Self {
            ctx: ctx.clone(),
            cancel: CancelToken::new(),
            state: LoopState::Idle,
            stats: FrameStats::default(),
        }
    }

    /// Token that stops the loop from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Run until cancelled or a layer step fails. The worker pool is shut
    /// down on the way out either way, with the configured grace period.
    pub fn run(&mut self, scene: &mut Scene, sink: &mut dyn RenderSink) -> Result<()> {
        let config = self.ctx.config();
        let target = config.target_frame_duration();
        let verbose = config.debug.verbose;
        let mut last_frame = target;
        let mut report_at = Instant::now() + Duration::from_secs(1);
        let mut report_frames = 0u32;
        let mut report_time = Duration::ZERO;

        self.state = LoopState::Running;
        log::info!("frame loop running at {:?} per frame", target);

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break Ok(());
            }
            let started = Instant::now();
            let dt = clamp_frame_delta(target, last_frame).as_secs_f32();

            let mut batch = match scene.begin_step(dt) {
                Ok(batch) => batch,
                Err(err) => break Err(err),
            };
            match batch.wait(&self.cancel) {
                BatchStatus::Cancelled => break Ok(()),
                BatchStatus::Completed(Err(err)) => break Err(err),
                BatchStatus::Completed(Ok(())) => {}
            }

            scene.finish_step(dt);
            scene.render(sink);

            let busy = started.elapsed();
            if busy < target {
                thread::sleep(target - busy);
            }
            last_frame = started.elapsed();

            self.stats.frames += 1;
            self.stats.last_frame = last_frame;
            self.stats.last_dt = dt;

            if verbose {
                report_frames += 1;
                report_time += busy;
                if Instant::now() >= report_at {
                    log::debug!(
                        "{} frames, {:?} average work per frame",
                        report_frames,
                        report_time / report_frames.max(1)
                    );
                    report_frames = 0;
                    report_time = Duration::ZERO;
                    report_at += Duration::from_secs(1);
                }
            }
        };

        self.state = LoopState::Draining;
        if let Err(err) = &outcome {
            log::error!("frame loop aborted: {err}");
        }
        self.ctx.pool().shutdown(config.shutdown_grace());
        self.state = LoopState::Stopped;
        log::info!("frame loop stopped after {} frame(s)", self.stats.frames);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::EngineConfig;
    use crate::api::error::SceneError;
    use crate::components::actor::Actor;
    use crate::components::layer::Layer;
    use crate::core::physics::BodyType;
    use crate::renderer::traits::NullSink;

    fn ctx(fps: u32) -> RuntimeContext {
        RuntimeContext::new(EngineConfig {
            worker_threads: 2,
            target_fps: fps,
            shutdown_grace_ms: 200,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn delta_is_clamped_to_two_targets() {
        let target = Duration::from_millis(16);
        assert_eq!(
            clamp_frame_delta(target, target * 10),
            Duration::from_millis(32)
        );
        assert_eq!(
            clamp_frame_delta(target, Duration::from_millis(20)),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn cancel_stops_the_loop() {
        let ctx = ctx(120);
        let mut scene = Scene::new(&ctx).unwrap();
        let actor = Actor::circle(0.5).with_body_type(BodyType::Dynamic);
        scene.main_layer_mut().mount(&actor).unwrap();

        let mut frame_loop = FrameLoop::new(&ctx);
        assert_eq!(frame_loop.state(), LoopState::Idle);
        let cancel = frame_loop.cancel_token();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            cancel.cancel();
        });

        let started = Instant::now();
        frame_loop.run(&mut scene, &mut NullSink).unwrap();
        stopper.join().unwrap();

        assert_eq!(frame_loop.state(), LoopState::Stopped);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(frame_loop.stats().frames > 0);
        assert!(actor.position().y < 0.0);
        assert!(ctx.pool().is_shut_down());
    }

    #[test]
    fn cancel_during_long_step_returns_within_grace() {
        let ctx = ctx(60);
        let mut scene = Scene::new(&ctx).unwrap();
        // Hold the main world's lock so the first step blocks on a worker.
        let world = scene.main_layer().world().clone();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = thread::spawn(move || {
            let _guard = world.lock();
            locked_tx.send(()).unwrap();
            thread::sleep(Duration::from_secs(2));
        });
        locked_rx.recv().unwrap();

        let mut frame_loop = FrameLoop::new(&ctx);
        let cancel = frame_loop.cancel_token();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });

        let started = Instant::now();
        frame_loop.run(&mut scene, &mut NullSink).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(frame_loop.state(), LoopState::Stopped);
        assert_eq!(frame_loop.stats().frames, 0);
        holder.join().unwrap();
    }

    #[test]
    fn rendered_once_per_frame() {
        let ctx = ctx(240);
        let mut scene = Scene::new(&ctx).unwrap();
        let mut frame_loop = FrameLoop::new(&ctx);
        let cancel = frame_loop.cancel_token();
        let mut rendered = 0u64;
        let mut sink = |_: &Scene| {
            rendered += 1;
            if rendered == 10 {
                cancel.cancel();
            }
        };
        frame_loop.run(&mut scene, &mut sink).unwrap();
        assert_eq!(frame_loop.stats().frames, 10);
        assert_eq!(rendered, 10);
    }

    #[test]
    fn dt_never_exceeds_two_targets() {
        let ctx = ctx(1000);
        let mut scene = Scene::new(&ctx).unwrap();
        let mut frame_loop = FrameLoop::new(&ctx);
        let cancel = frame_loop.cancel_token();
        let mut frames = 0;
        // Each frame takes ~10 targets of wall time.
        let mut slow_sink = |_: &Scene| {
            thread::sleep(Duration::from_millis(10));
            frames += 1;
            if frames == 3 {
                cancel.cancel();
            }
        };
        frame_loop.run(&mut scene, &mut slow_sink).unwrap();
        let stats = frame_loop.stats();
        assert!(stats.last_frame >= Duration::from_millis(10));
        assert!((stats.last_dt - 0.002).abs() < 1e-6);
    }

    #[test]
    fn step_on_shut_down_pool_aborts() {
        let ctx = ctx(60);
        let mut scene = Scene::new(&ctx).unwrap();
        scene.add_layer(Layer::new(&ctx));
        ctx.pool().shutdown(Duration::ZERO);
        let mut frame_loop = FrameLoop::new(&ctx);
        let err = frame_loop.run(&mut scene, &mut NullSink).unwrap_err();
        assert!(matches!(err, SceneError::PoolShutDown));
        assert_eq!(frame_loop.state(), LoopState::Stopped);
    }
}
