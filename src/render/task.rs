//! Asynchronous frame renders.
//!
//! A [`RenderTask`] is one frame render against a shared frame buffer. It is
//! driven by its own named thread which blocks inside the load balancer's
//! pool, so submission returns immediately.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::core::types::unpoison;
use crate::core::{Error, Result};
use crate::fb::{CompletionEvent, LocalFrameBuffer};

use super::load_balancer::{CancelToken, Progress, TiledLoadBalancer};
use super::renderer::{FrameContext, Renderer};

/// Lifecycle of a render task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Submitted, driver thread not started yet
    Pending,
    /// Tiles are being rendered
    Running,
    /// Every tile was rendered
    Finished,
    /// Cancellation was observed before every tile was rendered
    Cancelled,
}

impl TaskState {
    /// True once the task can no longer make progress.
    pub fn is_ready(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Cancelled)
    }
}

/// One in-flight or completed frame render.
pub struct RenderTask {
    state: Mutex<TaskState>,
    state_changed: Condvar,
    cancel: CancelToken,
    progress: Progress,
    frame_buffer: Arc<LocalFrameBuffer>,
}

impl RenderTask {
    /// Start rendering `frame` into `frame_buffer`.
    ///
    /// Fails with `Usage` if the frame buffer already has a render in flight.
    pub fn submit(
        frame_buffer: Arc<LocalFrameBuffer>,
        renderer: Arc<dyn Renderer>,
        frame: FrameContext,
        balancer: Arc<dyn TiledLoadBalancer>,
    ) -> Result<Arc<Self>> {
        frame_buffer.begin_render()?;

        let task = Arc::new(Self {
            state: Mutex::new(TaskState::Pending),
            state_changed: Condvar::new(),
            cancel: CancelToken::new(),
            progress: Progress::new(),
            frame_buffer,
        });

        let driver = task.clone();
        let spawned = thread::Builder::new()
            .name("raykit-render".into())
            .spawn(move || driver.run(renderer.as_ref(), &frame, balancer.as_ref()));

        if let Err(e) = spawned {
            log::error!("Failed to start render thread: {}", e);
            task.frame_buffer.finish_render();
            task.set_state(TaskState::Cancelled);
            return Err(Error::Io(e));
        }
        Ok(task)
    }

    fn run(&self, renderer: &dyn Renderer, frame: &FrameContext, balancer: &dyn TiledLoadBalancer) {
        self.set_state(TaskState::Running);
        let fb = &self.frame_buffer;
        fb.begin_frame();

        let completed = catch_unwind(AssertUnwindSafe(|| {
            balancer.render_frame(renderer, frame, fb, &self.cancel, &self.progress)
        }))
        .unwrap_or_else(|_| {
            log::error!("Render of frame {} panicked; treating it as cancelled", frame.accum_id);
            false
        });

        fb.end_frame(completed);
        // Release the frame buffer before the task reports ready, so a caller
        // that observed readiness can submit again straight away.
        fb.finish_render();
        self.set_state(if completed { TaskState::Finished } else { TaskState::Cancelled });
    }

    fn set_state(&self, state: TaskState) {
        *unpoison(self.state.lock()) = state;
        self.state_changed.notify_all();
    }

    pub fn state(&self) -> TaskState {
        *unpoison(self.state.lock())
    }

    /// Non-blocking: finished or cancelled.
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Request cooperative cancellation. Tiles already started still finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fraction of tiles completed, in [0, 1]. Frozen once the task ends.
    pub fn progress(&self) -> f32 {
        self.progress.fraction()
    }

    /// Block until `event` is reached. `NoneFinished` never blocks.
    pub fn wait(&self, event: CompletionEvent) {
        if event == CompletionEvent::NoneFinished {
            return;
        }
        let mut state = unpoison(self.state.lock());
        while !state.is_ready() {
            state = unpoison(self.state_changed.wait(state));
        }
    }

    pub fn frame_buffer(&self) -> &Arc<LocalFrameBuffer> {
        &self.frame_buffer
    }
}
