use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::{ExecutionContext, Result};

/// An event emitted by a [`Profiler`] when a step starts or ends.
#[derive(Clone, Debug, PartialEq)]
pub enum ProfileEvent {
    /// A profiled step started
    StepStart {
        /// The index of the step, starting from zero
        step: usize,
        /// The name the step was opened with
        name: &'static str,
    },
    /// A profiled step ended
    StepEnd {
        /// The index of the step, starting from zero
        step: usize,
        /// The name the step was opened with
        name: &'static str,
        /// Wall time between the start and the end of the step
        elapsed: Duration,
    },
}

/// Brackets timed regions with start and end markers.
///
/// Every step is logged through `tracing`. An optional hook receives the same
/// markers so an external trace collector can line them up with its own data.
#[derive(Default)]
pub struct Profiler {
    steps: AtomicUsize,
    hook: Option<Mutex<Box<dyn FnMut(ProfileEvent) + Send>>>,
}

impl Profiler {
    /// Create a profiler that only logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a profiler that forwards every start and end marker to `hook`.
    pub fn with_hook(hook: impl FnMut(ProfileEvent) + Send + 'static) -> Self {
        Self {
            steps: AtomicUsize::new(0),
            hook: Some(Mutex::new(Box::new(hook))),
        }
    }

    /// The number of steps that have been started.
    pub fn steps_started(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    pub(crate) fn start<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        name: &'static str,
    ) -> ProfileStep<'a> {
        let step = self.steps.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(step, name, device = %ctx.device_name(), "profiler step start");
        self.emit(ProfileEvent::StepStart { step, name });
        ProfileStep {
            ctx,
            profiler: self,
            step,
            name,
            start: Instant::now(),
            finished: false,
        }
    }

    fn end(&self, step: usize, name: &'static str, elapsed: Duration) {
        tracing::info!(
            step,
            name,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "profiler step end"
        );
        self.emit(ProfileEvent::StepEnd {
            step,
            name,
            elapsed,
        });
    }

    fn emit(&self, event: ProfileEvent) {
        if let Some(Ok(mut hook)) = self.hook.as_ref().map(|hook| hook.lock()) {
            hook(event);
        }
    }
}

/// A profiled region opened with [`ExecutionContext::profile_step`].
///
/// Dropping the step ends it without waiting for the device. Call
/// [`ProfileStep::finish`] to synchronize first so queued kernels are counted.
pub struct ProfileStep<'a> {
    ctx: &'a ExecutionContext,
    profiler: &'a Profiler,
    step: usize,
    name: &'static str,
    start: Instant,
    finished: bool,
}

impl ProfileStep<'_> {
    /// The index of this step.
    pub fn index(&self) -> usize {
        self.step
    }

    /// Wait for the device, then end the step and return its duration.
    pub fn finish(mut self) -> Result<Duration> {
        self.ctx.synchronize()?;
        let elapsed = self.start.elapsed();
        self.finished = true;
        self.profiler.end(self.step, self.name, elapsed);
        Ok(elapsed)
    }
}

impl Drop for ProfileStep<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.profiler.end(self.step, self.name, self.start.elapsed());
        }
    }
}
