use candle_core::{utils::*, Device};

use crate::{CommonError, ProfileStep, Profiler, Result};

/// The device every tensor operation is issued on, plus the profiler that
/// brackets timed regions on that device.
///
/// The context is passed explicitly to everything that allocates tensors or
/// records timings; nothing in the workspace reaches for a global device.
pub struct ExecutionContext {
    device: Device,
    profiler: Profiler,
}

impl ExecutionContext {
    /// Create a context for a specific device.
    pub fn new(device: Device) -> Self {
        Self {
            device,
            profiler: Profiler::default(),
        }
    }

    /// Create a context that runs on the CPU.
    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }

    /// Create a context that uses any available accelerator, falling back to the CPU.
    pub fn accelerated_if_available() -> Result<Self> {
        let device = if cuda_is_available() {
            Device::new_cuda(0)?
        } else if metal_is_available() {
            Device::new_metal(0)?
        } else {
            tracing::warn!("Running on CPU, to run on GPU, build with `--features cuda`");
            Device::Cpu
        };
        Ok(Self::new(device))
    }

    /// Replace the profiler of this context.
    pub fn with_profiler(mut self, profiler: Profiler) -> Self {
        self.profiler = profiler;
        self
    }

    /// The device tensors are allocated on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The profiler attached to this context.
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// A short description of the device, used in logs and errors.
    pub fn device_name(&self) -> String {
        describe_device(&self.device)
    }

    /// Fail immediately unless the context runs on a GPU.
    ///
    /// This is a precondition for operators that only have GPU kernels. It is
    /// not retryable.
    pub fn require_gpu(&self, operator: &str) -> Result<()> {
        if self.device.is_cpu() {
            return Err(CommonError::UnsupportedDevice {
                operator: operator.to_string(),
                device: self.device_name(),
            });
        }
        Ok(())
    }

    /// Block until all work queued on the device has finished.
    pub fn synchronize(&self) -> Result<()> {
        self.device.synchronize()?;
        Ok(())
    }

    /// Open a profiled region. The region ends when the returned step is
    /// finished or dropped.
    pub fn profile_step(&self, name: &'static str) -> ProfileStep<'_> {
        self.profiler.start(self, name)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::cpu()
    }
}

/// Describe a device as `cpu`, `cuda` or `metal`.
pub fn describe_device(device: &Device) -> String {
    if device.is_cuda() {
        "cuda".to_string()
    } else if device.is_metal() {
        "metal".to_string()
    } else {
        "cpu".to_string()
    }
}
