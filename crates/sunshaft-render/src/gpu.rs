//! Headless wgpu device for off-screen rendering and GPU tests.

#[derive(Debug, thiserror::Error)]
pub enum HeadlessContextError {
    /// Neither a hardware nor a fallback adapter was offered.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Adapter selection for [`HeadlessContext::with_options`].
#[derive(Debug, Clone, Copy)]
pub struct HeadlessOptions {
    pub power_preference: wgpu::PowerPreference,
    /// Retry with a software adapter when no hardware adapter is found.
    pub allow_fallback_adapter: bool,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            allow_fallback_adapter: true,
        }
    }
}

/// Instance, adapter, device and queue with no presentation surface.
pub struct HeadlessContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl HeadlessContext {
    pub async fn new() -> Result<Self, HeadlessContextError> {
        Self::with_options(HeadlessOptions::default()).await
    }

    pub async fn with_options(options: HeadlessOptions) -> Result<Self, HeadlessContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = request_adapter(&instance, options.power_preference, false).await;
        let adapter = match adapter {
            Some(adapter) => adapter,
            None if options.allow_fallback_adapter => {
                log::warn!("No hardware adapter available, trying a fallback adapter");
                request_adapter(&instance, options.power_preference, true)
                    .await
                    .ok_or(HeadlessContextError::NoAdapter)?
            }
            None => return Err(HeadlessContextError::NoAdapter),
        };
        log::info!("Selected GPU: {}", adapter_summary(&adapter.get_info()));

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("sunshaft-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

async fn request_adapter(
    instance: &wgpu::Instance,
    power_preference: wgpu::PowerPreference,
    force_fallback_adapter: bool,
) -> Option<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter,
        })
        .await
        .ok()
}

/// One-line description of an adapter for logs: `name (backend, device type)`.
pub fn adapter_summary(info: &wgpu::AdapterInfo) -> String {
    format!("{} ({:?}, {:?})", info.name, info.backend, info.device_type)
}

/// Blocking wrapper around [`HeadlessContext::new`].
pub fn init_headless_blocking() -> Result<HeadlessContext, HeadlessContextError> {
    pollster::block_on(HeadlessContext::new())
}
