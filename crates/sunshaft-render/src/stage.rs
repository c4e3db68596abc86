//! Host-driven render stage contract.

use glam::Vec3;

use crate::backend::{RenderBackend, TargetDescriptor};
use crate::camera::CameraView;

/// Point in the host pipeline a stage is inserted at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageEvent {
    /// After opaque and transparent geometry, before the post-processing chain.
    BeforePostProcessing,
}

/// Per camera-frame inputs the host hands to [`RenderStage::execute`].
pub struct CameraFrame<'a, B: RenderBackend + ?Sized> {
    /// The camera's color target; compositing passes write here.
    pub color_target: B::Target,
    /// Renderers visible to the camera this frame.
    pub draw_list: &'a B::DrawList,
    pub camera: CameraView,
    /// Forward direction of the dominant directional light.
    pub light_forward: Vec3,
}

/// A stage the host calls three times per camera per frame.
///
/// `prepare` returns the frame state, `execute` records GPU work into the
/// backend, and `release` consumes the frame and frees what `prepare` acquired.
/// Hosts must call `release` for every frame `prepare` returned.
pub trait RenderStage<B: RenderBackend + ?Sized> {
    type Frame;

    /// Where in the host pipeline this stage runs.
    fn event(&self) -> StageEvent;

    fn prepare(&self, backend: &mut B, camera_target: &TargetDescriptor) -> Self::Frame;

    fn execute(&self, backend: &mut B, frame: &mut Self::Frame, camera: &CameraFrame<'_, B>);

    fn release(&self, backend: &mut B, frame: Self::Frame);
}
