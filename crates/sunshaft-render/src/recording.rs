//! Backend that records calls instead of touching a GPU.

use crate::backend::{
    AllocationError, DrawSettings, FilterMode, RenderBackend, SortingCriteria, TargetDescriptor,
};
use crate::camera::CameraView;
use crate::uniforms::{UniformSlot, UniformValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FakeTarget(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FakeProgram(pub u32);

/// A renderer in the host's visible list.
#[derive(Clone, Copy, Debug)]
pub struct FakeRenderer {
    pub queue: u32,
    pub pass_tag: &'static str,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Allocate {
        target: FakeTarget,
        descriptor: TargetDescriptor,
        filter: FilterMode,
        label: &'static str,
    },
    Release(FakeTarget),
    PushDebugGroup(String),
    PopDebugGroup,
    DrawSky(FakeTarget),
    DrawRenderers {
        target: FakeTarget,
        program: FakeProgram,
        sorting: SortingCriteria,
        drawn: usize,
    },
    SetUniform {
        program: FakeProgram,
        slot: UniformSlot,
        value: UniformValue,
    },
    Blit {
        source: FakeTarget,
        destination: FakeTarget,
        program: FakeProgram,
    },
}

impl Call {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Call::DrawSky(_) | Call::DrawRenderers { .. } | Call::Blit { .. }
        )
    }
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<Call>,
    next_target: u32,
    fail_allocations: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn draw_count(&self) -> usize {
        self.calls.iter().filter(|call| call.is_draw()).count()
    }

    /// Uniform writes made on `program`, in order.
    pub fn uniforms_for(&self, program: FakeProgram) -> Vec<(UniformSlot, UniformValue)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::SetUniform {
                    program: p,
                    slot,
                    value,
                } if *p == program => Some((*slot, *value)),
                _ => None,
            })
            .collect()
    }

    /// Index of the first blit made with `program`.
    pub fn blit_index(&self, program: FakeProgram) -> Option<usize> {
        self.calls
            .iter()
            .position(|call| matches!(call, Call::Blit { program: p, .. } if *p == program))
    }
}

impl RenderBackend for RecordingBackend {
    type Target = FakeTarget;
    type Program = FakeProgram;
    type DrawList = [FakeRenderer];

    fn allocate_target(
        &mut self,
        descriptor: &TargetDescriptor,
        filter: FilterMode,
        label: &'static str,
    ) -> Result<FakeTarget, AllocationError> {
        if self.fail_allocations {
            return Err(AllocationError::Rejected {
                format: descriptor.format,
                reason: "out of memory".to_string(),
            });
        }
        self.next_target += 1;
        let target = FakeTarget(self.next_target);
        self.calls.push(Call::Allocate {
            target,
            descriptor: *descriptor,
            filter,
            label,
        });
        Ok(target)
    }

    fn release_target(&mut self, target: FakeTarget) {
        self.calls.push(Call::Release(target));
    }

    fn push_debug_group(&mut self, label: &str) {
        self.calls.push(Call::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.calls.push(Call::PopDebugGroup);
    }

    fn draw_sky(&mut self, target: FakeTarget, _camera: &CameraView) {
        self.calls.push(Call::DrawSky(target));
    }

    fn draw_renderers(
        &mut self,
        target: FakeTarget,
        _camera: &CameraView,
        draw_list: &[FakeRenderer],
        settings: &DrawSettings<FakeProgram>,
    ) {
        let drawn = draw_list
            .iter()
            .filter(|r| settings.accepts(r.queue, r.pass_tag))
            .count();
        self.calls.push(Call::DrawRenderers {
            target,
            program: settings.override_program,
            sorting: settings.sorting,
            drawn,
        });
    }

    fn set_uniform(&mut self, program: FakeProgram, slot: UniformSlot, value: UniformValue) {
        self.calls.push(Call::SetUniform {
            program,
            slot,
            value,
        });
    }

    fn blit(&mut self, source: FakeTarget, destination: FakeTarget, program: FakeProgram) {
        self.calls.push(Call::Blit {
            source,
            destination,
            program,
        });
    }
}
