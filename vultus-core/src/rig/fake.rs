//! In-memory rig used by unit tests.

use std::collections::HashMap;

use crate::error::{Result, VultusError};
use crate::rig::{MotionPriority, ParamHandle, Rig};

/// Records every value write and motion start for assertions.
pub struct FakeRig {
    names: Vec<String>,
    values: Vec<f32>,
    pub motions: Vec<(String, u32, MotionPriority)>,
    pub expressions: Vec<String>,
    pub motion_finished: bool,
}

impl FakeRig {
    pub fn new(param_names: &[&str]) -> Self {
        Self {
            names: param_names.iter().map(|s| s.to_string()).collect(),
            values: vec![0.0; param_names.len()],
            motions: Vec::new(),
            expressions: Vec::new(),
            motion_finished: true,
        }
    }

    /// Resolve a name that is known to exist; panics otherwise.
    pub fn handle(&self, name: &str) -> ParamHandle {
        self.parameter_handle(name).expect("test param must exist")
    }

    pub fn value_of(&self, name: &str) -> f32 {
        self.values[self.index_of(name)]
    }

    fn index_of(&self, name: &str) -> usize {
        self.names
            .iter()
            .position(|n| n == name)
            .expect("test param must exist")
    }

    pub fn values_by_name(&self) -> HashMap<String, f32> {
        self.names
            .iter()
            .cloned()
            .zip(self.values.iter().copied())
            .collect()
    }
}

impl Rig for FakeRig {
    fn parameter_handle(&self, name: &str) -> Result<ParamHandle> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| ParamHandle(i as u32))
            .ok_or_else(|| VultusError::UnknownParameter {
                name: name.to_string(),
            })
    }

    fn value(&self, handle: ParamHandle) -> f32 {
        self.values[handle.0 as usize]
    }

    fn set_value(&mut self, handle: ParamHandle, value: f32, weight: f32) {
        let slot = &mut self.values[handle.0 as usize];
        *slot = *slot * (1.0 - weight) + value * weight;
    }

    fn add_value(&mut self, handle: ParamHandle, value: f32) {
        self.values[handle.0 as usize] += value;
    }

    fn start_motion(&mut self, group: &str, index: u32, priority: MotionPriority) {
        self.motions.push((group.to_string(), index, priority));
    }

    fn motion_finished(&self) -> bool {
        self.motion_finished
    }

    fn set_expression(&mut self, id: &str) {
        self.expressions.push(id.to_string());
    }
}
