//! Built-in module catalog.
//!
//! Modules are grouped by the first segment of their taxonomy identifier.

pub mod maths;
pub mod outputs;
pub mod sound;
pub mod system;

pub use maths::{
    BinaryOp, FloatBinary, Float3ToFloat, FloatToFloat3, FloatToFloat4, Oscillator, Waveform,
};
pub use outputs::Screen;
pub use sound::InputVisualizationListener;
pub use system::{FloatDelay, FxLevel, Time};

use crate::{registry::ModuleRegistryBuilder, Result};

/// Registers every built-in module type.
pub fn register_builtin(builder: &mut ModuleRegistryBuilder) -> Result<()> {
    builder
        .register_module::<FloatToFloat3>()?
        .register_module::<FloatToFloat4>()?
        .register_module::<Float3ToFloat>()?
        .register_module::<Oscillator>()?
        .register_module::<Time>()?
        .register_module::<FxLevel>()?
        .register_module::<FloatDelay>()?
        .register_module::<InputVisualizationListener>()?
        .register_module::<Screen>()?;
    builder
        .register(maths::FLOAT_ADD, maths::float_add)?
        .register(maths::FLOAT_MUL, maths::float_mul)?;
    Ok(())
}

/// Drives a single module outside of a graph. Test helper.
#[cfg(test)]
pub(crate) struct Harness {
    pub module: Box<dyn crate::module::Module>,
    pub inputs: crate::param::ParamList,
    pub outputs: crate::param::ParamList,
}

#[cfg(test)]
impl Harness {
    pub fn new(mut module: Box<dyn crate::module::Module>) -> Self {
        use crate::param::{ParamDirection, ParamList};

        let mut inputs = ParamList::new(ParamDirection::In);
        let mut outputs = ParamList::new(ParamDirection::Out);
        module.declare_params(&mut inputs, &mut outputs);
        Self {
            module,
            inputs,
            outputs,
        }
    }

    pub fn input(&self, name: &str) -> crate::param::ParamId {
        self.inputs.find(name).unwrap()
    }

    pub fn output(&self, name: &str) -> crate::param::ParamId {
        self.outputs.find(name).unwrap()
    }

    pub fn run(&mut self, ctx: &crate::module::FrameContext) {
        self.module.run(&self.inputs, &mut self.outputs, ctx);
    }
}
