use crate::{
    module::{FrameContext, Module, ModuleSpecification},
    param::{ParamList, ParamType, ParamValue},
};

pub const SCREEN_CLASS: &str = "screen";

/// Graph sink read by the render collaborator.
///
/// It computes nothing; its input ports are the State's render output.
#[derive(Debug, Default)]
pub struct Screen;

impl Module for Screen {
    fn module_info(&self) -> ModuleSpecification {
        ModuleSpecification {
            identifier: "outputs;screen".to_string(),
            description: "Final output of a State.".to_string(),
            in_param_spec: "clear_color:float4,gamma_correction:float,texture:texture".to_string(),
            out_param_spec: String::new(),
            component_class: SCREEN_CLASS.to_string(),
        }
    }

    fn declare_params(&mut self, inputs: &mut ParamList, _outputs: &mut ParamList) {
        inputs.create_with_default("clear_color", ParamValue::Float4([0.0, 0.0, 0.0, 1.0]));
        inputs.create_with_default("gamma_correction", ParamValue::Float(1.0));
        inputs.create(ParamType::Texture, "texture");
    }

    fn run(&mut self, _inputs: &ParamList, _outputs: &mut ParamList, _ctx: &FrameContext) {}
}
