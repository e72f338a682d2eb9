use crate::{
    module::{FrameContext, Module, ModuleSpecification},
    param::{ParamId, ParamList, ParamType, ParamValue},
};

/// Exposes the frame clock.
#[derive(Debug, Default)]
pub struct Time {
    ports: Option<(ParamId, ParamId, ParamId)>,
}

impl Module for Time {
    fn module_info(&self) -> ModuleSpecification {
        ModuleSpecification {
            identifier: "system;time".to_string(),
            description: "State time in seconds, frame delta and frame number.".to_string(),
            in_param_spec: String::new(),
            out_param_spec: "time:float,dtime:float,frame:int".to_string(),
            component_class: "system".to_string(),
        }
    }

    fn declare_params(&mut self, _inputs: &mut ParamList, outputs: &mut ParamList) {
        self.ports = Some((
            outputs.create(ParamType::Float, "time"),
            outputs.create(ParamType::Float, "dtime"),
            outputs.create(ParamType::Int, "frame"),
        ));
    }

    fn run(&mut self, _inputs: &ParamList, outputs: &mut ParamList, ctx: &FrameContext) {
        if let Some((time, dtime, frame)) = self.ports {
            outputs.set_float(time, ctx.time);
            outputs.set_float(dtime, ctx.delta);
            outputs.set_int(frame, (ctx.frame % i32::MAX as u64) as i32);
        }
    }
}

/// Reads one of the active State's fx levels.
///
/// This is how a State maps the sequencer's fx-level control onto its graph:
/// wire `level` into whatever should scale with it.
#[derive(Debug, Default)]
pub struct FxLevel {
    ports: Option<(ParamId, ParamId, ParamId)>,
}

impl Module for FxLevel {
    fn module_info(&self) -> ModuleSpecification {
        ModuleSpecification {
            identifier: "system;fx_level".to_string(),
            description: "Current value of the named fx level.\n\
                          Falls back to `fallback` when the State does not define it."
                .to_string(),
            in_param_spec: "name:string,fallback:float".to_string(),
            out_param_spec: "level:float".to_string(),
            component_class: "parameters".to_string(),
        }
    }

    fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList) {
        self.ports = Some((
            inputs.create_with_default("name", ParamValue::String("fx".to_string())),
            inputs.create_with_default("fallback", ParamValue::Float(1.0)),
            outputs.create_with_default("level", ParamValue::Float(1.0)),
        ));
    }

    fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, ctx: &FrameContext) {
        if let Some((name, fallback, level)) = self.ports {
            let value = ctx
                .fx_level(inputs.string(name))
                .unwrap_or_else(|| inputs.float(fallback));
            outputs.set_float(level, value);
        }
    }
}

/// One-frame delay. The only way to feed a value back upstream.
#[derive(Debug, Default)]
pub struct FloatDelay {
    ports: Option<(ParamId, ParamId)>,
}

impl Module for FloatDelay {
    fn module_info(&self) -> ModuleSpecification {
        ModuleSpecification {
            identifier: "system;delay;float_delay".to_string(),
            description: "Outputs the value its input had on the previous frame.".to_string(),
            in_param_spec: "float_in:float".to_string(),
            out_param_spec: "result_float:float".to_string(),
            component_class: "parameters".to_string(),
        }
    }

    fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList) {
        self.ports = Some((
            inputs.create(ParamType::Float, "float_in"),
            outputs.create(ParamType::Float, "result_float"),
        ));
    }

    // Inputs are latched by the graph after the frame, so they already hold
    // last frame's value here.
    fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, _ctx: &FrameContext) {
        if let Some((input, output)) = self.ports {
            outputs.set_float(output, inputs.float(input));
        }
    }

    fn latches_inputs(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::modules::Harness;

    #[test]
    fn time_mirrors_frame_context() {
        let mut harness = Harness::new(Box::new(Time::default()));
        harness.run(&FrameContext {
            time: 3.5,
            delta: 0.02,
            frame: 42,
            ..Default::default()
        });

        assert_eq!(harness.outputs.float(harness.output("time")), 3.5);
        assert_eq!(harness.outputs.float(harness.output("dtime")), 0.02);
        assert_eq!(harness.outputs.int(harness.output("frame")), 42);
    }

    #[test]
    fn fx_level_reads_named_level() {
        let mut harness = Harness::new(Box::new(FxLevel::default()));
        let name = harness.input("name");
        harness
            .inputs
            .set(name, ParamValue::String("brightness".to_string()));

        let ctx = FrameContext {
            fx_levels: BTreeMap::from([("brightness".to_string(), 0.4)]),
            ..Default::default()
        };
        harness.run(&ctx);
        assert_eq!(harness.outputs.float(harness.output("level")), 0.4);
    }

    #[test]
    fn fx_level_falls_back_when_missing() {
        let mut harness = Harness::new(Box::new(FxLevel::default()));
        let fallback = harness.input("fallback");
        harness.inputs.set_float(fallback, 0.25);
        harness.run(&FrameContext::default());

        assert_eq!(harness.outputs.float(harness.output("level")), 0.25);
    }
}
