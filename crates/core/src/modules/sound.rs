use crate::{
    module::{FrameContext, Module, ModuleSpecification},
    param::{ParamId, ParamList, ParamType, ParamValue},
    sound::OCTAVE_BANDS,
};

/// Publishes the current audio frame as float outputs.
#[derive(Debug, Default)]
pub struct InputVisualizationListener {
    multiplier: Option<ParamId>,
    amplitude: Option<ParamId>,
    octaves: Vec<ParamId>,
}

impl Module for InputVisualizationListener {
    fn module_info(&self) -> ModuleSpecification {
        let octaves = (0..OCTAVE_BANDS)
            .map(|band| format!("octave_{band}:float"))
            .collect::<Vec<_>>()
            .join(",");
        ModuleSpecification {
            identifier: "sound;input_visualization_listener".to_string(),
            description: "Amplitude and octave band levels of the audio input,\n\
                          scaled by multiplier."
                .to_string(),
            in_param_spec: "multiplier:float".to_string(),
            out_param_spec: format!("amplitude:float,{octaves}"),
            component_class: "system".to_string(),
        }
    }

    fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList) {
        self.multiplier = Some(inputs.create_with_default("multiplier", ParamValue::Float(1.0)));
        self.amplitude = Some(outputs.create(ParamType::Float, "amplitude"));
        self.octaves = (0..OCTAVE_BANDS)
            .map(|band| outputs.create(ParamType::Float, &format!("octave_{band}")))
            .collect();
    }

    fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, ctx: &FrameContext) {
        let (Some(multiplier), Some(amplitude)) = (self.multiplier, self.amplitude) else {
            return;
        };
        let gain = inputs.float(multiplier);
        outputs.set_float(amplitude, ctx.audio.amplitude * gain);
        for (id, level) in self.octaves.iter().zip(ctx.audio.octaves) {
            outputs.set_float(*id, level * gain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{modules::Harness, sound::AudioFrame};

    #[test]
    fn scales_audio_levels() {
        let mut harness = Harness::new(Box::new(InputVisualizationListener::default()));
        let multiplier = harness.input("multiplier");
        harness.inputs.set_float(multiplier, 2.0);

        let mut octaves = [0.0; OCTAVE_BANDS];
        octaves[3] = 0.25;
        harness.run(&FrameContext {
            audio: AudioFrame {
                amplitude: 0.5,
                octaves,
            },
            ..Default::default()
        });

        assert_eq!(harness.outputs.float(harness.output("amplitude")), 1.0);
        assert_eq!(harness.outputs.float(harness.output("octave_3")), 0.5);
        assert_eq!(harness.outputs.float(harness.output("octave_0")), 0.0);
    }

    #[test]
    fn declared_ports_match_description() {
        let harness = Harness::new(Box::new(InputVisualizationListener::default()));
        let described = harness.module.module_info().out_params().unwrap();
        let declared: Vec<_> = harness
            .outputs
            .iter()
            .map(|param| (param.name().to_string(), param.param_type()))
            .collect();
        assert_eq!(described, declared);
    }
}
