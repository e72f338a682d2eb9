use std::f32::consts::TAU;

use crate::{
    module::{FrameContext, Module, ModuleSpecification},
    param::{ParamId, ParamList, ParamType, ParamValue},
};

pub const FLOAT_ADD: &str = "maths;arithmetics;binary;float_add";
pub const FLOAT_MUL: &str = "maths;arithmetics;binary;float_mul";

fn spec(
    identifier: &str,
    description: &str,
    in_param_spec: &str,
    out_param_spec: &str,
) -> ModuleSpecification {
    ModuleSpecification {
        identifier: identifier.to_string(),
        description: description.to_string(),
        in_param_spec: in_param_spec.to_string(),
        out_param_spec: out_param_spec.to_string(),
        component_class: "parameters".to_string(),
    }
}

/// Broadcasts a scalar into all three components of a vector.
#[derive(Debug, Default)]
pub struct FloatToFloat3 {
    param1: Option<ParamId>,
    result3: Option<ParamId>,
}

impl Module for FloatToFloat3 {
    fn module_info(&self) -> ModuleSpecification {
        spec(
            "maths;converters;float_to_float3",
            "Copies param1 into every component of a float3.\n\
             Handy for building a uniform scaling vector.",
            "param1:float",
            "result_float3:float3",
        )
    }

    fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList) {
        self.param1 = Some(inputs.create(ParamType::Float, "param1"));
        self.result3 = Some(outputs.create(ParamType::Float3, "result_float3"));
    }

    fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, _ctx: &FrameContext) {
        if let (Some(param1), Some(result3)) = (self.param1, self.result3) {
            let value = inputs.float(param1);
            outputs.set_float3(result3, [value; 3]);
        }
    }
}

#[derive(Debug, Default)]
pub struct FloatToFloat4 {
    param1: Option<ParamId>,
    result4: Option<ParamId>,
}

impl Module for FloatToFloat4 {
    fn module_info(&self) -> ModuleSpecification {
        spec(
            "maths;converters;float_to_float4",
            "Copies param1 into every component of a float4.",
            "param1:float",
            "result_float4:float4",
        )
    }

    fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList) {
        self.param1 = Some(inputs.create(ParamType::Float, "param1"));
        self.result4 = Some(outputs.create(ParamType::Float4, "result_float4"));
    }

    fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, _ctx: &FrameContext) {
        if let (Some(param1), Some(result4)) = (self.param1, self.result4) {
            let value = inputs.float(param1);
            outputs.set_float4(result4, [value; 4]);
        }
    }
}

/// Splits a float3 into its components.
#[derive(Debug, Default)]
pub struct Float3ToFloat {
    ports: Option<(ParamId, [ParamId; 3])>,
}

impl Module for Float3ToFloat {
    fn module_info(&self) -> ModuleSpecification {
        spec(
            "maths;converters;float3_to_float",
            "Splits a float3 into x, y and z.",
            "float3:float3",
            "x:float,y:float,z:float",
        )
    }

    fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList) {
        let input = inputs.create(ParamType::Float3, "float3");
        let components = [
            outputs.create(ParamType::Float, "x"),
            outputs.create(ParamType::Float, "y"),
            outputs.create(ParamType::Float, "z"),
        ];
        self.ports = Some((input, components));
    }

    fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, _ctx: &FrameContext) {
        if let Some((input, components)) = self.ports {
            let value = inputs.float3(input);
            for (id, v) in components.into_iter().zip(value) {
                outputs.set_float(id, v);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Mul,
}

/// Two-operand float arithmetic.
#[derive(Debug)]
pub struct FloatBinary {
    op: BinaryOp,
    ports: Option<(ParamId, ParamId, ParamId)>,
}

impl FloatBinary {
    pub fn new(op: BinaryOp) -> Self {
        Self { op, ports: None }
    }
}

pub fn float_add() -> Box<dyn Module> {
    Box::new(FloatBinary::new(BinaryOp::Add))
}

pub fn float_mul() -> Box<dyn Module> {
    Box::new(FloatBinary::new(BinaryOp::Mul))
}

impl Module for FloatBinary {
    fn module_info(&self) -> ModuleSpecification {
        match self.op {
            BinaryOp::Add => spec(
                FLOAT_ADD,
                "result = param1 + param2",
                "param1:float,param2:float",
                "result_float:float",
            ),
            BinaryOp::Mul => spec(
                FLOAT_MUL,
                "result = param1 * param2",
                "param1:float,param2:float",
                "result_float:float",
            ),
        }
    }

    fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList) {
        // Multiplying by an unconnected operand leaves the other one intact.
        let identity = match self.op {
            BinaryOp::Add => 0.0,
            BinaryOp::Mul => 1.0,
        };
        let a = inputs.create_with_default("param1", ParamValue::Float(identity));
        let b = inputs.create_with_default("param2", ParamValue::Float(identity));
        let result = outputs.create(ParamType::Float, "result_float");
        self.ports = Some((a, b, result));
    }

    fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, _ctx: &FrameContext) {
        if let Some((a, b, result)) = self.ports {
            let (a, b) = (inputs.float(a), inputs.float(b));
            let value = match self.op {
                BinaryOp::Add => a + b,
                BinaryOp::Mul => a * b,
            };
            outputs.set_float(result, value);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sin,
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    fn from_index(index: i32) -> Self {
        match index {
            1 => Waveform::Saw,
            2 => Waveform::Square,
            3 => Waveform::Triangle,
            _ => Waveform::Sin,
        }
    }

    /// Value in [-1, 1] at normalised phase `t` (one period per unit).
    pub fn sample(&self, t: f32) -> f32 {
        let t = t.rem_euclid(1.0);
        match self {
            Waveform::Sin => (t * TAU).sin(),
            Waveform::Saw => 2.0 * t - 1.0,
            Waveform::Square => {
                if t < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (t - 0.5).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OscillatorPorts {
    osc_type: ParamId,
    freq: ParamId,
    amp: ParamId,
    ofs: ParamId,
    phase: ParamId,
    result: ParamId,
}

/// Periodic function of State time: `ofs + amp * wave(time * freq + phase)`.
#[derive(Debug, Default)]
pub struct Oscillator {
    ports: Option<OscillatorPorts>,
}

impl Module for Oscillator {
    fn module_info(&self) -> ModuleSpecification {
        spec(
            "maths;oscillators;oscillator",
            "Time driven oscillator.\n\
             osc_type: 0 sin, 1 saw, 2 square, 3 triangle",
            "osc_type:int,freq:float,amp:float,ofs:float,phase:float",
            "float:float",
        )
    }

    fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList) {
        self.ports = Some(OscillatorPorts {
            osc_type: inputs.create(ParamType::Int, "osc_type"),
            freq: inputs.create_with_default("freq", ParamValue::Float(1.0)),
            amp: inputs.create_with_default("amp", ParamValue::Float(1.0)),
            ofs: inputs.create(ParamType::Float, "ofs"),
            phase: inputs.create(ParamType::Float, "phase"),
            result: outputs.create(ParamType::Float, "float"),
        });
    }

    fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, ctx: &FrameContext) {
        let Some(ports) = self.ports else {
            return;
        };
        let wave = Waveform::from_index(inputs.int(ports.osc_type));
        let t = ctx.time * inputs.float(ports.freq) + inputs.float(ports.phase);
        let value = inputs.float(ports.ofs) + inputs.float(ports.amp) * wave.sample(t);
        outputs.set_float(ports.result, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::Harness;

    #[test]
    fn float_to_float3_broadcasts_input() {
        let mut harness = Harness::new(Box::new(FloatToFloat3::default()));
        let (input, output) = (harness.input("param1"), harness.output("result_float3"));
        let ctx = FrameContext::default();

        assert_eq!(harness.outputs.float3(output), [0.0; 3]);
        for x in [2.0, -0.5, 0.0, 1e6, f32::MIN_POSITIVE] {
            harness.inputs.set_float(input, x);
            harness.run(&ctx);
            assert_eq!(harness.outputs.float3(output), [x, x, x]);
        }
    }

    #[test]
    fn float_to_float3_describes_itself() {
        let info = FloatToFloat3::default().module_info();
        assert_eq!(info.identifier, "maths;converters;float_to_float3");
        assert_eq!(info.component_class, "parameters");
        assert_eq!(
            info.out_params().unwrap(),
            vec![("result_float3".to_string(), ParamType::Float3)]
        );
    }

    #[test]
    fn float3_splits_into_components() {
        let mut harness = Harness::new(Box::new(Float3ToFloat::default()));
        let input = harness.input("float3");
        harness.inputs.set_float3(input, [1.0, 2.0, 3.0]);
        harness.run(&FrameContext::default());

        assert_eq!(harness.outputs.float(harness.output("x")), 1.0);
        assert_eq!(harness.outputs.float(harness.output("y")), 2.0);
        assert_eq!(harness.outputs.float(harness.output("z")), 3.0);
    }

    #[test]
    fn unconnected_multiplier_operand_is_identity() {
        let mut harness = Harness::new(float_mul());
        let a = harness.input("param1");
        harness.inputs.set_float(a, 4.0);
        harness.run(&FrameContext::default());

        assert_eq!(harness.outputs.float(harness.output("result_float")), 4.0);
    }

    #[test]
    fn oscillator_follows_time() {
        let mut harness = Harness::new(Box::new(Oscillator::default()));
        let osc_type = harness.input("osc_type");
        harness.inputs.set_int(osc_type, 2);
        let result = harness.output("float");

        harness.run(&FrameContext {
            time: 0.25,
            ..Default::default()
        });
        assert_eq!(harness.outputs.float(result), 1.0);

        harness.run(&FrameContext {
            time: 0.75,
            ..Default::default()
        });
        assert_eq!(harness.outputs.float(result), -1.0);
    }

    #[test]
    fn waveforms_stay_in_unit_range() {
        for wave in [Waveform::Sin, Waveform::Saw, Waveform::Square, Waveform::Triangle] {
            for step in 0..100 {
                let v = wave.sample(step as f32 * 0.037 - 1.0);
                assert!((-1.0..=1.0).contains(&v), "{wave:?} produced {v}");
            }
        }
    }
}
