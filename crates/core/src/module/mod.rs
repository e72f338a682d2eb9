//! The capability interface every processing module implements.

use std::collections::BTreeMap;

use crate::{
    param::{ParamList, ParamType},
    sound::AudioFrame,
    EngineError, Result,
};

/// Self-description of a module type, used for catalog browsing.
///
/// `identifier` is a `;`-separated taxonomy path such as
/// `maths;converters;float_to_float3`. The port specs are lists of
/// `name:type` tokens separated by commas or newlines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSpecification {
    pub identifier: String,
    pub description: String,
    pub in_param_spec: String,
    pub out_param_spec: String,
    pub component_class: String,
}

impl ModuleSpecification {
    /// Taxonomy segments of the identifier.
    pub fn path(&self) -> impl Iterator<Item = &str> {
        self.identifier.split(';')
    }

    /// Last taxonomy segment, the module's short name.
    pub fn name(&self) -> &str {
        self.identifier.rsplit(';').next().unwrap_or("")
    }

    pub fn in_params(&self) -> Result<Vec<(String, ParamType)>> {
        parse_param_spec(&self.in_param_spec)
    }

    pub fn out_params(&self) -> Result<Vec<(String, ParamType)>> {
        parse_param_spec(&self.out_param_spec)
    }
}

/// Parses a textual port list (`a:float,b:float3` or one token per line).
pub fn parse_param_spec(spec: &str) -> Result<Vec<(String, ParamType)>> {
    spec.split([',', '\n'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            let (name, ty) = token
                .split_once(':')
                .ok_or_else(|| EngineError::InvalidSpec(format!("missing type in `{token}`")))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(EngineError::InvalidSpec(format!("missing name in `{token}`")));
            }
            Ok((name.to_string(), ty.parse()?))
        })
        .collect()
}

/// Per-frame values handed to every [`Module::run`] call.
#[derive(Debug, Clone, Default)]
pub struct FrameContext {
    /// Seconds the active State has been running, scaled by playback speed.
    pub time: f32,
    /// Scaled seconds since the previous frame.
    pub delta: f32,
    /// Frames evaluated since the active State was activated.
    pub frame: u64,
    /// Effective fx levels of the active State.
    pub fx_levels: BTreeMap<String, f32>,
    pub audio: AudioFrame,
}

impl FrameContext {
    pub fn fx_level(&self, name: &str) -> Option<f32> {
        self.fx_levels.get(name).copied()
    }
}

/// A unit of per-frame computation.
///
/// The lifecycle is: construction through the registry,
/// [`declare_params`](Module::declare_params) exactly once, any number of
/// [`run`](Module::run) calls, then [`destroy`](Module::destroy) when the
/// owning graph is torn down.
pub trait Module: Send {
    /// Describes the module. Must not depend on `declare_params` having run.
    fn module_info(&self) -> ModuleSpecification;

    /// Creates every port the instance will ever expose. No I/O.
    fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList);

    /// Reads inputs, writes outputs. Must not block.
    fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, ctx: &FrameContext);

    /// Modules that latch their inputs read last frame's producer values.
    ///
    /// Edges into such a module are not data dependencies, which makes it the
    /// only legal way to close a feedback loop.
    fn latches_inputs(&self) -> bool {
        false
    }

    fn destroy(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_and_newline_separated_specs() {
        let params = parse_param_spec("param1:float,\n color:float4\nname:string").unwrap();
        assert_eq!(
            params,
            vec![
                ("param1".to_string(), ParamType::Float),
                ("color".to_string(), ParamType::Float4),
                ("name".to_string(), ParamType::String),
            ]
        );
    }

    #[test]
    fn empty_spec_has_no_params() {
        assert!(parse_param_spec("").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(parse_param_spec("param1").is_err());
        assert!(parse_param_spec(":float").is_err());
        assert!(parse_param_spec("a:quaternion").is_err());
    }

    #[test]
    fn splits_identifier_into_taxonomy() {
        let spec = ModuleSpecification {
            identifier: "maths;converters;float_to_float3".to_string(),
            ..Default::default()
        };
        assert_eq!(
            spec.path().collect::<Vec<_>>(),
            ["maths", "converters", "float_to_float3"]
        );
        assert_eq!(spec.name(), "float_to_float3");
    }
}
