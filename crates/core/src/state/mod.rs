//! Saved graph configurations ("States") and their fx levels.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{graph::Graph, registry::ModuleRegistry, EngineError, Result};

/// Lower bound of every fx level.
pub const FX_LEVEL_MIN: f32 = 0.0;
/// Upper bound of every fx level.
pub const FX_LEVEL_MAX: f32 = 2.0;

/// A module instance inside a State file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: String,
    /// Initial input values, converted using each port's type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

/// `from:output -> to:input`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionDefinition {
    pub from: String,
    pub output: String,
    pub to: String,
    pub input: String,
}

/// Serialized form of a State.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateDefinition {
    pub name: String,
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
    #[serde(default)]
    pub connections: Vec<ConnectionDefinition>,
    /// Default fx levels, overridden by the persisted fx-levels file.
    #[serde(default)]
    pub fx_levels: BTreeMap<String, f32>,
}

impl StateDefinition {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Builds a runnable graph: modules, then initial values, then edges.
    pub fn build_graph(&self, registry: &ModuleRegistry) -> Result<Graph> {
        let mut graph = Graph::new();
        for module in &self.modules {
            graph.add_module(registry, &module.module_type, &module.name)?;
            for (port, value) in &module.params {
                graph.set_param_json(&module.name, port, value)?;
            }
        }
        for conn in &self.connections {
            graph.connect(&conn.from, &conn.output, &conn.to, &conn.input)?;
        }
        tracing::debug!(
            state = %self.name,
            modules = graph.len(),
            connections = graph.connections().len(),
            "built state graph"
        );
        Ok(graph)
    }
}

/// A loaded State: its definition plus the current fx levels.
#[derive(Debug, Clone)]
pub struct State {
    id: usize,
    definition: StateDefinition,
    fx_levels: BTreeMap<String, f32>,
}

impl State {
    pub fn new(id: usize, definition: StateDefinition) -> Self {
        let fx_levels = definition
            .fx_levels
            .iter()
            .map(|(name, value)| (name.clone(), clamp_level(*value)))
            .collect();
        Self {
            id,
            definition,
            fx_levels,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Identity used for fx-level persistence; survives graph edits.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &StateDefinition {
        &self.definition
    }

    pub fn fx_levels(&self) -> &BTreeMap<String, f32> {
        &self.fx_levels
    }

    pub fn fx_level(&self, name: &str) -> Option<f32> {
        self.fx_levels.get(name).copied()
    }

    /// Stores a level, clamped to [`FX_LEVEL_MIN`]..=[`FX_LEVEL_MAX`].
    pub fn set_fx_level(&mut self, name: &str, value: f32) {
        self.fx_levels.insert(name.to_string(), clamp_level(value));
    }

    /// Levels with a process-wide offset applied, still within bounds.
    pub fn effective_fx_levels(&self, offset: f32) -> BTreeMap<String, f32> {
        self.fx_levels
            .iter()
            .map(|(name, value)| (name.clone(), clamp_level(value + offset)))
            .collect()
    }

    pub fn build_graph(&self, registry: &ModuleRegistry) -> Result<Graph> {
        self.definition
            .build_graph(registry)
            .map_err(|err| EngineError::state_load(self.name(), err))
    }
}

fn clamp_level(value: f32) -> f32 {
    if value.is_nan() {
        return FX_LEVEL_MIN;
    }
    value.clamp(FX_LEVEL_MIN, FX_LEVEL_MAX)
}

/// Ordered collection of States; a State's id is its index.
///
/// Names are unique, since fx levels are persisted by name.
#[derive(Debug, Clone, Default)]
pub struct StateCollection {
    states: Vec<State>,
}

impl StateCollection {
    /// Builds the collection, dropping every State whose name is already taken.
    pub fn new(definitions: Vec<StateDefinition>) -> Self {
        let mut names = BTreeSet::new();
        Self {
            states: definitions
                .into_iter()
                .filter(|definition| {
                    let unique = names.insert(definition.name.clone());
                    if !unique {
                        tracing::warn!(
                            state = %definition.name,
                            "skipping state with duplicate name"
                        );
                    }
                    unique
                })
                .enumerate()
                .map(|(id, definition)| State::new(id, definition))
                .collect(),
        }
    }

    /// Loads every `*.json` file in `dir`, ordered by file name.
    ///
    /// Files that fail to parse are skipped with a warning so one broken
    /// State does not take the rest down.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().map_or(false, |ext| ext == "json"))
            .collect();
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            match StateDefinition::load(&path) {
                Ok(definition) => definitions.push(definition),
                Err(err) => tracing::warn!(?path, %err, "skipping unreadable state file"),
            }
        }
        tracing::info!(?dir, states = definitions.len(), "loaded states");
        Ok(Self::new(definitions))
    }

    pub fn get(&self, index: usize) -> Option<&State> {
        self.states.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut State> {
        self.states.get_mut(index)
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut State> {
        self.states.iter_mut().find(|state| state.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParamValue;

    const PULSE: &str = r#"{
        "name": "pulse",
        "modules": [
            { "name": "osc", "type": "maths;oscillators;oscillator", "params": { "freq": 0.5 } },
            { "name": "vec", "type": "maths;converters;float_to_float3" }
        ],
        "connections": [
            { "from": "osc", "output": "float", "to": "vec", "input": "param1" }
        ],
        "fx_levels": { "brightness": 1.0, "overdrive": 7.0 }
    }"#;

    #[test]
    fn parses_and_builds_a_state() {
        let definition = StateDefinition::from_json_str(PULSE).unwrap();
        let graph = definition
            .build_graph(&ModuleRegistry::builtin().unwrap())
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.connections().len(), 1);
        assert_eq!(graph.input("osc", "freq"), Some(&ParamValue::Float(0.5)));
    }

    #[test]
    fn fx_levels_are_clamped_on_load() {
        let state = State::new(0, StateDefinition::from_json_str(PULSE).unwrap());
        assert_eq!(state.fx_level("overdrive"), Some(FX_LEVEL_MAX));
        assert_eq!(state.fx_level("brightness"), Some(1.0));
    }

    #[test]
    fn effective_levels_apply_offset_within_bounds() {
        let mut state = State::new(0, StateDefinition::from_json_str(PULSE).unwrap());
        state.set_fx_level("brightness", 0.5);

        let levels = state.effective_fx_levels(-1.0);
        assert_eq!(levels["brightness"], FX_LEVEL_MIN);
        let levels = state.effective_fx_levels(0.25);
        assert_eq!(levels["brightness"], 0.75);
    }

    #[test]
    fn build_errors_name_the_state() {
        let mut definition = StateDefinition::from_json_str(PULSE).unwrap();
        definition.connections.push(ConnectionDefinition {
            from: "vec".to_string(),
            output: "result_float3".to_string(),
            to: "osc".to_string(),
            input: "freq".to_string(),
        });
        let state = State::new(3, definition);

        let err = state
            .build_graph(&ModuleRegistry::builtin().unwrap())
            .unwrap_err();
        match err {
            EngineError::StateLoad { state, source } => {
                assert_eq!(state, "pulse");
                assert!(matches!(*source, EngineError::TypeMismatch { .. }));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn bundled_states_build() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../states");
        let states = StateCollection::load_dir(dir).unwrap();
        let registry = ModuleRegistry::builtin().unwrap();

        let names: Vec<_> = states.iter().map(State::name).collect();
        assert_eq!(names, ["pulse", "orbit", "drift"]);
        for state in states.iter() {
            state.build_graph(&registry).unwrap();
        }
    }

    #[test]
    fn duplicate_names_keep_the_first_state() {
        let named = |name: &str, level: f32| StateDefinition {
            name: name.to_string(),
            modules: Vec::new(),
            connections: Vec::new(),
            fx_levels: BTreeMap::from([("fx".to_string(), level)]),
        };
        let states = StateCollection::new(vec![
            named("dup", 0.2),
            named("other", 1.0),
            named("dup", 1.8),
        ]);

        let names: Vec<_> = states.iter().map(State::name).collect();
        assert_eq!(names, ["dup", "other"]);
        assert_eq!(states.get(0).unwrap().fx_level("fx"), Some(0.2));
        assert_eq!(states.get(1).map(State::id), Some(1));
    }

    #[test]
    fn loads_directory_in_file_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("b.json"), r#"{ "name": "second" }"#).unwrap();
        fs::write(dir.join("a.json"), r#"{ "name": "first" }"#).unwrap();
        fs::write(dir.join("broken.json"), "{ not json").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let states = StateCollection::load_dir(dir).unwrap();

        let names: Vec<_> = states.iter().map(State::name).collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(states.get(1).map(State::id), Some(1));
    }
}
