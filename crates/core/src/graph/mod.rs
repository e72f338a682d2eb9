//! Dataflow graph of module instances.
//!
//! The graph holds module instances and typed connections between their
//! ports, and evaluates every module once per frame in topological order.
//! Ties between independent modules are broken by declaration order, so two
//! identical graphs fed identical inputs produce identical outputs.
//!
//! Values move along an edge when the consumer is about to run: the
//! producer's output is copied into the consumer's input. Edges into modules
//! that latch their inputs (see [`Module::latches_inputs`]) are copied after
//! the whole frame instead, and do not count as data dependencies.

use std::collections::{BTreeSet, HashMap};

use crate::{
    module::{FrameContext, Module},
    param::{ParamDirection, ParamId, ParamList, ParamValue},
    registry::ModuleRegistry,
    EngineError, Result,
};

/// Position of a module in declaration order.
///
/// Removing a module shifts the ids of every module declared after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A directed edge from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub producer: NodeId,
    pub output: ParamId,
    pub consumer: NodeId,
    pub input: ParamId,
}

struct Node {
    name: String,
    module_type: String,
    component_class: String,
    module: Box<dyn Module>,
    inputs: ParamList,
    outputs: ParamList,
    latches: bool,
}

impl Node {
    fn input_id(&self, port: &str) -> Result<ParamId> {
        self.inputs.find(port).ok_or_else(|| EngineError::UnknownPort {
            module: self.name.clone(),
            port: port.to_string(),
            direction: ParamDirection::In.name(),
        })
    }

    fn output_id(&self, port: &str) -> Result<ParamId> {
        self.outputs.find(port).ok_or_else(|| EngineError::UnknownPort {
            module: self.name.clone(),
            port: port.to_string(),
            direction: ParamDirection::Out.name(),
        })
    }
}

/// Module instances plus connections, evaluated once per frame.
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Node>,
    names: HashMap<String, NodeId>,
    connections: Vec<Connection>,
    order: Vec<NodeId>,
    frames: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a module of type `module_type` through the registry and adds
    /// it under `name`.
    pub fn add_module(
        &mut self,
        registry: &ModuleRegistry,
        module_type: &str,
        name: &str,
    ) -> Result<NodeId> {
        if self.names.contains_key(name) {
            return Err(EngineError::DuplicateModule(name.to_string()));
        }
        let module = registry.create(module_type)?;
        self.add_module_instance(name, module)
    }

    /// Adds an already constructed module. Its ports are declared here.
    pub fn add_module_instance(
        &mut self,
        name: &str,
        mut module: Box<dyn Module>,
    ) -> Result<NodeId> {
        if self.names.contains_key(name) {
            return Err(EngineError::DuplicateModule(name.to_string()));
        }

        let info = module.module_info();
        let mut inputs = ParamList::new(ParamDirection::In);
        let mut outputs = ParamList::new(ParamDirection::Out);
        module.declare_params(&mut inputs, &mut outputs);
        let latches = module.latches_inputs();

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            module_type: info.identifier,
            component_class: info.component_class,
            module,
            inputs,
            outputs,
            latches,
        });
        self.names.insert(name.to_string(), id);
        self.rebuild_order();
        Ok(id)
    }

    /// Removes a module together with every connection touching it.
    pub fn remove_module(&mut self, name: &str) -> Result<()> {
        let id = self.resolve(name)?;
        let orphaned: Vec<(NodeId, ParamId)> = self
            .connections
            .iter()
            .filter(|conn| conn.producer == id && conn.consumer != id)
            .map(|conn| (conn.consumer, conn.input))
            .collect();
        self.connections
            .retain(|conn| conn.producer != id && conn.consumer != id);
        for (consumer, input) in orphaned {
            self.reset_input(consumer, input);
        }
        self.names.remove(name);

        let mut node = self.nodes.remove(id.0);
        tracing::debug!(module = %node.name, "destroying module");
        node.module.destroy();

        let shift = |node: &mut NodeId| {
            if node.0 > id.0 {
                node.0 -= 1;
            }
        };
        for conn in &mut self.connections {
            shift(&mut conn.producer);
            shift(&mut conn.consumer);
        }
        self.names.values_mut().for_each(shift);
        self.rebuild_order();
        Ok(())
    }

    /// Connects `producer:output` to `consumer:input`.
    ///
    /// Fails without touching the graph if a port is missing, the types
    /// differ, the input is already fed, or the edge would close a cycle.
    pub fn connect(
        &mut self,
        producer: &str,
        output: &str,
        consumer: &str,
        input: &str,
    ) -> Result<()> {
        let producer_id = self.resolve(producer)?;
        let consumer_id = self.resolve(consumer)?;
        let producer_node = self.node(producer_id)?;
        let consumer_node = self.node(consumer_id)?;
        let output_id = producer_node.output_id(output)?;
        let input_id = consumer_node.input_id(input)?;

        let output_type = producer_node.outputs.param(output_id).param_type();
        let input_type = consumer_node.inputs.param(input_id).param_type();
        if output_type != input_type {
            return Err(EngineError::TypeMismatch {
                producer: producer.to_string(),
                output: output.to_string(),
                output_type,
                consumer: consumer.to_string(),
                input: input.to_string(),
                input_type,
            });
        }

        if self
            .connections
            .iter()
            .any(|conn| conn.consumer == consumer_id && conn.input == input_id)
        {
            return Err(EngineError::PortAlreadyConnected {
                module: consumer.to_string(),
                port: input.to_string(),
            });
        }

        if !consumer_node.latches && self.depends_on(producer_id, consumer_id) {
            return Err(EngineError::CycleDetected {
                producer: producer.to_string(),
                consumer: consumer.to_string(),
            });
        }

        self.connections.push(Connection {
            producer: producer_id,
            output: output_id,
            consumer: consumer_id,
            input: input_id,
        });
        self.rebuild_order();
        Ok(())
    }

    /// Removes the edge feeding `consumer:input`, restoring the port default.
    pub fn disconnect(&mut self, consumer: &str, input: &str) -> Result<bool> {
        let consumer_id = self.resolve(consumer)?;
        let input_id = self.node(consumer_id)?.input_id(input)?;

        let before = self.connections.len();
        self.connections
            .retain(|conn| !(conn.consumer == consumer_id && conn.input == input_id));
        let removed = self.connections.len() != before;
        if removed {
            self.reset_input(consumer_id, input_id);
            self.rebuild_order();
        }
        Ok(removed)
    }

    /// Sets an input port's value, e.g. a State's initial parameter.
    pub fn set_param(&mut self, module: &str, port: &str, value: ParamValue) -> Result<()> {
        let id = self.resolve(module)?;
        let node = self.node_mut(id)?;
        let input = node.input_id(port)?;
        let expected = node.inputs.param(input).param_type();
        if value.param_type() != expected {
            return Err(EngineError::InvalidParamValue {
                module: module.to_string(),
                port: port.to_string(),
                reason: format!("expected {expected}, got {}", value.param_type()),
            });
        }
        node.inputs.set(input, value);
        Ok(())
    }

    /// Like [`set_param`](Self::set_param) but converts from JSON using the
    /// port's type.
    pub fn set_param_json(
        &mut self,
        module: &str,
        port: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        let id = self.resolve(module)?;
        let node = self.node(id)?;
        let ty = node.inputs.param(node.input_id(port)?).param_type();
        let value =
            ParamValue::from_json(ty, value).ok_or_else(|| EngineError::InvalidParamValue {
                module: module.to_string(),
                port: port.to_string(),
                reason: format!("`{value}` is not a {ty}"),
            })?;
        self.set_param(module, port, value)
    }

    /// Runs every module exactly once, producers before consumers.
    pub fn evaluate(&mut self, ctx: &FrameContext) {
        for position in 0..self.order.len() {
            let id = self.order[position];
            if !self.is_latching(id) {
                self.pull_inputs(id);
            }
            if let Some(node) = self.nodes.get_mut(id.0) {
                node.module.run(&node.inputs, &mut node.outputs, ctx);
            }
        }

        for position in 0..self.order.len() {
            let id = self.order[position];
            if self.is_latching(id) {
                self.pull_inputs(id);
            }
        }
        self.frames += 1;
    }

    /// Evaluation order of the current topology.
    pub fn processing_order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn module_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0).map(|node| node.name.as_str())
    }

    pub fn module_type(&self, name: &str) -> Option<&str> {
        self.find(name).map(|node| node.module_type.as_str())
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Current value of an output port.
    pub fn output(&self, module: &str, port: &str) -> Option<&ParamValue> {
        self.find(module)?.outputs.by_name(port).map(|param| param.get())
    }

    /// Current value of an input port.
    pub fn input(&self, module: &str, port: &str) -> Option<&ParamValue> {
        self.find(module)?.inputs.by_name(port).map(|param| param.get())
    }

    pub fn inputs_of(&self, module: &str) -> Option<&ParamList> {
        self.find(module).map(|node| &node.inputs)
    }

    pub fn outputs_of(&self, module: &str) -> Option<&ParamList> {
        self.find(module).map(|node| &node.outputs)
    }

    /// First module (in declaration order) of the given component class.
    pub fn find_by_class(&self, component_class: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|node| node.component_class == component_class)
            .map(|node| node.name.as_str())
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of completed [`evaluate`](Self::evaluate) calls.
    pub fn frames_evaluated(&self) -> u64 {
        self.frames
    }

    fn find(&self, name: &str) -> Option<&Node> {
        let id = self.names.get(name)?;
        self.nodes.get(id.0)
    }

    fn resolve(&self, name: &str) -> Result<NodeId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownModule(name.to_string()))
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| EngineError::msg(format!("module slot {} is empty", id.0)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| EngineError::msg(format!("module slot {} is empty", id.0)))
    }

    fn is_latching(&self, id: NodeId) -> bool {
        self.node(id).map(|node| node.latches).unwrap_or(false)
    }

    /// Edges that order evaluation: everything except edges into latches.
    fn dependencies(&self) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(|conn| !self.is_latching(conn.consumer))
    }

    /// True if `from` transitively consumes data produced by `target`,
    /// or is `target` itself.
    fn depends_on(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.extend(
                self.dependencies()
                    .filter(|conn| conn.consumer == id)
                    .map(|conn| conn.producer),
            );
        }
        false
    }

    /// Kahn's algorithm, always taking the lowest ready [`NodeId`].
    fn rebuild_order(&mut self) {
        let mut in_degree: HashMap<NodeId, usize> =
            (0..self.nodes.len()).map(|index| (NodeId(index), 0)).collect();
        for conn in self.dependencies() {
            if let Some(degree) = in_degree.get_mut(&conn.consumer) {
                *degree += 1;
            }
        }

        let mut ready: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(id) = ready.pop_first() {
            order.push(id);
            let consumers: Vec<NodeId> = self
                .dependencies()
                .filter(|conn| conn.producer == id)
                .map(|conn| conn.consumer)
                .collect();
            for consumer in consumers {
                if let Some(degree) = in_degree.get_mut(&consumer) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(consumer);
                    }
                }
            }
        }

        debug_assert_eq!(order.len(), in_degree.len(), "graph contains a cycle");
        self.order = order;
    }

    fn pull_inputs(&mut self, consumer: NodeId) {
        let incoming: Vec<(ParamId, ParamValue)> = self
            .connections
            .iter()
            .filter(|conn| conn.consumer == consumer)
            .filter_map(|conn| {
                let producer = self.nodes.get(conn.producer.0)?;
                Some((conn.input, producer.outputs.get(conn.output).clone()))
            })
            .collect();

        if let Some(node) = self.nodes.get_mut(consumer.0) {
            for (input, value) in incoming {
                node.inputs.set(input, value);
            }
        }
    }

    fn reset_input(&mut self, consumer: NodeId, input: ParamId) {
        if let Ok(node) = self.node_mut(consumer) {
            node.inputs.param_mut(input).reset();
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        for node in &mut self.nodes {
            tracing::debug!(module = %node.name, "destroying module");
            node.module.destroy();
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("modules", &self.names.len())
            .field("connections", &self.connections.len())
            .field("frames", &self.frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        module::ModuleSpecification,
        param::ParamType,
    };

    /// Records its name into a shared log on every run and destroy.
    struct Logger {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Module for Logger {
        fn module_info(&self) -> ModuleSpecification {
            ModuleSpecification {
                identifier: "test;logger".to_string(),
                in_param_spec: "a:float,b:float".to_string(),
                out_param_spec: "out:float".to_string(),
                component_class: "parameters".to_string(),
                ..Default::default()
            }
        }

        fn declare_params(&mut self, inputs: &mut ParamList, outputs: &mut ParamList) {
            inputs.create(ParamType::Float, "a");
            inputs.create(ParamType::Float, "b");
            outputs.create(ParamType::Float, "out");
        }

        fn run(&mut self, inputs: &ParamList, outputs: &mut ParamList, _ctx: &FrameContext) {
            self.log.lock().unwrap().push(self.name.to_string());
            let sum = inputs.iter().map(|p| p.component(0).unwrap()).sum::<f32>() + 1.0;
            outputs.set(ParamId(0), ParamValue::Float(sum));
        }

        fn destroy(&mut self) {
            self.log.lock().unwrap().push(format!("destroy {}", self.name));
        }
    }

    fn logging_graph(names: &[&'static str]) -> (Graph, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = Graph::new();
        for name in names {
            graph
                .add_module_instance(
                    name,
                    Box::new(Logger {
                        name,
                        log: log.clone(),
                    }),
                )
                .unwrap();
        }
        (graph, log)
    }

    fn registry() -> ModuleRegistry {
        ModuleRegistry::builtin().unwrap()
    }

    #[test]
    fn evaluates_producers_before_consumers() {
        let (mut graph, log) = logging_graph(&["c", "b", "a"]);
        graph.connect("a", "out", "b", "a").unwrap();
        graph.connect("b", "out", "c", "a").unwrap();

        graph.evaluate(&FrameContext::default());
        assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
        assert_eq!(graph.output("c", "out"), Some(&ParamValue::Float(3.0)));
    }

    #[test]
    fn independent_modules_run_in_declaration_order() {
        let (mut graph, log) = logging_graph(&["x", "y", "z", "w"]);
        graph.connect("x", "out", "w", "a").unwrap();

        graph.evaluate(&FrameContext::default());
        graph.evaluate(&FrameContext::default());
        assert_eq!(
            *log.lock().unwrap(),
            ["x", "y", "z", "w", "x", "y", "z", "w"]
        );
        assert_eq!(graph.frames_evaluated(), 2);
    }

    #[test]
    fn rejects_cycles_without_changing_the_graph() {
        let (mut graph, log) = logging_graph(&["a", "b", "c"]);
        graph.connect("a", "out", "b", "a").unwrap();
        graph.connect("b", "out", "c", "a").unwrap();

        let err = graph.connect("c", "out", "a", "a").unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { .. }));
        let err = graph.connect("a", "out", "a", "b").unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected { .. }));
        assert_eq!(graph.connections().len(), 2);

        graph.evaluate(&FrameContext::default());
        assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn rejects_type_mismatch_without_partial_connection() {
        let registry = registry();
        let mut graph = Graph::new();
        graph.add_module(&registry, "system;time", "time").unwrap();
        graph
            .add_module(&registry, "maths;converters;float3_to_float", "split")
            .unwrap();

        let err = graph.connect("time", "time", "split", "float3").unwrap_err();
        assert!(matches!(
            err,
            EngineError::TypeMismatch {
                output_type: ParamType::Float,
                input_type: ParamType::Float3,
                ..
            }
        ));
        assert!(graph.connections().is_empty());
        assert_eq!(graph.processing_order().len(), 2);
    }

    #[test]
    fn unknown_ports_and_modules_are_reported() {
        let (mut graph, _) = logging_graph(&["a", "b"]);
        assert!(matches!(
            graph.connect("a", "nope", "b", "a"),
            Err(EngineError::UnknownPort { .. })
        ));
        assert!(matches!(
            graph.connect("a", "out", "ghost", "a"),
            Err(EngineError::UnknownModule(_))
        ));
        assert!(matches!(
            graph.add_module(&registry(), "maths;missing", "m"),
            Err(EngineError::UnknownModuleType(_))
        ));
    }

    #[test]
    fn an_input_accepts_one_producer() {
        let (mut graph, _) = logging_graph(&["a", "b", "c"]);
        graph.connect("a", "out", "c", "a").unwrap();
        assert!(matches!(
            graph.connect("b", "out", "c", "a"),
            Err(EngineError::PortAlreadyConnected { .. })
        ));
    }

    #[test]
    fn broadcast_chain_through_registry() {
        let registry = registry();
        let mut graph = Graph::new();
        graph
            .add_module(&registry, "maths;converters;float_to_float3", "scale")
            .unwrap();
        graph
            .add_module(&registry, "maths;converters;float3_to_float", "split")
            .unwrap();
        graph.connect("scale", "result_float3", "split", "float3").unwrap();
        graph
            .set_param_json("scale", "param1", &serde_json::json!(2.0))
            .unwrap();

        graph.evaluate(&FrameContext::default());
        assert_eq!(
            graph.output("scale", "result_float3"),
            Some(&ParamValue::Float3([2.0, 2.0, 2.0]))
        );
        assert_eq!(graph.output("split", "y"), Some(&ParamValue::Float(2.0)));
    }

    #[test]
    fn repeated_evaluation_is_bit_identical() {
        let registry = registry();
        let mut graph = Graph::new();
        graph
            .add_module(&registry, "maths;oscillators;oscillator", "osc")
            .unwrap();
        graph
            .add_module(&registry, "maths;converters;float_to_float4", "color")
            .unwrap();
        graph.connect("osc", "float", "color", "param1").unwrap();

        let ctx = FrameContext {
            time: 1.234,
            ..Default::default()
        };
        graph.evaluate(&ctx);
        let first = graph.output("color", "result_float4").cloned();
        graph.evaluate(&ctx);
        assert_eq!(graph.output("color", "result_float4").cloned(), first);
    }

    #[test]
    fn delay_closes_a_feedback_loop() {
        // counter = delay(counter) + 1
        let registry = registry();
        let mut graph = Graph::new();
        graph
            .add_module(&registry, "maths;arithmetics;binary;float_add", "add")
            .unwrap();
        graph
            .add_module(&registry, "system;delay;float_delay", "delay")
            .unwrap();
        graph.set_param("add", "param2", ParamValue::Float(1.0)).unwrap();
        graph.connect("delay", "result_float", "add", "param1").unwrap();
        graph.connect("add", "result_float", "delay", "float_in").unwrap();

        let ctx = FrameContext::default();
        for expected in [1.0, 2.0, 3.0] {
            graph.evaluate(&ctx);
            assert_eq!(
                graph.output("add", "result_float"),
                Some(&ParamValue::Float(expected))
            );
        }
    }

    #[test]
    fn set_param_checks_types() {
        let registry = registry();
        let mut graph = Graph::new();
        graph
            .add_module(&registry, "maths;converters;float_to_float3", "scale")
            .unwrap();
        assert!(matches!(
            graph.set_param("scale", "param1", ParamValue::Int(1)),
            Err(EngineError::InvalidParamValue { .. })
        ));
        assert!(graph
            .set_param_json("scale", "param1", &serde_json::json!("loud"))
            .is_err());
    }

    #[test]
    fn disconnect_restores_default() {
        let (mut graph, _) = logging_graph(&["a", "b"]);
        graph.connect("a", "out", "b", "a").unwrap();
        graph.evaluate(&FrameContext::default());
        assert_eq!(graph.input("b", "a"), Some(&ParamValue::Float(1.0)));

        assert!(graph.disconnect("b", "a").unwrap());
        assert_eq!(graph.input("b", "a"), Some(&ParamValue::Float(0.0)));
        assert!(!graph.disconnect("b", "a").unwrap());
    }

    #[test]
    fn teardown_destroys_in_declaration_order() {
        let (mut graph, log) = logging_graph(&["a", "b", "c"]);
        graph.remove_module("b").unwrap();
        assert_eq!(graph.len(), 2);
        drop(graph);

        assert_eq!(*log.lock().unwrap(), ["destroy b", "destroy a", "destroy c"]);
    }

    #[test]
    fn removal_compacts_slots_and_keeps_wiring() {
        let (mut graph, log) = logging_graph(&["a", "b", "c"]);
        graph.connect("a", "out", "c", "a").unwrap();

        for _ in 0..50 {
            graph
                .add_module_instance(
                    "tmp",
                    Box::new(Logger {
                        name: "tmp",
                        log: log.clone(),
                    }),
                )
                .unwrap();
            graph.remove_module("tmp").unwrap();
        }
        graph.remove_module("b").unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.node_id("c"), Some(NodeId(1)));

        log.lock().unwrap().clear();
        graph.evaluate(&FrameContext::default());
        assert_eq!(*log.lock().unwrap(), ["a", "c"]);
        assert_eq!(graph.output("c", "out"), Some(&ParamValue::Float(2.0)));
        assert_eq!(graph.module_name(graph.processing_order()[1]), Some("c"));
    }

    #[test]
    fn finds_screen_by_component_class() {
        let registry = registry();
        let mut graph = Graph::new();
        graph.add_module(&registry, "system;time", "time").unwrap();
        graph.add_module(&registry, "outputs;screen", "screen0").unwrap();
        assert_eq!(graph.find_by_class("screen"), Some("screen0"));
        assert_eq!(graph.module_type("screen0"), Some("outputs;screen"));
    }
}
