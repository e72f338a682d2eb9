use crate::param::ParamType;

/// Result alias that carries the custom [`EngineError`] type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Common error type for the core crate.
///
/// None of these are fatal to the process. Structural errors surface while a
/// State's graph is being built and leave the sequencer on its previous State.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Registry lookup miss while constructing a graph.
    #[error("unknown module type `{0}`")]
    UnknownModuleType(String),
    /// The same identifier was registered twice.
    #[error("module type `{0}` is already registered")]
    DuplicateModuleType(String),
    /// Producer and consumer ports carry different value types.
    #[error("cannot connect {producer}:{output} ({output_type}) to {consumer}:{input} ({input_type})")]
    TypeMismatch {
        producer: String,
        output: String,
        output_type: ParamType,
        consumer: String,
        input: String,
        input_type: ParamType,
    },
    /// The requested edge would close a data cycle.
    #[error("connecting {producer} -> {consumer} would create a cycle")]
    CycleDetected { producer: String, consumer: String },
    /// Component index outside of a vector port.
    #[error("component index {index} out of range for a {len}-component value")]
    OutOfRange { index: usize, len: usize },
    #[error("no module named `{0}` in graph")]
    UnknownModule(String),
    #[error("graph already contains a module named `{0}`")]
    DuplicateModule(String),
    #[error("module `{module}` has no {direction} port `{port}`")]
    UnknownPort {
        module: String,
        port: String,
        direction: &'static str,
    },
    #[error("input {module}:{port} is already connected")]
    PortAlreadyConnected { module: String, port: String },
    #[error("invalid value for {module}:{port}: {reason}")]
    InvalidParamValue {
        module: String,
        port: String,
        reason: String,
    },
    /// Malformed `name:type` port specification.
    #[error("invalid param spec: {0}")]
    InvalidSpec(String),
    /// A State could not be turned into a running graph.
    #[error("state `{state}` failed to load: {source}")]
    StateLoad {
        state: String,
        #[source]
        source: Box<EngineError>,
    },
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
}

impl EngineError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn state_load(state: impl Into<String>, source: EngineError) -> Self {
        Self::StateLoad {
            state: state.into(),
            source: Box::new(source),
        }
    }
}

impl From<&str> for EngineError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for EngineError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
