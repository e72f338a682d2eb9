//! Core library for the audiovisual player.
//!
//! Visual content is a set of saved module graphs ("States"). Each graph is
//! made of modules with typed input and output ports, evaluated once per
//! frame in dependency order. The [`Sequencer`] decides which State is live:
//! sequentially on user command, from a scripted [`Timeline`], on a random
//! interval, or once from a forced selection.

pub mod config;
pub mod error;
pub mod fx;
pub mod graph;
pub mod module;
pub mod modules;
pub mod param;
pub mod record;
pub mod registry;
pub mod render;
pub mod sequencer;
pub mod sound;
pub mod state;
pub mod timeline;

pub use config::{AppConfig, AudioConfig, SequencerConfig};
pub use error::{EngineError, Result};
pub use fx::{fx_load, fx_save, FX_LEVELS_FILE};
pub use graph::{Connection, Graph, NodeId};
pub use module::{parse_param_spec, FrameContext, Module, ModuleSpecification};
pub use param::{ParamDirection, ParamId, ParamList, ParamType, ParamValue, TextureId};
pub use record::{CaptureRequest, Recorder, RecordingSettings};
pub use registry::{ModuleConstructor, ModuleRegistry, ModuleRegistryBuilder};
pub use render::{HeadlessRenderer, RenderFrame, RenderTarget};
pub use sequencer::{Command, FrameInput, FrameReport, PlaybackMode, Sequencer};
pub use sound::{AudioFrame, SpectrumAnalyser, OCTAVE_BANDS};
pub use state::{State, StateCollection, StateDefinition};
pub use timeline::{Boundary, PlaybackClock, Timeline, TimelineCue};
