use crate::{
    graph::Graph,
    modules::outputs::SCREEN_CLASS,
    param::{ParamValue, TextureId},
    Result,
};

/// What the render collaborator needs from one evaluated frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub frame: u64,
    pub state: Option<usize>,
    pub clear_color: [f32; 4],
    pub gamma_correction: f32,
    pub texture: Option<TextureId>,
}

impl RenderFrame {
    /// Frame drawn while no State is active.
    pub fn blank(frame: u64) -> Self {
        Self {
            frame,
            state: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            gamma_correction: 1.0,
            texture: None,
        }
    }

    /// Reads the screen sink of `graph`, if it has one.
    pub fn from_graph(graph: &Graph, state: usize, frame: u64) -> Self {
        let mut out = Self {
            state: Some(state),
            ..Self::blank(frame)
        };
        let Some(inputs) = graph
            .find_by_class(SCREEN_CLASS)
            .and_then(|screen| graph.inputs_of(screen))
        else {
            return out;
        };

        for param in inputs.iter() {
            match (param.name(), param.get()) {
                ("clear_color", ParamValue::Float4(color)) => out.clear_color = *color,
                ("gamma_correction", ParamValue::Float(gamma)) => out.gamma_correction = *gamma,
                ("texture", ParamValue::Texture(texture)) => out.texture = *texture,
                _ => {}
            }
        }
        out
    }
}

/// Rendering backend seam. Graphics-context work lives behind this.
pub trait RenderTarget {
    fn present(&mut self, frame: &RenderFrame) -> Result<()>;
}

/// Keeps the last presented frame; used by the headless player and tests.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    last: Option<RenderFrame>,
    presented: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.last.as_ref()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl RenderTarget for HeadlessRenderer {
    fn present(&mut self, frame: &RenderFrame) -> Result<()> {
        self.last = Some(frame.clone());
        self.presented += 1;
        Ok(())
    }
}
