use std::{f32::consts::TAU, path::PathBuf, sync::Arc};

use audiovisual_core::{
    AppConfig, AudioConfig, Command, FrameInput, HeadlessRenderer, ModuleRegistry, Recorder,
    RenderTarget, Sequencer, SpectrumAnalyser, StateCollection, Timeline,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> audiovisual_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => run_play(args),
        Commands::Modules { prefix } => run_modules(prefix.as_deref().unwrap_or("")),
    }
}

fn run_play(args: PlayArgs) -> audiovisual_core::Result<()> {
    tracing::info!(states = ?args.states, frames = args.frames, fps = args.fps, "starting player");

    let config = args
        .config
        .as_deref()
        .map(AppConfig::load_or_default)
        .unwrap_or_default();

    let registry = Arc::new(ModuleRegistry::builtin()?);
    let states = StateCollection::load_dir(&args.states)?;

    let mut timeline = args
        .file
        .as_deref()
        .map(Timeline::load_or_empty)
        .unwrap_or_default();
    if args.randomize {
        timeline = timeline.ignore_presets();
    }
    let randomizer = args.randomize && timeline.is_empty();

    let mut recording = config.recording.clone();
    if let Some(output) = args.output {
        recording.output_dir = Some(output);
    }

    let mut sequencer = Sequencer::new(registry, states, config.sequencer.clone())
        .with_timeline(timeline)
        .with_recorder(Recorder::new(recording));
    if let Some(dir) = args.preferences {
        sequencer.set_preferences_dir(dir);
    }
    if let Err(err) = sequencer.start() {
        tracing::warn!(%err, "no initial state");
    }
    if randomizer {
        sequencer.toggle_randomizer();
    }
    if let Some(index) = args.force_state {
        sequencer.force_state(index);
    }

    let delta_seconds = 1.0 / args.fps.max(1.0);
    let mut analyser = SpectrumAnalyser::new(config.audio.sample_rate);
    let mut renderer = HeadlessRenderer::new();
    let mut keys = args.keys;
    keys.sort_by_key(|press| press.frame);
    let mut keys = keys.into_iter().peekable();

    for frame in 1..=args.frames {
        while let Some(press) = keys.next_if(|press| press.frame <= frame) {
            tracing::debug!(frame, command = ?press.command, "key press");
            sequencer.push_command(press.command);
        }

        let block = synth_block(&config.audio, frame);
        let audio = analyser.analyse(&block)?;
        let report = sequencer.tick(&FrameInput {
            delta_seconds,
            audio,
        });
        renderer.present(&sequencer.render_frame())?;

        if let Some(state) = report.switched_to {
            let name = sequencer.states().get(state).map(|state| state.name().to_string());
            tracing::info!(
                frame,
                state,
                name = name.as_deref(),
                mode = ?sequencer.mode(),
                "switched state"
            );
        }
        if let Some(capture) = &report.capture {
            tracing::info!(frame = capture.frame, path = ?capture.path, "capture frame");
        }
        if report.shutdown_requested {
            break;
        }
    }

    sequencer.shutdown()?;
    tracing::info!(
        frames = renderer.presented(),
        total_time = sequencer.total_time(),
        message = sequencer.system_message(),
        "player finished"
    );
    Ok(())
}

fn run_modules(prefix: &str) -> audiovisual_core::Result<()> {
    let registry = ModuleRegistry::builtin()?;
    for identifier in registry.list(prefix) {
        let Some(spec) = registry.specification(identifier) else {
            continue;
        };
        println!("{identifier}");
        println!("    {}", spec.description);
        println!("    in:  {}", one_line(&spec.in_param_spec));
        println!("    out: {}", one_line(&spec.out_param_spec));
    }
    Ok(())
}

fn one_line(spec: &str) -> String {
    let tokens: Vec<&str> = spec
        .split([',', '\n'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect();
    if tokens.is_empty() {
        "-".to_string()
    } else {
        tokens.join(", ")
    }
}

/// A sweeping test tone with a slow beat, standing in for captured audio.
fn synth_block(audio: &AudioConfig, frame: u64) -> Vec<f32> {
    let sample_rate = audio.sample_rate.max(1) as f32;
    let block = audio.block_size.max(2);
    let t0 = (frame as f32 * block as f32) / sample_rate;
    let freq = 55.0 * 2f32.powf(4.0 * (0.5 + 0.5 * (t0 * 0.1).sin()));
    let gain = 0.5 + 0.4 * (t0 * TAU * 0.5).sin();
    (0..block)
        .map(|i| {
            let t = t0 + i as f32 / sample_rate;
            gain * (TAU * freq * t).sin()
        })
        .collect()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// A scripted key press, `frame:key` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyPress {
    frame: u64,
    command: Command,
}

fn parse_key_press(value: &str) -> Result<KeyPress, String> {
    let (frame, key) = value
        .split_once(':')
        .ok_or_else(|| format!("expected `frame:key`, got `{value}`"))?;
    let frame = frame
        .trim()
        .parse::<u64>()
        .map_err(|err| format!("invalid frame `{frame}`: {err}"))?;
    let command = command_for_key(key.trim()).ok_or_else(|| format!("unknown key `{key}`"))?;
    Ok(KeyPress { frame, command })
}

/// Player key bindings.
fn command_for_key(key: &str) -> Option<Command> {
    let command = match key.to_ascii_lowercase().as_str() {
        "escape" | "esc" => Command::Shutdown,
        "pageup" => Command::SpeedUp,
        "pagedown" => Command::SpeedDown,
        "up" => Command::FxLevelUp,
        "down" => Command::FxLevelDown,
        "left" => Command::PrevState,
        "right" => Command::NextState,
        "r" => Command::ToggleRandomizer,
        "ctrl+r" => Command::RandomState,
        _ => return None,
    };
    Some(command)
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless audiovisual state player", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the States in a directory.
    Play(PlayArgs),
    /// List the module catalog.
    Modules {
        /// Only list identifiers under this `;`-separated path.
        prefix: Option<String>,
    },
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Directory holding State files.
    #[arg(short, long, default_value = "states")]
    states: PathBuf,
    /// Timeline file with state-change boundaries.
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Randomize every timeline boundary; without a timeline, start in randomizer mode.
    #[arg(short, long)]
    randomize: bool,
    /// Select this State once and hold it.
    #[arg(long)]
    force_state: Option<usize>,
    /// Directory for captured frames.
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = 600)]
    frames: u64,
    #[arg(long, default_value_t = 60.0)]
    fps: f64,
    /// Where fx levels are stored between runs.
    #[arg(short, long)]
    preferences: Option<PathBuf>,
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Scripted key press, e.g. `120:right` or `300:ctrl+r`. Repeatable.
    #[arg(short, long = "key", value_parser = parse_key_press)]
    keys: Vec<KeyPress>,
}
