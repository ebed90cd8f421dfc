//! voxmix - command-line renderer
//!
//! Renders a voice recording through the effect chain or the full mix and
//! writes the result to a WAV (by extension) or raw s16le file. Also
//! transcodes single files and crops, measures or joins PCM files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxmix_common::Config;
use voxmix_engine::audio::{pcm_tools, VoiceInput};
use voxmix_engine::engine::render_to;
use voxmix_engine::session::{Pipeline, Session};
use voxmix_engine::{AudioEngine, EngineConfig, RenderOutcome, SessionSpec};

/// Command-line arguments for voxmix
#[derive(Parser, Debug)]
#[command(name = "voxmix")]
#[command(about = "Voice effects and background mix renderer")]
#[command(version)]
struct Cli {
    /// Engine tuning file (TOML)
    #[arg(long, global = true, env = "VOXMIX_ENGINE_CONFIG")]
    engine_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the voice effect chain
    Effects(RenderArgs),
    /// Mix the voice with background beds and music
    Mix(RenderArgs),
    /// Parse and validate a mix document without rendering
    Validate {
        /// Mix document (JSON)
        config: PathBuf,
    },
    /// Decode any supported file to WAV or raw s16le
    Decode {
        input: PathBuf,
        /// Output file (.wav for WAV, anything else for raw s16le)
        output: PathBuf,
        #[arg(long, default_value = "44100")]
        sample_rate: u32,
        #[arg(long, default_value = "2")]
        channels: u16,
    },
    /// Print the playing time of a WAV or raw s16le file in milliseconds
    Duration {
        path: PathBuf,
        #[command(flatten)]
        layout: PcmLayout,
    },
    /// Copy a time range of a WAV or raw s16le file
    Crop {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value = "0")]
        start_ms: u64,
        /// End of the range; omitted runs to the end of the file
        #[arg(long)]
        end_ms: Option<u64>,
        #[command(flatten)]
        layout: PcmLayout,
    },
    /// Join raw s16le files that share one layout
    Concat {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

/// Layout of a headerless PCM file; ignored for WAV files.
#[derive(Args, Debug)]
struct PcmLayout {
    #[arg(long, default_value = "44100")]
    sample_rate: u32,
    #[arg(long, default_value = "1")]
    channels: u16,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Voice recording (raw s16le for .pcm/.raw, any supported container otherwise)
    #[arg(short, long)]
    voice: PathBuf,

    /// Voice sample rate in Hz
    #[arg(long, default_value = "44100")]
    sample_rate: u32,

    /// Voice channel count
    #[arg(long, default_value = "1")]
    channels: u16,

    /// Mix document (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Output file (.wav for WAV, anything else for raw s16le)
    #[arg(short, long)]
    output: PathBuf,

    /// Start rendering at this position
    #[arg(long, default_value = "0")]
    seek_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxmix_engine=info,voxmix=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { config } => validate(&config),
        Command::Effects(args) => {
            let engine = build_engine(cli.engine_config.as_deref())?;
            let spec = load_spec(&args)?;
            engine
                .effects_init(&spec)
                .context("Failed to initialize effects session")?;
            run(Arc::clone(engine.effects_session()), args).await
        }
        Command::Mix(args) => {
            let engine = build_engine(cli.engine_config.as_deref())?;
            let spec = load_spec(&args)?;
            engine
                .mixer_init(&spec)
                .context("Failed to initialize mix session")?;
            run(Arc::clone(engine.mix_session()), args).await
        }
        Command::Decode {
            input,
            output,
            sample_rate,
            channels,
        } => {
            let engine = Arc::new(build_engine(cli.engine_config.as_deref())?);
            decode(engine, input, output, sample_rate, channels).await
        }
        Command::Duration { path, layout } => {
            let ms = if pcm_tools::is_wav_path(&path) {
                pcm_tools::wav_duration_ms(&path)
            } else {
                pcm_tools::pcm_duration_ms(&path, layout.sample_rate, layout.channels)
            }
            .with_context(|| format!("Failed to measure {}", path.display()))?;
            println!("{}", ms);
            Ok(())
        }
        Command::Crop {
            input,
            output,
            start_ms,
            end_ms,
            layout,
        } => {
            let frames = if pcm_tools::is_wav_path(&input) {
                pcm_tools::crop_wav(&input, &output, start_ms, end_ms)
            } else {
                pcm_tools::crop_pcm(
                    &input,
                    &output,
                    layout.sample_rate,
                    layout.channels,
                    start_ms,
                    end_ms,
                )
            }
            .with_context(|| format!("Failed to crop {}", input.display()))?;
            info!("Wrote {} frames to {}", frames, output.display());
            Ok(())
        }
        Command::Concat { output, inputs } => {
            let bytes = pcm_tools::concat_pcm(inputs.as_slice(), &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Wrote {} bytes to {}", bytes, output.display());
            Ok(())
        }
    }
}

fn build_engine(path: Option<&Path>) -> Result<AudioEngine> {
    let engine_config =
        EngineConfig::resolve(path).context("Failed to load engine configuration")?;
    Ok(AudioEngine::new(engine_config))
}

fn load_spec(args: &RenderArgs) -> Result<SessionSpec> {
    let voice = VoiceInput::new(&args.voice, args.sample_rate, args.channels);
    SessionSpec::from_config_path(voice, &args.config)
        .with_context(|| format!("Failed to load mix document {}", args.config.display()))
}

fn validate(path: &Path) -> Result<()> {
    let config = Config::from_path(path)
        .with_context(|| format!("Invalid mix document {}", path.display()))?;
    info!("{} is valid: {}", path.display(), config.summary());
    println!("{}", config.to_json());
    Ok(())
}

/// Render on a blocking worker while this task logs progress every 100 ms
/// and turns Ctrl+C into `stop()`.
async fn run<P: Pipeline>(session: Arc<Session<P>>, args: RenderArgs) -> Result<()> {
    if args.seek_ms > 0 {
        session
            .seek_to(args.seek_ms)
            .with_context(|| format!("Failed to seek to {} ms", args.seek_ms))?;
    }

    let handle = session.handle();
    let output = args.output.clone();
    let worker = tokio::task::spawn_blocking(move || render_to(&session, &output));
    tokio::pin!(worker);

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut last_reported = None;

    let outcome = loop {
        tokio::select! {
            result = &mut worker => {
                break result
                    .context("Render worker panicked")?
                    .with_context(|| format!("Failed to render {}", args.output.display()))?;
            }
            _ = ticker.tick() => {
                let progress = handle.progress();
                if last_reported.map_or(true, |last| progress >= last + 10 || progress == 100) && last_reported != Some(progress) {
                    info!("Progress: {}%", progress);
                    last_reported = Some(progress);
                }
            }
            _ = signal::ctrl_c() => {
                warn!("Received Ctrl+C, stopping render");
                handle.stop();
            }
        }
    };

    match outcome {
        RenderOutcome::Completed => {
            info!("Wrote {}", args.output.display());
            Ok(())
        }
        RenderOutcome::Stopped => bail!(
            "Render stopped at {}%; partial output left in {}",
            handle.progress(),
            args.output.display()
        ),
    }
}

/// Transcode on a blocking worker; Ctrl+C stops it and keeps the partial file.
async fn decode(
    engine: Arc<AudioEngine>,
    input: PathBuf,
    output: PathBuf,
    sample_rate: u32,
    channels: u16,
) -> Result<()> {
    let worker = {
        let engine = Arc::clone(&engine);
        let input = input.clone();
        let output = output.clone();
        tokio::task::spawn_blocking(move || {
            engine.decode_to_file(&input, &output, sample_rate, channels)
        })
    };
    tokio::pin!(worker);

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut last_reported = 0;
    let outcome = loop {
        tokio::select! {
            result = &mut worker => {
                break result
                    .context("Decode worker panicked")?
                    .with_context(|| format!("Failed to decode {}", input.display()))?;
            }
            _ = ticker.tick() => {
                let progress = engine.decode_progress();
                if progress >= last_reported + 10 {
                    info!("Progress: {}%", progress);
                    last_reported = progress;
                }
            }
            _ = signal::ctrl_c() => {
                warn!("Received Ctrl+C, stopping decode");
                engine.stop_decode();
            }
        }
    };

    match outcome {
        RenderOutcome::Completed => {
            info!("Wrote {}", output.display());
            Ok(())
        }
        RenderOutcome::Stopped => bail!(
            "Decode stopped at {}%; partial output left in {}",
            engine.decode_progress(),
            output.display()
        ),
    }
}
