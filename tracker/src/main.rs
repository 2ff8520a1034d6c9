//! GazeHome tracker - replay or simulate feature streams through the gaze
//! pipeline and print one JSON event per frame.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use gazehome_tracker::calibration::{CalibrationSession, PointLayout};
use gazehome_tracker::clock::{Clock, SystemClock, TestClock};
use gazehome_tracker::feature_source::{FeatureSource, RecordingSource, ScriptedFeatureSource};
use gazehome_tracker::filter::FilterKind;
use gazehome_tracker::gaze_loop::GazeLoop;
use gazehome_tracker::model::{ModelKind, TrainedModel};
use gazehome_tracker::screen::ScreenSize;
use gazehome_tracker::simulate::{self, SimulatedFeatureSource, SimulatedGazeMode, SimulatedUser};
use gazehome_tracker::TrackerConfig;

#[derive(Parser, Debug)]
#[command(name = "gazehome-tracker", about = "Webcam gaze tracking pipeline", version)]
struct Cli {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Regression model: ridge, elastic-net, svr, or mlp
    #[arg(long)]
    model_kind: Option<String>,

    /// Smoothing filter: none, kalman, kde, or ema
    #[arg(long)]
    filter: Option<String>,

    /// Screen resolution (WxH)
    #[arg(long)]
    screen: Option<String>,

    /// Replay a JSON-lines feature trace instead of simulating
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Generate a synthetic stream: pattern or random-walk
    #[arg(long)]
    simulate: Option<String>,

    /// Record the polled frames to a JSON-lines trace for later replay
    #[arg(long)]
    record: Option<PathBuf>,

    /// Stop after N frames
    #[arg(long)]
    frames: Option<u64>,

    /// Calibrate against the simulated user before running
    #[arg(long)]
    calibrate: bool,

    /// Calibration layout: five or nine
    #[arg(long)]
    layout: Option<String>,

    /// Frames captured per calibration point
    #[arg(long, default_value = "10")]
    samples_per_point: usize,

    /// Load a saved model instead of calibrating
    #[arg(long)]
    load_model: Option<PathBuf>,

    /// Save the calibrated model
    #[arg(long)]
    save_model: Option<PathBuf>,

    /// Run on virtual time instead of pacing to the wall clock
    #[arg(long)]
    virtual_time: bool,

    /// Seed for the simulated user and stream
    #[arg(long)]
    seed: Option<u64>,
}

fn apply_overrides(config: &mut TrackerConfig, cli: &Cli) -> anyhow::Result<()> {
    if let Some(s) = &cli.model_kind {
        config.model.kind = ModelKind::from_str(s)
            .with_context(|| format!("unknown model kind '{s}'"))?;
    }
    if let Some(s) = &cli.filter {
        config.filter.kind =
            FilterKind::from_str(s).with_context(|| format!("unknown filter '{s}'"))?;
    }
    if let Some(s) = &cli.screen {
        config.screen =
            ScreenSize::parse(s).with_context(|| format!("invalid screen resolution '{s}'"))?;
    }
    if let Some(s) = &cli.layout {
        config.calibration.layout =
            PointLayout::from_str(s).with_context(|| format!("unknown layout '{s}'"))?;
    }
    if let Some(s) = &cli.simulate {
        config.simulation.mode = SimulatedGazeMode::from_str(s)
            .with_context(|| format!("unknown simulation mode '{s}'"))?;
    }
    if let Some(seed) = cli.seed {
        config.simulation.seed = seed;
    }
    config.validate()
}

/// Run the loop and print one JSON event per line on stdout.
fn emit_events(
    gaze_loop: &mut GazeLoop,
    source: &mut dyn FeatureSource,
    frames: Option<u64>,
) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut write_err = None;
    gaze_loop.run(source, frames, |event| {
        if write_err.is_some() {
            return;
        }
        let written = serde_json::to_writer(&mut out, event)
            .map_err(anyhow::Error::from)
            .and_then(|()| out.write_all(b"\n").map_err(anyhow::Error::from));
        if let Err(err) = written {
            write_err = Some(err);
        }
    });
    if let Some(err) = write_err {
        return Err(err.context("writing events"));
    }
    out.flush().context("flushing events")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries events, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gazehome_tracker=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("gazehome-tracker v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    apply_overrides(&mut config, &cli)?;

    let clock: Arc<dyn Clock> = if cli.virtual_time {
        Arc::new(TestClock::new())
    } else {
        Arc::new(SystemClock)
    };
    let mut gaze_loop = GazeLoop::new(
        config.screen,
        config.gaze_loop.clone(),
        config.build_filter()?,
        config.interaction.clone(),
        clock,
    );

    if let Some(path) = &cli.load_model {
        let model = TrainedModel::load(path)?;
        gaze_loop.replace_model(model, None);
    } else if cli.calibrate {
        let mut session = CalibrationSession::new(
            config.calibration.clone(),
            config.model.clone(),
            config.filter.kind,
        );
        let mut user = SimulatedUser::new(config.screen, config.simulation.seed);
        let outcome = simulate::run_calibration(
            &mut session,
            &mut user,
            &config.calibration.layout,
            cli.samples_per_point,
        )
        .context("simulated calibration failed")?;
        if let Some(path) = &cli.save_model {
            outcome.model.save(path)?;
        }
        gaze_loop.replace_model(outcome.model, outcome.tuning);
    }

    let mut source: Box<dyn FeatureSource> = match (&cli.trace, &cli.simulate) {
        (Some(path), _) => {
            let file =
                File::open(path).with_context(|| format!("opening trace {}", path.display()))?;
            Box::new(ScriptedFeatureSource::from_json_lines(BufReader::new(file))?)
        }
        (None, Some(_)) => Box::new(SimulatedFeatureSource::new(
            config.screen,
            config.simulation.clone(),
        )),
        (None, None) => bail!("no feature source: pass --trace or --simulate"),
    };
    if cli.trace.is_none() && cli.frames.is_none() {
        info!("simulated stream is endless; stop with Ctrl-C or pass --frames");
    }

    match &cli.record {
        Some(path) => {
            let mut recording = RecordingSource::new(source);
            emit_events(&mut gaze_loop, &mut recording, cli.frames)?;
            let file = File::create(path)
                .with_context(|| format!("creating trace {}", path.display()))?;
            recording.write_json_lines(BufWriter::new(file))?;
            info!(path = %path.display(), frames = recording.recorded().len(), "Trace recorded");
        }
        None => emit_events(&mut gaze_loop, source.as_mut(), cli.frames)?,
    }
    Ok(())
}
