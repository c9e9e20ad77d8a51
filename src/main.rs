use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cuesync::audio::{BandSampler, SilentSampler, WavBandSampler};
use cuesync::sources::{CachedCueProvider, CueProvider, FileCueProvider, LocalClockSource, RemoteClient, TrackInfo};
use cuesync::ui::TerminalOverlay;
use cuesync::{SessionConfig, SessionRunner};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cuesync")]
#[command(about = "Audio-reactive parameters synchronized to remote playback and cue timelines")]
struct Args {
    /// Session config file (JSON); missing fields use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective config to this file before starting
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Poll the remote playback API instead of the local demo clock
    #[arg(long, conflicts_with = "demo")]
    remote: bool,

    /// Local demo clock with timelines from --timeline-dir (the default)
    #[arg(long)]
    demo: bool,

    /// API access token for --remote
    #[arg(long, env = "CUESYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Directory holding <track_id>.json timeline files (demo mode)
    #[arg(long, default_value = "timelines")]
    timeline_dir: PathBuf,

    /// Track id the demo clock pretends to play
    #[arg(long, default_value = "demo")]
    track: String,

    /// Demo track length in seconds
    #[arg(long, default_value = "240")]
    track_seconds: f64,

    /// Start the demo clock this many seconds into the track
    #[arg(long, default_value = "0")]
    start_at: f64,

    /// WAV file to sample frequency bands from
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Number of frequency bins produced from the WAV file
    #[arg(long, default_value = "64")]
    bins: usize,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    seconds: Option<f64>,

    /// Redraw the terminal overlay every N frames (0 = off)
    #[arg(long, default_value = "30")]
    overlay_every: u32,

    /// Skip the in-memory analysis cache
    #[arg(long)]
    no_cache: bool,

    #[arg(long)]
    poll_interval_ms: Option<u64>,

    #[arg(long)]
    lookahead_ms: Option<f64>,

    #[arg(long)]
    smoothing: Option<f32>,

    /// Band sensitivity (0.1 = very low, 5.0 = very high)
    #[arg(long)]
    sensitivity: Option<f32>,
}

impl Args {
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(poll_interval_ms) = self.poll_interval_ms {
            config.poll_interval_ms = poll_interval_ms;
        }
        if let Some(lookahead_ms) = self.lookahead_ms {
            config.lookahead_ms = lookahead_ms;
        }
        if let Some(smoothing) = self.smoothing {
            config.smoothing = smoothing;
        }
        if let Some(sensitivity) = self.sensitivity {
            config.set_sensitivity(sensitivity);
        }

        config.validate()?;
        Ok(config)
    }
}

fn cached<P: CueProvider + 'static>(provider: P, config: &SessionConfig, no_cache: bool) -> Arc<dyn CueProvider> {
    if no_cache {
        Arc::new(provider)
    } else {
        Arc::new(CachedCueProvider::new(provider, config.cache_max_age()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = args.session_config()?;
    if let Some(path) = &args.save_config {
        config.save(path)?;
        info!("Saved config to {}", path.display());
    }

    let sampler: Box<dyn BandSampler> = match &args.wav {
        Some(path) => Box::new(
            WavBandSampler::open(path, args.bins).with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(SilentSampler),
    };

    let time_limit = match args.seconds {
        Some(seconds) if seconds > 0.0 => Some(Duration::from_secs_f64(seconds)),
        Some(seconds) => return Err(anyhow!("--seconds must be positive, got {}", seconds)),
        None => None,
    };

    let mut overlay = TerminalOverlay::new(args.overlay_every);

    let summary = if args.remote {
        let token = args
            .token
            .clone()
            .ok_or_else(|| anyhow!("--remote needs an access token (--token or CUESYNC_TOKEN)"))?;
        info!("Polling remote playback at {}", config.remote.api_base_url);

        let source = RemoteClient::new(token.clone(), &config.remote)?;
        let provider = cached(RemoteClient::new(token, &config.remote)?, &config, args.no_cache);
        let mut runner = SessionRunner::new(config, provider).with_sampler(sampler);
        if let Some(limit) = time_limit {
            runner = runner.with_time_limit(limit);
        }
        runner.run(source, &mut overlay).await?
    } else {
        info!(
            "Demo mode{}: track {} with timelines from {}",
            if args.demo { "" } else { " (default)" },
            args.track,
            args.timeline_dir.display()
        );
        let track = TrackInfo {
            id: args.track.clone(),
            name: args.track.clone(),
            artist: "Local".to_string(),
            album: "Demo".to_string(),
            album_art: None,
            duration_ms: (args.track_seconds.max(0.0) * 1000.0) as u64,
        };
        let source = LocalClockSource::new(track).starting_at(Duration::from_secs_f64(args.start_at.max(0.0)));
        let provider = cached(FileCueProvider::new(&args.timeline_dir), &config, args.no_cache);
        let mut runner = SessionRunner::new(config, provider).with_sampler(sampler);
        if let Some(limit) = time_limit {
            runner = runner.with_time_limit(limit);
        }
        runner.run(source, &mut overlay).await?
    };

    info!("Session summary:\n{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
