use anyhow::{Context, Result};
use clap::Parser;
use cuesync::sources::{process_analysis, validate_track_id, RawAnalysis, RawFeatures};
use log::{info, warn};
use std::path::{Path, PathBuf};

const PITCH_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

#[derive(Parser)]
#[command(name = "cue-tool")]
#[command(about = "Convert a raw audio analysis into a cue timeline file and print its statistics")]
struct Args {
    /// Raw analysis JSON as returned by the audio-analysis endpoint
    #[arg()]
    input_file: PathBuf,

    /// Output timeline file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for <track_id>.json when no --output is given
    #[arg(long, default_value = "timelines")]
    timeline_dir: PathBuf,

    /// Track id to record; defaults to the input file stem
    #[arg(long)]
    track_id: Option<String>,

    /// Audio features JSON for tempo and energy
    #[arg(long)]
    features: Option<PathBuf>,

    /// Print statistics only
    #[arg(long)]
    dry_run: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let track_id = match &args.track_id {
        Some(id) => id.trim().to_string(),
        None => args
            .input_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "track".to_string()),
    };
    if validate_track_id(&track_id).is_err() {
        warn!("{:?} is not a remote track id; the timeline only works with local providers", track_id);
    }

    info!("Input file: {}", args.input_file.display());
    let raw: RawAnalysis = read_json(&args.input_file)?;
    let features: Option<RawFeatures> = args.features.as_deref().map(read_json::<RawFeatures>).transpose()?;

    let raw_beats = raw.beats.len();
    let raw_segments = raw.segments.len();
    let processed = process_analysis(&track_id, raw, features);
    let stats = processed.stats();

    println!("=== {} ===", track_id);
    println!("Duration:  {:.2}s", processed.duration);
    println!("Tempo:     {:.1} bpm (sections average {:.1})", processed.tempo, stats.average_tempo);
    println!("Energy:    {:.2}", processed.energy);
    println!("Beats:     {} (of {})", stats.beats, raw_beats);
    println!("Segments:  {} (of {})", stats.segments, raw_segments);
    println!("Sections:  {}", stats.sections);
    println!(
        "Dominant pitch class: {}",
        stats.dominant_pitch.map_or("none", |pitch| PITCH_NAMES[pitch])
    );

    if args.dry_run {
        return Ok(());
    }

    let output = match &args.output {
        Some(path) => path.clone(),
        None => {
            std::fs::create_dir_all(&args.timeline_dir)?;
            args.timeline_dir.join(format!("{}.json", track_id))
        }
    };
    if output == args.input_file {
        anyhow::bail!("Refusing to overwrite the input file {}", output.display());
    }

    let json = serde_json::to_string_pretty(&processed)?;
    std::fs::write(&output, &json).with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {} ({} bytes)", output.display(), json.len());
    Ok(())
}
