use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use scan_capture::{
    Enhancer, EnhancerConfig, FitMode, HasRecoverySuggestion, PatternProvider, Region,
    SourceProvider, SourceRequest, StillImageProvider,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run the frame acquisition pipeline against a synthetic camera or a still
/// image and save the newest buffered frame.
#[derive(Parser, Debug)]
#[command(name = "scancap")]
#[command(about = "Capture scan-region frames into a bounded buffer and save the latest one")]
#[command(long_about = "Open a capture source, poll it on a fixed interval, crop every frame to the scan region
as seen through the video container, and write the newest buffered frame to a PNG file.
Log verbosity follows RUST_LOG (e.g. RUST_LOG=scan_capture=debug).")]
struct Args {
    /// Output PNG path
    #[arg(short, long, default_value = "frame.png")]
    output: PathBuf,

    /// JSON config file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a still image instead of the synthetic camera
    #[arg(long)]
    image: Option<PathBuf>,

    /// Synthetic camera resolution
    #[arg(long, default_value = "1280x720", value_parser = parse_size)]
    size: (u32, u32),

    /// Synthetic camera device id
    #[arg(long)]
    device: Option<String>,

    /// How long to run: 500ms, 2s, 1m
    #[arg(short, long, default_value = "1s", value_parser = parse_duration)]
    duration: Duration,

    /// Fetching loop period in milliseconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Frame buffer capacity
    #[arg(short, long)]
    buffer: Option<usize>,

    /// Overflow policy: 0 ring, -1 latch, >0 rate limit in ms
    #[arg(short, long, allow_hyphen_values = true)]
    refresh: Option<i64>,

    /// How the video fills its container
    #[arg(short, long, value_enum)]
    fit: Option<FitMode>,

    /// Container size in display pixels
    #[arg(long, value_parser = parse_size)]
    container: Option<(u32, u32)>,

    /// Scan region: left,top,right,bottom with optional % or px suffix
    #[arg(long)]
    region: Option<Region>,

    /// Request a single still frame instead of live video
    #[arg(long)]
    single_frame: bool,
}

impl Args {
    fn config(&self) -> Result<EnhancerConfig> {
        let mut config = match &self.config {
            Some(path) => EnhancerConfig::load(path)?,
            None => EnhancerConfig::default(),
        };
        if let Some(ms) = self.interval {
            config.loop_interval_ms = ms;
        }
        if let Some(n) = self.buffer {
            config.max_number_of_frames_in_buffer = n;
        }
        if let Some(ms) = self.refresh {
            config.refresh_interval_ms = ms;
        }
        if let Some(fit) = self.fit {
            config.video_fit = fit;
        }
        config.single_frame_mode |= self.single_frame;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scan_capture=info")),
        )
        .init();

    let args = Args::parse();
    let config = args.config()?;

    let provider: Arc<dyn SourceProvider> = match &args.image {
        Some(path) => Arc::new(
            StillImageProvider::from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
        ),
        None => Arc::new(PatternProvider::new(args.size.0, args.size.1)),
    };

    let single_frame = config.single_frame_mode;
    let enhancer = Enhancer::new(config, provider)?;
    if let Some((w, h)) = args.container {
        enhancer.set_container_size(w as f64, h as f64)?;
    }
    if let Some(region) = args.region {
        enhancer.set_scan_region(region)?;
    }

    let outcome = enhancer
        .play(SourceRequest {
            device_id: args.device.clone(),
            single_frame,
            resolution: None,
        })
        .await
        .inspect_err(|e| {
            if let Some(hint) = e.recovery_suggestion() {
                warn!(hint, "open failed");
            }
        })?;
    let played = outcome
        .info()
        .ok_or_else(|| anyhow!("open was superseded"))?;
    info!(
        width = played.width,
        height = played.height,
        device = ?played.device_id,
        "playing for {:?}",
        args.duration
    );

    tokio::time::sleep(args.duration).await;

    let stats = enhancer.loop_stats();
    let frame = enhancer
        .get_frame_from_buffer(None)
        .context("no frame was buffered")?;
    info!(
        ticks = stats.ticks,
        skipped = stats.skipped,
        accepted = stats.buffer.accepted,
        evicted = stats.buffer.evicted,
        rejected = stats.buffer.rejected_full + stats.buffer.rejected_rate,
        buffered = enhancer.number_of_frames_in_buffer(),
        "acquisition finished"
    );

    let image = frame
        .to_rgba_image()
        .ok_or_else(|| anyhow!("frame buffer has unexpected size"))?;
    image
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "Saved {}x{} frame #{} (source {:?}) to {}",
        frame.width,
        frame.height,
        frame.sequence,
        frame.source,
        args.output.display()
    );

    enhancer.dispose().await?;
    Ok(())
}

/// Parse duration string like "500ms", "30s", "2m", "1h"
fn parse_duration(duration: &str) -> Result<Duration> {
    if let Ok(seconds) = duration.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    if let Some(ms) = duration.strip_suffix("ms") {
        let ms: u64 = ms
            .parse()
            .map_err(|_| anyhow!("Invalid number in duration: {}", ms))?;
        return Ok(Duration::from_millis(ms));
    }

    let len = duration.len();
    if len < 2 {
        return Err(anyhow!("Invalid duration format: {}", duration));
    }

    let (num_str, unit) = duration.split_at(len - 1);
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid number in duration: {}", num_str))?;

    match unit {
        "s" => Ok(Duration::from_secs(num)),
        "m" => Ok(Duration::from_secs(num * 60)),
        "h" => Ok(Duration::from_secs(num * 3600)),
        _ => Err(anyhow!(
            "Invalid duration unit: {}. Use 'ms', 's', 'm' or 'h'",
            unit
        )),
    }
}

/// Parse "WIDTHxHEIGHT"
fn parse_size(size: &str) -> Result<(u32, u32)> {
    let (w, h) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("Invalid size: {}. Use WIDTHxHEIGHT", size))?;
    let w = w.trim().parse().map_err(|_| anyhow!("Invalid width: {}", w))?;
    let h = h.trim().parse().map_err(|_| anyhow!("Invalid height: {}", h))?;
    Ok((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("640x480").unwrap(), (640, 480));
        assert!(parse_size("640").is_err());
    }

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "scancap", "--interval", "20", "--refresh", "-1", "--fit", "cover", "--region",
            "10,10,90,90",
        ]);
        let config = args.config().unwrap();
        assert_eq!(config.loop_interval_ms, 20);
        assert_eq!(config.refresh_interval_ms, -1);
        assert_eq!(config.video_fit, FitMode::Cover);
        assert_eq!(args.region, Some(Region::percent(10.0, 10.0, 90.0, 90.0)));
    }
}
