use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use serde_json::json;

use stroke_coach_rs::calibration::{AxisCalibrationStrategy, CalibrationOutcome, PcaAxisDetector};
use stroke_coach_rs::demo::{synthetic_capture, DemoConfig};
use stroke_coach_rs::pipeline::{PipelineConfig, StrokePipeline};
use stroke_coach_rs::Capture;

/// Replay a recorded .wrcdata capture through the full pipeline and print a
/// JSON session summary. Captures stay raw on disk, so this reprocesses with
/// current (or overridden) parameters every time.
#[derive(Parser, Debug)]
struct Args {
    /// Path to a .wrcdata or .wrcdata.gz capture
    #[arg(conflicts_with = "demo")]
    capture: Option<PathBuf>,

    /// Generate and replay a synthetic demo session instead of a file
    #[arg(long)]
    demo: bool,

    /// Catch threshold override (m/s²); defaults to the stored value
    #[arg(long)]
    catch_threshold: Option<f64>,

    /// Finish threshold override (m/s²); defaults to the stored value
    #[arg(long)]
    finish_threshold: Option<f64>,

    /// Fully-automatic thresholds (trailing-percentile catch)
    #[arg(long)]
    auto: bool,

    /// Include every stroke record in the output
    #[arg(long)]
    strokes: bool,
}

fn load_capture(path: &Path) -> anyhow::Result<Capture> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        GzDecoder::new(file).read_to_end(&mut data)?;
    } else {
        file.read_to_end(&mut data)?;
    }
    Ok(Capture::decode(&data)?)
}

fn build_pipeline(capture: &Capture, args: &Args) -> StrokePipeline {
    let mut config = PipelineConfig {
        phone_orientation: capture.metadata.phone_orientation,
        adaptive_thresholds: args.auto,
        ..PipelineConfig::default()
    };
    if let Some(catch) = capture.metadata.catch_threshold {
        config.catch_threshold = catch as f64;
    }
    if let Some(finish) = capture.metadata.finish_threshold {
        config.finish_threshold = finish as f64;
    }
    if let Some(catch) = args.catch_threshold {
        config.catch_threshold = catch;
    }
    if let Some(finish) = args.finish_threshold {
        config.finish_threshold = finish;
    }

    let mut pipeline = StrokePipeline::new(config);

    // A stored calibration record wins; otherwise detect axes from the
    // recorded motion, which is all a V3 capture ever has.
    let outcome = match capture.calibration {
        Some(record) => CalibrationOutcome::from_record(record),
        None => {
            let mut detector = PcaAxisDetector::new(capture.metadata.phone_orientation);
            for s in &capture.imu {
                detector.add_sample(s);
            }
            detector.finish(capture.imu.last().map_or(0.0, |s| s.timestamp))
        }
    };
    pipeline.install_calibration(outcome);
    pipeline
}

fn replay(capture: &Capture, args: &Args) -> serde_json::Value {
    let mut pipeline = build_pipeline(capture, args);

    // Two independently paced streams, merged by timestamp
    let mut imu_iter = capture.imu.iter().peekable();
    for gps in &capture.gps {
        while let Some(s) = imu_iter.peek() {
            if s.timestamp <= gps.timestamp {
                pipeline.process_imu_sample(s);
                imu_iter.next();
            } else {
                break;
            }
        }
        pipeline.process_gps_sample(gps);
    }
    for s in imu_iter {
        pipeline.process_imu_sample(s);
    }

    let stats = pipeline.session_stats();
    let calibration = pipeline.calibration();
    let session_start =
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(capture.metadata.session_start as i64)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());

    let mut out = json!({
        "format_version": capture.metadata.format_version,
        "session_start": session_start,
        "phone_orientation": capture.metadata.phone_orientation,
        "demo_mode": capture.metadata.demo_mode,
        "imu_samples": capture.imu.len(),
        "gps_samples": capture.gps.len(),
        "calibration": {
            "record": calibration.record,
            "grade": calibration.quality.grade,
            "degraded": calibration.quality.degraded,
            "notes": calibration.quality.notes,
            "stored": capture.calibration.is_some(),
        },
        "stats": stats,
    });
    if args.strokes {
        out["strokes"] = json!(pipeline.strokes());
    }
    out
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let capture = if args.demo {
        synthetic_capture(&DemoConfig::default())
    } else {
        match args.capture.as_ref() {
            Some(path) => load_capture(path)?,
            None => anyhow::bail!("provide a capture path or --demo"),
        }
    };

    let summary = replay(&capture, &args);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
