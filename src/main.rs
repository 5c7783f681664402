//! omr-scan - Scan bubble-sheet answer forms from the command line
//!
//! Prints one JSON object per page on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use omr_scan::config::{self, CalibrationProfile};
use omr_scan::scoring::{self, load_answer_key, AnswerKey, ScoreResult};
use omr_scan::vision::identifier::UNRESOLVED_DIGIT;
use omr_scan::{scan_batch, OmrPipeline, ScanResult};

/// omr-scan - Optical mark recognition for answer sheets
#[derive(Parser, Debug)]
#[command(name = "omr-scan")]
#[command(about = "Decode student identifiers and answers from scanned bubble sheets")]
struct Args {
    /// Page images to scan (PNG, JPEG, ...)
    #[arg(required_unless_present = "write_profile")]
    images: Vec<PathBuf>,

    /// Calibration profile (TOML); defaults to the user's profile if present
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Write the default calibration profile to this path and exit
    #[arg(long)]
    write_profile: Option<PathBuf>,

    /// Answer key (TOML) to score accepted pages against
    #[arg(short, long)]
    key: Option<PathBuf>,

    /// Directory for annotated debug images (scans pages sequentially)
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Worker threads (defaults to available cores)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Fewest decoded answers for a page to be accepted
    #[arg(long, default_value = "10")]
    min_answers: usize,
}

/// Acceptance of one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum PageStatus {
    Accepted,
    Rejected,
    Unreadable,
}

#[derive(Debug, Serialize)]
struct PageReport<'a> {
    file: &'a Path,
    status: PageStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<ScoreResult>,
}

fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    if let Some(path) = &args.write_profile {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        config::save_profile(&CalibrationProfile::default(), path)?;
        info!("Wrote default calibration profile to {:?}", path);
        return Ok(());
    }

    let profile = match &args.profile {
        Some(path) => {
            let profile = config::load_profile(path)?;
            info!("Loaded calibration profile from {:?}", path);
            profile
        }
        None => load_default_profile(),
    };
    let pipeline = OmrPipeline::with_profile(profile)?;

    let key = match &args.key {
        Some(path) => Some(load_answer_key(path)?),
        None => None,
    };

    let reads: Vec<Result<Vec<u8>, String>> = args.images.iter().map(|path| read_page(path)).collect();
    let pages: Vec<&[u8]> = reads
        .iter()
        .map(|read| read.as_deref().unwrap_or_default())
        .collect();

    let results = match &args.debug_dir {
        Some(dir) => {
            if args.jobs.is_some() {
                info!("Debug images are rendered sequentially; ignoring --jobs");
            }
            scan_with_debug_images(&pipeline, &args.images, &pages, dir)?
        }
        None => {
            let jobs = args.jobs.unwrap_or_else(|| {
                std::thread::available_parallelism().map_or(1, |n| n.get())
            });
            scan_batch(&pipeline, &pages, jobs)
        }
    };

    let mut counts = [0usize; 3];
    for ((path, read), result) in args.images.iter().zip(&reads).zip(&results) {
        let report = match read {
            Err(reason) => unreadable(path, reason.clone()),
            Ok(_) => build_report(path, result.as_ref(), key.as_ref(), args.min_answers),
        };
        counts[report.status as usize] += 1;
        println!("{}", serde_json::to_string(&report)?);
    }

    info!(
        "{} pages: {} accepted, {} rejected, {} unreadable",
        results.len(),
        counts[PageStatus::Accepted as usize],
        counts[PageStatus::Rejected as usize],
        counts[PageStatus::Unreadable as usize]
    );

    Ok(())
}

/// Load the user's calibration profile, or the defaults
fn load_default_profile() -> CalibrationProfile {
    if let Ok(path) = config::default_profile_path() {
        if path.exists() {
            match config::load_profile(&path) {
                Ok(profile) => {
                    info!("Loaded calibration profile from {:?}", path);
                    return profile;
                }
                Err(e) => warn!("Ignoring calibration profile {:?}: {:#}", path, e),
            }
        }
    }
    info!("Using default calibration profile");
    CalibrationProfile::default()
}

/// Read a page, keeping the I/O error as the page's rejection reason
fn read_page(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|e| {
        warn!("Failed to read {:?}: {}", path, e);
        format!("failed to read file: {}", e)
    })
}

/// Scan pages one at a time, saving each annotated image next to its stem
fn scan_with_debug_images(
    pipeline: &OmrPipeline,
    paths: &[PathBuf],
    pages: &[&[u8]],
    dir: &Path,
) -> Result<Vec<Option<ScanResult>>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create debug directory {:?}", dir))?;

    let mut results = Vec::with_capacity(pages.len());
    for (index, (path, bytes)) in paths.iter().zip(pages).enumerate() {
        let Some(output) = pipeline.scan_with_debug(bytes) else {
            results.push(None);
            continue;
        };

        if let Some(image) = &output.debug_image {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("page{}", index + 1));
            let target = dir.join(format!("{}_debug.png", stem));
            match image.save(&target) {
                Ok(()) => info!("Saved debug image {:?}", target),
                Err(e) => warn!("Failed to save debug image {:?}: {}", target, e),
            }
        }
        results.push(Some(output.result));
    }
    Ok(results)
}

/// Reasons a decoded page should not be stored as-is
fn review(result: &ScanResult, min_answers: usize) -> Vec<String> {
    let mut reasons = Vec::new();
    let identifier = result.identifier.to_string();
    if identifier.contains(UNRESOLVED_DIGIT) {
        reasons.push(format!("identifier {} is incomplete", identifier));
    }
    if result.answers.len() < min_answers {
        reasons.push(format!(
            "only {} answers decoded (need {})",
            result.answers.len(),
            min_answers
        ));
    }
    reasons
}

fn unreadable(path: &Path, reason: String) -> PageReport<'_> {
    PageReport {
        file: path,
        status: PageStatus::Unreadable,
        reasons: vec![reason],
        result: None,
        score: None,
    }
}

fn build_report<'a>(
    path: &'a Path,
    result: Option<&'a ScanResult>,
    key: Option<&AnswerKey>,
    min_answers: usize,
) -> PageReport<'a> {
    let Some(scan) = result else {
        return unreadable(path, "image could not be decoded".to_string());
    };

    let reasons = review(scan, min_answers);
    if !reasons.is_empty() {
        warn!("Rejected {:?}: {}", path, reasons.join("; "));
        return PageReport {
            file: path,
            status: PageStatus::Rejected,
            reasons,
            result: Some(scan),
            score: None,
        };
    }

    PageReport {
        file: path,
        status: PageStatus::Accepted,
        reasons,
        result: Some(scan),
        score: key.map(|key| scoring::score(&scan.answers, key)),
    }
}
