//! mtgscan CLI — recognize Magic: The Gathering cards in photographs.

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use mtgscan::{annotate, refdb, CardDetector, NameMode, RotationPolicy, TestImage};

type CliError = Box<dyn std::error::Error + Send + Sync>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "mtgscan")]
#[command(about = "Detect and recognize MTG cards in photographs using perceptual hashes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize cards in one or more photographs.
    Detect {
        /// Input photographs.
        #[arg(long, required = true, num_args = 1..)]
        image: Vec<PathBuf>,

        /// Pre-hashed reference database (JSON).
        #[arg(long)]
        hash_db: PathBuf,

        /// Directory for per-image JSON results and annotated images.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Hash separation acceptance threshold.
        #[arg(long, default_value = "4.0")]
        threshold: f64,

        /// Early-exit ceiling on recognized cards per image.
        #[arg(long, default_value = "5")]
        max_cards: usize,

        /// Report full reference names instead of the first token.
        #[arg(long)]
        full_names: bool,

        /// Score all four rotations instead of stopping at the first
        /// acceptable one.
        #[arg(long)]
        best_of_four: bool,

        /// Skip writing annotated images.
        #[arg(long)]
        no_annotate: bool,
    },

    /// Print summary information about a reference database.
    HashDbInfo {
        /// Pre-hashed reference database (JSON).
        #[arg(long)]
        hash_db: PathBuf,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            image,
            hash_db,
            out_dir,
            threshold,
            max_cards,
            full_names,
            best_of_four,
            no_annotate,
        } => run_detect(
            &image,
            &hash_db,
            &out_dir,
            threshold,
            max_cards,
            full_names,
            best_of_four,
            no_annotate,
        ),

        Commands::HashDbInfo { hash_db } => run_hash_db_info(&hash_db),
    }
}

// ── hash-db-info ───────────────────────────────────────────────────────────

fn run_hash_db_info(hash_db: &Path) -> CliResult<()> {
    let entries = refdb::load(hash_db)?;

    println!("mtgscan reference database: {}", hash_db.display());
    println!("  entries:    {}", entries.len());
    if let Some(first) = entries.first() {
        println!("  hash width: {} bits", first.phash.len_bits());
        println!("  first name: {}", first.name);
    }
    if let Some(last) = entries.last() {
        println!("  last name:  {}", last.name);
    }

    Ok(())
}

// ── detect ─────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run_detect(
    images: &[PathBuf],
    hash_db: &Path,
    out_dir: &Path,
    threshold: f64,
    max_cards: usize,
    full_names: bool,
    best_of_four: bool,
    no_annotate: bool,
) -> CliResult<()> {
    tracing::info!("Loading reference database: {}", hash_db.display());
    let references = refdb::load(hash_db)?;
    tracing::info!("{} reference entries loaded", references.len());

    let mut detector = CardDetector::new(references);
    let config = detector.config_mut();
    config.recognition.separation_threshold = threshold;
    config.max_recognized_cards = max_cards;
    if full_names {
        config.recognition.name_mode = NameMode::FullName;
    }
    if best_of_four {
        config.recognition.rotation_policy = RotationPolicy::BestOfFour;
    }

    std::fs::create_dir_all(out_dir)?;

    // Per-image fan-out; the detector is shared read-only across workers.
    let outcomes: Vec<CliResult<usize>> = images
        .par_iter()
        .map(|path| process_image(&detector, path, out_dir, no_annotate))
        .collect();

    let mut failures = 0usize;
    let mut total_cards = 0usize;
    for (path, outcome) in images.iter().zip(outcomes) {
        match outcome {
            Ok(n) => total_cards += n,
            Err(err) => {
                failures += 1;
                tracing::error!("{}: {}", path.display(), err);
            }
        }
    }
    tracing::info!(
        "Recognized {} cards across {} images ({} failed)",
        total_cards,
        images.len() - failures,
        failures,
    );
    if failures > 0 {
        return Err(format!("{} of {} images failed", failures, images.len()).into());
    }
    Ok(())
}

fn process_image(
    detector: &CardDetector,
    path: &Path,
    out_dir: &Path,
    no_annotate: bool,
) -> CliResult<usize> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string();

    let photo = image::open(path)
        .map_err(|e| -> CliError { format!("failed to open {}: {}", path.display(), e).into() })?
        .to_rgb8();

    let mut test = TestImage::ingest(stem.clone(), photo, detector.config());
    let result = detector.recognize_image(&mut test);

    for card in &result.cards {
        tracing::info!("{}: {} (score {:.2})", stem, card.name, card.score);
    }

    let json = serde_json::to_string_pretty(&result)?;
    std::fs::write(out_dir.join(format!("{}.json", stem)), json)?;

    if !no_annotate {
        let annotated = annotate(&test.original, &test.candidates);
        // Annotation output is best-effort: a write failure is reported but
        // never fails the recognition run.
        let annotated_path = out_dir.join(format!("{}_annotated.jpg", stem));
        if let Err(err) = annotated.save(&annotated_path) {
            tracing::warn!("could not write {}: {}", annotated_path.display(), err);
        }
    }

    Ok(result.cards.len())
}
