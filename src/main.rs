use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use snapsort::config::Config;
use snapsort::db::Database;
use snapsort::embedder::HttpFaceEmbedder;
use snapsort::labeler::VisionSceneLabeler;
use snapsort::pipeline::{Classifier, Method};
use snapsort::store::ImageStore;
use snapsort::{groups::GroupManager, logging};

struct CliArgs {
    config_path: Option<PathBuf>,
    owner: String,
    files: Vec<PathBuf>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut owner = "default".to_string();
    let mut files = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("snapsort {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--owner" | "-o" => {
                if i + 1 < args.len() {
                    owner = args[i + 1].clone();
                    i += 1;
                } else {
                    eprintln!("Error: --owner requires an identifier argument");
                    std::process::exit(1);
                }
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            file => {
                files.push(PathBuf::from(file));
            }
        }
        i += 1;
    }

    CliArgs {
        config_path,
        owner,
        files,
    }
}

fn print_help() {
    println!(
        r#"snapsort - face-aware photo sorting

USAGE:
    snapsort [OPTIONS] [IMAGE]...

Classifies each image into per-person or per-scene folders and records
it in the library index. With no images, prints the library overview.

OPTIONS:
    --config, -c PATH   Path to config file
    --owner, -o ID      Owner identifier (default: "default")
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    SNAPSORT_LOG        Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/snapsort/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(None);

    let config = match args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.database.path)?;
    db.initialize()?;

    let store = ImageStore::new(
        config.storage.upload_root.clone(),
        config.storage.image_extensions.clone(),
    );

    if args.files.is_empty() {
        return print_overview(&db, &store, &args.owner);
    }

    let embedder = HttpFaceEmbedder::new(
        &config.embedder.endpoint,
        config.embedder.api_key.as_deref(),
        Duration::from_secs(config.embedder.timeout_secs),
    );
    let labeler = VisionSceneLabeler::new(
        &config.labeler.endpoint,
        &config.labeler.model,
        config.labeler.api_key.as_deref(),
        Duration::from_secs(config.labeler.timeout_secs),
    );

    let classifier = Classifier::new(
        &db,
        &store,
        &embedder,
        &labeler,
        config.embedder.similarity_threshold(),
    );

    let report = classifier.process_batch(&args.owner, &args.files);

    for outcome in &report.succeeded {
        let groups: Vec<&str> = outcome.groups.iter().map(|g| g.name.as_str()).collect();
        let how = match outcome.method {
            Method::Face => format!("{} face(s)", outcome.face_count),
            Method::Scene => "scene".to_string(),
        };
        println!("{}: {} -> {}", outcome.filename, how, groups.join(", "));
    }
    for (filename, reason) in &report.skipped {
        println!("{}: skipped ({})", filename, reason);
    }
    for (filename, error) in &report.failed {
        eprintln!("{}: failed ({})", filename, error);
    }

    println!(
        "{} classified ({} face(s)), {} skipped, {} failed",
        report.succeeded.len(),
        report.faces_detected(),
        report.skipped.len(),
        report.failed.len()
    );

    // Per-file failures are reported above; the batch itself succeeded
    Ok(())
}

fn print_overview(db: &Database, store: &ImageStore, owner: &str) -> Result<()> {
    let groups = GroupManager::new(db, store);
    let stats = groups.dashboard_stats(owner)?;

    println!(
        "{} group(s), {} photo(s), {} deliveries",
        stats.group_count, stats.photo_count, stats.delivery_count
    );
    for summary in groups.persons_overview(owner)? {
        println!(
            "  {} [{}]: {} photo(s)",
            summary.person.name, summary.person.folder_key, summary.photo_count
        );
    }
    Ok(())
}
