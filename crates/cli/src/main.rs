use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use facematch_core::detection::domain::face_detector_adapter::FaceDetectorAdapter;
use facematch_core::detection::infrastructure::model_resolver;
use facematch_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facematch_core::extraction::domain::feature_extractor::{extract_features, FeatureExtractor};
use facematch_core::extraction::infrastructure::histogram_feature_extractor::HistogramFeatureExtractor;
use facematch_core::extraction::infrastructure::onnx_arcface_extractor::OnnxArcFaceExtractor;
use facematch_core::matching::domain::enrollment::{EnrollmentRecord, SubjectId};
use facematch_core::matching::domain::enrollment_store::EnrollmentStore;
use facematch_core::matching::domain::match_engine::MatchEngine;
use facematch_core::matching::infrastructure::json_file_enrollment_store::JsonFileEnrollmentStore;
use facematch_core::remote::infrastructure::http_enrollment_store::HttpEnrollmentStore;
use facematch_core::remote::infrastructure::http_verification_client::HttpVerificationClient;
use facematch_core::remote::infrastructure::reqwest_transport::ReqwestTransport;
use facematch_core::settings::VerificationSettings;
use facematch_core::shared::constants::{
    APP_DIR_NAME, ARCFACE_MODEL_NAME, ARCFACE_MODEL_URL, IMAGE_EXTENSIONS, YOLO_MODEL_NAME,
    YOLO_MODEL_URL,
};
use facematch_core::shared::embedding::Embedding;
use facematch_core::shared::frame::Frame;
use facematch_core::verification::domain::identity_matcher::{
    IdentityMatcher, LocalIdentityMatcher,
};
use facematch_core::verification::domain::quality_gate::QualityGate;
use facematch_core::verification::domain::session_config::SessionConfig;
use facematch_core::verification::domain::session_observer::LogSessionObserver;
use facematch_core::verification::domain::session_state::Decision;
use facematch_core::verification::domain::verification_session::{
    SessionPipeline, VerificationSession,
};
use facematch_core::verification::infrastructure::remote_identity_matcher::RemoteIdentityMatcher;

const EXIT_ACCEPTED: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_REJECTED: i32 = 2;

/// Face enrollment and match verification.
#[derive(Parser)]
#[command(name = "facematch")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (defaults to the user config directory).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Directory of the local enrollment store.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Embedding model.
    #[arg(long, global = true, value_enum, default_value = "arcface")]
    extractor: ExtractorKind,

    /// Verification service URL; enrollments and matching go remote.
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Bearer token for the verification service.
    #[arg(long, global = true)]
    api_token: Option<String>,

    /// Log in to the verification service with these credentials.
    #[arg(long, global = true, requires = "password")]
    username: Option<String>,

    #[arg(long, global = true, requires = "username")]
    password: Option<String>,

    /// Match threshold (0.0-1.0), overrides the settings file.
    #[arg(long, global = true)]
    threshold: Option<f64>,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll a subject from one or more face images.
    Enroll {
        #[arg(long)]
        subject: String,
        /// Add to the existing references instead of replacing them.
        #[arg(long)]
        append: bool,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Verify images (fed in order as frames) against claimed subjects.
    Verify {
        /// Claimed identity; repeat to allow several. Omit to search all.
        #[arg(long)]
        subject: Vec<String>,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Print the similarity of the faces in two images.
    Compare { first: PathBuf, second: PathBuf },
    /// Remove an enrolled subject.
    Remove {
        #[arg(long)]
        subject: String,
    },
    /// List enrolled subjects.
    Subjects,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExtractorKind {
    Arcface,
    Histogram,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(EXIT_ERROR);
        }
    }
}

fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let client = build_client(&cli, &settings)?;

    match &cli.command {
        Command::Enroll {
            subject,
            append,
            images,
        } => {
            validate_images(images)?;
            let store = build_store(&cli, client.as_ref())?;
            let (adapter, extractor) = build_capabilities(&cli, &settings)?;
            let embeddings = embed_images(images, &adapter, extractor.as_ref(), &settings)?;
            enroll(store.as_ref(), SubjectId::new(subject.as_str()), embeddings, *append)?;
            Ok(EXIT_ACCEPTED)
        }
        Command::Verify { subject, images } => {
            validate_images(images)?;
            let subjects = subject.iter().map(|s| SubjectId::new(s.as_str())).collect();
            let (adapter, extractor) = build_capabilities(&cli, &settings)?;
            let matcher: Arc<dyn IdentityMatcher> = match &client {
                Some(client) => Arc::new(RemoteIdentityMatcher::new(
                    client.clone(),
                    settings.matching.ambiguity_epsilon,
                )),
                None => Arc::new(LocalIdentityMatcher::new(
                    build_store(&cli, None)?,
                    MatchEngine::new(settings.matching),
                )),
            };
            let pipeline = SessionPipeline::new(
                adapter,
                settings.gating,
                extractor,
                settings.extraction,
                matcher,
            );
            let config = SessionConfig {
                subjects,
                settings: settings.session,
            };
            Ok(verify(pipeline, config, images))
        }
        Command::Compare { first, second } => {
            validate_images([first.clone(), second.clone()].as_slice())?;
            let (adapter, extractor) = build_capabilities(&cli, &settings)?;
            let a = embed_image(first, 0, &adapter, extractor.as_ref(), &settings)?;
            let b = embed_image(second, 1, &adapter, extractor.as_ref(), &settings)?;
            match &client {
                Some(client) => {
                    let (decision, score) = client.compare(&a, &b)?;
                    println!("{decision}, similarity {score:.4}");
                }
                None => {
                    let engine = MatchEngine::new(settings.matching);
                    let score = engine.compare(&a, &b)?;
                    let verdict = if score >= settings.matching.threshold {
                        "match"
                    } else {
                        "no match"
                    };
                    println!("{verdict}, similarity {score:.4}");
                }
            }
            Ok(EXIT_ACCEPTED)
        }
        Command::Remove { subject } => {
            let store = build_store(&cli, client.as_ref())?;
            let subject = SubjectId::new(subject.as_str());
            if store.delete(&subject)? {
                log::info!("Removed {subject}");
                Ok(EXIT_ACCEPTED)
            } else {
                Err(format!("Subject {subject} is not enrolled").into())
            }
        }
        Command::Subjects => {
            let store = build_store(&cli, client.as_ref())?;
            for subject in store.subjects()? {
                println!("{subject}");
            }
            Ok(EXIT_ACCEPTED)
        }
    }
}

fn load_settings(cli: &Cli) -> Result<VerificationSettings, Box<dyn std::error::Error>> {
    let mut settings = match &cli.settings {
        Some(path) => VerificationSettings::load(path)?,
        None => VerificationSettings::load_default()?,
    };
    if let Some(threshold) = cli.threshold {
        settings.matching.threshold = threshold;
    }
    if let Some(url) = &cli.remote {
        settings.remote.base_url = Some(url.clone());
    }
    settings.validate()?;
    Ok(settings)
}

fn build_client(
    cli: &Cli,
    settings: &VerificationSettings,
) -> Result<Option<Arc<HttpVerificationClient>>, Box<dyn std::error::Error>> {
    let Some(base_url) = &settings.remote.base_url else {
        return Ok(None);
    };
    let transport = Arc::new(ReqwestTransport::new()?);
    let client = HttpVerificationClient::new(transport, base_url.as_str(), &settings.remote);
    if let Some(token) = &cli.api_token {
        client.set_token(Some(token.clone()));
    }
    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        client.authenticate(username, password)?;
    }
    Ok(Some(Arc::new(client)))
}

fn build_store(
    cli: &Cli,
    client: Option<&Arc<HttpVerificationClient>>,
) -> Result<Arc<dyn EnrollmentStore>, Box<dyn std::error::Error>> {
    if let Some(client) = client {
        return Ok(Arc::new(HttpEnrollmentStore::new(client.clone())));
    }
    let dir = match &cli.store {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME).join("enrollments"))
            .ok_or("Could not determine a data directory; pass --store")?,
    };
    log::debug!("Using enrollment store at {}", dir.display());
    Ok(Arc::new(JsonFileEnrollmentStore::open(dir)?))
}

fn build_capabilities(
    cli: &Cli,
    settings: &VerificationSettings,
) -> Result<(FaceDetectorAdapter, Arc<dyn FeatureExtractor>), Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        None,
        Some(Box::new(download_progress)),
    )?;
    let min_confidence = settings.detection.min_confidence;
    let detector = OnnxYoloDetector::new(&model_path, min_confidence)?;
    let adapter = FaceDetectorAdapter::new(Arc::new(detector), min_confidence);

    let extractor: Arc<dyn FeatureExtractor> = match cli.extractor {
        ExtractorKind::Arcface => {
            log::info!("Resolving model: {ARCFACE_MODEL_NAME}");
            let model_path = model_resolver::resolve(
                ARCFACE_MODEL_NAME,
                ARCFACE_MODEL_URL,
                None,
                Some(Box::new(download_progress)),
            )?;
            Arc::new(OnnxArcFaceExtractor::new(&model_path)?)
        }
        ExtractorKind::Histogram => Arc::new(HistogramFeatureExtractor::new()),
    };
    Ok((adapter, extractor))
}

fn load_frame(path: &Path, sequence: u64) -> Result<Frame, Box<dyn std::error::Error>> {
    let image = image::open(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?
        .to_rgb8();
    Ok(Frame::from_rgb_image(&image, sequence))
}

/// Embeds the most confident face that passes the quality gate.
fn embed_image(
    path: &Path,
    sequence: u64,
    adapter: &FaceDetectorAdapter,
    extractor: &dyn FeatureExtractor,
    settings: &VerificationSettings,
) -> Result<Embedding, Box<dyn std::error::Error>> {
    let (frame, regions) = adapter.detect(load_frame(path, sequence)?)?;
    let gate: &QualityGate = &settings.gating;
    let (chosen, rejections) = gate.select(&regions);
    let Some(region) = chosen else {
        let reason = rejections
            .first()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "no face detected".into());
        return Err(format!("{}: {reason}", path.display()).into());
    };
    let embedding = extract_features(extractor, &frame, region, &settings.extraction)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(embedding)
}

fn embed_images(
    images: &[PathBuf],
    adapter: &FaceDetectorAdapter,
    extractor: &dyn FeatureExtractor,
    settings: &VerificationSettings,
) -> Result<Vec<Embedding>, Box<dyn std::error::Error>> {
    let mut embeddings = Vec::with_capacity(images.len());
    for (i, path) in images.iter().enumerate() {
        match embed_image(path, i as u64, adapter, extractor, settings) {
            Ok(embedding) => embeddings.push(embedding),
            Err(e) => log::warn!("Skipping {e}"),
        }
    }
    if embeddings.is_empty() {
        return Err("No usable face in any of the given images".into());
    }
    Ok(embeddings)
}

fn enroll(
    store: &dyn EnrollmentStore,
    subject: SubjectId,
    embeddings: Vec<Embedding>,
    append: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let count = embeddings.len();
    let record = match store.get(&subject)? {
        Some(existing) if append => {
            let mut record = (*existing).clone();
            for embedding in embeddings {
                record = record.with_reference(embedding)?;
            }
            record
        }
        Some(existing) => existing.replace_references(embeddings)?,
        None => EnrollmentRecord::new(subject, embeddings)?,
    };
    let total = record.references().len();
    let subject = record.subject().clone();
    store.put(record)?;
    log::info!("Enrolled {subject} with {count} new reference(s), {total} total");
    Ok(())
}

fn verify(pipeline: SessionPipeline, config: SessionConfig, images: &[PathBuf]) -> i32 {
    let mut session = VerificationSession::new(
        Arc::new(pipeline),
        config,
        Box::new(LogSessionObserver::new("cli")),
    );
    for (i, path) in images.iter().enumerate() {
        match load_frame(path, i as u64) {
            Ok(frame) => {
                if session.process_frame(frame).is_decided() {
                    break;
                }
            }
            Err(e) => log::warn!("{e}"),
        }
    }
    session.finish_input();

    match session.into_decision() {
        Some(decision) => {
            println!("{decision}");
            match decision {
                Decision::Accepted(_) => EXIT_ACCEPTED,
                Decision::Rejected(_) | Decision::Ambiguous(_) => EXIT_REJECTED,
                Decision::Error(_) => EXIT_ERROR,
            }
        }
        None => EXIT_ERROR,
    }
}

fn validate_images(images: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    for path in images {
        if !path.exists() {
            return Err(format!("Input file not found: {}", path.display()).into());
        }
        if !is_image(path) {
            return Err(format!("Not a supported image: {}", path.display()).into());
        }
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
