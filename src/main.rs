use framefind::backends::LocalBackends;
use framefind::cli::{Cli, Commands, ConfigAction};
use framefind::config::{Config, ConfigValidator};
use framefind::error::{FramefindError, Result};
use framefind::presentation::PresentedItem;
use framefind::query::{RawObjectConstraint, RawQuery};
use framefind::retrieval::{SearchOutcome, SearchStatus, SortKey};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Query {
            description,
            objects,
            audio,
            request,
            limit,
            sort,
            json,
        } => {
            let raw = match request {
                Some(path) => RawQuery::from_json_file(&path)?,
                None => inline_request(description, objects, audio),
            };
            let config = load_config(cli.config, cli.profile)?;
            cmd_query(&config, &raw, limit, sort, json)?;
        }
        Commands::Status => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_status(&config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose {
        "framefind=debug"
    } else {
        "framefind=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn inline_request(
    description: String,
    objects: Vec<RawObjectConstraint>,
    audio: Option<String>,
) -> RawQuery {
    RawQuery {
        description,
        objects,
        audio,
    }
}

fn cmd_query(
    config: &Config,
    raw: &RawQuery,
    limit: Option<usize>,
    sort: SortKey,
    json: bool,
) -> Result<()> {
    let data_dir = expand_path(&config.storage.data_dir)?;
    let engine = LocalBackends::open(config, &data_dir)?.into_engine(config)?;
    let limit = limit.unwrap_or(config.retrieval.default_limit);

    let rt = tokio::runtime::Runtime::new().map_err(|e| FramefindError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;

    let outcome = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        engine.search_with_cancel(raw, Some(limit), &cancel).await
    })?;

    print_outcome(config, outcome, sort, json)
}

fn print_outcome(config: &Config, outcome: SearchOutcome, sort: SortKey, json: bool) -> Result<()> {
    let presentation = resolved_presentation(config)?;
    let items: Vec<PresentedItem> = outcome
        .results
        .resorted(sort)
        .into_items()
        .into_iter()
        .map(|item| PresentedItem::new(item, &presentation))
        .collect();

    if json {
        let payload = serde_json::json!({
            "query_id": outcome.query_id,
            "status": outcome.status,
            "results": items,
        });
        let rendered = serde_json::to_string_pretty(&payload).map_err(|e| FramefindError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", rendered);
        return Ok(());
    }

    match &outcome.status {
        SearchStatus::Complete => {}
        SearchStatus::Partial { unavailable } => {
            for failure in unavailable {
                println!("⚠ {}", failure);
            }
        }
        SearchStatus::NoTextSignal => {
            println!("Nothing to search: give a description, or object constraints with a listing-capable index");
            return Ok(());
        }
    }

    if items.is_empty() {
        println!("No matching keyframes");
        return Ok(());
    }

    println!(
        "{:>4}  {:<24} {:>8}  {:>10}  {:>10}  {:>8}",
        "#", "video", "keyframe", "rrf", "clip", "start"
    );
    for (i, presented) in items.iter().enumerate() {
        let item = &presented.item;
        let clip = item
            .clip_score
            .map(|d| format!("{:.4}", d))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:<24} {:>8}  {:>10.6}  {:>10}  {:>7.1}s",
            i + 1,
            item.video_id,
            item.keyframe_index,
            item.rrf_score,
            clip,
            presented.start_seconds
        );
    }
    println!("\n{} results (query {})", items.len(), outcome.query_id);

    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let data_dir = expand_path(&config.storage.data_dir)?;
    let backends = LocalBackends::open_stores(config, &data_dir)?;
    let stats = backends.detection_db.stats()?;

    println!("framefind Status");
    println!("================");
    println!("\nStore: {}", LocalBackends::store_dir(&data_dir).display());
    println!(
        "  Keyword documents: {} ({})",
        backends.keyword_index.len(),
        backends.keyword_index.path().display()
    );
    println!("  Vectors ({}): {}", config.embedding.model, backends.vector_index.len());
    println!("  Keyframes with detections: {}", stats.keyframe_count);
    println!(
        "  Detections: {} ({} labels)",
        stats.detection_count, stats.label_count
    );
    println!("  Stored vectors (all models): {}", stats.vector_count);

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| FramefindError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let value = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    FramefindError::Config(format!("Unknown config section: {}", section))
                })?,
                None => value,
            };

            let json = serde_json::to_string_pretty(&value).map_err(|e| FramefindError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| FramefindError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            // Save default config
            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'framefind config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

fn resolved_presentation(config: &Config) -> Result<framefind::config::PresentationConfig> {
    let mut presentation = config.presentation.clone();
    presentation.keyframes_dir = expand_path(&presentation.keyframes_dir)?;
    presentation.videos_dir = expand_path(&presentation.videos_dir)?;
    Ok(presentation)
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| FramefindError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| FramefindError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
