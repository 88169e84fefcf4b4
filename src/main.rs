use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use survey_tts::controllers::generation::GenerationController;
use survey_tts::domain::playback::snippet;
use survey_tts::domain::survey::{AssetPipeline, SurveyId, TranslationTable};
use survey_tts::infrastructure::config::{Config, LogFormat};
use survey_tts::infrastructure::http::start_http_server;
use survey_tts::infrastructure::repositories::HostingRepository;

#[derive(Debug, Parser)]
#[command(name = "survey-tts")]
#[command(about = "Pre-rendered speech audio for multilingual surveys")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Generate audio and publish the mapping for one survey, then exit
    Generate {
        #[arg(long)]
        survey_id: String,
        /// Translation table JSON: {"rows": [{"en": "...", "da": "..."}]}
        #[arg(long)]
        input: PathBuf,
        /// Also write the page embed to this file
        #[arg(long)]
        snippet_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("loading configuration")?;
    init_logging(&config);
    config.validate().context("validating configuration")?;

    let backend = config.synthesis_backend()?;
    tracing::info!(
        backend = backend.name(),
        languages = ?config.supported_languages,
        hosting_root = %config.hosting_root.display(),
        public_base_url = %config.public_base_url,
        "Synthesis backend selected"
    );

    let hosting = Arc::new(HostingRepository::new(
        config.hosting_root.clone(),
        config.public_base_url.clone(),
    ));
    let pipeline = Arc::new(AssetPipeline::new(
        backend,
        hosting,
        config.pipeline_options(),
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(
                "Starting survey-tts on {}:{}",
                config.host,
                config.port
            );
            let shutdown = CancellationToken::new();
            let controller = Arc::new(GenerationController::new(pipeline, shutdown.clone()));
            start_http_server(Arc::new(config), controller, shutdown).await?;
        }
        Command::Generate {
            survey_id,
            input,
            snippet_out,
        } => {
            let survey = SurveyId::parse(&survey_id)?;
            let bytes = tokio::fs::read(&input)
                .await
                .with_context(|| format!("reading {}", input.display()))?;
            let table = TranslationTable::from_json_slice(&bytes)?;

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, stopping generation");
                    on_ctrl_c.cancel();
                }
            });

            let report = pipeline.run(&survey, &table, &cancel).await?;

            if let Some(path) = snippet_out {
                tokio::fs::write(&path, snippet::render(&report.mapping_url))
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                tracing::info!(path = %path.display(), "Embed snippet written");
            }

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let default_filter = if config.is_development() {
        "survey_tts=debug,tower_http=debug"
    } else {
        "survey_tts=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
