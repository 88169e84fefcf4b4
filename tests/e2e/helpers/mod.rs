use std::path::{Path, PathBuf};
use std::sync::Arc;
use survey_tts::controllers::generation::GenerationController;
use survey_tts::domain::survey::{
    AssetPipeline, CollisionPolicy, FailurePolicy, LanguageTag, PipelineOptions,
};
use survey_tts::infrastructure::http::build_router;
use survey_tts::infrastructure::repositories::HostingRepository;
use tempfile::TempDir;
use test_context::AsyncTestContext;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

pub mod api_client;
pub mod fake_backend;

use api_client::TestClient;
use fake_backend::FakeBackend;

pub const PUBLIC_BASE_URL: &str = "https://cdn.example.test/tts/";

pub fn languages(tags: &[&str]) -> Vec<LanguageTag> {
    tags.iter()
        .map(|tag| LanguageTag::parse(tag).expect("valid language tag"))
        .collect()
}

pub fn default_options() -> PipelineOptions {
    PipelineOptions {
        languages: languages(&["en", "da"]),
        concurrency: 2,
        failure_policy: FailurePolicy::FailFast,
        collision_policy: CollisionPolicy::LastWriteWins,
        prune_stale_artifacts: true,
    }
}

pub fn pipeline(
    backend: Arc<FakeBackend>,
    hosting_root: &Path,
    options: PipelineOptions,
) -> AssetPipeline {
    AssetPipeline::new(
        backend,
        Arc::new(HostingRepository::new(
            hosting_root.to_path_buf(),
            Url::parse(PUBLIC_BASE_URL).expect("valid base url"),
        )),
        options,
    )
}

/// File names in `<root>/<survey>/<language>`, sorted.
pub fn artifact_files(hosting_root: &Path, survey: &str, language: &str) -> Vec<String> {
    let dir = hosting_root.join(survey).join(language);
    let mut names: Vec<String> = match std::fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

pub fn read_mapping(hosting_root: &Path, survey: &str) -> Option<serde_json::Value> {
    let bytes = std::fs::read(hosting_root.join(survey).join("tts_mapping.json")).ok()?;
    Some(serde_json::from_slice(&bytes).expect("mapping is JSON"))
}

pub struct TestContext {
    pub client: TestClient,
    pub backend: Arc<FakeBackend>,
    pub hosting_root: PathBuf,
    pub shutdown: CancellationToken,
    _dir: TempDir,
}

impl TestContext {
    pub fn mapping(&self, survey: &str) -> Option<serde_json::Value> {
        read_mapping(&self.hosting_root, survey)
    }

    pub fn artifacts(&self, survey: &str, language: &str) -> Vec<String> {
        artifact_files(&self.hosting_root, survey, language)
    }
}

impl AsyncTestContext for TestContext {
    fn setup() -> impl std::future::Future<Output = Self> + Send {
        async {
            let dir = tempfile::tempdir().expect("Failed to create hosting root");
            let hosting_root = dir.path().to_path_buf();
            let backend = Arc::new(FakeBackend::new());
            let shutdown = CancellationToken::new();

            let pipeline = Arc::new(pipeline(backend.clone(), &hosting_root, default_options()));
            let controller = Arc::new(GenerationController::new(pipeline, shutdown.clone()));
            let app = build_router(controller);

            // Start server
            let listener = TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind listener");
            let addr = listener.local_addr().expect("Failed to get local addr");
            let base_url = format!("http://{}", addr);

            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            Self {
                client: TestClient::new(&base_url),
                backend,
                hosting_root,
                shutdown,
                _dir: dir,
            }
        }
    }

    fn teardown(self) -> impl std::future::Future<Output = ()> + Send {
        async move {
            self.shutdown.cancel();
        }
    }
}
