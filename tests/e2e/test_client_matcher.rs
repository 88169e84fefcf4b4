use axum::{http::StatusCode, routing::get, Json, Router};
use pretty_assertions::assert_eq;
use std::time::Duration;
use survey_tts::domain::playback::{ClickOutcome, ClientMatcher, ElementId, Lookup};
use survey_tts::infrastructure::mapping_client::MappingClient;
use tokio::net::TcpListener;

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client() -> MappingClient {
    MappingClient::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn it_should_play_clicked_text_from_a_fetched_mapping() {
    let base = serve(Router::new().route(
        "/S1/tts_mapping.json",
        get(|| async { Json(serde_json::json!({ "helloworld": "https://host/a.wav" })) }),
    ))
    .await;

    let fetched = client().fetch(&format!("{base}/S1/tts_mapping.json")).await;
    let mut matcher = ClientMatcher::from_fetch(fetched);
    let element = ElementId::from("question-1");

    assert_eq!(
        matcher.click(&element, "  Hello, World!  "),
        ClickOutcome::Play {
            url: "https://host/a.wav".to_string()
        }
    );
    assert_eq!(
        matcher.click(&ElementId::from("question-2"), "Goodbye"),
        ClickOutcome::NoAudio(Lookup::Miss {
            key: "goodbye".to_string()
        })
    );
}

#[tokio::test]
async fn it_should_disable_lookup_when_mapping_is_missing() {
    let base = serve(Router::new()).await;

    let fetched = client().fetch(&format!("{base}/S1/tts_mapping.json")).await;
    assert!(fetched.is_err());

    let matcher = ClientMatcher::from_fetch(fetched);
    assert_eq!(matcher.resolve("Hello world"), Lookup::Disabled);
}

#[tokio::test]
async fn it_should_disable_lookup_when_mapping_is_malformed() {
    let base = serve(Router::new().route(
        "/S1/tts_mapping.json",
        get(|| async { (StatusCode::OK, "[1, 2, 3]") }),
    ))
    .await;

    let matcher =
        ClientMatcher::from_fetch(client().fetch(&format!("{base}/S1/tts_mapping.json")).await);
    assert!(!matcher.is_enabled());
}
