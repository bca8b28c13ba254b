mod common;

use serde_json::{json, Value};
use std::time::Duration;

use common::StubServer;
use sports_writer::config::ImageOptions;
use sports_writer::error::UpstreamError;
use sports_writer::model::ImageContext;
use sports_writer::openai::{OpenAiClient, TextGenerator};
use sports_writer::sport_api::{SportApiClient, SportsData};

fn history_payload(home: &str) -> String {
    json!({"data": [
        {"home_team_name": home, "away_team_name": "Other", "home_ft_score": 1, "away_ft_score": 0, "match_date": "2026-09-01"}
    ]})
    .to_string()
}

fn sport_client(server: &StubServer) -> SportApiClient {
    SportApiClient::with_base_url(&server.base_url, Duration::from_secs(5)).unwrap()
}

fn openai_client(server: &StubServer) -> OpenAiClient {
    OpenAiClient::with_base_url(&server.base_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn upcoming_games_are_decoded_with_bearer_auth() {
    let games = json!({"data": [
        {"match_code": 101, "region": "England", "home": "Arsenal", "away": "Chelsea",
         "match_datetime": "2026-10-20 19:45:00", "time_zone": "UTC", "provider": "p",
         "odds": {"1": "1.9"}},
        {"match_code": 102, "region": "Spain", "home": "Betis", "away": "Sevilla",
         "match_datetime": "2026-10-21 20:00:00", "odds": []}
    ]});
    let server = StubServer::start(vec![("/games", 200, games.to_string())]).await;

    let records = sport_client(&server).fetch_upcoming("sport-key").await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].match_code, "101");
    assert_eq!(records[1].home, "Betis");

    let requests = server.requests().await;
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sport-key"));
}

#[tokio::test]
async fn zero_games_is_an_empty_list() {
    let server = StubServer::start(vec![("/games", 200, r#"{"data":[]}"#.into())]).await;
    let records = sport_client(&server).fetch_upcoming("k").await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn non_200_and_bad_json_are_upstream_errors() {
    let server = StubServer::start(vec![
        ("/regions", 503, r#"{"message":"down"}"#.into()),
        ("/games", 200, "<html>".into()),
    ])
    .await;
    let client = sport_client(&server);

    let err = client.fetch_regions("k").await.unwrap_err();
    assert!(matches!(err, UpstreamError::Status { status: 503, .. }));
    let err = client.fetch_upcoming("k").await.unwrap_err();
    assert!(matches!(err, UpstreamError::Decode { .. }));
}

#[tokio::test]
async fn regions_are_unwrapped() {
    let body = json!({"data": [{"name": "England", "leagues": [39, 40]}]}).to_string();
    let server = StubServer::start(vec![("/regions", 200, body)]).await;
    let regions = sport_client(&server).fetch_regions("k").await.unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].name, "England");
    assert_eq!(regions[0].leagues, json!([39, 40]));
}

#[tokio::test]
async fn statistics_collect_all_three_sets() {
    let server = StubServer::start(vec![
        ("/stats/77/home-matches", 200, history_payload("Home")),
        ("/stats/77/away-matches", 200, history_payload("Away")),
        ("/stats/77/head-to-head", 200, r#"{"error":null,"data":[]}"#.into()),
    ])
    .await;

    let stats = sport_client(&server).fetch_statistics("k", "77").await.unwrap();
    assert_eq!(
        stats.home_matches.unwrap()[0].home_team_name.as_deref(),
        Some("Home")
    );
    assert_eq!(
        stats.away_matches.unwrap()[0].home_team_name.as_deref(),
        Some("Away")
    );
    assert_eq!(stats.head_to_head, Some(vec![]));
}

#[tokio::test]
async fn any_failed_statistics_set_yields_none() {
    let server = StubServer::start(vec![
        ("/stats/1/home-matches", 200, history_payload("Home")),
        ("/stats/1/away-matches", 500, "{}".into()),
        ("/stats/1/head-to-head", 200, history_payload("H2H")),
        ("/stats/2/home-matches", 200, history_payload("Home")),
        ("/stats/2/away-matches", 200, history_payload("Away")),
        ("/stats/2/head-to-head", 200, r#"{"error":"limit reached"}"#.into()),
    ])
    .await;
    let client = sport_client(&server);

    assert!(client.fetch_statistics("k", "1").await.is_none());
    assert!(client.fetch_statistics("k", "2").await.is_none());
}

#[tokio::test]
async fn article_and_title_come_from_chat_completions() {
    let completion = json!({"choices": [{"message": {"role": "assistant", "content": "\"North London Derby Preview\""}}]});
    let server = StubServer::start(vec![("/chat/completions", 200, completion.to_string())]).await;
    let client = openai_client(&server);

    let article = client.generate_article("sk", "gpt-4o", "PROMPT").await;
    assert_eq!(article.as_deref(), Some("\"North London Derby Preview\""));
    let title = client.generate_title("Some body", "sk").await;
    assert_eq!(title, "North London Derby Preview");

    let requests = server.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk"));
    let body: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["messages"][1]["content"], "PROMPT");
    let body: Value = serde_json::from_str(&requests[1].body).unwrap();
    assert_eq!(body["model"], "gpt-3.5-turbo");
}

#[tokio::test]
async fn failed_generation_is_none_or_empty() {
    let server = StubServer::start(vec![("/chat/completions", 429, "{}".into())]).await;
    let client = openai_client(&server);
    assert!(client.generate_article("sk", "gpt-4o", "p").await.is_none());
    assert_eq!(client.generate_title("body", "sk").await, "");

    let server = StubServer::start(vec![("/chat/completions", 200, r#"{"choices":[]}"#.into())]).await;
    let client = openai_client(&server);
    assert!(client.generate_article("sk", "gpt-4o", "p").await.is_none());
}

#[tokio::test]
async fn image_generation_returns_first_url() {
    let body = json!({"data": [{"url": "https://img.example/generated.png"}]}).to_string();
    let server = StubServer::start(vec![("/images/generations", 200, body)]).await;
    let client = openai_client(&server);
    let options = ImageOptions {
        size: "1792x1024".into(),
        quality: "hd".into(),
    };
    let ctx = ImageContext {
        home: "Arsenal".into(),
        away: "Chelsea".into(),
    };

    let url = client.generate_image("sk", &options, Some(&ctx)).await;
    assert_eq!(url.as_deref(), Some("https://img.example/generated.png"));

    let requests = server.requests().await;
    let sent: Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(sent["model"], "dall-e-3");
    assert_eq!(sent["size"], "1792x1024");
    assert_eq!(sent["quality"], "hd");
    assert!(sent["prompt"].as_str().unwrap().contains("Arsenal vs Chelsea"));
}

#[tokio::test]
async fn image_generation_without_url_is_none() {
    let server = StubServer::start(vec![("/images/generations", 200, r#"{"data":[]}"#.into())]).await;
    let client = openai_client(&server);
    assert!(client
        .generate_image("sk", &ImageOptions::default(), None)
        .await
        .is_none());
}
