#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use sports_writer::config::{self, Config};
use sports_writer::db;
use sports_writer::model::MatchRecord;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
}

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// Example config with both keys set and no featured image.
pub fn test_config() -> Config {
    let mut cfg = config::parse(config::example()).unwrap();
    cfg.api.sport_api_key = "sport-key".into();
    cfg.api.openai_api_key = "openai-key".into();
    cfg.posts.featured_image_url = String::new();
    cfg.posts.dalle_image_generation = false;
    cfg
}

pub fn record(code: &str, region: &str, kickoff: DateTime<Utc>) -> MatchRecord {
    MatchRecord {
        match_code: code.into(),
        region: region.into(),
        team: String::new(),
        home: format!("{} Home", code),
        away: format!("{} Away", code),
        match_datetime: kickoff.to_rfc3339(),
        time_zone: "UTC".into(),
        provider: "scalesp".into(),
        odds: json!({"1": "2.00", "2": "3.50", "x": "3.10"}),
    }
}

/// Store one UNPROCESSED match per code, kicking off `hours` after `now()`.
pub async fn seed(pool: &sqlx::SqlitePool, matches: &[(&str, i64)]) {
    let records: Vec<_> = matches
        .iter()
        .map(|(code, hours)| record(code, "England", now() + Duration::hours(*hours)))
        .collect();
    db::upsert_ingested(pool, &records, now()).await.unwrap();
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Minimal HTTP/1.1 responder: one canned `(status, body)` per path, 404 otherwise.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start(routes: Vec<(&str, u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<HashMap<String, (u16, String)>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path.to_string(), (status, body)))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve(sock, &routes, &log).await;
                });
            }
        });

        Self {
            base_url: format!("http://{}/", addr),
            requests,
        }
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

async fn serve(
    mut sock: TcpStream,
    routes: &HashMap<String, (u16, String)>,
    log: &Mutex<Vec<RecordedRequest>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = sock.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let mut content_length = 0usize;
    let mut authorization = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            if name == "content-length" {
                content_length = value.trim().parse().unwrap_or(0);
            } else if name == "authorization" {
                authorization = Some(value.trim().to_string());
            }
        }
    }
    while buf.len() < header_end + content_length {
        let n = sock.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    log.lock().await.push(RecordedRequest {
        method,
        path: path.clone(),
        authorization,
        body,
    });

    let (status, payload) = routes
        .get(&path)
        .cloned()
        .unwrap_or((404, r#"{"message":"not found"}"#.to_string()));
    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        payload.len(),
        payload
    );
    sock.write_all(response.as_bytes()).await?;
    sock.shutdown().await
}
