use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ImageOptions;
use crate::error::UpstreamError;
use crate::model::ImageContext;
use crate::openai::model::{ChatMessage, ChatRequest, ChatResponse, ImageRequest, ImageResponse};

pub mod model;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";

const ARTICLE_SYSTEM_PROMPT: &str = "You are a professional sports content writer.";
const TITLE_SYSTEM_PROMPT: &str =
    "You are a title generator. Create a concise, engaging title for a blog post based on the given content.";
const TITLE_MODEL: &str = "gpt-3.5-turbo";
const IMAGE_MODEL: &str = "dall-e-3";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Article body, or `None` on any transport, status or decode failure.
    async fn generate_article(&self, api_key: &str, model: &str, prompt: &str) -> Option<String>;

    /// Best-effort title. Empty on failure.
    async fn generate_title(&self, content: &str, api_key: &str) -> String;

    /// URL of a generated illustration, or `None`.
    async fn generate_image(
        &self,
        api_key: &str,
        options: &ImageOptions,
        context: Option<&ImageContext>,
    ) -> Option<String>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(OPENAI_API_BASE, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url).context("invalid OpenAI base URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent("sports-writer/0.1")
            .no_proxy()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    pub fn build_request<B: Serialize>(
        &self,
        api_key: &str,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path {}", path))?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build OpenAI request")
    }

    async fn post_json<B, R>(&self, api_key: &str, path: &str, body: &B) -> Result<R, UpstreamError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let request = self
            .build_request(api_key, path, body)
            .map_err(|e| UpstreamError::Payload {
                endpoint: path.to_string(),
                message: format!("{:#}", e),
            })?;
        debug!(url = %request.url(), "OpenAI request");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|source| UpstreamError::Transport {
                endpoint: path.to_string(),
                source,
            })?;
        let status = res.status();
        let text = res.text().await.map_err(|source| UpstreamError::Transport {
            endpoint: path.to_string(),
            source,
        })?;
        if status != StatusCode::OK {
            return Err(UpstreamError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }
        serde_json::from_str(&text).map_err(|source| UpstreamError::Decode {
            endpoint: path.to_string(),
            source,
        })
    }

    async fn chat(&self, api_key: &str, request: &ChatRequest) -> Result<Option<String>, UpstreamError> {
        let resp: ChatResponse = self.post_json(api_key, "chat/completions", request).await?;
        Ok(resp.first_content())
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate_article(&self, api_key: &str, model: &str, prompt: &str) -> Option<String> {
        let request = article_request(model, prompt);
        match self.chat(api_key, &request).await {
            Ok(Some(content)) if !content.trim().is_empty() => Some(content),
            Ok(_) => {
                warn!(model, "completion contained no content");
                None
            }
            Err(e) => {
                warn!(model, error = %e, "article generation failed");
                None
            }
        }
    }

    async fn generate_title(&self, content: &str, api_key: &str) -> String {
        if api_key.trim().is_empty() {
            warn!("OpenAI API key is missing for title generation");
            return String::new();
        }
        match self.chat(api_key, &title_request(content)).await {
            Ok(Some(title)) => clean_title(&title),
            Ok(None) => String::new(),
            Err(e) => {
                warn!(error = %e, "title generation failed");
                String::new()
            }
        }
    }

    async fn generate_image(
        &self,
        api_key: &str,
        options: &ImageOptions,
        context: Option<&ImageContext>,
    ) -> Option<String> {
        if api_key.trim().is_empty() {
            warn!("OpenAI API key is missing for image generation");
            return None;
        }
        let request = image_request(options, context);
        match self
            .post_json::<_, ImageResponse>(api_key, "images/generations", &request)
            .await
        {
            Ok(resp) => {
                let url = resp.data.into_iter().next().and_then(|d| d.url);
                match &url {
                    Some(u) => info!(url = %u, "generated featured image"),
                    None => warn!("no image URL in image generation response"),
                }
                url
            }
            Err(e) => {
                warn!(error = %e, "image generation failed");
                None
            }
        }
    }
}

pub fn article_request(model: &str, prompt: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(ARTICLE_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ],
    }
}

pub fn title_request(content: &str) -> ChatRequest {
    ChatRequest {
        model: TITLE_MODEL.to_string(),
        messages: vec![
            ChatMessage::system(TITLE_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Generate a compelling title for this blog post content:\n\n{}",
                content
            )),
        ],
    }
}

pub fn image_request(options: &ImageOptions, context: Option<&ImageContext>) -> ImageRequest {
    let prompt = match context {
        Some(ctx) if !ctx.home.is_empty() && !ctx.away.is_empty() => {
            contextual_image_prompt(ctx, &options.size)
        }
        _ => fallback_image_prompt(&options.size).to_string(),
    };
    ImageRequest {
        model: IMAGE_MODEL.to_string(),
        prompt,
        n: 1,
        size: options.size.clone(),
        quality: options.is_hd().then(|| "hd".to_string()),
    }
}

fn contextual_image_prompt(ctx: &ImageContext, size: &str) -> String {
    let (home, away) = (&ctx.home, &ctx.away);
    match size {
        "1792x1024" => format!(
            "Wide panoramic view of a football stadium during {} vs {} match, dynamic crowd atmosphere, team colors prominently displayed, professional sports photography style, vibrant lighting",
            home, away
        ),
        "1024x1792" => format!(
            "Vertical composition football match poster for {} vs {}, bold team logos, dynamic player silhouettes, modern graphic design, social media optimized layout",
            home, away
        ),
        _ => format!(
            "Dynamic football stadium scene with {} and {} jerseys, vibrant sports photography style, balanced composition",
            home, away
        ),
    }
}

fn fallback_image_prompt(size: &str) -> &'static str {
    match size {
        "1792x1024" => "Wide panoramic football stadium view with dramatic lighting, crowd atmosphere, professional sports photography",
        "1024x1792" => "Vertical football match preview poster with dynamic design, modern sports graphics, social media format",
        _ => "Football match preview poster with stadium and players, balanced composition",
    }
}

fn clean_title(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}
