use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::warn;
use twinframe_contracts::generation::{GenerateImageRequest, GenerateImageResponse};

/// Remote image generation. Failures come back inside the response's `error`
/// field so the caller can show them verbatim; nothing is retried.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, request: &GenerateImageRequest) -> GenerateImageResponse;
}

#[derive(Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Arc<dyn ImageGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<G: ImageGenerator + 'static>(&mut self, generator: G) {
        self.generators
            .insert(generator.name().to_string(), Arc::new(generator));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageGenerator>> {
        self.generators.get(name.trim()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.generators.keys().cloned().collect()
    }
}

pub fn default_generator_registry(generate_url: &str) -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    registry.register(DryrunGenerator);
    registry.register(HttpGenerator::new(generate_url));
    registry
}

/// Posts `{prompt, imageUrls}` as JSON to a generation endpoint.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    endpoint: String,
    http: HttpClient,
}

impl HttpGenerator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, HttpClient::new())
    }

    pub fn with_client(endpoint: impl Into<String>, http: HttpClient) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }
}

#[async_trait]
impl ImageGenerator for HttpGenerator {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, request: &GenerateImageRequest) -> GenerateImageResponse {
        let response = match self.http.post(&self.endpoint).json(request).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(endpoint = %self.endpoint, error = %err, "generation request failed");
                return GenerateImageResponse::failure(format!("Generation request failed: {err}"));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "generation response body read failed");
                return GenerateImageResponse::failure(format!(
                    "Generation response could not be read: {err}"
                ));
            }
        };

        match serde_json::from_str::<GenerateImageResponse>(&body) {
            Ok(parsed) if status.is_success() || parsed.error.is_some() => {
                if let Some(error) = parsed.error.as_deref() {
                    warn!(status = status.as_u16(), %error, "generator reported failure");
                }
                parsed
            }
            _ => {
                warn!(status = status.as_u16(), "generation endpoint returned an unusable reply");
                GenerateImageResponse::failure(format!(
                    "Generation failed ({})",
                    status.as_u16()
                ))
            }
        }
    }
}

/// Offline generator that answers with a deterministic placeholder URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunGenerator;

pub const DRYRUN_IMAGE_BASE: &str = "https://dryrun.twinframe.invalid/generated";

#[async_trait]
impl ImageGenerator for DryrunGenerator {
    fn name(&self) -> &str {
        "dryrun"
    }

    async fn generate(&self, request: &GenerateImageRequest) -> GenerateImageResponse {
        let id = stable_hash(&json!({
            "prompt": request.prompt,
            "image_urls": request.image_urls,
        }));
        GenerateImageResponse {
            image_url: Some(format!("{DRYRUN_IMAGE_BASE}/{}.png", &id[..16])),
            revised_prompt: Some(request.prompt.clone()),
            error: None,
        }
    }
}

fn stable_hash(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    async fn serve(app: Router) -> anyhow::Result<String> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(format!("http://{addr}/generate"))
    }

    fn request() -> GenerateImageRequest {
        GenerateImageRequest {
            prompt: "hello".to_string(),
            image_urls: vec!["https://cdn/a".to_string(), "https://cdn/b".to_string()],
        }
    }

    #[tokio::test]
    async fn dryrun_is_deterministic_per_request() {
        let first = DryrunGenerator.generate(&request()).await;
        let second = DryrunGenerator.generate(&request()).await;
        assert_eq!(first, second);
        assert!(first
            .image_url
            .as_deref()
            .unwrap_or_default()
            .starts_with(DRYRUN_IMAGE_BASE));

        let mut other = request();
        other.image_urls.reverse();
        assert_ne!(DryrunGenerator.generate(&other).await.image_url, first.image_url);
    }

    #[test]
    fn registry_lists_builtin_generators() {
        let registry = default_generator_registry("http://127.0.0.1:9/generate");
        assert_eq!(registry.names(), vec!["dryrun", "http"]);
        assert!(registry.get(" dryrun ").is_some());
        assert!(registry.get("openai").is_none());
    }

    #[tokio::test]
    async fn http_generator_posts_camel_case_body() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/generate",
            post(|Json(body): Json<Value>| async move {
                let urls = body["imageUrls"]
                    .as_array()
                    .map(|rows| rows.len())
                    .unwrap_or(0);
                Json(json!({
                    "imageUrl": format!("https://cdn/out-{urls}.png"),
                    "revisedPrompt": body["prompt"],
                }))
            }),
        );
        let endpoint = serve(app).await?;

        let response = HttpGenerator::new(endpoint).generate(&request()).await;
        assert_eq!(response.image_url.as_deref(), Some("https://cdn/out-2.png"));
        assert_eq!(response.revised_prompt.as_deref(), Some("hello"));
        assert_eq!(response.error, None);
        Ok(())
    }

    #[tokio::test]
    async fn http_generator_passes_remote_error_through() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/generate",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "Model is overloaded"})),
                )
            }),
        );
        let endpoint = serve(app).await?;

        let response = HttpGenerator::new(endpoint).generate(&request()).await;
        assert_eq!(response.error.as_deref(), Some("Model is overloaded"));
        Ok(())
    }

    #[tokio::test]
    async fn http_generator_reports_unparseable_failures_with_status() -> anyhow::Result<()> {
        let app = Router::new().route(
            "/generate",
            post(|| async { (StatusCode::BAD_GATEWAY, "bad gateway") }),
        );
        let endpoint = serve(app).await?;

        let response = HttpGenerator::new(endpoint).generate(&request()).await;
        assert_eq!(response.error.as_deref(), Some("Generation failed (502)"));
        Ok(())
    }
}
