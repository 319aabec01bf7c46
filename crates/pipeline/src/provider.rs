//! Image-generation provider client.
//!
//! One [`GenerationProvider::generate`] call is one variation of a job.
//! The orchestrator never retries a failed call.

use std::time::Duration;

use async_trait::async_trait;
use atelier_core::generation::{variation_seed, GenerationConstraints, ValidatedJob};
use serde::{Deserialize, Serialize};

use crate::error::ProviderCallError;

/// Body of one provider call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub model: String,
    pub resolution: String,
    pub aspect_ratio: String,
    /// Prepared references as `data:` URLs, in submission order.
    pub references: Vec<String>,
    /// Zero-based index of the variation this call produces.
    #[serde(skip)]
    pub variation_index: usize,
}

impl ProviderRequest {
    /// Build the request for variation `index` of `job`.
    pub fn for_variation(job: &ValidatedJob, references: &[String], index: usize) -> Self {
        let GenerationConstraints {
            model,
            resolution,
            aspect_ratio,
            negative_prompt,
            seed,
        } = &job.constraints;

        Self {
            prompt: job.prompt.clone(),
            negative_prompt: negative_prompt.clone(),
            seed: variation_seed(*seed, index),
            model: model.to_string(),
            resolution: resolution.as_str().to_string(),
            aspect_ratio: aspect_ratio.clone(),
            references: references.to_vec(),
            variation_index: index,
        }
    }
}

/// Produces output image URLs for a single variation.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Run one call. An empty vector is a valid (unproductive) result.
    async fn generate(&self, request: &ProviderRequest) -> Result<Vec<String>, ProviderCallError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    images: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

/// Provider reached over HTTP: `POST <url>` with a JSON [`ProviderRequest`].
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpGenerationProvider {
    pub fn new(client: reqwest::Client, url: String, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            url,
            api_key,
            timeout,
        }
    }

    /// Return the response unchanged on 2xx, or an
    /// [`ProviderCallError::Api`] carrying status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderCallError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderCallError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(&self, request: &ProviderRequest) -> Result<Vec<String>, ProviderCallError> {
        let mut builder = self.client.post(&self.url).timeout(self.timeout).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = Self::ensure_success(builder.send().await?).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderCallError::InvalidResponse(e.to_string()))?;

        Ok(collect_urls(body))
    }
}

fn collect_urls(body: GenerateResponse) -> Vec<String> {
    body.images
        .into_iter()
        .filter_map(|img| img.url)
        .filter(|url| !url.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use atelier_core::generation::{validate_job, JobInput};
    use serde_json::json;

    use super::*;

    #[test]
    fn request_carries_constraints_and_offset_seed() {
        let job = validate_job(&JobInput {
            prompt: "a red fox".into(),
            resolution: Some("4K".into()),
            aspect_ratio: Some("16:9".into()),
            negative_prompt: Some("blurry".into()),
            seed: Some(100),
            ..Default::default()
        })
        .unwrap();

        let req = ProviderRequest::for_variation(&job, &["data:image/png;base64,AA==".into()], 2);
        assert_eq!(req.seed, Some(102));
        assert_eq!(req.variation_index, 2);

        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "prompt": "a red fox",
                "negative_prompt": "blurry",
                "seed": 102,
                "model": "standard",
                "resolution": "2K",
                "aspect_ratio": "16:9",
                "references": ["data:image/png;base64,AA=="]
            })
        );
    }

    #[test]
    fn unseeded_request_omits_seed() {
        let job = validate_job(&JobInput {
            prompt: "a red fox".into(),
            ..Default::default()
        })
        .unwrap();

        let value = serde_json::to_value(ProviderRequest::for_variation(&job, &[], 0)).unwrap();
        assert!(value.get("seed").is_none());
        assert!(value.get("negative_prompt").is_none());
    }

    #[test]
    fn response_urls_skip_missing_entries() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "images": [{"url": "https://cdn/1.png"}, {}, {"url": ""}, {"url": "https://cdn/2.png"}]
        }))
        .unwrap();

        assert_eq!(collect_urls(body), vec!["https://cdn/1.png", "https://cdn/2.png"]);
    }

    #[test]
    fn empty_response_is_unproductive_not_an_error() {
        let body: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(collect_urls(body).is_empty());
    }
}
