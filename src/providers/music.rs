//! Клиент генерации музыки Lyria (Vertex AI predict)

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;

use super::{ensure_success, MusicGenerator};
use crate::config::BalladConfig;
use crate::error::{BalladError, Result};

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: String,
}

pub struct LyriaClient {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl LyriaClient {
    pub fn new(client: Client, config: &BalladConfig) -> Self {
        Self {
            client,
            endpoint: config.music_endpoint(),
            access_token: config.google_access_token.clone(),
        }
    }

    fn request_body(prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "instances": [{ "prompt": prompt, "sample_count": 1 }],
            "parameters": {},
        })
    }
}

/// Достает аудио первого предсказания из ответа predict
pub fn parse_predict_response(body: &[u8]) -> Result<Bytes> {
    let response: PredictResponse = serde_json::from_slice(body)
        .map_err(|e| BalladError::MusicGeneration(format!("Malformed predict response: {}", e)))?;

    let prediction = response
        .predictions
        .into_iter()
        .next()
        .ok_or_else(|| BalladError::MusicGeneration("Predict response has no predictions".to_string()))?;

    Ok(Bytes::from(STANDARD.decode(prediction.bytes_base64_encoded.trim())?))
}

#[async_trait]
impl MusicGenerator for LyriaClient {
    async fn generate(&self, prompt: &str) -> Result<Bytes> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&Self::request_body(prompt))
            .send()
            .await?;
        let response = ensure_success(response, "Lyria", BalladError::MusicGeneration).await?;
        let body = response.bytes().await?;

        let audio = parse_predict_response(&body)?;
        log::info!("Generated music clip ({} bytes)", audio.len());
        Ok(audio)
    }
}
