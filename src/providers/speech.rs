//! Клиент синтеза речи Lemonfox
//!
//! Запрашивает WAV с метками времени слов; аудио приходит в base64 внутри JSON.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;

use super::{ensure_success, SpeechResult, SpeechSynthesizer};
use crate::config::{BalladConfig, SpeechVoice};
use crate::error::{BalladError, Result};
use crate::media::audio::AudioSource;
use crate::script::aligner::TimestampEntry;

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    audio: String,
    #[serde(default)]
    word_timestamps: Vec<TimestampEntry>,
}

pub struct LemonfoxClient {
    client: Client,
    endpoint: String,
    api_key: String,
    voice: SpeechVoice,
}

impl LemonfoxClient {
    pub fn new(client: Client, config: &BalladConfig) -> Self {
        Self {
            client,
            endpoint: config.speech_endpoint.clone(),
            api_key: config.lemonfox_api_key.clone(),
            voice: config.speech_voice.clone(),
        }
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "input": text,
            "voice": self.voice.as_str(),
            "response_format": "wav",
            "word_timestamps": true,
        })
    }
}

/// Разбирает JSON ответа синтеза речи
pub fn parse_speech_response(body: &[u8]) -> Result<SpeechResult> {
    let response: SpeechResponse = serde_json::from_slice(body)
        .map_err(|e| BalladError::Speech(format!("Malformed speech response: {}", e)))?;

    let audio = STANDARD.decode(response.audio.trim())?;
    if audio.is_empty() {
        return Err(BalladError::Speech("Speech response contains no audio".to_string()));
    }
    if response.word_timestamps.is_empty() {
        log::warn!("Speech response contains no word timestamps");
    }

    Ok(SpeechResult {
        audio: AudioSource::Bytes(Bytes::from(audio)),
        timestamps: response.word_timestamps,
    })
}

#[async_trait]
impl SpeechSynthesizer for LemonfoxClient {
    async fn synthesize(&self, text: &str) -> Result<SpeechResult> {
        log::info!(
            "Sending speech request ({} chars, voice {})",
            text.chars().count(),
            self.voice.as_str()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(text))
            .send()
            .await?;
        let response = ensure_success(response, "Speech", BalladError::Speech).await?;
        let body = response.bytes().await?;

        let result = parse_speech_response(&body)?;
        log::info!("Received narration with {} word timestamps", result.timestamps.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speech_response() {
        let audio = STANDARD.encode(b"RIFF fake wav");
        let body = format!(
            r#"{{"audio": "{}", "word_timestamps": [{{"word": "Hello,", "start": 0.0, "end": 0.4}}, {{"word": "world.", "start": 0.45, "end": 0.9}}]}}"#,
            audio
        );

        let result = parse_speech_response(body.as_bytes()).unwrap();
        assert_eq!(result.audio, AudioSource::Bytes(Bytes::from_static(b"RIFF fake wav")));
        assert_eq!(result.timestamps.len(), 2);
        assert_eq!(result.timestamps[1], TimestampEntry::new("world.", 0.45, 0.9));
    }

    #[test]
    fn test_missing_timestamps_default_to_empty() {
        let body = format!(r#"{{"audio": "{}"}}"#, STANDARD.encode(b"abc"));
        let result = parse_speech_response(body.as_bytes()).unwrap();
        assert!(result.timestamps.is_empty());
    }

    #[test]
    fn test_bad_responses() {
        assert!(matches!(
            parse_speech_response(b"not json"),
            Err(BalladError::Speech(_))
        ));
        assert!(matches!(
            parse_speech_response(br#"{"audio": "%%%"}"#),
            Err(BalladError::Base64(_))
        ));
        assert!(matches!(
            parse_speech_response(br#"{"audio": ""}"#),
            Err(BalladError::Speech(_))
        ));
    }

    #[test]
    fn test_request_body() {
        let config = BalladConfig {
            speech_voice: SpeechVoice::Adam,
            ..BalladConfig::default()
        };
        let client = LemonfoxClient::new(Client::new(), &config);
        let body = client.request_body("Once upon a time");
        assert_eq!(body["voice"], "adam");
        assert_eq!(body["response_format"], "wav");
        assert_eq!(body["word_timestamps"], true);
        assert_eq!(body["input"], "Once upon a time");
    }
}
