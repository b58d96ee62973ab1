//! Тематическая разбивка текста через Anthropic Messages API
//!
//! Модель получает текст с номерами строк и возвращает JSON со списком
//! чанков и музыкальным описанием каждого.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ensure_success, ThematicChunker};
use crate::config::BalladConfig;
use crate::error::{BalladError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

const CHUNKING_INSTRUCTION: &str = r#"You segment prose into thematic sections and pick background music for each one.

The input is book text where every line starts with a marker like [Line 12].

Split the text into consecutive, non-overlapping sections. Start a new section where the scene, setting, mood or timeline changes, or where a major plot event happens. Every line must belong to exactly one section.

For each section describe the music that should play under it:
- music_mood: the feeling the music should evoke
- music_tempo: pace and rhythmic character
- music_genre: genre and style
- music_instrumentation: the main instruments
- music_prompt: one detailed description that combines mood, tempo, genre and instruments, suitable for a text-to-music model

Answer with JSON only, in exactly this shape:
{"chunks": [{"starting_line_number": 0, "ending_line_number": 3, "music_instrumentation": "...", "music_genre": "...", "music_mood": "...", "music_tempo": "...", "music_prompt": "..."}]}

Line numbers are the numbers from the [Line N] markers; both ends are inclusive."#;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid regex");
}

/// Тематический чанк с музыкальным описанием
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookChunk {
    pub starting_line_number: usize,
    pub ending_line_number: usize,
    #[serde(default)]
    pub music_instrumentation: String,
    #[serde(default)]
    pub music_genre: String,
    #[serde(default)]
    pub music_mood: String,
    #[serde(default)]
    pub music_tempo: String,
    #[serde(default)]
    pub music_prompt: String,
}

#[derive(Debug, Deserialize)]
struct ChunksList {
    chunks: Vec<BookChunk>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct AnthropicChunker {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicChunker {
    pub fn new(client: Client, config: &BalladConfig) -> Self {
        Self {
            client,
            endpoint: config.chunker_endpoint.clone(),
            api_key: config.anthropic_api_key.clone(),
            model: config.chunker_model.as_str().to_string(),
            max_tokens: config.chunker_max_tokens,
        }
    }

    fn request_body(&self, annotated_text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": CHUNKING_INSTRUCTION,
            "messages": [
                { "role": "user", "content": format!("Raw book text:\n{}", annotated_text) }
            ],
        })
    }
}

/// Извлекает список чанков из текста ответа модели.
///
/// JSON может быть обернут в пояснения или блок кода: берется фрагмент от
/// первой `{` до последней `}`. Чанки с перевернутым диапазоном отбрасываются.
pub fn parse_chunks_reply(reply: &str) -> Result<Vec<BookChunk>> {
    let list = extract_chunks_list(reply)?;

    let chunks: Vec<BookChunk> = list
        .chunks
        .into_iter()
        .filter(|chunk| {
            let valid = chunk.starting_line_number <= chunk.ending_line_number;
            if !valid {
                log::warn!(
                    "Dropping chunk with inverted range {}-{}",
                    chunk.starting_line_number,
                    chunk.ending_line_number
                );
            }
            valid
        })
        .collect();

    Ok(chunks)
}

/// Ищет список чанков: сначала в блоке ```json```, затем с каждой `{` ответа.
///
/// Разбирается только первое JSON значение, текст после него игнорируется.
fn extract_chunks_list(reply: &str) -> Result<ChunksList> {
    let text = FENCED_BLOCK
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map_or(reply, |m| m.as_str());

    let mut last_error = None;
    for (start, _) in text.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<ChunksList>();
        match values.next() {
            Some(Ok(list)) => return Ok(list),
            Some(Err(e)) => last_error = Some(e),
            None => break,
        }
    }

    Err(match last_error {
        Some(e) => BalladError::Chunking(format!("Malformed chunk list: {}", e)),
        None => BalladError::Chunking("Reply contains no JSON object".to_string()),
    })
}

/// Склеивает текстовые блоки ответа Messages API
fn reply_text(body: &[u8]) -> Result<String> {
    let response: MessagesResponse = serde_json::from_slice(body)
        .map_err(|e| BalladError::Chunking(format!("Malformed messages response: {}", e)))?;

    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect();

    if text.trim().is_empty() {
        return Err(BalladError::Chunking("Model reply is empty".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl ThematicChunker for AnthropicChunker {
    async fn chunk(&self, annotated_text: &str) -> Result<Vec<BookChunk>> {
        log::info!("Requesting thematic chunks from {}", self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(annotated_text))
            .send()
            .await?;
        let response = ensure_success(response, "Anthropic", BalladError::Chunking).await?;
        let body = response.bytes().await?;

        let chunks = parse_chunks_reply(&reply_text(&body)?)?;
        log::info!("Text split into {} thematic chunks", chunks.len());
        Ok(chunks)
    }
}
