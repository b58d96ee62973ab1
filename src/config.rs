//! Модуль конфигурации библиотеки ballad-sync
//!
//! Этот модуль содержит структуры и перечисления для настройки библиотеки.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BalladError, Result};

/// Голос для синтеза речи (Lemonfox)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeechVoice {
    /// Голос Sarah
    Sarah,
    /// Голос Heart
    Heart,
    /// Голос Bella
    Bella,
    /// Голос Michael
    Michael,
    /// Голос Adam
    Adam,
    /// Голос Nova
    Nova,
}

impl Default for SpeechVoice {
    fn default() -> Self {
        Self::Sarah
    }
}

impl SpeechVoice {
    /// Получить строковое представление голоса
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sarah => "sarah",
            Self::Heart => "heart",
            Self::Bella => "bella",
            Self::Michael => "michael",
            Self::Adam => "adam",
            Self::Nova => "nova",
        }
    }
}

/// Модель LLM для тематической разбивки текста
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChunkerModel {
    /// Claude 3.5 Sonnet
    ClaudeSonnet35,
    /// Claude Sonnet 4
    ClaudeSonnet4,
}

impl Default for ChunkerModel {
    fn default() -> Self {
        Self::ClaudeSonnet35
    }
}

impl ChunkerModel {
    /// Получить идентификатор модели для Messages API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeSonnet35 => "claude-3-5-sonnet-20240620",
            Self::ClaudeSonnet4 => "claude-sonnet-4-20250514",
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalladConfig {
    /// API ключ Lemonfox (синтез речи)
    pub lemonfox_api_key: String,
    /// Адрес API синтеза речи
    pub speech_endpoint: String,
    /// Голос синтеза речи
    pub speech_voice: SpeechVoice,
    /// API ключ Anthropic (тематическая разбивка)
    pub anthropic_api_key: String,
    /// Адрес Messages API
    pub chunker_endpoint: String,
    /// Модель для разбивки
    pub chunker_model: ChunkerModel,
    /// Лимит токенов ответа модели
    pub chunker_max_tokens: u32,
    /// OAuth токен доступа Google Cloud (генерация музыки)
    pub google_access_token: String,
    /// Проект Google Cloud с доступом к Lyria
    pub google_project_id: String,
    /// Регион Vertex AI
    pub google_location: String,
    /// Явный адрес модели Lyria (если не задан, собирается из проекта и региона)
    pub lyria_endpoint: Option<String>,
    /// Максимальная длина строки при переносе текста (в символах)
    pub max_line_length: usize,
    /// Длительность fade in/out музыки в миллисекундах
    pub fade_duration_ms: u32,
    /// Приглушение музыки под голосом, дБ (отрицательное значение)
    pub duck_db: f32,
    /// Максимальное количество одновременных запросов к API генерации музыки
    pub max_concurrent_requests: usize,
    /// Таймаут HTTP запросов в секундах
    pub request_timeout_secs: u64,
    /// Использовать кэширование сгенерированной музыки
    pub use_caching: bool,
    /// Директория для кэша
    pub cache_dir: Option<String>,
    /// Максимальный размер кэша в байтах
    pub max_cache_size: Option<u64>,
    /// Сохранять JSON-отчет рядом с результатом
    pub write_report: bool,
}

impl Default for BalladConfig {
    fn default() -> Self {
        Self {
            lemonfox_api_key: String::new(),
            speech_endpoint: "https://api.lemonfox.ai/v1/audio/speech".to_string(),
            speech_voice: SpeechVoice::default(),
            anthropic_api_key: String::new(),
            chunker_endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            chunker_model: ChunkerModel::default(),
            chunker_max_tokens: 4096,
            google_access_token: String::new(),
            google_project_id: String::new(),
            google_location: "us-central1".to_string(),
            lyria_endpoint: None,
            max_line_length: 120,
            fade_duration_ms: 2000,
            duck_db: -8.0,
            max_concurrent_requests: 4,
            request_timeout_secs: 120,
            use_caching: true,
            cache_dir: None,
            max_cache_size: Some(512 * 1024 * 1024), // 512 MB
            write_report: false,
        }
    }
}

impl BalladConfig {
    /// Загрузить конфигурацию из JSON файла; отсутствующие поля берутся по умолчанию
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BalladError::FileNotFound(format!("{}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Перекрыть ключи и адреса значениями из переменных окружения
    pub fn apply_env(mut self) -> Self {
        if let Ok(key) = std::env::var("LEMONFOX_API_KEY") {
            self.lemonfox_api_key = key;
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = key;
        }
        if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
            self.google_access_token = token;
        }
        if let Ok(project) = std::env::var("GOOGLE_CLOUD_PROJECT") {
            self.google_project_id = project;
        }
        if let Ok(endpoint) = std::env::var("LYRIA_ENDPOINT") {
            self.lyria_endpoint = Some(endpoint);
        }
        self
    }

    /// Адрес модели Lyria
    pub fn music_endpoint(&self) -> String {
        match &self.lyria_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}/publishers/google/models/lyria-002:predict",
                loc = self.google_location,
                project = self.google_project_id,
            ),
        }
    }

    /// Проверить параметры выравнивания и сведения
    pub fn validate(&self) -> Result<()> {
        if self.max_line_length == 0 {
            return Err(BalladError::Configuration(
                "max_line_length must be greater than zero".to_string(),
            ));
        }
        if !self.duck_db.is_finite() {
            return Err(BalladError::Configuration(format!(
                "duck_db must be a finite number, got {}",
                self.duck_db
            )));
        }
        if self.max_concurrent_requests == 0 {
            return Err(BalladError::Configuration(
                "max_concurrent_requests must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Проверить, что заданы ключи всех внешних сервисов
    pub fn validate_credentials(&self) -> Result<()> {
        for (value, name) in [
            (&self.lemonfox_api_key, "LEMONFOX_API_KEY"),
            (&self.anthropic_api_key, "ANTHROPIC_API_KEY"),
            (&self.google_access_token, "GOOGLE_ACCESS_TOKEN"),
        ] {
            if value.trim().is_empty() {
                log::error!("{} is empty", name);
                return Err(BalladError::Configuration(format!("{} is required", name)));
            }
        }
        if self.lyria_endpoint.is_none() && self.google_project_id.trim().is_empty() {
            return Err(BalladError::Configuration(
                "google_project_id or lyria_endpoint is required".to_string(),
            ));
        }
        Ok(())
    }
}
