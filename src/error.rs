//! Модуль обработки ошибок библиотеки ballad-sync
//!
//! Промахи выравнивания, пустые чанки и вырожденные длительности ошибками
//! не считаются: они кодируются в данных (`line = -1`, пропуск чанка).
//! Здесь только фатальные для задания ошибки.

use thiserror::Error;

/// Ошибки библиотеки ballad-sync
#[derive(Debug, Error)]
pub enum BalladError {
    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка декодирования base64 в ответе провайдера
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Ошибка записи WAV
    #[error("WAV encoding error: {0}")]
    WavEncoding(#[from] hound::Error),

    /// Ошибка синтеза речи
    #[error("Speech synthesis error: {0}")]
    Speech(String),

    /// Ошибка тематической разбивки текста
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// Ошибка генерации музыки
    #[error("Music generation error: {0}")]
    MusicGeneration(String),

    /// Аудио не удалось декодировать
    #[error("Audio decoding error: {0}")]
    AudioDecoding(String),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Файл не найден
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl From<&str> for BalladError {
    fn from(s: &str) -> Self {
        BalladError::Other(s.to_string())
    }
}

impl From<String> for BalladError {
    fn from(s: String) -> Self {
        BalladError::Other(s)
    }
}

/// Тип Result для библиотеки ballad-sync
pub type Result<T> = std::result::Result<T, BalladError>;
