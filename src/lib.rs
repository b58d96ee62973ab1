//! Основной файл библиотеки ballad-sync
//!
//! Озвучивает текст и подкладывает под голос музыку, синхронизированную
//! с тематическими фрагментами текста. Конвейер одного задания:
//! синтез речи, перенос строк, выравнивание слов по строкам, тематическая
//! разбивка, генерация музыки и сведение.

pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod notification;
pub mod progress;
pub mod providers;
pub mod script;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::config::BalladConfig;
use crate::error::{BalladError, Result};
use crate::media::audio::{encode_wav, AudioSource, AudioTrack, DecodeAudio};
use crate::media::compositor::{compose_timeline, CompositionSettings};
use crate::progress::{ProcessStep, ProgressObserver, ProgressReporter, ProgressTracker};
use crate::providers::{
    generate_chunk_music, AnthropicChunker, BookChunk, LemonfoxClient, LyriaClient, MusicCache, MusicGenerator,
    SpeechSynthesizer, ThematicChunker,
};
use crate::script::aligner::{align_with_stats, AlignedEntry, AlignmentStats};
use crate::script::timeline::{locate_chunks, TimelineSpan};
use crate::script::wrapper::{LineRecord, WrappedText};

/// Результат одного задания
#[derive(Debug, Clone)]
pub struct BalladOutput {
    pub job_id: Uuid,
    /// Сведенная дорожка: голос и музыка
    pub audio: AudioTrack,
    pub lines: Vec<LineRecord>,
    pub aligned: Vec<AlignedEntry>,
    pub stats: AlignmentStats,
    pub chunks: Vec<BookChunk>,
    pub timeline: Vec<TimelineSpan>,
}

impl BalladOutput {
    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs()
    }

    /// Отчет без аудиоданных
    pub fn report(&self) -> BalladReport {
        BalladReport {
            job_id: self.job_id.to_string(),
            created_at: chrono::Local::now().to_rfc3339(),
            duration_secs: self.duration_secs(),
            sample_rate: self.audio.sample_rate,
            annotated_text: script::wrapper::annotate(&self.lines),
            alignment: self.stats,
            words: self.aligned.clone(),
            chunks: self.chunks.clone(),
            timeline: self.timeline.clone(),
        }
    }
}

/// JSON-отчет, сохраняемый рядом с результатом
#[derive(Debug, Clone, Serialize)]
pub struct BalladReport {
    pub job_id: String,
    pub created_at: String,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub annotated_text: String,
    pub alignment: AlignmentStats,
    pub words: Vec<AlignedEntry>,
    pub chunks: Vec<BookChunk>,
    pub timeline: Vec<TimelineSpan>,
}

/// Основная структура для работы с библиотекой
pub struct BalladSync {
    config: BalladConfig,
    speech: Arc<dyn SpeechSynthesizer>,
    chunker: Arc<dyn ThematicChunker>,
    music: Arc<dyn MusicGenerator>,
    progress_tracker: Option<Arc<ProgressTracker>>,
}

impl BalladSync {
    /// Создать экземпляр с HTTP клиентами Lemonfox, Anthropic и Lyria
    pub fn new(config: BalladConfig) -> Result<Self> {
        config.validate()?;
        config.validate_credentials()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let speech = Arc::new(LemonfoxClient::new(client.clone(), &config));
        let chunker = Arc::new(AnthropicChunker::new(client.clone(), &config));
        let music = Arc::new(LyriaClient::new(client, &config));

        Ok(Self::with_providers(config, speech, chunker, music))
    }

    /// Создать экземпляр с произвольными провайдерами
    pub fn with_providers(
        config: BalladConfig,
        speech: Arc<dyn SpeechSynthesizer>,
        chunker: Arc<dyn ThematicChunker>,
        music: Arc<dyn MusicGenerator>,
    ) -> Self {
        Self {
            config,
            speech,
            chunker,
            music,
            progress_tracker: None,
        }
    }

    pub fn config(&self) -> &BalladConfig {
        &self.config
    }

    /// Установить репортер прогресса
    pub fn set_progress_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        match &self.progress_tracker {
            Some(tracker) => tracker.set_reporter(reporter),
            None => self.progress_tracker = Some(Arc::new(ProgressTracker::with_reporter(reporter))),
        }
    }

    /// Добавить наблюдателя прогресса
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        self.progress_tracker
            .get_or_insert_with(|| Arc::new(ProgressTracker::new()))
            .add_observer(observer)
    }

    fn step(&self, step: ProcessStep, details: &str) {
        if let Some(t) = &self.progress_tracker {
            t.set_step(step);
            t.update_step_progress(0.0, Some(details.to_string()));
        }
    }

    fn step_done(&self, details: String) {
        if let Some(t) = &self.progress_tracker {
            t.update_step_progress(100.0, Some(details));
        }
    }

    /// Выполнить задание целиком и вернуть сведенную дорожку
    pub async fn process(&self, text: &str) -> Result<BalladOutput> {
        let job_id = Uuid::new_v4();
        log::info!("Starting job {}", job_id);

        self.config.validate()?;
        if text.trim().is_empty() {
            return Err(BalladError::Other("Input text is empty".to_string()));
        }

        // 1. Синтез речи
        self.step(ProcessStep::SpeechSynthesis, "Requesting narration");
        let speech = self.speech.synthesize(text).await.map_err(|e| {
            log::error!("Speech synthesis failed: {}", e);
            e
        })?;
        let narration = decode_blocking(speech.audio).await?;
        self.step_done(format!("Narration: {:.1}s", narration.duration_secs()));

        // 2. Перенос строк
        self.step(ProcessStep::LineWrapping, "Wrapping text");
        let wrapped = WrappedText::new(text, self.config.max_line_length);
        self.step_done(format!("{} lines", wrapped.lines.len()));

        // 3. Выравнивание
        self.step(ProcessStep::Alignment, "Aligning word timestamps");
        let (aligned, stats) = align_with_stats(&speech.timestamps, &wrapped.tokens);
        if stats.unmatched > 0 {
            log::warn!(
                "{} of {} words could not be mapped to a line",
                stats.unmatched,
                stats.matched + stats.unmatched
            );
        }
        self.step_done(format!("{} words aligned", stats.matched));

        // 4. Тематическая разбивка
        self.step(ProcessStep::Chunking, "Requesting thematic chunks");
        let chunks = self.chunker.chunk(&wrapped.annotated()).await.map_err(|e| {
            log::error!("Thematic chunking failed: {}", e);
            e
        })?;
        self.step_done(format!("{} chunks", chunks.len()));

        // 5. Генерация музыки
        self.step(ProcessStep::MusicGeneration, "Generating music");
        let cache = self.open_cache();
        let specs = generate_chunk_music(
            self.music.clone(),
            &chunks,
            self.config.max_concurrent_requests,
            cache.as_ref(),
            self.progress_tracker.clone(),
        )
        .await
        .map_err(|e| {
            log::error!("Music generation failed: {}", e);
            e
        })?;

        // 6. Таймлайн и сведение
        self.step(ProcessStep::Compositing, "Compositing");
        let timeline = locate_chunks(&specs, &aligned);
        let spans: Vec<TimelineSpan> = timeline.iter().map(|entry| entry.span()).collect();
        let settings = CompositionSettings::from(&self.config);

        let audio = run_blocking(move || compose_timeline(&narration, &timeline, &settings)).await?;

        if let Some(t) = &self.progress_tracker {
            t.complete();
        }
        log::info!(
            "Job {} finished: {:.1}s of audio, {} music segments",
            job_id,
            audio.duration_secs(),
            spans.len()
        );

        Ok(BalladOutput {
            job_id,
            audio,
            lines: wrapped.lines,
            aligned,
            stats,
            chunks,
            timeline: spans,
        })
    }

    /// Выполнить задание и записать WAV; при `write_report` рядом кладется JSON-отчет
    pub async fn process_to_file<P: AsRef<Path>>(&self, text: &str, output_path: P) -> Result<BalladOutput> {
        let output_path = output_path.as_ref();
        let output = self.process(text).await?;

        let wav_path = output_path.to_path_buf();
        let output = run_blocking(move || {
            encode_wav(&output.audio, &wav_path)?;
            Ok(output)
        })
        .await?;

        if self.config.write_report {
            let report_path = report_path_for(output_path);
            let json = serde_json::to_string_pretty(&output.report())?;
            tokio::fs::write(&report_path, json).await?;
            log::info!("Report saved to {}", report_path.display());
        }

        Ok(output)
    }

    fn open_cache(&self) -> Option<MusicCache> {
        if !self.config.use_caching {
            return None;
        }
        match MusicCache::new(&self.config) {
            Ok(cache) => Some(cache),
            Err(e) => {
                log::warn!("Music cache disabled: {}", e);
                None
            }
        }
    }
}

/// Путь отчета: то же имя, что у результата, с расширением `json`
pub fn report_path_for(output_path: &Path) -> PathBuf {
    output_path.with_extension("json")
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BalladError::AudioProcessing(format!("Blocking task failed: {}", e)))?
}

async fn decode_blocking(source: AudioSource) -> Result<AudioTrack> {
    if let Some(len) = source.encoded_len() {
        log::debug!("Decoding {} bytes of narration audio", len);
    }
    run_blocking(move || source.decode()).await
}

/// Публичный API: озвучить текст с музыкой и сохранить в `output_path`
pub async fn narrate_with_music<P: AsRef<Path>>(
    text: &str,
    output_path: P,
    config: BalladConfig,
) -> Result<BalladOutput> {
    BalladSync::new(config)?.process_to_file(text, output_path).await
}

/// Публичный API с отслеживанием прогресса
pub async fn narrate_with_music_and_progress<P: AsRef<Path>>(
    text: &str,
    output_path: P,
    config: BalladConfig,
    reporter: Box<dyn ProgressReporter>,
) -> Result<BalladOutput> {
    let mut ballad = BalladSync::new(config)?;
    ballad.set_progress_reporter(reporter);
    ballad.process_to_file(text, output_path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_path() {
        assert_eq!(report_path_for(Path::new("/tmp/out.wav")), PathBuf::from("/tmp/out.json"));
        assert_eq!(report_path_for(Path::new("story")), PathBuf::from("story.json"));
    }

    #[test]
    fn test_new_requires_credentials() {
        assert!(matches!(
            BalladSync::new(BalladConfig::default()),
            Err(BalladError::Configuration(_))
        ));
    }
}
