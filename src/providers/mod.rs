//! Внешние сервисы конвейера
//!
//! Синтез речи, тематическая разбивка и генерация музыки спрятаны за
//! трейтами, чтобы конвейер можно было собрать с другими провайдерами
//! или с заглушками в тестах.

pub mod cache;
pub mod chunker;
pub mod music;
pub mod speech;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use parking_lot::Mutex;
use reqwest::Response;
use tokio::sync::Semaphore;

use crate::error::{BalladError, Result};
use crate::media::audio::AudioSource;
use crate::progress::ProgressTracker;
use crate::script::aligner::TimestampEntry;
use crate::script::timeline::ChunkSpec;

pub use cache::MusicCache;
pub use chunker::{AnthropicChunker, BookChunk};
pub use music::LyriaClient;
pub use speech::LemonfoxClient;

/// Озвучка и метки времени слов
#[derive(Debug, Clone)]
pub struct SpeechResult {
    pub audio: AudioSource,
    pub timestamps: Vec<TimestampEntry>,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Озвучить текст и вернуть метки времени слов
    async fn synthesize(&self, text: &str) -> Result<SpeechResult>;
}

#[async_trait]
pub trait ThematicChunker: Send + Sync {
    /// Разбить текст в формате `[Line N] ...` на тематические чанки
    async fn chunk(&self, annotated_text: &str) -> Result<Vec<BookChunk>>;
}

#[async_trait]
pub trait MusicGenerator: Send + Sync {
    /// Сгенерировать клип по текстовому описанию; возвращает закодированное аудио
    async fn generate(&self, prompt: &str) -> Result<Bytes>;
}

/// Возвращает ответ, если статус успешный, иначе ошибку с телом ответа
pub(crate) async fn ensure_success(
    response: Response,
    service: &str,
    make_error: fn(String) -> BalladError,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(text) => text,
        Err(e) => format!("Failed to read error response: {}", e),
    };
    log::error!("{} API error (status {}): {}", service, status, body);
    Err(make_error(format!("{} returned status {}: {}", service, status, body)))
}

/// Генерирует музыку для всех чанков с ограничением параллелизма.
///
/// Чанки без промпта пропускаются. Любая ошибка генерации фатальна.
/// Результат идет в порядке чанков.
pub async fn generate_chunk_music(
    generator: Arc<dyn MusicGenerator>,
    chunks: &[BookChunk],
    max_concurrent: usize,
    cache: Option<&MusicCache>,
    tracker: Option<Arc<ProgressTracker>>,
) -> Result<Vec<ChunkSpec>> {
    let mut clips: Vec<Option<Bytes>> = vec![None; chunks.len()];
    let mut pending = Vec::new();

    for (i, chunk) in chunks.iter().enumerate() {
        let prompt = chunk.music_prompt.trim();
        if prompt.is_empty() {
            log::warn!(
                "Chunk {} (lines {}-{}) has no music prompt, skipping",
                i,
                chunk.starting_line_number,
                chunk.ending_line_number
            );
            continue;
        }
        match cache.and_then(|c| c.get(prompt)) {
            Some(audio) => clips[i] = Some(audio),
            None => pending.push((i, prompt.to_string())),
        }
    }

    let cached = clips.iter().filter(|c| c.is_some()).count();
    log::info!(
        "Generating music for {} chunks ({} from cache, max {} concurrent requests)",
        pending.len(),
        cached,
        max_concurrent
    );

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let completed = Arc::new(Mutex::new(0));
    let total = pending.len();

    let tasks: Vec<_> = pending
        .into_iter()
        .map(|(i, prompt)| {
            tokio::spawn(generate_one(
                generator.clone(),
                semaphore.clone(),
                i,
                prompt,
                ClipProgress {
                    completed: completed.clone(),
                    total,
                    tracker: tracker.clone(),
                },
            ))
        })
        .collect();

    // Готовые клипы кэшируются даже при ошибке соседнего чанка
    let mut first_error = None;
    for joined in join_all(tasks).await {
        let generated = joined
            .map_err(|e| BalladError::MusicGeneration(format!("Music task failed: {}", e)))
            .and_then(|result| result);

        match generated {
            Ok((i, prompt, audio)) => {
                if let Some(cache) = cache {
                    if let Err(e) = cache.put(&prompt, &audio) {
                        log::warn!("Failed to cache music for chunk {}: {}", i, e);
                    }
                }
                clips[i] = Some(audio);
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    Ok(chunks
        .iter()
        .zip(clips)
        .filter_map(|(chunk, clip)| {
            clip.map(|audio| {
                ChunkSpec::new(
                    chunk.starting_line_number,
                    chunk.ending_line_number,
                    AudioSource::Bytes(audio),
                )
            })
        })
        .collect())
}

/// Счетчик готовых клипов для отчета о прогрессе
struct ClipProgress {
    completed: Arc<Mutex<usize>>,
    total: usize,
    tracker: Option<Arc<ProgressTracker>>,
}

impl ClipProgress {
    // Отчет под блокировкой, чтобы прогресс этапа не откатывался назад
    fn record(&self) {
        let mut completed = self.completed.lock();
        *completed += 1;
        if let Some(tracker) = &self.tracker {
            tracker.update_step_progress(
                *completed as f32 / self.total as f32 * 100.0,
                Some(format!("Generated music {}/{}", *completed, self.total)),
            );
        }
    }
}

async fn generate_one(
    generator: Arc<dyn MusicGenerator>,
    semaphore: Arc<Semaphore>,
    index: usize,
    prompt: String,
    progress: ClipProgress,
) -> Result<(usize, String, Bytes)> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|e| BalladError::MusicGeneration(format!("Semaphore closed: {}", e)))?;

    log::debug!("Requesting music for chunk {}", index);
    let audio = generator.generate(&prompt).await?;
    if audio.is_empty() {
        return Err(BalladError::MusicGeneration(format!(
            "Empty audio for chunk {}",
            index
        )));
    }

    progress.record();
    Ok((index, prompt, audio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Генератор-заглушка: возвращает промпт как байты и считает параллельные вызовы
    struct EchoGenerator {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl EchoGenerator {
        fn new(fail_on: Option<&str>) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                fail_on: fail_on.map(str::to_string),
            }
        }
    }

    #[async_trait]
    impl MusicGenerator for EchoGenerator {
        async fn generate(&self, prompt: &str) -> Result<Bytes> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().push(prompt.to_string());

            // Поздние чанки отвечают быстрее ранних
            let delay = 30u64.saturating_sub(prompt.len() as u64 * 3);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.as_deref() == Some(prompt) {
                return Err(BalladError::MusicGeneration("quota exceeded".to_string()));
            }
            Ok(Bytes::from(prompt.to_string()))
        }
    }

    fn chunk(start: usize, end: usize, prompt: &str) -> BookChunk {
        BookChunk {
            starting_line_number: start,
            ending_line_number: end,
            music_prompt: prompt.to_string(),
            ..BookChunk::default()
        }
    }

    fn bytes_of(spec: &ChunkSpec) -> &[u8] {
        match &spec.music {
            AudioSource::Bytes(b) => b,
            AudioSource::File(_) => panic!("expected bytes"),
        }
    }

    #[tokio::test]
    async fn test_results_in_chunk_order() {
        let generator = Arc::new(EchoGenerator::new(None));
        let chunks = vec![chunk(0, 1, "a"), chunk(2, 3, "bbbb"), chunk(4, 9, "cccccccc")];

        let specs = generate_chunk_music(generator.clone(), &chunks, 3, None, None)
            .await
            .unwrap();

        assert_eq!(specs.len(), 3);
        assert_eq!(bytes_of(&specs[0]), b"a");
        assert_eq!(bytes_of(&specs[2]), b"cccccccc");
        assert_eq!((specs[1].start_line, specs[1].end_line), (2, 3));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let generator = Arc::new(EchoGenerator::new(None));
        let chunks: Vec<BookChunk> = (0..6).map(|i| chunk(i, i, &format!("p{}", i))).collect();

        generate_chunk_music(generator.clone(), &chunks, 2, None, None)
            .await
            .unwrap();

        assert_eq!(generator.calls.lock().len(), 6);
        assert!(generator.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_missing_prompt_skipped() {
        let generator = Arc::new(EchoGenerator::new(None));
        let chunks = vec![chunk(0, 0, "calm"), chunk(1, 1, "   "), chunk(2, 2, "tense")];

        let specs = generate_chunk_music(generator, &chunks, 4, None, None).await.unwrap();
        let starts: Vec<usize> = specs.iter().map(|s| s.start_line).collect();
        assert_eq!(starts, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_failure_is_fatal() {
        let generator = Arc::new(EchoGenerator::new(Some("bad")));
        let chunks = vec![chunk(0, 0, "good"), chunk(1, 1, "bad")];

        let result = generate_chunk_music(generator, &chunks, 4, None, None).await;
        assert!(matches!(result, Err(BalladError::MusicGeneration(_))));
    }

    #[tokio::test]
    async fn test_successful_clips_cached_when_another_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MusicCache::with_dir(dir.path(), None).unwrap();

        let generator = Arc::new(EchoGenerator::new(Some("bad")));
        let chunks = vec![chunk(0, 0, "bad"), chunk(1, 1, "good"), chunk(2, 2, "also good")];

        let result = generate_chunk_music(generator, &chunks, 4, Some(&cache), None).await;
        assert!(matches!(result, Err(BalladError::MusicGeneration(_))));

        assert_eq!(cache.get("good").unwrap(), Bytes::from_static(b"good"));
        assert_eq!(cache.get("also good").unwrap(), Bytes::from_static(b"also good"));
        assert!(cache.get("bad").is_none());
    }

    #[tokio::test]
    async fn test_cache_short_circuits_generation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MusicCache::with_dir(dir.path(), None).unwrap();
        cache.put("cached", &Bytes::from_static(b"from-cache")).unwrap();

        let generator = Arc::new(EchoGenerator::new(None));
        let chunks = vec![chunk(0, 0, "cached"), chunk(1, 1, "fresh")];

        let specs = generate_chunk_music(generator.clone(), &chunks, 4, Some(&cache), None)
            .await
            .unwrap();

        assert_eq!(bytes_of(&specs[0]), b"from-cache");
        assert_eq!(*generator.calls.lock(), vec!["fresh".to_string()]);
        // Новый клип попал в кэш
        assert_eq!(cache.get("fresh").unwrap(), Bytes::from_static(b"fresh"));
    }

    #[tokio::test]
    async fn test_progress_reported_per_clip() {
        use crate::notification::MemoryProgressObserver;
        use crate::progress::ProcessStep;

        let tracker = Arc::new(ProgressTracker::new());
        let observer = MemoryProgressObserver::new();
        tracker.add_observer(Box::new(observer.clone()));
        tracker.set_step(ProcessStep::MusicGeneration);

        let generator = Arc::new(EchoGenerator::new(None));
        let chunks = vec![chunk(0, 0, "x"), chunk(1, 1, "y")];
        generate_chunk_music(generator, &chunks, 1, None, Some(tracker.clone()))
            .await
            .unwrap();

        let last = observer.last().unwrap();
        assert_eq!(last.step_progress, 100.0);
        assert_eq!(last.details.as_deref(), Some("Generated music 2/2"));
    }
}
