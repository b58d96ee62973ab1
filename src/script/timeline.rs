//! Модуль построения таймлайна музыки
//!
//! Переводит тематические чанки, заданные диапазонами строк, в абсолютное
//! время начала и конца внутри озвучки.

use serde::Serialize;

use super::aligner::AlignedEntry;
use crate::media::audio::AudioSource;

/// Тематический чанк: диапазон строк (включительно) и его музыка
#[derive(Debug, Clone)]
pub struct ChunkSpec<M = AudioSource> {
    pub start_line: usize,
    pub end_line: usize,
    pub music: M,
}

impl<M> ChunkSpec<M> {
    pub fn new(start_line: usize, end_line: usize, music: M) -> Self {
        Self {
            start_line,
            end_line,
            music,
        }
    }

    /// Попадает ли выровненное слово в диапазон строк чанка
    pub fn contains(&self, entry: &AlignedEntry) -> bool {
        entry
            .line_index()
            .map_or(false, |line| self.start_line <= line && line <= self.end_line)
    }
}

/// Положение музыки чанка на таймлайне озвучки (в секундах)
#[derive(Debug, Clone)]
pub struct TimelineEntry<M = AudioSource> {
    pub music: M,
    pub chunk_start: f64,
    pub chunk_end: f64,
}

impl<M> TimelineEntry<M> {
    /// Смещение начала в миллисекундах
    pub fn start_ms(&self) -> i64 {
        (self.chunk_start * 1000.0).round() as i64
    }

    /// Длительность в миллисекундах; ноль или меньше означает вырожденный чанк
    pub fn duration_ms(&self) -> i64 {
        ((self.chunk_end - self.chunk_start) * 1000.0).round() as i64
    }

    pub fn span(&self) -> TimelineSpan {
        TimelineSpan {
            chunk_start: self.chunk_start,
            chunk_end: self.chunk_end,
        }
    }
}

/// Таймлайн без аудиоданных, для отчета
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimelineSpan {
    pub chunk_start: f64,
    pub chunk_end: f64,
}

/// Вычисляет время начала и конца каждого чанка.
///
/// Чанк без единого сопоставленного слова пропускается. Порядок чанков сохраняется.
pub fn locate_chunks<M: Clone>(chunks: &[ChunkSpec<M>], aligned: &[AlignedEntry]) -> Vec<TimelineEntry<M>> {
    let mut timeline = Vec::with_capacity(chunks.len());

    for (i, chunk) in chunks.iter().enumerate() {
        let span = aligned
            .iter()
            .filter(|entry| chunk.contains(entry))
            .fold(None, |span: Option<(f64, f64)>, entry| match span {
                Some((start, end)) => Some((start.min(entry.start), end.max(entry.end))),
                None => Some((entry.start, entry.end)),
            });

        match span {
            Some((chunk_start, chunk_end)) => {
                log::debug!(
                    "Chunk {} (lines {}-{}) spans {:.3}s - {:.3}s",
                    i,
                    chunk.start_line,
                    chunk.end_line,
                    chunk_start,
                    chunk_end
                );
                timeline.push(TimelineEntry {
                    music: chunk.music.clone(),
                    chunk_start,
                    chunk_end,
                });
            }
            None => {
                log::warn!(
                    "Chunk {} (lines {}-{}) has no aligned words, skipping",
                    i,
                    chunk.start_line,
                    chunk.end_line
                );
            }
        }
    }

    timeline
}

/// Строка последнего слова, начавшегося не позже момента `t`.
///
/// Используется для подсветки текущей строки при воспроизведении.
pub fn current_line_at(t: f64, aligned: &[AlignedEntry]) -> Option<i64> {
    aligned
        .iter()
        .take_while(|entry| entry.start <= t)
        .last()
        .map(|entry| entry.line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::aligner::UNMATCHED_LINE;

    fn entry(word: &str, start: f64, end: f64, line: i64) -> AlignedEntry {
        AlignedEntry {
            raw_word: word.to_string(),
            start,
            end,
            line,
        }
    }

    fn sample_alignment() -> Vec<AlignedEntry> {
        vec![
            entry("the", 0.0, 0.2, 0),
            entry("quick", 0.25, 0.5, 0),
            entry("brown", 0.55, 0.9, 1),
            entry("fox", 1.0, 1.3, 2),
            entry("jumps", 1.4, 1.8, 3),
            entry("over", 1.9, 2.2, 4),
        ]
    }

    #[test]
    fn test_single_chunk_spans_all_words() {
        let aligned = vec![
            entry("The", 0.1, 0.3, 0),
            entry("quick", 0.35, 0.6, 0),
            entry("dog.", 2.5, 2.9, 0),
        ];
        let timeline = locate_chunks(&[ChunkSpec::new(0, 0, "clip")], &aligned);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].chunk_start, 0.1);
        assert_eq!(timeline[0].chunk_end, 2.9);
        assert_eq!(timeline[0].music, "clip");
    }

    #[test]
    fn test_disjoint_chunks_are_independent() {
        let aligned = sample_alignment();
        let chunks = vec![ChunkSpec::new(0, 0, "a"), ChunkSpec::new(2, 3, "b")];

        let timeline = locate_chunks(&chunks, &aligned);
        assert_eq!(timeline.len(), 2);
        assert_eq!((timeline[0].chunk_start, timeline[0].chunk_end), (0.0, 0.5));
        assert_eq!((timeline[1].chunk_start, timeline[1].chunk_end), (1.0, 1.8));
        assert_eq!(timeline[1].music, "b");
    }

    #[test]
    fn test_empty_chunk_is_dropped_and_order_kept() {
        let aligned = sample_alignment();
        let chunks = vec![
            ChunkSpec::new(4, 4, "late"),
            ChunkSpec::new(10, 12, "missing"),
            ChunkSpec::new(0, 1, "early"),
        ];

        let timeline = locate_chunks(&chunks, &aligned);
        let names: Vec<&str> = timeline.iter().map(|t| t.music).collect();
        assert_eq!(names, vec!["late", "early"]);
    }

    #[test]
    fn test_unmatched_words_never_selected() {
        let aligned = vec![
            entry("known", 0.0, 0.5, 0),
            entry("lost", 5.0, 6.0, UNMATCHED_LINE),
        ];
        let timeline = locate_chunks(&[ChunkSpec::new(0, 100, ())], &aligned);
        assert_eq!(timeline[0].chunk_end, 0.5);

        let all_lost = vec![entry("lost", 5.0, 6.0, UNMATCHED_LINE)];
        assert!(locate_chunks(&[ChunkSpec::new(0, 100, ())], &all_lost).is_empty());
    }

    #[test]
    fn test_overlapping_ranges_both_emitted() {
        let aligned = sample_alignment();
        let chunks = vec![ChunkSpec::new(0, 2, 1), ChunkSpec::new(2, 4, 2)];

        let timeline = locate_chunks(&chunks, &aligned);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].chunk_end, 1.3);
        assert_eq!(timeline[1].chunk_start, 1.0);
    }

    #[test]
    fn test_duration_and_offset_in_ms() {
        let entry = TimelineEntry {
            music: (),
            chunk_start: 1.2345,
            chunk_end: 3.0,
        };
        assert_eq!(entry.start_ms(), 1235);
        assert_eq!(entry.duration_ms(), 1766);

        let degenerate = TimelineEntry {
            music: (),
            chunk_start: 2.0,
            chunk_end: 2.0,
        };
        assert_eq!(degenerate.duration_ms(), 0);
    }

    #[test]
    fn test_current_line_at() {
        let aligned = sample_alignment();
        assert_eq!(current_line_at(-1.0, &aligned), None);
        assert_eq!(current_line_at(0.0, &aligned), Some(0));
        assert_eq!(current_line_at(0.7, &aligned), Some(1));
        assert_eq!(current_line_at(1.85, &aligned), Some(3));
        assert_eq!(current_line_at(100.0, &aligned), Some(4));
    }
}
