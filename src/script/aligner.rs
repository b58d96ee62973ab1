//! Модуль выравнивания меток времени по строкам
//!
//! Слова с метками времени от синтеза речи сопоставляются с таблицей
//! слово → строка однонаправленным курсором: курсор только движется вперед,
//! каждое слово таблицы используется не более одного раза.

use serde::{Deserialize, Serialize};

use super::wrapper::{is_punctuation_only, normalize_word, WordToken};

/// Номер строки для слова, которое не удалось сопоставить
pub const UNMATCHED_LINE: i64 = -1;

/// Слово с метками времени в том виде, в каком его вернул синтез речи
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampEntry {
    #[serde(rename = "word")]
    pub raw_word: String,
    /// Начало слова в секундах
    pub start: f64,
    /// Конец слова в секундах
    pub end: f64,
}

impl TimestampEntry {
    pub fn new(raw_word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            raw_word: raw_word.into(),
            start,
            end,
        }
    }
}

/// Слово с метками времени и номером строки (`-1`, если строка неизвестна)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedEntry {
    #[serde(rename = "word")]
    pub raw_word: String,
    pub start: f64,
    pub end: f64,
    pub line: i64,
}

impl AlignedEntry {
    /// Номер строки, если слово сопоставлено
    pub fn line_index(&self) -> Option<usize> {
        usize::try_from(self.line).ok()
    }

    pub fn is_matched(&self) -> bool {
        self.line != UNMATCHED_LINE
    }
}

/// Сводка по результату выравнивания
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlignmentStats {
    pub matched: usize,
    pub unmatched: usize,
    /// Отброшенные слова, состоящие только из пунктуации
    pub discarded: usize,
}

/// Состояние свертки: позиция курсора и накопленный результат
struct AlignState {
    cursor: usize,
    aligned: Vec<AlignedEntry>,
}

/// Выравнивает метки времени по строкам.
///
/// Слова из одной пунктуации отбрасываются. Для остальных курсор ищет вперед
/// первое совпадающее нормализованное слово; совпавшее слово поглощается.
/// Если совпадения нет, слово получает строку `-1`, а курсор остается в конце
/// таблицы: после промаха сопоставлений больше не будет.
pub fn align_timestamps(timestamps: &[TimestampEntry], tokens: &[WordToken]) -> Vec<AlignedEntry> {
    let (aligned, stats) = align_with_stats(timestamps, tokens);

    if stats.unmatched > 0 {
        log::warn!(
            "Aligned {} words, {} could not be mapped to a line ({} punctuation tokens discarded)",
            stats.matched,
            stats.unmatched,
            stats.discarded
        );
    } else {
        log::info!(
            "Aligned {} words ({} punctuation tokens discarded)",
            stats.matched,
            stats.discarded
        );
    }

    aligned
}

/// То же, что [`align_timestamps`], но со сводкой и без логирования
pub fn align_with_stats(
    timestamps: &[TimestampEntry],
    tokens: &[WordToken],
) -> (Vec<AlignedEntry>, AlignmentStats) {
    let discarded = timestamps
        .iter()
        .filter(|ts| is_punctuation_only(&ts.raw_word))
        .count();

    let initial = AlignState {
        cursor: 0,
        aligned: Vec::with_capacity(timestamps.len() - discarded),
    };

    let state = timestamps
        .iter()
        .filter(|ts| !is_punctuation_only(&ts.raw_word))
        .fold(initial, |mut state, ts| {
            let (line, cursor) = match_forward(tokens, state.cursor, &normalize_word(&ts.raw_word));
            state.cursor = cursor;
            state.aligned.push(AlignedEntry {
                raw_word: ts.raw_word.clone(),
                start: ts.start,
                end: ts.end,
                line,
            });
            state
        });

    let matched = state.aligned.iter().filter(|e| e.is_matched()).count();
    let stats = AlignmentStats {
        matched,
        unmatched: state.aligned.len() - matched,
        discarded,
    };

    (state.aligned, stats)
}

/// Ищет слово начиная с курсора; возвращает номер строки и новую позицию курсора
fn match_forward(tokens: &[WordToken], cursor: usize, word: &str) -> (i64, usize) {
    // Пустое слово ни с чем не совпадает и курсор не двигает
    if word.is_empty() {
        return (UNMATCHED_LINE, cursor);
    }

    let remaining = tokens.get(cursor..).unwrap_or(&[]);
    match remaining.iter().position(|token| token.normalized_word == word) {
        Some(offset) => {
            let idx = cursor + offset;
            (tokens[idx].line_index as i64, idx + 1)
        }
        None => (UNMATCHED_LINE, tokens.len()),
    }
}
