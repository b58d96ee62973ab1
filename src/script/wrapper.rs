//! Модуль переноса текста
//!
//! Жадный перенос по словам в строки фиксированной ширины с нумерацией
//! и построение таблицы слово → строка для последующего выравнивания.

use serde::{Deserialize, Serialize};

/// Максимальная длина строки по умолчанию (в символах)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 120;

/// Знаки, срезаемые с краев слова при нормализации
const STRIP_CHARS: &[char] = &[
    '.', ',', '?', '!', ';', ':', '"', '“', '”', '‘', '’', '(', ')', '[', ']',
];

/// Пронумерованная строка перенесенного текста
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    /// Номер строки, начиная с 0
    pub line_index: usize,
    /// Текст строки без завершающего пробела
    pub text: String,
}

/// Нормализованное слово с номером строки, в которой оно стоит
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordToken {
    pub normalized_word: String,
    pub line_index: usize,
}

/// Результат переноса: строки и таблица слово → строка
#[derive(Debug, Clone, Default)]
pub struct WrappedText {
    pub lines: Vec<LineRecord>,
    pub tokens: Vec<WordToken>,
}

impl WrappedText {
    /// Перенести текст и построить таблицу слов
    pub fn new(text: &str, max_line_length: usize) -> Self {
        let lines = wrap_text(text, max_line_length);
        let tokens = word_tokens(&lines);
        log::debug!(
            "Wrapped text into {} lines ({} word tokens, max length {})",
            lines.len(),
            tokens.len(),
            max_line_length
        );
        Self { lines, tokens }
    }

    /// Текст в формате `[Line N] ...` для тематической разбивки
    pub fn annotated(&self) -> String {
        annotate(&self.lines)
    }
}

/// Нормализует слово: срезает пунктуацию и кавычки по краям, приводит к нижнему регистру
pub fn normalize_word(word: &str) -> String {
    word.trim_matches(STRIP_CHARS).to_lowercase()
}

/// Слово целиком состоит из ASCII-пунктуации (пустая строка тоже считается)
pub fn is_punctuation_only(word: &str) -> bool {
    word.chars().all(|c| c.is_ascii_punctuation())
}

/// Жадный перенос текста по словам.
///
/// Исходные переводы строк игнорируются. Слово длиннее `max_line_length`
/// не разбивается и занимает отдельную строку.
pub fn wrap_text(text: &str, max_line_length: usize) -> Vec<LineRecord> {
    let mut lines = Vec::new();
    let mut current = String::new();
    // Длина накопителя в символах, включая завершающий пробел
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + word_len + 1 > max_line_length {
            lines.push(LineRecord {
                line_index: lines.len(),
                text: current.trim_end().to_string(),
            });
            current.clear();
            current_len = 0;
        }

        current.push_str(word);
        current.push(' ');
        current_len += word_len + 1;
    }

    if current_len > 0 {
        lines.push(LineRecord {
            line_index: lines.len(),
            text: current.trim_end().to_string(),
        });
    }

    lines
}

/// Строит таблицу слово → строка в порядке следования слов.
///
/// Слова, ставшие пустыми после нормализации, в таблицу не попадают:
/// иначе они совпадали бы с любым другим пустым словом.
pub fn word_tokens(lines: &[LineRecord]) -> Vec<WordToken> {
    lines
        .iter()
        .flat_map(|line| {
            line.text.split_whitespace().filter_map(move |word| {
                let normalized_word = normalize_word(word);
                if normalized_word.is_empty() {
                    None
                } else {
                    Some(WordToken {
                        normalized_word,
                        line_index: line.line_index,
                    })
                }
            })
        })
        .collect()
}

/// Форматирует строки как `[Line N] text`, по одной на строку
pub fn annotate(lines: &[LineRecord]) -> String {
    lines
        .iter()
        .map(|line| format!("[Line {}] {}", line.line_index, line.text))
        .collect::<Vec<_>>()
        .join("\n")
}
