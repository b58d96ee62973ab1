//! Модули работы с текстом: перенос строк, выравнивание и таймлайн чанков

pub mod aligner;
pub mod timeline;
pub mod wrapper;

pub use aligner::{align_timestamps, align_with_stats, AlignedEntry, AlignmentStats, TimestampEntry, UNMATCHED_LINE};
pub use timeline::{current_line_at, locate_chunks, ChunkSpec, TimelineEntry, TimelineSpan};
pub use wrapper::{annotate, normalize_word, wrap_text, word_tokens, LineRecord, WordToken, WrappedText};
