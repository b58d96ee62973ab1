//! Работа с аудио: декодирование, примитивы обработки и сведение музыкальной подложки

pub mod audio;
pub mod compositor;

pub use audio::{AudioSource, AudioTrack, DecodeAudio};
pub use compositor::{build_music_bed, compose_timeline, CompositionSettings};
