//! Модуль сведения музыкальной подложки
//!
//! Собирает тихую подложку длиной с озвучку, накладывает на нее музыку
//! каждого чанка (зацикленную, обрезанную, с fade и приглушением) и
//! смешивает подложку с голосом.

use log::{debug, info, warn};

use super::audio::{
    apply_gain_db, apply_linear_fade, loop_to_length, ms_to_samples, overlay, AudioTrack, DecodeAudio,
};
use crate::config::BalladConfig;
use crate::error::Result;
use crate::script::timeline::TimelineEntry;

/// Параметры сведения
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionSettings {
    /// Длительность fade in/out в миллисекундах
    pub fade_duration_ms: u32,
    /// Приглушение музыки, дБ
    pub duck_db: f32,
}

impl Default for CompositionSettings {
    fn default() -> Self {
        Self {
            fade_duration_ms: 2000,
            duck_db: -8.0,
        }
    }
}

impl From<&BalladConfig> for CompositionSettings {
    fn from(config: &BalladConfig) -> Self {
        Self {
            fade_duration_ms: config.fade_duration_ms,
            duck_db: config.duck_db,
        }
    }
}

/// Строит музыкальную подложку с точной длиной `len` семплов на частоте `sample_rate`.
///
/// Вырожденные (нулевой или отрицательной длительности) и пустые клипы пропускаются.
/// Ошибка декодирования клипа прерывает сведение.
pub fn build_music_bed<M: DecodeAudio>(
    len: usize,
    sample_rate: u32,
    timeline: &[TimelineEntry<M>],
    settings: &CompositionSettings,
) -> Result<AudioTrack> {
    let mut bed = AudioTrack::silent(len, sample_rate);
    let fade_samples = ms_to_samples(settings.fade_duration_ms as i64, sample_rate);

    for (i, entry) in timeline.iter().enumerate() {
        let duration_ms = entry.duration_ms();
        if duration_ms <= 0 {
            warn!(
                "Timeline entry {} has non-positive duration ({} ms), skipping",
                i, duration_ms
            );
            continue;
        }

        let clip = entry.music.decode()?.resampled(sample_rate)?;
        if clip.is_empty() {
            warn!("Music clip for timeline entry {} is empty, skipping", i);
            continue;
        }

        let mut segment = loop_to_length(&clip.samples, ms_to_samples(duration_ms, sample_rate));
        apply_linear_fade(&mut segment, fade_samples);
        apply_gain_db(&mut segment, settings.duck_db);

        let position = ms_to_samples(entry.start_ms(), sample_rate);
        debug!(
            "Overlaying entry {} at sample {} ({} samples, clip {} samples)",
            i,
            position,
            segment.len(),
            clip.len()
        );
        overlay(&mut bed.samples, &segment, position);
    }

    Ok(bed)
}

/// Сводит озвучку с музыкой по таймлайну.
///
/// Результат всегда той же длины и частоты, что и озвучка.
pub fn compose_timeline<M: DecodeAudio>(
    narration: &AudioTrack,
    timeline: &[TimelineEntry<M>],
    settings: &CompositionSettings,
) -> Result<AudioTrack> {
    info!(
        "Composing {} music segments over {:.2}s of narration",
        timeline.len(),
        narration.duration_secs()
    );

    let bed = build_music_bed(narration.len(), narration.sample_rate, timeline, settings)?;

    let mut output = narration.clone();
    overlay(&mut output.samples, &bed.samples, 0);

    let peak = output.peak();
    if peak > 1.0 {
        warn!("Composited audio peaks at {:.3}, output may clip", peak);
    }

    Ok(output)
}
