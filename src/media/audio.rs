//! # Аудио примитивы
//!
//! Декодирование (symphonia / hound), кодирование WAV, ресемплинг (rubato)
//! и простые операции над PCM семплами: усиление, fade, зацикливание, наложение.
//!
//! Все треки внутри библиотеки моно, семплы `f32` в диапазоне [-1.0, 1.0].

use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info, warn};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{BalladError, Result};

/// Размер блока ресемплера
const RESAMPLE_CHUNK: usize = 1024;

/// Моно аудиотрек
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioTrack {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Тишина заданной длины
    pub fn silent(len: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0; len],
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Длительность в секундах
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Пиковая амплитуда
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Привести трек к частоте `target_rate`
    pub fn resampled(self, target_rate: u32) -> Result<Self> {
        if self.sample_rate == target_rate {
            return Ok(self);
        }
        let samples = resample(&self.samples, self.sample_rate, target_rate)?;
        Ok(Self::new(samples, target_rate))
    }
}

/// Источник закодированного аудио: байты ответа провайдера или файл
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    Bytes(Bytes),
    File(PathBuf),
}

impl AudioSource {
    /// Размер закодированных данных, если он известен без чтения файла
    pub fn encoded_len(&self) -> Option<usize> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len()),
            Self::File(_) => None,
        }
    }
}

impl From<Bytes> for AudioSource {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<PathBuf> for AudioSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Все, что можно декодировать в моно трек
pub trait DecodeAudio {
    fn decode(&self) -> Result<AudioTrack>;
}

impl DecodeAudio for AudioSource {
    fn decode(&self) -> Result<AudioTrack> {
        match self {
            Self::Bytes(bytes) => decode_bytes(bytes, None),
            Self::File(path) => decode_file(path),
        }
    }
}

impl DecodeAudio for AudioTrack {
    fn decode(&self) -> Result<AudioTrack> {
        Ok(self.clone())
    }
}

/// Декодирует аудио из памяти.
///
/// WAV читается через hound, остальные форматы через symphonia.
/// Многоканальное аудио сводится в моно.
pub fn decode_bytes(data: &Bytes, extension_hint: Option<&str>) -> Result<AudioTrack> {
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
        let reader = WavReader::new(Cursor::new(data.clone())).map_err(wav_read_error)?;
        return read_wav(reader);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.clone())), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }
    decode_stream(mss, &hint)
}

/// Декодирует аудиофайл, формат определяется по расширению
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<AudioTrack> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BalladError::FileNotFound(path.display().to_string()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    let track = match extension.as_str() {
        "wav" => decode_wav_file(path)?,
        "mp3" | "aac" => {
            let file = std::fs::File::open(path)?;
            let mss = MediaSourceStream::new(Box::new(file), Default::default());
            let mut hint = Hint::new();
            hint.with_extension(&extension);
            decode_stream(mss, &hint)?
        }
        _ => {
            return Err(BalladError::AudioDecoding(format!(
                "Unsupported audio format: {}",
                path.display()
            )))
        }
    };

    info!(
        "Decoded {} ({} samples, {} Hz)",
        path.display(),
        track.len(),
        track.sample_rate
    );
    Ok(track)
}

/// Декодирует WAV файл через hound
pub fn decode_wav_file<P: AsRef<Path>>(path: P) -> Result<AudioTrack> {
    let reader = WavReader::open(path.as_ref()).map_err(wav_read_error)?;
    read_wav(reader)
}

// Ошибки чтения WAV относятся к декодированию, `#[from] hound::Error` остается для записи
fn wav_read_error(e: hound::Error) -> BalladError {
    BalladError::AudioDecoding(format!("Failed to read WAV: {}", e))
}

fn read_wav<R: std::io::Read>(mut reader: WavReader<R>) -> Result<AudioTrack> {
    let spec = reader.spec();

    let pcm: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(wav_read_error)?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(wav_read_error)?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(wav_read_error)?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(wav_read_error)?,
        (format, bits) => {
            return Err(BalladError::AudioDecoding(format!(
                "Unsupported WAV format: {:?}, {} bits",
                format, bits
            )))
        }
    };

    Ok(AudioTrack::new(downmix(&pcm, spec.channels as usize), spec.sample_rate))
}

fn decode_stream(mss: MediaSourceStream, hint: &Hint) -> Result<AudioTrack> {
    let format_opts = FormatOptions {
        enable_gapless: false,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| BalladError::AudioDecoding(format!("Failed to probe audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| BalladError::AudioDecoding("No audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| BalladError::AudioDecoding(format!("Failed to create decoder: {}", e)))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut pcm = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(BalladError::AudioDecoding(format!("Failed to read packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if sample_rate == 0 {
                    sample_rate = spec.rate;
                }
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                pcm.extend(downmix(buffer.samples(), spec.channels.count()));
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => {
                return Err(BalladError::AudioDecoding(format!("Decoder failed: {}", e)));
            }
        }
    }

    if sample_rate == 0 {
        return Err(BalladError::AudioDecoding("Unknown sample rate".to_string()));
    }

    debug!("Decoded {} samples at {} Hz", pcm.len(), sample_rate);
    Ok(AudioTrack::new(pcm, sample_rate))
}

/// Сводит чередующиеся каналы в моно
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

/// Записывает трек в WAV файл (32 бит float, моно)
pub fn encode_wav<P: AsRef<Path>>(track: &AudioTrack, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WavWriter::create(path, wav_spec(track.sample_rate))?;
    for &sample in &track.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!(
        "Saved WAV file: {} ({} samples, {} Hz)",
        path.display(),
        track.len(),
        track.sample_rate
    );
    Ok(())
}

/// Кодирует трек в WAV в памяти
pub fn to_wav_bytes(track: &AudioTrack) -> Result<Bytes> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, wav_spec(track.sample_rate))?;
        for &sample in &track.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(Bytes::from(cursor.into_inner()))
}

/// Ресемплинг моно сигнала sinc-интерполяцией.
///
/// Длина результата `round(len * to / from)`, задержка фильтра компенсируется.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(BalladError::AudioProcessing(format!(
            "Invalid sample rates: {} -> {}",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (input.len() as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| BalladError::AudioProcessing(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
    let mut position = 0;
    let mut block = vec![0.0f32; RESAMPLE_CHUNK];

    // Хвост добиваем тишиной, пока не получим задержку фильтра и весь сигнал
    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        block.clear();
        block.resize(needed, 0.0);
        if position < input.len() {
            let take = needed.min(input.len() - position);
            block[..take].copy_from_slice(&input[position..position + take]);
        }
        position += needed;

        let frames = resampler
            .process(&[&block[..]], None)
            .map_err(|e| BalladError::AudioProcessing(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&frames[0]);
    }

    let mut output = output.split_off(delay);
    output.truncate(expected);

    debug!(
        "Resampled {} samples {} Hz -> {} samples {} Hz",
        input.len(),
        from_rate,
        output.len(),
        to_rate
    );
    Ok(output)
}

/// Переводит децибелы в линейный коэффициент
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Применяет усиление в децибелах
pub fn apply_gain_db(samples: &mut [f32], db: f32) {
    let gain = db_to_gain(db);
    samples.iter_mut().for_each(|s| *s *= gain);
}

/// Линейные fade in и fade out длиной `fade_samples`, каждый не длиннее половины сигнала
pub fn apply_linear_fade(samples: &mut [f32], fade_samples: usize) {
    let len = samples.len();
    let fade = fade_samples.min(len / 2);
    if fade == 0 {
        return;
    }

    for i in 0..fade {
        let factor = i as f32 / fade as f32;
        samples[i] *= factor;
        samples[len - 1 - i] *= factor;
    }
}

/// Повторяет клип целиком нужное число раз и обрезает до `target_len`
pub fn loop_to_length(clip: &[f32], target_len: usize) -> Vec<f32> {
    if clip.is_empty() {
        return Vec::new();
    }
    let copies = (target_len + clip.len() - 1) / clip.len();
    let mut looped = clip.repeat(copies);
    looped.truncate(target_len);
    looped
}

/// Прибавляет клип к основе с позиции `position`; все, что за концом основы, отбрасывается
pub fn overlay(base: &mut [f32], clip: &[f32], position: usize) {
    if position >= base.len() {
        return;
    }
    base[position..]
        .iter_mut()
        .zip(clip)
        .for_each(|(b, c)| *b += *c);
}

/// Количество семплов в `ms` миллисекундах
pub fn ms_to_samples(ms: i64, sample_rate: u32) -> usize {
    if ms <= 0 {
        return 0;
    }
    ((ms as f64) * sample_rate as f64 / 1000.0).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sine(len: usize, sample_rate: u32, freq: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 / sample_rate as f32 * freq * 2.0 * std::f32::consts::PI).sin() * 0.5)
            .collect()
    }

    fn wav_bytes_i16(samples: &[i16], channels: u16, sample_rate: u32) -> Bytes {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        Bytes::from(cursor.into_inner())
    }

    #[test]
    fn test_wav_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let track = AudioTrack::new(sine(4410, 44100, 440.0), 44100);

        encode_wav(&track, &path).unwrap();
        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded, track);
    }

    #[test]
    fn test_decode_stereo_wav_bytes_downmixes() {
        // Левый канал 16384, правый 0: среднее 8192
        let data = wav_bytes_i16(&[16384, 0, 16384, 0, -16384, 0], 2, 22050);
        let track = AudioSource::Bytes(data).decode().unwrap();
        assert_eq!(track.sample_rate, 22050);
        assert_eq!(track.samples, vec![0.25, 0.25, -0.25]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let data = Bytes::from_static(b"definitely not audio");
        assert!(matches!(
            decode_bytes(&data, None),
            Err(BalladError::AudioDecoding(_))
        ));
    }

    #[test]
    fn test_truncated_wav_data_fails_as_decoding_error() {
        let data = wav_bytes_i16(&[100, 200, 300, 400], 1, 8000);
        let truncated = data.slice(..data.len() - 3);
        assert!(matches!(
            decode_bytes(&truncated, None),
            Err(BalladError::AudioDecoding(_))
        ));
    }

    #[test]
    fn test_corrupt_wav_file_fails_as_decoding_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"RIFF\x10\0\0\0WAVEfmt ").unwrap();
        assert!(matches!(decode_file(&path), Err(BalladError::AudioDecoding(_))));
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(AudioSource::Bytes(Bytes::from_static(b"abc")).encoded_len(), Some(3));
        assert_eq!(AudioSource::File(PathBuf::from("clip.wav")).encoded_len(), None);
    }

    #[test]
    fn test_decode_missing_file() {
        let result = AudioSource::File(PathBuf::from("/nonexistent/clip.wav")).decode();
        assert!(matches!(result, Err(BalladError::FileNotFound(_))));
    }

    #[test]
    fn test_to_wav_bytes_is_decodable() {
        let track = AudioTrack::new(vec![0.0, 0.5, -0.5, 1.0], 8000);
        let bytes = to_wav_bytes(&track).unwrap();
        assert_eq!(decode_bytes(&bytes, Some("wav")).unwrap(), track);
    }

    #[test]
    fn test_resample_length() {
        let input = sine(48000, 48000, 220.0);
        let output = resample(&input, 48000, 24000).unwrap();
        assert_eq!(output.len(), 24000);

        let up = resample(&input[..1000], 16000, 44100).unwrap();
        assert_eq!(up.len(), 2756);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input = sine(100, 8000, 440.0);
        assert_eq!(resample(&input, 8000, 8000).unwrap(), input);
        assert!(resample(&input, 0, 8000).is_err());
    }

    #[test]
    fn test_resample_preserves_level() {
        let input = sine(44100, 44100, 440.0);
        let output = resample(&input, 44100, 48000).unwrap();
        let peak = output[1000..output.len() - 1000]
            .iter()
            .fold(0.0f32, |p, s| p.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.05, "peak = {}", peak);
    }

    #[test]
    fn test_db_to_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-6);
        assert!((db_to_gain(-8.0) - 0.398_107).abs() < 1e-5);
    }

    #[test]
    fn test_apply_gain_db() {
        let mut samples = vec![1.0, -0.5];
        apply_gain_db(&mut samples, -6.0);
        assert!((samples[0] - 0.501_187).abs() < 1e-5);
        assert!((samples[1] + 0.250_594).abs() < 1e-5);
    }

    #[test]
    fn test_linear_fade() {
        let mut samples = vec![1.0; 10];
        apply_linear_fade(&mut samples, 4);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[2], 0.5);
        assert_eq!(samples[5], 1.0);
        assert_eq!(samples[9], 0.0);
        assert_eq!(samples[7], 0.5);
    }

    #[test]
    fn test_fade_clamped_to_half() {
        let mut samples = vec![1.0; 6];
        apply_linear_fade(&mut samples, 100);
        // fade = 3: коэффициенты 0, 1/3, 2/3 с обеих сторон
        assert_eq!(samples[0], 0.0);
        assert!((samples[2] - 2.0 / 3.0).abs() < 1e-6);
        assert!((samples[3] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(samples[5], 0.0);

        let mut single = vec![1.0];
        apply_linear_fade(&mut single, 100);
        assert_eq!(single, vec![1.0]);
    }

    #[test]
    fn test_loop_to_length() {
        assert_eq!(loop_to_length(&[1.0, 2.0, 3.0], 7), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
        assert_eq!(loop_to_length(&[1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        assert!(loop_to_length(&[], 5).is_empty());
        assert!(loop_to_length(&[1.0], 0).is_empty());
    }

    #[test]
    fn test_overlay_truncates_at_end() {
        let mut base = vec![0.0; 5];
        overlay(&mut base, &[1.0, 1.0, 1.0], 3);
        assert_eq!(base, vec![0.0, 0.0, 0.0, 1.0, 1.0]);

        overlay(&mut base, &[1.0], 10);
        assert_eq!(base.len(), 5);

        overlay(&mut base, &[0.5, 0.5], 3);
        assert_eq!(base, vec![0.0, 0.0, 0.0, 1.5, 1.5]);
    }

    #[test]
    fn test_ms_to_samples() {
        assert_eq!(ms_to_samples(1000, 44100), 44100);
        assert_eq!(ms_to_samples(1, 44100), 44);
        assert_eq!(ms_to_samples(0, 44100), 0);
        assert_eq!(ms_to_samples(-5, 44100), 0);
    }

    #[test]
    fn test_track_helpers() {
        let track = AudioTrack::silent(22050, 44100);
        assert_eq!(track.duration_secs(), 0.5);
        assert_eq!(track.peak(), 0.0);
        assert!(!track.is_empty());
    }
}
