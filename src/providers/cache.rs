//! Модуль для кэширования сгенерированной музыки
//!
//! Клипы хранятся на диске под ключом md5 от промпта, поэтому повторный запуск
//! на том же тексте не обращается к генератору заново.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::config::BalladConfig;
use crate::error::Result;

/// Дисковый кэш музыкальных клипов
pub struct MusicCache {
    cache_dir: PathBuf,
    max_size: Option<u64>,
}

impl MusicCache {
    /// Создать кэш в `config.cache_dir` или во временной директории системы
    pub fn new(config: &BalladConfig) -> Result<Self> {
        let cache_dir = match &config.cache_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join("ballad-sync-cache"),
        };
        Self::with_dir(cache_dir, config.max_cache_size)
    }

    pub fn with_dir(cache_dir: impl Into<PathBuf>, max_size: Option<u64>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }
        Ok(Self { cache_dir, max_size })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Прочитать клип для промпта, если он уже есть
    pub fn get(&self, prompt: &str) -> Option<Bytes> {
        let path = self.path_for(prompt);
        match fs::read(&path) {
            Ok(data) if !data.is_empty() => {
                log::debug!("Music cache hit: {}", path.display());
                Some(Bytes::from(data))
            }
            _ => None,
        }
    }

    /// Сохранить клип и при необходимости освободить место
    pub fn put(&self, prompt: &str, audio: &Bytes) -> Result<PathBuf> {
        let path = self.path_for(prompt);
        fs::write(&path, audio)?;
        self.enforce_size_limit(&path)?;
        Ok(path)
    }

    /// Удалить все клипы
    pub fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn path_for(&self, prompt: &str) -> PathBuf {
        let key = format!("{:x}", md5::compute(prompt.trim().as_bytes()));
        self.cache_dir.join(format!("{}.wav", key))
    }

    /// Удаляет самые старые файлы, пока кэш не уложится в лимит; только что записанный файл не трогаем
    fn enforce_size_limit(&self, keep: &Path) -> Result<()> {
        let max_size = match self.max_size {
            Some(max_size) => max_size,
            None => return Ok(()),
        };

        let mut total_size = 0;
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let metadata = entry.metadata()?;
                total_size += metadata.len();
                files.push((entry.path(), metadata.len(), metadata.modified()?));
            }
        }

        if total_size <= max_size {
            return Ok(());
        }

        files.sort_by(|a, b| a.2.cmp(&b.2));
        for (path, len, _) in files {
            if total_size <= max_size {
                break;
            }
            if path == keep {
                continue;
            }
            fs::remove_file(&path)?;
            total_size -= len;
            log::debug!("Evicted {} from music cache", path.display());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_then_get() {
        let dir = tempdir().unwrap();
        let cache = MusicCache::with_dir(dir.path(), None).unwrap();

        assert!(cache.get("calm piano").is_none());
        let path = cache.put("calm piano", &Bytes::from_static(b"RIFF....")).unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(cache.get("calm piano").unwrap(), Bytes::from_static(b"RIFF...."));
        // Пробелы по краям не меняют ключ
        assert!(cache.get("  calm piano\n").is_some());
        assert!(cache.get("tense strings").is_none());
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let cache = MusicCache::with_dir(dir.path(), None).unwrap();
        cache.put("a", &Bytes::from_static(b"1")).unwrap();
        cache.put("b", &Bytes::from_static(b"2")).unwrap();

        cache.clear().unwrap();
        assert!(cache.get("a").is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_size_limit_keeps_newest() {
        let dir = tempdir().unwrap();
        let cache = MusicCache::with_dir(dir.path(), Some(10)).unwrap();

        cache.put("first", &Bytes::from(vec![0u8; 8])).unwrap();
        cache.put("second", &Bytes::from(vec![1u8; 8])).unwrap();

        assert!(cache.get("second").is_some());
        let total: u64 = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().metadata().unwrap().len())
            .sum();
        assert!(total <= 10);
    }

    #[test]
    fn test_creates_missing_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let config = BalladConfig {
            cache_dir: Some(nested.to_string_lossy().to_string()),
            ..BalladConfig::default()
        };
        let cache = MusicCache::new(&config).unwrap();
        assert!(nested.exists());
        assert_eq!(cache.dir(), nested.as_path());
    }
}
