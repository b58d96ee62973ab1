//! Наблюдатели прогресса
//!
//! Конкретные реализации `ProgressObserver`: консоль, память, файл,
//! функция обратного вызова, прогресс-бар и их композиция.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::progress::{ProgressInfo, ProgressObserver};

fn format_progress(progress: &ProgressInfo) -> String {
    match progress.details.as_deref() {
        Some(details) if !details.is_empty() => format!(
            "{}: step {:.1}%, total {:.1}% ({})",
            progress.step, progress.step_progress, progress.total_progress, details
        ),
        _ => format!(
            "{}: step {:.1}%, total {:.1}%",
            progress.step, progress.step_progress, progress.total_progress
        ),
    }
}

/// Выводит прогресс в консоль построчно
pub struct ConsoleProgressObserver {
    prefix: Option<String>,
}

impl ConsoleProgressObserver {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl Default for ConsoleProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        println!(
            "{}[progress] {}",
            self.prefix.as_deref().unwrap_or(""),
            format_progress(&progress)
        );
    }
}

/// Сохраняет историю обновлений в памяти; клоны делят одну историю
#[derive(Clone, Default)]
pub struct MemoryProgressObserver {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl MemoryProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ProgressInfo> {
        self.history.lock().clone()
    }

    pub fn last(&self) -> Option<ProgressInfo> {
        self.history.lock().last().cloned()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl ProgressObserver for MemoryProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        self.history.lock().push(progress);
    }
}

/// Дописывает обновления в файл с отметкой времени
pub struct FileProgressObserver {
    file_path: PathBuf,
}

impl FileProgressObserver {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }
}

impl ProgressObserver for FileProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let entry = format!(
            "[{}] {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            format_progress(&progress)
        );

        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .and_then(|mut file| file.write_all(entry.as_bytes()));

        if let Err(e) = result {
            log::warn!("Failed to write progress to {}: {}", self.file_path.display(), e);
        }
    }
}

/// Вызывает функцию на каждое обновление
pub struct CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressObserver for CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    fn on_progress_update(&self, progress: ProgressInfo) {
        (self.callback)(progress);
    }
}

/// Прогресс-бар в одной строке терминала
pub struct ProgressBarObserver {
    width: usize,
    last_progress: Mutex<f32>,
}

impl ProgressBarObserver {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            // Отрицательное значение гарантирует первую отрисовку
            last_progress: Mutex::new(-1.0),
        }
    }

    fn render(&self, progress: &ProgressInfo) -> String {
        let filled = (((progress.total_progress / 100.0) * self.width as f32) as usize).min(self.width);
        format!(
            "[{}{}] {:.1}% - {}",
            "=".repeat(filled),
            " ".repeat(self.width - filled),
            progress.total_progress,
            progress.step
        )
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new(50)
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let mut last_progress = self.last_progress.lock();

        // Перерисовываем только при изменении хотя бы на 1% или на финише
        let finished = progress.total_progress >= 100.0;
        if *last_progress >= 0.0 && (*last_progress - progress.total_progress).abs() < 1.0 && !finished {
            return;
        }
        *last_progress = progress.total_progress;

        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r{}", self.render(&progress));
        if finished {
            let _ = writeln!(stdout);
        }
        let _ = stdout.flush();
    }
}

/// Рассылает обновления нескольким наблюдателям
#[derive(Default)]
pub struct CompositeProgressObserver {
    observers: Vec<Box<dyn ProgressObserver>>,
}

impl CompositeProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

impl ProgressObserver for CompositeProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        for observer in &self.observers {
            observer.on_progress_update(progress.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_console_observer() {
        // Проверяем только отсутствие паники
        let observer = ConsoleProgressObserver::with_prefix("[test] ");
        observer.on_progress_update(ProgressInfo::new("Alignment", 50.0, 25.0, Some("words".to_string())));
    }

    #[test]
    fn test_memory_observer() {
        let observer = MemoryProgressObserver::new();
        observer.on_progress_update(ProgressInfo::new("Step 1", 50.0, 25.0, None));
        observer.on_progress_update(ProgressInfo::new("Step 1", 100.0, 50.0, None));
        observer.on_progress_update(ProgressInfo::new("Step 2", 50.0, 75.0, None));

        let history = observer.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].step, "Step 1");
        assert_eq!(history[1].step_progress, 100.0);
        assert_eq!(observer.last().map(|p| p.total_progress), Some(75.0));

        observer.clear_history();
        assert!(observer.history().is_empty());
    }

    #[test]
    fn test_file_observer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.log");

        let observer = FileProgressObserver::new(&path);
        observer.on_progress_update(ProgressInfo::new("Compositing", 50.0, 25.0, Some("bed".to_string())));
        observer.on_progress_update(ProgressInfo::new("Compositing", 100.0, 30.0, None));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("Compositing: step 50.0%, total 25.0% (bed)"));
        assert!(content.contains("total 30.0%"));
    }

    #[test]
    fn test_file_observer_unwritable_path_does_not_panic() {
        let observer = FileProgressObserver::new("/nonexistent/dir/progress.log");
        observer.on_progress_update(ProgressInfo::new("Step", 1.0, 1.0, None));
    }

    #[test]
    fn test_callback_observer() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let observer = CallbackProgressObserver::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        observer.on_progress_update(ProgressInfo::new("Step 1", 50.0, 25.0, None));
        observer.on_progress_update(ProgressInfo::new("Step 2", 0.0, 50.0, None));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_progress_bar_render() {
        let observer = ProgressBarObserver::new(10);
        let bar = observer.render(&ProgressInfo::new("Chunking", 0.0, 50.0, None));
        assert_eq!(bar, "[=====     ] 50.0% - Chunking");

        let full = observer.render(&ProgressInfo::new("Done", 100.0, 100.0, None));
        assert!(full.starts_with("[==========]"));
    }

    #[test]
    fn test_composite_observer() {
        let memory_observer = MemoryProgressObserver::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let mut composite = CompositeProgressObserver::new();
        composite.add_observer(Box::new(memory_observer.clone()));
        composite.add_observer(Box::new(CallbackProgressObserver::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        })));
        assert_eq!(composite.len(), 2);

        composite.on_progress_update(ProgressInfo::new("Step 1", 50.0, 25.0, None));
        assert_eq!(memory_observer.history().len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
