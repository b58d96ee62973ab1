//! Модуль для отслеживания прогресса выполнения задания
//!
//! Паттерн Observer: трекер знает текущий этап конвейера и его вес,
//! пересчитывает общий прогресс и рассылает `ProgressInfo` наблюдателям
//! через репортер.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Информация о прогрессе выполнения операции
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Текущий этап операции
    pub step: String,
    /// Процент выполнения текущего этапа (0.0 - 100.0)
    pub step_progress: f32,
    /// Общий процент выполнения всей операции (0.0 - 100.0)
    pub total_progress: f32,
    /// Дополнительная информация о текущем этапе
    pub details: Option<String>,
}

impl ProgressInfo {
    pub fn new(step: impl Into<String>, step_progress: f32, total_progress: f32, details: Option<String>) -> Self {
        Self {
            step: step.into(),
            step_progress: step_progress.clamp(0.0, 100.0),
            total_progress: total_progress.clamp(0.0, 100.0),
            details,
        }
    }
}

/// Наблюдатель, получающий уведомления о прогрессе
pub trait ProgressObserver: Send + Sync {
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Объект, рассылающий уведомления о прогрессе
pub trait ProgressReporter: Send + Sync {
    /// Добавить наблюдателя, возвращает его идентификатор
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize;

    /// Удалить наблюдателя по идентификатору
    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>>;

    /// Уведомить всех наблюдателей
    fn notify_progress(&self, progress: ProgressInfo);
}

/// Репортер по умолчанию: синхронно вызывает всех наблюдателей
pub struct DefaultProgressReporter {
    observers: RwLock<HashMap<usize, Box<dyn ProgressObserver>>>,
    next_id: AtomicUsize,
}

impl DefaultProgressReporter {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl Default for DefaultProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for DefaultProgressReporter {
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.observers.write().remove(&id)
    }

    fn notify_progress(&self, progress: ProgressInfo) {
        let observers = self.observers.read();
        // Порядок вызова по идентификатору, чтобы наблюдатели видели одну последовательность
        let mut ids: Vec<&usize> = observers.keys().collect();
        ids.sort();
        for id in ids {
            observers[id].on_progress_update(progress.clone());
        }
    }
}

/// Этапы конвейера
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStep {
    /// Синтез речи с метками времени
    SpeechSynthesis,
    /// Перенос текста по строкам
    LineWrapping,
    /// Выравнивание слов по строкам
    Alignment,
    /// Тематическая разбивка текста
    Chunking,
    /// Генерация музыки для чанков
    MusicGeneration,
    /// Сведение озвучки и музыки
    Compositing,
}

impl ProcessStep {
    /// Все этапы в порядке выполнения
    pub const ALL: [ProcessStep; 6] = [
        Self::SpeechSynthesis,
        Self::LineWrapping,
        Self::Alignment,
        Self::Chunking,
        Self::MusicGeneration,
        Self::Compositing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpeechSynthesis => "Синтез речи",
            Self::LineWrapping => "Перенос текста",
            Self::Alignment => "Выравнивание слов",
            Self::Chunking => "Тематическая разбивка",
            Self::MusicGeneration => "Генерация музыки",
            Self::Compositing => "Сведение аудио",
        }
    }

    /// Вес этапа в процентах от всего задания
    pub fn weight(&self) -> f32 {
        match self {
            Self::SpeechSynthesis => 25.0,
            Self::LineWrapping => 2.0,
            Self::Alignment => 3.0,
            Self::Chunking => 15.0,
            Self::MusicGeneration => 45.0,
            Self::Compositing => 10.0,
        }
    }
}

/// Трекер прогресса задания.
///
/// Все состояние под блокировками, поэтому трекер можно разделять между
/// задачами через `Arc`.
pub struct ProgressTracker {
    reporter: RwLock<Option<Box<dyn ProgressReporter>>>,
    current_step: RwLock<ProcessStep>,
    step_progress: RwLock<f32>,
    total_progress: RwLock<f32>,
    completed_steps: RwLock<HashMap<ProcessStep, f32>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            reporter: RwLock::new(None),
            current_step: RwLock::new(ProcessStep::SpeechSynthesis),
            step_progress: RwLock::new(0.0),
            total_progress: RwLock::new(0.0),
            completed_steps: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_reporter(reporter: Box<dyn ProgressReporter>) -> Self {
        let tracker = Self::new();
        tracker.set_reporter(reporter);
        tracker
    }

    pub fn set_reporter(&self, reporter: Box<dyn ProgressReporter>) {
        *self.reporter.write() = Some(reporter);
    }

    /// Добавить наблюдателя; без репортера создается `DefaultProgressReporter`
    pub fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize {
        let mut reporter = self.reporter.write();
        reporter
            .get_or_insert_with(|| Box::new(DefaultProgressReporter::new()))
            .add_observer(observer)
    }

    pub fn current_step(&self) -> ProcessStep {
        *self.current_step.read()
    }

    pub fn total_progress(&self) -> f32 {
        *self.total_progress.read()
    }

    /// Перейти к этапу; предыдущий этап считается завершенным
    pub fn set_step(&self, step: ProcessStep) {
        {
            let mut current_step = self.current_step.write();
            if *current_step == step {
                return;
            }
            self.completed_steps.write().insert(*current_step, 100.0);
            *current_step = step;
            *self.step_progress.write() = 0.0;
        }

        self.update_total_progress();
        self.report_progress(None);
    }

    /// Обновить прогресс текущего этапа
    pub fn update_step_progress(&self, progress: f32, details: Option<String>) {
        *self.step_progress.write() = progress.clamp(0.0, 100.0);
        self.update_total_progress();
        self.report_progress(details);
    }

    fn update_total_progress(&self) {
        let current_step = *self.current_step.read();
        let step_progress = *self.step_progress.read();

        let completed: f32 = self
            .completed_steps
            .read()
            .iter()
            .filter(|(step, _)| **step != current_step)
            .map(|(step, progress)| step.weight() * progress / 100.0)
            .sum();
        let total_weight: f32 = ProcessStep::ALL.iter().map(|step| step.weight()).sum();
        let total = completed + current_step.weight() * step_progress / 100.0;

        *self.total_progress.write() = (total / total_weight * 100.0).clamp(0.0, 100.0);
    }

    fn report_progress(&self, details: Option<String>) {
        let progress = ProgressInfo::new(
            self.current_step().as_str(),
            *self.step_progress.read(),
            self.total_progress(),
            details,
        );
        if let Some(reporter) = self.reporter.read().as_ref() {
            reporter.notify_progress(progress);
        }
    }

    /// Отметить завершение задания
    pub fn complete(&self) {
        let current_step = self.current_step();
        self.completed_steps.write().insert(current_step, 100.0);
        *self.step_progress.write() = 100.0;
        *self.total_progress.write() = 100.0;

        self.report_progress(Some("Задание завершено".to_string()));
    }

    /// Уведомить о прогрессе без изменения состояния
    pub fn notify_progress(&self, progress: f32, details: Option<String>) {
        let info = ProgressInfo::new(self.current_step().as_str(), progress, self.total_progress(), details);
        if let Some(reporter) = self.reporter.read().as_ref() {
            reporter.notify_progress(info);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
