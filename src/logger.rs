use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Фильтр по умолчанию, если `RUST_LOG` не задан
pub const DEFAULT_FILTER: &str = "warn,ballad_sync=info";

/// Инициализация логгера для бинарника.
///
/// `verbose` поднимает уровень логов библиотеки до debug. Повторный вызов ничего не делает.
pub fn init_logger(verbose: bool) {
    let env = Env::default().filter_or("RUST_LOG", DEFAULT_FILTER);
    let mut builder = Builder::from_env(env);

    // Шумные зависимости
    builder
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("mio", LevelFilter::Error)
        .filter_module("symphonia", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Warn);

    if verbose {
        builder.filter_module("ballad_sync", LevelFilter::Debug);
    }

    let _ = builder
        .format(|buf, record| writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args()))
        .target(env_logger::Target::Stderr)
        .try_init();
}
