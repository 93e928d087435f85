use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

use crate::log::LogFilters;

// ISO 8601 timestamp, highlighted level, module path.
const PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";
const APPENDER: &str = "stderr";

impl LogFilters {
    pub(in crate::log) fn installed(&self) -> bool {
        self.handle.is_some()
    }

    /// Replaces the global logger configuration with these filters.
    ///
    /// Messages go to stderr; stdout is left to whatever embeds the engine.
    pub(in crate::log) fn install(&mut self) {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build();
        let config = Config::builder()
            .appender(Appender::builder().build(APPENDER, Box::new(stderr)))
            .loggers(
                self.modules
                    .iter()
                    .map(|(module, level)| Logger::builder().build(module.clone(), *level)),
            )
            .build(Root::builder().appender(APPENDER).build(self.global));
        let config = match config {
            Ok(config) => config,
            Err(error) => {
                eprintln!("invalid log configuration: {error}");
                return;
            }
        };

        if let Some(handle) = &self.handle {
            handle.set_config(config);
        } else {
            match log4rs::init_config(config) {
                Ok(handle) => self.handle = Some(handle),
                Err(error) => eprintln!("could not install the logger: {error}"),
            }
        }
    }
}
