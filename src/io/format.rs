//! Nice EVCont output formatting.

use std::fmt;

use log;

const EVCONT_BANNER_LENGTH: usize = 103;

/// Logs an error to the `evcont-output` logger.
macro_rules! evcont_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {
        log::error!($fmt, $($($arg)*)?);
        log::error!(target: "evcont-output", $fmt, $($($arg)*)?);
    }
}

/// Logs a warning to the `evcont-output` logger.
macro_rules! evcont_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::warn!(target: "evcont-output", $fmt, $($($arg)*)?); }
}

/// Logs a main output line to the `evcont-output` logger.
macro_rules! evcont_output {
    ($fmt:expr $(, $($arg:tt)*)?) => { log::info!(target: "evcont-output", $fmt, $($($arg)*)?); }
}

pub(crate) use {evcont_error, evcont_output, evcont_warn};

/// Logs a nicely formatted section title to the `evcont-output` logger.
pub(crate) fn log_title(title: &str) {
    let length = title.chars().count().max(EVCONT_BANNER_LENGTH - 6);
    let bar = "─".repeat(length);
    evcont_output!("┌──{bar}──┐");
    evcont_output!("│§ {title:^length$} §│");
    evcont_output!("└──{bar}──┘");
}

/// Logs a nicely formatted subtitle to the `evcont-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    let length = subtitle.chars().count();
    let bar = "═".repeat(length);
    evcont_output!("{}", subtitle);
    evcont_output!("{}", bar);
}

/// Turns a boolean into a string of `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// A trait for logging `EVCont` outputs nicely.
pub(crate) trait EvcontOutput: fmt::Debug + fmt::Display {
    /// Logs display output nicely.
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            evcont_output!("{line}");
        })
    }
}

// Blanket implementation
impl<T> EvcontOutput for T where T: fmt::Debug + fmt::Display {}
