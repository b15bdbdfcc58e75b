#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the urban index CLI.
//!
//! [`init_logger`] routes `log` output through an `indicatif`
//! [`MultiProgress`] so log lines are held back while a bar redraws, and
//! [`IndicatifProgress`] renders the per-record passes of the spatial join
//! and the derive stage.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use urban_index_layer::progress::ProgressCallback;

pub use indicatif::MultiProgress;

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} ({elapsed})";
const RECORDS_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.green/black}] {pos}/{len} records ({per_sec}, {eta} left)";

/// Per-record progress drawn as an `indicatif` bar.
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Applied once the record count is known.
    counted: ProgressStyle,
}

impl IndicatifProgress {
    /// A spinner labelled `message` on `multi`. It turns into a counted bar
    /// when the stage reports its record total.
    #[must_use]
    pub fn records_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(message.to_string());
        Arc::new(Self::wrap(bar))
    }

    fn wrap(bar: ProgressBar) -> Self {
        bar.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        let counted = ProgressStyle::with_template(RECORDS_TEMPLATE)
            .map_or_else(|_| ProgressStyle::default_bar(), |style| style.progress_chars("=> "));
        Self { bar, counted }
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.counted.clone());
        self.bar.reset();
        self.bar.set_length(total);
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs the logger: `pretty_env_logger` at `info` unless `RUST_LOG`
/// says otherwise, behind an `indicatif-log-bridge` wrapper.
///
/// Stage bars must be added to the returned [`MultiProgress`] or they will
/// tear with log output.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let logger = builder.build();
    let level = logger.filter();

    // Fails only if a logger is already installed (e.g. in tests).
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_records_once_total_is_known() {
        let progress = IndicatifProgress::wrap(ProgressBar::hidden());
        progress.set_total(3);
        progress.inc(1);
        progress.inc(1);

        assert_eq!(progress.bar.length(), Some(3));
        assert_eq!(progress.bar.position(), 2);

        progress.finish("done".to_string());
        assert!(progress.bar.is_finished());
        assert_eq!(progress.bar.message(), "done");
    }
}
