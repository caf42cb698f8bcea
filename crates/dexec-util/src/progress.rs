//! Terminal status output for the CLI. Everything goes to stderr so stdout
//! stays a clean list of paths.

use std::io::Write;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

fn status_line(style: Style, label: &str, message: &str) {
    let _ = writeln!(std::io::stderr(), "{:>12} {message}", style.apply_to(label));
}

/// Cargo-style status line: `    Resolved 42 assemblies`, label in bold green.
pub fn status(label: &str, message: &str) {
    status_line(Style::new().green().bold(), label, message);
}

/// Same layout as [`status`] with a bold red label.
pub fn status_error(label: &str, message: &str) {
    status_line(Style::new().red().bold(), label, message);
}

/// A steadily ticking spinner; finish it with [`ProgressBar::finish_and_clear`].
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
