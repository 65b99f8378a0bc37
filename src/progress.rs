use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Yellow braille spinner followed by the current message.
pub fn spinner_style() -> ProgressStyle {
    style("\x1b[33m{spinner}\x1b[0m {wide_msg}")
        .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"])
}

/// Green check mark, used when a stage finishes.
pub fn ok_style() -> ProgressStyle {
    style("\x1b[32m✔\x1b[0m {wide_msg}")
}

/// Red cross, used when a stage fails.
pub fn err_style() -> ProgressStyle {
    style("\x1b[31m✘\x1b[0m {wide_msg}")
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// One spinner line per pipeline stage.
///
/// Hidden spinners are used in tests and when stderr is not a terminal.
pub struct StageSpinner {
    pb: ProgressBar,
}

impl StageSpinner {
    pub fn start(visible: bool, msg: impl Into<String>) -> Self {
        let pb = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(spinner_style());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb.set_message(msg.into());
        Self { pb }
    }

    pub fn message(&self, msg: impl Into<String>) {
        self.pb.set_message(msg.into());
    }

    pub fn ok(self, msg: impl Into<String>) {
        self.pb.set_style(ok_style());
        self.pb.finish_with_message(msg.into());
    }

    pub fn fail(self, msg: impl Into<String>) {
        self.pb.set_style(err_style());
        self.pb.finish_with_message(msg.into());
    }

    /// Stop without leaving a line behind (e.g. before prompting).
    pub fn clear(self) {
        self.pb.finish_and_clear();
    }
}
