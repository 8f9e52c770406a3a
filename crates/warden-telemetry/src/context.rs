//! Process span carrying the command name and build SHA.

use tracing::span::EnteredSpan;

use crate::init::build_sha;

/// Keeps the `warden` process span entered until dropped.
///
/// Every event logged while the guard lives carries `command` and `build_sha`.
#[must_use = "the span is exited when the guard is dropped"]
pub struct GlobalContextGuard {
    _span: EnteredSpan,
}

impl GlobalContextGuard {
    /// Enter the process span for `command`.
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        let span = tracing::info_span!(
            "warden",
            command = %command,
            build_sha = %build_sha()
        );
        Self {
            _span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_enters_process_span() {
        let _guard = GlobalContextGuard::new("bootstrap");
        tracing::info!("inside process span");
    }
}
