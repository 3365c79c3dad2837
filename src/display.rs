//! Status output
//!
//! The coordinator renders short text lines through the `Display`
//! capability. Rendering pixels is left to an external OLED process that
//! watches the status file; here the lines go to the log and that file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Where status lines go. Implementations must return quickly.
pub trait Display: Send {
    fn show(&mut self, lines: &[String]);
    fn clear(&mut self);
}

/// Logs every update
#[derive(Debug, Default)]
pub struct LogDisplay;

impl Display for LogDisplay {
    fn show(&mut self, lines: &[String]) {
        tracing::info!("Display: {}", lines.join(" | "));
    }

    fn clear(&mut self) {
        tracing::debug!("Display cleared");
    }
}

/// Writes the current lines, newline separated, to a file
#[derive(Debug)]
pub struct StatusFileDisplay {
    path: PathBuf,
}

impl StatusFileDisplay {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, contents: &str) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create status file directory: {}", e);
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, contents) {
            tracing::warn!("Failed to write status file: {}", e);
        }
    }

    /// Remove the file on shutdown
    pub fn cleanup(&self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove status file: {}", e);
            }
        }
    }
}

impl Display for StatusFileDisplay {
    fn show(&mut self, lines: &[String]) {
        let mut contents = lines.join("\n");
        contents.push('\n');
        self.write(&contents);
    }

    fn clear(&mut self) {
        self.write("");
    }
}

/// Fans every update out to several displays
#[derive(Default)]
pub struct TeeDisplay {
    targets: Vec<Box<dyn Display>>,
}

impl TeeDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: impl Display + 'static) -> Self {
        self.targets.push(Box::new(target));
        self
    }
}

impl Display for TeeDisplay {
    fn show(&mut self, lines: &[String]) {
        for target in &mut self.targets {
            target.show(lines);
        }
    }

    fn clear(&mut self) {
        for target in &mut self.targets {
            target.clear();
        }
    }
}

/// Keeps every update in memory; clones share the same history
#[derive(Debug, Clone, Default)]
pub struct SharedDisplay {
    history: Arc<Mutex<Vec<Vec<String>>>>,
}

impl SharedDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    fn history_guard(&self) -> std::sync::MutexGuard<'_, Vec<Vec<String>>> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Lines currently shown
    pub fn current(&self) -> Vec<String> {
        self.history_guard().last().cloned().unwrap_or_default()
    }

    /// Every update so far, oldest first (a clear is an empty entry)
    pub fn history(&self) -> Vec<Vec<String>> {
        self.history_guard().clone()
    }

    /// Whether any update so far contained `needle`
    pub fn ever_showed(&self, needle: &str) -> bool {
        self.history_guard()
            .iter()
            .any(|lines| lines.iter().any(|l| l.contains(needle)))
    }
}

impl Display for SharedDisplay {
    fn show(&mut self, lines: &[String]) {
        self.history_guard().push(lines.to_vec());
    }

    fn clear(&mut self) {
        self.history_guard().push(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_status_file_display() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("display");
        let mut display = StatusFileDisplay::new(path.clone());

        display.show(&lines(&["Chat", "Hold to talk"]));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Chat\nHold to talk\n");

        display.clear();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        display.cleanup();
        assert!(!path.exists());
    }

    #[test]
    fn test_tee_and_shared_display() {
        let shared = SharedDisplay::new();
        let mut tee = TeeDisplay::new().with(LogDisplay).with(shared.clone());

        tee.show(&lines(&["Diary", "2026-05-01"]));
        tee.clear();
        tee.show(&lines(&["Reminder"]));

        assert_eq!(shared.current(), lines(&["Reminder"]));
        assert_eq!(shared.history().len(), 3);
        assert!(shared.history()[1].is_empty());
        assert!(shared.ever_showed("2026-05-01"));
        assert!(!shared.ever_showed("Chat"));
    }
}
