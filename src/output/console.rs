use super::EntrySink;
use crate::error::{Error, Result};
use crate::render::LogEntry;
use indicatif::MultiProgress;
use std::sync::Arc;

pub struct ConsoleOutput {
    multi: Option<Arc<MultiProgress>>,
    html: bool,
}

impl ConsoleOutput {
    pub fn new(multi: Option<Arc<MultiProgress>>) -> Self {
        Self { multi, html: false }
    }

    /// Print HTML fragments instead of plain text.
    pub fn with_html(mut self, html: bool) -> Self {
        self.html = html;
        self
    }

    pub fn format(&self, entry: &LogEntry) -> String {
        if self.html {
            entry.to_html()
        } else {
            entry.to_string()
        }
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EntrySink for ConsoleOutput {
    fn write(&self, entry: &LogEntry) -> Result<()> {
        let output = self.format(entry);

        if let Some(multi) = &self.multi {
            for line in output.lines() {
                multi
                    .println(line)
                    .map_err(|e| Error::Internal(e.to_string()))?;
            }
        } else {
            for line in output.lines() {
                println!("{}", line);
            }
        }
        Ok(())
    }
}
