use crate::error::Result;
use crate::render::LogEntry;

pub mod console;

/// Receives each entry as the controller prepends it to the log view.
pub trait EntrySink: Send + Sync {
    fn write(&self, entry: &LogEntry) -> Result<()>;
}
