//! Admin notification seam.
//!
//! The engine reports the first hard failure of a wiki's run exactly once.
//! How that report travels (mail, paging, a dashboard) is deployment
//! policy, so the engine only defines the seam; the default sink is the
//! log.

use dumpmill_types::{DumpDate, WikiId};

pub trait Notifier: Send + Sync {
    fn notify(&self, wiki: &WikiId, date: &DumpDate, message: &str);
}

/// Default notifier: an error-level log line.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, wiki: &WikiId, date: &DumpDate, message: &str) {
        tracing::error!(wiki = %wiki, date = %date, message, "dump run failure");
    }
}
