use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Warning,
    Error,
}

/// Sink for user-visible notices. The host UI renders these as toasts;
/// the core only decides when one is due.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NoticeKind, message: &str);
}

/// Default sink that routes notices to the log. Useful for headless hosts
/// and as a stand-in until the UI wires its own.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, kind: NoticeKind, message: &str) {
        match kind {
            NoticeKind::Success | NoticeKind::Info => info!("[notice] {message}"),
            NoticeKind::Warning | NoticeKind::Error => warn!("[notice] {message}"),
        }
    }
}
