use crate::errors::AppError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Outbound mail. Delivery mechanics live behind this seam.
pub trait Mailer: Send + Sync {
    fn send(&self, email: &Email) -> Result<(), AppError>;
}

/// Writes each message to the log instead of delivering it.
#[derive(Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: &Email) -> Result<(), AppError> {
        log::info!("mail to {} ({}):\n{}", email.to, email.subject, email.text);
        Ok(())
    }
}

/// Keeps sent messages in memory; can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<Email>>,
    failing: AtomicBool,
}

impl MemoryMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().clone()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, email: &Email) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Io("mail transport unavailable".into()));
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}
