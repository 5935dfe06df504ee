use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Raw result bytes on their way from the worker to the message thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPayload {
    pub bytes: Vec<u8>,
    pub prompt: String,
    pub is_test: bool,
}

/// Wakes whoever drains the mailbox.
pub trait Notify: Send + Sync {
    fn notify(&self);
}

/// Single-slot handoff between one producer and one consumer.
///
/// The slot is empty before a job produces and after the consumer takes.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    slot: Arc<Mutex<Option<ResultPayload>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ResultPayload>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a payload, returning whatever was still waiting in the slot.
    pub fn deposit(&self, payload: ResultPayload) -> Option<ResultPayload> {
        self.lock().replace(payload)
    }

    /// Take and clear the slot.
    pub fn take(&self) -> Option<ResultPayload> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn payload(tag: u8) -> ResultPayload {
        ResultPayload {
            bytes: vec![tag; 4],
            prompt: format!("prompt {tag}"),
            is_test: false,
        }
    }

    #[test]
    fn test_take_clears_slot() {
        let mailbox = Mailbox::new();
        assert!(mailbox.take().is_none());
        assert_eq!(mailbox.deposit(payload(1)), None);
        assert!(!mailbox.is_empty());
        assert_eq!(mailbox.take(), Some(payload(1)));
        assert!(mailbox.is_empty());
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn test_deposit_after_take_is_clean() {
        let mailbox = Mailbox::new();
        mailbox.deposit(payload(1));
        assert_eq!(mailbox.take().unwrap().bytes, vec![1; 4]);
        assert_eq!(mailbox.deposit(payload(2)), None);
        assert_eq!(mailbox.take().unwrap().prompt, "prompt 2");
    }

    #[test]
    fn test_undrained_deposit_is_handed_back() {
        let mailbox = Mailbox::new();
        mailbox.deposit(payload(1));
        assert_eq!(mailbox.deposit(payload(2)), Some(payload(1)));
        assert_eq!(mailbox.take(), Some(payload(2)));
    }

    #[test]
    fn test_rapid_completions_across_threads() {
        let mailbox = Mailbox::new();
        let mut taken = Vec::new();
        for tag in 0..50u8 {
            let producer = mailbox.clone();
            thread::spawn(move || producer.deposit(payload(tag)))
                .join()
                .unwrap();
            taken.push(mailbox.take().unwrap());
        }
        assert!(mailbox.is_empty());
        assert!(taken.iter().enumerate().all(|(i, p)| p.bytes == vec![i as u8; 4]));
    }
}
