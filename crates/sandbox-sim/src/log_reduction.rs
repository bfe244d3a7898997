use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Delay before an identical error for the same sandbox is logged again.
pub const IDENTICAL_ERROR_DELAY: Duration = Duration::from_secs(60);

/// Suppresses repeats of the same message per sandbox id.
#[derive(Debug)]
pub struct LogReduction {
    delay: Duration,
    last: HashMap<String, (String, Instant)>,
}

impl Default for LogReduction {
    fn default() -> Self {
        Self::new(IDENTICAL_ERROR_DELAY)
    }
}

impl LogReduction {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: HashMap::new(),
        }
    }

    /// Whether `message` for `id` should be logged now. A different message,
    /// or the same one after `delay`, resets the window.
    pub fn should_print(&mut self, message: &str, id: &str) -> bool {
        let now = Instant::now();
        let repeated = self.last.get(id).is_some_and(|(last_message, at)| {
            last_message == message && now.duration_since(*at) < self.delay
        });
        if repeated {
            return false;
        }
        self.last.insert(id.to_string(), (message.to_string(), now));
        true
    }

    pub fn clear(&mut self, id: &str) {
        self.last.remove(id);
    }

    /// Drop entries for ids no longer tracked.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.last.retain(|id, _| keep(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn identical_messages_are_suppressed_until_delay() {
        let mut reduction = LogReduction::default();
        assert!(reduction.should_print("boom", "sb-1"));
        assert!(!reduction.should_print("boom", "sb-1"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!reduction.should_print("boom", "sb-1"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(reduction.should_print("boom", "sb-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn different_message_or_id_prints() {
        let mut reduction = LogReduction::default();
        assert!(reduction.should_print("boom", "sb-1"));
        assert!(reduction.should_print("boom", "sb-2"));
        assert!(reduction.should_print("bang", "sb-1"));
        assert!(reduction.should_print("boom", "sb-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_and_retain_forget_ids() {
        let mut reduction = LogReduction::default();
        reduction.should_print("boom", "sb-1");
        reduction.should_print("boom", "sb-2");

        reduction.clear("sb-1");
        assert!(reduction.should_print("boom", "sb-1"));

        reduction.retain(|id| id == "sb-1");
        assert!(!reduction.should_print("boom", "sb-1"));
        assert!(reduction.should_print("boom", "sb-2"));
    }
}
