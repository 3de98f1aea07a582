use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle of one ingestion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Pump and extractor are both active.
    Running,
    /// The pump finished normally; the extractor is consuming what is left.
    Draining,
    /// Both sides finished without error.
    Completed,
    /// A source, framing or sink error ended the session.
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn can_move_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Running, Self::Draining) => true,
            (Self::Running | Self::Draining, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}

/// Shared, observable session state.
#[derive(Debug, Clone)]
pub(crate) struct StateCell {
    tx: Arc<watch::Sender<PipelineState>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(PipelineState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }

    pub(crate) fn get(&self) -> PipelineState {
        *self.tx.borrow()
    }

    /// Move to `next` if the transition is legal; terminal states never change.
    pub(crate) fn transition(&self, next: PipelineState) -> bool {
        self.tx.send_if_modified(|current| {
            if current.can_move_to(next) {
                *current = next;
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), PipelineState::Running);
        assert!(cell.transition(PipelineState::Draining));
        assert!(cell.transition(PipelineState::Completed));
        assert!(cell.get().is_terminal());
    }

    #[test]
    fn failed_is_sticky() {
        let cell = StateCell::new();
        assert!(cell.transition(PipelineState::Failed));
        assert!(!cell.transition(PipelineState::Draining));
        assert!(!cell.transition(PipelineState::Completed));
        assert_eq!(cell.get(), PipelineState::Failed);
    }

    #[test]
    fn draining_cannot_go_back_to_running() {
        let cell = StateCell::new();
        cell.transition(PipelineState::Draining);
        assert!(!cell.transition(PipelineState::Running));
        assert!(!cell.transition(PipelineState::Draining));
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();
        cell.transition(PipelineState::Failed);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), PipelineState::Failed);
    }
}
