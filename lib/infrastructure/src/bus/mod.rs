use tokio::sync::broadcast::{self, error::RecvError};

/// Fan-out of published values to any number of asynchronous listeners.
///
/// Publishing never fails: with no listener attached the value is simply dropped.
pub struct EventBus<T> {
    tx: broadcast::Sender<T>,
}

pub struct EventListener<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone + std::fmt::Debug> EventBus<T> {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    pub fn subscribe(&self) -> EventListener<T> {
        EventListener { rx: self.tx.subscribe() }
    }

    pub fn publish(&self, event: T) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!("No listener for {}", std::any::type_name::<T>());
                0
            }
        }
    }
}

impl<T: Clone> EventListener<T> {
    /// Waits for the next value. Returns `None` once the bus is gone. A lagging listener skips
    /// to the oldest value still buffered.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Closed) => {
                    tracing::debug!("Event bus for {} closed", std::any::type_name::<T>());
                    return None;
                }
                Err(RecvError::Lagged(count)) => {
                    tracing::warn!(
                        "Listener for {} lagged by {} messages",
                        std::any::type_name::<T>(),
                        count
                    );
                }
            }
        }
    }
}
