use tokio::sync::mpsc;

pub type Sender<T> = mpsc::Sender<T>;
pub type Receiver<T> = mpsc::Receiver<T>;

/// Stages hand work over one unit at a time; a sender blocks until the
/// receiver has taken the previous unit.
pub const HANDOFF_CAPACITY: usize = 1;

/// Create a bounded channel with the specified buffer size
pub fn create_channel<T>(buffer_size: usize) -> (Sender<T>, Receiver<T>) {
    mpsc::channel(buffer_size)
}

/// Channel between two pipeline stages.
pub fn handoff_channel<T>() -> (Sender<T>, Receiver<T>) {
    create_channel(HANDOFF_CAPACITY)
}
