use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("degradation level is not a finite number ({0})")]
    InvalidLevel(f32),
    #[error("viewport is degenerate ({width}x{height}); cannot derive a safe zone")]
    DegenerateViewport { width: f32, height: f32 },
    #[error("controller has been destroyed")]
    Destroyed,
}
