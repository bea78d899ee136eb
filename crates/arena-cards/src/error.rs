/// Recoverable per-download failures. Callers match on these and continue
/// the run; nothing here is fatal.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {0}")]
    Status(u16),

    #[error("Empty response payload")]
    EmptyPayload,

    #[error("IO error: {0}")]
    Io(String),
}
