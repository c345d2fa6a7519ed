/// Domain-level error type for core operations.
///
/// The core crate is pure logic, so the only failure mode is invalid input
/// (out-of-range line coordinates, non-finite numbers, degenerate boxes).
/// Lifecycle and I/O errors live in the pipeline crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Input failed validation.
    #[error("validation error: {0}")]
    Validation(String),
}
