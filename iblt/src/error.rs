use thiserror::Error;

/// Errors surfaced synchronously by the IBLT engine.
///
/// A missed lookup is not an error variant here: it's an ordinary outcome of
/// [`crate::Iblt::get`], not a configuration or programmer error, so it is
/// modeled as `Option::None` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IbltError {
    /// `requested_cells < 1`, or an HFS of size 0. Raised at construction.
    #[error("invalid IBLT configuration: {0}")]
    InvalidConfiguration(String),

    /// `get_prop` was called with a name outside
    /// `{item_count, col_size, cell_count}`.
    #[error("unknown IBLT property: {0}")]
    UnknownProperty(String),
}
