/// Construction-time options for [`crate::Iblt::new`]/[`crate::Iblt::with_hfs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// When set (the default), column size is rounded up to the nearest
    /// prime `>= ceil(requested_cells / k)`. When unset, `requested_cells` is
    /// rounded up to the nearest multiple of `k` instead.
    pub prime: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { prime: true }
    }
}

impl Options {
    /// Disables prime column sizing, rounding `requested_cells` up to the
    /// nearest multiple of `k` instead.
    pub fn cells_only() -> Self {
        Options { prime: false }
    }
}
