//! Per-request diagnostic trail.

/// Ordered diagnostic lines collected while serving one request.
///
/// Components receive `&mut Diagnostics` and push a line for every skipped
/// endpoint, failed year or fallback taken. Each line is also logged at
/// debug level. Concurrent sub-fetches return their lines as values and
/// the caller appends them after joining, so the trail never needs a lock.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    lines: Vec<String>,
}

impl Diagnostics {
    /// Creates an empty trail.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Appends a line.
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        log::debug!("{line}");
        self.lines.push(line);
    }

    /// Appends every line of `other`, keeping its order.
    pub fn append(&mut self, other: Self) {
        self.lines.extend(other.lines);
    }

    /// Returns the collected lines.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Consumes the trail, returning its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
