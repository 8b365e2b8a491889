//! Cleanup of guest error text before it is shown to the user.
//!
//! Tracebacks coming back from the interpreter include frames of the driver
//! that hosts the guest program. Those lines mean nothing to a learner, so any
//! line naming the runtime is dropped.

/// Markers identifying lines that belong to the runtime rather than the guest.
pub const DEFAULT_INTERNAL_MARKERS: &[&str] = &[
    "<pystudio-driver>",
    "_pystudio",
    "_pyodide",
    "pyodide.ffi",
];

#[derive(Debug, Clone)]
pub struct ErrorNormalizer {
    markers: Vec<String>,
}

impl Default for ErrorNormalizer {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl ErrorNormalizer {
    /// Default markers plus `extra`.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut markers: Vec<String> = DEFAULT_INTERNAL_MARKERS
            .iter()
            .map(|m| m.to_string())
            .collect();
        markers.extend(extra.into_iter().map(Into::into));
        Self { markers }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn normalize(&self, raw: &str) -> String {
        let kept: Vec<&str> = raw
            .lines()
            .filter(|line| !self.markers.iter().any(|m| line.contains(m.as_str())))
            .collect();

        // Never replace a real message with nothing.
        if kept.iter().all(|line| line.trim().is_empty()) {
            return raw.to_string();
        }
        kept.join("\n")
    }
}

/// Normalizes with the default markers only.
pub fn normalize_error(raw: &str) -> String {
    ErrorNormalizer::default().normalize(raw)
}
