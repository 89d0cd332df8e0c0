//! Which marker values never take part in duplicate detection.

/// Excludes marker values carrying a known generated-artifact suffix.
///
/// Generated companions legitimately repeat the marker of the declaration
/// they were derived from, so they must not be reported as duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnorePolicy {
    suffixes: Vec<String>,
}

impl IgnorePolicy {
    pub fn new(suffixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    /// A policy that ignores nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn ignores(&self, value: &str) -> bool {
        self.suffixes.iter().any(|suffix| value.ends_with(suffix.as_str()))
    }
}
