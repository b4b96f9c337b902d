use std::fmt;

use crate::config::WriteGuardConfig;

/// Why a full-file write looks like a fragment rather than a complete file.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardViolation {
    Truncated {
        proposed: usize,
        original: usize,
        min_ratio: f64,
    },
    MissingStructure {
        markers: Vec<String>,
    },
}

impl fmt::Display for GuardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated {
                proposed,
                original,
                min_ratio,
            } => write!(
                f,
                "content is {proposed} bytes but the current file is {original} bytes \
(minimum ratio {min_ratio}); send the complete file, not a diff or snippet"
            ),
            Self::MissingStructure { markers } => write!(
                f,
                "the current file has module markers ({}) but the new content has none; \
send the complete file including its imports",
                markers.join(", ")
            ),
        }
    }
}

/// Rejects writes that look truncated compared to the file they replace.
#[derive(Debug, Clone)]
pub struct WriteGuard {
    min_length_ratio: f64,
    structural_markers: Vec<String>,
    bind_content: bool,
}

impl WriteGuard {
    pub fn new(min_length_ratio: f64, structural_markers: Vec<String>, bind_content: bool) -> Self {
        Self {
            min_length_ratio,
            structural_markers,
            bind_content,
        }
    }

    pub fn from_config(config: &WriteGuardConfig) -> Self {
        Self::new(
            config.min_length_ratio,
            config.structural_markers.clone(),
            config.bind_content,
        )
    }

    /// Whether a write must carry exactly the approved content.
    pub fn binds_content(&self) -> bool {
        self.bind_content
    }

    /// Check `proposed` against the content currently on disk (`None` for a new file).
    pub fn check(&self, original: Option<&str>, proposed: &str) -> Result<(), GuardViolation> {
        let Some(original) = original.filter(|o| !o.trim().is_empty()) else {
            return Ok(());
        };

        #[allow(clippy::cast_precision_loss)]
        let threshold = original.len() as f64 * self.min_length_ratio;
        #[allow(clippy::cast_precision_loss)]
        let proposed_len = proposed.len() as f64;
        if proposed_len < threshold {
            return Err(GuardViolation::Truncated {
                proposed: proposed.len(),
                original: original.len(),
                min_ratio: self.min_length_ratio,
            });
        }

        let expected: Vec<String> = self
            .structural_markers
            .iter()
            .filter(|marker| original.contains(marker.as_str()))
            .cloned()
            .collect();
        if !expected.is_empty()
            && !self
                .structural_markers
                .iter()
                .any(|marker| proposed.contains(marker.as_str()))
        {
            return Err(GuardViolation::MissingStructure { markers: expected });
        }

        Ok(())
    }
}

impl Default for WriteGuard {
    fn default() -> Self {
        Self::from_config(&WriteGuardConfig::default())
    }
}
