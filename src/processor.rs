//! Output post-processing: line-ending policy.
//!
//! Tesseract emits platform-dependent line endings; the policy normalizes
//! them before text leaves the service.

use serde::Deserialize;

/// Line-ending policy applied to OCR output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEndings {
    /// Leave whatever the binary produced.
    #[default]
    Auto,
    /// Normalize to `\n`.
    Lf,
    /// Normalize to `\r\n`.
    Crlf,
}

impl std::str::FromStr for LineEndings {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "lf" => Ok(Self::Lf),
            "crlf" => Ok(Self::Crlf),
            other => Err(format!("unknown line ending policy: {other:?}")),
        }
    }
}

impl LineEndings {
    pub fn normalize(&self, text: &str) -> String {
        match self {
            Self::Auto => text.to_string(),
            Self::Lf => text.replace("\r\n", "\n"),
            Self::Crlf => text.replace("\r\n", "\n").replace('\n', "\r\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_leaves_text_untouched() {
        assert_eq!(LineEndings::Auto.normalize("a\r\nb\nc"), "a\r\nb\nc");
    }

    #[test]
    fn test_lf_strips_carriage_returns() {
        assert_eq!(LineEndings::Lf.normalize("a\r\nb\nc"), "a\nb\nc");
    }

    #[test]
    fn test_crlf_normalizes_mixed_endings() {
        assert_eq!(LineEndings::Crlf.normalize("a\r\nb\nc"), "a\r\nb\r\nc");
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("auto".parse::<LineEndings>().unwrap(), LineEndings::Auto);
        assert_eq!("LF".parse::<LineEndings>().unwrap(), LineEndings::Lf);
        assert_eq!("crlf".parse::<LineEndings>().unwrap(), LineEndings::Crlf);
        assert!("cr".parse::<LineEndings>().is_err());
    }
}
