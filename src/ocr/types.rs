//! OCR option and error types.

use serde::{Deserialize, Serialize};

/// Options accepted in the multipart `options` field, mapped onto the
/// tesseract command line. Each distinct combination is served by its own
/// worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OcrOptions {
    /// Languages passed to `-l`, joined with `+`.
    pub languages: Vec<String>,
    /// OCR engine mode (`--oem`, 0-3).
    pub oem: Option<u8>,
    /// Page segmentation mode (`--psm`, 0-13).
    pub psm: Option<u8>,
    /// Input DPI hint (`--dpi`).
    pub dpi: Option<u32>,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            languages: vec!["eng".to_string()],
            oem: None,
            psm: None,
            dpi: None,
        }
    }
}

impl OcrOptions {
    /// Reject option sets that cannot form a valid tesseract invocation.
    /// Language codes are restricted to the characters tesseract traineddata
    /// names use, so they can be passed straight through as arguments.
    pub fn validate(&self) -> Result<(), OcrError> {
        if self.languages.is_empty() {
            return Err(OcrError::InvalidOptions(
                "at least one language is required".to_string(),
            ));
        }
        for lang in &self.languages {
            let well_formed = !lang.is_empty()
                && lang
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !well_formed {
                return Err(OcrError::InvalidOptions(format!(
                    "invalid language code: {lang:?}"
                )));
            }
        }
        if let Some(oem) = self.oem {
            if oem > 3 {
                return Err(OcrError::InvalidOptions(format!(
                    "oem must be 0-3, got {oem}"
                )));
            }
        }
        if let Some(psm) = self.psm {
            if psm > 13 {
                return Err(OcrError::InvalidOptions(format!(
                    "psm must be 0-13, got {psm}"
                )));
            }
        }
        Ok(())
    }

    /// The `-l` argument value.
    pub fn lang_arg(&self) -> String {
        self.languages.join("+")
    }

    /// Stable label for the pool serving this option set, used on `/status`.
    pub fn pool_key(&self) -> String {
        let mut key = self.lang_arg();
        if let Some(oem) = self.oem {
            key.push_str(&format!("|oem={oem}"));
        }
        if let Some(psm) = self.psm {
            key.push_str(&format!("|psm={psm}"));
        }
        if let Some(dpi) = self.dpi {
            key.push_str(&format!("|dpi={dpi}"));
        }
        key
    }
}

/// Failures while running a job on a worker.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// Tesseract ran but exited non-zero (e.g. unreadable image). The worker
    /// itself is still healthy and goes back to the pool.
    #[error("ocr run failed: {stderr}")]
    ExecutionFailed { code: Option<i32>, stderr: String },
    /// The worker process could not be driven at all (spawn failure, broken
    /// pipe, job timeout). The holder must invalidate the worker.
    #[error("ocr worker crashed: {0}")]
    Crashed(String),
    #[error("invalid ocr options: {0}")]
    InvalidOptions(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = OcrOptions::default();
        assert_eq!(options.lang_arg(), "eng");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_deserialize_partial() {
        let options: OcrOptions = serde_json::from_str(r#"{"languages":["eng","deu"],"psm":3}"#).unwrap();
        assert_eq!(options.lang_arg(), "eng+deu");
        assert_eq!(options.psm, Some(3));
        assert_eq!(options.oem, None);
    }

    #[test]
    fn test_validate_rejects_malformed_language() {
        let options = OcrOptions {
            languages: vec!["eng; rm -rf /".to_string()],
            ..OcrOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(OcrError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_modes() {
        let options = OcrOptions {
            psm: Some(14),
            ..OcrOptions::default()
        };
        assert!(options.validate().is_err());

        let options = OcrOptions {
            oem: Some(4),
            ..OcrOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_pool_key_is_stable_per_option_set() {
        let options = OcrOptions {
            languages: vec!["eng".to_string(), "fra".to_string()],
            oem: Some(1),
            psm: Some(3),
            dpi: Some(300),
        };
        assert_eq!(options.pool_key(), "eng+fra|oem=1|psm=3|dpi=300");
        assert_eq!(OcrOptions::default().pool_key(), "eng");
    }
}
