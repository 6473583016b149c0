//! Model resource locators.

use std::fmt;

use url::Url;

use crate::error::BuildError;

/// A parsed, absolute, URL-like model resource locator (`model://x`,
/// `file:///data/run.h5`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocator(Url);

impl ResourceLocator {
    /// Parses a locator.
    ///
    /// # Errors
    /// Returns [`BuildError::MalformedResource`] if `raw` is not an absolute URL.
    pub fn parse(raw: &str) -> Result<Self, BuildError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BuildError::MalformedResource {
                locator: raw.to_string(),
                reason: "empty locator".to_string(),
            });
        }
        Url::parse(trimmed).map(Self).map_err(|e| BuildError::MalformedResource {
            locator: raw.to_string(),
            reason: e.to_string(),
        })
    }

    /// Parses every locator in `raws`, failing on the first malformed one.
    ///
    /// # Errors
    /// Returns [`BuildError::MalformedResource`] for the first locator that fails.
    pub fn parse_all<S: AsRef<str>>(raws: &[S]) -> Result<Vec<Self>, BuildError> {
        raws.iter().map(|r| Self::parse(r.as_ref())).collect()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    #[must_use]
    pub const fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
