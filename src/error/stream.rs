//! Failure type of a streaming session.

use std::fmt;

use super::zulip_error::ZulipError;

/// Why a streaming session ended with an error.
///
/// `error` is the reason the loop stopped. `deregistration` is set when the
/// queue could not be released afterwards; it is reported next to the
/// original error, never in place of it.
#[derive(Debug)]
pub struct StreamError {
    pub error: ZulipError,
    pub deregistration: Option<ZulipError>,
}

impl StreamError {
    pub fn new(error: ZulipError) -> Self {
        Self {
            error,
            deregistration: None,
        }
    }

    pub fn with_deregistration(mut self, deregistration: Option<ZulipError>) -> Self {
        self.deregistration = deregistration;
        self
    }

    pub fn into_inner(self) -> ZulipError {
        self.error
    }
}

impl From<ZulipError> for StreamError {
    fn from(error: ZulipError) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(dereg) = &self.deregistration {
            write!(f, " (queue release also failed: {})", dereg)?;
        }
        Ok(())
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
