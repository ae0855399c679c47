use ffpipe_core::{Error, Failure, Result};

/// How a run ended. Exactly one is produced per run.
#[derive(Debug)]
pub enum Outcome {
    Success,
    Failure(Failure),
    Cancelled,
}

impl Outcome {
    pub(crate) fn failed(cause: Error, diagnostics: Vec<String>) -> Self {
        Outcome::Failure(Failure::new(cause, diagnostics))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Collapse into a `Result`: failures become [`Error::Run`], cancellation
    /// becomes [`Error::Cancelled`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Outcome::Success => Ok(()),
            Outcome::Failure(failure) => Err(failure.into()),
            Outcome::Cancelled => Err(Error::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_into_result() {
        assert!(Outcome::Success.into_result().is_ok());
        assert!(Outcome::Success.is_success());
    }

    #[test]
    fn cancelled_into_result() {
        let outcome = Outcome::Cancelled;
        assert!(outcome.is_cancelled());
        assert!(outcome.as_failure().is_none());
        assert!(outcome.into_result().unwrap_err().is_cancelled());
    }

    #[test]
    fn failure_keeps_diagnostics() {
        let outcome = Outcome::failed(
            Error::ProcessExited { code: Some(1) },
            vec!["pipe:: Invalid data found when processing input".into()],
        );
        assert_eq!(outcome.as_failure().unwrap().exit_code, Some(1));
        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.diagnostics().len(), 1);
        assert!(err.to_string().contains("Invalid data"));
    }
}
