//! Domain error types.

/// A parse error with position information for rule parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for trendscan.
#[derive(Debug, thiserror::Error)]
pub enum TrendscanError {
    #[error("no data found for {code}")]
    NotFound { code: String },

    #[error("insufficient history for {code}: have {bars} bars, need {minimum}")]
    InsufficientHistory {
        code: String,
        bars: usize,
        minimum: usize,
    },

    #[error("malformed series for {code}: {reason}")]
    MalformedSeries { code: String, reason: String },

    #[error("data source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    RuleParse(#[from] ParseError),

    #[error("invalid rule: {reason}")]
    RuleInvalid { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrendscanError {
    /// Errors that only mean "this instrument cannot be analysed", as opposed
    /// to a broken data source or configuration.
    pub fn is_data_sufficiency(&self) -> bool {
        matches!(
            self,
            TrendscanError::NotFound { .. }
                | TrendscanError::InsufficientHistory { .. }
                | TrendscanError::MalformedSeries { .. }
        )
    }
}

impl From<&TrendscanError> for std::process::ExitCode {
    fn from(err: &TrendscanError) -> Self {
        let code: u8 = match err {
            TrendscanError::Io(_) => 1,
            TrendscanError::ConfigParse { .. }
            | TrendscanError::ConfigMissing { .. }
            | TrendscanError::ConfigInvalid { .. } => 2,
            TrendscanError::SourceUnavailable { .. } => 3,
            TrendscanError::RuleParse(_) | TrendscanError::RuleInvalid { .. } => 4,
            TrendscanError::NotFound { .. }
            | TrendscanError::InsufficientHistory { .. }
            | TrendscanError::MalformedSeries { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
