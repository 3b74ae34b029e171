//! Custom error types for the parsing of Tor documents

use std::num::ParseIntError;
use std::string::ToString;

use thiserror;

use crate::meta::Keyword;

/// Error that occured when parsing a Tor document
#[derive(thiserror::Error, Debug)]
pub enum DocumentParseError {
    #[error("Malformed input: {reason}")]
    MalformedInput { reason: String },
    #[error("Annotation line '{line}' is not terminated by a newline")]
    MalformedAnnotation { line: String },
    #[error("Grammar violation: {0}")]
    Grammar(#[from] GrammarViolation),
    #[error("Invalid value in line '{line}': {source}")]
    FieldValue { line: String, source: FieldError },
    #[error("Crypto block following '{keyword}' is not terminated")]
    UnterminatedCryptoBlock { keyword: String },
    #[error("Content range '{from}'...'{to}' not found, cannot compute digest")]
    DigestUnavailable { from: String, to: String },
    #[error("Unknown descriptor type, content starts with '{prefix}'")]
    UnknownDescriptorType { prefix: String },
    #[error("Unrecognized line '{line}'")]
    UnrecognizedLine { line: String },
    #[error("Master key {certificate} in identity-ed25519 does not match master-key-ed25519 {line}")]
    Ed25519MasterKeyMismatch { certificate: String, line: String },
    #[error("When parsing a document, not all necessary information were present")]
    Incomplete(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DocumentParseError {
    /// Create a new MalformedInput error, easily
    pub(crate) fn malformed(reason: impl Into<String>) -> DocumentParseError {
        DocumentParseError::MalformedInput {
            reason: reason.into(),
        }
    }

    /// Create a FieldValue error for a line that lacks arguments.
    pub(crate) fn args_missing(line: impl Into<String>, expected: usize) -> DocumentParseError {
        DocumentParseError::FieldValue {
            line: line.into(),
            source: FieldError::ArgumentsMissing { expected },
        }
    }

    /// Return the grammar violation behind this error, if that is what it is.
    pub fn grammar_violation(&self) -> Option<&GrammarViolation> {
        match self {
            DocumentParseError::Grammar(v) => Some(v),
            _ => None,
        }
    }
}

/// A cardinality contract or cross-field rule that a document broke.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarViolation {
    #[error("keyword '{keyword}' must be contained exactly once, but was found {count} times")]
    NotExactlyOnce { keyword: Keyword, count: usize },
    #[error("keyword '{keyword}' must be contained at least once")]
    NotAtLeastOnce { keyword: Keyword },
    #[error("keyword '{keyword}' must be contained at most once, but was found {count} times")]
    NotAtMostOnce { keyword: Keyword, count: usize },
    #[error("keyword '{expected}' must be contained in the first line, found '{found}'")]
    FirstKeyword { expected: Keyword, found: String },
    #[error("keyword '{expected}' must be contained in the last line, found '{found}'")]
    LastKeyword { expected: Keyword, found: String },
    #[error("keyword '{keyword}' is contained {count} times, but '{required}' is missing")]
    MissingDependency {
        keyword: Keyword,
        count: usize,
        required: Keyword,
    },
    #[error("{rule}")]
    CrossField { rule: &'static str },
    #[error("duplicate {what} '{key}'")]
    DuplicateEntry { what: &'static str, key: String },
}

/// A single token failed its type-specific validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("expected at least {expected} argument(s)")]
    ArgumentsMissing { expected: usize },
    #[error("unexpected argument(s) '{0}'")]
    UnexpectedArguments(String),
    #[error("invalid nickname '{0}'")]
    InvalidNickname(String),
    #[error("invalid IPv4 address '{0}'")]
    InvalidIpv4(String),
    #[error("invalid IP address '{0}'")]
    InvalidIpAddress(String),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("could not parse integer '{0}'")]
    InvalidInt(String),
    #[error("could not parse decimal number '{0}'")]
    InvalidDecimal(String),
    #[error("'{raw}' is not a hex string of {expected_len} characters")]
    InvalidHex { raw: String, expected_len: usize },
    #[error("'{raw}' is not base64 encoding {expected_len} bytes")]
    InvalidBase64 { raw: String, expected_len: usize },
    #[error("could not parse date/time '{0}'")]
    InvalidDate(String),
    #[error("invalid interval '{0}'")]
    InvalidInterval(String),
    #[error("invalid key=value list '{0}'")]
    InvalidArgumentDict(String),
    #[error("invalid protocol version list '{0}'")]
    InvalidProtocolVersion(String),
    #[error("invalid exit policy entry '{0}'")]
    InvalidExitPolicyEntry(String),
    #[error("invalid port policy '{0}'")]
    InvalidPortPolicy(String),
    #[error("invalid ed25519 certificate: {0}")]
    InvalidEd25519Certificate(String),
    #[error("invalid {what} '{raw}'")]
    InvalidValue { what: &'static str, raw: String },
}

pub(crate) trait ErrorContext<T> {
    type IntoError;

    fn context(self, context: impl ToString) -> Result<T, Self::IntoError>;
}

impl<T> ErrorContext<T> for Result<T, ParseIntError> {
    type IntoError = FieldError;

    fn context(self, context: impl ToString) -> Result<T, Self::IntoError> {
        self.map_err(|_| FieldError::InvalidInt(context.to_string()))
    }
}

impl<T> ErrorContext<T> for Result<T, FieldError> {
    type IntoError = DocumentParseError;

    /// Attach the offending line to a field error.
    fn context(self, context: impl ToString) -> Result<T, Self::IntoError> {
        self.map_err(|source| DocumentParseError::FieldValue {
            line: context.to_string(),
            source,
        })
    }
}
