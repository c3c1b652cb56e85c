//! Error types for the softcode crate
//!
//! Softcode errors are never fatal. Their `Display` text is the `#-1 ...`
//! token the player sees in place of the failed expression, so a builtin
//! can simply return `Err(..)` and let the evaluator write it out.

use mush_core::MushError;

/// Softcode-level errors rendered inline in evaluated output
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SoftcodeError {
    /// No builtin or user function with this name
    #[error("#-1 FUNCTION ({0}) NOT FOUND")]
    FunctionNotFound(String),

    /// Builtin called with the wrong argument count
    #[error("#-1 FUNCTION ({name}) EXPECTS {expected} ARGUMENTS BUT GOT {got}")]
    WrongArgCount {
        name: String,
        expected: i32,
        got: usize,
    },

    /// Builtin called with an argument count outside its range
    #[error("#-1 FUNCTION ({name}) EXPECTS BETWEEN {min} AND {max} ARGUMENTS BUT GOT {got}")]
    ArgCountRange {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },

    /// Builtin called with fewer than the required arguments
    #[error("#-1 FUNCTION ({name}) EXPECTS AT LEAST {min} ARGUMENTS BUT GOT {got}")]
    TooFewArgs { name: String, min: usize, got: usize },

    /// Builtin called with more than it accepts
    #[error("#-1 FUNCTION ({name}) EXPECTS NO MORE THAN {max} ARGUMENTS BUT GOT {got}")]
    TooManyArgs { name: String, max: usize, got: usize },

    /// Builtin requires an even number of arguments
    #[error("#-1 FUNCTION ({name}) EXPECTS AN EVEN NUMBER OF ARGUMENTS BUT GOT {got}")]
    OddArgCount { name: String, got: usize },

    /// Nesting depth ceiling reached
    #[error("#-1 FUNCTION RECURSION LIMIT EXCEEDED")]
    RecursionLimit,

    /// Invocation counter ceiling reached
    #[error("#-1 FUNCTION INVOCATION LIMIT EXCEEDED")]
    InvocationLimit,

    /// Wall-clock budget for the command exhausted
    #[error("#-1 FUNCTION CPU LIMIT EXCEEDED")]
    CpuLimit,

    /// The executor was destroyed mid-evaluation
    #[error("#-1 BAD INVOKER")]
    BadInvoker,

    /// Permission check failed
    #[error("#-1 PERMISSION DENIED")]
    PermissionDenied,

    /// Register name is not a valid global register
    #[error("#-1 INVALID GLOBAL REGISTER")]
    InvalidRegister,

    /// No room for another named register
    #[error("#-1 REGISTER LIMIT EXCEEDED")]
    RegisterLimit,

    /// Several register assignments failed
    #[error("#-1 ENCOUNTERED {0} ERRORS")]
    RegisterErrors(usize),

    /// Not enough arguments for a u-function style call
    #[error("#-1 TOO FEW ARGUMENTS")]
    TooFewArguments,

    /// Argument was expected to be a number
    #[error("#-1 ARGUMENT MUST BE NUMBER")]
    NotANumber,

    /// Argument was expected to be an integer
    #[error("#-1 ARGUMENTS MUST BE INTEGERS")]
    NotAnInteger,

    /// Division or modulus by zero
    #[error("#-1 DIVIDE BY ZERO")]
    DivideByZero,

    /// Object lookup failed
    #[error("#-1 NO MATCH")]
    NoMatch,

    /// Attribute lookup failed or was not readable
    #[error("#-1 NO SUCH ATTRIBUTE")]
    NoSuchAttribute,

    /// Too many nested loops
    #[error("#-1 TOO MANY NESTED LOOPS")]
    LoopNesting,

    /// A loop level was requested that does not exist
    #[error("#-1 ARGUMENT OUT OF RANGE")]
    OutOfRange,
}

impl From<SoftcodeError> for MushError {
    fn from(err: SoftcodeError) -> Self {
        MushError::Softcode(err.to_string())
    }
}

/// Result type for softcode operations
pub type Result<T> = std::result::Result<T, SoftcodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_tokens() {
        assert_eq!(
            SoftcodeError::FunctionNotFound("FOO".into()).to_string(),
            "#-1 FUNCTION (FOO) NOT FOUND"
        );
        assert_eq!(
            SoftcodeError::WrongArgCount {
                name: "ADD".into(),
                expected: 2,
                got: 3
            }
            .to_string(),
            "#-1 FUNCTION (ADD) EXPECTS 2 ARGUMENTS BUT GOT 3"
        );
        assert_eq!(
            SoftcodeError::RegisterErrors(2).to_string(),
            "#-1 ENCOUNTERED 2 ERRORS"
        );
    }

    #[test]
    fn test_into_core_error() {
        let err: MushError = SoftcodeError::BadInvoker.into();
        assert!(err.to_string().contains("#-1 BAD INVOKER"));
    }
}
