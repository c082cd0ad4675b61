use apollo_compiler::validation::WithErrors;

/// Create an internal error value without returning it.
#[macro_export]
macro_rules! internal_error {
    ( $( $arg:tt )+ ) => {
        $crate::error::PlannerError::internal(format!( $( $arg )+ ))
    }
}

/// Break out of the current function, returning an internal error.
#[macro_export]
macro_rules! bail {
    ( $( $arg:tt )+ ) => {
        return Err($crate::internal_error!( $( $arg )+ ))
    }
}

/// A safe assertion: in debug mode it panics on failure, in production it
/// returns an internal error. It must only be used for conditions that should
/// never happen in normal operation.
#[macro_export]
macro_rules! ensure {
    ( $expr:expr, $( $arg:tt )+ ) => {
        #[cfg(debug_assertions)]
        {
            if false {
                return Err($crate::error::PlannerError::internal(
                    "ensure!() must be used in a function that returns a Result".to_owned(),
                ));
            }
            assert!($expr, $( $arg )+);
        }

        #[cfg(not(debug_assertions))]
        if !$expr {
            $crate::bail!( $( $arg )+ );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlannerError {
    /// The supergraph document is invalid: bad SDL, a missing or wrongly-typed
    /// directive argument, a duplicate type in one subgraph, or a key selection
    /// referencing an undefined type or field.
    #[error("{message}")]
    MalformedSupergraph { message: String },
    /// The input uses a construct the planner knowingly does not handle, such
    /// as fragments inside key selections or non-field query steps.
    #[error("{message}")]
    UnsupportedFeature { message: String },
    /// Plan synthesis could not identify the field to request downstream of an
    /// entity jump.
    #[error(
        "cannot identify the target field after the entity jump on \"{type_name}\" into subgraph \"{subgraph}\""
    )]
    MissingTargetField { type_name: String, subgraph: String },
    /// The walker materialized more candidate paths than the configured bound
    /// allows. Raising `max_explored_paths` may let the call complete.
    #[error("query planning explored more than {limit} candidate paths")]
    PathLimitExceeded { limit: u32 },
    /// A planner invariant was violated. This always indicates a bug.
    #[error("{message}")]
    Internal { message: String },
}

impl PlannerError {
    pub fn internal(message: impl Into<String>) -> Self {
        PlannerError::Internal {
            message: message.into(),
        }
    }

    pub fn malformed_supergraph(message: impl Into<String>) -> Self {
        PlannerError::MalformedSupergraph {
            message: message.into(),
        }
    }

    pub fn unsupported_feature(message: impl Into<String>) -> Self {
        PlannerError::UnsupportedFeature {
            message: message.into(),
        }
    }
}

impl<T> From<WithErrors<T>> for PlannerError {
    fn from(errors: WithErrors<T>) -> Self {
        PlannerError::MalformedSupergraph {
            message: errors.errors.to_string(),
        }
    }
}
