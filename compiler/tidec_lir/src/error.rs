//! The two error categories surfaced at the core's boundary (spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrgenError {
    /// A source construct this revision does not implement (channels, maps,
    /// closures, type assertions, defer, goroutines, interface method
    /// invocation, or an unsupported operator/type combination). Fatal for
    /// the enclosing member; non-fatal for the rest of the package (spec §7).
    #[error("unsupported feature `{feature}` in {context}")]
    Unsupported { feature: String, context: String },

    /// A pre-condition of an internal step was not met — e.g. a reference to
    /// an unindexed function, or a cyclic φ-predecessor dependency that
    /// prevents block emission from converging. Treated as a bug (spec §7).
    #[error("internal invariant violated: {message}")]
    Internal { message: String },
}

impl IrgenError {
    pub fn unsupported(feature: impl Into<String>, context: impl Into<String>) -> Self {
        IrgenError::Unsupported {
            feature: feature.into(),
            context: context.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        IrgenError::Internal {
            message: message.into(),
        }
    }
}

pub type IrgenResult<T> = Result<T, IrgenError>;
