//! Error types and result definitions for the incremental load engine.
//!
//! Provides a single rich error type, [`DimError`], with classification,
//! captured callsite metadata, and aggregation for multi-failure scenarios.
//! Row-level problems (empty natural keys) are diagnostics, not errors, and
//! never appear here.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for load-engine operations using [`DimError`].
pub type DimResult<T> = Result<T, DimError>;

/// Detailed payload stored for single [`DimError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for load-engine operations.
///
/// [`DimError`] can represent a single classified error or multiple
/// aggregated errors, while always carrying the callsite that raised it.
#[derive(Debug, Clone)]
pub struct DimError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors, e.g. from parallel stage failures.
    Many {
        errors: Vec<DimError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during incremental loading.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Change detection
    /// An attribute value could not be canonicalized for fingerprinting.
    NormalizationFailed,

    // Dimension store
    /// A staged attribute name collides with a reserved metadata column.
    SchemaConflict,
    DimensionConnectionFailed,
    DimensionQueryFailed,
    /// The insert/expire transaction could not commit as a unit.
    AtomicApplyFailed,

    // Run ledger
    LedgerQueryFailed,
    LedgerWriteFailed,

    // Pipeline driver
    /// A store call exceeded the caller-supplied timeout.
    StageTimeout,
    StageCanceled,

    // Configuration & state
    ConfigError,
    InvalidState,

    // Data & serialization
    ConversionError,
    IoError,
    SerializationError,
    DeserializationError,

    // Unknown / uncategorized
    Unknown,

    // Used by fault-injection tests only.
    #[cfg(feature = "failpoints")]
    WithInjectedFault,
}

impl DimError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Attaches an originating [`error::Error`] and returns the modified
    /// instance. Has no effect on aggregated errors, which forward their
    /// first contained error as the source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates a [`DimError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        DimError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for DimError {
    fn eq(&self, other: &DimError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for DimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail: {detail}")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    for (line_index, line) in rendered.lines().enumerate() {
                        if line_index == 0 {
                            write!(f, "\n  {}. {}", index + 1, line)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for DimError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`DimError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for DimError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> DimError {
        DimError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`DimError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for DimError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> DimError {
        DimError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`DimError`] from a vector of errors for aggregation.
///
/// A vector of exactly one error unwraps to that error directly.
impl<E> From<Vec<E>> for DimError
where
    E: Into<DimError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> DimError {
        let location = Location::caller();

        let mut errors: Vec<DimError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        DimError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`DimError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for DimError {
    #[track_caller]
    fn from(err: std::io::Error) -> DimError {
        let detail = err.to_string();
        let source = Arc::new(err);
        DimError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`DimError`] with the appropriate kind.
impl From<serde_json::Error> for DimError {
    #[track_caller]
    fn from(err: serde_json::Error) -> DimError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            _ => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        DimError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`sqlx::Error`] to [`DimError`].
///
/// Connection pool failures map to [`ErrorKind::DimensionConnectionFailed`];
/// everything else is a query failure. Ledger stores re-wrap these into the
/// ledger kinds at their call sites so the two stores stay distinguishable.
impl From<sqlx::Error> for DimError {
    #[track_caller]
    fn from(err: sqlx::Error) -> DimError {
        let kind = match &err {
            sqlx::Error::Io(_) => ErrorKind::IoError,
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                ErrorKind::DimensionConnectionFailed
            }
            _ => ErrorKind::DimensionQueryFailed,
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        DimError::from_components(
            kind,
            Cow::Borrowed("Database operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts configuration validation failures into [`ErrorKind::ConfigError`].
impl From<pricedim_config::shared::ValidationError> for DimError {
    #[track_caller]
    fn from(err: pricedim_config::shared::ValidationError) -> DimError {
        let detail = err.to_string();
        let source = Arc::new(err);
        DimError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid pipeline configuration"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dim_error;

    #[test]
    fn single_error_exposes_kind_and_detail() {
        let err = dim_error!(
            ErrorKind::SchemaConflict,
            "Reserved column collision",
            "attribute 'is_current' is reserved"
        );

        assert_eq!(err.kind(), ErrorKind::SchemaConflict);
        assert_eq!(err.detail(), Some("attribute 'is_current' is reserved"));
        assert!(format!("{err}").contains("Reserved column collision"));
    }

    #[test]
    fn aggregated_errors_flatten_kinds() {
        let errors = vec![
            dim_error!(ErrorKind::LedgerWriteFailed, "first"),
            dim_error!(ErrorKind::AtomicApplyFailed, "second"),
        ];
        let err = DimError::from(errors);

        assert_eq!(err.kind(), ErrorKind::LedgerWriteFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::LedgerWriteFailed, ErrorKind::AtomicApplyFailed]
        );
    }

    #[test]
    fn single_element_vector_unwraps() {
        let err = DimError::from(vec![dim_error!(ErrorKind::InvalidState, "only one")]);
        assert_eq!(err.kinds().len(), 1);
    }
}
