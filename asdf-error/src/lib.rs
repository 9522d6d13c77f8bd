#![feature(error_generic_member_access)]
#![deny(missing_docs)]

//! Error handling for the ASDF crates.
//!
//! Every fallible operation in the workspace returns an [`AsdfResult`]. Errors are grouped by the
//! subsystem that raised them so that callers can tell a malformed container
//! ([`AsdfError::BlockConsistency`]) from a schema that could not be fetched
//! ([`AsdfError::SchemaLoad`]) without parsing messages.

mod ext;

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{env, fmt, io};

pub use ext::*;

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

#[allow(clippy::fallible_impl_from)]
impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    #[allow(clippy::panic)]
    fn from(msg: T) -> Self {
        if env::var("ASDF_PANIC_ON_ERR").as_deref().unwrap_or("") == "1" {
            panic!("{}\nBacktrace:\n{}", msg.into(), Backtrace::capture());
        } else {
            Self(msg.into())
        }
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for ASDF.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum AsdfError {
    /// A value was asked to carry a tag but has no tagged representation.
    #[error("{0}\nBacktrace:\n{1}")]
    StructuralTag(ErrString, Backtrace),
    /// A tree failed schema validation.
    #[error("{0}\nBacktrace:\n{1}")]
    Validation(ErrString, Backtrace),
    /// A schema could not be loaded, parsed or resolved.
    #[error("{0}\nBacktrace:\n{1}")]
    SchemaLoad(ErrString, Backtrace),
    /// A tree node or native object could not be converted.
    #[error("{0}\nBacktrace:\n{1}")]
    Conversion(ErrString, Backtrace),
    /// The binary block area is malformed or was used inconsistently.
    #[error("{0}\nBacktrace:\n{1}")]
    BlockConsistency(ErrString, Backtrace),
    /// An index is out of bounds.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(usize, usize, usize, Backtrace),
    /// An invalid argument was provided.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, Backtrace),
    /// A wrapper for other errors, carrying additional context.
    #[error("{0}: {1}")]
    Context(ErrString, Box<AsdfError>),
    /// A wrapper for IO errors.
    #[error(transparent)]
    IOError(#[from] io::Error),
    /// A wrapper for errors from the `url` crate.
    #[error(transparent)]
    UrlError(#[from] url::ParseError),
    /// A wrapper for errors from the `serde_json` crate.
    #[cfg(feature = "serde")]
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

impl AsdfError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        AsdfError::Context(msg.into(), Box::new(self))
    }

    /// Returns the innermost error, skipping any [`AsdfError::Context`] wrappers.
    pub fn root(&self) -> &AsdfError {
        match self {
            AsdfError::Context(_, inner) => inner.root(),
            other => other,
        }
    }

    /// Whether this error (or the error it wraps) is a validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), AsdfError::Validation(..))
    }

    /// Whether this error (or the error it wraps) is a block consistency failure.
    pub fn is_block_consistency(&self) -> bool {
        matches!(self.root(), AsdfError::BlockConsistency(..))
    }
}

impl Debug for AsdfError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return [`AsdfError`]s as their error type.
pub type AsdfResult<T> = Result<T, AsdfError>;

/// A trait for unwrapping an [`AsdfResult`].
pub trait AsdfUnwrap {
    /// The type of the value being unwrapped.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug (programmer error).
    fn asdf_unwrap(self) -> Self::Output;
}

impl<T, E> AsdfUnwrap for Result<T, E>
where
    E: Into<AsdfError>,
{
    type Output = T;

    #[inline(always)]
    fn asdf_unwrap(self) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|err| asdf_panic!(err))
    }
}

/// A trait for expect-ing an [`AsdfResult`] or an [`Option`].
pub trait AsdfExpect {
    /// The type of the value being expected.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug (programmer error).
    fn asdf_expect(self, msg: &str) -> Self::Output;
}

impl<T, E> AsdfExpect for Result<T, E>
where
    E: Into<AsdfError>,
{
    type Output = T;

    #[inline(always)]
    fn asdf_expect(self, msg: &str) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|e| asdf_panic!(e.with_context(msg.to_string())))
    }
}

impl<T> AsdfExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn asdf_expect(self, msg: &str) -> Self::Output {
        self.unwrap_or_else(|| {
            let err = AsdfError::InvalidArgument(msg.to_string().into(), Backtrace::capture());
            asdf_panic!(err)
        })
    }
}

/// A convenient macro for creating an [`AsdfError`].
#[macro_export]
macro_rules! asdf_err {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::AsdfError::OutOfBounds($idx, $start, $stop, Backtrace::capture())
        )
    }};
    (Context: $msg:literal, $err:expr) => {{
        $crate::__private::must_use(
            $crate::AsdfError::Context($msg.into(), Box::new($err))
        )
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::AsdfError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
        )
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::asdf_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning an [`AsdfError`].
#[macro_export]
macro_rules! asdf_bail {
    ($($tt:tt)+) => {
        return Err($crate::asdf_err!($($tt)+))
    };
}

/// A convenient macro for panicking with an [`AsdfError`] in the presence of a programmer error
/// (e.g., an invariant has been violated).
#[macro_export]
macro_rules! asdf_panic {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        $crate::asdf_panic!($crate::asdf_err!(OutOfBounds: $idx, $start, $stop))
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::asdf_panic!($crate::asdf_err!($variant: $fmt, $($arg),*))
    };
    ($err:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let err: $crate::AsdfError = $err;
        panic!("{}", err.with_context(format!($fmt, $($arg),*)))
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::asdf_panic!($crate::asdf_err!($fmt, $($arg),*))
    };
    ($err:expr) => {{
        let err: $crate::AsdfError = $err;
        panic!("{}", err)
    }};
}

#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    #[inline]
    #[cold]
    #[must_use]
    pub const fn must_use(error: crate::AsdfError) -> crate::AsdfError {
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails() -> AsdfResult<()> {
        asdf_bail!(BlockConsistency: "block {} is out of range", 7)
    }

    #[test]
    fn bail_selects_variant() {
        let err = fails().unwrap_err();
        assert!(err.is_block_consistency());
        assert!(err.to_string().starts_with("block 7 is out of range"));
    }

    #[test]
    fn context_is_transparent_to_root() {
        let err = asdf_err!(Validation: "mismatched tags").with_context("while writing");
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("while writing: mismatched tags"));
    }

    #[test]
    fn default_variant_is_invalid_argument() {
        let err = asdf_err!("bad value {}", 3);
        assert!(matches!(err, AsdfError::InvalidArgument(..)));
    }

    #[test]
    #[should_panic]
    fn expect_on_none_panics() {
        let value: Option<u8> = None;
        value.asdf_expect("value must be present");
    }
}
