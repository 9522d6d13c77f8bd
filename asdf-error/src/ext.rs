use crate::{AsdfResult, ErrString};

/// Extension trait for [`AsdfResult`].
pub trait ResultExt<T>: private::Sealed {
    /// Wrap the error, if any, with a message describing what was being attempted.
    fn context<M: Into<ErrString>>(self, msg: M) -> AsdfResult<T>;

    /// Wrap the error, if any, with a lazily computed message.
    fn with_context<M: Into<ErrString>, F: FnOnce() -> M>(self, f: F) -> AsdfResult<T>;
}

mod private {
    use crate::AsdfResult;

    pub trait Sealed {}

    impl<T> Sealed for AsdfResult<T> {}
}

impl<T> ResultExt<T> for AsdfResult<T> {
    fn context<M: Into<ErrString>>(self, msg: M) -> AsdfResult<T> {
        self.map_err(|e| e.with_context(msg))
    }

    fn with_context<M: Into<ErrString>, F: FnOnce() -> M>(self, f: F) -> AsdfResult<T> {
        self.map_err(|e| e.with_context(f()))
    }
}
