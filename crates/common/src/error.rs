//! Error plumbing shared by the store crates.
//!
//! Each crate keeps its own `Error` enum with typed variants for the cases
//! callers branch on, plus a catch-all message variant for store corruption
//! and similar should-not-happen paths. [`impl_context!`] gives those crates
//! `.context()` / `.with_context()` without pulling `anyhow` into library
//! code.

/// Built by crate-local error enums from a plain message, usually into their
/// catch-all variant.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait with `.context()` and
/// `.with_context()` on `Result` and `Option`.
///
/// Invoke at the bottom of an error module that defines `Error: FromMessage`
/// and `type Result<T> = std::result::Result<T, Error>`:
///
/// ```ignore
/// attendo_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.with_context(|| context.into())
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    <Error as $crate::FromMessage>::from_message(format!(
                        "{}: {source}",
                        f().into()
                    ))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(context.into()))
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::FromMessage;

    #[derive(Debug, PartialEq)]
    pub struct Error(String);

    impl FromMessage for Error {
        fn from_message(message: String) -> Self {
            Self(message)
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;

    crate::impl_context!();

    #[test]
    fn result_context_prefixes_the_source() {
        let r: std::result::Result<(), &str> = Err("disk full");
        let wrapped = r.context("writing snapshot").unwrap_err();
        assert_eq!(wrapped, Error("writing snapshot: disk full".into()));
    }

    #[test]
    fn option_context_is_the_whole_message() {
        let missing: Option<u32> = None;
        let err = missing
            .with_context(|| format!("row {} vanished", 7))
            .unwrap_err();
        assert_eq!(err, Error("row 7 vanished".into()));
    }

    #[test]
    fn ok_values_pass_through() {
        let r: std::result::Result<u32, &str> = Ok(5);
        assert_eq!(r.context("unused").unwrap(), 5);
        assert_eq!(Some(5).context("unused").unwrap(), 5);
    }
}
