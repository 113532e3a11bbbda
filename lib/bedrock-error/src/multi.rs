use std::{error::Error as StdError, fmt};

use crate::GenericError;

/// A collection of independent errors reported together.
///
/// `MultiError` is used when two failures must both reach the caller, such as a runtime failing and a post-run hook
/// failing afterwards. Every member stays individually inspectable, either directly via [`iter`][Self::iter] or with
/// [`chain_contains`][crate::chain_contains].
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<GenericError>,
}

impl MultiError {
    /// Creates an empty `MultiError`.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Adds an error.
    ///
    /// When `error` is itself a `MultiError`, its members are added individually instead of nesting it.
    pub fn push(&mut self, error: GenericError) {
        match error.downcast::<MultiError>() {
            Ok(multi) => self.errors.extend(multi.errors),
            Err(error) => self.errors.push(error),
        }
    }

    /// Returns the number of errors collected.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if no errors were collected.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns an iterator over the collected errors, in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &GenericError> {
        self.errors.iter()
    }

    /// Converts the collection into a result.
    ///
    /// No errors yields `Ok(())`, a single error is returned as-is, and two or more errors are returned as a
    /// `MultiError`.
    pub fn into_result(mut self) -> Result<(), GenericError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(GenericError::from(self)),
        }
    }
}

impl From<Vec<GenericError>> for MultiError {
    fn from(errors: Vec<GenericError>) -> Self {
        let mut multi = MultiError::new();
        for error in errors {
            multi.push(error);
        }
        multi
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            write!(f, " [{}] {:#}", i + 1, error)?;
            if i + 1 < self.errors.len() {
                write!(f, ";")?;
            }
        }
        Ok(())
    }
}

impl StdError for MultiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.errors.first().map(|error| {
            let source: &(dyn StdError + 'static) = error.as_ref();
            source
        })
    }
}
