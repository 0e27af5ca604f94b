//! Record producers
//!
//! A producer is invoked only when a build runs, at most once per build.
//! Any `Fn() -> Result<impl IntoIterator<Item = Result<R, ProducerError>>, ProducerError>`
//! closure is a producer.

use crate::errors::ProducerError;

/// Lazily produced records, in emission order
pub type Produced<'a, R> = Box<dyn Iterator<Item = Result<R, ProducerError>> + 'a>;

/// Source of the records a store materializes
pub trait Producer<R>: Send + Sync {
    /// Starts a fresh pass over the source.
    fn produce(&self) -> Result<Produced<'_, R>, ProducerError>;
}

impl<R, F, I> Producer<R> for F
where
    F: Fn() -> Result<I, ProducerError> + Send + Sync,
    I: IntoIterator<Item = Result<R, ProducerError>>,
    I::IntoIter: 'static,
    R: 'static,
{
    fn produce(&self) -> Result<Produced<'_, R>, ProducerError> {
        let records = self()?;
        Ok(Box::new(records.into_iter()))
    }
}

impl<R> Producer<R> for Box<dyn Producer<R>> {
    fn produce(&self) -> Result<Produced<'_, R>, ProducerError> {
        (**self).produce()
    }
}
