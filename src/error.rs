use std::fmt::Debug;

/// Turns a fallible metric read into an `Option`, tracing the outcome.
///
/// Successful values are logged at `trace`, failures at `debug`, both labelled with `what`.
pub trait ResultTraceExt<T, E> {
    fn traced(self, what: &str) -> Option<T>;
}

impl<T, E> ResultTraceExt<T, E> for std::result::Result<T, E>
where
    T: Debug,
    E: std::error::Error,
{
    fn traced(self, what: &str) -> Option<T> {
        match self {
            Ok(value) => {
                log::trace!(target: "cgroup", "{what} is: {value:?}");
                Some(value)
            }
            Err(err) => {
                log::debug!(target: "cgroup", "{what} failed: {err}");
                None
            }
        }
    }
}
