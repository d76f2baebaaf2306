use std::any::Any;
use std::error::Error;
use std::fmt;

/// Error emitted when a user-supplied predicate or key selector panics while
/// an operator evaluates it.
///
/// Operators such as [`filter`], [`distinct_key`] and [`take_while`] call
/// user closures for every value that flows through them. A panic inside one
/// of those closures is caught at the call site, wrapped into a
/// `CallbackError` and delivered to the downstream error channel exactly
/// once; the upstream subscription is cancelled at the same time. The fault
/// never unwinds past the operator boundary.
///
/// [`filter`]: crate::ObservableExt::filter
/// [`distinct_key`]: crate::ObservableExt::distinct_key
/// [`take_while`]: crate::ObservableExt::take_while
#[derive(Debug)]
pub struct CallbackError {
    operator: &'static str,
    detail: String,
}

impl CallbackError {
    /// Builds a `CallbackError` from the payload returned by `catch_unwind`.
    ///
    /// String payloads, the common case for `panic!("...")`, are preserved
    /// verbatim; anything else is reported as an opaque panic.
    pub fn from_panic(operator: &'static str, payload: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        CallbackError { operator, detail }
    }

    /// Name of the operator method whose callback panicked, e.g. `"filter"`.
    #[must_use]
    pub fn operator(&self) -> &'static str {
        self.operator
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "callback passed to `{}` panicked: {}",
            self.operator, self.detail
        )
    }
}

impl Error for CallbackError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_error_preserves_str_payload() {
        let e = CallbackError::from_panic("filter", Box::new("boom"));
        assert_eq!(e.operator(), "filter");
        assert_eq!(e.to_string(), "callback passed to `filter` panicked: boom");
    }

    #[test]
    fn callback_error_preserves_string_payload() {
        let e = CallbackError::from_panic("take_while", Box::new(String::from("bad value 3")));
        assert_eq!(
            e.to_string(),
            "callback passed to `take_while` panicked: bad value 3"
        );
    }

    #[test]
    fn callback_error_handles_opaque_payload() {
        let e = CallbackError::from_panic("distinct_key", Box::new(7_i32));
        assert_eq!(
            e.to_string(),
            "callback passed to `distinct_key` panicked: non-string panic payload"
        );
    }
}
