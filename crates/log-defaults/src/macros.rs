//! Convenience macros

/// Push properties onto the [`LogContext`](crate::LogContext) until the
/// returned guard drops
///
/// ```rust
/// let _guard = log_defaults::log_context!(RequestPath = "/orders", Attempt = 2);
/// let current = log_defaults::LogContext::current();
/// assert_eq!(current.properties()["RequestPath"], "/orders");
/// ```
#[macro_export]
macro_rules! log_context {
    ($($key:ident = $value:expr),* $(,)?) => {{
        $crate::LogContext::new()
            $(.with_property(stringify!($key), $value))*
            .push()
    }};
}

#[cfg(test)]
mod tests {
    use crate::LogContext;
    use serde_json::json;

    #[test]
    fn test_log_context_macro_pushes_and_restores() {
        {
            let _guard = log_context!(RequestPath = "/orders", Attempt = 2);
            let current = LogContext::current();
            assert_eq!(current.properties().get("RequestPath"), Some(&json!("/orders")));
            assert_eq!(current.properties().get("Attempt"), Some(&json!(2)));
        }
        assert!(LogContext::current().properties().is_empty());
    }
}
