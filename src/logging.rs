//! Helper macro enforcing consistent per-message log fields.
//!
//! Keeps `message_id` (and optionally `pmode`) present on every log emitted
//! from the pipeline and reliability layers so downstream parsing can rely
//! on them.

/// Log an event for a message/pmode pair plus any extra fields.
#[macro_export]
macro_rules! msh_event {
    ($level:ident, $target:expr, $event:expr, message_id = $message_id:expr, pmode = $pmode:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            target = $target,
            event = $event,
            message_id = $message_id,
            pmode = $pmode,
            $($field = %$value,)*
        )
    };
    ($level:ident, $target:expr, $event:expr, message_id = $message_id:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            target = $target,
            event = $event,
            message_id = $message_id,
            $($field = %$value,)*
        )
    };
}
