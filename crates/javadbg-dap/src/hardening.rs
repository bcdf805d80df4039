use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use javadbg_config::DebugConfig;

static PANIC_HOOK: Once = Once::new();
static INCLUDE_BACKTRACE: AtomicBool = AtomicBool::new(false);

/// Initialize structured logging and install a global panic hook for the
/// adapter process.
///
/// Request handlers are still isolated with `catch_unwind`; the hook only
/// makes sure every panic ends up in the log.
pub fn init(config: &DebugConfig) {
    javadbg_config::init_tracing(&config.logging);
    install_panic_hook(config.logging.include_backtrace);
}

/// Logs panics through `tracing` (target `javadbg.panic`) and then runs the
/// previously installed hook. Later calls only update `include_backtrace`.
pub fn install_panic_hook(include_backtrace: bool) {
    INCLUDE_BACKTRACE.store(include_backtrace, Ordering::Relaxed);
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let message = panic_payload_message(info.payload());
            let location = info
                .location()
                .map(|location| location.to_string())
                .unwrap_or_else(|| "<unknown>".to_string());

            if INCLUDE_BACKTRACE.load(Ordering::Relaxed) {
                let backtrace = std::backtrace::Backtrace::force_capture();
                tracing::error!(
                    target: "javadbg.panic",
                    message = %message,
                    location = %location,
                    backtrace = %backtrace,
                    "panic captured"
                );
            } else {
                tracing::error!(
                    target: "javadbg.panic",
                    message = %message,
                    location = %location,
                    "panic captured"
                );
            }

            // Release builds only report through the log.
            if cfg!(debug_assertions) {
                previous(info);
            }
        }));
    });
}

pub fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic payload (non-string)".to_owned()
    }
}
