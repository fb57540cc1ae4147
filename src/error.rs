//! Location-tagged error macros.
//!
//! Every error raised inside the crate is an [`anyhow::Error`] whose message is
//! prefixed with `[file:function - line]`, so that a failure in a deeply nested
//! tree operation or disk scan can be traced without a backtrace.

#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .unwrap_or("<unknown>")
    }};
}

#[macro_export]
macro_rules! bail_loc {
    ($msg:expr) => {
        anyhow::bail!("[{}:{} - {}] {}", file!(), $crate::function_name!(), line!(), $msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        anyhow::bail!("[{}:{} - {}] {}", file!(), $crate::function_name!(), line!(), format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! anyhow_loc {
    ($msg:expr) => {
        anyhow::anyhow!("[{}:{} - {}] {}", file!(), $crate::function_name!(), line!(), $msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        anyhow::anyhow!("[{}:{} - {}] {}", file!(), $crate::function_name!(), line!(), format!($fmt, $($arg)*))
    };
}

/// Like `anyhow::ensure!`, with the location prefix.
#[macro_export]
macro_rules! ensure_loc {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            $crate::bail_loc!($msg);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::bail_loc!($fmt, $($arg)*);
        }
    };
}
