use camino::Utf8PathBuf;
use std::time::Duration;

// ----------------------------------------------------------------------------
// Declarations
// ----------------------------------------------------------------------------
pub trait SlashFix {
    fn slash_fix(self) -> Self;
}

// ----------------------------------------------------------------------------
// Implementations
// ----------------------------------------------------------------------------
impl SlashFix for Utf8PathBuf {
    fn slash_fix(self) -> Self {
        self.into_string().slash_fix().into()
    }
}

impl SlashFix for String {
    fn slash_fix(self) -> Self {
        if self.contains('\\') {
            self.replace('\\', "/")
        } else {
            self
        }
    }
}

/// Human readable duration for CLI output: `850ms`, `2.3s`, `1m 5s`.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        let secs = d.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
