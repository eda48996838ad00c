//! Environment detection utilities.

use std::io::IsTerminal;

#[must_use]
pub fn stdout_is_tty() -> bool {
    std::io::stdout().is_terminal()
}

#[must_use]
pub fn stdin_is_tty() -> bool {
    std::io::stdin().is_terminal()
}

/// Check if color should be enabled.
///
/// `no_color` is the resolved setting (flag, `QUOTABAR_NO_COLOR` or `NO_COLOR`).
#[must_use]
pub fn should_use_color(no_color: bool) -> bool {
    if no_color {
        return false;
    }
    if std::env::var("TERM").is_ok_and(|t| t == "dumb") {
        return false;
    }
    stdout_is_tty()
}
