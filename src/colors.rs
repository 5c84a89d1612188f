use once_cell::sync::Lazy;
use std::io::IsTerminal;

pub const C_RESET: &str = "\x1b[0m";
pub const C_DIM: &str = "\x1b[2m";
pub const C_RED: &str = "\x1b[31m";
pub const C_GREEN: &str = "\x1b[32m";
pub const C_YELLOW: &str = "\x1b[33m";
pub const C_CYAN: &str = "\x1b[36m";
pub const C_GRAY: &str = "\x1b[90m";

static ENABLED: Lazy<bool> =
    Lazy::new(|| std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal());

/// Wrap `text` in `color` when stderr is a terminal and `NO_COLOR` is unset.
pub fn paint(color: &str, text: &str) -> String {
    if *ENABLED {
        format!("{color}{text}{C_RESET}")
    } else {
        text.to_string()
    }
}
