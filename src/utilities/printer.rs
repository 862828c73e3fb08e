//! Console printer with ANSI color support.
//!
//! Everything meant for the operator (job banners, per-item progress,
//! optimization results, the run-all summary) goes through here. Diagnostics
//! go through `log` instead.

use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

/// Available colors for printed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterColor {
    Red,
    Green,
    BoldRed,
    BoldGreen,
    BoldCyan,
    BoldWhite,
}

impl PrinterColor {
    /// ANSI escape code for this color.
    fn ansi_code(&self) -> &'static str {
        match self {
            Self::Red => "\x1b[31m",
            Self::Green => "\x1b[32m",
            Self::BoldRed => "\x1b[1;31m",
            Self::BoldGreen => "\x1b[1;32m",
            Self::BoldCyan => "\x1b[1;36m",
            Self::BoldWhite => "\x1b[1;37m",
        }
    }
}

/// ANSI reset code.
const RESET: &str = "\x1b[0m";

/// Width of the `=` rule printed around banners.
pub const BANNER_WIDTH: usize = 60;

/// Build a horizontal `=` rule of [`BANNER_WIDTH`] characters.
pub fn rule() -> String {
    "=".repeat(BANNER_WIDTH)
}

/// Printer for console output.
///
/// Colors are only emitted when stdout is a terminal and `NO_COLOR` is unset.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    colored: bool,
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

impl Printer {
    /// Create a printer that colors output when attached to a terminal.
    pub fn new() -> Self {
        let colored = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self { colored }
    }

    /// Create a printer that never emits escape codes.
    pub fn plain() -> Self {
        Self { colored: false }
    }

    /// Whether this printer emits ANSI escape codes.
    pub fn is_colored(&self) -> bool {
        self.colored
    }

    /// Apply `color` to `content` (no-op for plain printers).
    pub fn paint(&self, content: &str, color: PrinterColor) -> String {
        if self.colored {
            format!("{}{}{}", color.ansi_code(), content, RESET)
        } else {
            content.to_string()
        }
    }

    /// Print an uncolored message.
    pub fn println(&self, content: &str) {
        println!("{}", content);
    }

    /// A title framed by `=` rules, preceded by a blank line.
    pub fn render_banner(&self, title: &str, color: PrinterColor) -> String {
        let rule = self.paint(&rule(), color);
        format!("\n{}\n{}\n{}", rule, self.paint(title, color), rule)
    }
}
