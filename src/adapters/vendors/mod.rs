//! Agent vendor adapters.

pub mod claude_code;
pub mod registry;
pub mod shell;

pub use claude_code::{ClaudeCodeVendor, ClaudeStreamParser};
pub use registry::VendorRegistry;
pub use shell::{LineParser, ShellVendor};
