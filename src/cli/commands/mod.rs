//! One module per subcommand. Each exposes an `Args` struct and
//! `execute(args, json_mode)`.

pub mod init;
pub mod logs;
pub mod results;
pub mod resume;
pub mod run;
pub mod sandbox_exec;
pub mod status;
