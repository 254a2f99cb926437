pub mod docker;
pub mod git;
pub mod process;
pub mod telegram;

pub use docker::DockerCli;
pub use git::GitRepo;
pub use process::{CommandLine, CommandOutput, CommandRunner, ShellRunner};
pub use telegram::TelegramNotifier;
