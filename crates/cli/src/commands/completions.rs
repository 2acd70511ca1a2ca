//! completions command - Generate shell completion scripts

use clap::{Args, CommandFactory};
use clap_complete::Shell;

use crate::Cli;
use crate::exit_code::ExitCode;

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script for `args.shell` to stdout
pub fn execute(args: CompletionsArgs) -> ExitCode {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(args.shell, &mut command, name, &mut std::io::stdout());
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_bash_script() {
        let mut command = Cli::command();
        let mut buf = Vec::new();
        clap_complete::generate(Shell::Bash, &mut command, "bulkup", &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("bulkup"));
        assert!(script.contains("upload-dir"));
    }
}
