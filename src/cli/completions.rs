//! Shell completions for infra
//!
//! Provides shell completion scripts for bash, zsh, fish, powershell, and elvish.

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io;

use crate::cli::Cli;

/// Generate shell completions and write to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "infra", &mut io::stdout());
}

/// Get completions as a string
pub fn get_completions(shell: Shell) -> String {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, "infra", &mut buf);
    String::from_utf8(buf).unwrap_or_default()
}

/// Print installation instructions for completions
pub fn print_installation_instructions(shell: Shell) {
    match shell {
        Shell::Bash => {
            println!("# Add to ~/.bashrc:");
            println!("eval \"$(infra completions bash)\"");
            println!();
            println!("# Or save to a file:");
            println!("infra completions bash > ~/.local/share/bash-completion/completions/infra");
        }
        Shell::Zsh => {
            println!("# Save into a directory on your fpath:");
            println!("mkdir -p ~/.zsh/completions");
            println!("infra completions zsh > ~/.zsh/completions/_infra");
        }
        Shell::Fish => {
            println!("infra completions fish > ~/.config/fish/completions/infra.fish");
        }
        Shell::PowerShell => {
            println!("# Add to your PowerShell profile:");
            println!("Invoke-Expression (& infra completions powershell | Out-String)");
        }
        Shell::Elvish => {
            println!("# Add to ~/.elvish/rc.elv:");
            println!("eval (infra completions elvish | slurp)");
        }
        _ => {
            println!("# Refer to your shell's documentation for completion installation.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_completions() {
        let completions = get_completions(Shell::Bash);
        assert!(completions.contains("infra"));
        assert!(completions.contains("complete"));
    }

    #[test]
    fn test_zsh_completions_list_groups() {
        let completions = get_completions(Shell::Zsh);
        assert!(completions.contains("_infra"));
        assert!(completions.contains("cfn"));
    }
}
