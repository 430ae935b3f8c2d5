// docrecon CLI - configuration-driven document reconciliation

mod args;
mod exit_codes;
mod run;

use std::process::ExitCode;

use exit_codes::EXIT_SUCCESS;

fn main() -> ExitCode {
    let result = run::cmd_run(std::env::args_os().collect());

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}
