use std::path::PathBuf;
use std::process;

use rlox as lox;

use clap::Parser as ClapParser;

use lox::runner;

#[derive(ClapParser, Debug)]
#[command(version, about = "A tree-walking interpreter for the Lox language", long_about = None)]
pub struct Cli {
    /// Path to a Lox script. Starts an interactive prompt when omitted.
    script: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Cli = Cli::parse();

    match args.script.as_slice() {
        [] => runner::run_prompt()?,

        [path] => {
            let code: i32 = runner::run_file(path)?;

            if code != 0 {
                process::exit(code);
            }
        }

        _ => {
            println!("Usage: lox [script]");
            process::exit(64);
        }
    }

    Ok(())
}
