use clap::Parser;
use projection::cli::{Cli, run_cli};
use projection::logging::init_tracing;

fn main() {
    let cli = Cli::parse();
    init_tracing("info");

    match run_cli(cli) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
