use clap::Parser;
use decumulate::api::{Cli, Command, run_command, run_http_server};

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map(|()| None)
            .map_err(|e| format!("Server error: {e}")),
        command => run_command(command).map(Some),
    };

    match outcome {
        Ok(Some(json)) => println!("{json}"),
        Ok(None) => {}
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
