mod client;
mod repl;

use anyhow::Result;
use clap::Parser;
use console::style;

use client::AgentClient;
use repl::Session;

#[derive(Parser)]
#[command(author, version, about = "Chat with the Rustun management agent", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, default_value = "http://localhost:8080")]
    api: String,

    /// Send a single message and exit
    #[arg(long)]
    msg: Option<String>,

    /// Print the reply as it is generated
    #[arg(long)]
    stream: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = AgentClient::new(&cli.api)?;

    if let Err(err) = client.health().await {
        println!(
            "{} Cannot connect to server at {}",
            style("Warning:").yellow().bold(),
            client.base_url()
        );
        println!("   Error: {err}");
        println!("   Make sure rustun-agentd is running.");
        return Ok(());
    }

    println!("{}", style("Rustun AI Agent CLI").bold());
    println!("{}", style("━".repeat(42)).dim());
    println!("Connected to: {}", client.base_url());
    println!();

    let mut session = Session::new(client, cli.stream);
    match cli.msg {
        Some(message) => {
            if let Err(err) = session.send(&message).await {
                println!("{} {err}", style("Error:").red().bold());
            }
            Ok(())
        }
        None => session.run().await,
    }
}
