//! relaymq-cli – publish to or subscribe on a running broker.
//
//  $ relaymq-cli publish 127.0.0.1:3000 hello world
//  $ relaymq-cli subscribe 127.0.0.1:3001
use clap::{Parser, Subcommand};
use relaymq::Client;

#[derive(Debug, Parser)]
#[command(name = "relaymq-cli", version, about = "relaymq publisher / consumer")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one message to the publisher port.
    Publish {
        /// Broker publisher address (host:port)
        addr: String,
        /// Message words, joined with spaces
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// Print every message delivered on the consumer port.
    Subscribe {
        /// Broker consumer address (host:port)
        addr: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.cmd {
        Command::Publish { addr, message } => {
            let client = Client::new(&addr, "");
            client.send_message(message.join(" ")).await?;
        }
        Command::Subscribe { addr } => {
            let mut client = Client::new(&addr, "");
            client.subscribe(|msg| println!("{msg}")).await?;
            println!("Subscribed to {addr}. Ctrl+C to quit.");
            tokio::signal::ctrl_c().await?;
            client.stop();
        }
    }
    Ok(())
}
