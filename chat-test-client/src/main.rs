use anyhow::Result;
use clap::Parser;
use colored::*;

mod output;
mod scenarios;
mod ws_client;

use output::print_test_summary;
use ws_client::Connection;

#[derive(Parser)]
#[command(name = "chat-test-client")]
#[command(about = "Chat Relay Integration Testing Tool")]
struct Cli {
    /// Base WebSocket URL of the relay (e.g., ws://localhost:4000)
    #[arg(long, default_value = "ws://127.0.0.1:4000")]
    base_url: String,

    /// Display name for user 1
    #[arg(long, default_value = "alice")]
    user1: String,

    /// Display name for user 2
    #[arg(long, default_value = "bob")]
    user2: String,

    /// Test scenario to run
    #[arg(long, value_enum, default_value = "all")]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, PartialEq)]
enum ScenarioChoice {
    /// Connect both users and register their names
    ConnectionTest,
    /// Broadcast a public message
    PublicMessage,
    /// Send a private message from user 1 to user 2
    PrivateMessage,
    /// Send an unparsable body and expect an error reply
    MalformedMessage,
    /// Disconnect user 1 and check the departure broadcast
    Disconnect,
    /// Run every scenario in order
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    println!("\n{} Establishing WebSocket connections...", "→".blue());
    let mut conn1 = Connection::establish(&cli.base_url, format!("User 1 ({})", cli.user1)).await?;
    let mut conn2 = Connection::establish(&cli.base_url, format!("User 2 ({})", cli.user2)).await?;
    println!("{} User 1 connection established", "✓".green());
    println!("{} User 2 connection established", "✓".green());

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    // Every scenario needs both users registered first
    let mut results =
        vec![scenarios::test_join(&mut conn1, &cli.user1, &mut conn2, &cli.user2).await?];

    let run = |choice: ScenarioChoice| cli.scenario == choice || cli.scenario == ScenarioChoice::All;

    if run(ScenarioChoice::PublicMessage) {
        results.push(scenarios::test_public_message(&mut conn1, &cli.user1, &mut conn2).await?);
    }
    if run(ScenarioChoice::PrivateMessage) {
        results.push(
            scenarios::test_private_message(&mut conn1, &cli.user1, &mut conn2, &cli.user2)
                .await?,
        );
    }
    if run(ScenarioChoice::MalformedMessage) {
        results.push(scenarios::test_malformed_message(&mut conn1).await?);
    }
    if run(ScenarioChoice::Disconnect) {
        results.push(scenarios::test_disconnect(conn1, &cli.user1, &mut conn2).await?);
    }

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
