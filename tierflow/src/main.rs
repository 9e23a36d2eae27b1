//! tierflow CLI entry point.
//!
//! Loads `.env`, initializes logging and delegates to the CLI module.

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = tierflow::cli::parse_cli();
    tierflow::cli::init_tracing(&cli);

    tierflow::cli::run_with_cli(cli).await
}
