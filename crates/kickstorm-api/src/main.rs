use kickstorm_api::setup;
use kickstorm_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    kickstorm_api::init_tracing();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (workspace store, remote client, routes)
    let (_state, router) = setup::initialize_app(config.clone()).await?;

    // Start the server
    setup::server::start_server(&config, router).await?;

    Ok(())
}
