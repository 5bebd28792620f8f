use arxiv_harvester::orchestrator::App;
use arxiv_harvester::utils::logging;
use arxiv_harvester::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env();
    let app = App::initialize(config).await?;
    app.run().await?;

    Ok(())
}
