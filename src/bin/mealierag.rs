use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mealierag::embedder;
use mealierag::{
    telemetry, terminal, web, Assistant, Ingestor, MealieClient, QdrantIndex, RagError,
    RecipeSource, Settings,
};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "mealierag",
    version,
    about = "Ask questions about your Mealie recipes through a local RAG pipeline"
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print recipes from Mealie as JSON lines
    Fetch {
        /// Only fetch the recipe with this slug or id
        #[arg(long)]
        slug: Option<String>,
    },
    /// Embed every recipe into the vector store
    Ingest,
    /// Chat with your recipes in the terminal
    QaCli,
    /// Serve the browser chat UI
    QaUi,
}

#[derive(Serialize)]
struct NotFoundBody<'a> {
    error: &'static str,
    slug: &'a str,
    message: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    telemetry::init(&cli.settings);
    info!(settings = ?cli.settings, command = ?cli.command, "starting mealierag");
    let settings = &cli.settings;
    match &cli.command {
        Command::Fetch { slug } => fetch(settings, slug.as_deref()).await,
        Command::Ingest => ingest(settings).await,
        Command::QaCli => qa_cli(settings).await,
        Command::QaUi => qa_ui(settings).await,
    }
}

async fn fetch(settings: &Settings, slug: Option<&str>) -> Result<ExitCode> {
    let client = MealieClient::from_settings(settings)?;
    let Some(slug) = slug else {
        let recipes = client
            .fetch_all()
            .await
            .context("failed to fetch recipes from Mealie")?;
        for recipe in &recipes {
            println!("{}", serde_json::to_string(recipe)?);
        }
        info!(count = recipes.len(), "fetched recipes");
        return Ok(ExitCode::SUCCESS);
    };
    match client.fetch_recipe(slug).await {
        Ok(recipe) => {
            println!("{}", serde_json::to_string_pretty(&recipe)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err @ RagError::NotFound(_)) => {
            let body = NotFoundBody {
                error: "not_found",
                slug,
                message: err.to_string(),
            };
            println!("{}", serde_json::to_string(&body)?);
            Ok(ExitCode::from(2))
        }
        Err(err) => Err(err).context("failed to fetch recipe from Mealie"),
    }
}

async fn ingest(settings: &Settings) -> Result<ExitCode> {
    let source = Arc::new(MealieClient::from_settings(settings)?);
    let embedder = embedder::from_settings(settings)?;
    let index = Arc::new(QdrantIndex::from_settings(settings)?);
    let report = Ingestor::new(
        source,
        embedder,
        index,
        settings.vectordb_collection_name.clone(),
        settings.delete_collection_if_exists,
    )
    .run()
    .await
    .context("ingestion failed")?;
    info!(
        indexed = report.indexed,
        dimension = report.dimension,
        recreated = report.recreated,
        "ingestion complete"
    );
    Ok(ExitCode::SUCCESS)
}

async fn ready_assistant(settings: &Settings) -> Result<Assistant> {
    let assistant = Assistant::from_settings(settings)?;
    assistant
        .ensure_ready()
        .await
        .context("recipe collection is not ready")?;
    Ok(assistant)
}

async fn qa_cli(settings: &Settings) -> Result<ExitCode> {
    let assistant = ready_assistant(settings).await?;
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();
    tokio::select! {
        result = terminal::run(&assistant, input, &mut out) => {
            result.context("terminal session failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nGoodbye!");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn qa_ui(settings: &Settings) -> Result<ExitCode> {
    let assistant = ready_assistant(settings).await?;
    let recipes: Arc<dyn RecipeSource> = Arc::new(MealieClient::from_settings(settings)?);
    let app = web::router(web::WebState::from_settings(settings, assistant, recipes));

    let bind = settings.ui_addr();
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("MealieChef listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server shutdown")?;
    Ok(ExitCode::SUCCESS)
}
