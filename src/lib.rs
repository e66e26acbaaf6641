pub mod api;
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::signal;

use anyhow::Context;
pub use config::Config;
use db::Store;
use futures::TryStreamExt;
use services::{Identity, export};
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "sourcerr")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "serve" | "daemon" | "-d" | "--daemon" => {
            config.validate()?;
            run_server(config, prometheus_handle).await
        }

        "generate" | "g" => {
            if args.len() < 3 {
                println!("Usage: sourcerr generate <hiring requirement>");
                println!("Example: sourcerr generate \"Python developers in Bangalore with AWS experience\"");
                return Ok(());
            }
            config.validate()?;
            let text = args[2..].join(" ");
            cmd_generate(&config, &text).await
        }

        "queries" | "ls" | "l" => cmd_list_queries(&config).await,

        "run" | "execute" | "x" => {
            if args.len() < 3 {
                println!("Usage: sourcerr run <query_id>");
                println!("Use 'sourcerr queries' to see IDs");
                return Ok(());
            }
            config.validate()?;
            cmd_execute(&config, &args[2]).await
        }

        "results" | "r" => {
            if args.len() < 3 {
                println!("Usage: sourcerr results <query_id>");
                return Ok(());
            }
            cmd_results(&config, &args[2]).await
        }

        "export" | "e" => {
            if args.len() < 3 {
                println!("Usage: sourcerr export <query_id> [output.csv]");
                return Ok(());
            }
            let output = args.get(3).map(String::as_str);
            cmd_export(&config, &args[2], output).await
        }

        "user" => {
            if args.len() < 4 || args[2] != "add" {
                println!("Usage: sourcerr user add <username> [--admin]");
                return Ok(());
            }
            let username = &args[3];
            let is_admin = args.get(4).map(String::as_str) == Some("--admin");
            cmd_user_add(&config, username, is_admin).await
        }

        "init" | "--init" => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Sourcerr - Candidate Sourcing Agent");
    println!("Turns hiring requirements into LinkedIn search queries and stores the results");
    println!();
    println!("USAGE:");
    println!("  sourcerr <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("  generate <text>   Translate a hiring requirement into a search query");
    println!("  queries, ls       List saved search queries");
    println!("  run <id>          Execute a saved query against the search provider");
    println!("  results <id>      Show stored results for a query");
    println!("  export <id> [file]");
    println!("                    Export a query's results as CSV (stdout by default)");
    println!("  user add <name> [--admin]");
    println!("                    Create an additional user");
    println!("  serve             Run the Web API");
    println!("  init              Create default config file");
    println!("  help              Show this help message");
    println!();
    println!("EXAMPLES:");
    println!("  sourcerr generate \"Rails developers in Hyderabad\"");
    println!("  sourcerr queries                  # Show saved queries");
    println!("  sourcerr run 1                    # Execute query with ID 1");
    println!("  sourcerr results 1                # Show stored candidates");
    println!("  sourcerr export 1 candidates.csv  # Export to CSV");
    println!("  sourcerr serve                    # Start the Web API");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml (or set OPENAI_API_KEY / GOOGLE_API_KEY / GOOGLE_CSE_ID /");
    println!("  SERPER_API_KEY in the environment) to configure collaborators.");
}

/// CLI commands act as the seeded admin user.
async fn cli_identity(store: &Store) -> anyhow::Result<Identity> {
    let user = store
        .get_user_by_username("admin")
        .await?
        .ok_or_else(|| anyhow::anyhow!("Default admin user missing; re-run migrations"))?;

    Ok(Identity {
        user_id: user.id,
        is_admin: user.is_admin,
    })
}

async fn cmd_generate(config: &Config, text: &str) -> anyhow::Result<()> {
    let shared = SharedState::new(config.clone()).await?;
    let identity = cli_identity(&shared.store).await?;

    println!("Generating query for: {}", text);

    let query = shared.search_service.generate(identity, text).await?;

    println!();
    println!("✓ Saved search query #{}", query.id);
    println!("  {}", query.generated_query);
    println!();
    println!("Run 'sourcerr run {}' to execute it.", query.id);

    Ok(())
}

async fn cmd_list_queries(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let queries = store.list_queries(0, 50).await?;

    if queries.is_empty() {
        println!("No search queries saved.");
        println!();
        println!("Create one with: sourcerr generate \"<hiring requirement>\"");
        return Ok(());
    }

    println!("Saved Search Queries ({} shown)", queries.len());
    println!("{:-<70}", "");

    for query in queries {
        let results = store.count_results_for_query(query.id).await.unwrap_or(0);
        let last_run = query.last_search_date.as_deref().unwrap_or("never");

        println!("[{}] {}", query.id, query.user_input);
        println!("    Query:    {}", query.generated_query);
        println!("    Results:  {} | Last run: {}", results, last_run);
        println!();
    }

    Ok(())
}

async fn cmd_execute(config: &Config, id_str: &str) -> anyhow::Result<()> {
    let id: i32 = match id_str.parse() {
        Ok(id) => id,
        Err(_) => {
            println!("Invalid query ID: {}", id_str);
            println!("Use 'sourcerr queries' to see query IDs.");
            return Ok(());
        }
    };

    let shared = SharedState::new(config.clone()).await?;
    let identity = cli_identity(&shared.store).await?;

    println!("Executing query #{}...", id);

    let summary = shared.search_service.execute(id, identity).await?;

    println!();
    println!("✓ Run complete");
    println!("  New results: {}", summary.results_count);
    println!("  Run started: {}", summary.search_timestamp);
    println!();
    println!("View them with: sourcerr results {}", id);

    Ok(())
}

async fn cmd_results(config: &Config, id_str: &str) -> anyhow::Result<()> {
    let id: i32 = match id_str.parse() {
        Ok(id) => id,
        Err(_) => {
            println!("Invalid query ID: {}", id_str);
            return Ok(());
        }
    };

    let store = Store::new(&config.general.database_path).await?;

    let Some(query) = store.get_query(id).await? else {
        println!("Search query {} not found.", id);
        return Ok(());
    };

    let (results, total) = store.results_page(id, 0, 20).await?;

    println!("Results for: {}", query.user_input);
    println!("{:-<70}", "");

    if results.is_empty() {
        println!("No results stored yet. Run 'sourcerr run {}' first.", id);
        return Ok(());
    }

    for result in &results {
        let enriched = if result.enriched_timestamp.is_some() {
            " [enriched]"
        } else {
            ""
        };
        println!("• {}{}", result.title, enriched);
        println!("  {}", result.link);
        if !result.snippet.is_empty() {
            println!("  {}", result.snippet);
        }
        println!();
    }

    if total > results.len() as u64 {
        println!("... and {} more", total - results.len() as u64);
    }
    println!("Total: {} results", total);

    Ok(())
}

async fn cmd_export(config: &Config, id_str: &str, output: Option<&str>) -> anyhow::Result<()> {
    use tokio::io::AsyncWriteExt;

    let id: i32 = match id_str.parse() {
        Ok(id) => id,
        Err(_) => {
            println!("Invalid query ID: {}", id_str);
            return Ok(());
        }
    };

    let store = Store::new(&config.general.database_path).await?;

    let Some(query) = store.get_query(id).await? else {
        println!("Search query {} not found.", id);
        return Ok(());
    };

    let mut stream = Box::pin(export::csv_stream(store, query));

    if let Some(path) = output {
        let mut file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("Failed to create {path}"))?;

        let mut rows = 0u64;
        while let Some(chunk) = stream.try_next().await? {
            rows += chunk.lines().count() as u64;
            file.write_all(chunk.as_bytes()).await?;
        }
        file.flush().await?;

        println!("✓ Exported {} lines to {}", rows, path);
    } else {
        while let Some(chunk) = stream.try_next().await? {
            print!("{chunk}");
        }
    }

    Ok(())
}

async fn cmd_user_add(config: &Config, username: &str, is_admin: bool) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    if store.get_user_by_username(username).await?.is_some() {
        println!("User '{}' already exists.", username);
        return Ok(());
    }

    println!("Enter password for '{}':", username);
    let mut password = String::new();
    std::io::stdin().read_line(&mut password)?;
    let password = password.trim();

    if password.len() < 8 {
        println!("Password must be at least 8 characters.");
        return Ok(());
    }

    let user = store
        .create_user(username, password, is_admin, Some(&config.security))
        .await?;

    println!();
    println!("✓ Created user '{}'{}", user.username, if is_admin { " (admin)" } else { "" });
    println!("  API key: {}", user.api_key);

    Ok(())
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("Sourcerr v{} starting...", env!("CARGO_PKG_VERSION"));

    let shared = Arc::new(SharedState::new(config.clone()).await?);
    let state = api::create_app_state(shared, prometheus_handle);

    let app = api::router(state).await;
    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let server_handle = tokio::spawn(async move {
        info!("🌐 Web API running at http://{}", addr);
        if let Err(e) = axum::serve(listener, app).await {
            error!("Web server error: {}", e);
        }
    });

    info!("Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    server_handle.abort();
    info!("Server stopped");

    Ok(())
}
