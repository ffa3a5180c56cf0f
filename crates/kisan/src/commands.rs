//! Kisan command implementations

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kisan_agent::tools::capability_from_config;
use kisan_agent::{Catalogue, Router, TaskContext, ADVISORS};
use kisan_config::{self, Config};
use kisan_provider::OpenRouterProvider;
use kisan_session::SessionManager;

/// Farmer facts given on the command line
pub struct FarmerArgs {
    pub crop: String,
    pub location: Option<String>,
    pub facts: Vec<(String, String)>,
}

impl FarmerArgs {
    fn into_context(self) -> TaskContext {
        let mut ctx = TaskContext::new().with_fact("CROP_DETAILS", self.crop);
        if let Some(location) = self.location {
            ctx = ctx.with_fact("LOCATION", location);
        }
        self.facts
            .into_iter()
            .fold(ctx, |ctx, (k, v)| ctx.with_fact(k, v))
    }
}

/// Parse `KEY=VALUE`; keys are upper-cased to match state field names
pub fn parse_fact(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }
    Ok((key.to_uppercase(), value.trim().to_string()))
}

async fn load_config() -> Result<Config> {
    let mut config = Config::load()
        .await
        .context("Failed to load ~/.kisan/config.json")?;
    config.apply_env_overrides();
    Ok(config)
}

fn build_catalogue(config: Config) -> Result<Catalogue> {
    let api_key = config
        .api_key()
        .context("No API key configured. Set provider.api_key in ~/.kisan/config.json or KISAN_API_KEY")?;

    let provider = OpenRouterProvider::new(api_key, config.api_base(), Some(config.default_model()))
        .with_timeout(config.request_timeout())
        .context("Failed to build HTTP client")?;
    let search = capability_from_config(&config).context("Failed to build search backend")?;

    Ok(Catalogue::new(config, Arc::new(provider), search))
}

/// Initialize config and data directories
pub async fn init_command() -> Result<()> {
    println!("Initializing Kisan...");

    let config = kisan_config::init().await?;

    println!("\nConfig:   {}", kisan_config::config_path().display());
    println!("Sessions: {}", kisan_config::sessions_dir().display());
    println!("Model:    {}", config.default_model());
    println!("\nNext steps:");
    println!("  1. Add your API key to ~/.kisan/config.json (or set KISAN_API_KEY)");
    println!("     Get one at: https://openrouter.ai/keys");
    println!("  2. Ask for advice: kisan advise --crop wheat --location Karnal");

    Ok(())
}

/// Show configuration status
pub async fn status_command() -> Result<()> {
    let config_path = kisan_config::config_path();
    let sessions = kisan_config::sessions_dir();

    println!("Kisan Status");
    println!(
        "Config:   {} {}",
        config_path.display(),
        if config_path.exists() { "[OK]" } else { "[Missing]" }
    );
    println!(
        "Sessions: {} {}",
        sessions.display(),
        if sessions.exists() { "[OK]" } else { "[Missing]" }
    );

    let config = load_config().await?;
    println!("Model:    {}", config.default_model());
    println!(
        "API Key:  {}",
        if config.has_api_key() { "[Set]" } else { "[Missing]" }
    );
    println!(
        "Search:   {}",
        serde_json::to_value(config.search.backend)?
            .as_str()
            .unwrap_or("mock")
    );
    println!("Branch timeout: {}s", config.branch_timeout().as_secs());
    println!("Loop budgets:");
    for spec in ADVISORS.iter().filter(|s| s.feedback_key.is_some()) {
        println!("  {:<16} {}", spec.name, config.max_iterations_for(spec.name));
    }

    Ok(())
}

/// List the advisor catalogue
pub async fn advisors_command() -> Result<()> {
    let config = load_config().await?;

    println!("{:<16} {:<7} {:<24} {}", "ROUTE", "KIND", "REPORT KEY", "ROUNDS");
    for spec in ADVISORS {
        let rounds = match spec.feedback_key {
            Some(_) => config.max_iterations_for(spec.name).to_string(),
            None => "-".to_string(),
        };
        println!(
            "{:<16} {:<7} {:<24} {}",
            spec.name,
            spec.kind.as_str(),
            spec.report_key,
            rounds
        );
    }

    Ok(())
}

/// Fan out to every advisor
pub async fn advise_command(farmer: FarmerArgs, json: bool) -> Result<()> {
    let config = load_config().await?;
    let catalogue = build_catalogue(config)?;
    let fan_out = catalogue.fan_out()?;
    let ctx = Arc::new(farmer.into_context());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling advisors");
            on_interrupt.cancel();
        }
    });

    let report = fan_out.advise(ctx, cancel).await;
    info!(
        "{} of {} advisors completed",
        report.completed_count(),
        report.entries.len()
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.to_markdown());
    }

    Ok(())
}

/// Run one advisor
pub async fn consult_command(route: String, farmer: FarmerArgs, json: bool) -> Result<()> {
    let config = load_config().await?;
    let catalogue = build_catalogue(config)?;
    let table = catalogue.routing_table()?;

    let advice = table
        .dispatch(&route, &farmer.into_context())
        .await
        .with_context(|| format!("Advisor '{}' failed", route))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&advice)?);
    } else {
        match advice.approved {
            Some(true) => println!("[approved]"),
            Some(false) => println!("[not approved: iteration budget exhausted]"),
            None => {}
        }
        println!("{}", advice.text);
    }

    Ok(())
}

/// Delegating conversation
pub async fn ask_command(message: Option<String>, session: String) -> Result<()> {
    let config = load_config().await?;
    let sessions = SessionManager::with_max_messages(
        kisan_config::sessions_dir(),
        config.session_max_messages(),
    );
    let history = config.history_messages();
    let catalogue = build_catalogue(config)?;
    let mut router = Router::new(
        catalogue.routing_table()?,
        Arc::new(catalogue.classifier()),
        sessions,
    )
    .with_history_window(history);
    let key = session_key(&session);

    if let Some(msg) = message {
        let reply = router.handle(&key, &msg).await?;
        print_reply(reply.route.as_deref(), &reply.text);
        return Ok(());
    }

    println!("Interactive mode (type 'exit' to quit)");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match router.handle(&key, input).await {
            Ok(reply) => print_reply(reply.route.as_deref(), &reply.text),
            Err(e) => println!("\nError: {}\n", e),
        }
    }

    Ok(())
}

fn session_key(name: &str) -> String {
    format!("cli:{}", name)
}

/// List persisted conversations by the name `ask -s` takes
pub async fn sessions_list_command() -> Result<()> {
    let sessions = SessionManager::new(kisan_config::sessions_dir());
    let names = sessions.list().await;

    if names.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for stem in names {
        println!("{}", stem.strip_prefix("cli_").unwrap_or(&stem));
    }
    Ok(())
}

/// Delete one persisted conversation
pub async fn sessions_clear_command(session: String) -> Result<()> {
    let mut sessions = SessionManager::new(kisan_config::sessions_dir());
    if sessions
        .delete(&session_key(&session))
        .await
        .with_context(|| format!("Failed to delete session '{}'", session))?
    {
        println!("Cleared session '{}'", session);
    } else {
        println!("No session named '{}'", session);
    }
    Ok(())
}

fn print_reply(route: Option<&str>, text: &str) {
    match route {
        Some(route) => println!("\n[{}]\n{}\n", route, text),
        None => println!("\n{}\n", text),
    }
}
