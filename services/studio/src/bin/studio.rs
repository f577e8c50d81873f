//! services/studio/src/bin/studio.rs

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use studio_core::domain::{ContentType, GenerationParams, StyleSearchParams, UsageQuery};
use studio_core::validation::ValidationError;
use studio_lib::{
    config::Config,
    error::{StudioError, StudioResult},
    workflow::GenerationWorkflow,
    Studio,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "studio", version, about = "Content studio client", long_about = None)]
struct Cli {
    /// Organization to act in for this run (and from now on).
    #[arg(long, global = true)]
    organization: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STUDIO_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the session.
    Logout,
    /// Show the signed-in user and organizations.
    Whoami,
    /// List style profiles.
    Styles {
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Generate an article from a brief.
    Generate {
        #[arg(long)]
        style: Uuid,
        #[arg(long)]
        brief: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "article")]
        content_type: String,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        target_length: Option<u32>,
    },
    /// Show token usage and limits.
    Usage {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<(), StudioError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // --- 2. Wire Adapters & Restore the Session ---
    let studio = Studio::from_config(&config)?;
    let snapshot = studio.session.initialize().await;
    info!(status = ?snapshot.status, "Session initialized.");
    let refresh_loop = studio.session.spawn_refresh_loop();

    if let Some(org) = cli.organization {
        studio.session.wait_for_revalidation().await;
        studio.session.set_organization(org).await?;
    }

    // --- 3. Dispatch ---
    let result = run(&studio, cli.command).await;

    studio.session.shutdown().await;
    refresh_loop.abort();
    result
}

async fn run(studio: &Studio, command: Commands) -> StudioResult<()> {
    match command {
        Commands::Login { email, password } => {
            let profile = studio.session.login(&email, &password).await?;
            println!("Signed in as {} <{}>", profile.user.username, profile.user.email);
            if let Some(org) = studio.session.snapshot().organization {
                println!("Organization: {} ({})", org.name, org.id);
            }
        }
        Commands::Logout => {
            studio.session.logout().await;
            println!("Signed out.");
        }
        Commands::Whoami => {
            studio.session.wait_for_revalidation().await;
            let snapshot = studio.session.snapshot();
            let Some(user) = snapshot.user else {
                println!("Not signed in.");
                return Ok(());
            };
            println!(
                "{} <{}>",
                user.display_name.as_deref().unwrap_or(&user.username),
                user.email
            );
            let active = snapshot.organization.map(|o| o.id);
            for org in snapshot.organizations {
                let marker = if Some(org.id) == active { "*" } else { " " };
                println!("{} {} ({})", marker, org.name, org.id);
            }
        }
        Commands::Styles { query, page } => {
            let params = StyleSearchParams {
                query,
                page,
                ..Default::default()
            };
            let styles = studio.client.styles(&params).await?;
            for style in &styles.items {
                let band = style.confidence_band();
                let percent = style.analysis.as_ref().map(|a| a.confidence_percent()).unwrap_or(0);
                println!(
                    "{}  {:<32} refs:{:<3} {} ({}%)",
                    style.id,
                    style.name,
                    style.reference_total(),
                    band.label(),
                    percent
                );
            }
            println!("{} of {} styles", styles.items.len(), styles.total);
        }
        Commands::Generate {
            style,
            brief,
            title,
            content_type,
            max_tokens,
            temperature,
            target_length,
        } => {
            let content_type = ContentType::parse(&content_type).ok_or_else(|| {
                StudioError::from(ValidationError::new("content_type", format!("Unknown content type '{}'", content_type)))
            })?;
            let mut workflow = GenerationWorkflow::new(studio.client.clone());
            workflow.update_draft(|draft| {
                draft.title = title;
                draft.brief = brief;
                draft.style_id = Some(style);
                draft.content_type = content_type;
                draft.params = GenerationParams {
                    max_tokens,
                    temperature,
                    target_length,
                };
            })?;
            let content = workflow.submit().await?;
            if let Some(warning) = workflow.state().warning {
                eprintln!("warning: {}", warning.message());
            }
            println!("# {}\n\n{}", content.title, content.body);
            eprintln!(
                "[{} | {} tokens | ${:.4} | id {}]",
                content.status.as_str(),
                content.token_count,
                content.cost,
                content.id
            );
        }
        Commands::Usage { from, to } => {
            let query = UsageQuery {
                start_date: from,
                end_date: to,
            };
            let (stats, limits) = futures::try_join!(
                studio.client.usage_stats(&query),
                studio.client.usage_limits()
            )?;
            println!(
                "Tokens: {}  Cost: ${:.4}  Requests: {}",
                stats.total_tokens, stats.total_cost, stats.total_requests
            );
            for day in &stats.daily {
                println!("  {}  {:>8} tokens  ${:.4}", day.date, day.tokens, day.cost);
            }
            println!(
                "Today: {}/{} tokens ({:.1}%){}",
                limits.tokens_used_today,
                limits.daily_token_limit,
                limits.daily_percentage(),
                if limits.daily_limit_exceeded { "  LIMIT REACHED" } else { "" }
            );
        }
    }
    Ok(())
}
