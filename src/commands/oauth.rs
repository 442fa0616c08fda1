use anyhow::{anyhow, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use recruit_gateway::{
    config::{self, Config, IntegrationKind},
    db,
    oauth::{OAuthManager, SqliteTokenStore, TokenStore},
};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

struct Context {
    manager: OAuthManager,
    store: Arc<dyn TokenStore>,
    pool: SqlitePool,
}

async fn open(config_path: &Path, integration: &str) -> Result<Context> {
    let cfg: Config = config::load_config(config_path)?;
    let kind: IntegrationKind = integration.parse().map_err(|e: String| anyhow!(e))?;

    let integration_cfg = cfg
        .integration(kind)
        .ok_or_else(|| anyhow!("Integration '{}' not found in configuration", kind))?;

    let pool = db::connect(&cfg.database.path).await?;
    let store: Arc<dyn TokenStore> = Arc::new(
        SqliteTokenStore::new(pool.clone(), cfg.database.encryption_secret.as_deref()).await?,
    );
    let manager = OAuthManager::from_config(
        integration_cfg,
        &cfg.oauth,
        store.clone(),
        Duration::from_secs(cfg.server.request_timeout_seconds),
    )?;

    Ok(Context {
        manager,
        store,
        pool,
    })
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn format_remaining(seconds: i64) -> String {
    if seconds <= 0 {
        return "expired".to_string();
    }
    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
}

/// Execute OAuth status command
pub async fn status(config_path: &Path, integration: String, user: Option<String>) -> Result<()> {
    let ctx = open(config_path, &integration).await?;
    let kind = ctx.manager.integration();

    println!("{}", format!("🔍 {} Token Status", kind.display_name()).bold());
    println!();

    match user {
        Some(user) => {
            let report = ctx.manager.status(&user).await?;

            println!("{} {}", "User:".bold(), user.cyan());
            if report.authenticated {
                println!("  {} {}", "Status:".bold(), "✓ Connected".green());
            } else {
                println!("  {} {}", "Status:".bold(), "✗ Not connected".red());
            }
            if let Some(expires_at) = report.expires_at {
                let remaining = expires_at - chrono::Utc::now().timestamp();
                println!("  {} {}", "Expires At:".bold(), format_timestamp(expires_at));
                println!("  {} {}", "Time Remaining:".bold(), format_remaining(remaining));
            }
            println!(
                "  {} {}",
                "Refresh Token:".bold(),
                if report.has_refresh_token { "yes" } else { "no" }
            );
            if !report.scopes.is_empty() {
                println!("  {} {}", "Scopes:".bold(), report.scopes.join(" "));
            }
        }
        None => {
            let records = ctx.store.list(kind).await?;
            if records.is_empty() {
                println!("  {} No {} tokens stored", "ℹ".blue(), kind.display_name());
                ctx.pool.close().await;
                return Ok(());
            }

            let now = chrono::Utc::now().timestamp();
            let margin = ctx.manager.margin();

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec![
                Cell::new("USER").fg(Color::Cyan),
                Cell::new("STATUS").fg(Color::Cyan),
                Cell::new("EXPIRES AT").fg(Color::Cyan),
                Cell::new("REMAINING").fg(Color::Cyan),
                Cell::new("REFRESH TOKEN").fg(Color::Cyan),
                Cell::new("LAST REFRESHED").fg(Color::Cyan),
            ]);

            for record in &records {
                let status = if record.is_fresh(now, margin) {
                    Cell::new("fresh").fg(Color::Green)
                } else if record.can_refresh() {
                    Cell::new("needs refresh").fg(Color::Yellow)
                } else {
                    Cell::new("expired").fg(Color::Red)
                };

                table.add_row(vec![
                    Cell::new(&record.user_id),
                    status,
                    Cell::new(format_timestamp(record.expires_at)),
                    Cell::new(format_remaining(record.remaining(now))),
                    Cell::new(if record.can_refresh() { "yes" } else { "no" }),
                    Cell::new(format_timestamp(record.last_refreshed_at)),
                ]);
            }

            println!("{table}");
        }
    }

    ctx.pool.close().await;
    Ok(())
}

/// Execute OAuth refresh command
pub async fn refresh(config_path: &Path, integration: String, user: String) -> Result<()> {
    let ctx = open(config_path, &integration).await?;

    println!(
        "{} {} token for {}...",
        "→".cyan(),
        ctx.manager.integration().display_name(),
        user.cyan()
    );

    match ctx.manager.force_refresh(&user).await? {
        Some(record) => {
            println!("  {} Token refreshed", "✓".green());
            println!("  {} {}", "Expires At:".bold(), format_timestamp(record.expires_at));
        }
        None => {
            println!(
                "  {} No usable tokens, the user has to reconnect from the dashboard",
                "✗".red()
            );
        }
    }

    ctx.pool.close().await;
    Ok(())
}

/// Execute OAuth logout command
pub async fn logout(config_path: &Path, integration: String, user: String) -> Result<()> {
    let ctx = open(config_path, &integration).await?;

    if ctx.manager.clear_tokens(&user).await? {
        println!(
            "{} {} tokens deleted for {}",
            "✓".green(),
            ctx.manager.integration().display_name(),
            user.cyan()
        );
    } else {
        println!("{} No tokens stored for {}", "ℹ".blue(), user.cyan());
    }

    ctx.pool.close().await;
    Ok(())
}
