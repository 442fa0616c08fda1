use anyhow::Result;
use colored::Colorize;
use recruit_gateway::{auth, config, db};
use std::path::Path;

/// Execute `session issue`
pub async fn issue(config_path: &Path, user: String, ttl_hours: i64) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let pool = db::connect(&cfg.database.path).await?;

    let now = chrono::Utc::now().timestamp();
    let token = auth::issue_session(&pool, &user, ttl_hours * 3600, now).await?;

    let expires_at = chrono::DateTime::from_timestamp(now + ttl_hours * 3600, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    println!("{}", "✓ Session issued".green().bold());
    println!();
    println!("  {} {}", "User:".bold(), user.cyan());
    println!("  {} {}", "Expires At:".bold(), expires_at);
    println!();
    println!("  {}", token.green());
    println!();
    println!(
        "  {} This token is shown only once. Send it as `Authorization: Bearer <token>`.",
        "⚠".yellow()
    );

    pool.close().await;
    Ok(())
}
