use anyhow::Result;
use colored::Colorize;

use mnemosyne::Mnemosyne;

pub async fn run(app: &Mnemosyne, url: &str, json: bool) -> Result<()> {
    app.delete(url).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": url }));
    } else {
        println!("{} Forgot {}", "✓".green(), url.cyan());
    }
    Ok(())
}
