use anyhow::Result;

use super::Context;

pub async fn cmd_info(ctx: &Context, url: &str) -> Result<()> {
    let info = ctx.extract(url).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
