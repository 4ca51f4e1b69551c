use anyhow::{bail, Context as _, Result};

use streamgate::stream::download::resolve_live;
use streamgate::stream::{Downloader, Protocol};

use super::Context;

pub async fn cmd_live_url(ctx: &Context, url: &str, quality: Option<&str>) -> Result<()> {
    let info = ctx.extract(url).await?;
    if !info.is_live {
        bail!("{url} is not a live broadcast");
    }

    let quality = quality.unwrap_or(&ctx.config.live_quality);
    let format = info
        .formats
        .iter()
        .filter(|f| f.protocol == Protocol::NiconicoLive)
        .find(|f| f.format_id == quality)
        .with_context(|| format!("no live format with quality {quality}"))?;

    eprintln!("📡 Connecting to control channel...");
    let downloader = Downloader::new(ctx.client.clone(), &ctx.config);
    let (_session, playlist) = resolve_live(
        downloader.live_connector(format),
        quality,
        ctx.config.reconnect_delay(),
    )
    .await?;

    println!("{playlist}");
    Ok(())
}
