use std::path::Path;

use anyhow::{Context as _, Result};

use streamgate::stream::{DownloadProgress, Downloader, MediaInfo, ProgressCallback};

use super::Context;

fn print_progress(p: DownloadProgress) {
    match p.media_seconds {
        Some(secs) => eprint!(
            "\r   📥 {:.1} MB, {:.0}s of media, {:.1}s elapsed    ",
            p.bytes_downloaded as f64 / 1_000_000.0,
            secs,
            p.elapsed_seconds
        ),
        None => eprint!(
            "\r   📥 {:.1} MB, {:.1}s elapsed    ",
            p.bytes_downloaded as f64 / 1_000_000.0,
            p.elapsed_seconds
        ),
    }
}

pub async fn cmd_download(
    ctx: &Context,
    url: &str,
    output: &Path,
    format_id: Option<&str>,
) -> Result<()> {
    let info = ctx.extract(url).await?;
    let downloader = Downloader::new(ctx.client.clone(), &ctx.config);
    if info.is_playlist() {
        return download_playlist(ctx, &downloader, &info, output, format_id).await;
    }

    eprintln!("📺 {}", info.title);
    if info.is_live {
        eprintln!("   🔴 LIVE");
    }

    let format = match format_id {
        Some(id) => info.format(id).with_context(|| {
            let known: Vec<_> = info.formats.iter().map(|f| f.format_id.as_str()).collect();
            format!("no format {id}; available: {}", known.join(", "))
        })?,
        None => info.best_format().context("no downloadable formats")?,
    };
    eprintln!("🔧 Format: {} ({})", format.format_id, format.protocol);

    downloader
        .download(format, output, Some(Box::new(print_progress)))
        .await
        .with_context(|| format!("downloading {} failed", format.format_id))?;

    eprintln!("\n💾 Saved to {}", output.display());
    Ok(())
}

async fn download_playlist(
    ctx: &Context,
    downloader: &Downloader,
    playlist: &MediaInfo,
    dir: &Path,
    format_id: Option<&str>,
) -> Result<()> {
    let count = playlist.entries.as_ref().map_or(0, Vec::len);
    eprintln!("📚 {} ({count} videos)", playlist.title);

    let written = downloader
        .download_playlist(ctx.extractors(), playlist, dir, format_id, |entry| {
            eprintln!("\n📺 {}", entry.title.as_deref().unwrap_or(&entry.id));
            let progress: ProgressCallback = Box::new(print_progress);
            Some(progress)
        })
        .await
        .with_context(|| format!("downloading playlist {} failed", playlist.id))?;

    eprintln!("\n💾 Saved {} files to {}", written.len(), dir.display());
    Ok(())
}
