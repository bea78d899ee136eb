//! The `process` subcommand: normalize raw blocks, apply the minimum-date
//! filter, download images, and write the processed-blocks file.

use std::path::Path;
use std::time::Duration;

use arena_cards_core::arena::{
    extension_of, image_filename, normalize_block, parse_timestamp, NormalizedBlock, RawData,
};
use colored::Colorize;

use crate::config::Config;
use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Args)]
pub struct ProcessOptions {
    /// Override the configured minimum update timestamp (RFC 3339)
    #[arg(long)]
    pub min_updated: Option<String>,
}

/// Per-request timeout for image downloads.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(options: ProcessOptions, global: crate::Global) -> Result<()> {
    let config = Config::load(&global.config)?;

    let raw_path = config.raw_data_path();
    if !raw_path.exists() {
        return Err(eyre!(
            "{} not found. Run `arena-cards fetch` first.",
            raw_path.display()
        ));
    }
    let raw = std::fs::read_to_string(&raw_path)
        .with_context(|| format!("Failed to read {}", raw_path.display()))?;
    let data: RawData = serde_json::from_str(&raw)
        .map_err(|e| eyre!("Failed to parse {}: {e}", raw_path.display()))?;

    let min_updated = options
        .min_updated
        .or_else(|| config.min_updated_date.clone());
    let min_date = match min_updated.as_deref() {
        Some(value) => match parse_timestamp(value) {
            Some(date) => {
                println!("Filtering blocks updated after: {value}");
                Some(date)
            }
            None => {
                eprintln!(
                    "{} invalid min_updated_date '{value}' (expected e.g. 2025-12-20T00:00:00.000Z); filter disabled",
                    "warning:".yellow()
                );
                None
            }
        },
        None => None,
    };

    let images_dir = config.images_dir_path();
    std::fs::create_dir_all(&images_dir)
        .map_err(|e| eyre!("Failed to create {}: {e}", images_dir.display()))?;

    // Image downloads hit arbitrary CDNs, not the are.na API; some of them
    // refuse requests without a browser user agent.
    let client = reqwest::Client::builder()
        .user_agent("Mozilla/5.0")
        .build()
        .map_err(|e| eyre!("Failed to build HTTP client: {e}"))?;

    println!("\nProcessing {} block(s)...", data.blocks.len());

    let mut blocks: Vec<NormalizedBlock> = Vec::new();
    let mut filtered = 0usize;
    let mut with_images = 0usize;

    for raw_block in &data.blocks {
        if raw_block.id.is_none() {
            continue;
        }
        let Some(pending) = normalize_block(raw_block, min_date.as_ref()) else {
            filtered += 1;
            continue;
        };

        let image_file = match &pending.image {
            Some(request) => {
                match download_image(&client, &request.url, &images_dir, pending.id, &request.filename)
                    .await
                {
                    Ok(file) => {
                        with_images += 1;
                        Some(file)
                    }
                    Err(err) => {
                        eprintln!(
                            "  {} {err} downloading {}",
                            "warning:".yellow(),
                            request.url
                        );
                        None
                    }
                }
            }
            None => None,
        };

        blocks.push(pending.into_normalized(image_file));
    }

    let processed_path = config.processed_data_path();
    let json = serde_json::to_string_pretty(&blocks)?;
    std::fs::write(&processed_path, json)
        .map_err(|e| eyre!("Failed to write {}: {e}", processed_path.display()))?;

    println!();
    let mut table = new_table();
    table.add_row(prettytable::row![
        "Processed".bold().cyan(),
        blocks.len().to_string().bright_white()
    ]);
    table.add_row(prettytable::row![
        "Filtered out".bold().cyan(),
        filtered.to_string().bright_white()
    ]);
    table.add_row(prettytable::row![
        "With images".bold().cyan(),
        with_images.to_string().bright_white()
    ]);
    table.printstd();

    println!("{} {}", "Saved to:".green().bold(), processed_path.display());

    Ok(())
}

/// Download a block's image into `images_dir`, returning the stored
/// filename. Reruns are idempotent: an existing non-empty destination is
/// kept as is. The extension is corrected when the payload's magic bytes
/// disagree with the source filename.
async fn download_image(
    client: &reqwest::Client,
    url: &str,
    images_dir: &Path,
    block_id: u64,
    source_filename: &str,
) -> Result<String, Error> {
    let ext = extension_of(source_filename);
    let filename = format!("{block_id}{ext}");
    let destination = images_dir.join(&filename);

    if let Ok(meta) = std::fs::metadata(&destination) {
        if meta.len() > 0 {
            println!("  already exists: {filename} ({} bytes)", meta.len());
            return Ok(filename);
        }
    }

    println!("  downloading: {filename} from {url}");

    let response = client
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .map_err(|e| {
            remove_empty_file(&destination);
            Error::Network(e.to_string())
        })?;

    if !response.status().is_success() {
        remove_empty_file(&destination);
        return Err(Error::Status(response.status().as_u16()));
    }

    let bytes = response.bytes().await.map_err(|e| {
        remove_empty_file(&destination);
        Error::Network(e.to_string())
    })?;
    if bytes.is_empty() {
        remove_empty_file(&destination);
        return Err(Error::EmptyPayload);
    }

    let stored = image_filename(block_id, source_filename, &bytes);
    if stored != filename {
        println!("    note: payload is {}, not {ext}", extension_of(&stored));
    }
    let destination = images_dir.join(&stored);

    tokio::fs::write(&destination, &bytes)
        .await
        .map_err(|e| Error::Io(e.to_string()))?;

    println!("  downloaded {stored} ({} bytes)", bytes.len());
    Ok(stored)
}

/// Remove a leftover empty destination file so a rerun does not mistake it
/// for a finished download.
fn remove_empty_file(path: &Path) {
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.len() == 0 {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_download_skips_existing_non_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("7.png"), b"data").unwrap();

        // The URL is never touched: the destination short-circuits first.
        let client = reqwest::Client::new();
        let result = download_image(
            &client,
            "http://server.invalid/a.png",
            dir.path(),
            7,
            "a.png",
        )
        .await;

        assert_eq!(result.unwrap(), "7.png");
    }

    #[tokio::test]
    async fn test_download_failure_cleans_up_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let leftover = dir.path().join("7.png");
        std::fs::write(&leftover, b"").unwrap();

        // `.invalid` is reserved and never resolves, so this fails at the
        // transport layer without touching the network proper.
        let client = reqwest::Client::new();
        let result = download_image(
            &client,
            "http://server.invalid/a.png",
            dir.path(),
            7,
            "a.png",
        )
        .await;

        assert!(matches!(result, Err(Error::Network(_))));
        assert!(!leftover.exists());
    }

    #[test]
    fn test_remove_empty_file_keeps_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.png");
        std::fs::write(&path, b"bytes").unwrap();

        remove_empty_file(&path);
        assert!(path.exists());
    }
}
