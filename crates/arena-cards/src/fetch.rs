//! The `fetch` subcommand: aggregate channel membership across the user's
//! channels, then pull every unique block body and write the raw-fetch file.

use arena_cards_core::arena::{ChannelIndex, RawBlock, RawData};
use colored::Colorize;

use crate::arena;
use crate::config::Config;
use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Args)]
pub struct FetchOptions {
    /// Override the configured target user slug
    #[arg(long)]
    pub user: Option<String>,
}

pub async fn run(options: FetchOptions, global: crate::Global) -> Result<()> {
    let config = Config::load(&global.config)?;
    let token = config.token()?;
    let user = options
        .user
        .unwrap_or_else(|| config.arena_user_slug.clone());

    if global.verbose {
        println!("are.na API Base: {}", arena::get_api_base());
        println!();
    }

    println!("Downloading channel list for user: {}", user.bold());

    let client = arena::create_arena_client(&token)?;
    let data = fetch_arena_data(&client, &user).await?;

    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| eyre!("Failed to create {}: {e}", config.output_dir.display()))?;

    let raw_path = config.raw_data_path();
    let json = serde_json::to_string_pretty(&data)?;
    std::fs::write(&raw_path, json)
        .map_err(|e| eyre!("Failed to write {}: {e}", raw_path.display()))?;

    println!(
        "\n{} {} block(s) saved to {}",
        "Downloaded".green().bold(),
        data.blocks.len(),
        raw_path.display()
    );

    Ok(())
}

/// Aggregate channel membership, then fetch every unique block body with its
/// channel list attached. A channel or block that fails to fetch is logged
/// and skipped; only the initial channel listing is fatal.
pub async fn fetch_arena_data(client: &reqwest::Client, user: &str) -> Result<RawData> {
    let listing = arena::list_channels(client, user).await?;

    println!(
        "Fetching block ids from {} channel(s)...",
        listing.channels.len()
    );

    let mut index = ChannelIndex::new();
    for (i, channel) in listing.channels.iter().enumerate() {
        let Some(slug) = channel.slug.as_deref() else {
            continue;
        };
        let title = channel.display_title();

        println!("  [{}/{}] {title}", i + 1, listing.channels.len());

        if let Err(err) = aggregate_channel(client, slug, title, &mut index).await {
            eprintln!(
                "    {} failed to download {title}: {err}",
                "warning:".yellow()
            );
        }
    }

    println!(
        "\nFetching {} unique block(s) from the blocks API...",
        index.len()
    );

    let mut blocks: Vec<RawBlock> = Vec::new();
    for (i, &block_id) in index.block_ids().iter().enumerate() {
        if (i + 1) % 10 == 0 || i + 1 == index.len() {
            println!("  [{}/{}] fetching block {block_id}", i + 1, index.len());
        }

        match arena::fetch_block(client, block_id).await {
            Ok(mut block) => {
                block.channel_titles = index.channels_for(block_id).to_vec();
                blocks.push(block);
            }
            Err(err) => {
                eprintln!(
                    "    {} failed to fetch block {block_id}: {err}",
                    "warning:".yellow()
                );
            }
        }
    }

    Ok(RawData { blocks })
}

/// Page through one channel's contents, recording membership as pages land.
///
/// The loop stops when the items received reach the channel's reported
/// length, or when a page comes back empty — the reported total can be
/// wrong, and the empty page wins.
async fn aggregate_channel(
    client: &reqwest::Client,
    slug: &str,
    title: &str,
    index: &mut ChannelIndex,
) -> Result<()> {
    let mut received: u64 = 0;
    let mut page: usize = 1;

    loop {
        let contents = arena::fetch_channel_page(client, slug, page).await?;
        let count = contents.contents.len() as u64;
        index.record_page(title, &contents.contents);
        received += count;

        if count == 0 || received >= contents.length {
            break;
        }

        println!(
            "    page {page}: {received}/{} blocks so far",
            contents.length
        );
        page += 1;
    }

    Ok(())
}
