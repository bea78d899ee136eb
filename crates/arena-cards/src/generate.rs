//! The `generate` subcommand: read the processed blocks, emit QR thumbnails,
//! and write the typst card document.

use arena_cards_core::arena::NormalizedBlock;
use arena_cards_core::typst;
use colored::Colorize;

use crate::config::Config;
use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Args)]
pub struct GenerateOptions {
    /// Override the configured output document filename
    #[arg(long)]
    pub output: Option<String>,
}

pub async fn run(options: GenerateOptions, global: crate::Global) -> Result<()> {
    let config = Config::load(&global.config)?;

    let processed_path = config.processed_data_path();
    if !processed_path.exists() {
        return Err(eyre!(
            "{} not found. Run `arena-cards process` first.",
            processed_path.display()
        ));
    }
    let json = std::fs::read_to_string(&processed_path)
        .with_context(|| format!("Failed to read {}", processed_path.display()))?;
    let blocks: Vec<NormalizedBlock> = serde_json::from_str(&json)
        .map_err(|e| eyre!("Failed to parse {}: {e}", processed_path.display()))?;

    println!("Generating typst layout for {} block(s)...", blocks.len());

    let qr_codes = qr_codes_for(&blocks, &config.output_dir);

    // Image paths in the document stay relative: just the directory's base
    // name, never the full output path.
    let images_subdir = images_subdir_name(&config.images_dir)
        .ok_or_eyre("images_dir must name a directory")?;

    let document = typst::render_document(&blocks, &images_subdir, &qr_codes);

    let output_path = match &options.output {
        Some(name) => config.output_dir.join(name),
        None => config.output_typst_path(),
    };
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| eyre!("Failed to create {}: {e}", parent.display()))?;
    }
    std::fs::write(&output_path, document)
        .map_err(|e| eyre!("Failed to write {}: {e}", output_path.display()))?;

    println!();
    let mut table = new_table();
    table.add_row(prettytable::row![
        "Cards".bold().cyan(),
        blocks.len().to_string().bright_white()
    ]);
    table.add_row(prettytable::row![
        "Pages".bold().cyan(),
        typst::page_count(blocks.len()).to_string().bright_white()
    ]);
    table.printstd();

    println!("{} {}", "Generated:".green().bold(), output_path.display());

    Ok(())
}

/// Base name of the images directory, for relative references inside the
/// document.
fn images_subdir_name(images_dir: &str) -> Option<String> {
    std::path::Path::new(images_dir)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// QR side effects, one per block in document order; a failure logs a
/// warning and leaves that card without a thumbnail.
#[cfg(feature = "qr")]
fn qr_codes_for(blocks: &[NormalizedBlock], output_dir: &std::path::Path) -> Vec<Option<String>> {
    blocks
        .iter()
        .map(
            |block| match crate::qr::generate_qr_code(block.id, output_dir) {
                Ok(path) => Some(path),
                Err(err) => {
                    eprintln!(
                        "  {} qr code for block {} skipped: {err}",
                        "warning:".yellow(),
                        block.id
                    );
                    None
                }
            },
        )
        .collect()
}

#[cfg(not(feature = "qr"))]
fn qr_codes_for(blocks: &[NormalizedBlock], _output_dir: &std::path::Path) -> Vec<Option<String>> {
    vec![None; blocks.len()]
}
