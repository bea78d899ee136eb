//! Typst escaping, markdown-subset conversion, and card layout emission.
//!
//! Everything here is string-to-string: the shell decides where the document
//! goes, this module decides what it says.

use crate::arena::{BlockBody, NormalizedBlock};

/// Cards laid out per page (2x2 grid).
pub const CARDS_PER_PAGE: usize = 4;

/// Display cap for source URLs on a card.
pub const MAX_URL_DISPLAY: usize = 80;

/// Indentation of content lines inside a card's `content: [...]` block.
const CONTENT_INDENT: &str = "      ";

/// Document-level page and typography setup plus the reusable card template.
/// Card geometry lives here, not in the per-card data.
const DOCUMENT_PREAMBLE: &str = r##"// generated cards from are.na data

#set page(
  width: 8.5in,
  height: 11in,
  margin: 0.5in,
)

#set text(
  font: "Arial",
  size: 11pt,
)

// card dimensions - 4 per page (2x2 grid)
#let card-width = 3.5in
#let card-height = 4.5in
#let card-gap = 0.25in

// card component
#let card(
  title: none,
  img-path: none,
  content: none,
  source-url: none,
  source-url-display: none,
  channels: (),
  qr-code: none,
) = {
  // leave room for the source url line when one will be shown
  let img-height = if source-url != none { 2in } else { 2.5in }

  box(
    width: card-width,
    height: card-height,
    stroke: 0.5pt + luma(225),
    inset: 0.3in,
  )[
    #v(0pt)

    // title at top (if exists)
    #if title != none [
      #text(weight: "bold", size: 12pt)[#title]
      #v(0.1in)
    ]

    // content area - image or text
    #if img-path != none [
      #box(
        width: 100%,
        height: img-height,
      )[
        #align(center + horizon)[
          #image(img-path, fit: "contain", width: 100%, height: 100%)
        ]
      ]
    ] else if content != none [
      #align(left + top)[
        #content
      ]
    ]

    #v(1fr) // push everything below to bottom

    // source url (if exists)
    #if source-url != none [
      #v(0.1in)
      #text(size: 9pt, fill: blue)[
        #link(source-url)[#if source-url-display != none [#source-url-display] else [#source-url]]
      ]
    ]

    #v(0.1in)

    // footer with channels and qr code
    #line(length: 100%, stroke: 0.5pt + luma(200))
    #v(0.05in)
    #grid(
      columns: (1fr, auto),
      align: (left + top, right),
      text(size: 9pt, fill: gray)[
        #channels.map(ch => [● #ch]).join(linebreak())
      ],
      if qr-code != none [
        #image(qr-code, width: 0.4in, height: 0.4in, scaling: "pixelated")
      ]
    )
  ]
}

// generate cards
"##;

/// Escape the characters that are special inside typst strings and markup.
/// Backslashes go first so the escapes themselves survive.
pub fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('#', "\\#")
}

/// Display form of a URL: unchanged up to `max_len` characters, truncated
/// with an ellipsis suffix beyond it.
pub fn truncate_url(url: &str, max_len: usize) -> String {
    if url.chars().count() <= max_len {
        url.to_string()
    } else {
        let mut display: String = url.chars().take(max_len).collect();
        display.push_str("...");
        display
    }
}

/// Convert a block's text content to typst markup.
///
/// Per line (trimmed): `# ` / `## ` / `### ` become bold headings at
/// 13/12/11pt, blank lines become paragraph breaks, list bullets pass
/// through without a forced break (typst handles list spacing), and plain
/// lines get a `#linebreak()` unless the following line is blank or a list
/// item, which would double the spacing.
pub fn convert_content(content: &str) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut formatted: Vec<String> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();

        if let Some(text) = stripped.strip_prefix("# ") {
            formatted.push(format!(
                "{CONTENT_INDENT}#text(weight: \"bold\", size: 13pt)[{}]",
                escape(text)
            ));
        } else if let Some(text) = stripped.strip_prefix("## ") {
            formatted.push(format!(
                "{CONTENT_INDENT}#text(weight: \"bold\", size: 12pt)[{}]",
                escape(text)
            ));
        } else if let Some(text) = stripped.strip_prefix("### ") {
            formatted.push(format!(
                "{CONTENT_INDENT}#text(weight: \"bold\", size: 11pt)[{}]",
                escape(text)
            ));
        } else if stripped.is_empty() {
            formatted.push(String::new());
        } else if stripped.starts_with("- ") || stripped.starts_with("* ") {
            formatted.push(format!("{CONTENT_INDENT}{}", escape(line)));
        } else {
            formatted.push(format!("{CONTENT_INDENT}{}", escape(line)));
            if let Some(next) = lines.get(i + 1) {
                let next_stripped = next.trim();
                if !next_stripped.starts_with('-')
                    && !next_stripped.starts_with('*')
                    && !next_stripped.is_empty()
                {
                    formatted.push(format!("{CONTENT_INDENT}#linebreak()"));
                }
            }
        }
    }

    // no dangling break at the end of a block
    let trailing_break = format!("{CONTENT_INDENT}#linebreak()");
    if formatted.last() == Some(&trailing_break) {
        formatted.pop();
    }

    formatted.join("\n")
}

/// Generate the `card(...)` invocation for one block. `images_subdir` is the
/// base name of the images directory so the path stays relative to the
/// document; `qr_code` is the relative path of the block's QR thumbnail when
/// one was generated.
pub fn render_card(
    block: &NormalizedBlock,
    images_subdir: &str,
    qr_code: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(title) = &block.title {
        parts.push(format!("    title: \"{}\",", escape(title)));
    }

    match &block.body {
        BlockBody::Image { file } => {
            parts.push(format!("    img-path: \"{images_subdir}/{file}\","));
        }
        BlockBody::Text { content } => {
            parts.push(format!(
                "    content: [\n{}\n    ],",
                convert_content(content)
            ));
        }
        BlockBody::Empty => {}
    }

    if let Some(source_url) = &block.source_url {
        let display = truncate_url(source_url, MAX_URL_DISPLAY);
        parts.push(format!("    source-url: \"{}\",", escape(source_url)));
        parts.push(format!("    source-url-display: \"{}\",", escape(&display)));
    }

    let channels = block
        .channels
        .iter()
        .map(|ch| format!("\"{}\"", escape(ch)))
        .collect::<Vec<_>>()
        .join(", ");
    if block.channels.len() == 1 {
        // trailing separator so typst parses a one-element sequence, not a scalar
        parts.push(format!("    channels: ({channels},),"));
    } else {
        parts.push(format!("    channels: ({channels}),"));
    }

    if let Some(qr) = qr_code {
        parts.push(format!("    qr-code: \"{qr}\","));
    }

    format!("  card(\n{}\n  )", parts.join("\n"))
}

/// Pages needed for `blocks` cards.
pub fn page_count(blocks: usize) -> usize {
    blocks.div_ceil(CARDS_PER_PAGE)
}

/// Render the complete typst document: preamble and card template, then one
/// 2x2 grid per group of four cards, with a page break between consecutive
/// grids and never after the last.
pub fn render_document(
    blocks: &[NormalizedBlock],
    images_subdir: &str,
    qr_codes: &[Option<String>],
) -> String {
    let mut doc = String::from(DOCUMENT_PREAMBLE);

    for (page_index, page) in blocks.chunks(CARDS_PER_PAGE).enumerate() {
        doc.push_str("\n#grid(\n");
        doc.push_str("  columns: 2,\n");
        doc.push_str("  rows: 2,\n");
        doc.push_str("  column-gutter: card-gap,\n");
        doc.push_str("  row-gutter: card-gap,\n");
        doc.push_str("  \n");

        let cards: Vec<String> = page
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let qr = qr_codes
                    .get(page_index * CARDS_PER_PAGE + i)
                    .and_then(|q| q.as_deref());
                render_card(block, images_subdir, qr)
            })
            .collect();
        doc.push_str(&cards.join(",\n"));

        doc.push_str("\n)\n");

        if (page_index + 1) * CARDS_PER_PAGE < blocks.len() {
            doc.push_str("\n#pagebreak()\n");
        }
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inverse of [`escape`] as the typst string-literal lexer would apply
    /// it: a backslash makes the next character literal.
    fn unescape(text: &str) -> String {
        let mut out = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    fn text_block(id: u64, channels: &[&str], content: &str) -> NormalizedBlock {
        NormalizedBlock {
            id,
            channels: channels.iter().map(|c| c.to_string()).collect(),
            author: "casey".to_string(),
            title: None,
            source_url: None,
            body: BlockBody::Text {
                content: content.to_string(),
            },
        }
    }

    fn image_block(id: u64, channels: &[&str], file: &str) -> NormalizedBlock {
        NormalizedBlock {
            id,
            channels: channels.iter().map(|c| c.to_string()).collect(),
            author: "casey".to_string(),
            title: None,
            source_url: None,
            body: BlockBody::Image {
                file: file.to_string(),
            },
        }
    }

    #[test]
    fn test_escape_backslash_first() {
        assert_eq!(escape(r"a\b"), r"a\\b");
        assert_eq!(escape("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape("#tag"), "\\#tag");
    }

    #[test]
    fn test_escape_roundtrips_through_string_lexer() {
        let input = "prefix #\"\\ suffix";
        assert_eq!(unescape(&escape(input)), input);
    }

    #[test]
    fn test_truncate_url_at_exact_boundary() {
        let url = "x".repeat(80);
        assert_eq!(truncate_url(&url, MAX_URL_DISPLAY), url);
    }

    #[test]
    fn test_truncate_url_past_boundary() {
        let url = "x".repeat(81);
        let display = truncate_url(&url, MAX_URL_DISPLAY);
        assert_eq!(display.chars().count(), 83);
        assert!(display.ends_with("..."));
        assert_eq!(&display[..80], &url[..80]);
    }

    #[test]
    fn test_convert_heading_tiers() {
        assert_eq!(
            convert_content("# Top"),
            "      #text(weight: \"bold\", size: 13pt)[Top]"
        );
        assert_eq!(
            convert_content("## Middle"),
            "      #text(weight: \"bold\", size: 12pt)[Middle]"
        );
        assert_eq!(
            convert_content("### Small"),
            "      #text(weight: \"bold\", size: 11pt)[Small]"
        );
    }

    #[test]
    fn test_convert_heading_text_is_escaped() {
        assert_eq!(
            convert_content("# A #1 \"thing\""),
            "      #text(weight: \"bold\", size: 13pt)[A \\#1 \\\"thing\\\"]"
        );
    }

    #[test]
    fn test_convert_plain_lines_get_breaks() {
        assert_eq!(
            convert_content("A\nB"),
            "      A\n      #linebreak()\n      B"
        );
    }

    #[test]
    fn test_convert_suppresses_break_before_list_item() {
        // break between A and B, none between B and the list item
        assert_eq!(
            convert_content("A\nB\n- item"),
            "      A\n      #linebreak()\n      B\n      - item"
        );
    }

    #[test]
    fn test_convert_suppresses_break_before_blank_line() {
        assert_eq!(convert_content("A\n\nB"), "      A\n\n      B");
    }

    #[test]
    fn test_convert_list_items_have_no_breaks() {
        assert_eq!(
            convert_content("- one\n* two"),
            "      - one\n      * two"
        );
    }

    #[test]
    fn test_convert_escapes_plain_lines() {
        assert_eq!(convert_content("see #4"), "      see \\#4");
    }

    #[test]
    fn test_convert_empty_content() {
        assert_eq!(convert_content(""), "");
    }

    #[test]
    fn test_card_title_present_and_escaped() {
        let mut block = text_block(1, &["A"], "hello");
        block.title = Some("Tools \"R\" Us".to_string());

        let card = render_card(&block, "images", None);
        assert!(card.contains("    title: \"Tools \\\"R\\\" Us\","));
    }

    #[test]
    fn test_card_without_title_has_no_title_line() {
        let card = render_card(&text_block(1, &["A"], "hello"), "images", None);
        assert!(!card.contains("title:"));
    }

    #[test]
    fn test_card_image_path_is_directory_prefixed() {
        let card = render_card(&image_block(7, &["A"], "7.png"), "images", None);
        assert!(card.contains("    img-path: \"images/7.png\","));
        assert!(!card.contains("content:"));
    }

    #[test]
    fn test_card_text_content_block() {
        let card = render_card(&text_block(1, &["A"], "hello"), "images", None);
        assert!(card.contains("    content: [\n      hello\n    ],"));
        assert!(!card.contains("img-path:"));
    }

    #[test]
    fn test_card_source_url_emits_both_fields() {
        let mut block = text_block(1, &["A"], "hello");
        block.source_url = Some("https://example.com/a".to_string());

        let card = render_card(&block, "images", None);
        assert!(card.contains("    source-url: \"https://example.com/a\","));
        assert!(card.contains("    source-url-display: \"https://example.com/a\","));
    }

    #[test]
    fn test_card_long_source_url_display_is_truncated() {
        let url = format!("https://example.com/{}", "p".repeat(80));
        let mut block = text_block(1, &["A"], "hello");
        block.source_url = Some(url.clone());

        let card = render_card(&block, "images", None);
        assert!(card.contains(&format!("    source-url: \"{url}\",")));
        assert!(card.contains("...\","));
    }

    #[test]
    fn test_card_single_channel_keeps_trailing_separator() {
        let card = render_card(&text_block(1, &["Reading"], "x"), "images", None);
        assert!(card.contains("    channels: (\"Reading\",),"));
    }

    #[test]
    fn test_card_multiple_channels_have_no_trailing_separator() {
        let card = render_card(&text_block(1, &["A", "B"], "x"), "images", None);
        assert!(card.contains("    channels: (\"A\", \"B\"),"));
    }

    #[test]
    fn test_card_qr_code_line() {
        let card = render_card(&text_block(1, &["A"], "x"), "images", Some("qrcodes/1.png"));
        assert!(card.contains("    qr-code: \"qrcodes/1.png\","));
    }

    #[test]
    fn test_card_without_qr_code_has_no_line() {
        let card = render_card(&text_block(1, &["A"], "x"), "images", None);
        assert!(!card.contains("qr-code:"));
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 0);
        assert_eq!(page_count(4), 1);
        assert_eq!(page_count(5), 2);
        assert_eq!(page_count(8), 2);
    }

    #[test]
    fn test_document_five_blocks_two_pages_one_break() {
        // 2 image cards and 3 text cards: 4 + 1 grids, one break between.
        let blocks = vec![
            image_block(1, &["A"], "1.png"),
            image_block(2, &["A"], "2.jpg"),
            text_block(3, &["B"], "three"),
            text_block(4, &["B"], "four"),
            text_block(5, &["A", "B"], "five"),
        ];
        let qr_codes = vec![None; blocks.len()];

        let doc = render_document(&blocks, "images", &qr_codes);

        assert_eq!(doc.matches("#grid(\n  columns: 2,").count(), 2);
        assert_eq!(doc.matches("#pagebreak()").count(), 1);
        // the break sits between the grids, never after the last
        let break_pos = doc.find("#pagebreak()").unwrap();
        let last_grid_pos = doc.rfind("#grid(\n  columns: 2,").unwrap();
        assert!(break_pos < last_grid_pos);
        assert!(doc.trim_end().ends_with(')'));
    }

    #[test]
    fn test_document_exact_page_has_no_break() {
        let blocks = vec![
            text_block(1, &["A"], "one"),
            text_block(2, &["A"], "two"),
            text_block(3, &["A"], "three"),
            text_block(4, &["A"], "four"),
        ];
        let doc = render_document(&blocks, "images", &[None, None, None, None]);

        assert_eq!(doc.matches("#grid(\n  columns: 2,").count(), 1);
        assert!(!doc.contains("#pagebreak()"));
    }

    #[test]
    fn test_document_empty_is_just_the_preamble() {
        let doc = render_document(&[], "images", &[]);
        assert!(doc.contains("#let card("));
        assert!(!doc.contains("\n#grid("));
    }

    #[test]
    fn test_document_includes_preamble_and_template() {
        let blocks = vec![text_block(1, &["A"], "one")];
        let doc = render_document(&blocks, "images", &[None]);

        assert!(doc.starts_with("// generated cards from are.na data"));
        assert!(doc.contains("#set page("));
        assert!(doc.contains("#let card-width = 3.5in"));
        assert!(doc.contains("scaling: \"pixelated\""));
    }

    #[test]
    fn test_document_qr_codes_follow_block_order() {
        let blocks = vec![
            text_block(1, &["A"], "one"),
            text_block(2, &["A"], "two"),
        ];
        let qr_codes = vec![Some("qrcodes/1.png".to_string()), None];

        let doc = render_document(&blocks, "images", &qr_codes);
        // exactly one card argument; the template's `qr-code: none` default
        // does not count
        assert!(doc.contains("qr-code: \"qrcodes/1.png\""));
        assert_eq!(doc.matches("qr-code: \"").count(), 1);
    }
}
