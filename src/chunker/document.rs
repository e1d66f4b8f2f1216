use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};

use super::Chunker;
use crate::models::{Chunk, DocChunk, InputDocument};

const MIN_CHUNK_CHARS: usize = 5;

/// Chunks prose/Markdown documents into top-level-block (or paragraph,
/// for plain text) sized units.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentChunker;

impl Chunker for DocumentChunker {
    fn process(&self, doc: &InputDocument, max_chars: usize) -> Vec<Chunk> {
        let is_markdown = doc.filepath.to_lowercase().ends_with(".md");
        let candidates = if is_markdown {
            chunk_markdown(&doc.content, max_chars)
        } else {
            chunk_plain_text(&doc.content, max_chars)
        };

        candidates
            .into_iter()
            .filter(|t| t.trim().chars().count() >= MIN_CHUNK_CHARS)
            .enumerate()
            .map(|(ordinal, text)| {
                Chunk::Doc(DocChunk {
                    id: format!("{}_chunk_{}", doc.filepath, ordinal),
                    text,
                    source: doc.filepath.clone(),
                    content_hash: doc.content_hash.clone(),
                    node_type: None,
                    parent_scope: None,
                    line_range: None,
                })
            })
            .collect()
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".md", ".txt"]
    }
}

struct TopBlock {
    start: usize,
    end: usize,
    is_fence: bool,
}

/// Walk the CommonMark event stream and collect only blocks at nesting
/// depth 0, tagging which ones are fenced code blocks.
fn top_level_blocks(text: &str) -> Vec<TopBlock> {
    let mut blocks = Vec::new();
    let mut depth: i32 = 0;
    let mut cur_start: Option<usize> = None;
    let mut cur_is_fence = false;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    cur_start = Some(range.start);
                    cur_is_fence = matches!(tag, Tag::CodeBlock(CodeBlockKind::Fenced(_)));
                }
                depth += 1;
            }
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = cur_start.take() {
                        blocks.push(TopBlock {
                            start,
                            end: range.end,
                            is_fence: cur_is_fence,
                        });
                    }
                }
            }
            Event::Rule if depth == 0 => blocks.push(TopBlock {
                start: range.start,
                end: range.end,
                is_fence: false,
            }),
            Event::Html(_) if depth == 0 => blocks.push(TopBlock {
                start: range.start,
                end: range.end,
                is_fence: false,
            }),
            _ => {}
        }
    }

    blocks
}

fn chunk_markdown(text: &str, max_chars: usize) -> Vec<String> {
    let blocks = top_level_blocks(text);
    let mut out = Vec::new();
    let mut buffer = String::new();

    for block in blocks {
        let raw = text[block.start..block.end].trim();

        if block.is_fence {
            if !buffer.is_empty() {
                out.push(std::mem::take(&mut buffer));
            }
            out.push(raw.to_string());
            continue;
        }

        if !buffer.is_empty() && buffer.chars().count() + raw.chars().count() > max_chars {
            out.push(std::mem::take(&mut buffer));
        }

        if buffer.is_empty() {
            buffer.push_str(raw);
        } else {
            buffer.push_str("\n\n");
            buffer.push_str(raw);
        }
    }

    if !buffer.is_empty() {
        out.push(buffer.trim().to_string());
    }

    out
}

fn chunk_plain_text(text: &str, max_chars: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text.split("\n\n").filter(|p| !p.trim().is_empty()).collect();
    let mut out = Vec::new();
    let mut buffer = String::new();

    for para in paragraphs {
        let para = para.trim();
        if !buffer.is_empty() && buffer.chars().count() + para.chars().count() > max_chars {
            out.push(std::mem::take(&mut buffer));
        }

        if buffer.is_empty() {
            buffer.push_str(para);
        } else {
            buffer.push_str("\n\n");
            buffer.push_str(para);
        }
    }

    if !buffer.is_empty() {
        out.push(buffer.trim().to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(filepath: &str, content: &str) -> InputDocument {
        InputDocument::new(filepath, content.to_string())
    }

    #[test]
    fn fenced_code_block_is_atomic_even_if_oversized() {
        let content = "# Title\n\n```rust\nfn very_long_function_name_that_exceeds_the_budget() {}\n```\n";
        let d = doc("a.md", content);
        let chunks = DocumentChunker.process(&d, 10);
        assert!(chunks.iter().any(|c| c.text().contains("```rust")));
    }

    #[test]
    fn chunk_ids_are_sequential_over_filtered_output() {
        let content = "# Heading one\n\nSome real paragraph text here.\n\nAnother paragraph with content.\n";
        let d = doc("notes.md", content);
        let chunks = DocumentChunker.process(&d, 40);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.id(), format!("notes.md_chunk_{i}"));
        }
    }

    #[test]
    fn short_fragments_are_filtered_out() {
        let content = "Hi\n\nThis paragraph is long enough to survive the minimum length filter.\n";
        let d = doc("a.txt", content);
        let chunks = DocumentChunker.process(&d, 200);
        assert!(chunks.iter().all(|c| c.text().trim().chars().count() >= MIN_CHUNK_CHARS));
    }

    #[test]
    fn empty_document_yields_zero_chunks() {
        let d = doc("empty.txt", "   \n\n  ");
        let chunks = DocumentChunker.process(&d, 100);
        assert!(chunks.is_empty());
    }

    #[test]
    fn indented_code_block_is_accumulated_not_atomic() {
        let content = "Intro text here.\n\n    indented_code_line();\n\nOutro text here.\n";
        let d = doc("a.md", content);
        let chunks = DocumentChunker.process(&d, 1000);
        assert_eq!(chunks.len(), 1, "indented code must merge with surrounding prose, unlike a fence");
        assert!(chunks[0].text().contains("indented_code_line"));
        assert!(chunks[0].text().contains("Intro text"));
        assert!(chunks[0].text().contains("Outro text"));
    }

    #[test]
    fn emitted_chunks_have_no_leading_or_trailing_whitespace() {
        let content = "# Title\n\nhello world, this is a real paragraph.\n\n```rust\nfn f() {}\n```\n";
        let d = doc("a.md", content);
        let chunks = DocumentChunker.process(&d, 1000);
        for c in &chunks {
            let text = c.text();
            assert_eq!(text, text.trim(), "chunk text must already be trimmed");
        }
    }
}
