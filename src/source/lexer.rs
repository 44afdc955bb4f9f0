//! Lexer: source text to cells
//!
//! Four passes, each a plain function so they can be tested in isolation:
//!
//! 1. [`merge_continuations`] joins lines ending with an escaped newline
//! 2. [`detect_fences`] groups fenced blocks into [`Fenced`] tokens
//! 3. [`split_cells`] cuts the token stream on the format's split sequence
//! 4. [`classify`] picks the frontmatter and turns raw cells into doc/code cells

use tracing::{debug, warn};

use super::escape;
use super::format::SourceFormat;
use super::reader::SourceText;
use crate::domain::cell::{Block, Cell, CellsStream, Fenced, Line};
use crate::domain::tags::{DIRECTIVE_KIND, DIRECTIVE_PREAMBLE, DIRECTIVE_SUFFIX};
use crate::domain::Location;

const FRONTMATTER_DELIMITER: &str = "---";

/// Lexer output
#[derive(Debug, Clone, Default)]
pub struct Lexed {
    pub cells: CellsStream,
    pub frontmatter: Option<Cell>,
}

/// Runs every pass over a text source
pub fn lex(source: &SourceText) -> Lexed {
    let format = source.format();
    let merged = merge_continuations(source.lines(), format.escape);
    let tokens = detect_fences(merged, format, &source.location());
    let raw = split_cells(tokens, &format.cells_split);
    let lexed = classify(raw, format.frontmatter);
    debug!(
        source = source.name(),
        cells = lexed.cells.len(),
        frontmatter = lexed.frontmatter.is_some(),
        "lexed source"
    );
    lexed
}

/// Joins continued lines; the index is the first physical line's
pub fn merge_continuations<S: AsRef<str>>(lines: &[S], escape: char) -> Vec<(usize, String)> {
    let mut merged: Vec<(usize, String)> = Vec::new();
    let mut drop = 0;
    for (idx, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        match merged.last_mut() {
            Some((_, text)) if drop > 0 => {
                text.truncate(text.len() - drop);
                text.push_str(line);
            }
            _ => merged.push((idx, line.to_string())),
        }
        drop = merged
            .last()
            .map(|(_, text)| escape::continuation_len(text, escape))
            .unwrap_or(0);
    }
    merged
}

/// Groups fenced blocks
///
/// An unterminated block at the end of the source is still emitted, marked
/// as not closed.
pub fn detect_fences(
    merged: Vec<(usize, String)>,
    format: &SourceFormat,
    source: &Location,
) -> Vec<Block> {
    struct Open {
        idx: usize,
        closing: String,
        kind: Option<String>,
        lines: Vec<Line>,
    }

    let mut tokens = Vec::new();
    let mut open: Option<Open> = None;
    for (idx, text) in merged {
        let line = Line::new(idx, text, source);
        match open.as_mut() {
            None => match format.fence_check(line.content.trim()) {
                Some((closing, kind)) => {
                    open = Some(Open {
                        idx,
                        closing,
                        kind,
                        lines: vec![line],
                    })
                }
                None => tokens.push(Block::Line(line)),
            },
            Some(block) => {
                let closes = line.content.trim() == block.closing;
                block.lines.push(line);
                if closes {
                    if let Some(block) = open.take() {
                        tokens.push(Block::Fenced(Fenced::new(
                            block.idx, block.kind, block.lines, true, source,
                        )));
                    }
                }
            }
        }
    }

    if let Some(block) = open {
        warn!(
            location = %source.child(block.idx),
            "fenced block is not terminated"
        );
        tokens.push(Block::Fenced(Fenced::new(
            block.idx,
            block.kind,
            block.lines,
            false,
            source,
        )));
    }
    tokens
}

/// Length of the split sequence starting at `offset`, if there is one
fn split_ahead(tokens: &[Block], offset: usize, split: &[String]) -> Option<usize> {
    if split.is_empty() || offset + split.len() > tokens.len() {
        return None;
    }
    let matches = tokens[offset..offset + split.len()]
        .iter()
        .zip(split)
        .all(|(token, expected)| match token {
            Block::Line(line) => line.content.trim() == expected,
            Block::Fenced(_) => false,
        });
    matches.then_some(split.len())
}

/// Cuts the token stream into raw cells
pub fn split_cells(tokens: Vec<Block>, split: &[String]) -> Vec<Cell> {
    let mut cells = Vec::new();
    let mut current: Vec<Block> = Vec::new();
    let mut skip = 0;

    for i in 0..tokens.len() {
        if skip > 0 {
            skip -= 1;
            continue;
        }
        if let Some(len) = split_ahead(&tokens, i, split) {
            if !current.is_empty() {
                cells.push(raw_cell(std::mem::take(&mut current)));
            }
            skip = len - 1;
            continue;
        }
        current.push(tokens[i].clone());
    }
    if !current.is_empty() {
        cells.push(raw_cell(current));
    }
    cells
}

fn raw_cell(content: Vec<Block>) -> Cell {
    let location = content
        .first()
        .map(|b| b.location().clone())
        .unwrap_or_default();
    Cell::raw(content, location)
}

/// True for fenced blocks carrying directives
pub fn is_directive(fenced: &Fenced) -> bool {
    if let Some(kind) = &fenced.kind {
        if kind == DIRECTIVE_KIND || kind.ends_with(DIRECTIVE_SUFFIX) {
            return true;
        }
    }
    fenced
        .lines
        .get(1)
        .is_some_and(|line| line.content.starts_with(DIRECTIVE_PREAMBLE))
}

fn is_frontmatter(cell: &Cell) -> bool {
    cell.content()
        .iter()
        .find(|b| !b.is_blank_line())
        .is_some_and(|b| matches!(b, Block::Line(line) if line.content.trim() == FRONTMATTER_DELIMITER))
}

/// Picks the frontmatter and classifies the remaining raw cells
///
/// A raw cell reducing to a single directive block (blank lines aside) is a
/// code cell. Anything else is cut around its directive blocks into doc and
/// code cells; doc groups with blank lines only are dropped.
pub fn classify(raw: Vec<Cell>, frontmatter_enabled: bool) -> Lexed {
    let mut raw = raw.into_iter().peekable();
    let mut frontmatter = None;
    if frontmatter_enabled && raw.len() > 1 {
        if let Some(first) = raw.next_if(is_frontmatter) {
            frontmatter = Some(first);
        }
    }

    let mut cells = Vec::new();
    for cell in raw {
        let stripped: Vec<&Block> = cell.content().iter().filter(|b| !b.is_blank_line()).collect();
        if let [Block::Fenced(fenced)] = stripped.as_slice() {
            if is_directive(fenced) {
                cells.push(code_cell(fenced));
                continue;
            }
        }
        split_raw_cell(&cell, &mut cells);
    }

    Lexed {
        cells: CellsStream::new(cells),
        frontmatter,
    }
}

fn code_cell(fenced: &Fenced) -> Cell {
    Cell::code(vec![Block::Fenced(fenced.clone())], fenced.location.clone())
}

fn flush_doc(doc: &mut Vec<Block>, cells: &mut Vec<Cell>) {
    let content = std::mem::take(doc);
    if content.iter().all(Block::is_blank_line) {
        return;
    }
    let location = content[0].location().clone();
    cells.push(Cell::doc(content, location));
}

fn split_raw_cell(cell: &Cell, cells: &mut Vec<Cell>) {
    let mut doc = Vec::new();
    for block in cell.content() {
        match block {
            Block::Fenced(fenced) if is_directive(fenced) => {
                flush_doc(&mut doc, cells);
                cells.push(code_cell(fenced));
            }
            other => doc.push(other.clone()),
        }
    }
    flush_doc(&mut doc, cells);
}
