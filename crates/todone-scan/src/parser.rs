use std::fmt;

use todone_core::{EnrichmentUnit, TodoneError};

/// Line printed by the search tool between non-adjacent groups of lines.
pub const BLOCK_SEPARATOR: &str = "--";

/// Field separator following file and line number on a match line.
const MATCH_SEPARATOR: u8 = b':';

/// Field separator following file and line number on a context line.
const CONTEXT_SEPARATOR: u8 = b'-';

/// Whether a search output line is an actual match or surrounding context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// The line contains the search pattern.
    Match,
    /// The line was printed only to give context.
    Context,
}

/// A single classified line of search tool output.
///
/// # Examples
///
/// ```
/// use todone_scan::parser::{LineKind, RawLine};
///
/// let line = RawLine::parse("src/lib.rs:42:    // TODO: cache this").unwrap();
/// assert_eq!(line.kind, LineKind::Match);
/// assert_eq!(line.file, "src/lib.rs");
/// assert_eq!(line.line_number, 42);
/// assert_eq!(line.text, "// TODO: cache this");
///
/// let ctx = RawLine::parse("src/lib.rs-43-    fn load() {").unwrap();
/// assert_eq!(ctx.kind, LineKind::Context);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Match or context.
    pub kind: LineKind,
    /// File path as printed by the tool.
    pub file: String,
    /// 1-based line number.
    pub line_number: u32,
    /// Line content with surrounding whitespace trimmed.
    pub text: String,
}

impl RawLine {
    /// Classify and split one line of `rg --line-number --no-heading` output.
    ///
    /// A line on its own is ambiguous when the file name contains `-digits-`
    /// or the text contains `:digits:`. The earliest `:digits:` run wins,
    /// then the earliest `-digits-` run. [`split_blocks`] settles the file
    /// name per block instead, which also handles context lines whose text
    /// looks like a match.
    ///
    /// # Errors
    ///
    /// Returns [`TodoneError::Parse`] if neither shape is present or the line
    /// number is zero or out of range.
    pub fn parse(line: &str) -> Result<Self, TodoneError> {
        let splits = find_splits(line);
        let split = splits
            .iter()
            .find(|s| s.kind == LineKind::Match)
            .or_else(|| splits.first())
            .copied()
            .ok_or_else(|| TodoneError::Parse(format!("unexpected search output: {line}")))?;
        Self::from_split(line, split)
    }

    fn from_split(line: &str, split: Split) -> Result<Self, TodoneError> {
        let digits = &line[split.first + 1..split.second];
        let line_number: u32 = digits.parse().map_err(|_| {
            TodoneError::Parse(format!("invalid line number `{digits}` in: {line}"))
        })?;
        if line_number == 0 {
            return Err(TodoneError::Parse(format!(
                "line number must be positive in: {line}"
            )));
        }

        Ok(Self {
            kind: split.kind,
            file: line[..split.first].to_string(),
            line_number,
            text: line[split.second + 1..].trim().to_string(),
        })
    }

    /// Returns `true` for match lines.
    pub fn is_match(&self) -> bool {
        self.kind == LineKind::Match
    }
}

impl fmt::Display for RawLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = match self.kind {
            LineKind::Match => MATCH_SEPARATOR,
            LineKind::Context => CONTEXT_SEPARATOR,
        } as char;
        write!(f, "{}{sep}{}{sep}{}", self.file, self.line_number, self.text)
    }
}

/// One way to read a line: `file SEP digits SEP text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Split {
    kind: LineKind,
    /// Offset of the separator ending the file name.
    first: usize,
    /// Offset of the separator starting the text.
    second: usize,
}

/// Every `sep digits sep` run with a non-empty prefix, earliest first.
fn find_splits(line: &str) -> Vec<Split> {
    let bytes = line.as_bytes();
    let mut splits = Vec::new();
    for (i, &b) in bytes.iter().enumerate() {
        let kind = match b {
            MATCH_SEPARATOR => LineKind::Match,
            CONTEXT_SEPARATOR => LineKind::Context,
            _ => continue,
        };
        if i == 0 {
            continue;
        }
        let digits = bytes[i + 1..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count();
        let end = i + 1 + digits;
        if digits > 0 && bytes.get(end) == Some(&b) {
            splits.push(Split {
                kind,
                first: i,
                second: end,
            });
        }
    }
    splits
}

/// The file name every line of a block agrees on.
///
/// The search tool prints one file per block, so the real name is a prefix
/// every line can be split at. A shared prefix that yields a match line wins
/// over one that does not, then the shortest.
fn shared_file<'a>(lines: &[&'a str], splits: &[Vec<Split>]) -> Option<&'a str> {
    let first_line = *lines.first()?;
    let rows = || lines.iter().zip(splits);

    let shared: Vec<&'a str> = splits
        .first()?
        .iter()
        .map(|s| &first_line[..s.first])
        .filter(|prefix| rows().all(|(line, c)| split_at_prefix(line, c, prefix).is_some()))
        .collect();

    shared
        .iter()
        .copied()
        .find(|prefix| {
            rows().any(|(line, c)| {
                split_at_prefix(line, c, prefix).is_some_and(|s| s.kind == LineKind::Match)
            })
        })
        .or_else(|| shared.first().copied())
}

fn split_at_prefix(line: &str, candidates: &[Split], prefix: &str) -> Option<Split> {
    candidates
        .iter()
        .find(|s| &line[..s.first] == prefix)
        .copied()
}

/// Classify the lines of one block using the file name they share.
///
/// Lines that share no file name, as when the tool runs without context and
/// prints no separators, are classified one by one.
fn resolve_block(lines: &[&str]) -> Result<ContextBlock, TodoneError> {
    let splits: Vec<Vec<Split>> = lines.iter().map(|line| find_splits(line)).collect();
    let file = shared_file(lines, &splits);

    let mut block = ContextBlock::default();
    for (line, candidates) in lines.iter().zip(&splits) {
        let split = file.and_then(|file| split_at_prefix(line, candidates, file));
        let raw = match split {
            Some(split) => RawLine::from_split(line, split)?,
            None => RawLine::parse(line)?,
        };
        block.push(raw);
    }
    Ok(block)
}

/// A contiguous group of output lines around one or more matches.
///
/// # Examples
///
/// ```
/// use todone_scan::parser::{ContextBlock, RawLine};
///
/// let mut block = ContextBlock::default();
/// block.push(RawLine::parse("a.go-1-x()").unwrap());
/// block.push(RawLine::parse("a.go:2:// TODO y").unwrap());
/// assert_eq!(block.context(), vec!["x()", "// TODO y"]);
/// assert_eq!(block.into_units("repo").len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBlock {
    lines: Vec<RawLine>,
}

impl ContextBlock {
    /// Append a line in emission order.
    pub fn push(&mut self, line: RawLine) {
        self.lines.push(line);
    }

    /// Returns `true` if no lines were pushed.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The classified lines of this block.
    pub fn lines(&self) -> &[RawLine] {
        &self.lines
    }

    /// Returns `true` if at least one line is a match.
    pub fn has_match(&self) -> bool {
        self.lines.iter().any(RawLine::is_match)
    }

    /// Text of every line, match or context, in emission order.
    pub fn context(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.text.clone()).collect()
    }

    /// One unit per match line, each carrying the whole block as context.
    ///
    /// A block without matches yields nothing.
    pub fn into_units(self, repo_name: &str) -> Vec<EnrichmentUnit> {
        if !self.has_match() {
            return Vec::new();
        }
        let context = self.context();
        self.lines
            .into_iter()
            .filter(RawLine::is_match)
            .map(|line| EnrichmentUnit {
                repo_name: repo_name.to_string(),
                file: line.file,
                line_number: line.line_number,
                match_text: line.text,
                context_lines: context.clone(),
            })
            .collect()
    }
}

/// Split search output into classified blocks.
///
/// Blank lines are ignored; a line equal to [`BLOCK_SEPARATOR`] closes the
/// current block. Empty blocks are never returned. Each block's file name is
/// settled across all of its lines before they are classified.
///
/// # Errors
///
/// Returns [`TodoneError::Parse`] on the first line of unexpected shape.
pub fn split_blocks(output: &str) -> Result<Vec<ContextBlock>, TodoneError> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line == BLOCK_SEPARATOR {
            flush_block(&mut blocks, &mut current)?;
            continue;
        }
        current.push(line);
    }
    flush_block(&mut blocks, &mut current)?;

    Ok(blocks)
}

fn flush_block(
    blocks: &mut Vec<ContextBlock>,
    current: &mut Vec<&str>,
) -> Result<(), TodoneError> {
    if !current.is_empty() {
        blocks.push(resolve_block(current)?);
        current.clear();
    }
    Ok(())
}

/// Parse the full output of one search over `repo_name` into enrichment units.
///
/// Units come out in the tool's emission order.
///
/// # Errors
///
/// Returns [`TodoneError::Parse`] if any line has an unexpected shape.
///
/// # Examples
///
/// ```
/// use todone_scan::parser::parse_search_output;
///
/// let units = parse_search_output("api", "").unwrap();
/// assert!(units.is_empty());
/// ```
pub fn parse_search_output(
    repo_name: &str,
    output: &str,
) -> Result<Vec<EnrichmentUnit>, TodoneError> {
    let blocks = split_blocks(output)?;
    Ok(blocks
        .into_iter()
        .flat_map(|block| block.into_units(repo_name))
        .collect())
}
