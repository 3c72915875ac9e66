//! Line-by-line parser: turns a source file into closed documentation blocks.
//!
//! Continuation lines are joined first, then each line is classified as
//! code or doc comment. Doc lines accumulate into pending blocks; code
//! lines bind and close them (or discard them, for unrecognized code).

pub mod codeline;
pub mod docline;

use regex::Regex;
use std::sync::LazyLock;

use crate::block::Block;
use crate::error::{ParseError, ParseErrorKind};
use codeline::CodeLine;
use docline::DocLine;

static RE_COMMENT_LEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^\s*" ?"#).unwrap());

static RE_VIMDOC_LEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^\s*"" ?"#).unwrap());

static RE_EMPTY_VIMDOC_LEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*""$"#).unwrap());

static RE_LINE_CONTINUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\\").unwrap());

static RE_BLOCK_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*"\s*@([a-zA-Z_][a-zA-Z0-9_]*)(?:\s+|$)(.*)"#).unwrap()
});

/// Whether a line is a comment.
pub fn is_comment(line: &str) -> bool {
    RE_COMMENT_LEADER.is_match(line)
}

/// Strips trailing newlines and joins continuation lines, keeping the line
/// number of each joined line's first physical line.
fn join_continuations(input: &str, filename: &str) -> Result<Vec<(usize, String)>, ParseError> {
    let mut joined: Vec<(usize, String)> = Vec::new();
    for (i, raw) in input.lines().enumerate() {
        if RE_LINE_CONTINUATION.is_match(raw) {
            let rest = RE_LINE_CONTINUATION.replace(raw, "");
            match joined.last_mut() {
                None => {
                    return Err(ParseError::new(ParseErrorKind::CannotContinue(
                        "No preceding line.".to_string(),
                    ))
                    .at(filename, i + 1));
                }
                Some((_, prev)) => {
                    if is_comment(prev) && !is_comment(&rest) {
                        return Err(ParseError::new(ParseErrorKind::CannotContinue(
                            "No comment to continue.".to_string(),
                        ))
                        .at(filename, i + 1));
                    }
                    prev.push_str(&rest);
                }
            }
        } else {
            joined.push((i, raw.to_string()));
        }
    }
    Ok(joined)
}

/// Parses one line of documentation.
fn parse_comment_line(line: &str) -> Result<DocLine, ParseError> {
    if let Some(caps) = RE_BLOCK_DIRECTIVE.captures(line) {
        return Ok(DocLine::Directive(docline::parse_directive(
            &caps[1], &caps[2],
        )?));
    }
    Ok(DocLine::Text(
        RE_COMMENT_LEADER.replace(line, "").into_owned(),
    ))
}

fn handle_code_line(
    line: &str,
    blocks: &mut Vec<Block>,
    selection: &mut Vec<usize>,
    closed: &mut Vec<Block>,
) -> Result<(), ParseError> {
    let code = codeline::parse_code_line(line);
    for mut block in code.affect(blocks, selection)? {
        block.close()?;
        closed.push(block);
    }
    Ok(())
}

/// Parses a whole source file into closed blocks.
///
/// Doc comments open with a `""` leader line and continue through comment
/// lines; the first code line binds the pending blocks. Errors carry the
/// filename and the 1-based number of the offending line.
pub fn parse(input: &str, filename: &str) -> Result<Vec<Block>, ParseError> {
    let mut closed = Vec::new();
    let mut blocks: Vec<Block> = Vec::new();
    let mut selection: Vec<usize> = Vec::new();
    let mut vimdoc_mode = false;
    let mut last_lineno = 0;

    for (lineno, line) in join_continuations(input, filename)? {
        last_lineno = lineno;
        let step = if !vimdoc_mode {
            if RE_VIMDOC_LEADER.is_match(&line) {
                vimdoc_mode = true;
                if RE_EMPTY_VIMDOC_LEADER.is_match(&line) {
                    Ok(())
                } else {
                    // A doc leader with text on the same line; treat the
                    // rest like any other doc comment line.
                    let normalized = RE_VIMDOC_LEADER.replace(&line, "\" ");
                    parse_comment_line(&normalized)
                        .and_then(|doc| doc.affect(&mut blocks, &mut selection))
                }
            } else {
                handle_code_line(&line, &mut blocks, &mut selection, &mut closed)
            }
        } else if !is_comment(&line) {
            vimdoc_mode = false;
            handle_code_line(&line, &mut blocks, &mut selection, &mut closed)
        } else {
            parse_comment_line(&line).and_then(|doc| doc.affect(&mut blocks, &mut selection))
        };
        step.map_err(|e| e.at(filename, lineno + 1))?;
    }

    // The end of the file closes any remaining blocks.
    for mut block in CodeLine::EndOfFile
        .affect(&mut blocks, &mut selection)
        .map_err(|e| e.at(filename, last_lineno + 1))?
    {
        block.close().map_err(|e| e.at(filename, last_lineno + 1))?;
        closed.push(block);
    }
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockType, TypeState};
    use crate::paragraph::Paragraph;

    #[test]
    fn documented_function_produces_block() {
        let input = "\
\"\"
\" Adds {a} to {b}.
function! mylib#Add(a, b) abort
  return a:a + a:b
endfunction
";
        let blocks = parse(input, "autoload/mylib.vim").unwrap();
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.type_state(), TypeState::Typed(BlockType::Function));
        assert_eq!(block.full_name(), "mylib#Add");
        assert_eq!(
            block.locals.usage.as_deref(),
            Some("mylib#Add({a}, {b})")
        );
    }

    #[test]
    fn undocumented_code_is_ignored() {
        let input = "\
function! mylib#Hidden() abort
endfunction
";
        let blocks = parse(input, "a.vim").unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn plain_comments_do_not_document() {
        let input = "\
\" Just a comment, not a doc comment.
function! mylib#Quiet() abort
endfunction
";
        let blocks = parse(input, "a.vim").unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn section_block_closed_by_blank_line() {
        let input = "\
\"\"
\" @section Introduction, intro
\" Welcome to the plugin.

let s:x = 1
";
        let blocks = parse(input, "plugin/a.vim").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].type_state(),
            TypeState::Typed(BlockType::Section)
        );
        assert_eq!(blocks[0].locals.id.as_deref(), Some("intro"));
    }

    #[test]
    fn multiple_usage_blocks_share_locals() {
        let input = "\
\"\"
\" @usage item index
\" Inserts {item} at {index}.
\" @usage item
\" Appends {item}.
function! mylib#Insert(...) abort
endfunction
";
        let blocks = parse(input, "autoload/mylib.vim").unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(!blocks[0].is_secondary());
        assert!(blocks[1].is_secondary());
        assert_eq!(blocks[0].full_name(), "mylib#Insert");
        assert_eq!(blocks[1].full_name(), "mylib#Insert");
        assert_eq!(
            blocks[0].locals.usage.as_deref(),
            Some("mylib#Insert({item}, {index})")
        );
        assert_eq!(
            blocks[1].locals.usage.as_deref(),
            Some("mylib#Insert({item})")
        );
    }

    #[test]
    fn continuation_joins_code_lines() {
        let input = "\
\"\"
\" Runs a command.
command -bang MyCommand
    \\ call mylib#Run()
";
        let blocks = parse(input, "plugin/a.vim").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].type_state(), TypeState::Typed(BlockType::Command));
        assert_eq!(blocks[0].locals.usage.as_deref(), Some(":MyCommand[!]"));
    }

    #[test]
    fn continuation_without_preceding_line_fails() {
        let err = parse("\\ continuation\n", "bad.vim").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::CannotContinue(_)));
        assert_eq!(err.lineno, Some(1));
        assert_eq!(err.filename.as_deref(), Some("bad.vim"));
    }

    #[test]
    fn comment_continued_into_code_fails() {
        let input = "\
\"\"
\" A doc comment
\\ let g:code = 1
";
        let err = parse(input, "bad.vim").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::CannotContinue(_)));
        assert_eq!(err.lineno, Some(3));
    }

    #[test]
    fn bad_directive_reports_position() {
        let input = "\
\"\"
\" @nosuchdirective
";
        let err = parse(input, "plugin/bad.vim").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnrecognizedBlockDirective("nosuchdirective".into())
        );
        assert_eq!(err.filename.as_deref(), Some("plugin/bad.vim"));
        assert_eq!(err.lineno, Some(2));
    }

    #[test]
    fn code_block_kept_verbatim_through_parse() {
        let input = "\
\"\"
\" Example: >
\"   let g:x = [1, 2]
\" <
\" Done.
function! mylib#Example() abort
endfunction
";
        let blocks = parse(input, "autoload/mylib.vim").unwrap();
        let items: Vec<_> = blocks[0].paragraphs.iter().cloned().collect();
        assert_eq!(
            items,
            vec![
                Paragraph::Text("Example:".into()),
                Paragraph::Code(vec!["  let g:x = [1, 2]".into()]),
                Paragraph::Text("Done.".into()),
            ]
        );
    }

    #[test]
    fn file_ends_while_block_pending() {
        let input = "\
\"\"
\" @section About, about
\" The very end.
";
        let blocks = parse(input, "plugin/a.vim").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].locals.id.as_deref(), Some("about"));
    }

    #[test]
    fn exception_function_gets_no_usage() {
        let input = "\
\"\"
\" @exception
\" Raised when things break.
function! mylib#BadThing() abort
endfunction
";
        let blocks = parse(input, "autoload/mylib.vim").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].locals.usage, None);
        assert_eq!(blocks[0].full_name(), "ERROR(BadThing)");
    }
}
