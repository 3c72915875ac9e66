//! Code lines: declarations that bind the documentation above them.
//!
//! The doc blocks above a function line, say, are modified to carry
//! type=FUNCTION plus the name and signature parsed from the declaration.
//! Recognition is shape-based only; this is not a vimscript parser.

use regex::Regex;
use std::sync::LazyLock;

use crate::block::{Block, BlockType, TypeState};
use crate::error::ParseError;

static RE_BLANK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*$").unwrap());

static RE_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*fu(?:n|nc|nct|ncti|nctio|nction)?(?:\s*!\s*|\s+)",
        r"((?:[a-zA-Z_][a-zA-Z0-9_]*#)+)?",
        r"([a-zA-Z_][a-zA-Z0-9_]*)",
        r"\s*\(([^)]*)\)"
    ))
    .unwrap()
});

static RE_FUNCTION_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-zA-Z_][a-zA-Z0-9_]*|\.\.\.)").unwrap());

static RE_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*com(?:m|ma|man|mand)?(?:\s*!\s*|\s+)",
        r"((?:-\S+\s*)*)",
        r"([a-zA-Z_][a-zA-Z0-9_]*)"
    ))
    .unwrap()
});

static RE_SETTING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*let\s+g:([a-zA-Z_][a-zA-Z0-9_{}\[\].]*)").unwrap());

static RE_FLAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*call?\s*.*\.Flag\(",
        // Single-quoted name ('' escapes a quote) or double-quoted name
        // (backslash escapes anything).
        r"(?:'((?:[^']|'')*)'|",
        r#""((?:[^\\"]|\\.)*)")"#,
        r",\s*",
        // Optional default value, tolerating one level of balanced parens.
        r"(?:((?:[^()]|\([^()]+\))+?)\s*\))?"
    ))
    .unwrap()
});

/// A classified line of code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeLine {
    Blank,
    EndOfFile,
    /// A code line that doesn't deserve documentation.
    Unrecognized,
    Function {
        name: String,
        namespace: Option<String>,
        args: Vec<String>,
    },
    Command {
        name: String,
        bang: bool,
        range: bool,
        count: bool,
        register: bool,
        buffer: bool,
    },
    Setting {
        name: String,
    },
    Flag {
        name: String,
        default: Option<String>,
    },
}

/// Classifies one line of code.
pub fn parse_code_line(line: &str) -> CodeLine {
    if RE_BLANK.is_match(line) {
        return CodeLine::Blank;
    }
    if let Some(caps) = RE_FUNCTION.captures(line) {
        return CodeLine::Function {
            name: caps[2].to_string(),
            namespace: caps.get(1).map(|m| m.as_str().to_string()),
            args: RE_FUNCTION_ARG
                .find_iter(&caps[3])
                .map(|m| m.as_str().to_string())
                .collect(),
        };
    }
    if let Some(caps) = RE_COMMAND.captures(line) {
        let flags = &caps[1];
        return CodeLine::Command {
            name: caps[2].to_string(),
            bang: flags.contains("-bang"),
            range: flags.contains("-range"),
            count: flags.contains("-count"),
            register: flags.contains("-register"),
            buffer: flags.contains("-buffer"),
        };
    }
    if let Some(caps) = RE_SETTING.captures(line) {
        return CodeLine::Setting {
            name: format!("g:{}", &caps[1]),
        };
    }
    if let Some(caps) = RE_FLAG.captures(line) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        return CodeLine::Flag {
            name,
            default: caps.get(3).map(|m| m.as_str().to_string()),
        };
    }
    CodeLine::Unrecognized
}

impl CodeLine {
    /// Affects all blocks above the code line and unselects them: once the
    /// documentation hits a code line, the blocks are done.
    ///
    /// Returns the blocks that are ready to be closed. Documentation above
    /// unrecognized code is discarded without error.
    pub fn affect(
        &self,
        blocks: &mut Vec<Block>,
        selection: &mut Vec<usize>,
    ) -> Result<Vec<Block>, ParseError> {
        if let CodeLine::Unrecognized = self {
            blocks.clear();
            selection.clear();
            return Ok(Vec::new());
        }
        if let CodeLine::Flag {
            default: Some(default),
            ..
        } = self
        {
            // Show the default value expression. An unbulleted list keeps
            // it on its own line; the backtick avoids helpfile syntax
            // highlighting.
            if blocks.is_empty() {
                blocks.push(Block::new());
            }
            if let Some(last) = blocks.last_mut() {
                last.add_line(&format!(" - Default: {} `", default));
            }
        }
        for block in blocks.iter_mut() {
            self.update(block)?;
        }
        selection.clear();
        Ok(std::mem::take(blocks))
    }

    fn update(&self, block: &mut Block) -> Result<(), ParseError> {
        match self {
            CodeLine::Blank | CodeLine::EndOfFile | CodeLine::Unrecognized => Ok(()),
            CodeLine::Function {
                name,
                namespace,
                args,
            } => {
                block.set_type(TypeState::Typed(BlockType::Function))?;
                block.set_name(name)?;
                if let Some(namespace) = namespace {
                    block.set_namespace(namespace)?;
                }
                block.set_args(args.clone())
            }
            CodeLine::Command {
                name,
                bang,
                range,
                count,
                register,
                buffer,
            } => {
                block.set_type(TypeState::Typed(BlockType::Command))?;
                block.set_name(name)?;
                // Usage is like [range][count]["x][N]MyCommand[!].
                let mut head = String::new();
                if *range {
                    head.push_str("[range]");
                }
                if *count {
                    head.push_str("[count]");
                }
                if *register {
                    head.push_str("[\"x]");
                }
                if *buffer {
                    head.push_str("[N]");
                }
                head.push_str("<>");
                if *bang {
                    head.push_str("[!]");
                }
                block.set_head(&head)
            }
            CodeLine::Setting { name } => {
                block.set_type(TypeState::Typed(BlockType::Setting))?;
                block.set_name(name)
            }
            CodeLine::Flag { name, .. } => {
                block.set_type(TypeState::Typed(BlockType::Flag))?;
                block.set_name(name)
            }
        }
    }
}
