//! Doc comment lines: directives and text, the stuff blocks are made of.
//!
//! A directive line names a directive and carries a raw argument string.
//! Each directive validates its arguments against its own shape and applies
//! a mutation to the selected block(s). Header directives (@usage,
//! @function, @command) additionally split block families so one entity can
//! document several usage variants.

use regex::Regex;
use std::sync::LazyLock;

use crate::block::{Block, BlockType, TypeState};
use crate::error::{ParseError, ParseErrorKind};

// -- Argument shape patterns --------------------------------------------------

static RE_MAYBE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([a-zA-Z_][a-zA-Z0-9_]*)?\s*$").unwrap());

static RE_SECTION_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[^\\,]|\\.)+\S)(?:,\s*([a-zA-Z_-][a-zA-Z0-9_-]*))?$").unwrap()
});

static RE_IDENT_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z_-][a-zA-Z0-9_-]*)").unwrap());

static RE_DICT_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z_][a-zA-Z0-9]*)(?:\.([a-zA-Z_][a-zA-Z0-9_]*))?$").unwrap()
});

static RE_DEFAULT_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\[[a-zA-Z_][a-zA-Z0-9_]*\]|[a-zA-Z_][a-zA-Z0-9_]*)\s*=\s*(.*)$").unwrap()
});

static RE_ORDER_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:\s*[a-zA-Z_][a-zA-Z0-9_-]*)+(?:\s*[+-])?)$").unwrap()
});

static RE_ORDER_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-zA-Z_][a-zA-Z0-9_-]*|[+-])").unwrap());

static RE_THROW_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z_][a-zA-Z0-9_]*)(?:\s+(.*))?$").unwrap());

static RE_VIM_ERROR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^E\d+$").unwrap());

static RE_STYLIZING_ARGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\S+)$").unwrap());

static RE_SETTING_SCOPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]:").unwrap());

static RE_USAGE_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:\s*(?:",
        r"\{(?:[a-zA-Z_][a-zA-Z0-9_]*(?:\.\.\.)?)?\}",
        r"|\[(?:[a-zA-Z_.][a-zA-Z0-9_.]*(?:\.\.\.)?)?\]",
        r"|[a-zA-Z_][a-zA-Z0-9_]*(?:\.\.\.)?",
        r"|\{\]",
        r"))*$"
    ))
    .unwrap()
});

static RE_USAGE_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\{(?:[a-zA-Z_][a-zA-Z0-9_]*(?:\.\.\.)?)?\}",
        r"|\[(?:[a-zA-Z_][a-zA-Z0-9_]*(?:\.\.\.)?)?\]",
        r"|\{\]",
        r"|[a-zA-Z_][a-zA-Z0-9_]*(?:\.\.\.)?"
    ))
    .unwrap()
});

static RE_REQUIRED_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.\.\.)?)\}").unwrap());

static RE_OPTIONAL_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([a-zA-Z_][a-zA-Z0-9_]*(?:\.\.\.)?)\]").unwrap());

static RE_NAMEHOLE_ESCAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<\|(\|*)>").unwrap());

static RE_REQHOLE_ESCAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\|(\|*)\}").unwrap());

static RE_OPTHOLE_ESCAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\|(\|*)\]").unwrap());

static RE_BAD_COMMAS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:, ){2,}").unwrap());

static RE_BAD_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"  +").unwrap());

// -- Delimited argument scanning ----------------------------------------------

/// Whether a match at `[start, end)` stands alone as a word: preceded by
/// whitespace or start-of-string, and not directly followed by a word
/// character ("," and "." are okay).
fn delimited(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .is_none_or(|c| c.is_whitespace());
    let after_ok = text[end..]
        .chars()
        .next()
        .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));
    before_ok && after_ok
}

fn delimited_args(re: &Regex, text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for caps in re.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        if delimited(text, whole.start(), whole.end()) {
            found.push(caps[1].to_string());
        }
    }
    found
}

/// `{name}`-style required argument references standing alone in `text`.
pub fn required_args_in(text: &str) -> Vec<String> {
    delimited_args(&RE_REQUIRED_ARG, text)
}

/// `[name]`-style optional argument references standing alone in `text`.
pub fn optional_args_in(text: &str) -> Vec<String> {
    delimited_args(&RE_OPTIONAL_ARG, text)
}

/// Replaces standalone occurrences of a literal hole like `{}` or `[]`.
fn sub_delimited(text: &str, needle: &str, replacement: &str) -> String {
    let mut out = String::new();
    let mut copied_to = 0;
    let mut search_from = 0;
    while let Some(pos) = text[search_from..].find(needle) {
        let start = search_from + pos;
        let end = start + needle.len();
        if delimited(text, start, end) {
            out.push_str(&text[copied_to..start]);
            out.push_str(replacement);
            copied_to = end;
        }
        search_from = end;
    }
    out.push_str(&text[copied_to..]);
    out
}

/// Removes separators doubled up by empty hole substitutions.
fn strip_bad_separators(text: &str) -> String {
    let text = RE_BAD_COMMAS.replace_all(text, ", ");
    RE_BAD_SPACES.replace_all(&text, " ").into_owned()
}

/// Qualifies a setting name with the global scope if none is given.
pub(crate) fn qualify_setting(name: &str) -> String {
    if RE_SETTING_SCOPE.is_match(name) {
        name.to_string()
    } else {
        format!("g:{}", name)
    }
}

// -- Headers ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// `@usage` — argument list only; the usage shape comes from the block type.
    Usage,
    /// `@function` — free-form usage template, types the block as a function.
    Function,
    /// `@command` — free-form usage template, types the block as a command.
    Command,
}

/// A header directive. Knows how to synthesize the block's usage line.
#[derive(Debug, Clone)]
pub struct Header {
    kind: HeaderKind,
    template: String,
    reqs: Vec<String>,
    opts: Vec<String>,
}

impl Header {
    fn new(kind: HeaderKind, template: &str) -> Self {
        Header {
            kind,
            template: template.to_string(),
            reqs: required_args_in(template),
            opts: optional_args_in(template),
        }
    }

    /// The header used when a function or command has none: all arguments
    /// land in the combined required-then-optional hole.
    pub fn default_usage() -> Self {
        Header::new(HeaderKind::Usage, "{]")
    }

    fn update(&self, block: &mut Block) -> Result<(), ParseError> {
        match self.kind {
            HeaderKind::Usage => Ok(()),
            HeaderKind::Function => block.set_type(TypeState::Typed(BlockType::Function)),
            HeaderKind::Command => block.set_type(TypeState::Typed(BlockType::Command)),
        }
    }

    /// Expands the usage line for a closed block.
    pub fn generate_usage(&self, block: &Block) -> String {
        let is_function = block.type_state() == TypeState::Typed(BlockType::Function);
        let sep = if is_function { ", " } else { " " };
        let template = match self.kind {
            HeaderKind::Usage => {
                // Bare identifiers in @usage are required args.
                let args: Vec<String> = RE_USAGE_ARG
                    .find_iter(&self.template)
                    .map(|m| {
                        let arg = m.as_str();
                        if arg.starts_with(['[', '{']) {
                            arg.to_string()
                        } else {
                            format!("{{{}}}", arg)
                        }
                    })
                    .collect();
                if is_function {
                    // Functions are like MyFunction({req1}, {req2}, [opt1]).
                    format!("<>({})", args.join(", "))
                } else {
                    // Commands are like :[range]MyCommand[!] {req1} [opt1].
                    format!(
                        ":{} {}",
                        block.locals.head.as_deref().unwrap_or("<>"),
                        args.join(" ")
                    )
                }
            }
            _ => self.template.clone(),
        };
        let extra_reqs = block
            .required_args()
            .iter()
            .filter(|r| !self.reqs.contains(r))
            .map(|r| format!("{{{}}}", r))
            .collect::<Vec<_>>()
            .join(sep);
        let extra_opts = block
            .optional_args()
            .iter()
            .filter(|o| !self.opts.contains(o))
            .map(|o| format!("[{}]", o))
            .collect::<Vec<_>>()
            .join(sep);
        let mut usage = fill_out(&template, &block.full_name(), sep, &extra_reqs, &extra_opts);
        // Command usage gets a ':' prefix before the name.
        if block.type_state() == TypeState::Typed(BlockType::Command) && !usage.starts_with(':') {
            usage.insert(0, ':');
        }
        // An empty substitution at the end of the template leaves a
        // dangling separator.
        usage.truncate(usage.trim_end().len());
        usage
    }
}

/// Expands the holes of a usage template.
///
/// `{]` takes both required and optional args, appropriately separated;
/// `{}` takes the required args, `[]` the optional args, `<>` the name.
/// `<|>`, `{|}` and `[|]` escape the holes by shedding one pipe.
fn fill_out(template: &str, name: &str, sep: &str, extra_reqs: &str, extra_opts: &str) -> String {
    let extra_args = if !extra_reqs.is_empty() && !extra_opts.is_empty() {
        format!("{}{}{}", extra_reqs, sep, extra_opts)
    } else {
        format!("{}{}", extra_reqs, extra_opts)
    };
    let usage = template.replace("{]", &extra_args);
    let usage = sub_delimited(&usage, "{}", extra_reqs);
    let usage = sub_delimited(&usage, "[]", extra_opts);
    let usage = strip_bad_separators(&usage);
    let usage = usage.replace("<>", name);
    let usage = RE_NAMEHOLE_ESCAPE.replace_all(&usage, "<$1>");
    let usage = RE_REQHOLE_ESCAPE.replace_all(&usage, "{$1}");
    let usage = RE_OPTHOLE_ESCAPE.replace_all(&usage, "[$1]");
    usage.into_owned()
}

// -- Directives ---------------------------------------------------------------

/// A parsed block directive.
#[derive(Debug, Clone)]
pub enum Directive {
    All,
    Author(String),
    Backmatter(String),
    Default { arg: String, value: String },
    Deprecated(String),
    Dict { name: String, attribute: Option<String> },
    Exception(Option<String>),
    Library,
    Order(Vec<String>),
    ParentSection(String),
    Private,
    Public,
    Section { name: String, id: String },
    Setting(String),
    Standalone,
    Stylized(String),
    SubSection(String),
    Tagline(String),
    Throws { error: String, description: String },
    Header(Header),
}

/// One line of documentation: either plain text or a directive.
#[derive(Debug, Clone)]
pub enum DocLine {
    Text(String),
    Directive(Directive),
}

/// Parses a directive name plus raw argument string.
pub fn parse_directive(name: &str, args: &str) -> Result<Directive, ParseError> {
    let invalid = || -> ParseError {
        ParseErrorKind::InvalidBlockArgs(name.to_string(), args.to_string()).into()
    };
    match name {
        "all" => no_args(args, invalid).map(|_| Directive::All),
        "author" => Ok(Directive::Author(args.to_string())),
        "backmatter" => ident_arg(args, invalid).map(Directive::Backmatter),
        "command" => Ok(Directive::Header(Header::new(HeaderKind::Command, args))),
        "default" => {
            let caps = RE_DEFAULT_ARGS.captures(args).ok_or_else(invalid)?;
            Ok(Directive::Default {
                arg: caps[1].to_string(),
                value: caps[2].to_string(),
            })
        }
        "deprecated" => one_arg(args, invalid).map(Directive::Deprecated),
        "dict" => {
            let caps = RE_DICT_ARGS.captures(args).ok_or_else(invalid)?;
            Ok(Directive::Dict {
                name: caps[1].to_string(),
                attribute: caps.get(2).map(|m| m.as_str().to_string()),
            })
        }
        "exception" => {
            let caps = RE_MAYBE_WORD.captures(args).ok_or_else(invalid)?;
            Ok(Directive::Exception(
                caps.get(1).map(|m| m.as_str().to_string()),
            ))
        }
        "function" => Ok(Directive::Header(Header::new(HeaderKind::Function, args))),
        "library" => no_args(args, invalid).map(|_| Directive::Library),
        "order" => {
            if !RE_ORDER_ARGS.is_match(args) {
                return Err(invalid());
            }
            let ids = RE_ORDER_ARG
                .find_iter(args)
                .map(|m| m.as_str().to_string())
                .collect();
            Ok(Directive::Order(ids))
        }
        "parentsection" => ident_arg(args, invalid).map(|id| Directive::ParentSection(id.to_lowercase())),
        "private" => no_args(args, invalid).map(|_| Directive::Private),
        "public" => no_args(args, invalid).map(|_| Directive::Public),
        "section" => {
            let caps = RE_SECTION_ARGS.captures(args).ok_or_else(invalid)?;
            let section_name = caps[1].replace("\\,", ",").replace("\\\\", "\\");
            let id = match caps.get(2) {
                Some(m) => m.as_str().to_string(),
                // If omitted, the id is the name in lowercase with spaces
                // converted to dashes.
                None => section_name.to_lowercase().replace(' ', "-"),
            };
            Ok(Directive::Section {
                name: section_name,
                id,
            })
        }
        "setting" => {
            let settings_name = one_arg(args, invalid)?;
            Ok(Directive::Setting(qualify_setting(&settings_name)))
        }
        "standalone" => no_args(args, invalid).map(|_| Directive::Standalone),
        "stylized" => {
            let caps = RE_STYLIZING_ARGS.captures(args).ok_or_else(invalid)?;
            Ok(Directive::Stylized(caps[1].to_string()))
        }
        "subsection" => Ok(Directive::SubSection(args.to_string())),
        "tagline" => Ok(Directive::Tagline(args.to_string())),
        "throws" => {
            let caps = RE_THROW_ARGS.captures(args).ok_or_else(invalid)?;
            let typ = caps[1].to_string();
            let error = if RE_VIM_ERROR.is_match(&typ) {
                typ
            } else {
                format!("ERROR({})", typ)
            };
            Ok(Directive::Throws {
                error,
                description: caps
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            })
        }
        "usage" => {
            if !RE_USAGE_ARGS.is_match(args) {
                return Err(invalid());
            }
            Ok(Directive::Header(Header::new(HeaderKind::Usage, args)))
        }
        _ => Err(ParseErrorKind::UnrecognizedBlockDirective(name.to_string()).into()),
    }
}

fn no_args(args: &str, invalid: impl Fn() -> ParseError) -> Result<(), ParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(invalid())
    }
}

fn one_arg(args: &str, invalid: impl Fn() -> ParseError) -> Result<String, ParseError> {
    if args.is_empty() {
        Err(invalid())
    } else {
        Ok(args.to_string())
    }
}

fn ident_arg(args: &str, invalid: impl Fn() -> ParseError) -> Result<String, ParseError> {
    RE_IDENT_ARG
        .captures(args)
        .map(|caps| caps[1].to_string())
        .ok_or_else(invalid)
}

impl DocLine {
    /// Updates each selected block, creating the first block if none exist.
    ///
    /// Doc lines never close blocks; code lines do.
    pub fn affect(
        &self,
        blocks: &mut Vec<Block>,
        selection: &mut Vec<usize>,
    ) -> Result<(), ParseError> {
        match self {
            DocLine::Directive(Directive::Header(header)) => {
                // If the block family is already split, or the sole pending
                // block already has a header, this header starts a new
                // block. The new block is secondary: earlier blocks above
                // it describe the same entity and own the tag.
                if blocks.len() != 1 || blocks[0].header().is_some() {
                    let newblock = match blocks.first() {
                        Some(first) if first.header().is_none() => Block::split_from(first),
                        Some(_) => Block::secondary(),
                        None => Block::new(),
                    };
                    blocks.push(newblock);
                    selection.clear();
                    selection.push(blocks.len() - 1);
                }
                for &i in selection.iter() {
                    blocks[i].set_header(header.clone())?;
                    header.update(&mut blocks[i])?;
                }
                Ok(())
            }
            DocLine::Directive(Directive::All) => {
                *selection = (0..blocks.len()).collect();
                for block in blocks.iter_mut() {
                    block.set_type(TypeState::Untyped)?;
                }
                Ok(())
            }
            _ => {
                if blocks.is_empty() {
                    blocks.push(Block::new());
                    selection.push(0);
                }
                for &i in selection.iter() {
                    self.update(&mut blocks[i])?;
                }
                Ok(())
            }
        }
    }

    fn update(&self, block: &mut Block) -> Result<(), ParseError> {
        match self {
            DocLine::Text(line) => {
                block.add_line(line);
                Ok(())
            }
            DocLine::Directive(directive) => directive.update(block),
        }
    }
}

impl Directive {
    fn update(&self, block: &mut Block) -> Result<(), ParseError> {
        match self {
            Directive::All | Directive::Header(_) => Ok(()),
            Directive::Author(author) => block.set_global_author(author),
            Directive::Backmatter(id) => {
                block.set_type(TypeState::Typed(BlockType::Backmatter))?;
                block.set_id(id)
            }
            Directive::Default { arg, value } => {
                block.add_default(arg, value);
                Ok(())
            }
            Directive::Deprecated(reason) => block.set_deprecated(reason),
            Directive::Dict { name, attribute } => {
                // The dict type isn't set here: the block may still turn
                // out to be a function on the dict.
                block.set_type(TypeState::Untyped)?;
                block.set_dict(name)?;
                if let Some(attribute) = attribute {
                    block.set_type(TypeState::Typed(BlockType::Function))?;
                    block.set_attribute(attribute)?;
                }
                Ok(())
            }
            Directive::Exception(word) => block.set_exception(word.clone()),
            Directive::Library => block.set_global_library(),
            Directive::Order(ids) => block.set_global_order(ids.clone()),
            Directive::ParentSection(id) => block.set_parent_section(id),
            Directive::Private => block.set_private(true),
            Directive::Public => block.set_private(false),
            Directive::Section { name, id } => {
                block.set_type(TypeState::Typed(BlockType::Section))?;
                block.set_name(name)?;
                block.set_id(id)
            }
            Directive::Setting(name) => {
                block.set_type(TypeState::Typed(BlockType::Setting))?;
                block.set_name(name)
            }
            Directive::Standalone => block.set_global_standalone(),
            Directive::Stylized(stylization) => block.set_global_stylization(stylization),
            Directive::SubSection(name) => {
                block.add_sub_header(name);
                Ok(())
            }
            Directive::Tagline(tagline) => block.set_global_tagline(tagline),
            Directive::Throws { error, description } => {
                block.add_throws(error, description);
                Ok(())
            }
        }
    }
}
