//! Blocks: encapsulated chunks of documentation.
//!
//! A block accumulates the metadata and paragraphs for one documented
//! entity (a function, command, setting, flag, section, etc.). Directives
//! and code lines mutate it; closing it validates cross-field constraints
//! and synthesizes the usage line.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{ParseError, ParseErrorKind};
use crate::paragraph::Paragraphs;
use crate::parser::docline::{self, Header};

static RE_LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([*+-]|\d+\.)\s+").unwrap());

/// Concrete block types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Section,
    Backmatter,
    Exception,
    Dictionary,
    Function,
    Command,
    Setting,
    Flag,
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BlockType::Section => "SECTION",
            BlockType::Backmatter => "BACKMATTER",
            BlockType::Exception => "EXCEPTION",
            BlockType::Dictionary => "DICTIONARY",
            BlockType::Function => "FUNCTION",
            BlockType::Command => "COMMAND",
            BlockType::Setting => "SETTING",
            BlockType::Flag => "FLAG",
        };
        f.write_str(name)
    }
}

/// Tri-state block typing.
///
/// A block starts out `Unknown` (it may not be documentation at all),
/// becomes `Untyped` once a directive proves it is documentation, and is
/// narrowed to `Typed` by a typing directive or a recognized code line.
/// Narrowing is monotonic: two incompatible concrete types conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeState {
    #[default]
    Unknown,
    Untyped,
    Typed(BlockType),
}

/// Entity-scoped metadata.
#[derive(Debug, Clone, Default)]
pub struct Locals {
    pub name: Option<String>,
    /// Section/backmatter identifier.
    pub id: Option<String>,
    /// Id of the owning section, for child sections.
    pub parent_id: Option<String>,
    /// Function namespace like `myplugin#util#`.
    pub namespace: Option<String>,
    /// Set by @private/@public; only functions may carry it.
    pub private: Option<bool>,
    /// Deprecation reason.
    pub deprecated: Option<String>,
    /// Dictionary name this block documents or belongs to.
    pub dict: Option<String>,
    /// Attribute name of a dict function.
    pub attribute: Option<String>,
    /// `Some(None)` marks an exception block without an explicit tag word.
    pub exception: Option<Option<String>>,
    /// Command usage prefix like `[range]<>[!]`, captured from the code.
    pub head: Option<String>,
    /// Argument names from the code signature.
    pub args: Option<Vec<String>>,
    /// Usage line synthesized at close.
    pub usage: Option<String>,
    /// Section nesting level for the table of contents.
    pub level: usize,
    /// Child sections, attached during module close.
    pub children: Vec<Block>,
}

/// Plugin-scoped metadata carried on a block until merge.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    pub author: Option<String>,
    pub library: Option<bool>,
    pub order: Option<Vec<String>>,
    pub standalone: Option<bool>,
    pub stylization: Option<String>,
    pub tagline: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    typ: TypeState,
    pub locals: Locals,
    pub globals: Globals,
    pub paragraphs: Paragraphs,
    header: Option<Header>,
    required_args: Vec<String>,
    optional_args: Vec<String>,
    closed: bool,
    is_secondary: bool,
    is_default: bool,
}

impl Block {
    pub fn new() -> Self {
        Block::default()
    }

    pub fn new_typed(typ: BlockType) -> Self {
        let mut block = Block::default();
        block.typ = TypeState::Typed(typ);
        block
    }

    /// A synthesized block that loses to any explicit block of the same id.
    pub fn new_default(typ: BlockType) -> Self {
        let mut block = Block::new_typed(typ);
        block.is_default = true;
        block
    }

    /// Starts a new block describing the same entity as `first`.
    ///
    /// Used when a header directive splits a block family into usage
    /// variants: the fresh block inherits the locals (name, namespace,
    /// signature) accumulated so far and is marked secondary so it emits
    /// no tag of its own.
    pub fn split_from(first: &Block) -> Self {
        let mut block = Block::default();
        block.typ = first.typ;
        block.locals = first.locals.clone();
        block.is_secondary = true;
        block
    }

    /// A fresh secondary block that inherits nothing.
    pub fn secondary() -> Self {
        let mut block = Block::default();
        block.is_secondary = true;
        block
    }

    pub fn type_state(&self) -> TypeState {
        self.typ
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn is_secondary(&self) -> bool {
        self.is_secondary
    }

    /// Narrows the block type. Narrowing to `Untyped` only asserts that the
    /// block is documentation; conflicting concrete types fail.
    pub fn set_type(&mut self, newtype: TypeState) -> Result<(), ParseError> {
        match (self.typ, newtype) {
            (_, TypeState::Unknown) => {}
            (TypeState::Unknown, new) => self.typ = new,
            (TypeState::Untyped, TypeState::Untyped) => {}
            (TypeState::Untyped, TypeState::Typed(t)) => self.typ = TypeState::Typed(t),
            (TypeState::Typed(_), TypeState::Untyped) => {}
            (TypeState::Typed(ours), TypeState::Typed(theirs)) => {
                if ours != theirs {
                    return Err(ParseErrorKind::TypeConflict(
                        ours.to_string(),
                        theirs.to_string(),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Adds a line of text. The paragraph type is auto-determined.
    pub fn add_line(&mut self, line: &str) {
        // Code blocks are treated differently: lines aren't joined and
        // blank lines aren't special.
        if self.paragraphs.in_code() {
            // '<' exits code blocks.
            if let Some(rest) = line.strip_prefix('<') {
                self.paragraphs.close();
                let rest = rest.trim_start();
                if !rest.is_empty() {
                    self.add_line(rest);
                }
                return;
            }
            // Lines starting in column 0 exit code blocks.
            if !line.starts_with([' ', '\t']) {
                self.paragraphs.close();
                self.add_line(line);
                return;
            }
            self.paragraphs.add_line(line);
            return;
        }
        // Always grab the required/optional args.
        self.parse_args(line);
        // Blank lines divide paragraphs.
        if line.trim().is_empty() {
            self.paragraphs.set_blank();
            return;
        }
        // Start lists if you get a list item.
        if let Some(caps) = RE_LIST_ITEM.captures(line) {
            let leader = caps[1].to_string();
            self.paragraphs.close();
            let rest = RE_LIST_ITEM.replace(line, "");
            self.paragraphs.set_list_item(&leader);
            self.paragraphs.add_line(&rest);
            return;
        }
        if line.starts_with([' ', '\t']) {
            // Continue lists by indenting.
            if self.paragraphs.in_list_item() {
                self.paragraphs.add_line(line.trim_start());
                return;
            }
        } else if self.paragraphs.in_list_item() {
            self.paragraphs.close();
        }
        // Everything else is text.
        self.paragraphs.set_text();
        // Lines ending in '>' enter code blocks. Must have a space before it
        // if not on a line by itself.
        if line == ">" || line.ends_with(" >") {
            let rest = line[..line.len() - 1].trim_end();
            if !rest.is_empty() {
                self.paragraphs.add_line(rest);
            }
            self.paragraphs.set_code();
            return;
        }
        self.paragraphs.add_line(line);
    }

    // -- Local metadata -------------------------------------------------------

    pub fn set_name(&mut self, name: &str) -> Result<(), ParseError> {
        set_string(&mut self.locals.name, "name", name)
    }

    pub fn set_id(&mut self, id: &str) -> Result<(), ParseError> {
        set_string(&mut self.locals.id, "id", id)
    }

    /// Only sections may have parents; the check is what makes
    /// @parentsection a section-specific directive.
    pub fn set_parent_section(&mut self, parent_id: &str) -> Result<(), ParseError> {
        if self.typ != TypeState::Typed(BlockType::Section) {
            return Err(ParseErrorKind::MisplacedParentSection(parent_id.to_string()).into());
        }
        set_string(&mut self.locals.parent_id, "parent_id", parent_id)
    }

    pub fn set_namespace(&mut self, namespace: &str) -> Result<(), ParseError> {
        set_string(&mut self.locals.namespace, "namespace", namespace)
    }

    pub fn set_private(&mut self, private: bool) -> Result<(), ParseError> {
        set_bool(&mut self.locals.private, "private", private)
    }

    pub fn set_deprecated(&mut self, reason: &str) -> Result<(), ParseError> {
        set_string(&mut self.locals.deprecated, "deprecated", reason)
    }

    pub fn set_dict(&mut self, name: &str) -> Result<(), ParseError> {
        set_string(&mut self.locals.dict, "dict", name)
    }

    pub fn set_attribute(&mut self, attribute: &str) -> Result<(), ParseError> {
        set_string(&mut self.locals.attribute, "attribute", attribute)
    }

    pub fn set_exception(&mut self, word: Option<String>) -> Result<(), ParseError> {
        if let Some(old) = &self.locals.exception {
            if *old != word {
                return Err(ParseErrorKind::InconsistentControl(
                    "exception".to_string(),
                    old.clone().unwrap_or_default(),
                    word.unwrap_or_default(),
                )
                .into());
            }
        }
        self.locals.exception = Some(word);
        Ok(())
    }

    pub fn set_head(&mut self, head: &str) -> Result<(), ParseError> {
        set_string(&mut self.locals.head, "head", head)
    }

    pub fn set_args(&mut self, args: Vec<String>) -> Result<(), ParseError> {
        if let Some(old) = &self.locals.args {
            if *old != args {
                return Err(ParseErrorKind::InconsistentControl(
                    "args".to_string(),
                    old.join(", "),
                    args.join(", "),
                )
                .into());
            }
        }
        self.locals.args = Some(args);
        Ok(())
    }

    // -- Global metadata ------------------------------------------------------

    pub fn set_global_author(&mut self, author: &str) -> Result<(), ParseError> {
        self.set_type(TypeState::Untyped)?;
        set_global(&mut self.globals.author, "author", author.to_string())
    }

    pub fn set_global_library(&mut self) -> Result<(), ParseError> {
        self.set_type(TypeState::Untyped)?;
        set_global(&mut self.globals.library, "library", true)
    }

    pub fn set_global_order(&mut self, order: Vec<String>) -> Result<(), ParseError> {
        self.set_type(TypeState::Untyped)?;
        set_global(&mut self.globals.order, "order", order)
    }

    pub fn set_global_standalone(&mut self) -> Result<(), ParseError> {
        self.set_type(TypeState::Untyped)?;
        set_global(&mut self.globals.standalone, "standalone", true)
    }

    pub fn set_global_stylization(&mut self, stylization: &str) -> Result<(), ParseError> {
        self.set_type(TypeState::Untyped)?;
        set_global(
            &mut self.globals.stylization,
            "stylization",
            stylization.to_string(),
        )
    }

    pub fn set_global_tagline(&mut self, tagline: &str) -> Result<(), ParseError> {
        self.set_type(TypeState::Untyped)?;
        set_global(&mut self.globals.tagline, "tagline", tagline.to_string())
    }

    // -- Structure ------------------------------------------------------------

    /// Sets the header directive. Only one header is allowed per block.
    pub fn set_header(&mut self, header: Header) -> Result<(), ParseError> {
        if self.header.is_some() {
            return Err(ParseErrorKind::MultipleHeaders.into());
        }
        self.header = Some(header);
        self.paragraphs.close();
        Ok(())
    }

    pub fn add_sub_header(&mut self, name: &str) {
        self.paragraphs.set_sub_header(name);
    }

    /// Adds a line stating the default value for an optional argument.
    ///
    /// `@default foo=[bar]` implies [bar] precedes [foo] in the argument
    /// list, so the value is scanned for argument references first.
    pub fn add_default(&mut self, arg: &str, value: &str) {
        self.parse_args(value);
        if !self.optional_args.iter().any(|a| a == arg) {
            self.optional_args.push(arg.to_string());
        }
        self.paragraphs.set_default_line(arg, value);
    }

    /// Adds a line specifying an exception the code can throw.
    pub fn add_throws(&mut self, exception: &str, description: &str) {
        self.parse_args(description);
        self.paragraphs.set_exception_line(exception, description);
    }

    /// Closes the block against further text. Idempotent.
    ///
    /// Closing resolves implicit typing, synthesizes the usage line for
    /// functions and commands, and validates type-specific constraints.
    pub fn close(&mut self) -> Result<(), ParseError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.typ == TypeState::Untyped && self.locals.dict.is_some() {
            self.set_type(TypeState::Typed(BlockType::Dictionary))?;
        }
        if matches!(
            self.typ,
            TypeState::Typed(BlockType::Function) | TypeState::Typed(BlockType::Command)
        ) && self.locals.exception.is_none()
        {
            let header = match &self.header {
                Some(header) => header.clone(),
                None => {
                    let header = Header::default_usage();
                    self.header = Some(header.clone());
                    header
                }
            };
            self.locals.usage = Some(header.generate_usage(self));
        }
        if self.locals.private.is_some() && self.typ != TypeState::Typed(BlockType::Function) {
            return Err(ParseErrorKind::InvalidBlock(
                "Only functions may be marked as private.".to_string(),
            )
            .into());
        }
        Ok(())
    }

    // -- Argument resolution --------------------------------------------------

    /// Scans a line for `{required}` and `[optional]` argument references.
    fn parse_args(&mut self, text: &str) {
        for arg in docline::required_args_in(text) {
            if !self.required_args.contains(&arg) {
                self.required_args.push(arg);
            }
        }
        for arg in docline::optional_args_in(text) {
            if !self.optional_args.contains(&arg) {
                self.optional_args.push(arg);
            }
        }
    }

    /// The arguments required by the documented code.
    ///
    /// For functions the documented names are reconciled against the code
    /// signature; an irreconcilable mismatch is reported as a warning and
    /// the documented names win.
    pub fn required_args(&self) -> Vec<String> {
        if self.typ == TypeState::Typed(BlockType::Function) {
            let sigargs: Vec<String> = self
                .locals
                .args
                .clone()
                .unwrap_or_default()
                .into_iter()
                .filter(|a| a != "...")
                .collect();
            // They didn't mention any args. Use the signature's.
            if self.required_args.is_empty() {
                return sigargs;
            }
            // The mentioned args are all in the signature. Use the
            // signature's order.
            if self.required_args.iter().all(|a| sigargs.contains(a)) {
                return sigargs;
            }
            // Same count, different names: they're renaming. Trust the
            // documentation's order.
            if self.required_args.len() != sigargs.len() {
                eprintln!(
                    "warning: arguments do not match function signature. \
                     Signature arguments are [{}]. Documentation arguments are [{}].",
                    sigargs.join(", "),
                    self.required_args.join(", ")
                );
            }
        }
        self.required_args.clone()
    }

    /// The optional arguments accepted by the documented code.
    pub fn optional_args(&self) -> Vec<String> {
        if self.typ == TypeState::Typed(BlockType::Function)
            && !self.optional_args.is_empty()
            && !self
                .locals
                .args
                .as_ref()
                .is_some_and(|args| args.iter().any(|a| a == "..."))
        {
            eprintln!(
                "warning: documentation claims optional parameters that function {} does not accept.",
                self.full_name()
            );
            return Vec::new();
        }
        self.optional_args.clone()
    }

    // -- Names and tags -------------------------------------------------------

    /// The (file-)local name of the documented entity.
    pub fn local_name(&self) -> Option<&str> {
        if self.typ == TypeState::Typed(BlockType::Dictionary) {
            return self.locals.dict.as_deref();
        }
        self.locals.name.as_deref()
    }

    /// The global (namespaced as necessary) name of the documented entity.
    pub fn full_name(&self) -> String {
        let local = self.local_name().unwrap_or_default();
        if self.typ == TypeState::Typed(BlockType::Function) {
            if let Some(dict) = &self.locals.dict {
                let attribute = self.locals.attribute.as_deref().unwrap_or(local);
                return format!("{}.{}", dict, attribute);
            }
            if let Some(exception) = &self.locals.exception {
                return format!("ERROR({})", exception.as_deref().unwrap_or(local));
            }
            return format!("{}{}", self.locals.namespace.as_deref().unwrap_or(""), local);
        }
        local.to_string()
    }

    /// The tag string for links to the documented entity, or None for
    /// secondary blocks (which must not repeat the primary block's tag).
    pub fn tag_name(&self) -> Option<String> {
        if self.is_secondary {
            return None;
        }
        match self.typ {
            TypeState::Typed(BlockType::Function) => {
                // Function tags end with (), except ERROR() tags.
                if self.locals.exception.is_none() {
                    Some(format!("{}()", self.full_name()))
                } else {
                    Some(self.full_name())
                }
            }
            TypeState::Typed(BlockType::Command) => Some(format!(":{}", self.full_name())),
            _ => Some(self.full_name()),
        }
    }
}

fn set_string(
    slot: &mut Option<String>,
    key: &str,
    value: &str,
) -> Result<(), ParseError> {
    if let Some(old) = slot {
        if old != value {
            return Err(ParseErrorKind::InconsistentControl(
                key.to_string(),
                old.clone(),
                value.to_string(),
            )
            .into());
        }
    }
    *slot = Some(value.to_string());
    Ok(())
}

fn set_bool(slot: &mut Option<bool>, key: &str, value: bool) -> Result<(), ParseError> {
    if let Some(old) = slot {
        if *old != value {
            return Err(ParseErrorKind::InconsistentControl(
                key.to_string(),
                old.to_string(),
                value.to_string(),
            )
            .into());
        }
    }
    *slot = Some(value);
    Ok(())
}

fn set_global<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<(), ParseError> {
    if slot.is_some() {
        return Err(ParseErrorKind::RedundantControl(key.to_string()).into());
    }
    *slot = Some(value);
    Ok(())
}
