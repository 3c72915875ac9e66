//! Paragraph aggregation: groups doc lines into renderable units.
//!
//! Paragraph boundaries matter because the renderer reflows text; it must
//! know which lines may be joined (prose) and which may not (list items,
//! code blocks).

/// One renderable unit of block content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paragraph {
    /// Prose; lines are joined with single spaces.
    Text(String),
    /// A paragraph break.
    Blank,
    /// Verbatim lines; never joined, whitespace preserved.
    Code(Vec<String>),
    /// A list item with its leader character(s).
    ListItem { leader: String, text: String },
    /// States the default value of an optional argument.
    DefaultLine { arg: String, value: String },
    /// States an exception the documented code can throw.
    ExceptionLine {
        exception: String,
        description: String,
    },
    /// An upper-cased minor heading inside a block.
    SubHeaderLine(String),
}

/// Manager for the paragraphs of one block.
///
/// Only the most recently added paragraph can be open; adding a line always
/// targets it. Transitioning to a different paragraph type closes the
/// current one and appends a fresh paragraph.
#[derive(Debug, Clone, Default)]
pub struct Paragraphs {
    items: Vec<Paragraph>,
    open: bool,
}

impl Paragraphs {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Paragraph> {
        self.items.iter()
    }

    /// Whether the current open paragraph is a code block.
    pub fn in_code(&self) -> bool {
        self.open && matches!(self.items.last(), Some(Paragraph::Code(_)))
    }

    /// Whether the current open paragraph is a list item.
    pub fn in_list_item(&self) -> bool {
        self.open && matches!(self.items.last(), Some(Paragraph::ListItem { .. }))
    }

    fn in_text(&self) -> bool {
        self.open && matches!(self.items.last(), Some(Paragraph::Text(_)))
    }

    /// Ensures an open text paragraph, starting one if necessary.
    pub fn set_text(&mut self) {
        if !self.in_text() {
            self.items.push(Paragraph::Text(String::new()));
            self.open = true;
        }
    }

    /// Ensures an open code block, starting one if necessary.
    pub fn set_code(&mut self) {
        if !self.in_code() {
            self.items.push(Paragraph::Code(Vec::new()));
            self.open = true;
        }
    }

    /// Starts a new list item with the given leader.
    pub fn set_list_item(&mut self, leader: &str) {
        self.items.push(Paragraph::ListItem {
            leader: leader.to_string(),
            text: String::new(),
        });
        self.open = true;
    }

    /// Appends a paragraph break.
    pub fn set_blank(&mut self) {
        self.items.push(Paragraph::Blank);
        self.open = false;
    }

    pub fn set_default_line(&mut self, arg: &str, value: &str) {
        self.items.push(Paragraph::DefaultLine {
            arg: arg.to_string(),
            value: value.to_string(),
        });
        self.open = false;
    }

    pub fn set_exception_line(&mut self, exception: &str, description: &str) {
        self.items.push(Paragraph::ExceptionLine {
            exception: exception.to_string(),
            description: description.to_string(),
        });
        self.open = false;
    }

    pub fn set_sub_header(&mut self, name: &str) {
        self.items.push(Paragraph::SubHeaderLine(name.to_string()));
        self.open = false;
    }

    /// Adds a line to the open paragraph.
    pub fn add_line(&mut self, line: &str) {
        assert!(self.open, "no open paragraph to add to");
        match self.items.last_mut() {
            Some(Paragraph::Text(text)) => join_line(text, line),
            Some(Paragraph::ListItem { text, .. }) => join_line(text, line),
            Some(Paragraph::Code(lines)) => lines.push(line.to_string()),
            _ => unreachable!("open paragraph accepts no lines"),
        }
    }

    /// Closes the current paragraph against further lines.
    pub fn close(&mut self) {
        self.open = false;
    }
}

fn join_line(text: &mut String, line: &str) {
    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(line);
}
