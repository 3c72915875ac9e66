//! Vim help file writer.
//!
//! Renders a closed module as help text: header with tagline and tags,
//! numbered table of contents, each chunk in order, and the modeline
//! footer. Lines wrap at 78 columns with right-aligned tags.

use regex::Regex;
use std::sync::LazyLock;

use crate::block::{Block, BlockType, TypeState};
use crate::error::{ParseErrorKind, Result};
use crate::module::{Module, Plugin};
use crate::paragraph::Paragraph;

const WIDTH: usize = 78;
const TAB: &str = "  ";

static RE_INLINE_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([a-zA-Z_][a-zA-Z0-9_]*)(?:\(([^\s)]+)\))?").unwrap());

/// Renders one module as a vim help file.
pub struct Helpfile<'a> {
    module: &'a Module,
    plugin: &'a Plugin,
    out: String,
}

impl<'a> Helpfile<'a> {
    pub fn new(module: &'a Module, plugin: &'a Plugin) -> Self {
        Helpfile {
            module,
            plugin,
            out: String::new(),
        }
    }

    /// The help file's name, derived from the module name.
    pub fn filename(&self) -> String {
        format!("{}.txt", self.module.name.replace('#', "-"))
    }

    pub fn render(mut self) -> Result<String> {
        self.write_header();
        self.write_table_of_contents();
        for chunk in self.module.chunks() {
            self.write_chunk(chunk)?;
        }
        self.write_footer();
        Ok(self.out)
    }

    /// The first line tags the help file itself, with the tagline after a
    /// tab; the second credits the author against the plugin tags.
    fn write_header(&mut self) {
        let mut line = tag(Some(&self.filename()));
        if let Some(tagline) = self.plugin.tagline() {
            line = format!("{}\t{}", line, tagline);
        }
        // The tab has special semantics on line 1; print it unwrapped.
        self.print_line(&line);
        let mut right = tag(Some(&self.module.name));
        if let Some(stylization) = self.plugin.stylization() {
            right = format!("{} {}", tag(Some(stylization)), right);
        }
        let author = self.plugin.author().unwrap_or_default().to_string();
        self.write_line(&author, &right, 0, None, ' ');
        self.write_blank();
    }

    fn write_table_of_contents(&mut self) {
        self.write_row();
        let right = tag(Some(&self.slug("contents", '-')));
        self.write_line("CONTENTS", &right, 0, None, ' ');
        // Track section numbering per level of the tree.
        let mut counters: Vec<(usize, usize)> = vec![(0, 0)];
        for block in self.module.sections() {
            let level = block.locals.level;
            while level < counters.last().unwrap().0 {
                counters.pop();
            }
            if level == counters.last().unwrap().0 {
                counters.last_mut().unwrap().1 += 1;
            } else {
                counters.push((level, 1));
            }
            let index = counters.last().unwrap().1;
            let name = block.locals.name.clone().unwrap_or_default();
            let id = block.locals.id.clone().unwrap_or_default();
            let right = link(&self.slug(&id, '-'));
            self.write_line(
                &format!("{}. {}", index, name),
                &right,
                2 * level + 1,
                None,
                '.',
            );
        }
        self.write_blank();
    }

    fn write_chunk(&mut self, chunk: &Block) -> Result<()> {
        let typ = match chunk.type_state() {
            TypeState::Typed(typ) => typ,
            _ => return Ok(()),
        };
        match typ {
            BlockType::Section => self.write_section(chunk),
            BlockType::Function => {
                if chunk.locals.exception.is_some() {
                    self.write_small_block(&chunk.full_name(), chunk)
                } else {
                    self.write_large_block(chunk)
                }
            }
            BlockType::Command => self.write_large_block(chunk),
            BlockType::Setting | BlockType::Exception => {
                self.write_small_block(&chunk.full_name(), chunk)
            }
            BlockType::Flag => self.write_small_block(&self.slug(&chunk.full_name(), ':'), chunk),
            BlockType::Dictionary => {
                self.write_small_block(&self.slug(&chunk.full_name(), '.'), chunk)
            }
            BlockType::Backmatter => self.write_paragraphs(chunk, 0),
        }
    }

    fn write_section(&mut self, block: &Block) -> Result<()> {
        self.write_row();
        let name = block.locals.name.clone().unwrap_or_default().to_uppercase();
        let id = block.locals.id.clone().unwrap_or_default();
        let right = tag(Some(&self.slug(&id, '-')));
        self.write_line(&name, &right, 0, None, ' ');
        if !block.paragraphs.is_empty() {
            self.write_blank();
        }
        self.write_paragraphs(block, 0)
    }

    /// Functions and commands: the usage line with the tag right-aligned,
    /// body indented one stop.
    fn write_large_block(&mut self, block: &Block) -> Result<()> {
        let usage = block.locals.usage.clone().unwrap_or_default();
        let right = tag(block.tag_name().as_deref());
        // The empty leader indents continuation lines one stop.
        self.write_line(&usage, &right, 0, Some(""), ' ');
        self.write_paragraphs(block, 1)
    }

    /// Settings, flags, dictionaries, exceptions: a tag-only heading.
    fn write_small_block(&mut self, slug: &str, block: &Block) -> Result<()> {
        let right = tag(Some(slug));
        self.write_line("", &right, 0, None, ' ');
        self.write_paragraphs(block, 0)
    }

    fn write_footer(&mut self) {
        self.write_blank();
        self.print_line(&format!("vim:tw={}:ts=8:ft=help:norl:", WIDTH));
    }

    fn write_paragraphs(&mut self, block: &Block, indent: usize) -> Result<()> {
        let namespace = block.locals.namespace.clone();
        for paragraph in block.paragraphs.iter() {
            self.write_paragraph(paragraph, namespace.as_deref(), indent)?;
        }
        self.write_blank();
        Ok(())
    }

    fn write_paragraph(
        &mut self,
        paragraph: &Paragraph,
        namespace: Option<&str>,
        indent: usize,
    ) -> Result<()> {
        match paragraph {
            Paragraph::Text(text) => {
                let text = self.expand(text, namespace)?;
                self.write_line(&text, "", indent, None, ' ');
            }
            Paragraph::Blank => self.write_blank(),
            Paragraph::Code(lines) => {
                self.print_line(">");
                for line in lines {
                    self.write_code_line(line, namespace, indent)?;
                }
                self.print_line("<");
            }
            Paragraph::ListItem { leader, text } => {
                // '-' hangs lines after the first; '+' indents the whole
                // item; other leaders are copied verbatim one stop in.
                let (leader, indent) = match leader.as_str() {
                    "-" => ("".to_string(), indent),
                    "+" => ("  ".to_string(), indent),
                    other => (format!("{} ", other), indent + 1),
                };
                let text = self.expand(text, namespace)?;
                self.write_line(&text, "", indent, Some(&leader), ' ');
            }
            Paragraph::DefaultLine { arg, value } => {
                let value = self.expand(value, namespace)?;
                let text = format!("[{}] is {} if omitted.", arg, value);
                self.write_line(&text, "", indent, None, ' ');
            }
            Paragraph::ExceptionLine {
                exception,
                description,
            } => {
                let description = self.expand(description, namespace)?;
                let text = format!("Throws {} {}", exception, description);
                self.write_line(&text, "", indent, None, ' ');
            }
            Paragraph::SubHeaderLine(name) => {
                let text = name.to_uppercase();
                self.write_line(&text, "", indent, None, ' ');
            }
        }
        Ok(())
    }

    /// Code lines keep their own whitespace; only overlong lines wrap.
    fn write_code_line(
        &mut self,
        line: &str,
        namespace: Option<&str>,
        indent: usize,
    ) -> Result<()> {
        let expanded = self.expand(line, namespace)?;
        let initial = TAB.repeat(indent);
        if initial.chars().count() + expanded.chars().count() <= WIDTH {
            let line = format!("{}{}", initial, expanded);
            self.print_line(&line);
        } else {
            for wrapped in wrap(&expanded, WIDTH, &initial, &TAB.repeat(indent + 2)) {
                self.print_line(&wrapped);
            }
        }
        Ok(())
    }

    // -- Line output ----------------------------------------------------------

    fn print_line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn write_blank(&mut self) {
        self.print_line("");
    }

    fn write_row(&mut self) {
        self.print_line(&"=".repeat(WIDTH));
    }

    /// Writes one line of output, wrapping as needed. `right` is aligned
    /// against the right margin, padded with `fill`, and pushed to its own
    /// line if the text leaves no room.
    fn write_line(
        &mut self,
        text: &str,
        right: &str,
        indent: usize,
        leader: Option<&str>,
        fill: char,
    ) {
        let (initial, subsequent) = match leader {
            Some(leader) => (
                format!("{}{}", TAB.repeat(indent), leader),
                TAB.repeat(indent + 1),
            ),
            None => (TAB.repeat(indent), TAB.repeat(indent)),
        };
        let mut lines = wrap(text, WIDTH, &initial, &subsequent);
        if lines.is_empty() {
            lines.push(String::new());
        }
        if !right.is_empty() {
            let right_len = right.chars().count();
            let mut last_len = lines.last().unwrap().chars().count();
            if last_len + right_len + 1 > WIDTH {
                lines.push(String::new());
                last_len = 0;
            }
            let padding = WIDTH.saturating_sub(last_len + right_len);
            let last = lines.last_mut().unwrap();
            for _ in 0..padding {
                last.push(fill);
            }
            last.push_str(right);
        }
        for line in lines {
            self.print_line(&line);
        }
    }

    // -- Tags and inline expansion --------------------------------------------

    fn slug(&self, id: &str, sep: char) -> String {
        format!("{}{}{}", self.module.name, sep, id)
    }

    /// Expands inline directives like @function(...) into help links.
    /// Unrecognized directives stay verbatim; they may be false positives.
    fn expand(&self, text: &str, namespace: Option<&str>) -> Result<String> {
        let mut out = String::new();
        let mut copied_to = 0;
        for caps in RE_INLINE_DIRECTIVE.captures_iter(text) {
            let whole = caps.get(0).unwrap();
            let name = &caps[1];
            let element = caps.get(2).map(|m| m.as_str());
            out.push_str(&text[copied_to..whole.start()]);
            match self.expand_inline(name, element, namespace)? {
                Some(expansion) => out.push_str(&expansion),
                None => out.push_str(whole.as_str()),
            }
            copied_to = whole.end();
        }
        out.push_str(&text[copied_to..]);
        Ok(out)
    }

    fn expand_inline(
        &self,
        name: &str,
        element: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<Option<String>> {
        let lookup = |typ: BlockType, element: &str| -> Result<String> {
            self.module.lookup_tag(self.plugin, typ, element)
        };
        match (name, element) {
            ("section", Some(element)) => Ok(Some(link(&self.slug(element, '-')))),
            ("function", Some(element)) => {
                // @function(#Foo) points into the current namespace.
                let element = match element.strip_prefix('#') {
                    Some(rest) => format!("{}{}", namespace.unwrap_or(""), rest),
                    None => element.to_string(),
                };
                Ok(Some(link(&lookup(BlockType::Function, &element)?)))
            }
            ("command", Some(element)) => Ok(Some(link(&lookup(BlockType::Command, element)?))),
            ("setting", Some(element)) => Ok(Some(link(&lookup(BlockType::Setting, element)?))),
            ("flag", Some(element)) => Ok(Some(link(
                &self.slug(&lookup(BlockType::Flag, element)?, ':'),
            ))),
            ("dict", Some(element)) => Ok(Some(link(
                &self.slug(&lookup(BlockType::Dictionary, element)?, '.'),
            ))),
            ("plugin", element) => match element {
                Some("author") => Ok(self.plugin.author().map(str::to_string)),
                Some("stylized") | None => Ok(self.plugin.stylization().map(str::to_string)),
                Some("name") => Ok(Some(self.module.name.clone())),
                Some(attribute) => Err(ParseErrorKind::UnrecognizedInlineDirective(format!(
                    "{} attribute in plugin",
                    attribute
                ))
                .into()),
            },
            _ => Ok(None),
        }
    }
}

fn tag(slug: Option<&str>) -> String {
    match slug {
        Some(slug) => format!("*{}*", slug),
        None => String::new(),
    }
}

fn link(slug: &str) -> String {
    format!("|{}|", slug)
}

/// Greedy word wrap with distinct first-line and continuation indents.
/// A word that can never fit is hard-split at the margin.
fn wrap(text: &str, width: usize, initial: &str, subsequent: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = initial.to_string();
    let mut has_word = false;
    for word in text.split_whitespace() {
        let mut rest = word;
        loop {
            let used = current.chars().count() + usize::from(has_word);
            let available = width.saturating_sub(used);
            if rest.chars().count() <= available {
                if has_word {
                    current.push(' ');
                }
                current.push_str(rest);
                has_word = true;
                break;
            }
            if has_word {
                lines.push(std::mem::replace(&mut current, subsequent.to_string()));
                has_word = false;
                continue;
            }
            let take = available.max(1);
            let split_at = rest
                .char_indices()
                .nth(take)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            let (head, tail) = rest.split_at(split_at);
            current.push_str(head);
            lines.push(std::mem::replace(&mut current, subsequent.to_string()));
            rest = tail;
        }
    }
    if has_word {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Module, Plugin};
    use crate::parser;

    fn render_plugin(sources: &[(&str, &str)]) -> String {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        for (path, input) in sources {
            let namespace = path
                .strip_prefix("autoload/")
                .and_then(|p| p.strip_suffix(".vim"))
                .map(|p| format!("{}#", p.replace('/', "#")));
            for block in parser::parse(input, path).unwrap() {
                module
                    .merge(block, namespace.as_deref(), &mut plugin)
                    .unwrap();
            }
        }
        module.close(&mut plugin).unwrap();
        Helpfile::new(&module, &plugin).render().unwrap()
    }

    #[test]
    fn wrap_simple() {
        assert_eq!(wrap("hello world", 78, "", ""), vec!["hello world"]);
        assert_eq!(wrap("", 78, "", ""), Vec::<String>::new());
    }

    #[test]
    fn wrap_breaks_at_width() {
        let lines = wrap("aaa bbb ccc", 7, "", "  ");
        assert_eq!(lines, vec!["aaa bbb", "  ccc"]);
    }

    #[test]
    fn wrap_keeps_indents() {
        let lines = wrap("one two three", 9, ">>", "....");
        assert_eq!(lines, vec![">>one two", "....three"]);
    }

    #[test]
    fn wrap_hard_splits_oversized_words() {
        let lines = wrap("abcdefghij", 4, "", "");
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn write_line_right_aligns_tags() {
        let module = Module::new("myplugin");
        let plugin = Plugin::new("myplugin");
        let mut helpfile = Helpfile::new(&module, &plugin);
        helpfile.write_line("CONTENTS", "*myplugin-contents*", 0, None, ' ');
        let line = helpfile.out.trim_end_matches('\n');
        assert_eq!(line.len(), WIDTH);
        assert!(line.starts_with("CONTENTS "));
        assert!(line.ends_with(" *myplugin-contents*"));
    }

    #[test]
    fn write_line_moves_crowded_tag_to_next_line() {
        let module = Module::new("myplugin");
        let plugin = Plugin::new("myplugin");
        let mut helpfile = Helpfile::new(&module, &plugin);
        let text = "x".repeat(70);
        helpfile.write_line(&text, "*myplugin-long-tag*", 0, None, ' ');
        let lines: Vec<&str> = helpfile.out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], text);
        assert!(lines[1].ends_with("*myplugin-long-tag*"));
        assert_eq!(lines[1].len(), WIDTH);
    }

    #[test]
    fn renders_header_toc_sections_and_footer() {
        let text = render_plugin(&[(
            "plugin/myplugin.vim",
            "\
\"\"
\" @tagline Does things
\" @section Introduction, intro
\" Welcome to the plugin.

let s:guard = 1
",
        )]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "*myplugin.txt*\tDoes things");
        assert!(lines[1].ends_with("*myplugin*"));
        assert!(text.contains(&"=".repeat(WIDTH)));
        assert!(text.contains("CONTENTS"));
        assert!(text.contains("|myplugin-intro|"));
        assert!(text.contains("INTRODUCTION"));
        assert!(text.contains("*myplugin-intro*"));
        assert!(text.contains("Welcome to the plugin."));
        assert!(text.ends_with("vim:tw=78:ts=8:ft=help:norl:\n"));
        // TOC entries are numbered and dot-filled.
        assert!(lines
            .iter()
            .any(|l| l.starts_with("  1. Introduction..") && l.ends_with("|myplugin-intro|")));
    }

    #[test]
    fn renders_function_usage_with_tag() {
        let text = render_plugin(&[(
            "autoload/myplugin.vim",
            "\
\"\"
\" @section Introduction, intro
\" @library
\" A plugin.

\"\"
\" Greets {name} warmly.
function! myplugin#Greet(name) abort
endfunction
",
        )]);
        assert!(text.contains("FUNCTIONS"));
        let usage_line = text
            .lines()
            .find(|l| l.starts_with("myplugin#Greet({name})"))
            .expect("usage line missing");
        assert!(usage_line.ends_with("*myplugin#Greet()*"));
        // The body is indented one stop.
        assert!(text.contains("  Greets {name} warmly."));
    }

    #[test]
    fn expands_inline_directives() {
        let text = render_plugin(&[(
            "autoload/myplugin.vim",
            "\
\"\"
\" @section Introduction, intro
\" @library
\" A plugin.

\"\"
\" See @function(#Other) and @command(DoIt) and @plugin(name).
\" Unknown @directive(stays) verbatim.
function! myplugin#Main() abort
endfunction

\"\"
\" Helper.
function! myplugin#Other() abort
endfunction
",
        )]);
        assert!(text.contains("|myplugin#Other()|"));
        assert!(text.contains("|:DoIt|"));
        assert!(text.contains("See |myplugin#Other()| and |:DoIt| and myplugin."));
        assert!(text.contains("@directive(stays)"));
    }

    #[test]
    fn renders_code_blocks_verbatim() {
        let text = render_plugin(&[(
            "autoload/myplugin.vim",
            "\
\"\"
\" @section Introduction, intro
\" @library
\" A plugin.

\"\"
\" For example: >
\"   let g:value = myplugin#Config()
\" <
function! myplugin#Config() abort
endfunction
",
        )]);
        assert!(text.contains(">\n    let g:value = myplugin#Config()\n<\n"));
    }

    #[test]
    fn renders_throws_and_default_lines() {
        let text = render_plugin(&[(
            "autoload/myplugin.vim",
            "\
\"\"
\" @section Introduction, intro
\" @library
\" A plugin.

\"\"
\" @usage pattern [limit]
\" @default limit=10
\" @throws BadValue if {pattern} is empty.
function! myplugin#Find(pattern, ...) abort
endfunction
",
        )]);
        assert!(text.contains("myplugin#Find({pattern}, [limit])"));
        assert!(text.contains("[limit] is 10 if omitted."));
        assert!(text.contains("Throws ERROR(BadValue) if {pattern} is empty."));
    }

    #[test]
    fn dict_functions_render_under_their_dictionary() {
        let text = render_plugin(&[(
            "autoload/myplugin.vim",
            "\
\"\"
\" @section Introduction, intro
\" @library
\" A plugin.

\"\"
\" @dict Counter
\" A running counter.

\"\"
\" @dict Counter.Add
\" Adds {amount}.
function! myplugin#CounterAdd(amount) abort
endfunction
",
        )]);
        assert!(text.contains("DICTIONARIES"));
        assert!(text.contains("*myplugin.Counter*"));
        let dict_pos = text.find("*myplugin.Counter*").unwrap();
        let func_pos = text.find("Counter.Add({amount})").unwrap();
        assert!(dict_pos < func_pos);
    }

    #[test]
    fn filename_flattens_namespaces() {
        let module = Module::new("myplugin#util");
        let plugin = Plugin::new("myplugin");
        let helpfile = Helpfile::new(&module, &plugin);
        assert_eq!(helpfile.filename(), "myplugin-util.txt");
    }
}
