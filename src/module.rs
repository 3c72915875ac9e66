//! Module and plugin management: merging blocks into ordered helpfiles.
//!
//! A module collects every block destined for one helpfile, deduplicates
//! sections and backmatter, and computes the final section order at close
//! time. The plugin holds state shared by all modules: plugin-wide
//! metadata and the cross-module tag collections.

use std::collections::{HashMap, HashSet};

use crate::block::{Block, BlockType, TypeState};
use crate::error::{Error, ParseErrorKind, Result, StructureError};
use crate::parser::docline;

/// Built-in section order. Sections the author doesn't order explicitly
/// are slotted per this list, except "about" which defaults to last.
const DEFAULT_ORDER: &[&str] = &[
    "intro",
    "config",
    "commands",
    "autocmds",
    "settings",
    "dicts",
    "functions",
    "exceptions",
    "mappings",
];

/// Default sections injected for collections without an owning section.
const DEFAULT_SECTIONS: &[(BlockType, &str, &str)] = &[
    (BlockType::Function, "functions", "Functions"),
    (BlockType::Exception, "exceptions", "Exceptions"),
    (BlockType::Command, "commands", "Commands"),
    (BlockType::Dictionary, "dicts", "Dictionaries"),
    (BlockType::Flag, "config", "Configuration"),
    (BlockType::Setting, "config", "Configuration"),
];

/// Manages the blocks that all output to the same help file.
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    sections: Vec<(String, Block)>,
    backmatters: HashMap<String, Block>,
    collections: HashMap<BlockType, Vec<Block>>,
    order: Option<Vec<String>>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            ..Module::default()
        }
    }

    fn has_section(&self, id: &str) -> bool {
        self.sections.iter().any(|(sid, _)| sid == id)
    }

    /// Merges one closed block into the module.
    ///
    /// Blocks that never proved to be documentation are dropped silently;
    /// blocks that proved to be documentation but never got a concrete
    /// type are fatal.
    pub fn merge(
        &mut self,
        mut block: Block,
        namespace: Option<&str>,
        plugin: &mut Plugin,
    ) -> Result<()> {
        let typ = match block.type_state() {
            TypeState::Unknown => return Ok(()),
            TypeState::Untyped => return Err(StructureError::AmbiguousBlock.into()),
            TypeState::Typed(typ) => typ,
        };
        if let Some(namespace) = namespace {
            block.set_namespace(namespace).map_err(Error::from)?;
        }
        // Module-level metadata.
        if let Some(order) = block.globals.order.clone() {
            if self.order.is_some() {
                return Err(ParseErrorKind::RedundantControl("order".to_string()).into());
            }
            self.order = Some(order);
        }
        plugin.merge(&block)?;

        // Sections and backmatter are stored by id; synthesized defaults
        // always lose to explicit blocks of the same id.
        match typ {
            BlockType::Section => {
                let id = block.locals.id.clone().unwrap_or_default();
                match self.sections.iter().position(|(sid, _)| *sid == id) {
                    None => self.sections.push((id, block)),
                    Some(pos) if self.sections[pos].1.is_default() => {
                        self.sections[pos].1 = block;
                    }
                    Some(_) if !block.is_default() => {
                        return Err(StructureError::DuplicateSection(id).into());
                    }
                    Some(_) => {}
                }
            }
            BlockType::Backmatter => {
                let id = block.locals.id.clone().unwrap_or_default();
                let replace = match self.backmatters.get(&id) {
                    None => true,
                    Some(existing) if existing.is_default() => true,
                    Some(_) if !block.is_default() => {
                        return Err(StructureError::DuplicateBackmatter(id).into());
                    }
                    Some(_) => false,
                };
                if replace {
                    self.backmatters.insert(id, block);
                }
            }
            _ => {
                if let Some(collection_type) = plugin.collection_type(&block) {
                    self.collections
                        .entry(collection_type)
                        .or_default()
                        .push(block);
                }
            }
        }
        Ok(())
    }

    /// Gets a collection by type, sorted and with overridden defaults
    /// dropped.
    ///
    /// Most types keep definition order. Functions sort by namespace but
    /// keep definition order within a namespace; dictionaries sort by
    /// name.
    pub fn get_collection(&self, typ: BlockType) -> Vec<&Block> {
        let mut collection: Vec<&Block> = self
            .collections
            .get(&typ)
            .map(|blocks| blocks.iter().collect())
            .unwrap_or_default();
        if typ == BlockType::Function {
            collection.sort_by_key(|b| b.locals.namespace.clone().unwrap_or_default());
        } else if typ == BlockType::Dictionary {
            collection.sort_by_key(|b| b.full_name());
        }
        let non_default_tags: HashSet<Option<String>> = collection
            .iter()
            .filter(|b| !b.is_default())
            .map(|b| b.tag_name())
            .collect();
        collection
            .into_iter()
            .filter(|b| !b.is_default() || !non_default_tags.contains(&b.tag_name()))
            .collect()
    }

    /// If any flags were documented, a default Configuration section
    /// explains how to set them.
    fn add_flag_help(&mut self, plugin: &mut Plugin) -> Result<()> {
        if self.get_collection(BlockType::Flag).is_empty() {
            return Ok(());
        }
        let mut block = Block::new_default(BlockType::Section);
        block.set_id("config").map_err(Error::from)?;
        block.set_name("Configuration").map_err(Error::from)?;
        block.add_line(
            "This plugin uses maktaba flags for configuration. Install Glaive \
             (https://github.com/google/glaive) and use the @command(Glaive) \
             command to configure them.",
        );
        self.merge(block, None, plugin)
    }

    /// Closes the module: injects default sections, verifies backmatter,
    /// computes the final section order and expands child sections.
    pub fn close(&mut self, plugin: &mut Plugin) -> Result<()> {
        // Inject default sections for collections nobody claimed.
        for (typ, id, name) in DEFAULT_SECTIONS {
            if *typ == BlockType::Flag {
                self.add_flag_help(plugin)?;
            }
            if !self.get_collection(*typ).is_empty() && !self.has_section(id) {
                let mut block = Block::new_typed(BlockType::Section);
                block.set_id(id).map_err(Error::from)?;
                block.set_name(name).map_err(Error::from)?;
                self.merge(block, None, plugin)?;
            }
        }

        // Every backmatter id must reference a section.
        let mut backmatter_ids: Vec<&String> = self.backmatters.keys().collect();
        backmatter_ids.sort();
        for id in backmatter_ids {
            if !self.has_section(id) {
                return Err(StructureError::NoSuchSection(id.clone()).into());
            }
        }

        // Merge the explicit order with the built-in default order.
        let section_ids: HashSet<String> =
            self.sections.iter().map(|(id, _)| id.clone()).collect();
        let order = section_order(self.order.as_deref().unwrap_or_default(), &section_ids);

        // Detach child sections from the top level.
        let mut top_level: Vec<(String, Block)> = Vec::new();
        let mut children: Vec<Block> = Vec::new();
        for (id, block) in self.sections.drain(..) {
            if block.locals.parent_id.is_some() {
                // Parents imply ordering for their children.
                if order.iter().any(|o| *o == id) {
                    return Err(
                        StructureError::OrderedChildSections(id, order.clone()).into()
                    );
                }
                children.push(block);
            } else {
                top_level.push((id, block));
            }
        }
        // Attach each child to its parent, which must be top-level.
        for child in children {
            let parent_id = child.locals.parent_id.clone().unwrap_or_default();
            let child_name = child
                .locals
                .name
                .clone()
                .unwrap_or_else(|| child.locals.id.clone().unwrap_or_default());
            match top_level.iter_mut().find(|(id, _)| *id == parent_id) {
                Some((_, parent)) => parent.locals.children.push(child),
                None => {
                    return Err(
                        StructureError::NoSuchParentSection(child_name, parent_id).into()
                    );
                }
            }
        }

        // All remaining top-level sections must be ordered.
        let mut neglected: Vec<String> = top_level
            .iter()
            .filter(|(id, _)| !order.contains(id))
            .map(|(id, _)| id.clone())
            .collect();
        if !neglected.is_empty() {
            neglected.sort();
            return Err(StructureError::NeglectedSections(neglected, order).into());
        }

        // Reinsert in computed order, expanding each section's children
        // immediately after it, sorted by name, one level deeper.
        let mut ordered: Vec<(String, Block)> = Vec::new();
        for key in &order {
            if let Some(pos) = top_level.iter().position(|(id, _)| id == key) {
                let (id, block) = top_level.remove(pos);
                push_with_children(&mut ordered, id, block, 0);
            }
        }
        self.sections = ordered;
        self.order = Some(order);
        Ok(())
    }

    /// The final ordered sections (children expanded), for the table of
    /// contents.
    pub fn sections(&self) -> impl Iterator<Item = &Block> {
        self.sections.iter().map(|(_, block)| block)
    }

    /// The ordered sequence of chunks to render: each section, then the
    /// collections it owns, then its backmatter.
    pub fn chunks(&self) -> Vec<&Block> {
        let mut chunks: Vec<&Block> = Vec::new();
        for (id, section) in &self.sections {
            chunks.push(section);
            match id.as_str() {
                "functions" => {
                    for block in self.get_collection(BlockType::Function) {
                        if block.locals.dict.is_none() && block.locals.exception.is_none() {
                            chunks.push(block);
                        }
                    }
                }
                "commands" => chunks.extend(self.get_collection(BlockType::Command)),
                "dicts" => {
                    for dict in self.get_collection(BlockType::Dictionary) {
                        chunks.push(dict);
                        for func in self.get_collection(BlockType::Function) {
                            if func.locals.dict.is_some() && func.locals.dict == dict.locals.dict
                            {
                                chunks.push(func);
                            }
                        }
                    }
                }
                "exceptions" => chunks.extend(self.get_collection(BlockType::Exception)),
                "config" => {
                    chunks.extend(self.get_collection(BlockType::Flag));
                    chunks.extend(self.get_collection(BlockType::Setting));
                }
                _ => {}
            }
            if let Some(backmatter) = self.backmatters.get(id) {
                chunks.push(backmatter);
            }
        }
        chunks
    }

    pub fn lookup_tag(&self, plugin: &Plugin, typ: BlockType, name: &str) -> Result<String> {
        plugin.lookup_tag(typ, name)
    }
}

fn push_with_children(out: &mut Vec<(String, Block)>, id: String, mut block: Block, level: usize) {
    block.locals.level = level;
    let mut children = std::mem::take(&mut block.locals.children);
    children.sort_by_key(|c| c.locals.name.clone().unwrap_or_default());
    out.push((id, block));
    for child in children {
        let child_id = child.locals.id.clone().unwrap_or_default();
        push_with_children(out, child_id, child, level + 1);
    }
}

/// Computes the final section order from the explicit order and the
/// sections actually present.
///
/// Built-in sections with no explicit order come before custom sections,
/// with two exceptions: "about" comes last by default, and an explicitly
/// ordered built-in resets the insertion point so later built-ins follow
/// directly after it.
fn section_order(explicit: &[String], sections: &HashSet<String>) -> Vec<String> {
    let mut order: Vec<String> = explicit.to_vec();
    let mut insertion_idx = 0;
    for builtin in DEFAULT_ORDER {
        if let Some(pos) = order.iter().position(|id| id == builtin) {
            // Already ordered; later built-ins continue after it.
            insertion_idx = pos + 1;
        } else if sections.contains(*builtin) {
            order.insert(insertion_idx, builtin.to_string());
            insertion_idx += 1;
        }
    }
    if sections.contains("about") && !order.iter().any(|id| id == "about") {
        order.push("about".to_string());
    }
    order
}

/// One entry in the plugin's cross-module tag collections.
#[derive(Debug)]
struct TagEntry {
    full_name: String,
    tag: Option<String>,
}

/// State shared by every module of one plugin.
///
/// Plugin-wide metadata may be asserted by a directive in any block of any
/// file, but each key only once. Values from the plugin's descriptor file
/// are defaults: directives override them without error.
#[derive(Debug, Default)]
pub struct Plugin {
    pub name: String,
    author: Option<String>,
    tagline: Option<String>,
    stylization: Option<String>,
    library: Option<bool>,
    descriptor_author: Option<String>,
    descriptor_tagline: Option<String>,
    tags: HashMap<BlockType, Vec<TagEntry>>,
}

impl Plugin {
    pub fn new(name: &str) -> Self {
        Plugin {
            name: name.to_string(),
            ..Plugin::default()
        }
    }

    pub fn set_descriptor_author(&mut self, author: &str) {
        self.descriptor_author = Some(author.to_string());
    }

    pub fn set_descriptor_tagline(&mut self, tagline: &str) {
        self.descriptor_tagline = Some(tagline.to_string());
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref().or(self.descriptor_author.as_deref())
    }

    pub fn tagline(&self) -> Option<&str> {
        self.tagline
            .as_deref()
            .or(self.descriptor_tagline.as_deref())
    }

    pub fn stylization(&self) -> Option<&str> {
        self.stylization.as_deref()
    }

    pub fn is_library(&self) -> bool {
        self.library.unwrap_or(false)
    }

    /// Consumes a merged block: plugin-wide metadata plus the tag entry
    /// for cross-module lookups.
    pub fn merge(&mut self, block: &Block) -> Result<()> {
        if let Some(author) = &block.globals.author {
            set_once(&mut self.author, "author", author.clone())?;
        }
        if let Some(tagline) = &block.globals.tagline {
            set_once(&mut self.tagline, "tagline", tagline.clone())?;
        }
        if let Some(stylization) = &block.globals.stylization {
            set_once(&mut self.stylization, "stylization", stylization.clone())?;
        }
        if block.globals.library.is_some() {
            set_once(&mut self.library, "library", true)?;
        }
        if !matches!(
            block.type_state(),
            TypeState::Typed(BlockType::Section) | TypeState::Typed(BlockType::Backmatter)
        ) {
            if let Some(collection_type) = self.collection_type(block) {
                self.tags.entry(collection_type).or_default().push(TagEntry {
                    full_name: block.full_name(),
                    tag: block.tag_name(),
                });
            }
        }
        Ok(())
    }

    /// Which collection a block files under, or None to exclude it.
    ///
    /// Deprecated functions are dropped. In library mode private functions
    /// are dropped; otherwise only explicitly public functions are kept.
    /// Exception-tagged functions file under the exception collection.
    pub fn collection_type(&self, block: &Block) -> Option<BlockType> {
        let typ = match block.type_state() {
            TypeState::Typed(typ) => typ,
            _ => return None,
        };
        if typ == BlockType::Function {
            if block.locals.deprecated.is_some() {
                return None;
            }
            if self.is_library() && block.locals.private == Some(true) {
                return None;
            }
            if !self.is_library() && block.locals.private.unwrap_or(true) {
                return None;
            }
            if block.locals.exception.is_some() {
                return Some(BlockType::Exception);
            }
        }
        Some(typ)
    }

    /// Returns the tag for the given type and name. Unknown names get a
    /// plausible synthesized tag rather than an error.
    pub fn lookup_tag(&self, typ: BlockType, name: &str) -> Result<String> {
        // Support both @command(Name) and @command(:Name); settings
        // default to global scope.
        let full_name = match typ {
            BlockType::Command => name.trim_start_matches(':').to_string(),
            BlockType::Setting => docline::qualify_setting(name),
            _ => name.to_string(),
        };
        let candidates: Vec<&TagEntry> = self
            .tags
            .get(&typ)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.full_name == full_name && e.tag.is_some())
                    .collect()
            })
            .unwrap_or_default();
        if candidates.len() > 1 {
            return Err(ParseErrorKind::InvalidBlock(format!(
                "Found multiple {}s named {}",
                typ, name
            ))
            .into());
        }
        if let Some(entry) = candidates.first() {
            return Ok(entry.tag.clone().unwrap_or_default());
        }
        // No such entity documented; synthesize the default tag.
        let mut dummy = Block::new_typed(typ);
        dummy.set_name(&full_name).map_err(Error::from)?;
        Ok(dummy.tag_name().unwrap_or_default())
    }
}

fn set_once<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(ParseErrorKind::RedundantControl(key.to_string()).into());
    }
    *slot = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, id: &str) -> Block {
        let mut block = Block::new_typed(BlockType::Section);
        block.set_name(name).unwrap();
        block.set_id(id).unwrap();
        block
    }

    fn child_section(name: &str, id: &str, parent: &str) -> Block {
        let mut block = section(name, id);
        block.set_parent_section(parent).unwrap();
        block
    }

    fn public_function(namespace: &str, name: &str) -> Block {
        let mut block = Block::new_typed(BlockType::Function);
        block.set_name(name).unwrap();
        block.set_namespace(namespace).unwrap();
        block.set_private(false).unwrap();
        block.set_args(vec![]).unwrap();
        block.close().unwrap();
        block
    }

    fn chunk_ids(module: &Module) -> Vec<String> {
        module
            .chunks()
            .iter()
            .map(|b| {
                b.locals
                    .id
                    .clone()
                    .unwrap_or_else(|| b.full_name())
            })
            .collect()
    }

    #[test]
    fn single_section_roundtrip() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        module
            .merge(section("Introduction", "intro"), None, &mut plugin)
            .unwrap();
        module.close(&mut plugin).unwrap();
        assert_eq!(chunk_ids(&module), vec!["intro"]);
    }

    #[test]
    fn duplicate_explicit_sections_fail() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        module
            .merge(section("Introduction", "intro"), None, &mut plugin)
            .unwrap();
        let err = module
            .merge(section("Intro", "intro"), None, &mut plugin)
            .unwrap_err();
        match err {
            Error::Structure(StructureError::DuplicateSection(id)) => assert_eq!(id, "intro"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn default_section_loses_either_way() {
        // Default first, explicit second.
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        let mut default = Block::new_default(BlockType::Section);
        default.set_name("Config").unwrap();
        default.set_id("config").unwrap();
        module.merge(default, None, &mut plugin).unwrap();
        module
            .merge(section("Configuration", "config"), None, &mut plugin)
            .unwrap();
        module.close(&mut plugin).unwrap();
        let sections: Vec<_> = module.sections().collect();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].locals.name.as_deref(), Some("Configuration"));
        assert!(!sections[0].is_default());

        // Explicit first, default second.
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        module
            .merge(section("Configuration", "config"), None, &mut plugin)
            .unwrap();
        let mut default = Block::new_default(BlockType::Section);
        default.set_name("Config").unwrap();
        default.set_id("config").unwrap();
        module.merge(default, None, &mut plugin).unwrap();
        module.close(&mut plugin).unwrap();
        let sections: Vec<_> = module.sections().collect();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].locals.name.as_deref(), Some("Configuration"));
    }

    #[test]
    fn default_ordering_in_any_merge_order() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        // Merge in arbitrary order.
        module
            .merge(section("Commands", "commands"), None, &mut plugin)
            .unwrap();
        module
            .merge(section("About", "about"), None, &mut plugin)
            .unwrap();
        module
            .merge(section("Introduction", "intro"), None, &mut plugin)
            .unwrap();
        module.close(&mut plugin).unwrap();
        assert_eq!(chunk_ids(&module), vec!["intro", "commands", "about"]);
    }

    #[test]
    fn explicit_ordering_overrides_default() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        let mut intro = section("Introduction", "intro");
        intro
            .set_global_order(vec![
                "commands".to_string(),
                "about".to_string(),
                "intro".to_string(),
            ])
            .unwrap();
        module
            .merge(section("Commands", "commands"), None, &mut plugin)
            .unwrap();
        module
            .merge(section("About", "about"), None, &mut plugin)
            .unwrap();
        module.merge(intro, None, &mut plugin).unwrap();
        module.close(&mut plugin).unwrap();
        assert_eq!(chunk_ids(&module), vec!["commands", "about", "intro"]);
    }

    #[test]
    fn partial_ordering_inserts_builtins_after_nearest_explicit() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        let mut intro = section("Introduction", "intro");
        intro
            .set_global_order(vec![
                "custom1".to_string(),
                "intro".to_string(),
                "custom2".to_string(),
            ])
            .unwrap();
        for block in [
            section("Commands", "commands"),
            section("Custom2", "custom2"),
            section("About", "about"),
            intro,
            section("Custom1", "custom1"),
        ] {
            module.merge(block, None, &mut plugin).unwrap();
        }
        module.close(&mut plugin).unwrap();
        assert_eq!(
            chunk_ids(&module),
            vec!["custom1", "intro", "commands", "custom2", "about"]
        );
    }

    #[test]
    fn child_sections_follow_parent_sorted_by_name() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        let mut first = section("Section 1", "first");
        first
            .set_global_order(vec![
                "first".to_string(),
                "second".to_string(),
                "third".to_string(),
            ])
            .unwrap();
        // Merge in arbitrary order.
        for block in [
            section("Section 2", "second"),
            child_section("child12", "child12", "first"),
            section("Section 3", "third"),
            child_section("child11", "child11", "first"),
            first,
            child_section("child21", "child21", "second"),
        ] {
            module.merge(block, None, &mut plugin).unwrap();
        }
        module.close(&mut plugin).unwrap();
        assert_eq!(
            chunk_ids(&module),
            vec!["first", "child11", "child12", "second", "child21", "third"]
        );
        let levels: Vec<usize> = module.sections().map(|b| b.locals.level).collect();
        assert_eq!(levels, vec![0, 1, 1, 0, 1, 0]);
    }

    #[test]
    fn missing_parent_fails_at_close() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        module
            .merge(section("Section 1", "first"), None, &mut plugin)
            .unwrap();
        module
            .merge(
                child_section("Section 2", "second", "missing"),
                None,
                &mut plugin,
            )
            .unwrap();
        let err = module.close(&mut plugin).unwrap_err();
        match err {
            Error::Structure(StructureError::NoSuchParentSection(name, parent)) => {
                assert_eq!(name, "Section 2");
                assert_eq!(parent, "missing");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn child_of_child_fails_at_close() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        module
            .merge(section("Top", "top"), None, &mut plugin)
            .unwrap();
        module
            .merge(child_section("Mid", "mid", "top"), None, &mut plugin)
            .unwrap();
        module
            .merge(child_section("Leaf", "leaf", "mid"), None, &mut plugin)
            .unwrap();
        let err = module.close(&mut plugin).unwrap_err();
        assert!(matches!(
            err,
            Error::Structure(StructureError::NoSuchParentSection(_, _))
        ));
    }

    #[test]
    fn ordered_child_fails_at_close() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        let mut first = section("Section 1", "first");
        first
            .set_global_order(vec!["first".to_string(), "second".to_string()])
            .unwrap();
        module.merge(first, None, &mut plugin).unwrap();
        module
            .merge(
                child_section("Section 2", "second", "first"),
                None,
                &mut plugin,
            )
            .unwrap();
        let err = module.close(&mut plugin).unwrap_err();
        match err {
            Error::Structure(StructureError::OrderedChildSections(id, _)) => {
                assert_eq!(id, "second");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn neglected_custom_section_fails_at_close() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        let mut intro = section("Introduction", "intro");
        intro.set_global_order(vec!["intro".to_string()]).unwrap();
        module.merge(intro, None, &mut plugin).unwrap();
        module
            .merge(section("Extras", "extras"), None, &mut plugin)
            .unwrap();
        let err = module.close(&mut plugin).unwrap_err();
        match err {
            Error::Structure(StructureError::NeglectedSections(neglected, _)) => {
                assert_eq!(neglected, vec!["extras".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn backmatter_requires_section() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        let mut backmatter = Block::new_typed(BlockType::Backmatter);
        backmatter.set_id("nowhere").unwrap();
        module.merge(backmatter, None, &mut plugin).unwrap();
        let err = module.close(&mut plugin).unwrap_err();
        match err {
            Error::Structure(StructureError::NoSuchSection(id)) => assert_eq!(id, "nowhere"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn backmatter_emitted_after_its_section() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        module
            .merge(section("Introduction", "intro"), None, &mut plugin)
            .unwrap();
        module
            .merge(section("About", "about"), None, &mut plugin)
            .unwrap();
        let mut backmatter = Block::new_typed(BlockType::Backmatter);
        backmatter.set_id("intro").unwrap();
        module.merge(backmatter, None, &mut plugin).unwrap();
        module.close(&mut plugin).unwrap();
        assert_eq!(chunk_ids(&module), vec!["intro", "intro", "about"]);
    }

    #[test]
    fn ambiguous_block_is_fatal() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        let mut block = Block::new();
        block.set_type(TypeState::Untyped).unwrap();
        let err = module.merge(block, None, &mut plugin).unwrap_err();
        assert!(matches!(
            err,
            Error::Structure(StructureError::AmbiguousBlock)
        ));
    }

    #[test]
    fn unknown_block_dropped_silently() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        module.merge(Block::new(), None, &mut plugin).unwrap();
        module.close(&mut plugin).unwrap();
        assert!(module.chunks().is_empty());
    }

    #[test]
    fn functions_get_default_section_sorted_by_namespace() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        // Merged in reverse namespace order; definition order is kept
        // within a namespace.
        module
            .merge(public_function("zeta#", "Last"), None, &mut plugin)
            .unwrap();
        module
            .merge(public_function("alpha#", "First"), None, &mut plugin)
            .unwrap();
        module
            .merge(public_function("alpha#", "Second"), None, &mut plugin)
            .unwrap();
        module.close(&mut plugin).unwrap();
        assert_eq!(
            chunk_ids(&module),
            vec!["functions", "alpha#First", "alpha#Second", "zeta#Last"]
        );
    }

    #[test]
    fn redundant_order_directive_fails() {
        let mut plugin = Plugin::new("myplugin");
        let mut module = Module::new("myplugin");
        let mut first = section("One", "one");
        first.set_global_order(vec!["one".to_string()]).unwrap();
        let mut second = section("Two", "two");
        second.set_global_order(vec!["two".to_string()]).unwrap();
        module.merge(first, None, &mut plugin).unwrap();
        let err = module.merge(second, None, &mut plugin).unwrap_err();
        match err {
            Error::Parse(e) => assert_eq!(
                e.kind,
                ParseErrorKind::RedundantControl("order".to_string())
            ),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn visibility_depends_on_library_mode() {
        // Non-library plugins keep only explicitly public functions.
        let plugin = Plugin::new("myplugin");
        let mut unmarked = Block::new_typed(BlockType::Function);
        unmarked.set_name("Foo").unwrap();
        assert_eq!(plugin.collection_type(&unmarked), None);
        let mut public = Block::new_typed(BlockType::Function);
        public.set_name("Foo").unwrap();
        public.set_private(false).unwrap();
        assert_eq!(
            plugin.collection_type(&public),
            Some(BlockType::Function)
        );

        // Library plugins keep everything but private functions.
        let mut library = Plugin::new("mylib");
        let mut decl = Block::new();
        decl.set_global_library().unwrap();
        decl.set_type(TypeState::Typed(BlockType::Section)).unwrap();
        decl.set_id("intro").unwrap();
        decl.set_name("Intro").unwrap();
        library.merge(&decl).unwrap();
        assert_eq!(
            library.collection_type(&unmarked),
            Some(BlockType::Function)
        );
        let mut private = Block::new_typed(BlockType::Function);
        private.set_name("Hidden").unwrap();
        private.set_private(true).unwrap();
        assert_eq!(library.collection_type(&private), None);
    }

    #[test]
    fn deprecated_functions_are_dropped() {
        let mut plugin = Plugin::new("mylib");
        let mut decl = Block::new();
        decl.set_global_library().unwrap();
        decl.set_type(TypeState::Typed(BlockType::Section)).unwrap();
        decl.set_id("intro").unwrap();
        decl.set_name("Intro").unwrap();
        plugin.merge(&decl).unwrap();
        let mut block = Block::new_typed(BlockType::Function);
        block.set_name("Old").unwrap();
        block.set_deprecated("Use New instead.").unwrap();
        assert_eq!(plugin.collection_type(&block), None);
    }

    #[test]
    fn exception_tagged_functions_file_under_exceptions() {
        let mut plugin = Plugin::new("mylib");
        let mut decl = Block::new();
        decl.set_global_library().unwrap();
        decl.set_type(TypeState::Typed(BlockType::Section)).unwrap();
        decl.set_id("intro").unwrap();
        decl.set_name("Intro").unwrap();
        plugin.merge(&decl).unwrap();
        let mut block = Block::new_typed(BlockType::Function);
        block.set_name("NotFound").unwrap();
        block.set_exception(None).unwrap();
        assert_eq!(
            plugin.collection_type(&block),
            Some(BlockType::Exception)
        );
    }

    #[test]
    fn lookup_tag_finds_documented_commands() {
        let mut plugin = Plugin::new("myplugin");
        let mut command = Block::new_typed(BlockType::Command);
        command.set_name("Grep").unwrap();
        plugin.merge(&command).unwrap();
        assert_eq!(
            plugin.lookup_tag(BlockType::Command, "Grep").unwrap(),
            ":Grep"
        );
        assert_eq!(
            plugin.lookup_tag(BlockType::Command, ":Grep").unwrap(),
            ":Grep"
        );
    }

    #[test]
    fn lookup_tag_synthesizes_unknown_names() {
        let plugin = Plugin::new("myplugin");
        assert_eq!(
            plugin.lookup_tag(BlockType::Function, "no#Such").unwrap(),
            "no#Such()"
        );
        assert_eq!(
            plugin.lookup_tag(BlockType::Setting, "myvar").unwrap(),
            "g:myvar"
        );
    }
}
