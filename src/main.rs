//! vimdoc — generate vim help files from plugin doc comments.
//!
//! Crawls a plugin directory for .vim sources, compiles their doc comments
//! into typed blocks, merges the blocks into modules (the main helpfile
//! plus any standalone autoload helpfiles), and writes doc/*.txt.

mod block;
mod error;
mod module;
mod paragraph;
mod parser;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use block::{Block, BlockType};
use module::{Module, Plugin};

/// Plugin subdirectories that are crawled for source files, directly and
/// under after/.
const DOC_SUBDIRS: &[&str] = &[
    "plugin",
    "instant",
    "autoload",
    "syntax",
    "indent",
    "ftdetect",
    "ftplugin",
    "spell",
    "colors",
];

#[derive(Parser)]
#[command(
    name = "vimdoc",
    version,
    about = "Generate vim help files from plugin doc comments"
)]
struct Cli {
    /// Plugin directory (the one containing plugin/, autoload/, etc.)
    plugin: PathBuf,

    /// Output directory for help files (defaults to <plugin>/doc)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

/// Optional plugin metadata descriptor. Values here are defaults; in-source
/// directives take precedence.
#[derive(Debug, Default, Deserialize)]
struct AddonInfo {
    name: Option<String>,
    author: Option<String>,
    description: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !cli.plugin.is_dir() {
        anyhow::bail!("{} not found", cli.plugin.display());
    }

    let (plugin, modules) = compile_plugin(&cli.plugin)?;

    let docdir = cli.output.unwrap_or_else(|| cli.plugin.join("doc"));
    fs::create_dir_all(&docdir)
        .with_context(|| format!("failed to create output directory: {}", docdir.display()))?;

    for module in &modules {
        let helpfile = render::Helpfile::new(module, &plugin);
        let filename = helpfile.filename();
        let text = helpfile.render()?;
        let path = docdir.join(&filename);
        fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Compiles every source file of a plugin into closed modules.
///
/// There can be several modules: the main helpfile, plus one per
/// standalone autoload subtree.
fn compile_plugin(directory: &Path) -> Result<(Plugin, Vec<Module>)> {
    let addon_info = read_addon_info(directory);
    let plugin_name = addon_info
        .name
        .clone()
        .unwrap_or_else(|| directory_name(directory));
    let mut plugin = Plugin::new(&plugin_name);
    if let Some(author) = &addon_info.author {
        plugin.set_descriptor_author(author);
    }
    if let Some(description) = &addon_info.description {
        plugin.set_descriptor_tagline(description);
    }

    // Parse every file up front; standalone detection needs the blocks.
    let mut paths_and_blocks: Vec<(String, Vec<Block>)> = Vec::new();
    let mut standalone_paths: Vec<String> = Vec::new();
    for file in source_files(directory)? {
        let relative = relative_path(&file, directory);
        let content = fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let mut blocks = parser::parse(&content, &relative)?;
        // Files entered through the plugin hook define an implicit flag
        // controlling whether they load at all.
        if !relative.starts_with("autoload/")
            && relative != "plugin/flags.vim"
            && relative != "instant/flags.vim"
            && contains_plugin_enter_call(&content)
        {
            blocks.push(implicit_flag_block(&relative)?);
        }
        if relative.starts_with("autoload/")
            && blocks
                .first()
                .is_some_and(|b| b.globals.standalone == Some(true))
        {
            standalone_paths.push(relative.clone());
        }
        paths_and_blocks.push((relative, blocks));
    }

    let mut modules: Vec<Module> = vec![Module::new(&plugin.name)];
    let mut standalone_index: HashMap<String, usize> = HashMap::new();
    for (path, blocks) in paths_and_blocks {
        let namespace = autoload_namespace(&path);
        let index = match matching_standalone(&path, &standalone_paths) {
            None => 0,
            Some(root) => *standalone_index.entry(root).or_insert_with(|| {
                let name = namespace
                    .as_deref()
                    .unwrap_or_default()
                    .trim_end_matches('#');
                modules.push(Module::new(name));
                modules.len() - 1
            }),
        };
        for block in blocks {
            modules[index].merge(block, namespace.as_deref(), &mut plugin)?;
        }
    }

    for module in &mut modules {
        module.close(&mut plugin)?;
    }
    Ok((plugin, modules))
}

/// All .vim files under the documented subdirectories, in sorted order so
/// output is reproducible run to run.
fn source_files(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for subdir in DOC_SUBDIRS {
        for root in [directory.join(subdir), directory.join("after").join(subdir)] {
            let pattern = format!("{}/**/*.vim", root.display());
            let entries =
                glob::glob(&pattern).with_context(|| format!("bad glob pattern: {}", pattern))?;
            for entry in entries {
                let path = entry?;
                if path.is_file() {
                    files.push(path);
                }
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn relative_path(file: &Path, directory: &Path) -> String {
    file.strip_prefix(directory)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

fn directory_name(directory: &Path) -> String {
    directory
        .canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(directory)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plugin".to_string())
}

fn read_addon_info(directory: &Path) -> AddonInfo {
    let path = directory.join("addon-info.json");
    if !path.is_file() {
        return AddonInfo::default();
    }
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("warning: failed to read {}: {}", path.display(), e);
            return AddonInfo::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("warning: failed to read {}: {}", path.display(), e);
            AddonInfo::default()
        }
    }
}

/// The function namespace a file's path implies, e.g.
/// autoload/mylib/util.vim -> mylib#util#.
fn autoload_namespace(relative: &str) -> Option<String> {
    relative
        .strip_prefix("autoload/")
        .and_then(|path| path.strip_suffix(".vim"))
        .map(|path| format!("{}#", path.replace('/', "#")))
}

/// The standalone root this path belongs to, if any: the root file itself
/// or anything under its directory subtree.
fn matching_standalone(path: &str, standalones: &[String]) -> Option<String> {
    for standalone in standalones {
        if path == standalone {
            return Some(standalone.clone());
        }
        if let Some(stem) = standalone.strip_suffix(".vim") {
            if path.starts_with(&format!("{}/", stem)) {
                return Some(standalone.clone());
            }
        }
    }
    None
}

/// Whether any code line enters the plugin through the maktaba hook.
fn contains_plugin_enter_call(content: &str) -> bool {
    content
        .lines()
        .any(|line| !parser::is_comment(line) && line.contains("maktaba#plugin#Enter("))
}

/// A synthesized flag block for a hook-entered file. Overridable: an
/// explicit doc block for the same flag wins.
fn implicit_flag_block(relative: &str) -> Result<Block> {
    let flagpath = relative.strip_prefix("after/").unwrap_or(relative);
    let stem = flagpath.strip_suffix(".vim").unwrap_or(flagpath);
    let mut parts = stem.split('/');
    let mut flagname = parts.next().unwrap_or_default().to_string();
    for part in parts {
        flagname.push('[');
        flagname.push_str(part);
        flagname.push(']');
    }
    let mut flag = Block::new_default(BlockType::Flag);
    flag.set_name(&flagname)?;
    flag.add_line(&format!(
        "Configures whether {} should be loaded.",
        relative
    ));
    let default = if flagname == "plugin[mappings]" { 0 } else { 1 };
    // An unbulleted list keeps the value on its own line; the backtick
    // avoids helpfile syntax highlighting.
    flag.add_line(&format!(" - Default: {} `", default));
    flag.close()?;
    Ok(flag)
}
