use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use phylotree::tree::Tree;
use thiserror::Error;
use tracing::{debug, info};

use crate::builder::TaxonIndex;
use crate::class::{parse_assignment, Class};

#[derive(Debug, Error)]
pub enum TreeIoError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}:{line}: cannot parse tree: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{}:{line}: {message}", path.display())]
    Assignment {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("no trees found in {}", .0.display())]
    Empty(PathBuf),
}

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Whole file as text, gunzipped when the name ends in `.gz`.
fn read_text(path: &Path) -> Result<String, TreeIoError> {
    let wrap = |source| TreeIoError::Read {
        path: path.to_path_buf(),
        source,
    };
    if is_gz(path) {
        let mut content = String::new();
        GzDecoder::new(File::open(path).map_err(wrap)?)
            .read_to_string(&mut content)
            .map_err(wrap)?;
        Ok(content)
    } else {
        fs::read_to_string(path).map_err(wrap)
    }
}

/// Drop bracketed comments such as `[&rate=0.12]` or `[100]` from a Newick
/// string while keeping everything else, branch lengths included.
fn strip_comments(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut depth = 0usize;
    for ch in newick.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => result.push(ch),
            _ => {}
        }
    }
    result
}

/// Read named gene trees from a Newick or NEXUS file.
///
/// Newick input holds one tree per non-empty line; lines starting with `#`
/// are skipped. Trees are named `<stem>_<k>` with `k` counted from 1.
/// NEXUS input (first line `#NEXUS`) is read from its tree block, keeping
/// the tree names and renaming leaves through the `TRANSLATE` table.
pub fn read_gene_trees<P: AsRef<Path>>(path: P) -> Result<Vec<(String, Tree)>, TreeIoError> {
    let path = path.as_ref();
    let content = read_text(path)?;

    let is_nexus = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.trim().eq_ignore_ascii_case("#NEXUS"));

    let trees = if is_nexus {
        read_nexus(path, &content)?
    } else {
        read_newick_lines(path, &content)?
    };

    if trees.is_empty() {
        return Err(TreeIoError::Empty(path.to_path_buf()));
    }
    info!("Read {} gene trees from {}", trees.len(), path.display());
    Ok(trees)
}

fn file_stem(path: &Path) -> &str {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("trees");
    let name = name.strip_suffix(".gz").unwrap_or(name);
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

fn parse_tree(path: &Path, line: usize, body: &str) -> Result<Tree, TreeIoError> {
    Tree::from_newick(strip_comments(body).trim()).map_err(|e| TreeIoError::Parse {
        path: path.to_path_buf(),
        line,
        message: e.to_string(),
    })
}

fn read_newick_lines(path: &Path, content: &str) -> Result<Vec<(String, Tree)>, TreeIoError> {
    let stem = file_stem(path);
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .enumerate()
        .map(|(k, (idx, line))| {
            let tree = parse_tree(path, idx + 1, line)?;
            Ok((format!("{stem}_{}", k + 1), tree))
        })
        .collect()
}

struct TreeBlock<'a> {
    line: usize,
    name: &'a str,
    body: &'a str,
}

/// `tree NAME = [&R] (...);` lines of the first tree block.
fn collect_tree_blocks(content: &str) -> Vec<TreeBlock<'_>> {
    content
        .lines()
        .enumerate()
        .skip_while(|(_, line)| !line.trim().to_ascii_uppercase().starts_with("TREE "))
        .take_while(|(_, line)| !line.trim().to_ascii_uppercase().starts_with("END;"))
        .filter_map(|(idx, line)| {
            let (header, body) = line.split_once('=')?;
            let name = header.split_whitespace().nth(1)?;
            Some(TreeBlock {
                line: idx + 1,
                name,
                body: body.trim(),
            })
        })
        .collect()
}

/// `TRANSLATE` entries such as `1 'human_1',`.
fn parse_translate_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        .filter_map(|line| {
            let line = line.trim().trim_end_matches([',', ';']);
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect()
}

fn rename_leaves(tree: &mut Tree, translate: &HashMap<String, String>) {
    for leaf_id in tree.get_leaves() {
        if let Ok(node) = tree.get_mut(&leaf_id) {
            if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
                node.name = Some(label.clone());
            }
        }
    }
}

fn read_nexus(path: &Path, content: &str) -> Result<Vec<(String, Tree)>, TreeIoError> {
    let translate = parse_translate_block(content);
    debug!("NEXUS translate table has {} entries", translate.len());
    collect_tree_blocks(content)
        .into_iter()
        .map(|block| {
            let mut tree = parse_tree(path, block.line, block.body)?;
            if !translate.is_empty() {
                rename_leaves(&mut tree, &translate);
            }
            Ok((block.name.to_string(), tree))
        })
        .collect()
}

/// Read a `taxon<TAB>class` table into a per-taxon assignment.
///
/// Taxa not listed stay unassigned. Blank lines and lines starting with `#`
/// are skipped. Naming a taxon the index does not know, or listing a taxon
/// twice, is an error.
pub fn read_assignment<P: AsRef<Path>>(
    path: P,
    index: &TaxonIndex,
) -> Result<Vec<Option<Class>>, TreeIoError> {
    let path = path.as_ref();
    let content = read_text(path)?;
    let fail = |line: usize, message: String| TreeIoError::Assignment {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut assignment = vec![None; index.len()];
    let mut seen = vec![false; index.len()];
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(name), Some(class), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(fail(idx + 1, format!("expected 'taxon<TAB>class', got '{line}'")));
        };
        let taxon = index
            .id(name)
            .ok_or_else(|| fail(idx + 1, format!("unknown taxon '{name}'")))?;
        if std::mem::replace(&mut seen[taxon], true) {
            return Err(fail(idx + 1, format!("taxon '{name}' listed twice")));
        }
        assignment[taxon] = parse_assignment(class).map_err(|e| fail(idx + 1, e.to_string()))?;
    }

    debug!(
        "Assignment assigns {} of {} taxa",
        assignment.iter().filter(|c| c.is_some()).count(),
        index.len()
    );
    Ok(assignment)
}

/// Write a labeled score column as TSV to a file or stdout.
/// If `path` ends with `.gz`, the output is gzip-compressed.
/// If `path` equals `-`, the table is written to stdout (uncompressed).
pub fn write_scores_tsv<P: AsRef<Path>, T: std::fmt::Display>(
    path: P,
    names: &[String],
    scores: &[T],
) -> io::Result<()> {
    if names.len() != scores.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} names for {} scores", names.len(), scores.len()),
        ));
    }

    let p = path.as_ref();
    let mut out: Box<dyn Write> = if p.as_os_str() == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else if is_gz(p) {
        let enc = GzEncoder::new(File::create(p)?, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    writeln!(&mut out, "name\tscore")?;
    for (name, score) in names.iter().zip(scores) {
        writeln!(&mut out, "{name}\t{score}")?;
    }

    out.flush()?;
    Ok(())
}
