//! Prompt context assembly.
//!
//! A synthesis prompt carries the node summary, member symbols grouped
//! by source file, the node's immediate graph neighborhood, and the list
//! of symbols already owned elsewhere (which must be linked, never
//! re-explained). A delegated parent instead receives its children's
//! finished overviews.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::constants::agent as defaults;
use crate::graph::DependencyGraph;
use crate::partition::ModuleNode;
use crate::types::{ModuleId, SymbolId};

/// Prompt for direct synthesis of one node from its member symbols.
pub fn synthesis_prompt(
    node: &ModuleNode,
    graph: &DependencyGraph,
    owned_elsewhere: &BTreeMap<SymbolId, ModuleId>,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Write reference documentation for the module `{}` ({} symbols, weight {}).",
        node.path,
        node.members.len(),
        node.weight
    );

    prompt.push_str("\n## Member symbols\n");
    for (file, symbols) in members_by_file(node, graph) {
        let _ = writeln!(prompt, "# {}", file);
        for id in symbols {
            let _ = writeln!(prompt, "\t{}", id);
        }
    }

    let neighborhood: Vec<String> = graph
        .boundary_edges(&node.members)
        .map(|e| format!("{} -{:?}-> {} (x{})", e.source, e.kind, e.target, e.weight))
        .collect();
    if !neighborhood.is_empty() {
        prompt.push_str("\n## Neighboring dependencies\n");
        for line in neighborhood {
            let _ = writeln!(prompt, "- {}", line);
        }
    }

    if !owned_elsewhere.is_empty() {
        prompt.push_str(
            "\n## Already documented elsewhere\n\
             Link these symbols instead of explaining them:\n",
        );
        for (symbol, owner) in owned_elsewhere {
            let _ = writeln!(prompt, "- {} (owned by {})", symbol, owner);
        }
    }

    prompt.push_str(
        "\nRespond with a JSON object: `body` (markdown), `described_symbols` \
         (member symbol ids you fully explained), `referenced_symbols` \
         (symbol ids you only linked).\n",
    );
    prompt
}

/// Prompt for a delegated parent: a thin overview composed from its
/// children's finished units.
pub fn overview_prompt(node: &ModuleNode, child_docs: &[(String, String)]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Write a short architectural overview of the module `{}` from its \
         sub-module documentation. Summarize responsibilities and how the \
         sub-modules relate; do not repeat symbol-level detail.",
        node.path
    );

    for (path, body) in child_docs {
        let _ = writeln!(prompt, "\n### {}\n{}", path, truncate(body));
    }

    prompt.push_str(
        "\nRespond with a JSON object: `body` (markdown overview), \
         `described_symbols` (leave empty), `referenced_symbols` (sub-module \
         symbols you mention).\n",
    );
    prompt
}

fn members_by_file<'a>(
    node: &'a ModuleNode,
    graph: &'a DependencyGraph,
) -> BTreeMap<String, BTreeSet<&'a SymbolId>> {
    let mut by_file: BTreeMap<String, BTreeSet<&SymbolId>> = BTreeMap::new();
    for id in &node.members {
        let file = graph
            .symbol(id)
            .and_then(|s| s.file())
            .unwrap_or("(unknown)")
            .to_string();
        by_file.entry(file).or_default().insert(id);
    }
    by_file
}

fn truncate(body: &str) -> &str {
    let limit = defaults::CHILD_OVERVIEW_MAX_CHARS;
    if body.len() <= limit {
        return body;
    }
    // Cut on a char boundary at or below the limit.
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
