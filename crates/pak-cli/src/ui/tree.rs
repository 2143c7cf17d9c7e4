use pak_schema::DependencyTree;

/// Render a dependency tree with box-drawing guides, one node per line.
pub fn render_tree(tree: &DependencyTree) -> Vec<String> {
    let mut lines = Vec::new();
    for (key, child) in tree.iter() {
        lines.push(key.clone());
        render_children(child, "", &mut lines);
    }
    lines
}

fn render_children(tree: &DependencyTree, prefix: &str, lines: &mut Vec<String>) {
    let count = tree.len();
    for (i, (key, child)) in tree.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        lines.push(format!("{prefix}{branch}{key}"));
        let next = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_children(child, &next, lines);
    }
}
