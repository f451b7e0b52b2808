//! Tree rendering of a scanned solution.

use owo_colors::OwoColorize;

use sqlmig_scan::{MigrationRecord, MigrationStatus, PendingChangeRecord, SchemaContextDescriptor, Solution};

/// What the tree shows under each schema context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeView {
    /// Recorded migrations with status and creation time.
    Migrations,
    /// Model changes not yet captured by a migration.
    PendingChanges,
}

struct Node {
    label: String,
    children: Vec<Node>,
}

impl Node {
    fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }

    fn with_children(label: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            label: label.into(),
            children,
        }
    }
}

/// Render the solution as a tree: solution, projects, contexts, then the chosen view.
pub fn render_tree(solution: &Solution, view: TreeView, color: bool) -> String {
    let projects: Vec<Node> = solution
        .projects
        .iter()
        .map(|project| {
            let contexts = project
                .descriptors
                .iter()
                .map(|descriptor| context_node(descriptor, view, color))
                .collect();
            Node::with_children(paint(&project.name(), color, Paint::Bold), contexts)
        })
        .collect();

    let root = if projects.is_empty() {
        Node::with_children(solution.name(), vec![Node::leaf(paint(
            "(no migration projects)",
            color,
            Paint::Dim,
        ))])
    } else {
        Node::with_children(solution.name(), projects)
    };

    let mut out = String::new();
    out.push_str(&root.label);
    out.push('\n');
    render_children(&root.children, "", &mut out);
    out
}

fn context_node(descriptor: &SchemaContextDescriptor, view: TreeView, color: bool) -> Node {
    let label = paint(descriptor.short_name(), color, Paint::Cyan);

    let children = match view {
        TreeView::Migrations => {
            if descriptor.migrations.is_empty() {
                vec![Node::leaf(paint("(no migrations)", color, Paint::Dim))]
            } else {
                let width = descriptor
                    .migrations
                    .iter()
                    .map(|m| m.name.chars().count())
                    .max()
                    .unwrap_or(0);
                descriptor
                    .migrations
                    .iter()
                    .map(|m| Node::leaf(migration_row(m, width, color)))
                    .collect()
            }
        }
        TreeView::PendingChanges => {
            let changes = if descriptor.pending_changes.is_empty() {
                vec![Node::leaf(paint("(no pending changes)", color, Paint::Dim))]
            } else {
                descriptor
                    .pending_changes
                    .iter()
                    .map(|c| Node::leaf(change_row(c, color)))
                    .collect()
            };
            vec![Node::with_children("Pending Model Changes", changes)]
        }
    };

    Node::with_children(label, children)
}

fn migration_row(migration: &MigrationRecord, width: usize, color: bool) -> String {
    let created = migration
        .created_on
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "(no timestamp)".to_string());

    let row = format!(
        "{:<width$}  {:<7}  {}",
        migration.name,
        migration.status.to_string(),
        created,
        width = width
    );

    let paint_with = match migration.status {
        MigrationStatus::Applied => Paint::Green,
        MigrationStatus::Pending => Paint::Yellow,
        MigrationStatus::Unknown => Paint::White,
    };
    paint(&row, color, paint_with)
}

fn change_row(change: &PendingChangeRecord, color: bool) -> String {
    if change.destructive {
        paint(&format!("{} (destructive)", change.description), color, Paint::Red)
    } else {
        paint(&change.description, color, Paint::Yellow)
    }
}

fn render_children(children: &[Node], prefix: &str, out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let (branch, indent) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };

        out.push_str(prefix);
        out.push_str(branch);
        out.push_str(&child.label);
        out.push('\n');

        render_children(&child.children, &format!("{prefix}{indent}"), out);
    }
}

#[derive(Clone, Copy)]
enum Paint {
    Bold,
    Cyan,
    Dim,
    Green,
    Yellow,
    Red,
    White,
}

fn paint(text: &str, color: bool, with: Paint) -> String {
    if !color {
        return text.to_string();
    }

    match with {
        Paint::Bold => text.bold().to_string(),
        Paint::Cyan => text.cyan().to_string(),
        Paint::Dim => text.dimmed().to_string(),
        Paint::Green => text.green().to_string(),
        Paint::Yellow => text.yellow().to_string(),
        Paint::Red => text.red().to_string(),
        Paint::White => text.white().to_string(),
    }
}
