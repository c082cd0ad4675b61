use std::fmt;

use itertools::Itertools;

use super::*;
use crate::selection::SelectionNode;
use crate::selection::write_selection_set;

/// Tracks nesting depth while the plan tree prints itself, two spaces per
/// level. Lines are opened explicitly, so a node controls exactly where its
/// braces and trailing commas land.
struct PlanWriter<'a, 'b> {
    depth: usize,
    out: &'a mut fmt::Formatter<'b>,
}

impl<'a, 'b> PlanWriter<'a, 'b> {
    fn new(out: &'a mut fmt::Formatter<'b>) -> Self {
        Self { depth: 0, out }
    }

    fn write<T: fmt::Display>(&mut self, value: T) -> fmt::Result {
        write!(self.out, "{value}")
    }

    fn nest(&mut self) {
        self.depth += 1;
    }

    fn unnest(&mut self) {
        self.depth -= 1;
    }

    /// Starts a fresh line at the current depth.
    fn line(&mut self) -> fmt::Result {
        write!(self.out, "\n{:indent$}", "", indent = self.depth * 2)
    }
}

struct DisplaySelectionSet<'a>(&'a [SelectionNode]);

impl fmt::Display for DisplaySelectionSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_selection_set(f, self.0)
    }
}

impl QueryPlan {
    fn print(&self, w: &mut PlanWriter<'_, '_>) -> fmt::Result {
        let Self { node } = self;
        w.write("QueryPlan {")?;
        if let Some(node) = node {
            w.nest();
            w.line()?;
            node.print(w)?;
            w.unnest();
            w.line()?;
        }
        w.write("}")
    }
}

impl PlanNode {
    fn print(&self, w: &mut PlanWriter<'_, '_>) -> fmt::Result {
        match self {
            Self::Fetch(node) => node.print(w),
            Self::Sequence(node) => node.print(w),
            Self::Parallel(node) => node.print(w),
            Self::Flatten(node) => node.print(w),
        }
    }
}

impl FetchNode {
    fn print(&self, w: &mut PlanWriter<'_, '_>) -> fmt::Result {
        let Self {
            service_name,
            variable_usages: _,
            requires,
            selection_set,
            operation: _,
            operation_kind: _,
        } = self;
        w.write(format_args!("Fetch(service: \"{service_name}\") {{"))?;
        w.nest();
        w.line()?;
        if let Some(requires) = requires {
            w.write(DisplaySelectionSet(std::slice::from_ref(requires)))?;
            w.write(" =>")?;
            w.line()?;
        }
        w.write(DisplaySelectionSet(selection_set))?;
        w.unnest();
        w.line()?;
        w.write("},")
    }
}

impl SequenceNode {
    fn print(&self, w: &mut PlanWriter<'_, '_>) -> fmt::Result {
        let Self { nodes } = self;
        w.write("Sequence {")?;
        if !nodes.is_empty() {
            w.nest();
            for node in nodes {
                w.line()?;
                node.print(w)?;
            }
            w.unnest();
            w.line()?;
        }
        w.write("},")
    }
}

impl ParallelNode {
    fn print(&self, w: &mut PlanWriter<'_, '_>) -> fmt::Result {
        let Self { nodes } = self;
        w.write("Parallel {")?;
        if !nodes.is_empty() {
            w.nest();
            for node in nodes {
                w.line()?;
                node.print(w)?;
            }
            w.unnest();
            w.line()?;
        }
        w.write("},")
    }
}

impl FlattenNode {
    fn print(&self, w: &mut PlanWriter<'_, '_>) -> fmt::Result {
        let Self { path, node } = self;
        w.write(format_args!(
            "Flatten(path: \"{}\") {{",
            path.iter().format(".")
        ))?;
        w.nest();
        w.line()?;
        node.print(w)?;
        w.unnest();
        w.line()?;
        w.write("},")
    }
}

impl fmt::Display for FetchPathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(name) => f.write_str(name),
            Self::AnyIndex => f.write_str("@"),
        }
    }
}

macro_rules! display_via_plan_writer {
    ($( $Ty: ty ),+ $(,)?) => {
        $(
            impl fmt::Display for $Ty {
                fn fmt(&self, output: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.print(&mut PlanWriter::new(output))
                }
            }
        )+
    };
}

display_via_plan_writer! {
    QueryPlan,
    PlanNode,
    FetchNode,
    SequenceNode,
    ParallelNode,
    FlattenNode,
}
