use std::fmt::{Display, Formatter as FmtFormatter, Result as FmtResult};

use petgraph::stable_graph::NodeIndex;
use rustc_hash::FxHashSet;

use crate::plan::{
    fetch::{EntityReference, Fetch},
    LoadPlan, LoadPlanNode,
};

pub fn get_indent(depth: usize) -> String {
    "  ".repeat(depth)
}

pub trait PrettyDisplay {
    fn pretty_fmt(&self, f: &mut FmtFormatter<'_>, depth: usize) -> FmtResult;
}

impl Display for LoadPlan {
    fn fmt(&self, f: &mut FmtFormatter<'_>) -> FmtResult {
        self.pretty_fmt(f, 0)
    }
}

impl PrettyDisplay for LoadPlan {
    fn pretty_fmt(&self, f: &mut FmtFormatter<'_>, depth: usize) -> FmtResult {
        let indent = get_indent(depth);
        let mut printed = FxHashSet::default();

        writeln!(f, "{indent}LoadPlan {{")?;
        for root in self.returns() {
            self.fmt_node(f, *root, depth + 1, &mut printed)?;
        }
        writeln!(f, "{indent}}},")
    }
}

impl LoadPlan {
    fn fmt_node(
        &self,
        f: &mut FmtFormatter<'_>,
        index: NodeIndex,
        depth: usize,
        printed: &mut FxHashSet<NodeIndex>,
    ) -> FmtResult {
        let indent = get_indent(depth);
        let Ok(node) = self.node(index) else {
            return writeln!(f, "{indent}Missing(node: {}),", index.index());
        };

        if !printed.insert(index) {
            return writeln!(f, "{indent}Ref(path: \"{}\"),", node.property_path());
        }

        let header = match node {
            LoadPlanNode::EntityReturn(entity_return) => format!(
                "EntityReturn(entity: \"{}\", alias: \"{}\")",
                entity_return.entity_persister().entity_name,
                entity_return.table_alias()
            ),
            LoadPlanNode::EntityFetch(fetch) => format!(
                "EntityFetch(path: \"{}\", entity: \"{}\", alias: \"{}\", strategy: {})",
                Fetch::property_path(fetch),
                fetch.entity_persister().entity_name,
                fetch.table_alias(),
                fetch.fetch_strategy()
            ),
            LoadPlanNode::CollectionFetch(fetch) => format!(
                "CollectionFetch(path: \"{}\", element: \"{}\", alias: \"{}\", strategy: {})",
                Fetch::property_path(fetch),
                fetch.entity_persister().entity_name,
                fetch.table_alias(),
                fetch.fetch_strategy()
            ),
            LoadPlanNode::CompositeFetch(fetch) => {
                format!("CompositeFetch(path: \"{}\")", Fetch::property_path(fetch))
            }
        };

        let children = self.fetches_of(index);
        if children.is_empty() {
            return writeln!(f, "{indent}{header},");
        }

        writeln!(f, "{indent}{header} {{")?;
        for child in children {
            self.fmt_node(f, child, depth + 1, printed)?;
        }
        writeln!(f, "{indent}}},")
    }
}
