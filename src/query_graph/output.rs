//! Graphviz output for query graphs.
//!
//! This is a debugging surface: it renders the merged graph with one cluster
//! per subgraph and entity edges crossing between clusters, either as raw DOT
//! source or wrapped as a link for an online viewer.

use std::fmt::Write;
use std::sync::Arc;

use petgraph::dot::Config;
use petgraph::dot::Dot;
use petgraph::graph::EdgeIndex;
use petgraph::stable_graph::StableGraph;

use crate::query_graph::QueryGraph;
use crate::query_graph::QueryGraphEdge;
use crate::query_graph::QueryGraphNode;

type StableInnerGraph = StableGraph<QueryGraphNode, QueryGraphEdge>;

const GRAPHVIZ_VIEWER_URL: &str = "https://dreampuf.github.io/GraphvizOnline/#";

fn label_edge(edge: &QueryGraphEdge) -> String {
    format!("label=\"{}\"", edge)
}

fn label_node(node: &QueryGraphNode) -> String {
    format!("label=\"{}\"", node)
}

impl QueryGraph {
    /// Renders the graph as DOT source, one cluster per subgraph.
    pub fn to_dot(&self) -> String {
        if self.sources.len() > 1 {
            return self
                .to_dot_clustered()
                .expect("formatting the query graph cannot fail");
        }
        let config = [Config::NodeNoLabel, Config::EdgeNoLabel];
        Dot::with_attr_getters(
            &self.graph,
            &config,
            &(|_, er| label_edge(er.weight())),
            &(|_, (_, node)| label_node(node)),
        )
        .to_string()
    }

    /// Renders the graph as a link to an online Graphviz viewer.
    pub fn to_dot_url(&self) -> String {
        let dot = self.to_dot();
        format!("{GRAPHVIZ_VIEWER_URL}{}", urlencoding::encode(&dot))
    }

    fn to_dot_clustered(&self) -> Result<String, std::fmt::Error> {
        fn edge_within_cluster(
            graph: &StableInnerGraph,
            cluster_name: &Arc<str>,
            edge_index: EdgeIndex,
        ) -> bool {
            graph.edge_endpoints(edge_index).is_some_and(|(n1, n2)| {
                graph[n1].source == *cluster_name && graph[n2].source == *cluster_name
            })
        }

        fn edge_across_clusters(graph: &StableInnerGraph, edge_index: EdgeIndex) -> bool {
            graph
                .edge_endpoints(edge_index)
                .is_some_and(|(n1, n2)| graph[n1].source != graph[n2].source)
        }

        // Build a stable graph, so the per-cluster filtered views keep the
        // same node indices as the merged graph.
        let stable_graph = StableGraph::from(self.graph.clone());
        let cluster_dot_config = [
            Config::NodeNoLabel,
            Config::EdgeNoLabel,
            Config::GraphContentOnly,
        ];

        let mut dot_str = String::new();
        writeln!(dot_str, "digraph \"query graph\" {{")?;

        for cluster_name in &self.sources {
            let filtered_graph: StableInnerGraph = stable_graph.filter_map(
                |_i, n| {
                    if n.source == *cluster_name {
                        Some(n.clone())
                    } else {
                        None
                    }
                },
                |i, e| {
                    if edge_within_cluster(&stable_graph, cluster_name, i) {
                        Some(e.clone())
                    } else {
                        None
                    }
                },
            );
            let s = Dot::with_attr_getters(
                &filtered_graph,
                &cluster_dot_config,
                &(|_, er| label_edge(er.weight())),
                &(|_, (_, node)| label_node(node)),
            )
            .to_string();

            writeln!(dot_str, "  subgraph \"cluster_{}\" {{", cluster_name)?;
            writeln!(dot_str, "    label = \"Subgraph \\\"{}\\\"\";", cluster_name)?;
            writeln!(dot_str, "    color = \"black\";")?;
            writeln!(dot_str, "    style = \"\";")?;
            dot_str.push_str(&s);
            writeln!(dot_str, "  }}")?;
        }

        // Entity and interface-object edges cross clusters and are printed at
        // the top level.
        for i in stable_graph.edge_indices() {
            if edge_across_clusters(&stable_graph, i) {
                if let Some((n1, n2)) = stable_graph.edge_endpoints(i) {
                    let edge = &stable_graph[i];
                    writeln!(
                        dot_str,
                        "  {} -> {} [{}]",
                        n1.index(),
                        n2.index(),
                        label_edge(edge)
                    )?;
                }
            }
        }

        writeln!(dot_str, "}}")?;
        Ok(dot_str)
    }
}
