//! Plain-text rendering of a graph response for the `graph` subcommand.

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use perf_dashboard::service::dashboard::GraphResponse;

pub fn render_graph(graph: &GraphResponse) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["series", "group", "value", "unit", "runs", "cluster", "flag"]);

    for series in &graph.series {
        for point in &series.points {
            let flag = if point.is_baseline {
                "baseline"
            } else if point.has_different_cluster_version {
                "differs"
            } else {
                ""
            };
            table.add_row(vec![
                series.name.clone(),
                point.group_key.clone(),
                format!("{:.2}", point.value),
                point.unit.clone(),
                point.run_ids.join(","),
                point.cluster_version.clone(),
                flag.to_string(),
            ]);
        }
    }
    table
}
