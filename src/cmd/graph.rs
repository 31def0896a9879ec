use anyhow::Result;
use url::Url;

use loopcast::{AppConfig, OverlayOverrides};

pub fn cmd_graph(config: &AppConfig, overrides: &OverlayOverrides) -> Result<()> {
    let stream = config.stream_config(overrides);
    let graph = config.graph_compiler().compile(&stream.overlay());
    let invocation = config.invocation_builder().build(&stream)?;

    println!("# filter graph");
    for stage in graph.split(';') {
        println!("{stage}");
    }

    println!();
    println!("# command");
    let args: Vec<String> = invocation
        .args
        .iter()
        .map(|arg| {
            if arg == stream.destination.trim() {
                redact_destination(arg)
            } else {
                quote(arg)
            }
        })
        .collect();
    println!("{} {}", invocation.program, args.join(" "));

    Ok(())
}

/// Hide the stream key (last path segment) of an ingest URL.
fn redact_destination(destination: &str) -> String {
    let Ok(mut url) = Url::parse(destination) else {
        return "<destination>".to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop().push("****");
    }
    url.to_string()
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || "'\"[]();$".contains(c)) {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}
