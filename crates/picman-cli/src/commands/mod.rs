//! CLI command implementations

pub mod composite;
pub mod formats;
pub mod tiles;

use anyhow::{Context as _, Result, bail};
use picman_core::Format;
use picman_tiles::{Context, CoreConfig};
use std::path::Path;
use tracing::debug;

/// Build the session context from an optional YAML file plus environment.
/// A non-zero `threads` overrides the configured worker count.
pub fn load_context(path: Option<&Path>, threads: usize) -> Result<Context> {
    let config = match path {
        Some(path) => CoreConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => CoreConfig::default(),
    };
    let mut config = config.apply_env();
    if threads > 0 {
        config.num_processors = threads;
    }
    debug!(?config, "configuration");
    Context::new(config).context("Invalid configuration")
}

/// Look up a format by its registry name
pub fn parse_format(ctx: &Context, name: &str) -> Result<Format> {
    ctx.registry()
        .lookup(name)
        .with_context(|| format!("Unknown format '{name}' (see `picman formats`)"))
}

/// Parse "R,G,B" or "R,G,B,A" into RGBA
pub fn parse_color(s: &str) -> Result<[f32; 4]> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid color '{s}'"))?;
    match values.as_slice() {
        [r, g, b] => Ok([*r, *g, *b, 1.0]),
        [r, g, b, a] => Ok([*r, *g, *b, *a]),
        _ => bail!("Color '{}' needs 3 or 4 components, got {}", s, values.len()),
    }
}

/// Format byte count for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
