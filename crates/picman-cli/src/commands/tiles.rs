//! Tiles command

use super::{format_size, parse_color, parse_format};
use crate::TilesArgs;
use anyhow::{Context as _, Result};
use picman_tiles::{Buffer, CacheEvent, Context, Progress, RegionIter};
use tracing::{debug, info, trace};

pub fn run(args: TilesArgs, ctx: &Context, verbose: u8) -> Result<()> {
    let format = parse_format(ctx, &args.format)?;
    let tile_size = args.tile_size.unwrap_or(ctx.tile_size());
    let mut buffer = Buffer::with_tile_size(ctx, args.width, args.height, format, tile_size)
        .context("Failed to create buffer")?;

    if let Some(color) = &args.fill {
        buffer.fill_color(parse_color(color)?)?;
        debug!(color = %color, "buffer filled");
    }

    let events = ctx.cache().subscribe()?;
    let progress = Progress::with_callback(|fraction| trace!(fraction, "walk progress"));
    let mut iter = RegionIter::new().with_progress(&progress);
    iter.add_read(&buffer, buffer.extent())?;

    let mut pixels = 0u64;
    let steps = iter.for_each(|step| {
        pixels += step.pixels();
        if verbose > 1 {
            println!("  step at ({}, {}) {}x{}", step.x, step.y, step.width, step.height);
        }
        Ok(())
    })?;

    let stats = ctx.cache().stats()?;
    let evicted = events
        .try_iter()
        .filter(|e| matches!(e, CacheEvent::Evicted { .. }))
        .count();
    info!(steps, pixels, "walk finished");

    println!("Buffer:      {}x{} {}", buffer.width(), buffer.height(), format);
    println!(
        "Tiles:       {}x{} of {} px ({} each)",
        buffer.tiles_x(),
        buffer.tiles_y(),
        tile_size,
        format_size(ctx.config().tile_bytes(format.bytes_per_pixel()))
    );
    println!("Steps:       {} (expected {})", steps, buffer.extent().tile_count(tile_size));
    println!("Pixels:      {}", pixels);
    println!(
        "Cache:       budget {} tiles, {} resident, {} hits, {} misses, {} evictions ({} during walk), {} flushes",
        ctx.cache().lock()?.budget(),
        stats.resident,
        stats.hits,
        stats.misses,
        stats.evictions,
        evicted,
        stats.flushes
    );
    Ok(())
}
