//! Composite command

use super::{parse_color, parse_format};
use crate::CompositeArgs;
use anyhow::Result;
use picman_ops::{Applicator, ApplyRequest, LayerMode};
use picman_tiles::{Buffer, Context};
use tracing::debug;

pub fn run(args: CompositeArgs, ctx: &Context, verbose: u8) -> Result<()> {
    let format = parse_format(ctx, &args.format)?;
    let mode = LayerMode::from_name(&args.mode)?;
    let applicator = Applicator::new(mode).with_opacity(args.opacity)?;
    let src_color = parse_color(&args.src)?;
    let dst_color = parse_color(&args.dst)?;

    let mut src = Buffer::new(ctx, args.size, args.size, format)?;
    src.fill_color(src_color)?;
    let mut dst = Buffer::new(ctx, args.size, args.size, format)?;
    dst.fill_color(dst_color)?;

    if verbose > 0 {
        println!(
            "Compositing {:?} onto {:?} with mode '{}' at opacity {}",
            src_color, dst_color, mode, args.opacity
        );
    }

    let area = applicator.apply(ApplyRequest::whole(&src), &mut dst, 0, 0)?;
    let (cx, cy) = (args.size / 2, args.size / 2);
    let color = dst.sample_color(cx, cy)?;
    let raw = dst.get_pixel(cx, cy)?;
    debug!(?area, ?color, "composite done");

    match area {
        Some(rect) => println!("Affected:    {rect}"),
        None => println!("Affected:    none"),
    }
    println!(
        "Pixel:       [{:.4}, {:.4}, {:.4}, {:.4}] ({})",
        color[0], color[1], color[2], color[3], format
    );
    println!("Raw bytes:   {:?}", raw);
    Ok(())
}
