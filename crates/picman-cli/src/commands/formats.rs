//! Formats command

use crate::FormatsArgs;
use anyhow::Result;
use picman_tiles::Context;

pub fn run(args: FormatsArgs, ctx: &Context, verbose: u8) -> Result<()> {
    let registry = ctx.registry();

    println!("{:<16} {:<18} {:>4} {:>7}", "NAME", "DESCRIPTION", "BPP", "LINEAR");
    for format in registry.formats() {
        println!(
            "{:<16} {:<18} {:>4} {:>7}",
            format.name(),
            registry.description(format),
            format.bytes_per_pixel(),
            if registry.is_linear(format) { "yes" } else { "no" },
        );

        if args.components || verbose > 0 {
            for index in 0..format.components() {
                let component =
                    registry.component_format(format.base_type(), format.precision(), index)?;
                println!("    {:<12} {}", component.name(), component.description());
            }
        }
    }
    Ok(())
}
