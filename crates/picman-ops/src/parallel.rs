//! Row dispatch for blending.
//!
//! With the `parallel` feature the rows of one iterator step are blended on
//! the context's worker pool; otherwise they run in order on the calling
//! thread. Steps themselves are always sequential, so progress reports keep
//! their order.

use picman_tiles::Context;

use crate::OpsResult;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Runs `f` on every item.
#[cfg(feature = "parallel")]
pub(crate) fn for_each_row<T, F>(ctx: &Context, rows: Vec<T>, f: F) -> OpsResult<()>
where
    T: Send,
    F: Fn(T) + Sync + Send,
{
    ctx.pool()?.install(|| rows.into_par_iter().for_each(f));
    Ok(())
}

/// Runs `f` on every item.
#[cfg(not(feature = "parallel"))]
pub(crate) fn for_each_row<T, F>(_ctx: &Context, rows: Vec<T>, f: F) -> OpsResult<()>
where
    F: Fn(T),
{
    rows.into_iter().for_each(f);
    Ok(())
}
