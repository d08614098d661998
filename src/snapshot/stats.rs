//! Running statistics over a captured channel.
//!
//! Samples are summed in fixed-size blocks and each block's partial sum is
//! normalised by the total sample count before it joins the running total,
//! which keeps the accumulator near the final value's magnitude.

use crate::snapshot::ChannelView;

fn block_normalized_sum(view: ChannelView<'_>, block: usize, term: impl Fn(u8) -> f64) -> f64 {
    let total = view.len();
    if total == 0 {
        return 0.0;
    }
    let block = block.max(1);
    (0..total)
        .step_by(block)
        .map(|from| {
            let partial: f64 = view.slice(from, from + block).iter().map(&term).sum();
            partial / total as f64
        })
        .sum()
}

/// Root-mean-square deviation from `zero_offset`
pub fn vrms(view: ChannelView<'_>, zero_offset: f64, block: usize) -> f64 {
    block_normalized_sum(view, block, |v| {
        let dev = zero_offset - v as f64;
        dev * dev
    })
    .sqrt()
}

pub fn vmean(view: ChannelView<'_>, block: usize) -> f64 {
    block_normalized_sum(view, block, |v| v as f64)
}
