use scopecapture::snapshot::{EnvelopeSample, SampleBlock};

/// Deterministic interleaved pseudo-random bytes
pub fn scrambled(num_samples: usize, channels: usize, seed: u32) -> Vec<u8> {
    (0..num_samples * channels)
        .map(|i| {
            let x = (i as u32).wrapping_mul(2_654_435_761).wrapping_add(seed);
            (x >> 13) as u8
        })
        .collect()
}

/// Split interleaved data into blocks of the given per-channel sample counts
pub fn split_blocks(data: &[u8], channels: usize, sizes: &[usize]) -> Vec<SampleBlock> {
    let mut blocks = Vec::new();
    let mut at = 0;
    for &size in sizes {
        let end = (at + size * channels).min(data.len());
        blocks.push(SampleBlock::new(data[at..end].to_vec(), channels));
        at = end;
    }
    if at < data.len() {
        blocks.push(SampleBlock::new(data[at..].to_vec(), channels));
    }
    blocks
}

/// Level-0 envelope computed directly from raw samples
pub fn naive_level0(
    data: &[u8],
    channels: usize,
    channel: usize,
    factor: usize,
) -> Vec<EnvelopeSample> {
    let values: Vec<u8> = data.iter().skip(channel).step_by(channels).copied().collect();
    values
        .chunks_exact(factor)
        .map(|w| EnvelopeSample {
            min: *w.iter().min().unwrap(),
            max: *w.iter().max().unwrap(),
        })
        .collect()
}

/// Next pyramid level computed directly from the one below
pub fn naive_next(level: &[EnvelopeSample], factor: usize) -> Vec<EnvelopeSample> {
    level
        .chunks_exact(factor)
        .map(|w| EnvelopeSample {
            min: w.iter().map(|s| s.min).min().unwrap(),
            max: w.iter().map(|s| s.max).max().unwrap(),
        })
        .collect()
}
