use crate::error::Result;
use crate::kernel::{ArgKind, HostKernel, KernelArgs, WorkItem};

pub const HIST_BINS: usize = 256;

/// Bin of one sample; out-of-range values land in the first or last bin.
#[inline]
pub fn histogram_bin(value: i32) -> usize {
    value.clamp(0, HIST_BINS as i32 - 1) as usize
}

pub struct Histogram;

impl HostKernel for Histogram {
    fn name(&self) -> &str {
        "histogram"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Buffer("int"), ArgKind::Int, ArgKind::Buffer("int")]
    }

    fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
        let data = args.buffer::<i32>(0)?;
        let count = args.int(1)?.max(0) as usize;
        let hist = args.buffer::<i32>(2)?;

        let gid = item.global_id(0);
        if gid < count {
            hist.atomic_add(histogram_bin(data.get(gid)), 1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bins_clamp() {
        assert_eq!(histogram_bin(-5), 0);
        assert_eq!(histogram_bin(17), 17);
        assert_eq!(histogram_bin(300), 255);
    }
}
