use crate::error::{Error, Result};
use crate::kernel::{ArgKind, HostKernel, KernelArgs, WorkGroup, WorkItem};

pub struct TransposePerElement;

impl HostKernel for TransposePerElement {
    fn name(&self) -> &str {
        "transpose_parallel_per_element"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Buffer("float"), ArgKind::Buffer("float")]
    }

    fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
        let input = args.buffer::<f32>(0)?;
        let output = args.buffer::<f32>(1)?;
        let n = item.global_size(0);
        let (i, j) = (item.global_id(0), item.global_id(1));
        output.set(i * n + j, input.get(j * n + i));
        Ok(())
    }
}

/// Tiled transpose. The group first copies its tile of the input into
/// local memory, then (after the barrier) writes the transposed tile out.
pub struct TransposeTiled;

impl HostKernel for TransposeTiled {
    fn name(&self) -> &str {
        "transpose_parallel_per_element_tiled"
    }

    fn signature(&self) -> &[ArgKind] {
        &[
            ArgKind::Buffer("float"),
            ArgKind::Buffer("float"),
            ArgKind::Local,
        ]
    }

    fn run_group(&self, group: &WorkGroup, args: &KernelArgs) -> Result<()> {
        let input = args.buffer::<f32>(0)?;
        let output = args.buffer::<f32>(1)?;
        let local_bytes = args.local_bytes(2)?;

        let tw = group.local_size(0);
        let th = group.local_size(1);
        let needed = tw * th * std::mem::size_of::<f32>();
        if local_bytes < needed {
            return Err(Error::execution(format!(
                "{}: tile needs {} bytes of local memory, {} given",
                self.name(),
                needed,
                local_bytes
            )));
        }

        let mut tile = vec![0.0f32; tw * th];
        let x0 = group.group_id(0) * group.enqueued_local_size(0);
        let y0 = group.group_id(1) * group.enqueued_local_size(1);
        let n = group.item([0; 3]).global_size(0);

        for item in group.items() {
            let (lx, ly) = (item.local_id(0), item.local_id(1));
            tile[ly * tw + lx] = input.get(item.global_id(1) * n + item.global_id(0));
        }

        // barrier(CLK_LOCAL_MEM_FENCE)

        for k in 0..tw * th {
            let tx = k % th;
            let ty = k / th;
            output.set((x0 + ty) * n + (y0 + tx), tile[tx * tw + ty]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, KernelArg, NdRange};
    use crate::memory::{DeviceBuffer, MemFlags};
    use std::sync::Arc;

    fn run(kernel: Arc<dyn HostKernel>, n: usize, wg: usize, local: Option<usize>) -> Vec<f32> {
        let data: Vec<f32> = (0..n * n).map(|v| v as f32).collect();
        let input = DeviceBuffer::from_slice(&data, MemFlags::ReadOnly);
        let output = DeviceBuffer::<f32>::new(n * n, MemFlags::WriteOnly);

        let mut k = Kernel::new(kernel);
        k.set_arg(0, &input).unwrap();
        k.set_arg(1, &output).unwrap();
        if let Some(bytes) = local {
            k.set_arg(2, KernelArg::local(bytes)).unwrap();
        }
        let args = k.bind().unwrap();

        let range = NdRange::grid(n, n).with_local([wg, wg, 1]);
        for g in 0..range.group_count() {
            k.body().run_group(&range.group(g), &args).unwrap();
        }
        output.to_vec()
    }

    fn expected(n: usize) -> Vec<f32> {
        let mut out = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                out[i * n + j] = (j * n + i) as f32;
            }
        }
        out
    }

    #[test]
    fn test_per_element_transpose() {
        assert_eq!(run(Arc::new(TransposePerElement), 6, 2, None), expected(6));
    }

    #[test]
    fn test_tiled_transpose_with_partial_tiles() {
        // 7 is not a multiple of 3, so the edge groups are partial
        assert_eq!(
            run(Arc::new(TransposeTiled), 7, 3, Some(3 * 3 * 4)),
            expected(7)
        );
    }

    #[test]
    fn test_tiled_transpose_rejects_small_local_memory() {
        let data = DeviceBuffer::<f32>::new(16, MemFlags::ReadWrite);
        let mut k = Kernel::new(Arc::new(TransposeTiled));
        k.set_arg(0, &data).unwrap();
        k.set_arg(1, &data).unwrap();
        k.set_arg(2, KernelArg::local(4)).unwrap();
        let args = k.bind().unwrap();
        let range = NdRange::grid(4, 4).with_local([2, 2, 1]);
        assert!(k.body().run_group(&range.group(0), &args).is_err());
    }
}
