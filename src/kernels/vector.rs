use crate::error::Result;
use crate::kernel::{ArgKind, HostKernel, KernelArgs, WorkItem};

/// The element-wise transform of the multi-queue example.
#[inline]
pub fn vector_operation(x: i32) -> i32 {
    let x = x as f32;
    (x.sin() / 1319.0 + x.cos() / 1317.0 + (x + 13.0).cos() * (x - 13.0).sin()) as i32
}

pub struct VectorOperation;

impl HostKernel for VectorOperation {
    fn name(&self) -> &str {
        "vector_operation"
    }

    fn signature(&self) -> &[ArgKind] {
        &[ArgKind::Buffer("int"), ArgKind::Buffer("int")]
    }

    fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
        let src = args.buffer::<i32>(0)?;
        let dst = args.buffer::<i32>(1)?;
        let i = item.global_id(0);
        dst.set(i, vector_operation(src.get(i)));
        Ok(())
    }
}

pub struct VecAdd;

impl HostKernel for VecAdd {
    fn name(&self) -> &str {
        "vecadd"
    }

    fn signature(&self) -> &[ArgKind] {
        &[
            ArgKind::Buffer("int"),
            ArgKind::Buffer("int"),
            ArgKind::Buffer("int"),
        ]
    }

    fn run_item(&self, item: &WorkItem, args: &KernelArgs) -> Result<()> {
        let a = args.buffer::<i32>(0)?;
        let b = args.buffer::<i32>(1)?;
        let c = args.buffer::<i32>(2)?;
        let i = item.global_id(0);
        c.set(i, a.get(i).wrapping_add(b.get(i)));
        Ok(())
    }
}
