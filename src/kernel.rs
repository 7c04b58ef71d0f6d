//! Kernel entry points, arguments and the NDRange index space.

use crate::error::{Error, Result};
use crate::memory::{AnyBuffer, DeviceBuffer, Scalar};
use std::fmt;
use std::sync::Arc;

/// Work-group size used per dimension when a launch does not give one.
pub const DEFAULT_LOCAL_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    dims: usize,
    offset: [usize; 3],
    global: [usize; 3],
    local: Option<[usize; 3]>,
}

impl NdRange {
    pub fn linear(global: usize) -> Self {
        Self {
            dims: 1,
            offset: [0; 3],
            global: [global, 1, 1],
            local: None,
        }
    }

    pub fn grid(width: usize, height: usize) -> Self {
        Self {
            dims: 2,
            offset: [0; 3],
            global: [width, height, 1],
            local: None,
        }
    }

    pub fn volume(x: usize, y: usize, z: usize) -> Self {
        Self {
            dims: 3,
            offset: [0; 3],
            global: [x, y, z],
            local: None,
        }
    }

    pub fn with_offset(mut self, offset: [usize; 3]) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_local(mut self, local: [usize; 3]) -> Self {
        self.local = Some(local);
        self
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn offset(&self) -> [usize; 3] {
        self.offset
    }

    pub fn global(&self) -> [usize; 3] {
        self.global
    }

    /// The requested work-group size, or the default one.
    pub fn local(&self) -> [usize; 3] {
        self.local.unwrap_or_else(|| {
            let mut local = [1; 3];
            for d in 0..self.dims {
                local[d] = self.global[d].clamp(1, DEFAULT_LOCAL_SIZE);
            }
            local
        })
    }

    pub fn work_items(&self) -> usize {
        self.global.iter().product()
    }

    /// Work-groups per dimension. The last group in a dimension may be
    /// partial when the global size is not a multiple of the local size.
    pub fn group_counts(&self) -> [usize; 3] {
        let local = self.local();
        let mut counts = [1; 3];
        for d in 0..3 {
            counts[d] = (self.global[d] + local[d] - 1) / local[d];
        }
        counts
    }

    pub fn group_count(&self) -> usize {
        if self.work_items() == 0 {
            return 0;
        }
        self.group_counts().iter().product()
    }

    pub fn validate(&self, max_work_group_size: usize) -> Result<()> {
        if !(1..=3).contains(&self.dims) {
            return Err(Error::ndrange(format!("{} dimensions", self.dims)));
        }
        for d in self.dims..3 {
            if self.global[d] != 1 || self.offset[d] != 0 {
                return Err(Error::ndrange(format!(
                    "dimension {} used by a {}-D range",
                    d, self.dims
                )));
            }
        }

        let local = self.local();
        if local.iter().any(|&l| l == 0) {
            return Err(Error::ndrange("local size must be > 0 in every dimension"));
        }
        let group_items: usize = local.iter().product();
        if group_items > max_work_group_size {
            return Err(Error::ndrange(format!(
                "work-group of {} items exceeds device maximum {}",
                group_items, max_work_group_size
            )));
        }

        for d in 0..3 {
            if self.offset[d].checked_add(self.global[d]).is_none() {
                return Err(Error::ndrange("offset + global size overflows"));
            }
        }
        Ok(())
    }

    /// The work-group with linear index `index` (x fastest).
    pub fn group(&self, index: usize) -> WorkGroup {
        let counts = self.group_counts();
        let group_id = [
            index % counts[0],
            (index / counts[0]) % counts[1],
            index / (counts[0] * counts[1]),
        ];
        let enqueued_local = self.local();
        let mut local_size = [1; 3];
        for d in 0..3 {
            let start = group_id[d] * enqueued_local[d];
            local_size[d] = enqueued_local[d].min(self.global[d] - start);
        }
        WorkGroup {
            range: *self,
            group_id,
            local_size,
            enqueued_local,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkGroup {
    range: NdRange,
    group_id: [usize; 3],
    local_size: [usize; 3],
    enqueued_local: [usize; 3],
}

impl WorkGroup {
    pub fn group_id(&self, dim: usize) -> usize {
        self.group_id[dim]
    }

    /// Actual size of this group, smaller than the enqueued size for a
    /// trailing partial group.
    pub fn local_size(&self, dim: usize) -> usize {
        self.local_size[dim]
    }

    pub fn enqueued_local_size(&self, dim: usize) -> usize {
        self.enqueued_local[dim]
    }

    pub fn len(&self) -> usize {
        self.local_size.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn item(&self, local_id: [usize; 3]) -> WorkItem {
        let mut global_id = [0; 3];
        for d in 0..3 {
            global_id[d] =
                self.range.offset[d] + self.group_id[d] * self.enqueued_local[d] + local_id[d];
        }
        WorkItem {
            global_id,
            local_id,
            group_id: self.group_id,
            local_size: self.local_size,
            global_size: self.range.global,
            global_offset: self.range.offset,
        }
    }

    /// Work-items of this group, x fastest.
    pub fn items(&self) -> impl Iterator<Item = WorkItem> + '_ {
        let [lx, ly, lz] = self.local_size;
        (0..lz).flat_map(move |z| {
            (0..ly).flat_map(move |y| (0..lx).map(move |x| self.item([x, y, z])))
        })
    }
}

/// One invocation of a kernel body, with the OpenCL work-item builtins.
#[derive(Debug, Clone, Copy)]
pub struct WorkItem {
    global_id: [usize; 3],
    local_id: [usize; 3],
    group_id: [usize; 3],
    local_size: [usize; 3],
    global_size: [usize; 3],
    global_offset: [usize; 3],
}

impl WorkItem {
    pub fn global_id(&self, dim: usize) -> usize {
        self.global_id[dim]
    }

    pub fn local_id(&self, dim: usize) -> usize {
        self.local_id[dim]
    }

    pub fn group_id(&self, dim: usize) -> usize {
        self.group_id[dim]
    }

    pub fn local_size(&self, dim: usize) -> usize {
        self.local_size[dim]
    }

    pub fn global_size(&self, dim: usize) -> usize {
        self.global_size[dim]
    }

    pub fn global_offset(&self, dim: usize) -> usize {
        self.global_offset[dim]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Buffer(&'static str),
    Int,
    UInt,
    Float,
    Local,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Buffer(ty) => write!(f, "__global {}*", ty),
            ArgKind::Int => write!(f, "int"),
            ArgKind::UInt => write!(f, "uint"),
            ArgKind::Float => write!(f, "float"),
            ArgKind::Local => write!(f, "__local memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum KernelArg {
    Buffer(AnyBuffer),
    Int(i32),
    UInt(u32),
    Float(f32),
    /// Size in bytes of a `__local` allocation.
    Local(usize),
}

impl KernelArg {
    pub fn kind(&self) -> ArgKind {
        match self {
            KernelArg::Buffer(b) => ArgKind::Buffer(b.type_name()),
            KernelArg::Int(_) => ArgKind::Int,
            KernelArg::UInt(_) => ArgKind::UInt,
            KernelArg::Float(_) => ArgKind::Float,
            KernelArg::Local(_) => ArgKind::Local,
        }
    }

    pub fn local(bytes: usize) -> Self {
        KernelArg::Local(bytes)
    }
}

impl<T: Scalar> From<&DeviceBuffer<T>> for KernelArg {
    fn from(buffer: &DeviceBuffer<T>) -> Self {
        KernelArg::Buffer(T::wrap(buffer.clone()))
    }
}

impl From<i32> for KernelArg {
    fn from(v: i32) -> Self {
        KernelArg::Int(v)
    }
}

impl From<u32> for KernelArg {
    fn from(v: u32) -> Self {
        KernelArg::UInt(v)
    }
}

impl From<f32> for KernelArg {
    fn from(v: f32) -> Self {
        KernelArg::Float(v)
    }
}

/// The argument values a launch captured when it was enqueued.
#[derive(Debug, Clone)]
pub struct KernelArgs {
    kernel: String,
    args: Vec<KernelArg>,
}

impl KernelArgs {
    fn get(&self, index: usize) -> Result<&KernelArg> {
        self.args.get(index).ok_or_else(|| Error::ArgIndex {
            kernel: self.kernel.clone(),
            index,
            arity: self.args.len(),
        })
    }

    fn type_error(&self, index: usize, expected: ArgKind) -> Error {
        Error::ArgType {
            kernel: self.kernel.clone(),
            index,
            expected: expected.to_string(),
        }
    }

    pub fn buffer<T: Scalar>(&self, index: usize) -> Result<&DeviceBuffer<T>> {
        match self.get(index)? {
            KernelArg::Buffer(b) => {
                T::unwrap(b).ok_or_else(|| self.type_error(index, ArgKind::Buffer(T::NAME)))
            }
            _ => Err(self.type_error(index, ArgKind::Buffer(T::NAME))),
        }
    }

    pub fn int(&self, index: usize) -> Result<i32> {
        match self.get(index)? {
            KernelArg::Int(v) => Ok(*v),
            _ => Err(self.type_error(index, ArgKind::Int)),
        }
    }

    pub fn uint(&self, index: usize) -> Result<u32> {
        match self.get(index)? {
            KernelArg::UInt(v) => Ok(*v),
            _ => Err(self.type_error(index, ArgKind::UInt)),
        }
    }

    pub fn float(&self, index: usize) -> Result<f32> {
        match self.get(index)? {
            KernelArg::Float(v) => Ok(*v),
            _ => Err(self.type_error(index, ArgKind::Float)),
        }
    }

    pub fn local_bytes(&self, index: usize) -> Result<usize> {
        match self.get(index)? {
            KernelArg::Local(n) => Ok(*n),
            _ => Err(self.type_error(index, ArgKind::Local)),
        }
    }
}

/// Host implementation of a kernel entry point.
///
/// Simple kernels implement `run_item`. Kernels that share `__local`
/// memory across a work-group override `run_group` and split the body at
/// each barrier into a loop over the group's items.
pub trait HostKernel: Send + Sync {
    fn name(&self) -> &str;

    fn signature(&self) -> &[ArgKind];

    fn run_item(&self, _item: &WorkItem, _args: &KernelArgs) -> Result<()> {
        Err(Error::execution(format!(
            "kernel '{}' has no per-item body",
            self.name()
        )))
    }

    fn run_group(&self, group: &WorkGroup, args: &KernelArgs) -> Result<()> {
        for item in group.items() {
            self.run_item(&item, args)?;
        }
        Ok(())
    }
}

/// A kernel object: an entry point plus its argument slots.
#[derive(Clone)]
pub struct Kernel {
    body: Arc<dyn HostKernel>,
    args: Vec<Option<KernelArg>>,
}

impl Kernel {
    pub(crate) fn new(body: Arc<dyn HostKernel>) -> Self {
        let arity = body.signature().len();
        Self {
            body,
            args: vec![None; arity],
        }
    }

    pub fn name(&self) -> &str {
        self.body.name()
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn set_arg<A: Into<KernelArg>>(&mut self, index: usize, arg: A) -> Result<()> {
        let arg = arg.into();
        let expected = *self
            .body
            .signature()
            .get(index)
            .ok_or_else(|| Error::ArgIndex {
                kernel: self.name().to_string(),
                index,
                arity: self.arity(),
            })?;

        if arg.kind() != expected {
            return Err(Error::ArgType {
                kernel: self.name().to_string(),
                index,
                expected: expected.to_string(),
            });
        }

        self.args[index] = Some(arg);
        Ok(())
    }

    /// Snapshot the arguments for a launch; every slot must be set.
    pub(crate) fn bind(&self) -> Result<KernelArgs> {
        let args = self
            .args
            .iter()
            .enumerate()
            .map(|(index, arg)| {
                arg.clone().ok_or_else(|| Error::MissingArg {
                    kernel: self.name().to_string(),
                    index,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(KernelArgs {
            kernel: self.name().to_string(),
            args,
        })
    }

    pub(crate) fn body(&self) -> &Arc<dyn HostKernel> {
        &self.body
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemFlags;

    struct Probe;

    impl HostKernel for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn signature(&self) -> &[ArgKind] {
            &[ArgKind::Buffer("int"), ArgKind::Int]
        }
    }

    #[test]
    fn test_linear_range_with_offset() {
        let range = NdRange::linear(10)
            .with_offset([100, 0, 0])
            .with_local([4, 1, 1]);
        assert!(range.validate(256).is_ok());
        assert_eq!(range.group_count(), 3);

        let last = range.group(2);
        assert_eq!(last.local_size(0), 2);
        let ids: Vec<usize> = last.items().map(|i| i.global_id(0)).collect();
        assert_eq!(ids, vec![108, 109]);
    }

    #[test]
    fn test_grid_groups_cover_every_item() {
        let range = NdRange::grid(5, 3).with_local([2, 2, 1]);
        let mut seen = Vec::new();
        for g in 0..range.group_count() {
            for item in range.group(g).items() {
                seen.push((item.global_id(0), item.global_id(1)));
            }
        }
        seen.sort();
        let mut expected: Vec<(usize, usize)> =
            (0..5).flat_map(|x| (0..3).map(move |y| (x, y))).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_empty_range_has_no_groups() {
        assert_eq!(NdRange::linear(0).group_count(), 0);
    }

    #[test]
    fn test_range_validation() {
        assert!(NdRange::linear(16)
            .with_local([0, 1, 1])
            .validate(256)
            .is_err());
        assert!(NdRange::grid(64, 64)
            .with_local([32, 32, 1])
            .validate(256)
            .is_err());
        assert!(NdRange::linear(16)
            .with_offset([0, 3, 0])
            .validate(256)
            .is_err());
    }

    #[test]
    fn test_set_arg_checks_type_and_index() {
        let mut k = Kernel::new(Arc::new(Probe));
        let ints = DeviceBuffer::<i32>::new(4, MemFlags::ReadWrite);
        let floats = DeviceBuffer::<f32>::new(4, MemFlags::ReadWrite);

        assert!(k.set_arg(0, &ints).is_ok());
        assert!(matches!(k.set_arg(0, &floats), Err(Error::ArgType { .. })));
        assert!(matches!(k.set_arg(1, 2.5f32), Err(Error::ArgType { .. })));
        assert!(matches!(k.set_arg(2, 1i32), Err(Error::ArgIndex { .. })));
    }

    #[test]
    fn test_bind_requires_all_args() {
        let mut k = Kernel::new(Arc::new(Probe));
        let ints = DeviceBuffer::<i32>::new(4, MemFlags::ReadWrite);
        k.set_arg(0, &ints).unwrap();
        assert!(matches!(
            k.bind(),
            Err(Error::MissingArg { index: 1, .. })
        ));

        k.set_arg(1, 7i32).unwrap();
        let args = k.bind().unwrap();
        assert_eq!(args.int(1).unwrap(), 7);
        assert!(args.buffer::<i32>(0).is_ok());
        assert!(args.buffer::<f32>(0).is_err());
    }

    #[test]
    fn test_default_run_item_errors() {
        let range = NdRange::linear(1);
        let args = KernelArgs {
            kernel: "probe".into(),
            args: vec![],
        };
        assert!(Probe.run_group(&range.group(0), &args).is_err());
    }
}
