//! WGSL kernel table.
//!
//! Each entry point has a fixed `@workgroup_size`, which is also the
//! work-group limit the context reports for it. Binding `i` of group 0 is
//! argument slot `i`; scalars are bound as 16-byte uniform buffers.

/// WGSL modules, indexed by [`KernelSpec::module`].
pub(crate) const MODULES: [(&str, &str); 3] = [
    ("gpunum bezier kernels", include_str!("bezier.wgsl")),
    ("gpunum row kernels", include_str!("rows.wgsl")),
    ("gpunum swap kernel", include_str!("swap.wgsl")),
];

/// Kind of value a kernel slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Storage,
    F32,
    U32,
    I32,
}

impl Slot {
    /// Parameter width in bytes, as reported by [`KernelArg::size`].
    ///
    /// [`KernelArg::size`]: gpunum_compute::KernelArg::size
    pub fn size(self) -> usize {
        match self {
            Slot::Storage => std::mem::size_of::<usize>(),
            Slot::F32 | Slot::U32 | Slot::I32 => 4,
        }
    }
}

/// Static description of one entry point.
#[derive(Debug)]
pub struct KernelSpec {
    pub name: &'static str,
    pub module: usize,
    pub slots: &'static [Slot],
    pub workgroup: [u32; 2],
}

impl KernelSpec {
    pub fn dims(&self) -> u32 {
        if self.workgroup[1] > 1 { 2 } else { 1 }
    }

    pub fn work_group_size(&self) -> usize {
        (self.workgroup[0] * self.workgroup[1]) as usize
    }
}

const ROW_SLOTS: [Slot; 6] = [
    Slot::Storage,
    Slot::U32,
    Slot::U32,
    Slot::Storage,
    Slot::I32,
    Slot::I32,
];

pub static KERNELS: [KernelSpec; 4] = [
    KernelSpec {
        name: "computeBezierControlPoints",
        module: 0,
        slots: &[Slot::Storage, Slot::Storage, Slot::F32, Slot::U32],
        workgroup: [64, 1],
    },
    KernelSpec {
        name: "scaleRow",
        module: 1,
        slots: &ROW_SLOTS,
        workgroup: [16, 16],
    },
    KernelSpec {
        name: "subtractRow",
        module: 1,
        slots: &ROW_SLOTS,
        workgroup: [16, 16],
    },
    KernelSpec {
        name: "swapRows",
        module: 2,
        slots: &ROW_SLOTS,
        workgroup: [16, 16],
    },
];

/// Look up an entry point by name.
pub fn find(name: &str) -> Option<&'static KernelSpec> {
    KERNELS.iter().find(|k| k.name == name)
}
