// element.rs — the closed set of element types a DeviceBuffer can hold.
//
// Two tiers:
//
//   Element        — anything that can live in device memory and be copied
//                    to and from the host: the six kernel types plus u8
//                    (consistency masks) and u32 (PRNG state).
//
//   KernelElement  — the subset the compute kernels are compiled for. Each
//                    one carries the suffix used to build kernel names, e.g.
//                    "transpose" + "_" + "float" → "transpose_float".
//
// Both traits are sealed: the kernel library only contains entry points for
// these types, so a DeviceBuffer<u16>::transpose() is a compile error rather
// than a KernelNotFound at runtime.

use std::fmt;

mod sealed {
    pub trait Sealed {}

    impl Sealed for u8 {}
    impl Sealed for u32 {}
    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// A plain-old-data type that can be stored in device memory.
pub trait Element:
    sealed::Sealed + bytemuck::Pod + Default + PartialOrd + fmt::Debug + Send + Sync + 'static
{
    /// Human-readable name, used in buffer labels and log lines.
    const TYPE_NAME: &'static str;
}

/// An element type with compiled kernels.
pub trait KernelElement: Element {
    /// Suffix appended to the operation name to form the kernel name.
    const SUFFIX: &'static str;

    /// Representation used when the value is passed to a kernel as a
    /// uniform. WGSL has no 8/16-bit integers, so those widen to i32.
    type Scalar: bytemuck::Pod;

    fn to_scalar(self) -> Self::Scalar;
}

macro_rules! element {
    ($ty:ty, $name:literal) => {
        impl Element for $ty {
            const TYPE_NAME: &'static str = $name;
        }
    };
}

macro_rules! kernel_element {
    ($ty:ty, $suffix:literal, $scalar:ty) => {
        element!($ty, $suffix);

        impl KernelElement for $ty {
            const SUFFIX: &'static str = $suffix;
            type Scalar = $scalar;

            #[inline]
            fn to_scalar(self) -> $scalar {
                self as $scalar
            }
        }
    };
}

element!(u8, "uint8");
element!(u32, "uint32");

kernel_element!(i8, "int8", i32);
kernel_element!(i16, "int16", i32);
kernel_element!(i32, "int32", i32);
kernel_element!(i64, "int64", i64);
kernel_element!(f32, "float", f32);
kernel_element!(f64, "double", f64);

/// Every kernel suffix, in the order the library compiles them.
pub const KERNEL_SUFFIXES: [&str; 6] = ["int8", "int16", "int32", "int64", "float", "double"];

/// Build the kernel name for `op` specialised to `T`.
pub fn kernel_name<T: KernelElement>(op: &str) -> String {
    format!("{op}_{}", T::SUFFIX)
}

/// The raw bits of `value`, zero-extended to two little-endian u32 words.
///
/// This is how scalar fills hand a value of any width to a kernel that only
/// moves bits around.
pub fn element_bits<T: Element>(value: T) -> [u32; 2] {
    let mut bytes = [0u8; 8];
    let src = bytemuck::bytes_of(&value);
    bytes[..src.len()].copy_from_slice(src);
    [
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
    ]
}
