//! Layout descriptions that parametrize segment accesses.
//!
//! A layout tells the access validator how many bytes an access touches,
//! which alignment the target address must satisfy, and in which byte
//! order a scalar is stored. Three shapes exist:
//!
//! - [`ValueLayout<C>`]: a scalar whose Rust carrier type is `C`. The
//!   carrier is resolved at compile time through the sealed [`Carrier`]
//!   trait, so a typed `get`/`set` monomorphizes to a fixed-width load or
//!   store.
//! - [`AddressLayout`]: a pointer-sized value, optionally describing the
//!   [`MemoryLayout`] it points to so that reads can produce a segment of
//!   the right size.
//! - [`MemoryLayout`]: an untyped size + alignment pair, used for slicing,
//!   allocation, sequences and structs.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::capability::NativeAccess;
use crate::error::SegmentError;

/// Size in bytes of an address on the current platform.
pub const ADDRESS_SIZE: u64 = std::mem::size_of::<usize>() as u64;

/// Byte order in which multi-byte scalars are laid out in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl ByteOrder {
    /// The byte order of the current platform.
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::Little;

    /// The byte order of the current platform.
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::Big;

    /// Whether this is the platform byte order.
    pub fn is_native(self) -> bool {
        self == Self::NATIVE
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => write!(f, "little-endian"),
            Self::Big => write!(f, "big-endian"),
        }
    }
}

/// Anything with a byte size and an alignment constraint.
pub trait Layout {
    /// Number of bytes covered by the layout.
    fn byte_size(&self) -> u64;
    /// Required alignment, in bytes. Always a power of two.
    fn byte_alignment(&self) -> u64;
}

mod sealed {
    pub trait Sealed {}
}

/// A Rust scalar type that can be loaded from and stored to a segment.
///
/// Sealed: the set of carriers mirrors the primitive kinds a segment
/// supports and cannot be extended outside this crate.
pub trait Carrier: sealed::Sealed + Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Width of the scalar in bytes.
    const SIZE: usize;
    /// Short human-readable name of the primitive kind.
    const NAME: &'static str;

    /// Decode a value from the first `SIZE` bytes of `bytes`.
    fn decode(bytes: &[u8], order: ByteOrder) -> Self;

    /// Encode the value into the first `SIZE` bytes of `out`.
    fn encode(self, out: &mut [u8], order: ByteOrder);
}

macro_rules! impl_carrier {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl Carrier for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();
            const NAME: &'static str = $name;

            #[inline]
            fn decode(bytes: &[u8], order: ByteOrder) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..Self::SIZE]);
                match order {
                    ByteOrder::Little => <$ty>::from_le_bytes(buf),
                    ByteOrder::Big => <$ty>::from_be_bytes(buf),
                }
            }

            #[inline]
            fn encode(self, out: &mut [u8], order: ByteOrder) {
                let buf = match order {
                    ByteOrder::Little => self.to_le_bytes(),
                    ByteOrder::Big => self.to_be_bytes(),
                };
                out[..Self::SIZE].copy_from_slice(&buf);
            }
        }
    )*};
}

impl_carrier!(
    i8 => "byte",
    u8 => "ubyte",
    u16 => "char",
    i16 => "short",
    i32 => "int",
    u32 => "uint",
    f32 => "float",
    i64 => "long",
    u64 => "ulong",
    f64 => "double",
);

impl sealed::Sealed for bool {}

impl Carrier for bool {
    const SIZE: usize = 1;
    const NAME: &'static str = "bool";

    #[inline]
    fn decode(bytes: &[u8], _order: ByteOrder) -> Self {
        bytes[0] != 0
    }

    #[inline]
    fn encode(self, out: &mut [u8], _order: ByteOrder) {
        out[0] = u8::from(self);
    }
}

/// Layout of a scalar value carried by the Rust type `C`.
pub struct ValueLayout<C: Carrier> {
    byte_alignment: u64,
    order: ByteOrder,
    name: Option<&'static str>,
    carrier: PhantomData<fn() -> C>,
}

impl<C: Carrier> ValueLayout<C> {
    /// A native-order layout aligned to its own size.
    pub const fn natural() -> Self {
        Self {
            byte_alignment: C::SIZE as u64,
            order: ByteOrder::NATIVE,
            name: None,
            carrier: PhantomData,
        }
    }

    /// The same layout with alignment 1.
    pub const fn unaligned(self) -> Self {
        Self {
            byte_alignment: 1,
            ..self
        }
    }

    /// The same layout with a different alignment constraint.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::IllegalArgument`] unless `alignment` is a
    /// power of two.
    pub fn with_byte_alignment(self, alignment: u64) -> Result<Self, SegmentError> {
        if !alignment.is_power_of_two() {
            return Err(SegmentError::illegal_argument(format!(
                "alignment {alignment} is not a power of two"
            )));
        }
        Ok(Self {
            byte_alignment: alignment,
            ..self
        })
    }

    /// The same layout stored in the given byte order.
    pub const fn with_order(self, order: ByteOrder) -> Self {
        Self { order, ..self }
    }

    /// The same layout with a descriptive name attached.
    pub const fn with_name(self, name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..self
        }
    }

    /// Byte order of the stored value.
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Name attached with [`with_name`](Self::with_name), if any.
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Name of the carrier's primitive kind.
    pub fn carrier_name(&self) -> &'static str {
        C::NAME
    }
}

impl<C: Carrier> Layout for ValueLayout<C> {
    fn byte_size(&self) -> u64 {
        C::SIZE as u64
    }

    fn byte_alignment(&self) -> u64 {
        self.byte_alignment
    }
}

impl<C: Carrier> Clone for ValueLayout<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Carrier> Copy for ValueLayout<C> {}

impl<C: Carrier> PartialEq for ValueLayout<C> {
    fn eq(&self, other: &Self) -> bool {
        self.byte_alignment == other.byte_alignment
            && self.order == other.order
            && self.name == other.name
    }
}

impl<C: Carrier> Eq for ValueLayout<C> {}

impl<C: Carrier> Hash for ValueLayout<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        C::NAME.hash(state);
        self.byte_alignment.hash(state);
        self.order.hash(state);
        self.name.hash(state);
    }
}

impl<C: Carrier> fmt::Debug for ValueLayout<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueLayout")
            .field("carrier", &C::NAME)
            .field("byte_size", &C::SIZE)
            .field("byte_alignment", &self.byte_alignment)
            .field("order", &self.order)
            .field("name", &self.name)
            .finish()
    }
}

/// A boolean stored in one byte; any non-zero byte reads as `true`.
pub const BOOL: ValueLayout<bool> = ValueLayout::natural();
/// A signed byte.
pub const BYTE: ValueLayout<i8> = ValueLayout::natural();
/// An unsigned byte.
pub const U8: ValueLayout<u8> = ValueLayout::natural();
/// A 16-bit UTF-16 code unit, 2-byte aligned.
pub const CHAR: ValueLayout<u16> = ValueLayout::natural();
/// A 16-bit signed integer, 2-byte aligned.
pub const SHORT: ValueLayout<i16> = ValueLayout::natural();
/// A 32-bit signed integer, 4-byte aligned.
pub const INT: ValueLayout<i32> = ValueLayout::natural();
/// A 32-bit float, 4-byte aligned.
pub const FLOAT: ValueLayout<f32> = ValueLayout::natural();
/// A 64-bit signed integer, 8-byte aligned.
pub const LONG: ValueLayout<i64> = ValueLayout::natural();
/// A 64-bit float, 8-byte aligned.
pub const DOUBLE: ValueLayout<f64> = ValueLayout::natural();

/// [`CHAR`] with alignment 1.
pub const CHAR_UNALIGNED: ValueLayout<u16> = CHAR.unaligned();
/// [`SHORT`] with alignment 1.
pub const SHORT_UNALIGNED: ValueLayout<i16> = SHORT.unaligned();
/// [`INT`] with alignment 1.
pub const INT_UNALIGNED: ValueLayout<i32> = INT.unaligned();
/// [`FLOAT`] with alignment 1.
pub const FLOAT_UNALIGNED: ValueLayout<f32> = FLOAT.unaligned();
/// [`LONG`] with alignment 1.
pub const LONG_UNALIGNED: ValueLayout<i64> = LONG.unaligned();
/// [`DOUBLE`] with alignment 1.
pub const DOUBLE_UNALIGNED: ValueLayout<f64> = DOUBLE.unaligned();

/// Layout of a pointer-sized address value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressLayout {
    byte_alignment: u64,
    order: ByteOrder,
    target: Option<MemoryLayout>,
}

impl AddressLayout {
    /// A native-order address layout aligned to the pointer size.
    pub const fn natural() -> Self {
        Self {
            byte_alignment: ADDRESS_SIZE,
            order: ByteOrder::NATIVE,
            target: None,
        }
    }

    /// The same layout with alignment 1.
    pub const fn unaligned(self) -> Self {
        Self {
            byte_alignment: 1,
            ..self
        }
    }

    /// The same layout, declaring the shape of the memory it points to.
    ///
    /// Reading an address through the returned layout yields a segment
    /// sized to `target` instead of a zero-length segment, so declaring a
    /// target is a restricted operation.
    pub fn with_target_layout(self, target: MemoryLayout, _access: &NativeAccess) -> Self {
        Self {
            target: Some(target),
            ..self
        }
    }

    /// The same layout without a target layout.
    pub const fn without_target_layout(self) -> Self {
        Self {
            target: None,
            ..self
        }
    }

    /// The same layout stored in the given byte order.
    pub const fn with_order(self, order: ByteOrder) -> Self {
        Self { order, ..self }
    }

    /// Shape of the pointed-to memory, if declared.
    pub fn target_layout(&self) -> Option<MemoryLayout> {
        self.target
    }

    /// Byte order of the stored address.
    pub fn order(&self) -> ByteOrder {
        self.order
    }
}

impl Layout for AddressLayout {
    fn byte_size(&self) -> u64 {
        ADDRESS_SIZE
    }

    fn byte_alignment(&self) -> u64 {
        self.byte_alignment
    }
}

/// A native-order, pointer-aligned address.
pub const ADDRESS: AddressLayout = AddressLayout::natural();
/// [`ADDRESS`] with alignment 1.
pub const ADDRESS_UNALIGNED: AddressLayout = ADDRESS.unaligned();

/// An untyped block of memory: a size and an alignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryLayout {
    byte_size: u64,
    byte_alignment: u64,
}

impl MemoryLayout {
    /// Create a layout of `byte_size` bytes aligned to `byte_alignment`.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::IllegalArgument`] unless `byte_alignment`
    /// is a power of two.
    pub fn new(byte_size: u64, byte_alignment: u64) -> Result<Self, SegmentError> {
        if !byte_alignment.is_power_of_two() {
            return Err(SegmentError::illegal_argument(format!(
                "alignment {byte_alignment} is not a power of two"
            )));
        }
        Ok(Self {
            byte_size,
            byte_alignment,
        })
    }

    /// Unaligned filler of `byte_size` bytes.
    pub const fn padding(byte_size: u64) -> Self {
        Self {
            byte_size,
            byte_alignment: 1,
        }
    }

    /// The size/alignment pair of any other layout.
    pub fn of(layout: &impl Layout) -> Self {
        Self {
            byte_size: layout.byte_size(),
            byte_alignment: layout.byte_alignment(),
        }
    }

    /// `count` consecutive copies of `element`.
    ///
    /// # Errors
    ///
    /// Fails if the element size is not a multiple of its alignment (the
    /// second element would be misaligned) or the total size overflows.
    pub fn sequence(count: u64, element: &impl Layout) -> Result<Self, SegmentError> {
        let size = element.byte_size();
        let align = element.byte_alignment();
        if size % align != 0 {
            return Err(SegmentError::illegal_argument(format!(
                "element size {size} is not a multiple of its alignment {align}"
            )));
        }
        let byte_size = count.checked_mul(size).ok_or_else(|| {
            SegmentError::illegal_argument(format!("sequence of {count} x {size} bytes overflows"))
        })?;
        Ok(Self {
            byte_size,
            byte_alignment: align,
        })
    }

    /// Members laid out in order, each padded up to its own alignment.
    ///
    /// The struct is aligned to its most-aligned member and its size is
    /// rounded up to that alignment, matching C struct layout.
    pub fn struct_of(members: &[MemoryLayout]) -> Result<Self, SegmentError> {
        let overflow = || SegmentError::illegal_argument("struct layout size overflows");
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for member in members {
            offset = align_up(offset, member.byte_alignment).ok_or_else(overflow)?;
            offset = offset.checked_add(member.byte_size).ok_or_else(overflow)?;
            max_align = max_align.max(member.byte_alignment);
        }
        let byte_size = align_up(offset, max_align).ok_or_else(overflow)?;
        Ok(Self {
            byte_size,
            byte_alignment: max_align,
        })
    }
}

impl Layout for MemoryLayout {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }

    fn byte_alignment(&self) -> u64 {
        self.byte_alignment
    }
}

impl<C: Carrier> From<ValueLayout<C>> for MemoryLayout {
    fn from(layout: ValueLayout<C>) -> Self {
        Self::of(&layout)
    }
}

impl From<AddressLayout> for MemoryLayout {
    fn from(layout: AddressLayout) -> Self {
        Self::of(&layout)
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
fn align_up(value: u64, align: u64) -> Option<u64> {
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}
