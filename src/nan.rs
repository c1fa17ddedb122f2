//! Signalling NaN fill.
//!
//! A signalling NaN raises `FE_INVALID` the moment an arithmetic instruction
//! consumes it. Fill memory with it, unmask `FE_INVALID`, and any read of a
//! value that was never written becomes a SIGFPE instead of garbage.
//!
//! The pattern is written as raw bits rather than as a float value. Moving a
//! float through a register can quiet it (x87 does), moving an integer can't.

use std::{fmt, ptr};

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Floating point types with a canonical signalling NaN.
///
/// # Safety-relevant layout
///
/// `Bits` has the same size as `Self` and alignment no stricter than `Self`,
/// which is what makes writing `Bits` through a `*mut Self` sound. The trait is
/// sealed so this can't be broken from outside.
pub trait SignallingNan: Copy + sealed::Sealed {
    type Bits: Copy + Eq + fmt::LowerHex;

    /// What `std::numeric_limits<T>::signaling_NaN()` would give you
    const SIGNALLING_NAN_BITS: Self::Bits;

    fn nan_bits(self) -> Self::Bits;

    /// `true` only for the exact canonical pattern, not for any sNaN
    fn is_signalling_nan(self) -> bool {
        self.nan_bits() == Self::SIGNALLING_NAN_BITS
    }
}

// IEEE 754-2008 says a set top mantissa bit means quiet. Legacy MIPS does it
// the other way round, so there the canonical sNaN is "all mantissa bits set
// except the top one".
#[cfg(not(any(target_arch = "mips", target_arch = "mips64")))]
const F64_SNAN: u64 = 0x7ff4_0000_0000_0000;
#[cfg(any(target_arch = "mips", target_arch = "mips64"))]
const F64_SNAN: u64 = 0x7ff7_ffff_ffff_ffff;

#[cfg(not(any(target_arch = "mips", target_arch = "mips64")))]
const F32_SNAN: u32 = 0x7fa0_0000;
#[cfg(any(target_arch = "mips", target_arch = "mips64"))]
const F32_SNAN: u32 = 0x7fbf_ffff;

impl SignallingNan for f64 {
    type Bits = u64;
    const SIGNALLING_NAN_BITS: u64 = F64_SNAN;

    fn nan_bits(self) -> u64 {
        self.to_bits()
    }
}

impl SignallingNan for f32 {
    type Bits = u32;
    const SIGNALLING_NAN_BITS: u32 = F32_SNAN;

    fn nan_bits(self) -> u32 {
        self.to_bits()
    }
}

/// The scalar that fresh allocations are poisoned as.
#[cfg(not(feature = "single-precision"))]
pub type Scalar = f64;
/// The scalar that fresh allocations are poisoned as.
#[cfg(feature = "single-precision")]
pub type Scalar = f32;

/// Overwrite every element of `data` with signalling NaN. The old contents are
/// never read.
pub fn fill_signalling_nan<T: SignallingNan>(data: &mut [T]) {
    // SAFETY: a unique borrow is valid for writes of `len` elements
    unsafe { fill_signalling_nan_raw(data.as_mut_ptr(), data.len()) }
}

/// Like [`fill_signalling_nan()`] but for memory that may be uninitialised or
/// misaligned, e.g. a block straight out of an allocator. No reference to the
/// memory is ever formed.
///
/// # Safety
///
/// `data` must be valid for writes of `len * size_of::<T>()` bytes. It does
/// not need to be aligned.
pub unsafe fn fill_signalling_nan_raw<T: SignallingNan>(data: *mut T, len: usize) {
    let data = data.cast::<T::Bits>();
    for i in 0..len {
        // SAFETY: `Bits` is `T`-sized (see trait docs) and the caller
        // guarantees `len` of them fit
        unsafe { ptr::write_unaligned(data.add(i), T::SIGNALLING_NAN_BITS) };
    }
}

#[cfg(test)]
mod tests {
    use std::mem::{align_of, size_of};

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn bits_have_the_float_layout() {
        assert_eq!(size_of::<<f64 as SignallingNan>::Bits>(), size_of::<f64>());
        assert_eq!(size_of::<<f32 as SignallingNan>::Bits>(), size_of::<f32>());
        assert!(align_of::<<f64 as SignallingNan>::Bits>() <= align_of::<f64>());
        assert!(align_of::<<f32 as SignallingNan>::Bits>() <= align_of::<f32>());
    }

    #[test]
    fn patterns_are_nan() {
        assert!(f64::from_bits(F64_SNAN).is_nan());
        assert!(f32::from_bits(F32_SNAN).is_nan());
    }

    #[cfg(not(any(target_arch = "mips", target_arch = "mips64")))]
    #[test]
    fn patterns_have_the_quiet_bit_clear() {
        assert_eq!(F64_SNAN & (1 << 51), 0);
        assert_eq!(F32_SNAN & (1 << 22), 0);
    }

    #[test]
    fn empty_slice_is_left_alone() {
        let mut empty: [f64; 0] = [];
        fill_signalling_nan(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn raw_fill_handles_misaligned_memory() {
        let mut bytes = [0xabu8; 1 + 2 * 8 + 3];
        // SAFETY: 16 bytes starting at offset 1 are in bounds
        unsafe { fill_signalling_nan_raw(bytes.as_mut_ptr().add(1).cast::<f64>(), 2) };
        assert_eq!(bytes[0], 0xab);
        for chunk in bytes[1..17].chunks_exact(8) {
            let bits = u64::from_ne_bytes(chunk.try_into().unwrap());
            assert_eq!(bits, F64_SNAN);
        }
        assert_eq!(&bytes[17..], &[0xabu8; 3]);
    }

    proptest! {
        #[test]
        fn every_f64_is_overwritten(mut data in prop::collection::vec(any::<f64>(), 0..512)) {
            let len = data.len();
            fill_signalling_nan(&mut data);
            prop_assert_eq!(data.len(), len);
            prop_assert!(data.iter().all(|x| x.is_signalling_nan()));
        }

        #[test]
        fn every_f32_is_overwritten(mut data in prop::collection::vec(any::<f32>(), 0..512)) {
            let len = data.len();
            fill_signalling_nan(&mut data);
            prop_assert_eq!(data.len(), len);
            prop_assert!(data.iter().all(|x| x.is_signalling_nan()));
        }
    }
}
