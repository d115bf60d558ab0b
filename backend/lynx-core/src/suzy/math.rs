//! Suzy's math coprocessor: 16x16->32 multiply and 32/16 divide, including the two documented
//! hardware sign-handling bugs (§4.8, HW Bugs 13.8-13.10).

use bincode::{Decode, Encode};

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub struct MathRegisters {
    pub a: u16,
    pub b: u16,
    pub c: u16,
    pub d: u16,
    /// The 64-bit-wide accumulator, logically `EFGH`. Only the low 40 bits are ever meaningfully
    /// used by real hardware (a 32-bit product plus room for accumulate-mode carry), but the
    /// overflow check below treats anything beyond bit 32 as overflow regardless.
    pub efgh: u64,
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub struct MathFlags {
    pub sign: bool,
    pub accumulate: bool,
    pub in_progress: bool,
    /// Overwritten fresh on every operation; never OR-accumulated across operations (HW Bug
    /// 13.10).
    pub overflow: bool,
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
pub struct MathUnit {
    pub registers: MathRegisters,
    pub flags: MathFlags,
}

/// Two's-complement negation of a 16-bit operand, with the documented quirk that negating
/// `0x8000` is a no-op (HW Bug 13.8): the hardware's sign-magnitude negate leaves the
/// zero-magnitude value's sign bit untouched, so it is read back as +32768 rather than -32768.
fn buggy_negate(value: u16) -> u16 {
    if value == 0x8000 { value } else { value.wrapping_neg() }
}

impl MathUnit {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Unsigned 16x16->32 multiply. Plain product, no sign handling.
    pub fn multiply_unsigned(&mut self, a: u16, b: u16) -> u32 {
        self.flags.in_progress = true;
        let product = u32::from(a) * u32::from(b);
        self.finish_multiply(product);
        product
    }

    /// Signed 16x16->32 multiply reproducing HW Bug 13.8: each negative operand (bit 15 set) is
    /// negated via [`buggy_negate`] before the unsigned multiply, and the product is negated
    /// again if exactly one operand was originally negative. Because `0x8000` does not actually
    /// negate, multiplying it as a "negative" operand silently treats it as +32768.
    pub fn multiply_signed(&mut self, a: u16, b: u16) -> u32 {
        self.flags.in_progress = true;

        let a_negative = a & 0x8000 != 0;
        let b_negative = b & 0x8000 != 0;

        let a_mag = if a_negative { buggy_negate(a) } else { a };
        let b_mag = if b_negative { buggy_negate(b) } else { b };

        let mut product = u32::from(a_mag) * u32::from(b_mag);
        if a_negative != b_negative {
            product = product.wrapping_neg();
        }

        self.finish_multiply(product);
        product
    }

    fn finish_multiply(&mut self, product: u32) {
        self.flags.in_progress = false;
        if self.flags.accumulate {
            let sum = self.registers.efgh.wrapping_add(u64::from(product));
            self.flags.overflow = sum > u64::from(u32::MAX);
            self.registers.efgh = sum;
        } else {
            self.flags.overflow = false;
            self.registers.efgh = u64::from(product);
        }
    }

    /// Unsigned 32/16 divide producing a 32-bit quotient and 16-bit remainder. Division by zero
    /// is hardware-undefined; this implementation's documented choice (an accepted Open Question,
    /// §9) is to set `MathOverflow`, leave the operand registers untouched, and report 0/0.
    pub fn divide_unsigned(&mut self, dividend: u32, divisor: u16) -> (u32, u16) {
        self.flags.in_progress = true;
        if divisor == 0 {
            log::trace!("unsigned divide by zero (dividend {dividend:#010X})");
            self.flags.overflow = true;
            self.flags.in_progress = false;
            return (0, 0);
        }

        let quotient = dividend / u32::from(divisor);
        let remainder = (dividend % u32::from(divisor)) as u16;
        self.flags.overflow = quotient > u32::from(u16::MAX);
        self.flags.in_progress = false;
        (quotient, remainder)
    }

    /// Signed 32/16 divide reproducing HW Bug 13.9: quotient truncates toward zero, but the
    /// remainder is always reported as a magnitude (`abs()`), regardless of operand signs.
    pub fn divide_signed(&mut self, dividend: i32, divisor: i16) -> (i32, u16) {
        self.flags.in_progress = true;
        if divisor == 0 {
            log::trace!("signed divide by zero (dividend {dividend:#010X})");
            self.flags.overflow = true;
            self.flags.in_progress = false;
            return (0, 0);
        }

        let quotient = dividend / i32::from(divisor);
        let remainder = dividend % i32::from(divisor);
        self.flags.overflow = quotient > i32::from(i16::MAX) || quotient < i32::from(i16::MIN);
        self.flags.in_progress = false;
        (quotient, remainder.unsigned_abs() as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_signed_multiply_sign_bug() {
        let mut math = MathUnit::default();
        let product = math.multiply_signed(0x8000, 0x0002);
        assert_eq!(product, 0x0001_0000);
    }

    #[test]
    fn unsigned_multiply_is_commutative() {
        let mut math = MathUnit::default();
        let ab = math.multiply_unsigned(0x1234, 0x5678);
        let mut math2 = MathUnit::default();
        let ba = math2.multiply_unsigned(0x5678, 0x1234);
        assert_eq!(ab, ba);
        assert_eq!(ab, 0x1234u32 * 0x5678u32);
    }

    #[test]
    fn unsigned_divide_invariant() {
        let mut math = MathUnit::default();
        let dividend = 123_456u32;
        let divisor = 17u16;
        let (quot, rem) = math.divide_unsigned(dividend, divisor);
        assert_eq!(quot * u32::from(divisor) + u32::from(rem), dividend);
    }

    #[test]
    fn s_signed_divide_remainder_is_always_magnitude() {
        let mut math = MathUnit::default();
        let (quot, rem) = math.divide_signed(-100, 7);
        assert_eq!(quot, -14);
        assert_eq!(rem, 2); // magnitude of -100 % 7 == -2 in Rust, hardware reports 2

        let mut math2 = MathUnit::default();
        let (quot2, rem2) = math2.divide_signed(100, -7);
        assert_eq!(quot2, -14);
        assert_eq!(rem2, 2);
    }

    #[test]
    fn divide_by_zero_sets_overflow_and_returns_zero() {
        let mut math = MathUnit::default();
        let (quot, rem) = math.divide_unsigned(42, 0);
        assert_eq!((quot, rem), (0, 0));
        assert!(math.flags.overflow);
    }

    #[test]
    fn overflow_flag_is_not_or_accumulated() {
        let mut math = MathUnit::default();
        math.flags.accumulate = true;
        math.registers.efgh = u64::from(u32::MAX);
        let _ = math.multiply_unsigned(0xFFFF, 0xFFFF);
        assert!(math.flags.overflow);

        // A subsequent small, non-overflowing operation must clear the flag rather than OR it.
        math.registers.efgh = 0;
        let _ = math.multiply_unsigned(2, 2);
        assert!(!math.flags.overflow);
    }
}
