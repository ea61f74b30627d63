//! Arithmetic-logic unit.
//!
//! The ALU is combinational: `operate` is a pure function of its inputs,
//! except that it records four status flags (zero, carry, sign, overflow)
//! which persist until the next call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operation selector for the ALU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Not,
}

impl AluOp {
    /// Mnemonic fragment used in control-signal names and provenance text.
    pub const fn name(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Sub => "SUB",
            AluOp::Mul => "MUL",
            AluOp::Div => "DIV",
            AluOp::And => "AND",
            AluOp::Or => "OR",
            AluOp::Xor => "XOR",
            AluOp::Not => "NOT",
        }
    }

    /// NOT takes a single operand; everything else takes two.
    pub const fn is_unary(self) -> bool {
        matches!(self, AluOp::Not)
    }
}

impl std::fmt::Display for AluOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// ALU status flags, recomputed on every `operate` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    /// Last result was zero.
    pub zero: bool,
    /// The 64-bit intermediate carried past bit 31.
    pub carry: bool,
    /// Last result was negative.
    pub sign: bool,
    /// Last result did not fit in 32 bits.
    pub overflow: bool,
}

/// The arithmetic-logic unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alu {
    flags: Flags,
}

impl Alu {
    /// Create an ALU with cleared flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute one operation and record the flags.
    ///
    /// Add, subtract and multiply widen to 64 bits and truncate back to 32;
    /// `overflow` is set when the widened result differs from the truncated
    /// one, and `carry` when the widened intermediate has bits above bit 31.
    /// Division by zero is an error, never a silent zero result.
    pub fn operate(&mut self, op: AluOp, a: i32, b: i32) -> Result<i32, AluError> {
        self.flags.carry = false;
        self.flags.overflow = false;

        let result = match op {
            AluOp::Add => {
                let wide = a as i64 + b as i64;
                let trunc = wide as i32;
                self.flags.overflow = wide != trunc as i64;
                self.flags.carry = (wide as u64) >> 32 != 0;
                trunc
            }
            AluOp::Sub => {
                let wide = a as i64 - b as i64;
                let trunc = wide as i32;
                self.flags.overflow = wide != trunc as i64;
                self.flags.carry = (wide as u64) >> 32 != 0;
                trunc
            }
            AluOp::Mul => {
                let wide = a as i64 * b as i64;
                let trunc = wide as i32;
                self.flags.overflow = wide != trunc as i64;
                trunc
            }
            AluOp::Div => {
                if b == 0 {
                    return Err(AluError::DivisionByZero { dividend: a });
                }
                // i64 quotient keeps i32::MIN / -1 well-defined.
                let wide = a as i64 / b as i64;
                let trunc = wide as i32;
                self.flags.overflow = wide != trunc as i64;
                trunc
            }
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Not => !a,
        };

        self.flags.zero = result == 0;
        self.flags.sign = result < 0;
        Ok(result)
    }

    /// Flags from the most recent operation.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Clear all flags (used on program reload).
    pub fn reset(&mut self) {
        self.flags = Flags::default();
    }
}

/// Errors that can occur inside the ALU.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AluError {
    #[error("division by zero: {dividend} / 0")]
    DivisionByZero { dividend: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn add_basic() {
        let mut alu = Alu::new();
        assert_eq!(alu.operate(AluOp::Add, 2, 3).unwrap(), 5);
        assert!(!alu.flags().zero);
        assert!(!alu.flags().overflow);
    }

    #[test]
    fn add_overflow_and_carry() {
        let mut alu = Alu::new();
        let r = alu.operate(AluOp::Add, i32::MAX, 1).unwrap();
        assert_eq!(r, i32::MIN);
        assert!(alu.flags().overflow);

        // -1 + -1: the 64-bit intermediate has all high bits set.
        alu.operate(AluOp::Add, -1, -1).unwrap();
        assert!(alu.flags().carry);
        assert!(!alu.flags().overflow);
    }

    #[test]
    fn sub_sets_zero_flag() {
        let mut alu = Alu::new();
        assert_eq!(alu.operate(AluOp::Sub, 7, 7).unwrap(), 0);
        assert!(alu.flags().zero);
        assert!(!alu.flags().sign);
    }

    #[test]
    fn mul_overflow() {
        let mut alu = Alu::new();
        alu.operate(AluOp::Mul, i32::MAX, 2).unwrap();
        assert!(alu.flags().overflow);
        assert!(!alu.flags().carry);

        alu.operate(AluOp::Mul, 1000, 1000).unwrap();
        assert!(!alu.flags().overflow);
    }

    #[test]
    fn div_by_zero_is_an_error() {
        let mut alu = Alu::new();
        let err = alu.operate(AluOp::Div, 42, 0).unwrap_err();
        assert_eq!(err, AluError::DivisionByZero { dividend: 42 });
    }

    #[test]
    fn div_min_by_minus_one() {
        let mut alu = Alu::new();
        let r = alu.operate(AluOp::Div, i32::MIN, -1).unwrap();
        assert_eq!(r, i32::MIN);
        assert!(alu.flags().overflow);
    }

    #[test]
    fn bitwise_ops() {
        let mut alu = Alu::new();
        assert_eq!(alu.operate(AluOp::And, 0b1100, 0b1010).unwrap(), 0b1000);
        assert_eq!(alu.operate(AluOp::Or, 0b1100, 0b1010).unwrap(), 0b1110);
        assert_eq!(alu.operate(AluOp::Xor, 0b1100, 0b1010).unwrap(), 0b0110);
        assert_eq!(alu.operate(AluOp::Not, 0, 0).unwrap(), -1);
        assert!(alu.flags().sign);
    }

    #[test]
    fn sign_flag_follows_result() {
        let mut alu = Alu::new();
        alu.operate(AluOp::Sub, 1, 5).unwrap();
        assert!(alu.flags().sign);
        alu.operate(AluOp::Add, 1, 5).unwrap();
        assert!(!alu.flags().sign);
    }

    proptest! {
        #[test]
        fn add_overflow_law(a in any::<i32>(), b in any::<i32>()) {
            let mut alu = Alu::new();
            let r = alu.operate(AluOp::Add, a, b).unwrap();
            let wide = a as i64 + b as i64;
            prop_assert_eq!(r, wide as i32);
            prop_assert_eq!(
                alu.flags().overflow,
                wide > i32::MAX as i64 || wide < i32::MIN as i64
            );
        }

        #[test]
        fn mul_overflow_law(a in any::<i32>(), b in any::<i32>()) {
            let mut alu = Alu::new();
            alu.operate(AluOp::Mul, a, b).unwrap();
            let wide = a as i64 * b as i64;
            prop_assert_eq!(
                alu.flags().overflow,
                wide > i32::MAX as i64 || wide < i32::MIN as i64
            );
        }

        #[test]
        fn div_never_silently_returns(a in any::<i32>()) {
            let mut alu = Alu::new();
            prop_assert!(alu.operate(AluOp::Div, a, 0).is_err());
        }

        #[test]
        fn zero_and_sign_always_track_result(a in any::<i32>(), b in any::<i32>()) {
            let mut alu = Alu::new();
            let r = alu.operate(AluOp::Xor, a, b).unwrap();
            prop_assert_eq!(alu.flags().zero, r == 0);
            prop_assert_eq!(alu.flags().sign, r < 0);
        }
    }
}
