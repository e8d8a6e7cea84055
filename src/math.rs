// 2.0: integer fixed point helpers. every multiply-then-divide in the protocol goes through here
// so products of 1e24 scale amounts never overflow. intermediates are 256 bit.

use alloy_primitives::U256;

/// 1e18 fixed point used by the logarithm.
pub const WAD: u128 = 1_000_000_000_000_000_000;
/// ln(2) in WAD.
pub const LN2_WAD: u128 = 693_147_180_559_945_309;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Arithmetic underflow")]
    Underflow,

    #[error("Logarithm argument {0} outside [1, 2^64)")]
    LnDomain(u128),
}

fn narrow(value: U256) -> Result<u128, MathError> {
    u128::try_from(value).map_err(|_| MathError::Overflow)
}

// 2.1: floor(a * b / d)
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    narrow(U256::from(a) * U256::from(b) / U256::from(d))
}

// 2.2: ceil(a * b / d). used wherever rounding must favor the vault.
pub fn mul_div_up(a: u128, b: u128, d: u128) -> Result<u128, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    let d = U256::from(d);
    let mut quotient = product / d;
    if product % d != U256::ZERO {
        quotient += U256::from(1u8);
    }
    narrow(quotient)
}

/// floor(a * b / d), or 0 when the denominator is empty. share conversions
/// treat an empty ledger as worth nothing rather than failing.
pub fn mul_div_or_zero(a: u128, b: u128, d: u128) -> Result<u128, MathError> {
    if d == 0 {
        return Ok(0);
    }
    mul_div(a, b, d)
}

// 2.3: floor(f0 * f1 * ... / d). the premium integral multiplies three wide factors.
pub fn product_div(factors: &[u128], d: u128) -> Result<u128, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    let mut acc = U256::from(1u8);
    for factor in factors {
        acc = acc
            .checked_mul(U256::from(*factor))
            .ok_or(MathError::Overflow)?;
    }
    narrow(acc / U256::from(d))
}

pub fn div_up(a: u128, b: u128) -> Result<u128, MathError> {
    if b == 0 {
        return Err(MathError::DivisionByZero);
    }
    Ok(a / b + u128::from(a % b != 0))
}

// 2.4: floor(sqrt(x)), newton iteration from a power of two above the root.
pub fn sqrt(x: u128) -> u128 {
    if x < 2 {
        return x;
    }
    let bits = 128 - x.leading_zeros();
    let mut guess = 1u128 << bits.div_ceil(2);
    loop {
        let next = (guess + x / guess) / 2;
        if next >= guess {
            return guess;
        }
        guess = next;
    }
}

// 2.5: log2(x) in WAD for integer x >= 1. binary log: integer part from the bit length,
// fraction by repeated squaring of the normalized mantissa, one bit per round.
pub fn log2_wad(x: u128) -> Result<u128, MathError> {
    if x == 0 || x > u64::MAX as u128 {
        return Err(MathError::LnDomain(x));
    }
    let n = 127 - x.leading_zeros();
    let mut result = n as u128 * WAD;

    // mantissa in [WAD, 2 WAD)
    let mut y = (x * WAD) >> n;
    if y == WAD {
        return Ok(result);
    }

    let double = 2 * WAD;
    let mut delta = WAD / 2;
    while delta > 0 {
        y = y * y / WAD;
        if y >= double {
            result += delta;
            y >>= 1;
        }
        delta >>= 1;
    }
    Ok(result)
}

/// Natural log of an integer in WAD. Absolute error stays below 1e-15 across
/// the whole domain, far inside what the premium curve tolerates.
pub fn ln_wad(x: u128) -> Result<u128, MathError> {
    Ok(log2_wad(x)? * LN2_WAD / WAD)
}
