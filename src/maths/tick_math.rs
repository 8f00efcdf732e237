//! Tick <-> sqrt price conversion.
//!
//! A tick is a signed index into a geometric price grid where each whole
//! tick moves the sqrt price by a factor of sqrt(1.0001). Both directions
//! are bit-exact integer computations; no floating point is involved
//! anywhere, so the same input always produces the same output.
use alloy_primitives::{I256, U256};

use crate::{
    errors::EngineError,
    safe_math::{div_mod_u256, safe_div_u256, safe_mul_u256},
};

/// Lowest tick for which a Q64.96 sqrt price exists.
pub const MIN_TICK: i32 = -887272;
/// Highest tick for which a Q64.96 sqrt price exists.
pub const MAX_TICK: i32 = 887272;

/// sqrt price at [`MIN_TICK`]: 4295128739.
pub const MIN_SQRT_PRICE: U256 = U256::from_limbs([4295128739u64, 0, 0, 0]);

/// sqrt price at [`MAX_TICK`]: 1461446703485210103287273052203988822378723970342.
pub const MAX_SQRT_PRICE: U256 =
    U256::from_limbs([6743328256752651558u64, 17280870778742802505u64, 4294805859u64, 0]);

// Q128.128 ratios sqrt(1.0001)^-(2^k) for k = 1..=19; bit 0 seeds the
// product directly. Values generated once from the closed form.
const RATIO_MULTIPLIERS: [U256; 19] = [
    U256::from_limbs([6459403834229662010u64, 18444899583751176498u64, 0, 0]),
    U256::from_limbs([17226890335427755468u64, 18443055278223354162u64, 0, 0]),
    U256::from_limbs([2032852871939366096u64, 18439367220385604838u64, 0, 0]),
    U256::from_limbs([14545316742740207172u64, 18431993317065449817u64, 0, 0]),
    U256::from_limbs([5129152022828963008u64, 18417254355718160513u64, 0, 0]),
    U256::from_limbs([4894419605888772193u64, 18387811781193591352u64, 0, 0]),
    U256::from_limbs([1280255884321894483u64, 18329067761203520168u64, 0, 0]),
    U256::from_limbs([15924666964335305636u64, 18212142134806087854u64, 0, 0]),
    U256::from_limbs([8010504389359918676u64, 17980523815641551639u64, 0, 0]),
    U256::from_limbs([10668036004952895731u64, 17526086738831147013u64, 0, 0]),
    U256::from_limbs([4878133418470705625u64, 16651378430235024244u64, 0, 0]),
    U256::from_limbs([9537173718739605541u64, 15030750278693429944u64, 0, 0]),
    U256::from_limbs([9972618978014552549u64, 12247334978882834399u64, 0, 0]),
    U256::from_limbs([10428997489610666743u64, 8131365268884726200u64, 0, 0]),
    U256::from_limbs([9305304367709015974u64, 3584323654723342297u64, 0, 0]),
    U256::from_limbs([14301143598189091785u64, 696457651847595233u64, 0, 0]),
    U256::from_limbs([7393154844743099908u64, 26294789957452057u64, 0, 0]),
    U256::from_limbs([2209338891292245656u64, 37481735321082u64, 0, 0]),
    U256::from_limbs([10518117631919034274u64, 76158723u64, 0, 0]),
];

/// sqrt(1.0001)^-1 in Q128.128, the seed when bit 0 of |tick| is set.
const RATIO_BIT_0: U256 =
    U256::from_limbs([12262481743371124737u64, 18445821805675392311u64, 0, 0]);

/// Q64.96 sqrt price at a tick.
///
/// Computed as a product of precomputed powers-of-two ratios selected by
/// the bits of `|tick|`, inverted for positive ticks, producing a
/// monotonically increasing step function of tick.
pub fn sqrt_price_at_tick(tick: i32) -> Result<U256, EngineError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(EngineError::TickOutOfRange(tick));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 1 != 0 { RATIO_BIT_0 } else { U256::from_limbs([0, 0, 1, 0]) };
    for (i, multiplier) in RATIO_MULTIPLIERS.iter().enumerate() {
        if abs_tick & (1 << (i + 1)) != 0 {
            ratio = safe_mul_u256(ratio, *multiplier)? >> 128;
        }
    }

    if tick > 0 {
        ratio = safe_div_u256(U256::MAX, ratio)?;
    }

    // Q128.128 -> Q64.96, rounding up so the result round-trips through
    // tick_at_sqrt_price
    let (_, rest) = div_mod_u256(ratio, U256::from(1u64) << 32)?;
    Ok((ratio >> 32) + if rest.is_zero() { U256::ZERO } else { U256::from(1u64) })
}

fn most_significant_bit(x: U256) -> usize {
    debug_assert!(!x.is_zero());
    x.bit_len() - 1
}

/// The tick whose price is the greatest at or below `sqrt_price`.
///
/// Uses an MSB-based integer log2 approximation refined by fourteen
/// squarings, then disambiguates between the two candidate ticks by
/// comparing against their exact prices. A price sitting exactly between
/// two adjacent ticks resolves toward the lower tick.
pub fn tick_at_sqrt_price(sqrt_price: U256) -> Result<i32, EngineError> {
    if sqrt_price < MIN_SQRT_PRICE || sqrt_price >= MAX_SQRT_PRICE {
        return Err(EngineError::PriceOutOfRange(sqrt_price));
    }
    let ratio_x128 = sqrt_price << 32;
    let msb = most_significant_bit(ratio_x128);
    let msb_diff = (msb as i32) - 128;

    let mut log_2: I256 = if msb_diff >= 0 {
        I256::from_raw(U256::from(msb_diff as u64)) << 64
    } else {
        -(I256::from_raw(U256::from((-msb_diff) as u64)) << 64usize)
    };

    let mut r = if msb >= 128 { ratio_x128 >> (msb - 127) } else { ratio_x128 << (127 - msb) };

    for i in 0..14 {
        r = (r * r) >> 127;
        let f: U256 = r >> 128;
        log_2 |= I256::from_raw(f << (63 - i));
        r >>= f.to::<usize>();
    }

    // log base sqrt(1.0001), Q64.128
    let log_sqrt10001 =
        log_2 * I256::from_raw(U256::from_limbs([11745905768312294533u64, 13863u64, 0, 0]));

    let tick_low: I256 = (log_sqrt10001
        - I256::from_raw(U256::from_limbs([6552757943157144234u64, 184476617836266586u64, 0, 0])))
    .asr(128);
    let tick_high: I256 = (log_sqrt10001
        + I256::from_raw(U256::from_limbs([
            4998474450511881007u64,
            15793544031827761793u64,
            0,
            0,
        ])))
    .asr(128);

    if tick_low == tick_high {
        Ok(tick_low.as_i32())
    } else if sqrt_price_at_tick(tick_high.as_i32())? <= sqrt_price {
        Ok(tick_high.as_i32())
    } else {
        Ok(tick_low.as_i32())
    }
}
