//! Velocity curves: raw peak reading to MIDI velocity.

use micromath::F32Ext;

use crate::sensor::{SensorClass, ADC_FULL_SCALE};
use crate::state::Profile;

/// `THRESHOLDS[k - 1] = log2(127 / (127.5 - k))`: the smallest `a*x` whose exponential
/// velocity rounds to `k` or more.
#[rustfmt::skip]
const THRESHOLDS: [f64; 127] = [
    0.005691112077855692, 0.01714113282139385, 0.028682754704084955, 0.04031745518748811,
    0.05204674776959529, 0.06387218316638482, 0.07579535054220428, 0.0878178787914173,
    0.09994143787390676, 0.11216774020716613, 0.12449854211788568, 0.1369356453561084,
    0.14948089867522182, 0.1621361994812509, 0.1749034955551287, 0.18778478685186106,
    0.20078212738073417, 0.2138976271709925, 0.22713345432768658, 0.2404918371827056,
    0.25397506654632745, 0.2675854980649807, 0.281325554691283, 0.2951977292728405,
    0.3092045872667198, 0.32334876958698966, 0.3376329955932373, 0.352060066228517,
    0.3666328673157897, 0.3813543730225552, 0.39622764950408546, 0.4112558587364171,
    0.42644226255109324, 0.4417902268845293, 0.4573032262558537, 0.4729848484881234,
    0.48883879968896043, 0.5048689095079094, 0.5210791366891685, 0.5374735749398372,
    0.5540564591354412, 0.570832171886268, 0.5878052504899814, 0.6049803942981137,
    0.62236247252635, 0.6399565325410884, 0.6577678086575489, 0.6758017314878105,
    0.6940639378805389, 0.7125602814979283, 0.7312968440795141, 0.7502799474470869,
    0.7695161663100043, 0.7890123419358014, 0.8087755967572313, 0.8288133499937764,
    0.8491333343733722, 0.8697436140486584, 0.8906526038116391, 0.911869089721335,
    0.9334022512709762, 0.9552616852347156, 0.9774574313489117, 1.0,
    1.022900402110079, 1.0461701814329258, 1.0698214494975715, 1.0938669234642222,
    1.1183199671887611, 1.1431946358277907, 1.168505724356978, 1.19426882042206,
    1.2205003619952393, 1.247217700371019, 1.274439169106043, 1.3021841595889474,
    1.330473204020371, 1.3593280666925562, 1.388771844585038, 1.4188290784412179,
    1.4495258756641343, 1.4808900465734696, 1.512951255805768, 1.5457411909234378,
    1.5792937506344642, 1.613645255425241, 1.6488346838875412, 1.6849039385950628,
    1.7218981460772644, 1.759865996276285, 1.7988601278921488, 1.838937567267484,
    1.8801602299939968, 1.9225954963143934, 1.9663168737437113, 2.011404763272249,
    2.0579473492092797, 2.106041637410325, 2.155794672607424, 2.2073249732475064,
    2.2607642322089667, 2.3162593448006703, 2.3739748426569576, 2.4340958350945283,
    2.496831590442491, 2.562419932070068, 2.631132682154082, 2.7032824679099177,
    2.7792313211432162, 2.8594016698271996, 2.9442905674137125, 3.0344883763852906,
    3.1307036916445936, 3.2337971846086973, 3.344828496997441, 3.465122730715153,
    3.5963672639934057, 3.7407571733285803, 3.9012218455218264, 4.081794091163648,
    4.288244968631074, 4.529253068134868, 4.818759685329853, 5.181329764714562,
    5.666756591884804, 6.403722186051009, 7.9886846867721655,
];

/// A mapping from raw readings to `0..=127`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    /// `127 * (x - lo) / (hi - lo)`, 0 at or below `lo`, 127 at or above `hi`.
    Linear { lo: u16, hi: u16 },
    /// `127 - 2^(-a*x + log2(127))`
    Exponential { a: f32 },
    /// `127 - 2^(-a*x^b + log2(127))`. `x^b` is approximated, so results may be one off the
    /// exact curve.
    ExponentialPower { a: f32, b: f32 },
}

impl Curve {
    /// Velocity for `input`. Total over all inputs and always in `0..=127`.
    pub fn map(&self, input: u16) -> u8 {
        match *self {
            Curve::Linear { lo, hi } => linear(input, lo, hi),
            Curve::Exponential { a } => exponential(a as f64 * input as f64),
            Curve::ExponentialPower { a, b } => {
                let x = if input == 0 {
                    0.0
                } else {
                    F32Ext::powf(input as f32, b)
                };
                exponential(a as f64 * x as f64)
            }
        }
    }
}

fn linear(input: u16, lo: u16, hi: u16) -> u8 {
    if input <= lo {
        return 0;
    }
    if input >= hi {
        return 127;
    }
    let num = 127 * (input - lo) as u32;
    let den = (hi - lo) as u32;
    ((num + den / 2) / den) as u8
}

/// `round(127 - 2^(log2(127) - ax))`, by counting the thresholds `ax` has reached.
fn exponential(ax: f64) -> u8 {
    THRESHOLDS.partition_point(|&t| t <= ax) as u8
}

/// Coefficient `a` of the exponential curves per profile (soft, medium, hard).
const BIG_A: [f32; 3] = [0.0015, 0.0025, 0.0040];
const SMALL_A: [f32; 3] = [0.0020, 0.0030, 0.0050];
const SNARE_A: [f32; 3] = [0.0008, 0.0012, 0.0020];
const SNARE_B: f32 = 1.1;
const KICK_A: [f32; 3] = [0.0020, 0.0030, 0.0045];

/// Curve for a sensor class under the given profile.
///
/// Pads use the velocity profile, the kick uses the kick profile; the caller picks which.
pub fn curve_for(class: SensorClass, profile: Profile) -> Curve {
    let p = profile as usize;
    match class {
        SensorClass::Big => Curve::Exponential { a: BIG_A[p] },
        SensorClass::Small => Curve::Exponential { a: SMALL_A[p] },
        SensorClass::Snare => Curve::ExponentialPower {
            a: SNARE_A[p],
            b: SNARE_B,
        },
        SensorClass::Kick => Curve::Exponential { a: KICK_A[p] },
        SensorClass::Controller => Curve::Linear {
            lo: 0,
            hi: ADC_FULL_SCALE,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSES: [SensorClass; 5] = [
        SensorClass::Big,
        SensorClass::Small,
        SensorClass::Snare,
        SensorClass::Kick,
        SensorClass::Controller,
    ];
    const PROFILES: [Profile; 3] = [Profile::Soft, Profile::Medium, Profile::Hard];

    #[test]
    fn linear_bounds() {
        let c = Curve::Linear { lo: 0, hi: 4096 };
        assert_eq!(c.map(0), 0);
        assert_eq!(c.map(4096), 127);
        assert_eq!(c.map(u16::MAX), 127);
        assert_eq!(c.map(2048), 64);
        let c = Curve::Linear { lo: 100, hi: 200 };
        assert_eq!(c.map(50), 0);
        assert_eq!(c.map(150), 64);
        assert_eq!(c.map(199), 126);
    }

    #[test]
    fn degenerate_linear_range() {
        let c = Curve::Linear { lo: 300, hi: 300 };
        assert_eq!(c.map(299), 0);
        assert_eq!(c.map(300), 0);
        assert_eq!(c.map(301), 127);
    }

    fn reference(a: f32, x: f64) -> i32 {
        (127.0 - (-(a as f64) * x + 127f64.log2()).exp2()).round() as i32
    }

    #[test]
    fn thresholds_match_formula() {
        for (i, &t) in THRESHOLDS.iter().enumerate() {
            let k = (i + 1) as f64;
            assert!((t - (127.0 / (127.5 - k)).log2()).abs() < 1e-12, "k={k}");
        }
    }

    #[test]
    fn exponential_is_exact() {
        for class in [SensorClass::Big, SensorClass::Small, SensorClass::Kick] {
            for profile in PROFILES {
                let Curve::Exponential { a } = curve_for(class, profile) else {
                    panic!("{class:?} is not exponential");
                };
                let c = Curve::Exponential { a };
                for x in 0..=4095u16 {
                    assert_eq!(c.map(x) as i32, reference(a, x as f64), "{class:?}/{profile:?} x={x}");
                }
            }
        }
    }

    #[test]
    fn power_curve_within_one() {
        for profile in PROFILES {
            let Curve::ExponentialPower { a, b } = curve_for(SensorClass::Snare, profile) else {
                panic!("snare is not exponential-power");
            };
            let c = Curve::ExponentialPower { a, b };
            for x in 0..=4095u16 {
                let expected = reference(a, (x as f64).powf(b as f64));
                let got = c.map(x) as i32;
                assert!((got - expected).abs() <= 1, "{profile:?} x={x}: {got} vs {expected}");
            }
        }
    }

    #[test]
    fn exponential_is_monotonic() {
        for class in CLASSES {
            for profile in PROFILES {
                let c = curve_for(class, profile);
                let mut last = 0;
                for x in (0..=4096).step_by(16) {
                    let v = c.map(x);
                    assert!(v + 1 >= last, "{class:?}/{profile:?} at {x}");
                    last = v;
                }
            }
        }
    }

    #[test]
    fn always_in_midi_range() {
        for class in CLASSES {
            for profile in PROFILES {
                let c = curve_for(class, profile);
                for x in (0..=u16::MAX).step_by(97).chain([0, 1, u16::MAX]) {
                    assert!(c.map(x) <= 127);
                }
            }
        }
    }

    #[test]
    fn harder_profile_is_louder() {
        let soft = curve_for(SensorClass::Big, Profile::Soft).map(400);
        let hard = curve_for(SensorClass::Big, Profile::Hard).map(400);
        assert!(hard > soft);
    }

    #[test]
    fn power_curve_total_at_zero() {
        let c = Curve::ExponentialPower { a: 0.001, b: 1.5 };
        assert_eq!(c.map(0), 0);
        assert_eq!(c.map(u16::MAX), 127);
    }
}
