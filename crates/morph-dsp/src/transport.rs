//! Optimal-transport planning between magnitude spectra.
//!
//! Two planners share this module. The CDF planner treats bin magnitudes
//! as a probability distribution and maps each source bin through
//! `T = F_y^{-1} . F_x`. The reassignment planner first partitions the
//! spectrum into masses centred on detected partials, then runs the
//! monotone two-pointer transport that is optimal for the 1-D
//! Wasserstein-1 cost between ordered atoms.

use crate::spectral::FrameSpectrum;
use crate::warn::{WarnSink, Warning};
use crate::EPS;

/// Fill `map[i]` with the smallest target bin whose CDF reaches the
/// source CDF at bin `i`. `cdf_x`/`cdf_y` are caller-owned scratch so the
/// audio thread never allocates; all four slices have bin length.
///
/// A side whose magnitudes sum below the numerical floor is treated as a
/// unit mass spread uniformly over the bins.
pub fn cdf_transport_map(
    mag_x: &[f64],
    mag_y: &[f64],
    cdf_x: &mut [f64],
    cdf_y: &mut [f64],
    map: &mut [usize],
) {
    let bins = mag_x.len();
    let sum_x: f64 = mag_x.iter().sum();
    let sum_y: f64 = mag_y.iter().sum();

    build_cdf(mag_x, sum_x, cdf_x);
    build_cdf(mag_y, sum_y, cdf_y);

    for i in 0..bins {
        map[i] = lower_bound(cdf_y, cdf_x[i] - EPS);
    }
}

fn build_cdf(mag: &[f64], sum: f64, cdf: &mut [f64]) {
    let bins = mag.len();
    let mut cum = 0.0;
    if sum <= EPS {
        // Uniform unit mass
        let p = 1.0 / bins as f64;
        for c in cdf.iter_mut() {
            cum += p;
            *c = cum;
        }
    } else {
        for (c, &m) in cdf.iter_mut().zip(mag) {
            cum += m / sum;
            *c = cum;
        }
    }
}

/// Smallest index with `cdf[j] >= value`, or the last index.
fn lower_bound(cdf: &[f64], value: f64) -> usize {
    let mut left = 0;
    let mut right = cdf.len() - 1;
    let mut result = cdf.len() - 1;
    while left <= right {
        let mid = (left + right) / 2;
        if cdf[mid] >= value {
            result = mid;
            if mid == 0 {
                break;
            }
            right = mid - 1;
        } else {
            left = mid + 1;
        }
    }
    result
}

/// A contiguous group of bins treated as one transport atom, centred on a
/// detected partial. Masses partition `[0, bins)` and their normalised
/// masses sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralMass {
    pub left_bin: usize,
    pub center_bin: usize,
    pub right_bin: usize,
    pub mass: f64,
}

/// One entry of a transport plan: move `mass` from the source atom
/// `left` to the target atom `right`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportStep {
    pub left: usize,
    pub right: usize,
    pub mass: f64,
}

/// Partition a spectrum into masses.
///
/// A mass begins where the reassignment offset flips from falling to
/// rising and ends at the next such flip; the centre sits at the
/// rising-to-falling flip, choosing whichever adjacent bin reassigns
/// closer to its own centre. A near-silent spectrum yields a single
/// uniform mass covering all bins.
pub fn group_spectrum(spec: &FrameSpectrum, masses: &mut Vec<SpectralMass>, sink: &dyn WarnSink) {
    masses.clear();
    let bins = spec.bins();
    let mass_sum = spec.total_magnitude();

    if mass_sum < EPS {
        sink.warn(Warning::NearSilentSpectrum);
        masses.push(SpectralMass {
            left_bin: 0,
            center_bin: bins / 2,
            right_bin: bins,
            mass: 1.0,
        });
        return;
    }

    masses.push(SpectralMass {
        left_bin: 0,
        center_bin: 0,
        right_bin: bins,
        mass: 0.0,
    });

    let mut sign = false;
    let mut first = true;
    for i in 0..bins {
        let current_sign = spec.freq_reassigned[i] > spec.freq[i];
        if first {
            first = false;
            sign = current_sign;
            continue;
        }
        if current_sign == sign {
            continue;
        }

        if sign {
            // Falling edge: this is the centre. Take the adjacent bin
            // that reassigns closer to its own centre frequency.
            let left_dist = spec.freq_reassigned[i - 1] - spec.freq[i - 1];
            let right_dist = spec.freq[i] - spec.freq_reassigned[i];
            let last = masses.last_mut().unwrap();
            last.center_bin = if left_dist < right_dist { i - 1 } else { i };
        } else {
            // Rising edge: close the current mass and start the next.
            let left_bin = masses.last().unwrap().left_bin;
            let mut m = 0.0;
            for j in left_bin..i {
                m += spec.values[j].norm();
            }
            if m > 0.0 {
                let last = masses.last_mut().unwrap();
                last.mass = m / mass_sum;
                last.right_bin = i;
                masses.push(SpectralMass {
                    left_bin: i,
                    center_bin: i,
                    right_bin: bins,
                    mass: 0.0,
                });
            }
        }
        sign = current_sign;
    }

    // Close the final mass; it extends to the end of the spectrum.
    let last = masses.last_mut().unwrap();
    last.right_bin = bins;
    let mut m = 0.0;
    for j in last.left_bin..bins {
        m += spec.values[j].norm();
    }
    last.mass = m / mass_sum;
}

/// Monotone 1-D transport between ordered mass lists. Runs two pointers,
/// at each step moving the smaller remaining mass; O(L + R). Every
/// emitted step has strictly positive mass.
pub fn transport_plan(
    left: &[SpectralMass],
    right: &[SpectralMass],
    plan: &mut Vec<TransportStep>,
) {
    plan.clear();
    if left.is_empty() || right.is_empty() {
        return;
    }

    let mut li = 0;
    let mut ri = 0;
    let mut lm = left[0].mass;
    let mut rm = right[0].mass;

    loop {
        if lm < rm {
            if lm > 0.0 {
                plan.push(TransportStep {
                    left: li,
                    right: ri,
                    mass: lm,
                });
            }
            rm -= lm;
            li += 1;
            if li >= left.len() {
                break;
            }
            lm = left[li].mass;
        } else {
            if rm > 0.0 {
                plan.push(TransportStep {
                    left: li,
                    right: ri,
                    mass: rm,
                });
            }
            lm -= rm;
            ri += 1;
            if ri >= right.len() {
                break;
            }
            rm = right[ri].mass;
        }
    }
}
