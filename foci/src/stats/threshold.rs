//! Histogram auto-threshold algorithms.
//!
//! Every method takes bin counts and returns the index of the last background
//! bin: pixels in bins `<= t` are background, pixels above are foreground.
//! The algorithms follow the ImageJ `AutoThresholder` family so results are
//! comparable with existing FindFoci parameter sets.

use crate::config::ThresholdMethod;

const EPS: f64 = 2.220446049250313e-16;
const MAX_SMOOTHING_ITERATIONS: usize = 10_000;
const MAX_LI_ITERATIONS: usize = 1_000;

/// Threshold bin for `counts`, or `None` when the histogram is empty or the
/// method does not converge.
pub fn threshold_bin(method: ThresholdMethod, counts: &[u64]) -> Option<usize> {
    if counts.iter().all(|&c| c == 0) {
        return None;
    }
    if counts.len() == 1 {
        return Some(0);
    }
    let t = match method {
        ThresholdMethod::Default => Some(ij_isodata(counts)),
        ThresholdMethod::Huang => Some(huang(counts)),
        ThresholdMethod::Intermodes => intermodes(counts),
        ThresholdMethod::IsoData => isodata(counts),
        ThresholdMethod::Li => Some(li(counts)),
        ThresholdMethod::MaxEntropy => max_entropy(counts),
        ThresholdMethod::Mean => Some(mean(counts)),
        ThresholdMethod::Minimum => minimum(counts),
        ThresholdMethod::Moments => moments(counts),
        ThresholdMethod::Otsu => Some(otsu(counts)),
        ThresholdMethod::Percentile => percentile(counts),
        ThresholdMethod::Triangle => Some(triangle(counts)),
        ThresholdMethod::Yen => yen(counts),
    };
    t.map(|t| t.min(counts.len() - 1))
}

// ============================================================================
// Mean based
// ============================================================================

/// Iterative intermeans with the end bins ignored.
fn ij_isodata(counts: &[u64]) -> usize {
    let mut data = counts.to_vec();
    let last = data.len() - 1;
    data[0] = 0;
    data[last] = 0;

    let mut min = 0;
    while data[min] == 0 && min < last {
        min += 1;
    }
    let mut max = last;
    while data[max] == 0 && max > 0 {
        max -= 1;
    }
    if min >= max {
        return data.len() / 2;
    }

    let mut moving = min;
    let mut result;
    loop {
        let (mut sum1, mut sum2, mut sum3, mut sum4) = (0.0, 0.0, 0.0, 0.0);
        for (i, &c) in data.iter().enumerate().take(moving + 1).skip(min) {
            sum1 += i as f64 * c as f64;
            sum2 += c as f64;
        }
        for (i, &c) in data.iter().enumerate().take(max + 1).skip(moving + 1) {
            sum3 += i as f64 * c as f64;
            sum4 += c as f64;
        }
        result = (sum1 / sum2 + sum3 / sum4) / 2.0;
        moving += 1;
        if !((moving + 1) as f64 <= result && moving + 1 < max) {
            break;
        }
    }
    result.round().max(0.0) as usize
}

fn isodata(counts: &[u64]) -> Option<usize> {
    let n = counts.len();
    let mut g = counts
        .iter()
        .enumerate()
        .skip(1)
        .find(|&(_, &c)| c > 0)
        .map(|(i, _)| i + 1)
        .unwrap_or(0);

    loop {
        let (mut low, mut total_low) = (0u128, 0u128);
        for (i, &c) in counts.iter().enumerate().take((g + 1).min(n)) {
            total_low += c as u128;
            low += c as u128 * i as u128;
        }
        let (mut high, mut total_high) = (0u128, 0u128);
        for (i, &c) in counts.iter().enumerate().skip(g + 1) {
            total_high += c as u128;
            high += c as u128 * i as u128;
        }
        if total_low > 0 && total_high > 0 {
            let l = low / total_low;
            let h = high / total_high;
            if g == ((l + h) as f64 / 2.0).round() as usize {
                return Some(g);
            }
        }
        g += 1;
        if g + 2 > n {
            return None;
        }
    }
}

fn li(counts: &[u64]) -> usize {
    let n = counts.len();
    let num_pixels: f64 = counts.iter().map(|&c| c as f64).sum();
    let mean = weighted_sum(counts, 0, n) / num_pixels;

    let mut new_thresh = mean;
    let mut threshold;
    let mut iterations = 0;
    loop {
        let old_thresh = new_thresh;
        threshold = ((old_thresh + 0.5).max(0.0) as usize).min(n - 1);

        let num_back = count_sum(counts, 0, threshold + 1);
        let mean_back = if num_back == 0.0 {
            0.0
        } else {
            weighted_sum(counts, 0, threshold + 1) / num_back
        };
        let num_obj = count_sum(counts, threshold + 1, n);
        let mean_obj = if num_obj == 0.0 {
            0.0
        } else {
            weighted_sum(counts, threshold + 1, n) / num_obj
        };

        let temp = (mean_back - mean_obj) / (mean_back.ln() - mean_obj.ln());
        if !temp.is_finite() {
            break;
        }
        new_thresh = if temp < -EPS {
            (temp - 0.5).trunc()
        } else {
            (temp + 0.5).trunc()
        };

        iterations += 1;
        if (new_thresh - old_thresh).abs() <= 0.5 || iterations >= MAX_LI_ITERATIONS {
            break;
        }
    }
    threshold
}

fn mean(counts: &[u64]) -> usize {
    let total = count_sum(counts, 0, counts.len());
    (weighted_sum(counts, 0, counts.len()) / total).floor() as usize
}

fn moments(counts: &[u64]) -> Option<usize> {
    let total = count_sum(counts, 0, counts.len());
    let histo: Vec<f64> = counts.iter().map(|&c| c as f64 / total).collect();

    let m0 = 1.0;
    let (mut m1, mut m2, mut m3) = (0.0, 0.0, 0.0);
    for (i, &h) in histo.iter().enumerate() {
        let di = i as f64;
        m1 += di * h;
        m2 += di * di * h;
        m3 += di * di * di * h;
    }

    let cd = m0 * m2 - m1 * m1;
    let c0 = (-m2 * m2 + m1 * m3) / cd;
    let c1 = (m0 * -m3 + m2 * m1) / cd;
    let disc = (c1 * c1 - 4.0 * c0).sqrt();
    let z0 = 0.5 * (-c1 - disc);
    let z1 = 0.5 * (-c1 + disc);
    let p0 = (z1 - m1) / (z1 - z0);

    let mut sum = 0.0;
    for (i, &h) in histo.iter().enumerate() {
        sum += h;
        if sum > p0 {
            return Some(i);
        }
    }
    None
}

/// Maximises the between-class variance.
fn otsu(counts: &[u64]) -> usize {
    let n = counts.len();
    let total = count_sum(counts, 0, n);
    let sum_total = weighted_sum(counts, 0, n);

    let mut sum_k = 0.0;
    let mut n1 = 0.0;
    let mut best = 0.0;
    let mut k_star = 0;
    for (k, &c) in counts.iter().enumerate().take(n - 1) {
        sum_k += k as f64 * c as f64;
        n1 += c as f64;
        let denom = n1 * (total - n1);
        let bcv = if denom != 0.0 {
            let num = (n1 / total) * sum_total - sum_k;
            num * num / denom
        } else {
            0.0
        };
        if bcv >= best {
            best = bcv;
            k_star = k;
        }
    }
    k_star
}

fn percentile(counts: &[u64]) -> Option<usize> {
    const PTILE: f64 = 0.5;
    let total = count_sum(counts, 0, counts.len());
    let mut best = 1.0;
    let mut threshold = None;
    let mut cumulative = 0.0;
    for (i, &c) in counts.iter().enumerate() {
        cumulative += c as f64;
        let distance = (cumulative / total - PTILE).abs();
        if distance < best {
            best = distance;
            threshold = Some(i);
        }
    }
    threshold
}

// ============================================================================
// Entropy based
// ============================================================================

/// Fuzzy-set entropy minimisation.
fn huang(counts: &[u64]) -> usize {
    let Some(first) = counts.iter().position(|&c| c > 0) else {
        return 0;
    };
    let last = counts.iter().rposition(|&c| c > 0).unwrap_or(first);
    if first == last {
        return first;
    }

    let mut s = vec![0.0; last + 1];
    let mut w = vec![0.0; last + 1];
    s[0] = counts[0] as f64;
    for i in first.max(1)..=last {
        s[i] = s[i - 1] + counts[i] as f64;
        w[i] = w[i - 1] + i as f64 * counts[i] as f64;
    }

    let c = (last - first) as f64;
    let mut smu = vec![0.0; last + 1 - first];
    for (i, v) in smu.iter_mut().enumerate().skip(1) {
        let mu = 1.0 / (1.0 + i as f64 / c);
        *v = -mu * mu.ln() - (1.0 - mu) * (1.0 - mu).ln();
    }

    let mut best_threshold = first;
    let mut best_entropy = f64::MAX;
    for threshold in first..=last {
        let mut entropy = 0.0;
        let mu = rounded_mean(w[threshold], s[threshold]);
        for i in first..=threshold {
            entropy += smu[i.abs_diff(mu).min(smu.len() - 1)] * counts[i] as f64;
        }
        let mu = rounded_mean(w[last] - w[threshold], s[last] - s[threshold]);
        for i in threshold + 1..=last {
            entropy += smu[i.abs_diff(mu).min(smu.len() - 1)] * counts[i] as f64;
        }
        if best_entropy > entropy {
            best_entropy = entropy;
            best_threshold = threshold;
        }
    }
    best_threshold
}

fn rounded_mean(weighted: f64, count: f64) -> usize {
    let mu = (weighted / count).round();
    if mu.is_finite() && mu > 0.0 {
        mu as usize
    } else {
        0
    }
}

/// Kapur-Sahoo-Wong maximum entropy.
///
/// Class entropies are evaluated from prefix sums of `p ln p`.
fn max_entropy(counts: &[u64]) -> Option<usize> {
    let n = counts.len();
    let total = count_sum(counts, 0, n);
    let norm: Vec<f64> = counts.iter().map(|&c| c as f64 / total).collect();

    let mut p1 = vec![0.0; n];
    let mut plogp = vec![0.0; n];
    let mut acc = 0.0;
    let mut acc_log = 0.0;
    for (i, &p) in norm.iter().enumerate() {
        acc += p;
        if p > 0.0 {
            acc_log += p * p.ln();
        }
        p1[i] = acc;
        plogp[i] = acc_log;
    }
    let total_plogp = acc_log;

    let first = p1.iter().position(|&v| v.abs() >= EPS).unwrap_or(0);
    let last = (first..n)
        .rev()
        .find(|&i| (1.0 - p1[i]).abs() >= EPS)
        .unwrap_or(n - 1);

    let mut threshold = None;
    let mut max_ent = f64::MIN_POSITIVE;
    for it in first..=last {
        let back = p1[it];
        let obj = 1.0 - back;
        // H = -sum (p/P) ln(p/P) = ln P - (1/P) sum p ln p
        let ent_back = if back > 0.0 {
            back.ln() - plogp[it] / back
        } else {
            0.0
        };
        let ent_obj = if obj > 0.0 {
            obj.ln() - (total_plogp - plogp[it]) / obj
        } else {
            0.0
        };
        let tot = ent_back + ent_obj;
        if max_ent < tot {
            max_ent = tot;
            threshold = Some(it);
        }
    }
    threshold
}

fn yen(counts: &[u64]) -> Option<usize> {
    let n = counts.len();
    let total = count_sum(counts, 0, n);
    let norm: Vec<f64> = counts.iter().map(|&c| c as f64 / total).collect();

    let mut p1 = vec![0.0; n];
    let mut p1_sq = vec![0.0; n];
    p1[0] = norm[0];
    p1_sq[0] = norm[0] * norm[0];
    for i in 1..n {
        p1[i] = p1[i - 1] + norm[i];
        p1_sq[i] = p1_sq[i - 1] + norm[i] * norm[i];
    }
    let mut p2_sq = vec![0.0; n];
    for i in (0..n - 1).rev() {
        p2_sq[i] = p2_sq[i + 1] + norm[i + 1] * norm[i + 1];
    }

    let mut threshold = None;
    let mut max_crit = f64::MIN_POSITIVE;
    for it in 0..n {
        let a = p1_sq[it] * p2_sq[it];
        let b = p1[it] * (1.0 - p1[it]);
        let crit = -(if a > 0.0 { a.ln() } else { 0.0 }) + 2.0 * if b > 0.0 { b.ln() } else { 0.0 };
        if crit > max_crit {
            max_crit = crit;
            threshold = Some(it);
        }
    }
    threshold
}

// ============================================================================
// Shape based
// ============================================================================

/// Smooth with a 3-point running mean until exactly two modes remain.
fn smooth_until_bimodal(counts: &[u64]) -> Option<Vec<f64>> {
    let n = counts.len();
    let mut histo: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    if n < 3 {
        return None;
    }
    let mut smoothed = vec![0.0; n];
    let mut iterations = 0;
    while !is_bimodal(&histo) {
        for i in 1..n - 1 {
            smoothed[i] = (histo[i - 1] + histo[i] + histo[i + 1]) / 3.0;
        }
        smoothed[0] = (histo[0] + histo[1]) / 3.0;
        smoothed[n - 1] = (histo[n - 2] + histo[n - 1]) / 3.0;
        std::mem::swap(&mut histo, &mut smoothed);
        iterations += 1;
        if iterations > MAX_SMOOTHING_ITERATIONS {
            return None;
        }
    }
    Some(histo)
}

fn is_bimodal(y: &[f64]) -> bool {
    let mut modes = 0;
    for k in 1..y.len() - 1 {
        if y[k - 1] < y[k] && y[k + 1] < y[k] {
            modes += 1;
            if modes > 2 {
                return false;
            }
        }
    }
    modes == 2
}

/// Midpoint between the two modes of the smoothed histogram.
fn intermodes(counts: &[u64]) -> Option<usize> {
    let histo = smooth_until_bimodal(counts)?;
    let mut sum = 0;
    for i in 1..histo.len() - 1 {
        if histo[i - 1] < histo[i] && histo[i + 1] < histo[i] {
            sum += i;
        }
    }
    Some(sum / 2)
}

/// Valley between the two modes of the smoothed histogram.
fn minimum(counts: &[u64]) -> Option<usize> {
    let max = counts.iter().rposition(|&c| c > 0)?;
    let histo = smooth_until_bimodal(counts)?;
    (1..max).find(|&i| histo[i - 1] > histo[i] && histo[i + 1] >= histo[i])
}

/// Zack triangle method on the longer tail of the histogram.
fn triangle(counts: &[u64]) -> usize {
    let n = counts.len();
    let mut data: Vec<f64> = counts.iter().map(|&c| c as f64).collect();

    let mut min = data.iter().position(|&c| c > 0.0).unwrap_or(0);
    if min > 0 {
        min -= 1;
    }
    let mut min2 = (1..n).rev().find(|&i| data[i] > 0.0).unwrap_or(0);
    if min2 < n - 1 {
        min2 += 1;
    }
    let mut max = 0;
    let mut dmax = 0.0;
    for (i, &v) in data.iter().enumerate() {
        if v > dmax {
            max = i;
            dmax = v;
        }
    }

    let inverted = (max as isize - min as isize) < (min2 as isize - max as isize);
    if inverted {
        data.reverse();
        min = n - 1 - min2;
        max = n - 1 - max;
    }
    if min == max {
        return if inverted { n - 1 - min } else { min };
    }

    let mut nx = data[max];
    let mut ny = min as f64 - max as f64;
    let d = (nx * nx + ny * ny).sqrt();
    nx /= d;
    ny /= d;
    let d = nx * min as f64 + ny * data[min];

    let mut split = min;
    let mut split_distance = 0.0;
    for (i, &v) in data.iter().enumerate().take(max + 1).skip(min + 1) {
        let distance = nx * i as f64 + ny * v - d;
        if distance > split_distance {
            split = i;
            split_distance = distance;
        }
    }
    split = split.saturating_sub(1);

    if inverted { n - 1 - split } else { split }
}

// ============================================================================
// Helpers
// ============================================================================

fn count_sum(counts: &[u64], from: usize, to: usize) -> f64 {
    counts[from.min(counts.len())..to.min(counts.len())]
        .iter()
        .map(|&c| c as f64)
        .sum()
}

fn weighted_sum(counts: &[u64], from: usize, to: usize) -> f64 {
    let from = from.min(counts.len());
    counts[from..to.min(counts.len())]
        .iter()
        .enumerate()
        .map(|(i, &c)| (from + i) as f64 * c as f64)
        .sum()
}
