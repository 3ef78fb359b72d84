use super::CountryRecord;

/// Year of the most recent point in the mock history
pub const CURRENT_YEAR: u16 = 2024;

/// Stable seed for a country code (FNV-1a)
#[inline]
fn seed_for(code: &str) -> u64 {
    code.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

/// Deterministic unit-interval sample using splitmix64
#[inline(always)]
fn unit_sample(seed: u64) -> f64 {
    let mut x = seed.wrapping_mul(0x9e3779b97f4a7c15);
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;
    (x >> 11) as f64 / 9007199254740992.0
}

/// Illustrative 5-year GDP trend (six yearly points) for the detail panel.
///
/// Starts at 80% of the recorded GDP and grows 1–6% per year. The growth
/// draws are seeded from the ISO code so redraws show the same chart.
pub fn mock_history(record: &CountryRecord) -> Vec<(u16, u64)> {
    let seed = seed_for(record.code);
    let mut current = record.gdp_billions_usd * 0.8;

    (0..=5u16)
        .rev()
        .enumerate()
        .map(|(step, years_back)| {
            let point = (CURRENT_YEAR - years_back, current.round().max(0.0) as u64);
            current *= 1.0 + (unit_sample(seed.wrapping_add(step as u64)) * 0.05 + 0.01);
            point
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy;

    #[test]
    fn test_six_points_ending_current_year() {
        let usa = economy::lookup("USA").unwrap();
        let history = mock_history(usa);
        assert_eq!(history.len(), 6);
        assert_eq!(history.first().unwrap().0, 2019);
        assert_eq!(history.last().unwrap().0, CURRENT_YEAR);
        assert_eq!(history[0].1, (27360.0f64 * 0.8).round() as u64);
    }

    #[test]
    fn test_growth_within_band_and_stable() {
        let jpn = economy::lookup("JPN").unwrap();
        let a = mock_history(jpn);
        let b = mock_history(jpn);
        assert_eq!(a, b);
        for pair in a.windows(2) {
            let ratio = pair[1].1 as f64 / pair[0].1 as f64;
            assert!(ratio > 1.0 && ratio < 1.07, "ratio {ratio}");
        }
    }
}
