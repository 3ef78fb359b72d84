use ratatui::style::Color;

use super::CountryRecord;

/// Ascending GDP thresholds in billions USD. A value lands in bucket `i + 1`
/// when it is strictly greater than `THRESHOLDS[i]`.
pub const THRESHOLDS: [f64; 7] = [100.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0];

/// Number of palette buckets (one more than thresholds)
pub const BUCKETS: usize = THRESHOLDS.len() + 1;

/// Cool to hot, lowest bucket first
pub const PALETTE: [Color; BUCKETS] = [
    Color::Rgb(0x64, 0x74, 0x8b), // slate
    Color::Rgb(0x84, 0xcc, 0x16), // lime
    Color::Rgb(0x10, 0xb9, 0x81), // emerald
    Color::Rgb(0x0e, 0xa5, 0xe9), // sky
    Color::Rgb(0x3b, 0x82, 0xf6), // blue
    Color::Rgb(0x63, 0x66, 0xf1), // indigo
    Color::Rgb(0xa8, 0x55, 0xf7), // purple
    Color::Rgb(0xec, 0x48, 0x99), // pink
];

/// Low-saturation placeholder for regions without a record
pub const NEUTRAL: Color = Color::Rgb(0x3f, 0x3f, 0x46);

/// Legend rows shown on the dashboard, hottest first
pub const LEGEND: [(&str, usize); 5] = [
    ("> $20T", 7),
    ("> $10T", 6),
    ("> $5T", 5),
    ("> $2T", 4),
    ("< $1T", 2),
];

/// Bucket index for a GDP value. Exact thresholds go to the higher bucket
/// only when exceeded, so `bucket_for(1000.0)` is the 500–1000 bucket.
pub fn bucket_for(gdp_billions_usd: f64) -> usize {
    THRESHOLDS
        .iter()
        .rposition(|&threshold| gdp_billions_usd > threshold)
        .map_or(0, |idx| idx + 1)
}

pub fn color_for(gdp_billions_usd: f64) -> Color {
    PALETTE[bucket_for(gdp_billions_usd)]
}

/// Fill color for a region, falling back to the neutral placeholder
pub fn region_color(record: Option<&CountryRecord>) -> Color {
    record.map_or(NEUTRAL, |r| color_for(r.gdp_billions_usd))
}
