pub mod scale;
pub mod trend;

/// Economic figures for one country. Values are fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountryRecord {
    /// ISO 3166-1 alpha-3 code, unique key of the table
    pub code: &'static str,
    pub display_name: &'static str,
    /// Nominal GDP in billions of USD
    pub gdp_billions_usd: f64,
    /// Annual real GDP growth in percent (may be negative)
    pub gdp_growth_percent: f64,
    pub population: u64,
    /// World rank by nominal GDP, starting at 1
    pub rank: u32,
}

impl CountryRecord {
    const fn new(
        code: &'static str,
        display_name: &'static str,
        gdp_billions_usd: f64,
        gdp_growth_percent: f64,
        population: u64,
        rank: u32,
    ) -> Self {
        Self {
            code,
            display_name,
            gdp_billions_usd,
            gdp_growth_percent,
            population,
            rank,
        }
    }
}

/// A subset of major economies. Regions outside this table are estimated by the model.
static GDP_TABLE: [CountryRecord; 20] = [
    CountryRecord::new("USA", "United States", 27360.0, 2.5, 333_000_000, 1),
    CountryRecord::new("CHN", "China", 17790.0, 5.2, 1_412_000_000, 2),
    CountryRecord::new("DEU", "Germany", 4456.0, -0.3, 83_800_000, 3),
    CountryRecord::new("JPN", "Japan", 4212.0, 1.9, 125_100_000, 4),
    CountryRecord::new("IND", "India", 3549.0, 7.8, 1_417_000_000, 5),
    CountryRecord::new("GBR", "United Kingdom", 3340.0, 0.1, 67_300_000, 6),
    CountryRecord::new("FRA", "France", 3030.0, 0.9, 67_900_000, 7),
    CountryRecord::new("ITA", "Italy", 2254.0, 0.7, 58_900_000, 8),
    CountryRecord::new("BRA", "Brazil", 2173.0, 2.9, 215_300_000, 9),
    CountryRecord::new("CAN", "Canada", 2140.0, 1.1, 38_900_000, 10),
    CountryRecord::new("RUS", "Russia", 1999.0, 3.6, 144_200_000, 11),
    CountryRecord::new("MEX", "Mexico", 1788.0, 3.2, 127_500_000, 12),
    CountryRecord::new("KOR", "South Korea", 1712.0, 1.4, 51_600_000, 13),
    CountryRecord::new("AUS", "Australia", 1692.0, 1.5, 26_000_000, 14),
    CountryRecord::new("ESP", "Spain", 1580.0, 2.5, 47_700_000, 15),
    CountryRecord::new("IDN", "Indonesia", 1371.0, 5.0, 275_500_000, 16),
    CountryRecord::new("TUR", "Turkey", 1108.0, 4.5, 85_000_000, 17),
    CountryRecord::new("SAU", "Saudi Arabia", 1067.0, -0.9, 36_400_000, 18),
    CountryRecord::new("NLD", "Netherlands", 1092.0, 0.1, 17_700_000, 19),
    CountryRecord::new("CHE", "Switzerland", 869.0, 0.8, 8_700_000, 20),
];

/// Look up the record for an ISO3 code. `None` is the normal "no local data" outcome.
pub fn lookup(code: &str) -> Option<&'static CountryRecord> {
    GDP_TABLE.iter().find(|record| record.code == code)
}

/// All records in rank order
pub fn all() -> impl Iterator<Item = &'static CountryRecord> {
    GDP_TABLE.iter()
}
