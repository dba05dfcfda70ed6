pub const RCF_INTEREST_RATE: f64 = 0.13;
pub const BALANCEPOOL_INTEREST_RATE: f64 = 0.11;

/// Values per allocation candidate in a decision vector: start, tenor, amount.
pub const DIMENSIONS_PER_CANDIDATE: usize = 3;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum TaxClass {
    #[default]
    None,
    Ipf,
    Upf,
    Cf,
}

impl TaxClass {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Some(TaxClass::None);
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "IPF" => Some(TaxClass::Ipf),
            "UPF" => Some(TaxClass::Upf),
            "CF" => Some(TaxClass::Cf),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaxClass::None => "",
            TaxClass::Ipf => "IPF",
            TaxClass::Upf => "UPF",
            TaxClass::Cf => "CF",
        }
    }
}

/// Month index: `year * 12 + (month - 1)`.
pub type MonthIndex = i32;

/// Latest year accepted in input dates.
pub const MAX_YEAR: i32 = 9999;

pub fn month_index(year: i32, month: u32) -> MonthIndex {
    year * 12 + (month as i32 - 1)
}

/// Inverse of [`month_index`], returning `(month, year)` with `month` in `1..=12`.
pub fn month_and_year(index: MonthIndex) -> (u32, i32) {
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    (month, year)
}

/// Parses `D/M/YYYY`; the day is validated but otherwise ignored.
pub fn parse_month_date(raw: &str) -> Result<MonthIndex, String> {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    let [day, month, year] = parts.as_slice() else {
        return Err(format!("expected D/M/YYYY, got '{raw}'"));
    };
    let day: u32 = day
        .trim()
        .parse()
        .map_err(|_| format!("invalid day in '{raw}'"))?;
    let month: u32 = month
        .trim()
        .parse()
        .map_err(|_| format!("invalid month in '{raw}'"))?;
    let year: i32 = year
        .trim()
        .parse()
        .map_err(|_| format!("invalid year in '{raw}'"))?;
    if !(1..=31).contains(&day) {
        return Err(format!("day out of range in '{raw}'"));
    }
    if !(1..=12).contains(&month) {
        return Err(format!("month out of range in '{raw}'"));
    }
    if !(0..=MAX_YEAR).contains(&year) {
        return Err(format!("year out of range in '{raw}'"));
    }
    Ok(month_index(year, month))
}

/// Formats a month index as `01-MM-YYYY`.
pub fn format_month_date(index: MonthIndex) -> String {
    let (month, year) = month_and_year(index);
    format!("01-{month:02}-{year:04}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub segment: String,
    pub start_date: MonthIndex,
    pub tenor: i32,
    pub amount: i64,
    pub source_type: String,
    pub source_type_category: String,
    pub tax_class: TaxClass,
    pub interest_rate: f64,
}

impl Source {
    pub fn end_date(&self) -> MonthIndex {
        self.start_date + self.tenor
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub segment: String,
    pub start_date: MonthIndex,
    pub tenor: i32,
    pub amount: i64,
    pub tier: String,
    pub purpose: String,
    pub tax_class: TaxClass,
}

impl Requirement {
    pub fn end_date(&self) -> MonthIndex {
        self.start_date + self.tenor
    }
}

/// Only `amount` (total allocatable) takes part in allocation; the rest is
/// carried through to the output as recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalancePool {
    pub segment: String,
    pub recorded_date: MonthIndex,
    pub name: String,
    pub recorded_amount: i64,
    pub loaned_amount: i64,
    pub total_amount: i64,
    pub limit_percentage: f64,
    pub amount: f64,
}

impl BalancePool {
    pub fn with_amount(amount: f64) -> Self {
        Self {
            amount,
            ..Self::default()
        }
    }
}

/// Whole months shared by the half-open windows `[a_start, a_end)` and `[b_start, b_end)`.
pub fn window_overlap(a_start: i32, a_end: i32, b_start: i32, b_end: i32) -> i32 {
    a_end.min(b_end) - a_start.max(b_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_index_round_trips_literal_month_year_pairs() {
        for (month, year) in [(1, 2015), (3, 2015), (12, 2015), (1, 2016), (7, 1999)] {
            let index = month_index(year, month);
            assert_eq!(month_and_year(index), (month, year));
        }
        assert_eq!(month_index(2015, 1), 2015 * 12);
        assert_eq!(month_index(2015, 12) + 1, month_index(2016, 1));
    }

    #[test]
    fn parse_month_date_uses_zero_based_month_offset() {
        let index = parse_month_date("01/03/2015").expect("valid date");
        assert_eq!(index, 2015 * 12 + 2);
        assert_eq!(format_month_date(index), "01-03-2015");
    }

    #[test]
    fn parse_month_date_rejects_malformed_input() {
        assert!(parse_month_date("2015-03-01").is_err());
        assert!(parse_month_date("01/13/2015").is_err());
        assert!(parse_month_date("01/00/2015").is_err());
        assert!(parse_month_date("xx/03/2015").is_err());
        assert!(parse_month_date("").is_err());
        assert!(parse_month_date("01/01/300000000").is_err());
        assert!(parse_month_date("01/01/10000").is_err());
        assert!(parse_month_date("31/12/9999").is_ok());
    }

    #[test]
    fn tax_class_parses_known_labels_and_empty() {
        assert_eq!(TaxClass::parse(""), Some(TaxClass::None));
        assert_eq!(TaxClass::parse(" ipf "), Some(TaxClass::Ipf));
        assert_eq!(TaxClass::parse("UPF"), Some(TaxClass::Upf));
        assert_eq!(TaxClass::parse("CF"), Some(TaxClass::Cf));
        assert_eq!(TaxClass::parse("XYZ"), None);
        assert_eq!(TaxClass::Cf.as_str(), "CF");
    }

    #[test]
    fn window_overlap_is_negative_for_disjoint_windows() {
        assert_eq!(window_overlap(0, 3, 0, 3), 3);
        assert_eq!(window_overlap(0, 3, 2, 6), 1);
        assert_eq!(window_overlap(0, 3, 3, 6), 0);
        assert_eq!(window_overlap(0, 3, 5, 6), -2);
    }
}
