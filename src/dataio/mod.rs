use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::core::{
    AllocationCandidate, Backing, BalancePool, DIMENSIONS_PER_CANDIDATE, DecisionVector,
    EntityStore, GenerationStats, MonthIndex, PreconditionError, Requirement, Source,
    StrategyKind, TaxClass, format_month_date, parse_month_date,
};

const SOURCE_FIELDS: usize = 9;
const REQUIREMENT_FIELDS: usize = 8;
const BALANCE_POOL_FIELDS: usize = 10;
const ALLOCATION_FIELDS: usize = 7;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("{path} row {row}: expected {expected} fields, found {found}")]
    FieldCount {
        path: String,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("{path} row {row}: invalid {field} '{raw}': {reason}")]
    Field {
        path: String,
        row: usize,
        field: &'static str,
        raw: String,
        reason: String,
    },
    #[error("{path} row {row}: expected Id {expected}, found '{found}'")]
    IdSequence {
        path: String,
        row: usize,
        expected: usize,
        found: String,
    },
    #[error("{path} contains no records")]
    Empty { path: String },
    #[error("{path} row {row}: {entity} {id} does not exist")]
    UnknownReference {
        path: String,
        row: usize,
        entity: &'static str,
        id: usize,
    },
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write CSV to {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("failed to encode JSON for {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One data row, with enough context to name the file and row in errors.
struct Row<'a> {
    path: &'a str,
    row: usize,
    record: &'a StringRecord,
}

impl Row<'_> {
    fn text(&self, index: usize) -> String {
        self.record.get(index).unwrap_or_default().to_string()
    }

    fn invalid(&self, index: usize, field: &'static str, reason: impl Into<String>) -> LoadError {
        LoadError::Field {
            path: self.path.to_string(),
            row: self.row,
            field,
            raw: self.text(index),
            reason: reason.into(),
        }
    }

    /// Whole number; decimals are truncated the way the upstream exports expect.
    fn whole(&self, index: usize, field: &'static str) -> Result<i64, LoadError> {
        let raw = self.record.get(index).unwrap_or_default();
        if let Ok(value) = raw.parse::<i64>() {
            return Ok(value);
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value.trunc() as i64),
            _ => Err(self.invalid(index, field, "expected a number")),
        }
    }

    fn months(&self, index: usize, field: &'static str) -> Result<i32, LoadError> {
        let value = self.whole(index, field)?;
        i32::try_from(value).map_err(|_| self.invalid(index, field, "out of range"))
    }

    fn real(&self, index: usize, field: &'static str) -> Result<f64, LoadError> {
        match self.record.get(index).unwrap_or_default().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(self.invalid(index, field, "expected a finite number")),
        }
    }

    fn date(&self, index: usize, field: &'static str) -> Result<MonthIndex, LoadError> {
        parse_month_date(self.record.get(index).unwrap_or_default())
            .map_err(|reason| self.invalid(index, field, reason))
    }

    fn tax_class(&self, index: usize) -> Result<TaxClass, LoadError> {
        TaxClass::parse(self.record.get(index).unwrap_or_default())
            .ok_or_else(|| self.invalid(index, "Tax Class", "expected empty, IPF, UPF or CF"))
    }

    /// 1-based reference where `0` means "none".
    fn reference(&self, index: usize, field: &'static str) -> Result<Option<usize>, LoadError> {
        let value = self.whole(index, field)?;
        match value {
            0 => Ok(None),
            v if v > 0 => Ok(Some(v as usize - 1)),
            _ => Err(self.invalid(index, field, "must be >= 0")),
        }
    }
}

fn read_records<R: Read>(
    reader: R,
    path: &str,
    expected_fields: usize,
) -> Result<Vec<StringRecord>, LoadError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (index, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|source| LoadError::Csv {
            path: path.to_string(),
            source,
        })?;
        let row = index + 1;
        if record.len() != expected_fields {
            return Err(LoadError::FieldCount {
                path: path.to_string(),
                row,
                expected: expected_fields,
                found: record.len(),
            });
        }
        let raw_id = record.get(0).unwrap_or_default();
        if raw_id.parse::<usize>().ok() != Some(row) {
            return Err(LoadError::IdSequence {
                path: path.to_string(),
                row,
                expected: row,
                found: raw_id.to_string(),
            });
        }
        records.push(record);
    }
    Ok(records)
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn parse_sources<R: Read>(reader: R, path: &str) -> Result<Vec<Source>, LoadError> {
    let records = read_records(reader, path, SOURCE_FIELDS)?;
    if records.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_string(),
        });
    }
    records
        .iter()
        .enumerate()
        .map(|(index, record)| -> Result<Source, LoadError> {
            let row = Row {
                path,
                row: index + 1,
                record,
            };
            Ok(Source {
                segment: row.text(1),
                start_date: row.date(2, "Start Date")?,
                tenor: row.months(3, "Tenor")?,
                amount: row.whole(4, "Amount")?,
                source_type: row.text(5),
                source_type_category: row.text(6),
                tax_class: row.tax_class(7)?,
                interest_rate: row.real(8, "InterestRate")?,
            })
        })
        .collect()
}

pub fn parse_requirements<R: Read>(reader: R, path: &str) -> Result<Vec<Requirement>, LoadError> {
    let records = read_records(reader, path, REQUIREMENT_FIELDS)?;
    if records.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_string(),
        });
    }
    records
        .iter()
        .enumerate()
        .map(|(index, record)| -> Result<Requirement, LoadError> {
            let row = Row {
                path,
                row: index + 1,
                record,
            };
            Ok(Requirement {
                segment: row.text(1),
                start_date: row.date(2, "Start Date")?,
                tenor: row.months(3, "Tenor")?,
                amount: row.whole(4, "Amount")?,
                tier: row.text(5),
                purpose: row.text(6),
                tax_class: row.tax_class(7)?,
            })
        })
        .collect()
}

/// Field 2 (`BalancePoolId`) is constant in every export and is not kept.
pub fn parse_balance_pools<R: Read>(reader: R, path: &str) -> Result<Vec<BalancePool>, LoadError> {
    let records = read_records(reader, path, BALANCE_POOL_FIELDS)?;
    records
        .iter()
        .enumerate()
        .map(|(index, record)| -> Result<BalancePool, LoadError> {
            let row = Row {
                path,
                row: index + 1,
                record,
            };
            Ok(BalancePool {
                segment: row.text(1),
                recorded_date: row.date(3, "Recorded Date")?,
                name: row.text(4),
                recorded_amount: row.whole(5, "Recorded Amount")?,
                loaned_amount: row.whole(6, "Loaned Amount on Recorded Date")?,
                total_amount: row.whole(7, "Total Amount")?,
                limit_percentage: row.real(8, "Limit Percentage")?,
                amount: row.whole(9, "Total Allocatable Amount")? as f64,
            })
        })
        .collect()
}

/// Builds an [`EntityStore`] from in-memory CSV text; nothing is kept unless
/// every input parses and validates.
pub fn parse_entities(
    sources: &str,
    requirements: &str,
    balance_pools: Option<&str>,
) -> Result<EntityStore, LoadError> {
    let sources = parse_sources(sources.as_bytes(), "sources")?;
    let requirements = parse_requirements(requirements.as_bytes(), "requirements")?;
    let balance_pools = match balance_pools {
        Some(text) => parse_balance_pools(text.as_bytes(), "balance pools")?,
        None => Vec::new(),
    };
    Ok(EntityStore::new(sources, requirements, balance_pools)?)
}

pub fn load_entities(
    sources: &Path,
    requirements: &Path,
    balance_pools: Option<&Path>,
) -> Result<EntityStore, LoadError> {
    let source_list = parse_sources(open(sources)?, &sources.display().to_string())?;
    let requirement_list =
        parse_requirements(open(requirements)?, &requirements.display().to_string())?;
    let pool_list = match balance_pools {
        Some(path) => parse_balance_pools(open(path)?, &path.display().to_string())?,
        None => Vec::new(),
    };

    info!(
        sources = source_list.len(),
        requirements = requirement_list.len(),
        balance_pools = pool_list.len(),
        "entities loaded"
    );
    Ok(EntityStore::new(source_list, requirement_list, pool_list)?)
}

/// A hand-written allocation set: one candidate per row, in row order.
#[derive(Debug, Clone)]
pub struct AllocationPlan {
    pub candidates: Vec<AllocationCandidate>,
    pub vector: DecisionVector,
}

pub fn parse_allocation_plan<R: Read>(
    reader: R,
    path: &str,
    store: &EntityStore,
) -> Result<AllocationPlan, LoadError> {
    let records = read_records(reader, path, ALLOCATION_FIELDS)?;
    let mut candidates = Vec::with_capacity(records.len());
    let mut coords = Vec::with_capacity(records.len() * DIMENSIONS_PER_CANDIDATE);

    for (index, record) in records.iter().enumerate() {
        let row = Row {
            path,
            row: index + 1,
            record,
        };
        let unknown = |entity: &'static str, id: usize| LoadError::UnknownReference {
            path: path.to_string(),
            row: row.row,
            entity,
            id: id + 1,
        };

        let requirement_index = row
            .reference(1, "Requirement Id")?
            .ok_or_else(|| row.invalid(1, "Requirement Id", "must be set"))?;
        if requirement_index >= store.requirements().len() {
            return Err(unknown("requirement", requirement_index));
        }

        let backing = match (
            row.reference(2, "Source Id")?,
            row.reference(3, "Balance Pool Id")?,
        ) {
            (Some(source), None) => {
                if source >= store.sources().len() {
                    return Err(unknown("source", source));
                }
                Backing::Source(source)
            }
            (None, Some(pool)) => {
                if pool >= store.balance_pools().len() {
                    return Err(unknown("balance pool", pool));
                }
                Backing::BalancePool(pool)
            }
            _ => {
                return Err(row.invalid(
                    2,
                    "Source Id",
                    "exactly one of Source Id and Balance Pool Id must be set",
                ));
            }
        };

        candidates.push(AllocationCandidate {
            requirement_index,
            backing,
            offset: index * DIMENSIONS_PER_CANDIDATE,
        });
        coords.push(row.date(4, "Start Date")? as f64);
        coords.push(row.whole(5, "Tenor")? as f64);
        coords.push(row.whole(6, "Amount")? as f64);
    }

    let mut vector = DecisionVector::from_coords(coords);
    vector.reevaluate(store, &candidates);
    Ok(AllocationPlan { candidates, vector })
}

pub fn load_allocation_plan(path: &Path, store: &EntityStore) -> Result<AllocationPlan, LoadError> {
    parse_allocation_plan(open(path)?, &path.display().to_string(), store)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub id: usize,
    pub segment: String,
    pub start_date: String,
    pub tenor: i32,
    pub amount: i64,
    pub source_type: String,
    pub source_type_category: String,
    pub tax_class: &'static str,
    pub interest_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementRecord {
    pub id: usize,
    pub segment: String,
    pub start_date: String,
    pub tenor: i32,
    pub amount: i64,
    pub tier: String,
    pub purpose: String,
    pub tax_class: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancePoolRecord {
    pub id: usize,
    pub segment: String,
    pub recorded_date: String,
    pub name: String,
    pub recorded_amount: i64,
    pub amount_loaned_on_recorded_date: i64,
    pub total_amount: i64,
    pub limit_percentage: f64,
    pub amount: f64,
}

/// Ids are 1-based, matching the input files.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRecord {
    pub requirement_id: usize,
    pub source_id: Option<usize>,
    pub balance_pool_id: Option<usize>,
    pub start_date: String,
    pub tenor: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub strategy: Option<&'static str>,
    pub seed: Option<u64>,
    pub generations: u32,
    pub feasible: bool,
    pub violation: f64,
    pub cost: f64,
    pub baseline_cost: f64,
    pub allocation_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDocument {
    pub sources: Vec<SourceRecord>,
    pub requirements: Vec<RequirementRecord>,
    pub balance_pools: Vec<BalancePoolRecord>,
    pub allocations: Vec<AllocationRecord>,
    pub summary: RunSummary,
}

/// How the scored vector was produced; `None` strategy means it was supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunInfo {
    pub strategy: Option<StrategyKind>,
    pub seed: Option<u64>,
    pub generations: u32,
}

fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Every non-degenerate allocation of `vector`, in candidate order, rounded
/// after selection so each candidate charged in the cost is listed.
pub fn allocation_records(
    candidates: &[AllocationCandidate],
    vector: &DecisionVector,
) -> Vec<AllocationRecord> {
    candidates
        .iter()
        .filter(|candidate| !candidate.is_degenerate(vector))
        .map(|candidate| {
            let start = round_half_up(candidate.start(vector));
            let tenor = round_half_up(candidate.tenor(vector));
            let amount = round_half_up(candidate.amount(vector));
            AllocationRecord {
                requirement_id: candidate.requirement_index + 1,
                source_id: candidate.source_index().map(|i| i + 1),
                balance_pool_id: candidate.balance_pool_index().map(|i| i + 1),
                start_date: format_month_date(start.clamp(i32::MIN as i64, i32::MAX as i64) as i32),
                tenor,
                amount,
            }
        })
        .collect()
}

pub fn summarize(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
    vector: &DecisionVector,
    run: RunInfo,
) -> RunSummary {
    RunSummary {
        strategy: run.strategy.map(StrategyKind::as_str),
        seed: run.seed,
        generations: run.generations,
        feasible: vector.is_feasible(),
        violation: vector.violation(),
        cost: vector.fitness(),
        baseline_cost: store.baseline_cost(),
        allocation_count: allocation_records(candidates, vector).len(),
    }
}

pub fn build_output(
    store: &EntityStore,
    candidates: &[AllocationCandidate],
    vector: &DecisionVector,
    run: RunInfo,
) -> OutputDocument {
    let sources = store
        .sources()
        .iter()
        .enumerate()
        .map(|(index, source)| SourceRecord {
            id: index + 1,
            segment: source.segment.clone(),
            start_date: format_month_date(source.start_date),
            tenor: source.tenor,
            amount: source.amount,
            source_type: source.source_type.clone(),
            source_type_category: source.source_type_category.clone(),
            tax_class: source.tax_class.as_str(),
            interest_rate: source.interest_rate,
        })
        .collect();

    let requirements = store
        .requirements()
        .iter()
        .enumerate()
        .map(|(index, req)| RequirementRecord {
            id: index + 1,
            segment: req.segment.clone(),
            start_date: format_month_date(req.start_date),
            tenor: req.tenor,
            amount: req.amount,
            tier: req.tier.clone(),
            purpose: req.purpose.clone(),
            tax_class: req.tax_class.as_str(),
        })
        .collect();

    let balance_pools = store
        .balance_pools()
        .iter()
        .enumerate()
        .map(|(index, pool)| BalancePoolRecord {
            id: index + 1,
            segment: pool.segment.clone(),
            recorded_date: format_month_date(pool.recorded_date),
            name: pool.name.clone(),
            recorded_amount: pool.recorded_amount,
            amount_loaned_on_recorded_date: pool.loaned_amount,
            total_amount: pool.total_amount,
            limit_percentage: pool.limit_percentage,
            amount: pool.amount,
        })
        .collect();

    OutputDocument {
        sources,
        requirements,
        balance_pools,
        allocations: allocation_records(candidates, vector),
        summary: summarize(store, candidates, vector, run),
    }
}

pub fn write_output(path: &Path, document: &OutputDocument) -> Result<(), WriteError> {
    let label = path.display().to_string();
    let json = serde_json::to_string_pretty(document).map_err(|source| WriteError::Json {
        path: label.clone(),
        source,
    })?;
    let mut file = File::create(path).map_err(|source| WriteError::Io {
        path: label.clone(),
        source,
    })?;
    writeln!(file, "{json}").map_err(|source| WriteError::Io {
        path: label,
        source,
    })
}

pub fn write_history<W: Write>(writer: W, history: &[GenerationStats]) -> Result<(), csv::Error> {
    #[derive(Serialize)]
    struct HistoryRow {
        generation: u32,
        violation: f64,
        cost: f64,
    }

    let mut csv_writer = WriterBuilder::new().from_writer(writer);
    for stats in history {
        csv_writer.serialize(HistoryRow {
            generation: stats.generation,
            violation: stats.violation,
            cost: stats.fitness,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_history_file(path: &Path, history: &[GenerationStats]) -> Result<(), WriteError> {
    let label = path.display().to_string();
    let file = File::create(path).map_err(|source| WriteError::Io {
        path: label.clone(),
        source,
    })?;
    write_history(file, history).map_err(|source| WriteError::Csv {
        path: label,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generate_candidates;

    const SOURCES: &str = "\
Id,Segment,Start Date,Tenor,Amount,Source Type,Source Type Category,Tax Class,InterestRate
1,Retail,01/01/2015,3,1000,Bond,Fixed,,0.10
2,Retail,15/02/2015,6,500,Loan,Floating,IPF,0.08
";

    const REQUIREMENTS: &str = "\
Id,Segment,Start Date,Tenor,Amount,Tier,Purpose,Tax Class
1,Retail,01/01/2015,3,1000,T1,Capex,
2,Retail,01/03/2015,2,400,T2,Opex,ipf
";

    const POOLS: &str = "\
Id,Segment,BalancePoolId,Recorded Date,Name,Recorded Amount,Loaned Amount on Recorded Date,Total Amount,Limit Percentage,Total Allocatable Amount
1,Retail,1,31/12/2014,Main,9000,1000,10000,0.5,5000.75
";

    #[test]
    fn parses_all_three_entity_files() {
        let store = parse_entities(SOURCES, REQUIREMENTS, Some(POOLS)).expect("valid input");

        assert_eq!(store.sources().len(), 2);
        assert_eq!(store.sources()[0].start_date, 2015 * 12);
        assert_eq!(store.sources()[1].start_date, 2015 * 12 + 1);
        assert_eq!(store.sources()[1].tax_class, TaxClass::Ipf);
        assert!((store.sources()[1].interest_rate - 0.08).abs() < 1e-12);

        assert_eq!(store.requirements().len(), 2);
        assert_eq!(store.requirements()[1].tax_class, TaxClass::Ipf);
        assert_eq!(store.requirements()[1].purpose, "Opex");

        assert_eq!(store.balance_pools().len(), 1);
        assert_eq!(store.balance_pools()[0].amount, 5000.0);
        assert_eq!(store.balance_pools()[0].recorded_date, 2014 * 12 + 11);
    }

    #[test]
    fn balance_pool_file_is_optional() {
        let store = parse_entities(SOURCES, REQUIREMENTS, None).expect("valid input");
        assert!(store.balance_pools().is_empty());
    }

    #[test]
    fn wrong_field_count_names_file_and_row() {
        let bad = "Id,Segment,Start Date,Tenor,Amount,Tier,Purpose,Tax Class\n1,Retail,01/01/2015,3,1000,T1,Capex,\n2,Retail,01/03/2015,2\n";
        let err = parse_entities(SOURCES, bad, None).expect_err("must fail");
        assert!(matches!(
            err,
            LoadError::FieldCount {
                row: 2,
                expected: 8,
                found: 4,
                ..
            }
        ));
        assert!(err.to_string().contains("requirements row 2"));
    }

    #[test]
    fn ids_must_follow_row_numbers() {
        let bad = "Id,Segment,Start Date,Tenor,Amount,Tier,Purpose,Tax Class\n2,Retail,01/01/2015,3,1000,T1,Capex,\n";
        let err = parse_entities(SOURCES, bad, None).expect_err("must fail");
        assert!(matches!(err, LoadError::IdSequence { row: 1, expected: 1, .. }));
    }

    #[test]
    fn malformed_date_and_tax_class_are_field_errors() {
        let bad_date = "Id,Segment,Start Date,Tenor,Amount,Tier,Purpose,Tax Class\n1,Retail,2015-01-01,3,1000,T1,Capex,\n";
        let err = parse_entities(SOURCES, bad_date, None).expect_err("must fail");
        assert!(matches!(err, LoadError::Field { field: "Start Date", .. }));

        let bad_tax = "Id,Segment,Start Date,Tenor,Amount,Tier,Purpose,Tax Class\n1,Retail,01/01/2015,3,1000,T1,Capex,VAT\n";
        let err = parse_entities(SOURCES, bad_tax, None).expect_err("must fail");
        assert!(matches!(err, LoadError::Field { field: "Tax Class", .. }));
    }

    #[test]
    fn empty_requirement_file_is_rejected() {
        let empty = "Id,Segment,Start Date,Tenor,Amount,Tier,Purpose,Tax Class\n";
        let err = parse_entities(SOURCES, empty, None).expect_err("must fail");
        assert!(matches!(err, LoadError::Empty { .. }));
    }

    #[test]
    fn invalid_entity_values_surface_as_precondition_errors() {
        let zero_tenor = "Id,Segment,Start Date,Tenor,Amount,Tier,Purpose,Tax Class\n1,Retail,01/01/2015,0,1000,T1,Capex,\n";
        let err = parse_entities(SOURCES, zero_tenor, None).expect_err("must fail");
        assert!(matches!(
            err,
            LoadError::Precondition(PreconditionError::InvalidRequirement { index: 0, .. })
        ));
    }

    #[test]
    fn out_of_range_year_is_a_field_error() {
        let far = "Id,Segment,Start Date,Tenor,Amount,Tier,Purpose,Tax Class\n1,Retail,01/01/300000000,3,1000,T1,Capex,\n";
        let err = parse_entities(SOURCES, far, None).expect_err("must fail");
        assert!(matches!(
            err,
            LoadError::Field {
                row: 1,
                field: "Start Date",
                ..
            }
        ));
        assert!(err.to_string().contains("requirements row 1"));
    }

    #[test]
    fn tenor_overflowing_the_end_date_is_rejected() {
        let long = "Id,Segment,Start Date,Tenor,Amount,Tier,Purpose,Tax Class\n1,Retail,01/01/2015,3,1000,T1,Capex,\n2,Retail,01/01/2015,2147483000,1000,T1,Capex,\n";
        let err = parse_entities(SOURCES, long, None).expect_err("must fail");
        assert!(matches!(
            err,
            LoadError::Precondition(PreconditionError::InvalidRequirement { index: 1, .. })
        ));
    }

    #[test]
    fn allocation_plan_scores_supplied_allocations() {
        let store = parse_entities(SOURCES, REQUIREMENTS, Some(POOLS)).expect("valid input");
        let plan_csv = "\
Id,Requirement Id,Source Id,Balance Pool Id,Start Date,Tenor,Amount
1,1,1,0,01/01/2015,3,1000
2,2,0,1,01/03/2015,2,400
";
        let plan = parse_allocation_plan(plan_csv.as_bytes(), "plan", &store).expect("valid plan");

        assert_eq!(plan.candidates.len(), 2);
        assert_eq!(plan.candidates[0].source_index(), Some(0));
        assert_eq!(plan.candidates[1].balance_pool_index(), Some(0));
        assert!(plan.vector.is_feasible());
        let expected = 3.0 * 1000.0 * 0.10 + 2.0 * 400.0 * 0.11;
        assert!((plan.vector.fitness() - expected).abs() < 1e-6);
    }

    #[test]
    fn allocation_plan_rejects_bad_references() {
        let store = parse_entities(SOURCES, REQUIREMENTS, None).expect("valid input");
        let header = "Id,Requirement Id,Source Id,Balance Pool Id,Start Date,Tenor,Amount\n";

        let both = format!("{header}1,1,1,1,01/01/2015,3,1000\n");
        let err = parse_allocation_plan(both.as_bytes(), "plan", &store).expect_err("must fail");
        assert!(matches!(err, LoadError::Field { field: "Source Id", .. }));

        let missing = format!("{header}1,1,7,0,01/01/2015,3,1000\n");
        let err = parse_allocation_plan(missing.as_bytes(), "plan", &store).expect_err("must fail");
        assert!(matches!(
            err,
            LoadError::UnknownReference {
                entity: "source",
                id: 7,
                ..
            }
        ));

        let no_requirement = format!("{header}1,0,1,0,01/01/2015,3,1000\n");
        let err =
            parse_allocation_plan(no_requirement.as_bytes(), "plan", &store).expect_err("must fail");
        assert!(matches!(err, LoadError::Field { field: "Requirement Id", .. }));
    }

    #[test]
    fn output_drops_empty_allocations_and_rounds_the_rest() {
        let store = parse_entities(SOURCES, REQUIREMENTS, Some(POOLS)).expect("valid input");
        let candidates = generate_candidates(&store);
        let mut vector = DecisionVector::zeroed(candidates.len());
        let source_candidate = candidates
            .iter()
            .find(|c| c.source_index() == Some(0))
            .copied()
            .expect("source candidate");
        source_candidate.set_all(&mut vector, 2015.0 * 12.0 + 0.4, 2.6, 999.5);
        vector.reevaluate(&store, &candidates);

        let document = build_output(&store, &candidates, &vector, RunInfo::default());
        assert_eq!(
            document.allocations,
            vec![AllocationRecord {
                requirement_id: 1,
                source_id: Some(1),
                balance_pool_id: None,
                start_date: "01-01-2015".to_string(),
                tenor: 3,
                amount: 1000,
            }]
        );
        assert_eq!(document.summary.allocation_count, 1);
        assert_eq!(document.sources[1].start_date, "01-02-2015");
        assert_eq!(document.sources[1].tax_class, "IPF");
        assert_eq!(document.balance_pools[0].recorded_date, "01-12-2014");

        let json = serde_json::to_value(&document).expect("serializes");
        assert!(json["summary"]["baselineCost"].is_number());
        assert!(json["allocations"][0]["balancePoolId"].is_null());
        assert_eq!(json["requirements"][0]["startDate"], "01-01-2015");
    }

    #[test]
    fn small_allocations_are_listed_even_when_they_round_to_zero() {
        let store = parse_entities(SOURCES, REQUIREMENTS, None).expect("valid input");
        let candidates = generate_candidates(&store);
        let mut vector = DecisionVector::zeroed(candidates.len());
        candidates[0].set_all(&mut vector, 2015.0 * 12.0, 3.0, 0.3);
        vector.reevaluate(&store, &candidates);

        let document = build_output(&store, &candidates, &vector, RunInfo::default());
        assert!(document.summary.cost < store.baseline_cost());
        assert_eq!(document.summary.allocation_count, 1);
        assert_eq!(document.allocations.len(), 1);
        assert_eq!(document.allocations[0].amount, 0);
        assert_eq!(document.allocations[0].tenor, 3);
    }

    #[test]
    fn history_is_written_as_csv() {
        let history = vec![
            GenerationStats {
                generation: 0,
                violation: 12.5,
                fitness: 400.0,
            },
            GenerationStats {
                generation: 1,
                violation: 0.0,
                fitness: 320.0,
            },
        ];
        let mut buffer = Vec::new();
        write_history(&mut buffer, &history).expect("writes");
        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(text, "generation,violation,cost\n0,12.5,400.0\n1,0.0,320.0\n");
    }
}
