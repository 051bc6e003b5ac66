use std::fmt;
use std::mem;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{
    DateRange, Money, RowIssue, StatementMonth, TransactionCandidate, TransactionKind,
};
use tracing::{debug, info, warn};

use crate::columns::{AmountConvention, ColumnMapping, ColumnRole};
use crate::csv::{tokenize, RawRow, RowNormalizer};
use crate::error::ImportError;
use crate::extract::TextExtractor;
use crate::history::HistoryIndex;
use crate::settings::ImportSettings;
use crate::statement::parse_statement;
use crate::store::TransactionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Mapping,
    Review,
    Committing,
    Done,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Mapping => write!(f, "mapping columns"),
            SessionPhase::Review => write!(f, "in review"),
            SessionPhase::Committing => write!(f, "committing"),
            SessionPhase::Done => write!(f, "done"),
        }
    }
}

/// Outcome of persisting one included candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RowCommit {
    /// Position in the review list at commit time.
    pub index: usize,
    /// Originating input row.
    pub row: usize,
    pub result: Result<i64, ImportError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    pub rows: Vec<RowCommit>,
}

impl CommitReport {
    pub fn persisted(&self) -> usize {
        self.rows.iter().filter(|r| r.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.persisted()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RowCommit> {
        self.rows.iter().filter(|r| r.result.is_err())
    }

    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }
}

/// Counts over the review list. Totals cover included rows only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total: usize,
    pub included: usize,
    pub duplicates: usize,
    pub unparsable: usize,
    pub income: Money,
    pub expenses: Money,
}

impl ReviewSummary {
    fn of(candidates: &[TransactionCandidate]) -> Self {
        let included = || candidates.iter().filter(|c| c.included);
        let total_of = |kind: TransactionKind| {
            included()
                .filter(|c| c.kind == kind)
                .map(|c| c.amount)
                .sum::<Money>()
        };
        Self {
            total: candidates.len(),
            included: included().count(),
            duplicates: candidates.iter().filter(|c| c.duplicate).count(),
            unparsable: candidates.iter().filter(|c| c.date.is_none()).count(),
            income: total_of(TransactionKind::Income),
            expenses: total_of(TransactionKind::Expense),
        }
    }
}

struct MappingStage {
    headers: RawRow,
    rows: Vec<RawRow>,
    mapping: ColumnMapping,
    convention: AmountConvention,
    history: HistoryIndex,
}

enum ReviewOrigin {
    Delimited(MappingStage),
    Statement {
        statement_month: StatementMonth,
        period: Option<DateRange>,
    },
    Retry,
}

struct ReviewStage {
    candidates: Vec<TransactionCandidate>,
    origin: ReviewOrigin,
}

enum State {
    Idle,
    Mapping(MappingStage),
    Review(ReviewStage),
    Committing,
    Done {
        report: CommitReport,
        committed: Vec<TransactionCandidate>,
    },
}

impl State {
    fn phase(&self) -> SessionPhase {
        match self {
            State::Idle => SessionPhase::Idle,
            State::Mapping(_) => SessionPhase::Mapping,
            State::Review(_) => SessionPhase::Review,
            State::Committing => SessionPhase::Committing,
            State::Done { .. } => SessionPhase::Done,
        }
    }
}

/// One upload's journey: load → (map) → review → commit.
///
/// Owns the per-row review state; parsing and classification stay in the
/// pure modules. Operations called in the wrong phase fail with
/// [`ImportError::InvalidState`] and change nothing.
pub struct ImportSession<E: TextExtractor, S: TransactionStore> {
    profile_id: String,
    extractor: E,
    store: S,
    settings: ImportSettings,
    state: State,
}

impl<E: TextExtractor, S: TransactionStore> ImportSession<E, S> {
    pub fn new(profile_id: impl Into<String>, extractor: E, store: S) -> Self {
        Self::with_settings(profile_id, extractor, store, ImportSettings::default())
    }

    pub fn with_settings(
        profile_id: impl Into<String>,
        extractor: E,
        store: S,
        settings: ImportSettings,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            extractor,
            store,
            settings,
            state: State::Idle,
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Review rows; empty outside review.
    pub fn candidates(&self) -> &[TransactionCandidate] {
        match &self.state {
            State::Review(stage) => &stage.candidates,
            _ => &[],
        }
    }

    pub fn headers(&self) -> Option<&[String]> {
        self.mapping_stage().map(|stage| stage.headers.as_slice())
    }

    pub fn mapping(&self) -> Option<&ColumnMapping> {
        self.mapping_stage().map(|stage| &stage.mapping)
    }

    pub fn convention(&self) -> Option<AmountConvention> {
        self.mapping_stage().map(|stage| stage.convention)
    }

    pub fn statement_month(&self) -> Option<StatementMonth> {
        match &self.state {
            State::Review(ReviewStage {
                origin: ReviewOrigin::Statement { statement_month, .. },
                ..
            }) => Some(*statement_month),
            _ => None,
        }
    }

    pub fn statement_period(&self) -> Option<DateRange> {
        match &self.state {
            State::Review(ReviewStage {
                origin: ReviewOrigin::Statement { period, .. },
                ..
            }) => *period,
            _ => None,
        }
    }

    pub fn report(&self) -> Option<&CommitReport> {
        match &self.state {
            State::Done { report, .. } => Some(report),
            _ => None,
        }
    }

    /// The current mapping stage, also while reviewing delimited rows.
    fn mapping_stage(&self) -> Option<&MappingStage> {
        match &self.state {
            State::Mapping(stage) => Some(stage),
            State::Review(ReviewStage {
                origin: ReviewOrigin::Delimited(stage),
                ..
            }) => Some(stage),
            _ => None,
        }
    }

    fn invalid(&self, operation: &'static str) -> ImportError {
        ImportError::InvalidState {
            operation,
            state: self.phase(),
        }
    }

    async fn read_history(&self) -> Result<HistoryIndex, ImportError> {
        let records = self
            .store
            .list_history(&self.profile_id)
            .await
            .map_err(ImportError::HistoryUnavailable)?;
        debug!("Loaded {} history record(s) for {}", records.len(), self.profile_id);
        Ok(HistoryIndex::with_tolerance(
            &records,
            self.settings.duplicate_tolerance_cents,
        ))
    }

    // ── Delimited path ────────────────────────────────────────────────────────

    /// Idle → Mapping. Returns the inferred column mapping.
    pub async fn load_delimited(&mut self, text: &str) -> Result<ColumnMapping, ImportError> {
        if !matches!(self.state, State::Idle) {
            return Err(self.invalid("load a file"));
        }

        let delimiter = self
            .settings
            .delimiter_byte()
            .map_err(|e| ImportError::MalformedInput(e.to_string()))?;
        let mut rows = tokenize(text, delimiter)?;
        let history = self.read_history().await?;

        let headers = rows.remove(0);
        let mapping = ColumnMapping::infer(&headers);
        info!(
            "Loaded {} data row(s) with {} column(s); mapping valid: {}",
            rows.len(),
            headers.len(),
            mapping.is_valid()
        );

        self.state = State::Mapping(MappingStage {
            headers,
            rows,
            mapping: mapping.clone(),
            convention: self.settings.default_convention,
            history,
        });
        Ok(mapping)
    }

    pub async fn load_delimited_bytes(
        &mut self,
        bytes: &[u8],
    ) -> Result<ColumnMapping, ImportError> {
        if !matches!(self.state, State::Idle) {
            return Err(self.invalid("load a file"));
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ImportError::MalformedInput(format!("file is not UTF-8 text: {e}")))?;
        self.load_delimited(text).await
    }

    pub fn set_column_role(&mut self, index: usize, role: ColumnRole) -> Result<(), ImportError> {
        match &mut self.state {
            State::Mapping(stage) => {
                stage.mapping.set(index, role);
                Ok(())
            }
            _ => Err(self.invalid("change a column role")),
        }
    }

    pub fn set_convention(&mut self, convention: AmountConvention) -> Result<(), ImportError> {
        match &mut self.state {
            State::Mapping(stage) => {
                stage.convention = convention;
                Ok(())
            }
            _ => Err(self.invalid("change the amount convention")),
        }
    }

    /// The first `limit` candidates the current mapping would produce.
    pub fn preview(&self, limit: usize) -> Result<Vec<TransactionCandidate>, ImportError> {
        let State::Mapping(stage) = &self.state else {
            return Err(self.invalid("preview"));
        };
        stage.mapping.validate()?;
        let rows = &stage.rows[..limit.min(stage.rows.len())];
        Ok(self.normalizer(stage).normalize(rows))
    }

    fn normalizer<'a>(&'a self, stage: &'a MappingStage) -> RowNormalizer<'a> {
        RowNormalizer::new(
            &stage.mapping,
            stage.convention,
            &stage.history,
            &self.settings.delimited_source_tag,
        )
    }

    /// Mapping → Review. An invalid mapping leaves the session in Mapping.
    pub fn apply_mapping(&mut self) -> Result<ReviewSummary, ImportError> {
        let State::Mapping(stage) = &self.state else {
            return Err(self.invalid("apply the column mapping"));
        };
        stage.mapping.validate()?;
        let candidates = self.normalizer(stage).normalize(&stage.rows);

        let State::Mapping(stage) = mem::replace(&mut self.state, State::Idle) else {
            return Err(self.invalid("apply the column mapping"));
        };
        let summary = ReviewSummary::of(&candidates);
        info!(
            "Mapped {} candidate(s): {} included, {} duplicate(s)",
            summary.total, summary.included, summary.duplicates
        );
        self.state = State::Review(ReviewStage {
            candidates,
            origin: ReviewOrigin::Delimited(stage),
        });
        Ok(summary)
    }

    // ── Statement path ────────────────────────────────────────────────────────

    /// Idle → Review. Extraction or parse failures leave the session Idle.
    pub async fn load_statement(&mut self, bytes: &[u8]) -> Result<StatementMonth, ImportError> {
        if !matches!(self.state, State::Idle) {
            return Err(self.invalid("load a statement"));
        }

        let text = self.extractor.extract(bytes).await?;
        let fallback_year = self
            .settings
            .fallback_year
            .unwrap_or_else(|| Utc::now().year());
        let parsed = parse_statement(&text, fallback_year)?;
        let history = self.read_history().await?;
        let extraction = parsed.into_extraction(&history, &self.settings.statement_source_tag);

        info!(
            "Statement {} parsed: {} candidate(s)",
            extraction.statement_month,
            extraction.candidates.len()
        );
        self.state = State::Review(ReviewStage {
            candidates: extraction.candidates,
            origin: ReviewOrigin::Statement {
                statement_month: extraction.statement_month,
                period: extraction.period,
            },
        });
        Ok(extraction.statement_month)
    }

    // ── Review ────────────────────────────────────────────────────────────────

    fn review_mut(&mut self, operation: &'static str) -> Result<&mut ReviewStage, ImportError> {
        if !matches!(self.state, State::Review(_)) {
            return Err(self.invalid(operation));
        }
        match &mut self.state {
            State::Review(stage) => Ok(stage),
            _ => Err(ImportError::InvalidState {
                operation,
                state: SessionPhase::Review,
            }),
        }
    }

    /// A row without a date cannot be included.
    pub fn set_included(&mut self, index: usize, included: bool) -> Result<(), ImportError> {
        let stage = self.review_mut("change row selection")?;
        let candidate = stage
            .candidates
            .get_mut(index)
            .ok_or(ImportError::RowOutOfRange(index))?;
        if included && candidate.date.is_none() {
            let value = match &candidate.issue {
                Some(RowIssue::UnparsableDate(value)) => value.clone(),
                None => String::new(),
            };
            return Err(ImportError::UnparsableDate {
                row: candidate.row,
                value,
            });
        }
        candidate.included = included;
        Ok(())
    }

    /// Sets or clears a row's category. Blank clears it.
    pub fn set_category(
        &mut self,
        index: usize,
        category: Option<String>,
    ) -> Result<(), ImportError> {
        let stage = self.review_mut("change a category")?;
        let candidate = stage
            .candidates
            .get_mut(index)
            .ok_or(ImportError::RowOutOfRange(index))?;
        candidate.category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Ok(())
    }

    /// Includes every row that has a date, duplicates too.
    pub fn select_all(&mut self) -> Result<(), ImportError> {
        let stage = self.review_mut("select all rows")?;
        for candidate in &mut stage.candidates {
            candidate.included = candidate.date.is_some();
        }
        Ok(())
    }

    pub fn deselect_all(&mut self) -> Result<(), ImportError> {
        let stage = self.review_mut("deselect all rows")?;
        for candidate in &mut stage.candidates {
            candidate.included = false;
        }
        Ok(())
    }

    /// Restores the default selection: dated, positive, not duplicate.
    pub fn select_new(&mut self) -> Result<(), ImportError> {
        let stage = self.review_mut("select new rows")?;
        for candidate in &mut stage.candidates {
            candidate.included = candidate.is_new();
        }
        Ok(())
    }

    pub fn summary(&self) -> Result<ReviewSummary, ImportError> {
        match &self.state {
            State::Review(stage) => Ok(ReviewSummary::of(&stage.candidates)),
            _ => Err(self.invalid("summarize")),
        }
    }

    // ── Commit ────────────────────────────────────────────────────────────────

    /// Review → Done, persisting included rows one at a time in order.
    /// Row failures are recorded in the report; rows already stored stay.
    pub async fn commit(&mut self) -> Result<CommitReport, ImportError> {
        match &self.state {
            State::Review(stage) if stage.candidates.iter().any(|c| c.included) => {}
            State::Review(_) => return Err(ImportError::NothingSelected),
            _ => return Err(self.invalid("commit")),
        }
        let State::Review(stage) = mem::replace(&mut self.state, State::Committing) else {
            return Err(self.invalid("commit"));
        };

        let committed: Vec<TransactionCandidate> =
            stage.candidates.into_iter().filter(|c| c.included).collect();
        info!("Committing {} transaction(s) for {}", committed.len(), self.profile_id);

        let mut report = CommitReport::default();
        for (index, candidate) in committed.iter().enumerate() {
            let result = match candidate.to_new_transaction(&self.profile_id) {
                Some(record) => self
                    .store
                    .create_transaction(&record)
                    .await
                    .map_err(|source| ImportError::PersistenceFailure {
                        row: candidate.row,
                        source,
                    }),
                None => Err(ImportError::UnparsableDate {
                    row: candidate.row,
                    value: String::new(),
                }),
            };
            match &result {
                Ok(id) => debug!("Row {} stored as {id}", candidate.row),
                Err(e) => warn!("Row {} not stored: {e}", candidate.row),
            }
            report.rows.push(RowCommit {
                index,
                row: candidate.row,
                result,
            });
        }

        info!(
            "Commit finished: {} stored, {} failed",
            report.persisted(),
            report.failed()
        );
        self.state = State::Done {
            report: report.clone(),
            committed,
        };
        Ok(report)
    }

    /// Done → Review holding only the rows that failed, all included.
    pub fn retry_failed(&mut self) -> Result<usize, ImportError> {
        let State::Done { report, .. } = &self.state else {
            return Err(self.invalid("retry failed rows"));
        };
        if report.is_complete() {
            return Err(ImportError::NothingSelected);
        }
        let State::Done { report, committed } = mem::replace(&mut self.state, State::Idle) else {
            return Err(self.invalid("retry failed rows"));
        };

        let failed: Vec<usize> = report.failures().map(|r| r.index).collect();
        let candidates: Vec<TransactionCandidate> = committed
            .into_iter()
            .enumerate()
            .filter(|(i, _)| failed.contains(i))
            .map(|(_, mut candidate)| {
                candidate.included = true;
                candidate
            })
            .collect();

        info!("Retrying {} failed row(s)", candidates.len());
        let count = candidates.len();
        self.state = State::Review(ReviewStage {
            candidates,
            origin: ReviewOrigin::Retry,
        });
        Ok(count)
    }

    // ── Navigation ────────────────────────────────────────────────────────────

    /// Steps back one phase. Delimited review returns to Mapping with the
    /// mapping and convention kept; everything else returns to Idle.
    pub fn back(&mut self) -> Result<SessionPhase, ImportError> {
        if matches!(self.state, State::Idle | State::Committing) {
            return Err(self.invalid("go back"));
        }
        self.state = match mem::replace(&mut self.state, State::Idle) {
            State::Review(ReviewStage {
                origin: ReviewOrigin::Delimited(stage),
                ..
            }) => State::Mapping(stage),
            _ => State::Idle,
        };
        debug!("Stepped back to {}", self.phase());
        Ok(self.phase())
    }

    /// Drops everything and returns to Idle. Rows already stored stay.
    pub fn cancel(&mut self) {
        if !matches!(self.state, State::Idle) {
            info!("Import cancelled while {}", self.phase());
        }
        self.state = State::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractError, StaticTextExtractor, Utf8TextExtractor};
    use crate::store::{MemoryStore, StoreError};
    use chrono::NaiveDate;
    use tally_core::{HistoryRecord, TransactionTypeTag};

    const BANK_CSV: &str = "\
Date,Description,Amount,Category
01/15/2024,\"Grocery Store\",-54.32,
01/16/2024,Bakery,-3.00,Food
01/17/2024,Payroll,2000.00,Income
pending,Corner Deli,-8.00,
";

    const STATEMENT: &str = "\
January 1, 2024 through January 31, 2024
TRANSACTION DETAIL
01/03 Recurring Card Purchase 01/02 Netflix.Com Card 4521 -15.49 984.51
01/09 Remote Online Deposit 1 250.00 1,234.51
Ending Balance 1,234.51
";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session(store: MemoryStore) -> ImportSession<StaticTextExtractor, MemoryStore> {
        ImportSession::new("profile-1", StaticTextExtractor::new(STATEMENT), store)
    }

    async fn in_review(store: MemoryStore) -> ImportSession<StaticTextExtractor, MemoryStore> {
        let mut s = session(store);
        s.load_delimited(BANK_CSV).await.unwrap();
        s.apply_mapping().unwrap();
        s
    }

    #[tokio::test]
    async fn delimited_import_end_to_end() {
        let mut s = session(MemoryStore::new());
        let mapping = s.load_delimited(BANK_CSV).await.unwrap();
        assert!(mapping.is_valid());
        assert_eq!(s.phase(), SessionPhase::Mapping);
        assert_eq!(s.headers().unwrap()[0], "Date");

        let summary = s.apply_mapping().unwrap();
        assert_eq!(s.phase(), SessionPhase::Review);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.included, 3);
        assert_eq!(summary.unparsable, 1);
        assert_eq!(summary.expenses, Money::from_cents(5732));
        assert_eq!(summary.income, Money::from_cents(200000));

        let report = s.commit().await.unwrap();
        assert_eq!(s.phase(), SessionPhase::Done);
        assert_eq!(report.persisted(), 3);
        assert!(report.is_complete());

        let created = s.store().created();
        let descriptions: Vec<_> = created.iter().map(|(_, r)| r.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Grocery Store", "Bakery", "Payroll"]);
        assert_eq!(created[0].1.date, date(2024, 1, 15));
        assert_eq!(created[0].1.amount, Money::from_cents(5432));
        assert_eq!(created[0].1.kind, TransactionKind::Expense);
        assert_eq!(created[0].1.source_tag, "csv_import");
        assert_eq!(created[1].1.category.as_deref(), Some("Food"));
    }

    #[tokio::test]
    async fn out_of_range_amounts_are_excluded_not_fatal() {
        let mut s = session(MemoryStore::new());
        s.load_delimited(
            "Date,Description,Amount\n\
             2024-01-05,Mis-mapped,50000000000000000000000000000\n\
             2024-01-06,Mis-mapped,50000000000000000000000000000\n\
             2024-01-07, \"Acme, Inc.\", -5.00\n",
        )
        .await
        .unwrap();

        let summary = s.apply_mapping().unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.included, 1);
        assert_eq!(summary.expenses, Money::from_cents(500));

        let acme = &s.candidates()[2];
        assert_eq!(acme.raw_description, "Acme, Inc.");
        assert!(s.candidates()[..2].iter().all(|c| c.amount.is_zero()));
    }

    #[tokio::test]
    async fn malformed_input_stays_idle() {
        let mut s = session(MemoryStore::new());
        let err = s.load_delimited("Date,Description,Amount\n").await.unwrap_err();
        assert!(matches!(err, ImportError::MalformedInput(_)));
        assert_eq!(s.phase(), SessionPhase::Idle);

        let err = s.load_delimited_bytes(&[0xff, 0xfe, 0x41]).await.unwrap_err();
        assert!(matches!(err, ImportError::MalformedInput(_)));
        assert_eq!(s.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn history_failure_stays_idle() {
        let mut s = session(MemoryStore::new().fail_history("offline"));
        let err = s.load_delimited(BANK_CSV).await.unwrap_err();
        assert_eq!(
            err,
            ImportError::HistoryUnavailable(StoreError::Backend("offline".into()))
        );
        assert_eq!(s.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn invalid_mapping_stays_in_mapping_until_fixed() {
        let mut s = session(MemoryStore::new());
        let mapping = s
            .load_delimited("When,What,How Much\n2024-01-05,Bakery,-3.00\n")
            .await
            .unwrap();
        assert!(!mapping.is_valid());

        let err = s.apply_mapping().unwrap_err();
        assert!(matches!(err, ImportError::InvalidMapping { .. }));
        assert_eq!(s.phase(), SessionPhase::Mapping);

        s.set_column_role(0, ColumnRole::Date).unwrap();
        s.set_column_role(1, ColumnRole::Description).unwrap();
        s.set_column_role(2, ColumnRole::Amount).unwrap();
        s.apply_mapping().unwrap();
        assert_eq!(s.candidates().len(), 1);
        assert_eq!(s.candidates()[0].amount, Money::from_cents(300));
    }

    #[tokio::test]
    async fn convention_and_preview() {
        let mut s = session(MemoryStore::new());
        s.load_delimited(BANK_CSV).await.unwrap();

        let preview = s.preview(2).unwrap();
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0].kind, TransactionKind::Expense);

        s.set_convention(AmountConvention::PositiveIsExpense).unwrap();
        assert_eq!(s.preview(1).unwrap()[0].kind, TransactionKind::Income);
        assert_eq!(s.convention(), Some(AmountConvention::PositiveIsExpense));
    }

    #[tokio::test]
    async fn back_from_review_keeps_mapping_and_convention() {
        let mut s = session(MemoryStore::new());
        s.load_delimited(BANK_CSV).await.unwrap();
        s.set_column_role(3, ColumnRole::Skip).unwrap();
        s.set_convention(AmountConvention::PositiveIsExpense).unwrap();
        s.apply_mapping().unwrap();

        assert_eq!(s.back().unwrap(), SessionPhase::Mapping);
        assert_eq!(s.mapping().unwrap().role(3), ColumnRole::Skip);
        assert_eq!(s.convention(), Some(AmountConvention::PositiveIsExpense));

        assert_eq!(s.back().unwrap(), SessionPhase::Idle);
        assert!(matches!(s.back(), Err(ImportError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn wrong_phase_operations_are_rejected() {
        let mut s = session(MemoryStore::new());
        assert_eq!(
            s.commit().await.unwrap_err(),
            ImportError::InvalidState {
                operation: "commit",
                state: SessionPhase::Idle
            }
        );
        assert!(s.set_included(0, true).is_err());
        assert!(s.apply_mapping().is_err());

        s.load_delimited(BANK_CSV).await.unwrap();
        assert!(matches!(s.select_all(), Err(ImportError::InvalidState { .. })));
        assert!(matches!(
            s.load_statement(b"").await,
            Err(ImportError::InvalidState { .. })
        ));
        assert_eq!(s.phase(), SessionPhase::Mapping);

        s.apply_mapping().unwrap();
        assert!(s.set_convention(AmountConvention::PositiveIsExpense).is_err());
        assert!(s.preview(1).is_err());
        assert_eq!(s.phase(), SessionPhase::Review);
    }

    #[tokio::test]
    async fn review_edits() {
        let mut s = in_review(MemoryStore::new()).await;

        s.set_included(0, false).unwrap();
        assert!(!s.candidates()[0].included);

        s.set_category(0, Some("Groceries".into())).unwrap();
        assert_eq!(s.candidates()[0].category.as_deref(), Some("Groceries"));
        s.set_category(0, Some("  ".into())).unwrap();
        assert_eq!(s.candidates()[0].category, None);

        assert_eq!(s.set_included(9, true), Err(ImportError::RowOutOfRange(9)));
        assert_eq!(
            s.set_included(3, true),
            Err(ImportError::UnparsableDate {
                row: 3,
                value: "pending".into()
            })
        );
    }

    #[tokio::test]
    async fn bulk_selection() {
        let mut s = in_review(MemoryStore::new()).await;

        s.deselect_all().unwrap();
        assert_eq!(s.summary().unwrap().included, 0);
        assert_eq!(s.commit().await.unwrap_err(), ImportError::NothingSelected);
        assert_eq!(s.phase(), SessionPhase::Review);

        s.select_all().unwrap();
        assert_eq!(s.summary().unwrap().included, 3);
        assert!(!s.candidates()[3].included);

        s.set_included(1, false).unwrap();
        s.select_new().unwrap();
        assert_eq!(s.summary().unwrap().included, 3);
    }

    #[tokio::test]
    async fn row_failures_do_not_abort_the_batch() {
        let store = MemoryStore::new().fail_on(|r| r.description == "Bakery");
        let mut s = in_review(store).await;

        let report = s.commit().await.unwrap();
        assert_eq!(report.persisted(), 2);
        assert_eq!(report.failed(), 1);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.row, 1);
        assert!(matches!(
            failure.result,
            Err(ImportError::PersistenceFailure { row: 1, .. })
        ));
        assert_eq!(s.store().created().len(), 2);

        assert_eq!(s.retry_failed().unwrap(), 1);
        assert_eq!(s.phase(), SessionPhase::Review);
        assert_eq!(s.candidates().len(), 1);
        assert!(s.candidates()[0].included);

        let retry = s.commit().await.unwrap();
        assert_eq!(retry.failed(), 1);
        assert_eq!(s.store().created().len(), 2);
    }

    #[tokio::test]
    async fn retry_with_nothing_failed_is_rejected() {
        let mut s = in_review(MemoryStore::new()).await;
        s.commit().await.unwrap();
        assert_eq!(s.retry_failed(), Err(ImportError::NothingSelected));
        assert_eq!(s.phase(), SessionPhase::Done);
    }

    #[tokio::test]
    async fn reimporting_the_same_file_finds_only_duplicates() {
        let mut s = in_review(MemoryStore::new()).await;
        s.commit().await.unwrap();
        s.cancel();

        s.load_delimited(BANK_CSV).await.unwrap();
        let summary = s.apply_mapping().unwrap();
        assert_eq!(summary.duplicates, 3);
        assert_eq!(summary.included, 0);
        assert_eq!(s.commit().await.unwrap_err(), ImportError::NothingSelected);
    }

    #[tokio::test]
    async fn history_categories_fill_blank_rows() {
        let store = MemoryStore::with_history(
            "profile-1",
            vec![HistoryRecord {
                date: date(2023, 12, 2),
                amount: Money::from_cents(-6012),
                description: "GROCERY STORE".into(),
                category: Some("Groceries".into()),
            }],
        );
        let s = in_review(store).await;
        assert_eq!(s.candidates()[0].category.as_deref(), Some("Groceries"));
        assert_eq!(s.candidates()[1].category.as_deref(), Some("Food"));
    }

    #[tokio::test]
    async fn cancel_discards_without_persisting() {
        let mut s = in_review(MemoryStore::new()).await;
        s.cancel();
        assert_eq!(s.phase(), SessionPhase::Idle);
        assert!(s.candidates().is_empty());
        assert!(s.store().created().is_empty());
    }

    #[tokio::test]
    async fn statement_import_end_to_end() {
        let mut s = session(MemoryStore::new());
        let month = s.load_statement(b"%PDF").await.unwrap();
        assert_eq!(month, StatementMonth { year: 2024, month: 1 });
        assert_eq!(s.phase(), SessionPhase::Review);
        assert_eq!(s.statement_month(), Some(month));
        assert_eq!(
            s.statement_period(),
            Some(DateRange::new(date(2024, 1, 1), date(2024, 1, 31)))
        );

        let tags: Vec<_> = s.candidates().iter().map(|c| c.transaction_type).collect();
        assert_eq!(
            tags,
            vec![
                Some(TransactionTypeTag::Recurring),
                Some(TransactionTypeTag::CheckDeposit)
            ]
        );

        s.commit().await.unwrap();
        let created = s.store().created();
        assert_eq!(created[0].1.description, "Netflix.Com");
        assert_eq!(created[0].1.transaction_type, Some(TransactionTypeTag::Recurring));
        assert_eq!(created[1].1.kind, TransactionKind::Income);
        assert!(created.iter().all(|(_, r)| r.source_tag == "statement_import"));
    }

    #[tokio::test]
    async fn statement_back_returns_to_idle() {
        let mut s = session(MemoryStore::new());
        s.load_statement(b"").await.unwrap();
        assert_eq!(s.back().unwrap(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn unrecognized_statement_stays_idle() {
        let mut s = ImportSession::new(
            "profile-1",
            StaticTextExtractor::new("Quarterly newsletter\nNothing to see"),
            MemoryStore::new(),
        );
        assert_eq!(
            s.load_statement(b"").await.unwrap_err(),
            ImportError::NoTransactionsFound
        );
        assert_eq!(s.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn extraction_failure_stays_idle() {
        let mut s = ImportSession::new("profile-1", Utf8TextExtractor, MemoryStore::new());
        let err = s.load_statement(&[0xff, 0x00, 0xfe]).await.unwrap_err();
        assert!(matches!(
            err,
            ImportError::ExtractionFailed(ExtractError::Decode(_))
        ));
        assert_eq!(s.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn settings_drive_source_tag_and_fallback_year() {
        let settings = ImportSettings {
            delimited_source_tag: "bank_csv".into(),
            fallback_year: Some(2021),
            ..ImportSettings::default()
        };
        let mut s = ImportSession::with_settings(
            "profile-1",
            StaticTextExtractor::new("TRANSACTION DETAIL\n06/01 Bakery -3.00\n"),
            MemoryStore::new(),
            settings,
        );
        s.load_statement(b"").await.unwrap();
        assert_eq!(s.candidates()[0].date, Some(date(2021, 6, 1)));
        s.cancel();

        s.load_delimited(BANK_CSV).await.unwrap();
        s.apply_mapping().unwrap();
        assert!(s.candidates().iter().all(|c| c.source_tag == "bank_csv"));
    }
}
