/// Conductivity/rainfall temporal correlation.
///
/// Walks a reference series (CoSMo specific conductance) in fixed blocks,
/// fetching the secondary series (CNV rainfall) for each block widened by the
/// correlation margin, and pairs every reference reading with every secondary
/// reading inside the margin. Neither series is ever loaded whole.
///
/// # Algorithm
///
/// 1. Reference bounds: earliest and latest timestamp for the location.
/// 2. Secondary bounds, logged for the operator.
/// 3. For `t` from the reference start, stepping by the increment while
///    `t <= end`: reference rows in `[t, t + inc)`, secondary rows in
///    `[t - margin, t + inc + margin)`, paired by `|Δt| <= margin`.
/// 4. Each pair is validated and added to the importer.

pub mod entry;
pub mod run;
pub mod store;

use crate::entry::RecordValidator;
use crate::error::CorrelationError;
use crate::importer::Importer;
use crate::locations::TableId;
use crate::logging::{Component, Logger};
use crate::model::{CorrelatedEntry, CorrelationWindow, Reading};
use chrono::{Duration, NaiveDateTime};
use entry::{CorrelationValidator, to_record};
use store::SeriesStore;

pub const DEFAULT_INCREMENT_DAYS: i64 = 7;
pub const DEFAULT_MARGIN_MINUTES: i64 = 5;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do with a correlated entry that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPolicy {
    /// Stop the location's run with the validation error.
    #[default]
    Abort,
    /// Count the entry, keep it in the report, and carry on.
    SkipAndCollect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationConfig {
    /// Block length. Must be positive.
    pub increment: Duration,
    /// Maximum distance, inclusive, between paired readings.
    pub margin: Duration,
    pub locations: Vec<TableId>,
    pub policy: ValidationPolicy,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        CorrelationConfig {
            increment: Duration::days(DEFAULT_INCREMENT_DAYS),
            margin: Duration::minutes(DEFAULT_MARGIN_MINUTES),
            locations: Vec::new(),
            policy: ValidationPolicy::Abort,
        }
    }
}

// ---------------------------------------------------------------------------
// Windows and pairing
// ---------------------------------------------------------------------------

/// Blocks `[t, t + increment)` for `t = start, start + increment, ...` while
/// `t <= end`. Yields nothing for a non-positive increment.
pub fn block_windows(
    start: NaiveDateTime,
    end: NaiveDateTime,
    increment: Duration,
    margin: Duration,
) -> impl Iterator<Item = CorrelationWindow> {
    let first = (increment > Duration::zero()).then_some(start);
    std::iter::successors(first, move |t| t.checked_add_signed(increment))
        .take_while(move |t| *t <= end)
        .map(move |t| CorrelationWindow {
            start: t,
            end: t + increment,
            margin,
        })
}

/// Pairs each reference reading with every secondary reading no more than
/// `margin` away. Both slices must be sorted by timestamp.
pub fn pair_readings(reference: &[Reading], secondary: &[Reading], margin: Duration) -> Vec<CorrelatedEntry> {
    let mut entries = Vec::new();
    let mut low = 0;

    for r in reference {
        let earliest = r.timestamp - margin;
        let latest = r.timestamp + margin;
        while low < secondary.len() && secondary[low].timestamp < earliest {
            low += 1;
        }
        entries.extend(
            secondary[low..]
                .iter()
                .take_while(|s| s.timestamp <= latest)
                .map(|s| CorrelatedEntry {
                    reference: *r,
                    secondary: *s,
                }),
        );
    }
    entries
}

// ---------------------------------------------------------------------------
// Correlator
// ---------------------------------------------------------------------------

/// Counters for one location's run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationReport {
    pub blocks: usize,
    pub reference_rows: usize,
    pub secondary_rows: usize,
    /// Entries validated and handed to the importer.
    pub entries: usize,
    /// Entries rejected under `ValidationPolicy::SkipAndCollect`, with reasons.
    pub skipped: Vec<String>,
}

pub struct Correlator<R: SeriesStore, S: SeriesStore> {
    reference: R,
    secondary: S,
    config: CorrelationConfig,
    logger: Logger,
}

impl<R: SeriesStore, S: SeriesStore> Correlator<R, S> {
    pub fn new(reference: R, secondary: S, config: CorrelationConfig, logger: Logger) -> Self {
        Correlator {
            reference,
            secondary,
            config,
            logger,
        }
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Correlates one location, adding every valid entry to `importer`.
    ///
    /// The importer must already be configured with the correlation schema.
    /// Nothing is executed here; the caller decides between `execute` and a
    /// dry run.
    pub fn run(&mut self, location: TableId, importer: &mut Importer) -> Result<CorrelationReport, CorrelationError> {
        let id = location.as_str();
        let (start, end) = bounds(&mut self.reference, location, "reference")?;
        self.logger.info(
            Component::Correlator,
            Some(id),
            &format!("Reference series spans {} to {}", start, end),
        );

        let (secondary_start, secondary_end) = bounds(&mut self.secondary, location, "secondary")?;
        self.logger.info(
            Component::Correlator,
            Some(id),
            &format!("Secondary series spans {} to {}", secondary_start, secondary_end),
        );

        let validator = CorrelationValidator::new(location);
        let mut report = CorrelationReport::default();

        for window in block_windows(start, end, self.config.increment, self.config.margin) {
            let reference = self.reference.readings(location, window.start, window.end)?;
            let secondary = self
                .secondary
                .readings(location, window.query_start(), window.query_end())?;
            report.blocks += 1;
            report.reference_rows += reference.len();
            report.secondary_rows += secondary.len();

            let pairs = pair_readings(&reference, &secondary, self.config.margin);
            self.logger.debug(
                Component::Correlator,
                Some(id),
                &format!(
                    "Block {} to {}: {} reference, {} secondary, {} pairs",
                    window.start,
                    window.end,
                    reference.len(),
                    secondary.len(),
                    pairs.len()
                ),
            );

            for pair in &pairs {
                let raw = to_record(pair);
                match validator.validate(&raw) {
                    Ok(entry) => {
                        importer.add(entry)?;
                        report.entries += 1;
                    }
                    Err(err) => match self.config.policy {
                        ValidationPolicy::Abort => return Err(err.into()),
                        ValidationPolicy::SkipAndCollect => {
                            self.logger.warn(
                                Component::Validator,
                                Some(id),
                                &format!("Skipping correlated entry {}: {}", raw, err),
                            );
                            report.skipped.push(format!("{} -- {}", raw, err));
                        }
                    },
                }
            }

            self.logger.progress(&format!(
                "{}: block {} correlated, {} entries",
                id, report.blocks, report.entries
            ));
        }
        self.logger.finish_progress();

        self.logger.info(
            Component::Correlator,
            Some(id),
            &format!(
                "Correlated {} entries over {} blocks ({} skipped)",
                report.entries,
                report.blocks,
                report.skipped.len()
            ),
        );
        Ok(report)
    }
}

fn bounds<T: SeriesStore>(
    store: &mut T,
    location: TableId,
    series: &'static str,
) -> Result<(NaiveDateTime, NaiveDateTime), CorrelationError> {
    let missing = || CorrelationError::MissingBounds {
        series,
        location: location.to_string(),
    };
    let start = store.earliest(location)?.ok_or_else(missing)?;
    let end = store.latest(location)?.ok_or_else(missing)?;
    Ok((start, end))
}
