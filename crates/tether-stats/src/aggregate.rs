use crate::error::{AggrError, AggrResult};
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;
use tether_columnar::compute::{abs, add, divide, multiply, power, subtract};
use tether_columnar::{ChunkedColumn, Table};

/// How the per-column deltas feed the running moments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeltaMode {
    /// Standard Welford update.
    #[default]
    Signed,
    /// Both deltas are replaced by their absolute value before use. The running mean
    /// only ever moves up, so this is a different statistic, not a variant of the
    /// signed one.
    Absolute,
}

impl DeltaMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeltaMode::Signed => "signed",
            DeltaMode::Absolute => "absolute",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "signed" => Some(DeltaMode::Signed),
            "absolute" => Some(DeltaMode::Absolute),
            _ => None,
        }
    }
}

/// Scale factor `n_a * n_b / (n_a + n_b)` used for the cross term of a merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CountRatio {
    #[default]
    Float,
    /// Integer division of the counts, matching partials stored by older writers.
    Truncated,
}

impl CountRatio {
    fn scale(self, n_a: u64, n_b: u64) -> f64 {
        // Widened so neither the product nor the sum can overflow.
        let (n_a, n_b) = (u128::from(n_a), u128::from(n_b));
        let total = n_a + n_b;
        match self {
            CountRatio::Float => (n_a as f64 * n_b as f64) / total as f64,
            CountRatio::Truncated => ((n_a * n_b) / total) as f64,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Moments {
    pub(crate) means: ChunkedColumn,
    pub(crate) m2: ChunkedColumn,
}

/// Running `{count, means, M2}` over a stream of columns.
///
/// `count` is the number of columns folded in so far, not the number of rows. Each
/// aggregate owns its buffers; merges build new columns instead of writing through
/// shared ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregate {
    mode: DeltaMode,
    count: u64,
    moments: Option<Moments>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: DeltaMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub(crate) fn from_parts(mode: DeltaMode, count: u64, moments: Moments) -> Self {
        Self {
            mode,
            count,
            moments: Some(moments),
        }
    }

    pub fn mode(&self) -> DeltaMode {
        self.mode
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.moments.is_none()
    }

    /// Number of rows tracked, or 0 before initialization.
    pub fn len(&self) -> usize {
        self.moments.as_ref().map(|m| m.means.len()).unwrap_or(0)
    }

    pub fn means(&self) -> Option<&ChunkedColumn> {
        self.moments.as_ref().map(|m| &m.means)
    }

    /// Unnormalized second moments (M2).
    pub fn variances(&self) -> Option<&ChunkedColumn> {
        self.moments.as_ref().map(|m| &m.m2)
    }

    pub(crate) fn initialized(&self) -> AggrResult<&Moments> {
        self.moments.as_ref().ok_or(AggrError::Uninitialized)
    }

    /// Seed an empty aggregate with its first observation column.
    pub fn initialize(&mut self, column: &ChunkedColumn) -> AggrResult<()> {
        if self.moments.is_some() {
            return Err(AggrError::AlreadyInitialized);
        }
        let means = column.to_float64()?;
        let m2 = ChunkedColumn::zeros(means.len());
        self.moments = Some(Moments { means, m2 });
        self.count = 1;
        Ok(())
    }

    /// Fold columns `[start, stop)` of `table` into the aggregate, in order.
    ///
    /// `stop == 0` means through the last column. An empty aggregate is initialized
    /// from column `start`. A failure part way through leaves the columns before it
    /// folded in.
    pub fn accumulate(&mut self, table: &Table, start: usize, stop: usize) -> AggrResult<()> {
        let count = table.num_columns();
        let stop = if stop == 0 { count } else { stop };
        if stop > count {
            return Err(AggrError::ColumnOutOfRange {
                index: stop - 1,
                count,
            });
        }
        if start >= stop {
            return Err(AggrError::EmptyColumnRange { start, stop });
        }

        log::debug!(
            "accumulating columns [{start}, {stop}) of {} rows ({} mode)",
            table.num_rows(),
            self.mode.as_str()
        );

        let mut next = start;
        if self.is_empty() {
            self.initialize(table.column(start)?)?;
            next += 1;
        }
        for idx in next..stop {
            self.fold(table.column(idx)?)?;
        }
        Ok(())
    }

    /// Fold every value column of `table`; column 0 holds the row keys.
    pub fn accumulate_all(&mut self, table: &Table) -> AggrResult<()> {
        self.accumulate(table, 1, 0)
    }

    fn fold(&mut self, column: &ChunkedColumn) -> AggrResult<()> {
        let absolute = self.mode == DeltaMode::Absolute;
        let moments = self.moments.as_mut().ok_or(AggrError::Uninitialized)?;
        if column.len() != moments.means.len() {
            return Err(AggrError::LengthMismatch {
                expected: moments.means.len(),
                actual: column.len(),
            });
        }

        let count = (self.count + 1) as f64;
        let mut delta = subtract(column, &moments.means)?;
        if absolute {
            delta = abs(&delta)?;
        }
        let means = add(&moments.means, &divide(&delta, count)?)?;
        let mut delta2 = subtract(column, &means)?;
        if absolute {
            delta2 = abs(&delta2)?;
        }
        let m2 = add(&moments.m2, &multiply(&delta, &delta2)?)?;

        moments.means = means;
        moments.m2 = m2;
        self.count += 1;
        Ok(())
    }

    /// Merge `other` into `self` with the parallel variance formula.
    pub fn combine(&mut self, other: &Aggregate) -> AggrResult<()> {
        self.combine_with(other, CountRatio::Float)
    }

    pub fn combine_with(&mut self, other: &Aggregate, ratio: CountRatio) -> AggrResult<()> {
        let Some(theirs) = other.moments.as_ref() else {
            return Ok(());
        };
        let Some(ours) = self.moments.as_ref() else {
            if self.mode != other.mode {
                log::warn!(
                    "empty {} aggregate adopts {} mode from merge",
                    self.mode.as_str(),
                    other.mode.as_str()
                );
            }
            self.count = other.count;
            self.mode = other.mode;
            self.moments = Some(theirs.clone());
            return Ok(());
        };
        if ours.means.len() != theirs.means.len() {
            return Err(AggrError::LengthMismatch {
                expected: ours.means.len(),
                actual: theirs.means.len(),
            });
        }
        if self.mode != other.mode {
            log::warn!(
                "merging {} aggregate into {} aggregate",
                other.mode.as_str(),
                self.mode.as_str()
            );
        }

        let (n_a, n_b) = (self.count, other.count);
        let total = n_a
            .checked_add(n_b)
            .ok_or(AggrError::CountOverflow { left: n_a, right: n_b })?;

        let weighted = add(
            &multiply(&ours.means, n_a as f64)?,
            &multiply(&theirs.means, n_b as f64)?,
        )?;
        let means = divide(&weighted, total as f64)?;

        let delta = subtract(&theirs.means, &ours.means)?;
        let cross = multiply(&power(&delta, 2.0)?, ratio.scale(n_a, n_b))?;
        let m2 = add(&add(&ours.m2, &theirs.m2)?, &cross)?;

        self.moments = Some(Moments { means, m2 });
        self.count = total;
        Ok(())
    }

    /// Snapshot of the current state as a `{mean, variance}` table. The variance
    /// column holds M2.
    pub fn take_result(&self) -> AggrResult<Table> {
        let moments = self.initialized()?;
        let schema = Arc::new(Schema::new(vec![
            Field::new("mean", DataType::Float64, true),
            Field::new("variance", DataType::Float64, true),
        ]));
        Ok(Table::try_new(
            schema,
            vec![moments.means.clone(), moments.m2.clone()],
        )?)
    }

    /// `M2 / count`.
    pub fn population_variances(&self) -> AggrResult<ChunkedColumn> {
        let moments = self.initialized()?;
        Ok(divide(&moments.m2, self.count as f64)?)
    }

    /// `M2 / (count - 1)`; NaN for every row while `count == 1`.
    pub fn sample_variances(&self) -> AggrResult<ChunkedColumn> {
        let moments = self.initialized()?;
        Ok(divide(&moments.m2, self.count as f64 - 1.0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_ratio_drops_the_fraction() {
        assert_eq!(CountRatio::Float.scale(2, 3), 1.2);
        assert_eq!(CountRatio::Truncated.scale(2, 3), 1.0);
        assert_eq!(CountRatio::Truncated.scale(1, 1), 0.0);
    }

    #[test]
    fn ratio_handles_counts_whose_product_exceeds_u64() {
        let big = u64::MAX / 2;
        let expected = (big as f64 * 4.0) / (big as f64 + 4.0);
        assert!((CountRatio::Truncated.scale(big, 4) - 3.0).abs() < 1e-12);
        assert!((CountRatio::Float.scale(big, 4) - expected).abs() < 1e-9);
        assert!((CountRatio::Float.scale(big, big) - big as f64 / 2.0).abs() / (big as f64) < 1e-12);
    }

    #[test]
    fn merged_count_overflow_is_an_error() {
        let column = ChunkedColumn::from_f64(vec![1.0]);
        let mut a = Aggregate::new();
        a.initialize(&column).unwrap();
        a.count = u64::MAX;
        let mut b = Aggregate::new();
        b.initialize(&column).unwrap();

        let err = a.combine(&b).unwrap_err();
        assert!(matches!(err, AggrError::CountOverflow { right: 1, .. }), "{err}");
        assert_eq!(a.count(), u64::MAX);
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in [DeltaMode::Signed, DeltaMode::Absolute] {
            assert_eq!(DeltaMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(DeltaMode::parse("other"), None);
    }
}
